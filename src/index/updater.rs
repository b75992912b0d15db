//! Transactional, incremental updates to a built index.
//!
//! Annotations added inside a transaction are buffered and spilled like a
//! builder's. `ready()` merges the current postings file with the new runs
//! into staged `idx.new` / `pst.new` files and votes; `commit()` renames
//! them over `idx` and `pst` (dictionary first). Readers that opened the
//! old files keep seeing them until they reset.
//!
//! A commit interrupted between the two renames leaves `pst.new` behind
//! and the lock held; [`IndexUpdater::recover`] finishes or rolls back
//! such a transaction.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::error::{HopdexError, Result};
use crate::index::config::WriterConfig;
use crate::index::manifest::IndexManifest;
use crate::index::merge::{MergeStats, merge_streams};
use crate::index::spill::{RUN_PREFIX, SpillBatch, SpillPool};
use crate::index::transaction::{Committable, Transaction};
use crate::index::{DICTIONARY_FILE, POSTINGS_FILE, WRITE_LOCK, discard_files, staged_name};
use crate::posting::PostingFactory;
use crate::storage::{Storage, StorageInput, StorageLock};
use crate::types::{Addr, Annotation, Feature, Fval};

/// Prefix of the temp files a merge writes into.
const MERGE_PREFIX: &str = "merge";

/// Applies annotation batches to an existing index.
#[derive(Debug)]
pub struct IndexUpdater {
    storage: Arc<dyn Storage>,
    writer_config: WriterConfig,
    factory: Arc<PostingFactory>,
    transaction: Option<Transaction>,
    annotations: Vec<Annotation>,
    pool: Option<SpillPool>,
    lock: Option<Box<dyn StorageLock>>,
    failure: Option<HopdexError>,
    stats: Option<MergeStats>,
}

impl IndexUpdater {
    /// Open an updater on the index in `storage`.
    ///
    /// If no writer holds the index but a commit was left half-done, it is
    /// completed first.
    pub fn open(storage: Arc<dyn Storage>, writer_config: WriterConfig) -> Result<Self> {
        writer_config.validate()?;

        if !storage.lock_manager().lock_exists(WRITE_LOCK) {
            complete_interrupted_commit(storage.as_ref())?;
        }

        let manifest = IndexManifest::load(storage.as_ref())?;
        for name in [DICTIONARY_FILE, POSTINGS_FILE] {
            if !storage.file_exists(name) {
                return Err(HopdexError::index(format!("index file {name} is missing")));
            }
        }
        let factory = Arc::new(PostingFactory::from_config(&manifest.config)?);

        Ok(IndexUpdater {
            storage,
            writer_config,
            factory,
            transaction: None,
            annotations: Vec::new(),
            pool: None,
            lock: None,
            failure: None,
            stats: None,
        })
    }

    /// Finish (`commit = true`) or roll back (`commit = false`) a transaction
    /// whose process died, and remove its lock.
    ///
    /// Must only be called when no live writer holds the index.
    pub fn recover(storage: &dyn Storage, commit: bool) -> Result<()> {
        if commit {
            complete_interrupted_commit(storage)?;
        } else {
            for name in [DICTIONARY_FILE, POSTINGS_FILE] {
                let staged = staged_name(name);
                if storage.file_exists(&staged) {
                    warn!(file = %staged, "rolling back staged file");
                    storage.delete_file(&staged)?;
                }
            }
        }

        for name in storage.list_files()? {
            let is_temp = name.ends_with(".tmp")
                && (name.starts_with(RUN_PREFIX) || name.starts_with(MERGE_PREFIX));
            if is_temp {
                debug!(file = %name, "removing leftover temp file");
                storage.delete_file(&name)?;
            }
        }

        storage.lock_manager().break_lock(WRITE_LOCK)?;
        storage.sync()
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Why the last `ready()` voted `false`, if it did.
    pub fn failure(&self) -> Option<&HopdexError> {
        self.failure.as_ref()
    }

    /// Summary of the last successful `ready()`.
    pub fn stats(&self) -> Option<&MergeStats> {
        self.stats.as_ref()
    }

    /// Attach `feature` with value `v` to the interval `[p, q]`.
    ///
    /// Only allowed in a transaction that has not voted yet. Intervals with
    /// `p < 0` or `p > q` are ignored.
    pub fn add_annotation(&mut self, feature: Feature, p: Addr, q: Addr, v: Fval) -> Result<()> {
        match &self.transaction {
            Some(transaction) if transaction.is_active() => {}
            Some(_) => {
                return Err(HopdexError::invalid_operation(
                    "transaction has already been prepared",
                ));
            }
            None => {
                return Err(HopdexError::invalid_operation(
                    "annotations can only be added inside a transaction",
                ));
            }
        }

        let annotation = Annotation::new(feature, p, q, v);
        if !annotation.is_valid() {
            trace!(feature, p, q, "ignoring invalid annotation");
            return Ok(());
        }
        self.annotations.push(annotation);
        if self.annotations.len() >= self.writer_config.annotation_buffer_records {
            self.spill()?;
        }
        Ok(())
    }

    fn spill(&mut self) -> Result<()> {
        let batch = std::mem::take(&mut self.annotations);
        match self.pool.as_mut() {
            Some(pool) => pool.spill(SpillBatch::Annotations(batch)),
            None => Err(HopdexError::invalid_operation("no spill pool outside a transaction")),
        }
    }

    /// Merge the current postings with every run into staged files.
    fn prepare(&mut self) -> Result<MergeStats> {
        self.spill()?;
        let pool = self
            .pool
            .as_mut()
            .ok_or_else(|| HopdexError::invalid_operation("no spill pool outside a transaction"))?;
        pool.join()?;

        let mut inputs: Vec<Box<dyn StorageInput>> = vec![self.storage.open_input(POSTINGS_FILE)?];
        for run in pool.runs() {
            inputs.push(self.storage.open_input(run)?);
        }

        let (idx_temp, mut idx_out) = self.storage.create_temp_output(MERGE_PREFIX)?;
        let staged = self
            .storage
            .create_temp_output(MERGE_PREFIX)
            .and_then(|(pst_temp, mut pst_out)| {
                let outcome = merge_streams(&self.factory, inputs, &mut idx_out, &mut pst_out)
                    .and_then(|stats| {
                        idx_out.close()?;
                        pst_out.close()?;
                        self.storage.rename_file(&idx_temp, &staged_name(DICTIONARY_FILE))?;
                        self.storage.rename_file(&pst_temp, &staged_name(POSTINGS_FILE))?;
                        self.storage.sync()?;
                        Ok(stats)
                    });
                if outcome.is_err() {
                    discard_files(self.storage.as_ref(), &[&pst_temp]);
                }
                outcome
            });
        if staged.is_err() {
            discard_files(self.storage.as_ref(), &[&idx_temp]);
        }
        let stats = staged?;

        pool.delete_runs()?;
        Ok(stats)
    }

    /// Delete everything this transaction may have written.
    fn discard(&mut self) -> Result<()> {
        self.annotations = Vec::new();
        if let Some(mut pool) = self.pool.take() {
            pool.discard();
        }
        for name in [DICTIONARY_FILE, POSTINGS_FILE] {
            self.storage.delete_file(&staged_name(name))?;
        }
        Ok(())
    }

    fn release_lock(&mut self) -> Result<()> {
        if let Some(mut lock) = self.lock.take() {
            lock.release()?;
        }
        Ok(())
    }
}

/// Finish renaming staged files into place.
fn complete_interrupted_commit(storage: &dyn Storage) -> Result<()> {
    let staged_idx = staged_name(DICTIONARY_FILE);
    let staged_pst = staged_name(POSTINGS_FILE);

    if storage.file_exists(&staged_pst) {
        if storage.file_exists(&staged_idx) {
            storage.rename_file(&staged_idx, DICTIONARY_FILE)?;
        }
        storage.rename_file(&staged_pst, POSTINGS_FILE)?;
        warn!("completed an interrupted commit");
    } else if storage.file_exists(&staged_idx) {
        storage.delete_file(&staged_idx)?;
        warn!("removed an orphaned staged dictionary");
    } else {
        return Ok(());
    }
    storage.sync()
}

impl Committable for IndexUpdater {
    fn transaction(&mut self) -> Result<()> {
        assert!(
            self.transaction.is_none(),
            "transaction() called while a transaction is open"
        );

        let lock = self.storage.lock_manager().acquire_lock(WRITE_LOCK)?;
        let pool = SpillPool::new(
            self.storage.clone(),
            self.factory.clone(),
            self.writer_config.effective_workers(),
        )?;

        let transaction = Transaction::new();
        info!(transaction = %transaction.id, "transaction started");
        self.lock = Some(lock);
        self.pool = Some(pool);
        self.transaction = Some(transaction);
        self.failure = None;
        self.stats = None;
        Ok(())
    }

    fn ready(&mut self) -> bool {
        let Some(vote) = self.transaction.as_ref().map(Transaction::vote) else {
            panic!("ready() called outside a transaction");
        };
        if let Some(vote) = vote {
            return vote;
        }

        let vote = match self.prepare() {
            Ok(stats) => {
                self.stats = Some(stats);
                true
            }
            Err(e) => {
                warn!(error = %e, "transaction cannot commit");
                if let Err(cleanup) = self.discard() {
                    warn!(error = %cleanup, "cleanup after failed ready() incomplete");
                }
                self.failure = Some(e);
                false
            }
        };

        if let Some(transaction) = self.transaction.as_mut() {
            transaction.record_vote(vote);
            debug!(transaction = %transaction.id, vote, "transaction voted");
        }
        vote
    }

    fn commit(&mut self) -> Result<()> {
        let Some(transaction) = self.transaction.as_mut() else {
            panic!("commit() called outside a transaction");
        };
        transaction.mark_committed();

        let renamed = self
            .storage
            .rename_file(&staged_name(DICTIONARY_FILE), DICTIONARY_FILE)
            .and_then(|_| {
                self.storage
                    .rename_file(&staged_name(POSTINGS_FILE), POSTINGS_FILE)
            })
            .and_then(|_| self.storage.sync());

        let transaction = self.transaction.take();
        self.pool = None;
        if let Err(e) = renamed {
            // Keep the lock file so nobody writes until recover() runs.
            if let Some(lock) = self.lock.take() {
                std::mem::forget(lock);
            }
            warn!(error = %e, "commit interrupted; recovery required");
            return Err(e);
        }

        self.release_lock()?;
        if let Some(transaction) = transaction {
            info!(
                transaction = %transaction.id,
                elapsed_ms = transaction.elapsed_millis(),
                "transaction committed"
            );
        }
        Ok(())
    }

    fn abort(&mut self) -> Result<()> {
        let Some(transaction) = self.transaction.as_mut() else {
            panic!("abort() called outside a transaction");
        };
        transaction.mark_aborted();
        let id = transaction.id.clone();

        let discarded = self.discard();
        self.transaction = None;
        self.release_lock()?;
        discarded?;
        info!(transaction = %id, "transaction aborted");
        Ok(())
    }
}

impl Drop for IndexUpdater {
    fn drop(&mut self) {
        if self.transaction.is_some() {
            warn!("dropping updater with an open transaction; aborting");
            if let Err(e) = self.abort() {
                warn!(error = %e, "abort on drop failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::builder::IndexBuilder;
    use crate::index::config::{IndexConfig, ReaderConfig};
    use crate::index::reader::IndexReader;
    use crate::storage::{FileStorage, StorageConfig};
    use crate::types::Interval;
    use tempfile::TempDir;

    fn built_index(temp_dir: &TempDir) -> Arc<dyn Storage> {
        let storage: Arc<dyn Storage> =
            Arc::new(FileStorage::new(temp_dir.path(), StorageConfig::default()).unwrap());
        let mut builder = IndexBuilder::new(
            storage.clone(),
            IndexConfig::default(),
            WriterConfig {
                worker_threads: Some(0),
                ..Default::default()
            },
        )
        .unwrap();
        builder.add_tokens(&[1, 2, 3, 1, 2, 3]).unwrap();
        builder.add_annotation(7, 0, 2, 1.0).unwrap();
        builder.finalize().unwrap();
        storage
    }

    fn config() -> WriterConfig {
        WriterConfig {
            annotation_buffer_records: 2,
            worker_threads: Some(1),
            ..Default::default()
        }
    }

    #[test]
    fn test_commit_makes_annotations_visible() {
        let temp_dir = TempDir::new().unwrap();
        let storage = built_index(&temp_dir);
        let mut updater = IndexUpdater::open(storage.clone(), config()).unwrap();

        updater.transaction().unwrap();
        updater.add_annotation(7, 3, 5, 2.0).unwrap();
        updater.add_annotation(8, 1, 4, 0.5).unwrap();
        updater.add_annotation(8, 4, 1, 0.5).unwrap(); // ignored
        assert!(updater.ready());
        assert!(updater.ready());
        assert_eq!(updater.stats().unwrap().features, 5);
        updater.commit().unwrap();
        assert!(!updater.in_transaction());

        let reader = IndexReader::open(storage.clone(), ReaderConfig::default()).unwrap();
        assert_eq!(reader.vocab(), 5);
        assert_eq!(reader.count(7).unwrap(), 2);
        assert_eq!(reader.hopper(8).unwrap().tau(0), Interval::new(1, 4, 0.5));
        assert!(!storage.file_exists("pst.new"));
        assert!(!storage.lock_manager().lock_exists(WRITE_LOCK));
    }

    #[test]
    fn test_abort_leaves_index_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let storage = built_index(&temp_dir);
        let before = std::fs::read(temp_dir.path().join(POSTINGS_FILE)).unwrap();

        let mut updater = IndexUpdater::open(storage.clone(), config()).unwrap();
        updater.transaction().unwrap();
        for i in 0..5 {
            updater.add_annotation(9, i * 2, i * 2 + 1, 0.0).unwrap();
        }
        assert!(updater.ready());
        assert!(storage.file_exists("pst.new"));
        updater.abort().unwrap();

        assert_eq!(std::fs::read(temp_dir.path().join(POSTINGS_FILE)).unwrap(), before);
        assert_eq!(
            storage.list_files().unwrap(),
            vec!["idx", "index.json", "pst"]
        );
    }

    #[test]
    fn test_add_outside_transaction_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut updater = IndexUpdater::open(built_index(&temp_dir), config()).unwrap();
        assert!(matches!(
            updater.add_annotation(1, 0, 0, 0.0),
            Err(HopdexError::InvalidOperation(_))
        ));

        updater.transaction().unwrap();
        assert!(updater.ready());
        assert!(updater.add_annotation(1, 0, 0, 0.0).is_err());
        updater.abort().unwrap();
    }

    #[test]
    #[should_panic(expected = "while a transaction is open")]
    fn test_nested_transaction_panics() {
        let temp_dir = TempDir::new().unwrap();
        let mut updater = IndexUpdater::open(built_index(&temp_dir), config()).unwrap();
        updater.transaction().unwrap();
        let _ = updater.transaction();
    }

    #[test]
    #[should_panic(expected = "without a successful ready()")]
    fn test_commit_without_ready_panics() {
        let temp_dir = TempDir::new().unwrap();
        let mut updater = IndexUpdater::open(built_index(&temp_dir), config()).unwrap();
        updater.transaction().unwrap();
        let _ = updater.commit();
    }

    #[test]
    #[should_panic(expected = "outside a transaction")]
    fn test_abort_without_transaction_panics() {
        let temp_dir = TempDir::new().unwrap();
        let mut updater = IndexUpdater::open(built_index(&temp_dir), config()).unwrap();
        let _ = updater.abort();
    }

    #[test]
    fn test_drop_aborts_open_transaction() {
        let temp_dir = TempDir::new().unwrap();
        let storage = built_index(&temp_dir);
        {
            let mut updater = IndexUpdater::open(storage.clone(), config()).unwrap();
            updater.transaction().unwrap();
            updater.add_annotation(4, 0, 1, 0.0).unwrap();
            assert!(updater.ready());
        }
        assert!(!storage.lock_manager().lock_exists(WRITE_LOCK));
        assert!(!storage.file_exists("pst.new"));
    }

    #[test]
    fn test_open_completes_half_done_commit() {
        let temp_dir = TempDir::new().unwrap();
        let storage = built_index(&temp_dir);

        let mut updater = IndexUpdater::open(storage.clone(), config()).unwrap();
        updater.transaction().unwrap();
        updater.add_annotation(11, 0, 5, 0.0).unwrap();
        assert!(updater.ready());
        // Simulate a crash after the dictionary rename.
        storage.rename_file("idx.new", DICTIONARY_FILE).unwrap();
        std::mem::forget(updater);
        storage.lock_manager().break_lock(WRITE_LOCK).unwrap();

        let _updater = IndexUpdater::open(storage.clone(), config()).unwrap();
        assert!(!storage.file_exists("pst.new"));
        let reader = IndexReader::open(storage, ReaderConfig::default()).unwrap();
        assert_eq!(reader.count(11).unwrap(), 1);
    }

    #[test]
    fn test_recover_rolls_back() {
        let temp_dir = TempDir::new().unwrap();
        let storage = built_index(&temp_dir);

        let mut updater = IndexUpdater::open(storage.clone(), config()).unwrap();
        updater.transaction().unwrap();
        updater.add_annotation(11, 0, 5, 0.0).unwrap();
        assert!(updater.ready());
        std::mem::forget(updater);
        assert!(storage.lock_manager().lock_exists(WRITE_LOCK));

        IndexUpdater::recover(storage.as_ref(), false).unwrap();
        assert_eq!(
            storage.list_files().unwrap(),
            vec!["idx", "index.json", "pst"]
        );
        let reader = IndexReader::open(storage, ReaderConfig::default()).unwrap();
        assert_eq!(reader.count(11).unwrap(), 0);
    }
}
