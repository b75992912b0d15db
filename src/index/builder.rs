//! Bulk construction of an index from tokens and annotations.
//!
//! Tokens get consecutive addresses as they are added. Tokens and
//! annotations are buffered separately; a full buffer is handed to the
//! spill pool, which sorts it and writes it as a run. [`IndexBuilder::finalize`]
//! merges every run into the dictionary and postings files and moves them
//! into place. Until then the directory's existing index (if any) is left
//! untouched.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::error::{HopdexError, Result};
use crate::index::config::{IndexConfig, WriterConfig};
use crate::index::manifest::IndexManifest;
use crate::index::merge::{MergeStats, merge_streams};
use crate::index::spill::{SpillBatch, SpillPool};
use crate::index::{DICTIONARY_FILE, POSTINGS_FILE, WRITE_LOCK, discard_files};
use crate::posting::PostingFactory;
use crate::storage::{Storage, StorageInput, StorageLock};
use crate::types::{Addr, Annotation, Feature, Fval, TokenRecord};

/// Prefix of the temp files a merge writes into.
const MERGE_PREFIX: &str = "merge";

/// Lifecycle of a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    /// Accepting tokens and annotations.
    Open,
    /// Runs are being merged into the index files.
    Finalizing,
    /// The index has been written.
    Finalized,
    /// Something went wrong; the builder accepts nothing further.
    Failed,
}

/// Builds a fresh index in a storage directory.
#[derive(Debug)]
pub struct IndexBuilder {
    storage: Arc<dyn Storage>,
    config: IndexConfig,
    writer_config: WriterConfig,
    factory: Arc<PostingFactory>,
    state: BuilderState,
    next_address: Addr,
    tokens: Vec<TokenRecord>,
    annotations: Vec<Annotation>,
    pool: SpillPool,
    lock: Option<Box<dyn StorageLock>>,
    stats: Option<MergeStats>,
}

impl IndexBuilder {
    /// Start building an index with the given encoding and buffering.
    ///
    /// Holds the index write lock until finalized, failed or dropped.
    pub fn new(
        storage: Arc<dyn Storage>,
        config: IndexConfig,
        writer_config: WriterConfig,
    ) -> Result<Self> {
        config.validate()?;
        writer_config.validate()?;

        let factory = Arc::new(PostingFactory::from_config(&config)?);
        let lock = storage.lock_manager().acquire_lock(WRITE_LOCK)?;
        let pool = SpillPool::new(
            storage.clone(),
            factory.clone(),
            writer_config.effective_workers(),
        )?;

        Ok(IndexBuilder {
            storage,
            config,
            writer_config,
            factory,
            state: BuilderState::Open,
            next_address: 0,
            tokens: Vec::new(),
            annotations: Vec::new(),
            pool,
            lock: Some(lock),
            stats: None,
        })
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    /// Address the next token will receive.
    pub fn next_address(&self) -> Addr {
        self.next_address
    }

    /// Summary of the final merge, once finalized.
    pub fn stats(&self) -> Option<&MergeStats> {
        self.stats.as_ref()
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            BuilderState::Open => Ok(()),
            BuilderState::Finalized => Err(HopdexError::invalid_operation(
                "builder has already been finalized",
            )),
            BuilderState::Finalizing => Err(HopdexError::invalid_operation(
                "builder is being finalized",
            )),
            BuilderState::Failed => Err(HopdexError::invalid_operation("builder has failed")),
        }
    }

    /// Run `op`, moving the builder to `Failed` if it errors.
    fn guarded<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.ensure_open()?;
        let result = op(self);
        if let Err(e) = &result {
            warn!(error = %e, "index build failed");
            self.fail();
        }
        result
    }

    /// Append a text, one feature per token, at the next free addresses.
    ///
    /// Returns the span `(p, q)` the text occupies. An empty text returns
    /// `(next, next - 1)`.
    pub fn add_tokens(&mut self, features: &[Feature]) -> Result<(Addr, Addr)> {
        self.guarded(|builder| {
            let p = builder.next_address;
            for &feature in features {
                builder.tokens.push(TokenRecord {
                    feature,
                    address: builder.next_address,
                });
                builder.next_address += 1;
                if builder.tokens.len() >= builder.writer_config.token_buffer_records {
                    let batch = std::mem::take(&mut builder.tokens);
                    builder.pool.spill(SpillBatch::Tokens(batch))?;
                }
            }
            Ok((p, builder.next_address - 1))
        })
    }

    /// Attach `feature` with value `v` to the interval `[p, q]`.
    ///
    /// Intervals with `p < 0` or `p > q` are ignored.
    pub fn add_annotation(&mut self, feature: Feature, p: Addr, q: Addr, v: Fval) -> Result<()> {
        self.guarded(|builder| {
            let annotation = Annotation::new(feature, p, q, v);
            if !annotation.is_valid() {
                trace!(feature, p, q, "ignoring invalid annotation");
                return Ok(());
            }
            builder.annotations.push(annotation);
            if builder.annotations.len() >= builder.writer_config.annotation_buffer_records {
                let batch = std::mem::take(&mut builder.annotations);
                builder.pool.spill(SpillBatch::Annotations(batch))?;
            }
            Ok(())
        })
    }

    /// Write the index. Calling it again after success is a no-op.
    ///
    /// # Panics
    /// If the merged postings violate the ordering invariant, which can only
    /// happen through a bug in the builder.
    pub fn finalize(&mut self) -> Result<()> {
        if self.state == BuilderState::Finalized {
            return Ok(());
        }
        self.guarded(|builder| {
            builder.state = BuilderState::Finalizing;
            builder.write_index()
        })?;

        self.state = BuilderState::Finalized;
        if let Some(mut lock) = self.lock.take() {
            lock.release()?;
        }
        Ok(())
    }

    fn write_index(&mut self) -> Result<()> {
        let tokens = std::mem::take(&mut self.tokens);
        self.pool.spill(SpillBatch::Tokens(tokens))?;
        let annotations = std::mem::take(&mut self.annotations);
        self.pool.spill(SpillBatch::Annotations(annotations))?;
        self.pool.join()?;

        let inputs = self
            .pool
            .runs()
            .iter()
            .map(|run| self.storage.open_input(run))
            .collect::<Result<Vec<Box<dyn StorageInput>>>>()?;

        let (idx_temp, mut idx_out) = self.storage.create_temp_output(MERGE_PREFIX)?;
        let (pst_temp, mut pst_out) = match self.storage.create_temp_output(MERGE_PREFIX) {
            Ok(created) => created,
            Err(e) => {
                discard_files(self.storage.as_ref(), &[&idx_temp]);
                return Err(e);
            }
        };

        let merged = merge_streams(&self.factory, inputs, &mut idx_out, &mut pst_out)
            .and_then(|stats| {
                idx_out.close()?;
                pst_out.close()?;
                Ok(stats)
            });
        let stats = match merged {
            Ok(stats) => stats,
            Err(HopdexError::Invariant(msg)) => {
                discard_files(self.storage.as_ref(), &[&idx_temp, &pst_temp]);
                panic!("posting invariant violated while building index: {msg}");
            }
            Err(e) => {
                discard_files(self.storage.as_ref(), &[&idx_temp, &pst_temp]);
                return Err(e);
            }
        };

        let published = IndexManifest::new(self.config.clone())
            .store(self.storage.as_ref())
            .and_then(|_| self.storage.rename_file(&idx_temp, DICTIONARY_FILE))
            .and_then(|_| self.storage.rename_file(&pst_temp, POSTINGS_FILE));
        if let Err(e) = published {
            discard_files(self.storage.as_ref(), &[&idx_temp, &pst_temp]);
            return Err(e);
        }
        self.storage.sync()?;
        self.pool.delete_runs()?;

        info!(
            features = stats.features,
            intervals = stats.intervals,
            addresses = self.next_address,
            "index built"
        );
        self.stats = Some(stats);
        Ok(())
    }

    fn fail(&mut self) {
        self.state = BuilderState::Failed;
        self.tokens = Vec::new();
        self.annotations = Vec::new();
        self.pool.discard();
        self.lock = None;
    }
}

impl Drop for IndexBuilder {
    fn drop(&mut self) {
        if matches!(self.state, BuilderState::Open | BuilderState::Finalizing) {
            debug!("dropping unfinished index builder");
            self.pool.discard();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MANIFEST_FILE;
    use crate::index::config::ReaderConfig;
    use crate::index::reader::IndexReader;
    use crate::storage::{FileStorage, StorageConfig};
    use crate::types::Interval;
    use tempfile::TempDir;

    fn storage(temp_dir: &TempDir) -> Arc<dyn Storage> {
        Arc::new(FileStorage::new(temp_dir.path(), StorageConfig::default()).unwrap())
    }

    fn small_buffers(threads: usize) -> WriterConfig {
        WriterConfig {
            token_buffer_records: 3,
            annotation_buffer_records: 2,
            worker_threads: Some(threads),
        }
    }

    #[test]
    fn test_addresses_are_consecutive() {
        let temp_dir = TempDir::new().unwrap();
        let mut builder =
            IndexBuilder::new(storage(&temp_dir), IndexConfig::default(), small_buffers(0))
                .unwrap();

        assert_eq!(builder.add_tokens(&[10, 11, 10]).unwrap(), (0, 2));
        assert_eq!(builder.add_tokens(&[]).unwrap(), (3, 2));
        assert_eq!(builder.add_tokens(&[12]).unwrap(), (3, 3));
        assert_eq!(builder.next_address(), 4);
    }

    #[test]
    fn test_build_and_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir);
        let mut builder =
            IndexBuilder::new(storage.clone(), IndexConfig::default(), small_buffers(2)).unwrap();

        let (p, q) = builder.add_tokens(&[1, 2, 1, 3, 1, 2]).unwrap();
        builder.add_annotation(100, p, q, 1.0).unwrap();
        let (p, q) = builder.add_tokens(&[2, 2, 3]).unwrap();
        builder.add_annotation(100, p, q, 2.0).unwrap();
        builder.add_annotation(100, 9, 3, 5.0).unwrap(); // ignored
        builder.finalize().unwrap();

        assert_eq!(builder.state(), BuilderState::Finalized);
        let stats = builder.stats().unwrap().clone();
        assert_eq!(stats.features, 4);
        assert_eq!(stats.intervals, 3 + 4 + 2 + 2);
        builder.finalize().unwrap();

        let reader = IndexReader::open(storage.clone(), ReaderConfig::default()).unwrap();
        assert_eq!(reader.vocab(), 4);
        assert_eq!(reader.count(1).unwrap(), 3);
        assert_eq!(reader.count(2).unwrap(), 4);
        assert_eq!(reader.count(42).unwrap(), 0);

        let hopper = reader.hopper(100).unwrap();
        assert_eq!(hopper.tau(1), Interval::new(6, 8, 2.0));
        assert_eq!(hopper.rho(5), Interval::new(0, 5, 1.0));
        let hopper = reader.hopper(2).unwrap();
        assert_eq!(hopper.ohr(2), Interval::new(5, 5, 0.0));

        // Only the index files remain.
        assert_eq!(
            storage.list_files().unwrap(),
            vec![MANIFEST_FILE, DICTIONARY_FILE, POSTINGS_FILE]
        );
    }

    #[test]
    fn test_empty_build() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir);
        let mut builder =
            IndexBuilder::new(storage.clone(), IndexConfig::default(), WriterConfig::default())
                .unwrap();
        builder.finalize().unwrap();

        let reader = IndexReader::open(storage, ReaderConfig::default()).unwrap();
        assert_eq!(reader.vocab(), 0);
        assert_eq!(reader.hopper(1).unwrap().tau(0), Interval::PLUS_INFINITY);
    }

    #[test]
    fn test_only_one_writer() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir);
        let _builder =
            IndexBuilder::new(storage.clone(), IndexConfig::default(), small_buffers(0)).unwrap();
        assert!(matches!(
            IndexBuilder::new(storage, IndexConfig::default(), small_buffers(0)),
            Err(HopdexError::Transaction(_))
        ));
    }

    #[test]
    fn test_finalized_builder_rejects_input() {
        let temp_dir = TempDir::new().unwrap();
        let mut builder =
            IndexBuilder::new(storage(&temp_dir), IndexConfig::default(), small_buffers(0))
                .unwrap();
        builder.finalize().unwrap();
        assert!(matches!(
            builder.add_tokens(&[1]),
            Err(HopdexError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_failed_publish_removes_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir);
        let mut builder =
            IndexBuilder::new(storage.clone(), IndexConfig::default(), small_buffers(1)).unwrap();
        let (p, q) = builder.add_tokens(&[1, 2, 3, 1, 2]).unwrap();
        builder.add_annotation(9, p, q, 0.5).unwrap();

        // The merge succeeds but the manifest cannot be renamed into place.
        std::fs::create_dir(temp_dir.path().join(MANIFEST_FILE)).unwrap();
        assert!(builder.finalize().is_err());
        assert_eq!(builder.state(), BuilderState::Failed);

        assert!(storage.list_files().unwrap().is_empty());
        assert!(!storage.lock_manager().lock_exists(WRITE_LOCK));
    }

    #[test]
    fn test_interrupted_finalize_rejects_input_and_cleans_up() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir);
        {
            let mut builder =
                IndexBuilder::new(storage.clone(), IndexConfig::default(), small_buffers(0))
                    .unwrap();
            builder.add_tokens(&[4, 5, 6, 7]).unwrap();
            assert!(!storage.list_files().unwrap().is_empty());

            builder.state = BuilderState::Finalizing;
            assert!(matches!(
                builder.add_tokens(&[1]),
                Err(HopdexError::InvalidOperation(_))
            ));
        }
        assert!(storage.list_files().unwrap().is_empty());
    }

    #[test]
    fn test_failure_is_sticky() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir);
        let mut builder =
            IndexBuilder::new(storage.clone(), IndexConfig::default(), small_buffers(0)).unwrap();
        builder.add_tokens(&[1, 2]).unwrap();

        // Pull the directory out from under the builder so the next spill fails.
        std::fs::remove_dir_all(temp_dir.path()).unwrap();
        assert!(builder.add_tokens(&[3, 4]).is_err());
        assert_eq!(builder.state(), BuilderState::Failed);
        assert!(matches!(
            builder.add_annotation(1, 0, 1, 0.0),
            Err(HopdexError::InvalidOperation(_))
        ));
        assert!(builder.finalize().is_err());
    }

    #[test]
    fn test_invalid_config_rejected_before_any_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = storage(&temp_dir);
        let config = WriterConfig {
            annotation_buffer_records: 0,
            ..Default::default()
        };
        assert!(IndexBuilder::new(storage.clone(), IndexConfig::default(), config).is_err());
        assert!(storage.list_files().unwrap().is_empty());
    }
}
