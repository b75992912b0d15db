//! Background spilling of full buffers into sorted runs.
//!
//! Builders and updaters hand full buffers to a [`SpillPool`]. Each buffer
//! becomes one run file: the records are sorted, turned into postings and
//! written as consecutive blocks in feature order. Run files are created
//! on the caller's thread, so run names (and their order) are known before
//! any worker touches them; workers only fill them in.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, bounded};
use tracing::{debug, warn};

use crate::error::{HopdexError, Result};
use crate::posting::PostingFactory;
use crate::storage::{Storage, StorageOutput};
use crate::types::{Annotation, TokenRecord};

/// Prefix of spill run files.
pub const RUN_PREFIX: &str = "run";

/// One full buffer.
#[derive(Debug)]
pub enum SpillBatch {
    Tokens(Vec<TokenRecord>),
    Annotations(Vec<Annotation>),
}

impl SpillBatch {
    pub fn len(&self) -> usize {
        match self {
            SpillBatch::Tokens(records) => records.len(),
            SpillBatch::Annotations(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug)]
struct SpillJob {
    name: String,
    output: Box<dyn StorageOutput>,
    batch: SpillBatch,
}

/// Sort a batch and write it out as a run.
fn write_run(factory: &PostingFactory, job: SpillJob) -> Result<()> {
    let SpillJob {
        name,
        mut output,
        batch,
    } = job;
    let records = batch.len();
    let mut postings = 0usize;

    match batch {
        SpillBatch::Tokens(mut tokens) => {
            tokens.sort_unstable();
            let mut cursor = tokens.as_slice();
            while let Some(posting) = factory.posting_from_tokens(&mut cursor) {
                factory.write_posting(&posting, &mut output)?;
                postings += 1;
            }
        }
        SpillBatch::Annotations(mut annotations) => {
            // Stable, so the first of two identical intervals keeps its value.
            annotations.sort_by_key(Annotation::key);
            let mut cursor = annotations.as_slice();
            while let Some(posting) = factory.posting_from_annotations(&mut cursor) {
                if !posting.is_empty() {
                    factory.write_posting(&posting, &mut output)?;
                    postings += 1;
                }
            }
        }
    }

    output.close()?;
    debug!(run = %name, records, postings, bytes = output.position(), "spilled run");
    Ok(())
}

/// A pool of spill workers, or an inline spiller when sized to zero.
#[derive(Debug)]
pub struct SpillPool {
    storage: Arc<dyn Storage>,
    factory: Arc<PostingFactory>,
    sender: Option<Sender<SpillJob>>,
    workers: Vec<JoinHandle<Result<()>>>,
    runs: Vec<String>,
}

impl SpillPool {
    /// Start `threads` workers. Zero workers spill on the caller's thread.
    pub fn new(
        storage: Arc<dyn Storage>,
        factory: Arc<PostingFactory>,
        threads: usize,
    ) -> Result<Self> {
        let mut pool = SpillPool {
            storage,
            factory,
            sender: None,
            workers: Vec::with_capacity(threads),
            runs: Vec::new(),
        };
        if threads == 0 {
            return Ok(pool);
        }

        let (sender, receiver) = bounded::<SpillJob>(threads);
        for worker_id in 0..threads {
            let receiver = receiver.clone();
            let factory = pool.factory.clone();
            let handle = thread::Builder::new()
                .name(format!("hopdex-spill-{worker_id}"))
                .spawn(move || -> Result<()> {
                    for job in receiver.iter() {
                        write_run(&factory, job)?;
                    }
                    Ok(())
                })?;
            pool.workers.push(handle);
        }
        pool.sender = Some(sender);
        Ok(pool)
    }

    /// Names of the runs created so far, in creation order.
    pub fn runs(&self) -> &[String] {
        &self.runs
    }

    /// Queue a batch to become a run.
    pub fn spill(&mut self, batch: SpillBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let (name, output) = self.storage.create_temp_output(RUN_PREFIX)?;
        self.runs.push(name.clone());
        let job = SpillJob {
            name,
            output,
            batch,
        };

        match &self.sender {
            None => write_run(&self.factory, job),
            Some(sender) => {
                if sender.send(job).is_err() {
                    // Every worker has exited, which only happens on error.
                    self.join()?;
                    return Err(HopdexError::other("spill workers stopped unexpectedly"));
                }
                Ok(())
            }
        }
    }

    /// Wait for every queued run to be written and report the first failure.
    pub fn join(&mut self) -> Result<()> {
        self.sender = None;
        let mut first_error = None;
        for handle in self.workers.drain(..) {
            let outcome = handle
                .join()
                .map_err(|_| HopdexError::ThreadJoinError("spill worker panicked".to_string()))
                .and_then(|result| result);
            if let Err(e) = outcome {
                warn!(error = %e, "spill worker failed");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Stop the workers and delete every run, ignoring failures.
    pub fn discard(&mut self) {
        if let Err(e) = self.join() {
            debug!(error = %e, "discarding runs of a failed spill");
        }
        for run in self.runs.drain(..) {
            if let Err(e) = self.storage.delete_file(&run) {
                warn!(run = %run, error = %e, "could not delete run");
            }
        }
    }

    /// Delete runs that have been merged.
    pub fn delete_runs(&mut self) -> Result<()> {
        for run in self.runs.drain(..) {
            self.storage.delete_file(&run)?;
        }
        Ok(())
    }
}

impl Drop for SpillPool {
    fn drop(&mut self) {
        self.sender = None;
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::config::IndexConfig;
    use crate::storage::{FileStorage, StorageConfig};
    use tempfile::TempDir;

    fn setup(threads: usize) -> (TempDir, Arc<dyn Storage>, SpillPool) {
        let temp_dir = TempDir::new().unwrap();
        let storage: Arc<dyn Storage> =
            Arc::new(FileStorage::new(temp_dir.path(), StorageConfig::default()).unwrap());
        let factory = Arc::new(PostingFactory::from_config(&IndexConfig::default()).unwrap());
        let pool = SpillPool::new(storage.clone(), factory, threads).unwrap();
        (temp_dir, storage, pool)
    }

    fn read_run(storage: &dyn Storage, name: &str) -> Vec<(i64, Vec<(i64, i64)>)> {
        let factory = PostingFactory::from_config(&IndexConfig::default()).unwrap();
        let mut input = storage.open_input(name).unwrap();
        let mut postings = Vec::new();
        while let Some(posting) = factory.read_posting(&mut input).unwrap() {
            postings.push((
                posting.feature(),
                posting.iter().map(|i| (i.p, i.q)).collect(),
            ));
        }
        postings
    }

    #[test]
    fn test_inline_token_run_is_sorted() {
        let (_temp_dir, storage, mut pool) = setup(0);
        let tokens = [(5, 0), (2, 1), (5, 2), (2, 3)]
            .into_iter()
            .map(|(feature, address)| TokenRecord { feature, address })
            .collect();
        pool.spill(SpillBatch::Tokens(tokens)).unwrap();
        pool.join().unwrap();

        assert_eq!(pool.runs().len(), 1);
        let run = read_run(storage.as_ref(), &pool.runs()[0]);
        assert_eq!(
            run,
            vec![(2, vec![(1, 1), (3, 3)]), (5, vec![(0, 0), (2, 2)])]
        );
    }

    #[test]
    fn test_threaded_runs_keep_creation_order() {
        let (_temp_dir, storage, mut pool) = setup(3);
        for i in 0..8i64 {
            let batch = vec![Annotation::new(i % 2, i * 10, i * 10 + 5, 1.0)];
            pool.spill(SpillBatch::Annotations(batch)).unwrap();
        }
        pool.spill(SpillBatch::Annotations(Vec::new())).unwrap();
        pool.join().unwrap();

        assert_eq!(pool.runs().len(), 8);
        for (i, name) in pool.runs().iter().enumerate() {
            let run = read_run(storage.as_ref(), name);
            let i = i as i64;
            assert_eq!(run, vec![(i % 2, vec![(i * 10, i * 10 + 5)])]);
        }
    }

    #[test]
    fn test_discard_removes_runs() {
        let (_temp_dir, storage, mut pool) = setup(2);
        pool.spill(SpillBatch::Tokens(vec![TokenRecord {
            feature: 1,
            address: 1,
        }]))
        .unwrap();
        pool.discard();
        assert!(pool.runs().is_empty());
        assert!(storage.list_files().unwrap().is_empty());
    }
}
