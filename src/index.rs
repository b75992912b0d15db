//! The on-disk index: dictionary + postings file, and the components that
//! read, build and update it.
//!
//! # Files
//!
//! | name | content |
//! |---|---|
//! | `idx` | dictionary: `(feature, end offset)` records sorted by feature |
//! | `pst` | postings: one block per feature, in dictionary order |
//! | `index.json` | manifest: the [`IndexConfig`] the index was built with |
//! | `pst.lock` | exclusive writer lock |
//! | `idx.new`, `pst.new` | staged replacements awaiting commit |
//! | `run_*.tmp`, `merge_*.tmp` | spill runs and merge output in progress |

use tracing::warn;

use crate::storage::Storage;

pub mod builder;
pub mod cache;
pub mod config;
pub mod dictionary;
pub mod manifest;
pub mod merge;
pub mod reader;
pub mod spill;
pub mod transaction;
pub mod updater;

pub use builder::{BuilderState, IndexBuilder};
pub use config::{IndexConfig, ReaderConfig, WriterConfig};
pub use merge::MergeStats;
pub use reader::IndexReader;
pub use transaction::Committable;
pub use updater::IndexUpdater;

/// Dictionary file name.
pub const DICTIONARY_FILE: &str = "idx";

/// Postings file name.
pub const POSTINGS_FILE: &str = "pst";

/// Manifest file name.
pub const MANIFEST_FILE: &str = "index.json";

/// Name of the lock held by builders and updaters.
pub const WRITE_LOCK: &str = "pst";

/// Name under which a replacement for `name` is staged before commit.
pub fn staged_name(name: &str) -> String {
    format!("{name}.new")
}

/// Delete temp files after a failed step, logging anything left behind.
pub(crate) fn discard_files(storage: &dyn Storage, names: &[&str]) {
    for name in names {
        if let Err(e) = storage.delete_file(name) {
            warn!(file = %name, error = %e, "could not delete temp file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStorage, StorageConfig};
    use tempfile::TempDir;

    #[test]
    fn test_staged_name() {
        assert_eq!(staged_name(POSTINGS_FILE), "pst.new");
    }

    #[test]
    fn test_discard_files_tolerates_missing() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FileStorage::new(temp_dir.path(), StorageConfig::default()).unwrap();
        let (name, mut output) = storage.create_temp_output("merge").unwrap();
        output.close().unwrap();

        discard_files(&storage, &[&name, "never_created.tmp"]);
        assert!(storage.list_files().unwrap().is_empty());
    }
}
