//! Storage abstraction trait and common types.

use std::io::{Read, Seek, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{HopdexError, Result};

/// A trait for storage backends that can store and retrieve index files.
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Open a file for reading.
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>>;

    /// Create (or truncate) a file for writing.
    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>>;

    /// Check if a file exists.
    fn file_exists(&self, name: &str) -> bool;

    /// Delete a file. Deleting a missing file is not an error.
    fn delete_file(&self, name: &str) -> Result<()>;

    /// List all files, sorted by name.
    fn list_files(&self) -> Result<Vec<String>>;

    /// Get the size of a file in bytes.
    fn file_size(&self, name: &str) -> Result<u64>;

    /// Atomically replace `new_name` with `old_name`.
    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()>;

    /// Create a uniquely named temporary file with the given prefix.
    fn create_temp_output(&self, prefix: &str) -> Result<(String, Box<dyn StorageOutput>)>;

    /// Make completed renames and deletions durable.
    fn sync(&self) -> Result<()>;

    /// The lock manager guarding this storage.
    fn lock_manager(&self) -> Arc<dyn LockManager>;
}

/// A trait for reading data from storage.
pub trait StorageInput: Read + Seek + Send + std::fmt::Debug {
    /// Get the size of the input.
    fn size(&self) -> Result<u64>;
}

/// A trait for writing data to storage.
pub trait StorageOutput: Write + Send + std::fmt::Debug {
    /// Flush and sync data to storage.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Number of bytes written so far.
    fn position(&self) -> u64;

    /// Flush, sync and close the output.
    fn close(&mut self) -> Result<()>;
}

/// Exclusive named locks shared between processes.
pub trait LockManager: Send + Sync + std::fmt::Debug {
    /// Acquire a lock, failing with [`StorageError::LockFailed`] if it is held.
    fn acquire_lock(&self, name: &str) -> Result<Box<dyn StorageLock>>;

    /// Try to acquire a lock, returning `None` if it is held.
    fn try_acquire_lock(&self, name: &str) -> Result<Option<Box<dyn StorageLock>>>;

    /// Check whether a lock is currently held by anyone.
    fn lock_exists(&self, name: &str) -> bool;

    /// Remove a lock left behind by a crashed holder.
    fn break_lock(&self, name: &str) -> Result<()>;
}

/// A held lock. Dropping it releases the lock.
pub trait StorageLock: Send + std::fmt::Debug {
    /// Get the lock name.
    fn name(&self) -> &str;

    /// Release the lock.
    fn release(&mut self) -> Result<()>;

    /// Check if the lock is still held.
    fn is_valid(&self) -> bool;
}

/// Configuration for storage backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Buffer size for I/O operations.
    pub buffer_size: usize,

    /// Whether to flush every write immediately.
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            buffer_size: 65536, // 64KB buffer for better I/O performance
            sync_writes: false,
        }
    }
}

/// Error types specific to storage operations.
#[derive(Debug, Clone)]
pub enum StorageError {
    /// File not found.
    FileNotFound(String),

    /// I/O error.
    IoError(String),

    /// Lock acquisition failed.
    LockFailed(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::FileNotFound(name) => write!(f, "File not found: {name}"),
            StorageError::IoError(msg) => write!(f, "I/O error: {msg}"),
            StorageError::LockFailed(name) => write!(f, "Failed to acquire lock: {name}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<StorageError> for HopdexError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::LockFailed(_) => HopdexError::transaction(err.to_string()),
            _ => HopdexError::storage(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();

        assert_eq!(config.buffer_size, 65536);
        assert!(!config.sync_writes);
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::FileNotFound("idx".to_string());
        assert_eq!(err.to_string(), "File not found: idx");

        let err = StorageError::IoError("disk full".to_string());
        assert_eq!(err.to_string(), "I/O error: disk full");

        let err = StorageError::LockFailed("pst".to_string());
        assert_eq!(err.to_string(), "Failed to acquire lock: pst");
    }

    #[test]
    fn test_lock_failure_maps_to_transaction_error() {
        let err: HopdexError = StorageError::LockFailed("pst".to_string()).into();
        assert!(matches!(err, HopdexError::Transaction(_)));

        let err: HopdexError = StorageError::FileNotFound("idx".to_string()).into();
        assert!(matches!(err, HopdexError::Storage(_)));
    }
}
