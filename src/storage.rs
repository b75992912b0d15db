//! Storage abstraction for index files.
//!
//! An index lives in one directory and is made of a handful of named files
//! (dictionary, postings, manifest, lock, staged `.new` files and spill
//! runs). Components only see the [`Storage`] trait; [`FileStorage`] maps
//! names onto a filesystem directory.

pub mod file;
pub mod traits;

pub use file::FileStorage;
pub use traits::{
    LockManager, Storage, StorageConfig, StorageError, StorageInput, StorageLock, StorageOutput,
};
