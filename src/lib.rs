//! # Hopdex
//!
//! A positional posting store for region-algebra retrieval.
//!
//! ## Features
//!
//! - Interval posting lists with lazily materialized ends and values
//! - Hoppers: `tau`, `rho`, `uat` and `ohr` navigation over a posting
//! - Compressed on-disk blocks (delta/varint and Zstandard)
//! - Bulk index building with external sort and parallel spills
//! - Transactional updates with a two-phase `ready()` / `commit()` protocol
//! - A reader cache that bounds memory spent on large posting lists
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use hopdex::index::{IndexBuilder, IndexConfig, IndexReader, ReaderConfig, WriterConfig};
//! use hopdex::storage::{FileStorage, Storage, StorageConfig};
//!
//! # fn main() -> hopdex::Result<()> {
//! let storage: Arc<dyn Storage> = Arc::new(FileStorage::new("./idx", StorageConfig::default())?);
//!
//! let mut builder = IndexBuilder::new(
//!     storage.clone(),
//!     IndexConfig::default(),
//!     WriterConfig::default(),
//! )?;
//! let (p, q) = builder.add_tokens(&[17, 42, 17])?;
//! builder.add_annotation(1000, p, q, 1.0)?;
//! builder.finalize()?;
//!
//! let reader = IndexReader::open(storage, ReaderConfig::default())?;
//! let hopper = reader.hopper(17)?;
//! assert_eq!(hopper.tau(1).p, 2);
//! # Ok(())
//! # }
//! ```

pub mod compression;
pub mod error;
pub mod hopper;
pub mod index;
pub mod posting;
pub mod storage;
pub mod types;
pub mod util;

pub use error::{HopdexError, Result};
pub use hopper::Hopper;
pub use posting::{Posting, PostingFactory};
pub use types::{Addr, Feature, Fval, Interval, MAXFINITY, MINFINITY};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
