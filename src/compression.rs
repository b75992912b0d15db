//! Byte-array compressors for postings blocks.
//!
//! Each block stores three arrays (starts, ends, values), each compressed
//! independently. The set of compressors is closed: an index records the
//! [`CompressorKind`] it was written with in its manifest, and readers
//! rebuild the same compressors from it.

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{HopdexError, Result};

pub mod null;
pub mod post;
pub mod zstandard;

pub use null::NullCompressor;
pub use post::PostCompressor;
pub use zstandard::ZstdCompressor;

/// A byte-array compressor.
pub trait Compressor: Send + Sync + Debug {
    /// Name recorded for diagnostics.
    fn name(&self) -> &str;

    /// Compress `input`. Empty input compresses to empty output.
    fn compress(&self, input: &[u8]) -> Result<Vec<u8>>;

    /// Decompress `input`, which must expand to exactly `expected_len` bytes.
    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>>;

    /// Worst-case growth of an `n`-byte input.
    fn extra(&self, n: usize) -> usize;
}

/// The compressors an index can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompressorKind {
    /// Delta + variable-length coding of 64-bit addresses.
    Post,
    /// Zstandard at the given level.
    Zstd { level: i32 },
    /// Stored as-is.
    Null,
}

impl CompressorKind {
    /// Check that the kind can be instantiated.
    pub fn validate(&self) -> Result<()> {
        match self {
            CompressorKind::Zstd { level } if !(1..=22).contains(level) => Err(
                HopdexError::invalid_config(format!("zstd level {level} outside 1..=22")),
            ),
            _ => Ok(()),
        }
    }

    /// Instantiate the compressor.
    pub fn build(&self) -> Result<Arc<dyn Compressor>> {
        self.validate()?;
        Ok(match *self {
            CompressorKind::Post => Arc::new(PostCompressor::new()),
            CompressorKind::Zstd { level } => Arc::new(ZstdCompressor::new(level)),
            CompressorKind::Null => Arc::new(NullCompressor::new()),
        })
    }
}

pub(crate) fn check_length(name: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(HopdexError::compression(format!(
            "{name}: decompressed {actual} bytes, expected {expected}"
        )));
    }
    Ok(())
}
