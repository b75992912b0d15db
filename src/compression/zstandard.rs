//! Zstandard compressor for value arrays.

use zstd::bulk::{compress, decompress};

use crate::compression::{Compressor, check_length};
use crate::error::{HopdexError, Result};

/// Zstandard at a fixed level.
#[derive(Debug, Clone, Copy)]
pub struct ZstdCompressor {
    level: i32,
}

impl ZstdCompressor {
    /// Create a new compressor at `level` (1..=22).
    pub fn new(level: i32) -> Self {
        ZstdCompressor { level }
    }

    pub fn level(&self) -> i32 {
        self.level
    }
}

impl Compressor for ZstdCompressor {
    fn name(&self) -> &str {
        "zstd"
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }
        compress(input, self.level)
            .map_err(|e| HopdexError::compression(format!("zstd compress failed: {e}")))
    }

    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        if input.is_empty() {
            check_length(self.name(), 0, expected_len)?;
            return Ok(Vec::new());
        }
        let output = decompress(input, expected_len)
            .map_err(|e| HopdexError::compression(format!("zstd decompress failed: {e}")))?;
        check_length(self.name(), output.len(), expected_len)?;
        Ok(output)
    }

    fn extra(&self, n: usize) -> usize {
        zstd::zstd_safe::compress_bound(n).saturating_sub(n)
    }
}
