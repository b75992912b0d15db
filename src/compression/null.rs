//! Identity compressor.

use crate::compression::{Compressor, check_length};
use crate::error::Result;

/// Stores bytes unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCompressor;

impl NullCompressor {
    pub fn new() -> Self {
        NullCompressor
    }
}

impl Compressor for NullCompressor {
    fn name(&self) -> &str {
        "null"
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        Ok(input.to_vec())
    }

    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        check_length(self.name(), input.len(), expected_len)?;
        Ok(input.to_vec())
    }

    fn extra(&self, _n: usize) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch() {
        let compressor = NullCompressor::new();
        assert!(compressor.decompress(b"abc", 4).is_err());
        assert_eq!(compressor.decompress(b"abc", 3).unwrap(), b"abc");
    }
}
