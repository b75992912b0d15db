//! Delta + variable-length compressor for address arrays.
//!
//! The input is read as little-endian 64-bit words. Each word is stored as
//! the zig-zag mapped difference from its predecessor, so sorted address
//! arrays compress to roughly one or two bytes per entry.

use byteorder::{ByteOrder, LittleEndian};

use crate::compression::{Compressor, check_length};
use crate::error::{HopdexError, Result};
use crate::util::varint::{decode_i64, encode_i64};

/// Compressor for sorted `i64` arrays.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostCompressor;

impl PostCompressor {
    pub fn new() -> Self {
        PostCompressor
    }
}

impl Compressor for PostCompressor {
    fn name(&self) -> &str {
        "post"
    }

    fn compress(&self, input: &[u8]) -> Result<Vec<u8>> {
        if input.len() % 8 != 0 {
            return Err(HopdexError::compression(format!(
                "post: input of {} bytes is not a whole number of words",
                input.len()
            )));
        }

        let mut output = Vec::with_capacity(input.len() / 4 + 2);
        let mut previous = 0i64;
        for word in input.chunks_exact(8) {
            let value = LittleEndian::read_i64(word);
            encode_i64(value.wrapping_sub(previous), &mut output);
            previous = value;
        }
        Ok(output)
    }

    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>> {
        let mut output = Vec::with_capacity(expected_len);
        let mut previous = 0i64;
        let mut offset = 0;
        let mut word = [0u8; 8];

        while offset < input.len() {
            let (delta, read) = decode_i64(&input[offset..])
                .map_err(|e| HopdexError::compression(format!("post: {e}")))?;
            offset += read;
            previous = previous.wrapping_add(delta);
            LittleEndian::write_i64(&mut word, previous);
            output.extend_from_slice(&word);
            if output.len() > expected_len {
                break;
            }
        }

        check_length(self.name(), output.len(), expected_len)?;
        Ok(output)
    }

    fn extra(&self, n: usize) -> usize {
        n / 4 + 2
    }
}
