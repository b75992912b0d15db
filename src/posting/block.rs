//! On-disk layout of one postings block.
//!
//! ```text
//! feature  i64
//! n        i64   number of intervals
//! pst_len  i64   compressed starts
//! qst_len  i64   compressed ends, 0 when every q == p
//! fst_len  i64   compressed values, 0 when the list has no values
//! [pst_len bytes][qst_len bytes][fst_len bytes]
//! ```
//!
//! All integers are little-endian.

use std::io::{ErrorKind, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{HopdexError, Result};
use crate::types::Feature;

/// Size of an encoded [`BlockHeader`].
pub const HEADER_SIZE: usize = 40;

/// Header preceding the compressed arrays of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub feature: Feature,
    pub n: u64,
    pub pst_len: u64,
    pub qst_len: u64,
    pub fst_len: u64,
}

impl BlockHeader {
    /// Length of the compressed arrays following the header.
    pub fn body_len(&self) -> u64 {
        self.pst_len
            .saturating_add(self.qst_len)
            .saturating_add(self.fst_len)
    }

    /// Length of the whole block, header included.
    pub fn block_len(&self) -> u64 {
        (HEADER_SIZE as u64).saturating_add(self.body_len())
    }

    /// Encode the header.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_i64::<LittleEndian>(self.feature)?;
        for field in [self.n, self.pst_len, self.qst_len, self.fst_len] {
            writer.write_i64::<LittleEndian>(field as i64)?;
        }
        Ok(())
    }

    /// Decode a header, returning `None` at a clean end of stream.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Option<Self>> {
        let mut bytes = [0u8; HEADER_SIZE];
        let mut filled = 0;
        while filled < HEADER_SIZE {
            match reader.read(&mut bytes[filled..]) {
                Ok(0) => break,
                Ok(read) => filled += read,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        match filled {
            0 => Ok(None),
            HEADER_SIZE => Self::parse(&bytes).map(Some),
            _ => Err(HopdexError::posting(format!(
                "truncated block header: {filled} of {HEADER_SIZE} bytes"
            ))),
        }
    }

    /// Decode a header from the front of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(HopdexError::posting(format!(
                "truncated block header: {} of {HEADER_SIZE} bytes",
                bytes.len()
            )));
        }

        let mut cursor = &bytes[..HEADER_SIZE];
        let feature = cursor.read_i64::<LittleEndian>()?;
        let mut fields = [0u64; 4];
        for field in fields.iter_mut() {
            let raw = cursor.read_i64::<LittleEndian>()?;
            *field = u64::try_from(raw).map_err(|_| {
                HopdexError::posting(format!("negative length {raw} in header of feature {feature}"))
            })?;
        }
        let [n, pst_len, qst_len, fst_len] = fields;

        let header = BlockHeader {
            feature,
            n,
            pst_len,
            qst_len,
            fst_len,
        };
        if header.n > 0 && header.pst_len == 0 {
            return Err(HopdexError::posting(format!(
                "feature {feature}: {n} intervals but no starts"
            )));
        }
        Ok(header)
    }

    /// Uncompressed length of one array of the block.
    pub fn array_len(&self) -> Result<usize> {
        usize::try_from(self.n)
            .ok()
            .and_then(|n| n.checked_mul(8))
            .ok_or_else(|| {
                HopdexError::posting(format!(
                    "feature {}: interval count {} too large",
                    self.feature, self.n
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> BlockHeader {
        BlockHeader {
            feature: -42,
            n: 3,
            pst_len: 5,
            qst_len: 0,
            fst_len: 11,
        }
    }

    #[test]
    fn test_header_layout() {
        let mut bytes = Vec::new();
        header().write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[..8], &(-42i64).to_le_bytes());
        assert_eq!(&bytes[32..40], &11i64.to_le_bytes());

        assert_eq!(BlockHeader::parse(&bytes).unwrap(), header());
        assert_eq!(header().block_len(), 56);
    }

    #[test]
    fn test_read_from_stream_end() {
        let mut empty: &[u8] = &[];
        assert!(BlockHeader::read_from(&mut empty).unwrap().is_none());

        let mut short: &[u8] = &[0u8; 17];
        assert!(BlockHeader::read_from(&mut short).is_err());
    }

    #[test]
    fn test_negative_length_rejected() {
        let mut bytes = Vec::new();
        header().write_to(&mut bytes).unwrap();
        bytes[16..24].copy_from_slice(&(-1i64).to_le_bytes());
        assert!(BlockHeader::parse(&bytes).is_err());
    }

    #[test]
    fn test_missing_starts_rejected() {
        let mut bytes = Vec::new();
        BlockHeader {
            pst_len: 0,
            ..header()
        }
        .write_to(&mut bytes)
        .unwrap();
        assert!(BlockHeader::parse(&bytes).is_err());
    }
}
