//! The feature dictionary.
//!
//! The dictionary file is a packed array of `(feature: i64, end: i64)`
//! little-endian records sorted by feature. A feature's block occupies
//! `[previous end, end)` of the postings file; the first block starts at 0.

use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{HopdexError, Result};
use crate::storage::Storage;
use crate::types::Feature;

/// Size of one dictionary record.
pub const RECORD_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DictionaryEntry {
    pub feature: Feature,
    pub end: u64,
}

/// In-memory dictionary.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entries: Vec<DictionaryEntry>,
}

impl Dictionary {
    /// Load and check a dictionary file.
    pub fn load(storage: &dyn Storage, name: &str) -> Result<Self> {
        let mut input = storage.open_input(name)?;
        let mut bytes = Vec::with_capacity(input.size()? as usize);
        input.read_to_end(&mut bytes)?;
        Self::parse(&bytes)
    }

    /// Parse dictionary bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() % RECORD_SIZE != 0 {
            return Err(HopdexError::index(format!(
                "dictionary of {} bytes is not a whole number of records",
                bytes.len()
            )));
        }

        let mut entries = Vec::with_capacity(bytes.len() / RECORD_SIZE);
        let mut previous_end = 0u64;
        for record in bytes.chunks_exact(RECORD_SIZE) {
            let feature = LittleEndian::read_i64(&record[..8]);
            let raw_end = LittleEndian::read_i64(&record[8..]);
            let end = u64::try_from(raw_end)
                .ok()
                .filter(|&end| end >= previous_end)
                .ok_or_else(|| {
                    HopdexError::index(format!("feature {feature}: bad end offset {raw_end}"))
                })?;
            if let Some(last) = entries.last().map(|e: &DictionaryEntry| e.feature) {
                if last >= feature {
                    return Err(HopdexError::index(format!(
                        "dictionary not sorted: {last} before {feature}"
                    )));
                }
            }
            entries.push(DictionaryEntry { feature, end });
            previous_end = end;
        }

        Ok(Dictionary { entries })
    }

    /// Byte range of a feature's block in the postings file.
    pub fn locate(&self, feature: Feature) -> Option<(u64, u64)> {
        let i = self
            .entries
            .binary_search_by_key(&feature, |entry| entry.feature)
            .ok()?;
        let start = if i == 0 { 0 } else { self.entries[i - 1].end };
        Some((start, self.entries[i].end))
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// End of the last block, which is the expected postings file size.
    pub fn postings_len(&self) -> u64 {
        self.entries.last().map_or(0, |entry| entry.end)
    }

    /// Features in ascending order.
    pub fn features(&self) -> impl Iterator<Item = Feature> + '_ {
        self.entries.iter().map(|entry| entry.feature)
    }
}

/// Appends dictionary records while blocks are written in feature order.
#[derive(Debug)]
pub struct DictionaryWriter<W: Write> {
    writer: W,
    last_feature: Option<Feature>,
    records: usize,
}

impl<W: Write> DictionaryWriter<W> {
    pub fn new(writer: W) -> Self {
        DictionaryWriter {
            writer,
            last_feature: None,
            records: 0,
        }
    }

    /// Record that `feature`'s block ends at `end`.
    pub fn add(&mut self, feature: Feature, end: u64) -> Result<()> {
        if let Some(last) = self.last_feature {
            if last >= feature {
                return Err(HopdexError::index(format!(
                    "dictionary records out of order: {last} then {feature}"
                )));
            }
        }
        self.writer.write_i64::<LittleEndian>(feature)?;
        self.writer.write_i64::<LittleEndian>(end as i64)?;
        self.last_feature = Some(feature);
        self.records += 1;
        Ok(())
    }

    pub fn records(&self) -> usize {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
