//! Construction, merging and serialization of postings.
//!
//! The factory owns the compressors an index was configured with. Every
//! component that reads or writes blocks goes through one, so a block is
//! always decoded with the compressors that encoded it.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};

use crate::compression::Compressor;
use crate::error::{HopdexError, Result};
use crate::index::config::IndexConfig;
use crate::posting::block::{BlockHeader, HEADER_SIZE};
use crate::posting::{Posting, PostingArrays};
use crate::types::{Addr, Annotation, Feature, Fval, TokenRecord};

/// Builds, merges and (de)serializes postings.
#[derive(Debug, Clone)]
pub struct PostingFactory {
    posting_compressor: Arc<dyn Compressor>,
    value_compressor: Arc<dyn Compressor>,
}

/// Decoded block contents before they are shaped into a posting.
type DecodedArrays = (Vec<Addr>, Option<Vec<Addr>>, Option<Vec<Fval>>);

impl PostingFactory {
    /// Create a factory from explicit compressors for addresses and values.
    pub fn new(
        posting_compressor: Arc<dyn Compressor>,
        value_compressor: Arc<dyn Compressor>,
    ) -> Self {
        PostingFactory {
            posting_compressor,
            value_compressor,
        }
    }

    /// Create a factory for an index configuration.
    pub fn from_config(config: &IndexConfig) -> Result<Self> {
        Ok(PostingFactory::new(
            config.posting_compressor.build()?,
            config.value_compressor.build()?,
        ))
    }

    /// An empty posting for `feature`.
    pub fn posting_from_feature(&self, feature: Feature) -> Posting {
        Posting::new(feature)
    }

    /// Build a posting from the leading same-feature run of sorted token
    /// records, advancing `records` past the run. Repeated addresses
    /// collapse to one entry.
    pub fn posting_from_tokens(&self, records: &mut &[TokenRecord]) -> Option<Posting> {
        let feature = records.first()?.feature;
        let run = records
            .iter()
            .position(|record| record.feature != feature)
            .unwrap_or(records.len());
        let (head, tail) = records.split_at(run);
        *records = tail;

        let mut posting = Posting::new(feature);
        let mut previous = None;
        for record in head {
            debug_assert!(previous.is_none_or(|p| p <= record.address));
            if previous != Some(record.address) {
                posting.push(record.address, record.address, 0.0);
                previous = Some(record.address);
            }
        }
        Some(posting)
    }

    /// Build a posting from the leading same-feature run of annotations
    /// sorted by `(feature, p, q)`, advancing `records` past the run.
    /// Invalid intervals are skipped and nesting intervals are reduced.
    pub fn posting_from_annotations(&self, records: &mut &[Annotation]) -> Option<Posting> {
        let feature = records.first()?.feature;
        let run = records
            .iter()
            .position(|record| record.feature != feature)
            .unwrap_or(records.len());
        let (head, tail) = records.split_at(run);
        *records = tail;

        let mut posting = Posting::new(feature);
        for annotation in head.iter().filter(|a| a.p <= a.q) {
            posting.push_reduced(annotation.p, annotation.q, annotation.v);
        }
        Some(posting)
    }

    /// Merge postings of one feature into one.
    ///
    /// A single source is returned unchanged. When the sources are already
    /// in order end to end they are concatenated; otherwise their intervals
    /// are interleaved by `(p, q)` and reduced so that nothing nests.
    /// Between exact duplicates the earlier source wins. The result is not
    /// checked: callers run [`Posting::invariants`] on it.
    pub fn merge(&self, sources: &[Posting]) -> Option<Posting> {
        let (first, rest) = sources.split_first()?;
        if rest.is_empty() {
            return Some(first.clone());
        }
        let feature = first.feature();

        let nonempty: Vec<&Posting> = sources.iter().filter(|s| !s.is_empty()).collect();
        let in_order = nonempty.windows(2).all(|pair| {
            match (pair[0].last(), pair[1].first()) {
                (Some(a), Some(b)) => a.p < b.p && a.q < b.q,
                _ => true,
            }
        });

        let mut merged = Posting::new(feature);
        if in_order {
            for source in nonempty {
                merged.append(source);
            }
            return Some(merged);
        }

        let mut heap = BinaryHeap::with_capacity(nonempty.len());
        for (source, posting) in nonempty.iter().enumerate() {
            if let Some(head) = posting.first() {
                heap.push(Reverse((head.p, head.q, source, 0usize)));
            }
        }
        while let Some(Reverse((_, _, source, index))) = heap.pop() {
            let posting = nonempty[source];
            if let Some(interval) = posting.get(index) {
                merged.push_reduced(interval.p, interval.q, interval.v);
            }
            if let Some(next) = posting.get(index + 1) {
                heap.push(Reverse((next.p, next.q, source, index + 1)));
            }
        }
        Some(merged)
    }

    /// Serialize `posting` as one block, returning the number of bytes written.
    pub fn write_posting<W: Write>(&self, posting: &Posting, writer: &mut W) -> Result<u64> {
        let pst = self.posting_compressor.compress(&encode_words(posting.starts()))?;
        let qst = if posting.has_distinct_ends() {
            self.posting_compressor.compress(&encode_words(posting.ends()))?
        } else {
            Vec::new()
        };
        let fst = match posting.values() {
            Some(values) if posting.has_values() => {
                let mut bytes = vec![0u8; values.len() * 8];
                LittleEndian::write_f64_into(values, &mut bytes);
                self.value_compressor.compress(&bytes)?
            }
            _ => Vec::new(),
        };

        let header = BlockHeader {
            feature: posting.feature(),
            n: posting.len() as u64,
            pst_len: pst.len() as u64,
            qst_len: qst.len() as u64,
            fst_len: fst.len() as u64,
        };
        header.write_to(writer)?;
        writer.write_all(&pst)?;
        writer.write_all(&qst)?;
        writer.write_all(&fst)?;

        Ok(header.block_len())
    }

    /// Read the next block from a sequential stream, or `None` at its end.
    pub fn read_posting<R: Read>(&self, reader: &mut R) -> Result<Option<Posting>> {
        let Some(header) = BlockHeader::read_from(reader)? else {
            return Ok(None);
        };

        let body_len = usize::try_from(header.body_len())
            .map_err(|_| HopdexError::posting("block body too large"))?;
        let mut body = vec![0u8; body_len];
        reader.read_exact(&mut body).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                HopdexError::posting(format!(
                    "feature {}: truncated block body, expected {body_len} bytes",
                    header.feature
                ))
            } else {
                HopdexError::from(e)
            }
        })?;

        let (starts, ends, values) = self.decode_body(&header, &body)?;
        Ok(Some(Posting::from_parts(header.feature, starts, ends, values)))
    }

    /// Decode a whole block held in memory.
    pub fn decode_block(&self, bytes: &[u8]) -> Result<(BlockHeader, PostingArrays)> {
        let header = BlockHeader::parse(bytes)?;
        if (bytes.len() as u64) < header.block_len() {
            return Err(HopdexError::posting(format!(
                "feature {}: block of {} bytes shorter than its header claims ({})",
                header.feature,
                bytes.len(),
                header.block_len()
            )));
        }
        let (starts, ends, values) = self.decode_body(&header, &bytes[HEADER_SIZE..])?;
        Ok((header, PostingArrays::new(starts, ends, values)))
    }

    fn decode_body(&self, header: &BlockHeader, body: &[u8]) -> Result<DecodedArrays> {
        let array_len = header.array_len()?;
        let n = array_len / 8;
        let (pst, rest) = body.split_at(header.pst_len as usize);
        let (qst, fst) = rest.split_at(header.qst_len as usize);
        let fst = &fst[..header.fst_len as usize];

        let starts = decode_words(&self.posting_compressor.decompress(pst, array_len)?, n);
        let ends = if qst.is_empty() {
            None
        } else {
            Some(decode_words(
                &self.posting_compressor.decompress(qst, array_len)?,
                n,
            ))
        };
        let values = if fst.is_empty() {
            None
        } else {
            let bytes = self.value_compressor.decompress(fst, array_len)?;
            let mut values = vec![0.0; n];
            LittleEndian::read_f64_into(&bytes, &mut values);
            Some(values)
        };

        Ok((starts, ends, values))
    }
}

fn encode_words(words: &[Addr]) -> Vec<u8> {
    let mut bytes = vec![0u8; words.len() * 8];
    LittleEndian::write_i64_into(words, &mut bytes);
    bytes
}

fn decode_words(bytes: &[u8], n: usize) -> Vec<Addr> {
    let mut words = vec![0; n];
    LittleEndian::read_i64_into(bytes, &mut words);
    words
}
