//! K-way merge of feature-sorted block streams into a new index.
//!
//! Inputs are an existing postings file and/or spill runs; each is a
//! sequence of blocks in ascending feature order. For every feature, the
//! postings of all inputs that have it are merged in input order, checked,
//! and written as one block with its dictionary record.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::{Read, Write};

use tracing::info;

use crate::error::{HopdexError, Result};
use crate::index::dictionary::DictionaryWriter;
use crate::posting::{Posting, PostingFactory};

/// What a merge produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Input streams merged.
    pub runs: usize,
    /// Features written.
    pub features: usize,
    /// Intervals written.
    pub intervals: u64,
    /// Size of the postings written.
    pub bytes_written: u64,
}

struct Source<R> {
    input: R,
    head: Option<Posting>,
}

impl<R: Read> Source<R> {
    fn advance(&mut self, factory: &PostingFactory) -> Result<Option<Posting>> {
        let next = factory.read_posting(&mut self.input)?;
        if let (Some(current), Some(next)) = (&self.head, &next) {
            if next.feature() <= current.feature() {
                return Err(HopdexError::posting(format!(
                    "input stream not sorted: feature {} after {}",
                    next.feature(),
                    current.feature()
                )));
            }
        }
        Ok(std::mem::replace(&mut self.head, next))
    }
}

/// Merge `inputs` into a dictionary and postings stream.
///
/// Fails with [`HopdexError::Invariant`] if a merged posting is not a
/// strictly increasing, non-nesting list; nothing is guaranteed about the
/// outputs in that case.
pub fn merge_streams<R: Read, D: Write, P: Write>(
    factory: &PostingFactory,
    inputs: Vec<R>,
    dictionary: &mut D,
    postings: &mut P,
) -> Result<MergeStats> {
    let mut stats = MergeStats {
        runs: inputs.len(),
        ..Default::default()
    };
    let mut dictionary = DictionaryWriter::new(dictionary);

    let mut sources = Vec::with_capacity(inputs.len());
    let mut heap = BinaryHeap::with_capacity(inputs.len());
    for (index, input) in inputs.into_iter().enumerate() {
        let mut source = Source { input, head: None };
        source.advance(factory)?;
        if let Some(head) = &source.head {
            heap.push(Reverse((head.feature(), index)));
        }
        sources.push(source);
    }

    let mut offset = 0u64;
    let mut group = Vec::new();
    while let Some(Reverse((feature, first))) = heap.pop() {
        let mut members = vec![first];
        while let Some(Reverse((next_feature, index))) = heap.peek().copied() {
            if next_feature != feature {
                break;
            }
            heap.pop();
            members.push(index);
        }
        // Earlier inputs take precedence between identical intervals.
        members.sort_unstable();

        group.clear();
        for index in members {
            let source = &mut sources[index];
            if let Some(posting) = source.advance(factory)? {
                group.push(posting);
            }
            if let Some(head) = &source.head {
                heap.push(Reverse((head.feature(), index)));
            }
        }

        let Some(merged) = factory.merge(&group) else {
            continue;
        };
        merged.invariants()?;
        if merged.is_empty() {
            continue;
        }

        offset += factory.write_posting(&merged, postings)?;
        dictionary.add(feature, offset)?;
        stats.features += 1;
        stats.intervals += merged.len() as u64;
    }

    stats.bytes_written = offset;
    dictionary.into_inner().flush()?;
    postings.flush()?;
    info!(
        runs = stats.runs,
        features = stats.features,
        intervals = stats.intervals,
        bytes = stats.bytes_written,
        "merged postings"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::config::IndexConfig;
    use crate::index::dictionary::Dictionary;
    use crate::types::{Addr, Feature};

    fn factory() -> PostingFactory {
        PostingFactory::from_config(&IndexConfig::default()).unwrap()
    }

    fn stream(postings: &[(Feature, &[(Addr, Addr)])]) -> Vec<u8> {
        let factory = factory();
        let mut bytes = Vec::new();
        for &(feature, intervals) in postings {
            let mut posting = Posting::new(feature);
            for &(p, q) in intervals {
                posting.push(p, q, 0.0);
            }
            factory.write_posting(&posting, &mut bytes).unwrap();
        }
        bytes
    }

    fn decode(dictionary: &[u8], postings: &[u8]) -> Vec<(Feature, Vec<(Addr, Addr)>)> {
        let factory = factory();
        let dictionary = Dictionary::parse(dictionary).unwrap();
        dictionary
            .features()
            .map(|feature| {
                let (start, end) = dictionary.locate(feature).unwrap();
                let (_, arrays) = factory
                    .decode_block(&postings[start as usize..end as usize])
                    .unwrap();
                let intervals = (0..arrays.len())
                    .map(|i| (arrays.interval(i).p, arrays.interval(i).q))
                    .collect();
                (feature, intervals)
            })
            .collect()
    }

    #[test]
    fn test_merge_interleaves_features() {
        let a = stream(&[(1, &[(1, 1), (5, 5)]), (4, &[(2, 2)])]);
        let b = stream(&[(2, &[(3, 3)]), (4, &[(7, 7)])]);
        let c = stream(&[(1, &[(9, 9)]), (9, &[(6, 6)])]);

        let mut dictionary = Vec::new();
        let mut postings = Vec::new();
        let stats = merge_streams(
            &factory(),
            vec![a.as_slice(), b.as_slice(), c.as_slice()],
            &mut dictionary,
            &mut postings,
        )
        .unwrap();

        assert_eq!(stats.runs, 3);
        assert_eq!(stats.features, 4);
        assert_eq!(stats.intervals, 7);
        assert_eq!(stats.bytes_written, postings.len() as u64);
        assert_eq!(
            decode(&dictionary, &postings),
            vec![
                (1, vec![(1, 1), (5, 5), (9, 9)]),
                (2, vec![(3, 3)]),
                (4, vec![(2, 2), (7, 7)]),
                (9, vec![(6, 6)]),
            ]
        );
    }

    #[test]
    fn test_merge_of_nothing() {
        let mut dictionary = Vec::new();
        let mut postings = Vec::new();
        let stats = merge_streams::<&[u8], _, _>(&factory(), vec![], &mut dictionary, &mut postings)
            .unwrap();
        assert_eq!(stats, MergeStats::default());
        assert!(dictionary.is_empty() && postings.is_empty());
    }

    #[test]
    fn test_invariant_violation_is_reported() {
        let broken = stream(&[(3, &[(8, 8), (4, 4)])]);
        let extra = stream(&[(3, &[(10, 10)])]);
        let result = merge_streams(
            &factory(),
            vec![broken.as_slice(), extra.as_slice()],
            &mut Vec::<u8>::new(),
            &mut Vec::<u8>::new(),
        );
        assert!(matches!(result, Err(HopdexError::Invariant(_))));
    }

    #[test]
    fn test_unsorted_stream_is_rejected() {
        let unsorted = stream(&[(5, &[(1, 1)]), (2, &[(2, 2)])]);
        let result = merge_streams(
            &factory(),
            vec![unsorted.as_slice()],
            &mut Vec::<u8>::new(),
            &mut Vec::<u8>::new(),
        );
        assert!(matches!(result, Err(HopdexError::Posting(_))));
    }
}
