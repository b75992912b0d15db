//! Posting lists.
//!
//! A posting is the sorted interval list of one feature: parallel arrays of
//! starts, ends and values. The end array is materialized only once some
//! interval has `p != q`, the value array only once some value is non-zero.
//! A well-formed posting is strictly increasing in both `p` and `q`, so no
//! interval nests inside another.

use std::sync::Arc;

use crate::error::{HopdexError, Result};
use crate::hopper::{self, Hopper};
use crate::types::{Addr, Feature, Fval, Interval};

pub mod block;
pub mod factory;

pub use block::BlockHeader;
pub use factory::PostingFactory;

/// The interval list of one feature.
#[derive(Debug, Clone)]
pub struct Posting {
    feature: Feature,
    starts: Vec<Addr>,
    /// Empty while every interval has `q == p`.
    ends: Vec<Addr>,
    /// Empty while every value is zero.
    values: Vec<Fval>,
}

impl Posting {
    /// Create a new empty posting for a feature.
    pub fn new(feature: Feature) -> Self {
        Posting {
            feature,
            starts: Vec::new(),
            ends: Vec::new(),
            values: Vec::new(),
        }
    }

    pub(crate) fn from_parts(
        feature: Feature,
        starts: Vec<Addr>,
        ends: Option<Vec<Addr>>,
        values: Option<Vec<Fval>>,
    ) -> Self {
        Posting {
            feature,
            starts,
            ends: ends.unwrap_or_default(),
            values: values.unwrap_or_default(),
        }
    }

    /// The feature this posting belongs to.
    pub fn feature(&self) -> Feature {
        self.feature
    }

    /// Number of intervals.
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Interval starts.
    pub fn starts(&self) -> &[Addr] {
        &self.starts
    }

    /// Interval ends. Equal to [`starts`](Self::starts) for token postings.
    pub fn ends(&self) -> &[Addr] {
        if self.ends.is_empty() {
            &self.starts
        } else {
            &self.ends
        }
    }

    /// Interval values, if any were ever set.
    pub fn values(&self) -> Option<&[Fval]> {
        if self.values.is_empty() {
            None
        } else {
            Some(&self.values)
        }
    }

    /// Whether some interval spans more than one address.
    pub fn has_distinct_ends(&self) -> bool {
        self.ends.iter().zip(&self.starts).any(|(q, p)| q != p)
    }

    /// Whether some interval carries a non-zero value.
    pub fn has_values(&self) -> bool {
        self.values.iter().any(|&v| v != 0.0)
    }

    /// The `i`th interval.
    pub fn get(&self, i: usize) -> Option<Interval> {
        let p = *self.starts.get(i)?;
        let q = if self.ends.is_empty() { p } else { self.ends[i] };
        let v = if self.values.is_empty() {
            0.0
        } else {
            self.values[i]
        };
        Some(Interval { p, q, v })
    }

    pub fn first(&self) -> Option<Interval> {
        self.get(0)
    }

    pub fn last(&self) -> Option<Interval> {
        self.len().checked_sub(1).and_then(|i| self.get(i))
    }

    /// Iterate over the intervals in order.
    pub fn iter(&self) -> impl Iterator<Item = Interval> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// Append one interval without any ordering check.
    pub fn push(&mut self, p: Addr, q: Addr, v: Fval) {
        let with_ends = p != q || !self.ends.is_empty();
        let with_values = v != 0.0 || !self.values.is_empty();
        if with_ends && self.ends.is_empty() {
            self.ends = self.starts.clone();
        }
        if with_values && self.values.is_empty() {
            self.values = vec![0.0; self.starts.len()];
        }
        self.starts.push(p);
        if with_ends {
            self.ends.push(q);
        }
        if with_values {
            self.values.push(v);
        }
    }

    /// Append one interval while keeping the list free of nesting.
    ///
    /// Input must arrive ordered by start. An interval that contains (or
    /// equals) the last kept interval with the same start is dropped; kept
    /// intervals that contain the new one are removed first. An interval
    /// that starts before the last kept one is pushed as-is so that
    /// [`invariants`](Self::invariants) reports the disorder.
    pub(crate) fn push_reduced(&mut self, p: Addr, q: Addr, v: Fval) {
        while let Some(last) = self.last() {
            if p < last.p {
                break;
            }
            if p == last.p && q >= last.q {
                return;
            }
            if last.q >= q {
                self.pop();
            } else {
                break;
            }
        }
        self.push(p, q, v);
    }

    fn pop(&mut self) {
        self.starts.pop();
        if !self.ends.is_empty() {
            self.ends.pop();
        }
        if !self.values.is_empty() {
            self.values.pop();
        }
    }

    /// Concatenate another posting of the same feature onto this one.
    pub fn append(&mut self, other: &Posting) {
        debug_assert_eq!(self.feature, other.feature);

        let with_ends = !self.ends.is_empty() || !other.ends.is_empty();
        let with_values = !self.values.is_empty() || !other.values.is_empty();
        if with_ends && self.ends.is_empty() {
            self.ends = self.starts.clone();
        }
        if with_values && self.values.is_empty() {
            self.values = vec![0.0; self.starts.len()];
        }

        self.starts.extend_from_slice(&other.starts);
        if with_ends {
            self.ends.extend_from_slice(other.ends());
        }
        if with_values {
            match other.values() {
                Some(values) => self.values.extend_from_slice(values),
                None => self.values.resize(self.starts.len(), 0.0),
            }
        }
    }

    /// Check that the arrays agree in length and that both endpoints are
    /// strictly increasing with `p <= q` everywhere.
    pub fn invariants(&self) -> Result<()> {
        let n = self.starts.len();
        if !self.ends.is_empty() && self.ends.len() != n {
            return Err(HopdexError::invariant(format!(
                "feature {}: {} starts but {} ends",
                self.feature,
                n,
                self.ends.len()
            )));
        }
        if !self.values.is_empty() && self.values.len() != n {
            return Err(HopdexError::invariant(format!(
                "feature {}: {} starts but {} values",
                self.feature,
                n,
                self.values.len()
            )));
        }

        let ends = self.ends();
        for i in 0..n {
            if self.starts[i] > ends[i] {
                return Err(HopdexError::invariant(format!(
                    "feature {}: interval {} has p {} > q {}",
                    self.feature, i, self.starts[i], ends[i]
                )));
            }
            if i > 0 && self.starts[i - 1] >= self.starts[i] {
                return Err(HopdexError::invariant(format!(
                    "feature {}: p not increasing at {}",
                    self.feature, i
                )));
            }
            if i > 0 && ends[i - 1] >= ends[i] {
                return Err(HopdexError::invariant(format!(
                    "feature {}: q not increasing at {}",
                    self.feature, i
                )));
            }
        }
        Ok(())
    }

    /// A hopper over this posting's intervals.
    pub fn hopper(&self) -> Box<dyn Hopper> {
        hopper::from_arrays(Arc::new(PostingArrays::from(self)))
    }
}

impl PartialEq for Posting {
    fn eq(&self, other: &Self) -> bool {
        self.feature == other.feature
            && self.len() == other.len()
            && self.iter().eq(other.iter())
    }
}

/// Immutable, shareable arrays of a decoded posting list.
///
/// This is what the reader caches and what array hoppers search.
#[derive(Debug, Clone)]
pub struct PostingArrays {
    pub starts: Arc<[Addr]>,
    /// Shares the allocation of `starts` when every interval has `q == p`.
    pub ends: Arc<[Addr]>,
    pub values: Option<Arc<[Fval]>>,
}

impl PostingArrays {
    pub(crate) fn new(starts: Vec<Addr>, ends: Option<Vec<Addr>>, values: Option<Vec<Fval>>) -> Self {
        let starts: Arc<[Addr]> = starts.into();
        let ends = match ends {
            Some(ends) => ends.into(),
            None => starts.clone(),
        };
        PostingArrays {
            starts,
            ends,
            values: values.map(Into::into),
        }
    }

    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// The `i`th interval. Panics when out of range.
    #[inline]
    pub fn interval(&self, i: usize) -> Interval {
        Interval {
            p: self.starts[i],
            q: self.ends[i],
            v: self.values.as_ref().map_or(0.0, |values| values[i]),
        }
    }

    /// Decompressed bytes held by these arrays.
    pub fn memory_size(&self) -> usize {
        let word = std::mem::size_of::<Addr>();
        let mut size = self.starts.len() * word;
        if !Arc::ptr_eq(&self.starts, &self.ends) {
            size += self.ends.len() * word;
        }
        if let Some(values) = &self.values {
            size += values.len() * std::mem::size_of::<Fval>();
        }
        size
    }
}

impl From<&Posting> for PostingArrays {
    fn from(posting: &Posting) -> Self {
        PostingArrays::new(
            posting.starts.clone(),
            posting.has_distinct_ends().then(|| posting.ends.clone()),
            posting.has_values().then(|| posting.values.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn posting(feature: Feature, intervals: &[(Addr, Addr, Fval)]) -> Posting {
        let mut posting = Posting::new(feature);
        for &(p, q, v) in intervals {
            posting.push(p, q, v);
        }
        posting
    }

    #[test]
    fn test_push_materializes_lazily() {
        let mut posting = Posting::new(7);
        posting.push(1, 1, 0.0);
        posting.push(4, 4, 0.0);
        assert!(posting.values().is_none());
        assert!(!posting.has_distinct_ends());
        assert_eq!(posting.ends(), &[1, 4]);

        posting.push(6, 9, 2.5);
        assert!(posting.has_distinct_ends());
        assert_eq!(posting.ends(), &[1, 4, 9]);
        assert_eq!(posting.values().unwrap(), &[0.0, 0.0, 2.5]);
        assert_eq!(posting.get(2), Some(Interval::new(6, 9, 2.5)));
        assert_eq!(posting.get(3), None);
        assert!(posting.invariants().is_ok());
    }

    #[test]
    fn test_append_mixed_representations() {
        let mut tokens = posting(3, &[(1, 1, 0.0), (2, 2, 0.0)]);
        let spans = posting(3, &[(5, 8, 1.0)]);
        tokens.append(&spans);

        let intervals: Vec<_> = tokens.iter().collect();
        assert_eq!(
            intervals,
            vec![
                Interval::new(1, 1, 0.0),
                Interval::new(2, 2, 0.0),
                Interval::new(5, 8, 1.0)
            ]
        );

        let mut spans = posting(3, &[(1, 3, 1.0)]);
        spans.append(&posting(3, &[(4, 4, 0.0)]));
        assert_eq!(spans.last(), Some(Interval::new(4, 4, 0.0)));
        assert!(spans.invariants().is_ok());
    }

    #[test]
    fn test_invariants_reject_disorder() {
        assert!(posting(1, &[(5, 5, 0.0), (3, 3, 0.0)]).invariants().is_err());
        assert!(posting(1, &[(5, 4, 0.0)]).invariants().is_err());
        assert!(posting(1, &[(1, 1, 0.0), (1, 1, 0.0)]).invariants().is_err());
    }

    #[test]
    fn test_invariants_require_strictly_increasing_ends() {
        // Overlapping intervals sharing an end point nest; a non-strict
        // check on q would accept this list.
        let shared_end = posting(1, &[(1, 5, 0.0), (2, 5, 0.0)]);
        assert!(shared_end.invariants().is_err());

        let overlapping = posting(1, &[(1, 5, 0.0), (2, 6, 0.0)]);
        assert!(overlapping.invariants().is_ok());
    }

    #[test]
    fn test_push_reduced_removes_nesting() {
        let mut reduced = Posting::new(1);
        for (p, q) in [(1, 10), (1, 12), (2, 4), (3, 4), (3, 9), (6, 7), (8, 20)] {
            reduced.push_reduced(p, q, 0.0);
        }
        let kept: Vec<_> = reduced.iter().map(|i| (i.p, i.q)).collect();
        assert_eq!(kept, vec![(3, 4), (6, 7), (8, 20)]);
        assert!(reduced.invariants().is_ok());
    }

    #[test]
    fn test_push_reduced_keeps_first_duplicate() {
        let mut reduced = Posting::new(1);
        reduced.push_reduced(2, 3, 1.0);
        reduced.push_reduced(2, 3, 9.0);
        assert_eq!(reduced.len(), 1);
        assert_eq!(reduced.get(0).unwrap().v, 1.0);
    }

    #[test]
    fn test_push_reduced_passes_disorder_through() {
        let mut reduced = Posting::new(1);
        reduced.push_reduced(10, 10, 0.0);
        reduced.push_reduced(5, 5, 0.0);
        assert_eq!(reduced.len(), 2);
        assert!(reduced.invariants().is_err());
    }

    #[test]
    fn test_equality_ignores_representation() {
        let mut materialized = posting(2, &[(1, 3, 1.0), (4, 4, 0.0)]);
        materialized.push_reduced(4, 9, 0.0); // dropped: contains (4,4)
        let mut plain = Posting::new(2);
        plain.push(1, 3, 1.0);
        plain.push(4, 4, 0.0);
        assert_eq!(materialized, plain);
        assert_ne!(plain, Posting::new(2));
    }

    #[test]
    fn test_arrays_share_starts_for_tokens() {
        let tokens = posting(1, &[(1, 1, 0.0), (2, 2, 0.0)]);
        let arrays = PostingArrays::from(&tokens);
        assert!(Arc::ptr_eq(&arrays.starts, &arrays.ends));
        assert_eq!(arrays.memory_size(), 16);
        assert!(arrays.values.is_none());

        let spans = posting(1, &[(1, 2, 0.5), (3, 4, 0.0)]);
        let arrays = PostingArrays::from(&spans);
        assert_eq!(arrays.memory_size(), 48);
        assert_eq!(arrays.interval(0), Interval::new(1, 2, 0.5));
    }
}
