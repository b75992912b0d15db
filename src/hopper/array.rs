//! Binary-search hopper over decoded posting arrays.

use std::sync::Arc;

use crate::hopper::{Hopper, backward_fixed_point, forward_fixed_point};
use crate::posting::PostingArrays;
use crate::types::{Addr, Interval};

/// Hopper over two or more intervals.
///
/// Both endpoint arrays are sorted, so every query is one partition point.
#[derive(Debug, Clone)]
pub struct ArrayHopper {
    arrays: Arc<PostingArrays>,
}

impl ArrayHopper {
    pub fn new(arrays: Arc<PostingArrays>) -> Self {
        ArrayHopper { arrays }
    }

    fn at_or_plus(&self, i: usize) -> Interval {
        if i < self.arrays.len() {
            self.arrays.interval(i)
        } else {
            Interval::PLUS_INFINITY
        }
    }

    fn before_or_minus(&self, i: usize) -> Interval {
        match i.checked_sub(1) {
            Some(j) => self.arrays.interval(j),
            None => Interval::MINUS_INFINITY,
        }
    }
}

impl Hopper for ArrayHopper {
    fn tau(&self, k: Addr) -> Interval {
        if let Some(fixed) = forward_fixed_point(k) {
            return fixed;
        }
        self.at_or_plus(self.arrays.starts.partition_point(|&p| p < k))
    }

    fn rho(&self, k: Addr) -> Interval {
        if let Some(fixed) = backward_fixed_point(k) {
            return fixed;
        }
        self.before_or_minus(self.arrays.starts.partition_point(|&p| p <= k))
    }

    fn uat(&self, k: Addr) -> Interval {
        if let Some(fixed) = backward_fixed_point(k) {
            return fixed;
        }
        self.before_or_minus(self.arrays.ends.partition_point(|&q| q <= k))
    }

    fn ohr(&self, k: Addr) -> Interval {
        if let Some(fixed) = forward_fixed_point(k) {
            return fixed;
        }
        self.at_or_plus(self.arrays.ends.partition_point(|&q| q < k))
    }
}
