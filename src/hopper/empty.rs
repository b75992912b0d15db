//! Hopper over an empty list.

use crate::hopper::{Hopper, backward_fixed_point, forward_fixed_point};
use crate::types::{Addr, Interval};

/// Every query runs off the end of the list.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyHopper;

impl Hopper for EmptyHopper {
    fn tau(&self, k: Addr) -> Interval {
        forward_fixed_point(k).unwrap_or(Interval::PLUS_INFINITY)
    }

    fn rho(&self, k: Addr) -> Interval {
        backward_fixed_point(k).unwrap_or(Interval::MINUS_INFINITY)
    }

    fn uat(&self, k: Addr) -> Interval {
        backward_fixed_point(k).unwrap_or(Interval::MINUS_INFINITY)
    }

    fn ohr(&self, k: Addr) -> Interval {
        forward_fixed_point(k).unwrap_or(Interval::PLUS_INFINITY)
    }
}
