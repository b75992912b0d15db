//! Hoppers: navigation over a posting list.
//!
//! A hopper answers four nearest-neighbour queries over a strictly
//! increasing, non-nesting interval list:
//!
//! * `tau(k)`: the first interval with `p >= k`, else `+inf`
//! * `rho(k)`: the last interval with `p <= k`, else `-inf`
//! * `uat(k)`: the last interval with `q <= k`, else `-inf`
//! * `ohr(k)`: the first interval with `q >= k`, else `+inf`
//!
//! Keys at infinity are fixed points: `tau(-inf)` and `ohr(-inf)` return the
//! `-inf` sentinel, `rho(+inf)` and `uat(+inf)` return the `+inf` sentinel.
//! Every hopper is stateless, so it can be shared across threads.

use std::fmt::Debug;
use std::sync::Arc;

use crate::posting::PostingArrays;
use crate::types::{Addr, Interval, MAXFINITY, MINFINITY};

pub mod array;
pub mod empty;
pub mod fixed_width;
pub mod singleton;

pub use array::ArrayHopper;
pub use empty::EmptyHopper;
pub use fixed_width::FixedWidthHopper;
pub use singleton::SingletonHopper;

/// Navigation over an interval list.
pub trait Hopper: Send + Sync + Debug {
    /// First interval starting at or after `k`.
    fn tau(&self, k: Addr) -> Interval;

    /// Last interval starting at or before `k`.
    fn rho(&self, k: Addr) -> Interval;

    /// Last interval ending at or before `k`.
    fn uat(&self, k: Addr) -> Interval;

    /// First interval ending at or after `k`.
    fn ohr(&self, k: Addr) -> Interval;
}

/// Pick the cheapest hopper for a decoded list.
pub fn from_arrays(arrays: Arc<PostingArrays>) -> Box<dyn Hopper> {
    match arrays.len() {
        0 => Box::new(EmptyHopper),
        1 => Box::new(SingletonHopper::new(arrays.interval(0))),
        _ => Box::new(ArrayHopper::new(arrays)),
    }
}

/// Answer for keys that are fixed points of forward queries.
#[inline]
pub(crate) fn forward_fixed_point(k: Addr) -> Option<Interval> {
    (k == MINFINITY).then_some(Interval::MINUS_INFINITY)
}

/// Answer for keys that are fixed points of backward queries.
#[inline]
pub(crate) fn backward_fixed_point(k: Addr) -> Option<Interval> {
    (k == MAXFINITY).then_some(Interval::PLUS_INFINITY)
}
