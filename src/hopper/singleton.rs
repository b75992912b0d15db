//! Hopper over a one-interval list.

use crate::hopper::{Hopper, backward_fixed_point, forward_fixed_point};
use crate::types::{Addr, Interval};

#[derive(Debug, Clone, Copy)]
pub struct SingletonHopper {
    interval: Interval,
}

impl SingletonHopper {
    pub fn new(interval: Interval) -> Self {
        SingletonHopper { interval }
    }
}

impl Hopper for SingletonHopper {
    fn tau(&self, k: Addr) -> Interval {
        if let Some(fixed) = forward_fixed_point(k) {
            return fixed;
        }
        if self.interval.p >= k {
            self.interval
        } else {
            Interval::PLUS_INFINITY
        }
    }

    fn rho(&self, k: Addr) -> Interval {
        if let Some(fixed) = backward_fixed_point(k) {
            return fixed;
        }
        if self.interval.p <= k {
            self.interval
        } else {
            Interval::MINUS_INFINITY
        }
    }

    fn uat(&self, k: Addr) -> Interval {
        if let Some(fixed) = backward_fixed_point(k) {
            return fixed;
        }
        if self.interval.q <= k {
            self.interval
        } else {
            Interval::MINUS_INFINITY
        }
    }

    fn ohr(&self, k: Addr) -> Interval {
        if let Some(fixed) = forward_fixed_point(k) {
            return fixed;
        }
        if self.interval.q >= k {
            self.interval
        } else {
            Interval::PLUS_INFINITY
        }
    }
}
