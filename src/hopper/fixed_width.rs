//! Virtual hopper over every interval of a fixed width.
//!
//! The list contains `[k, k + width - 1]` for every `k` whose interval lies
//! strictly between the sentinels. Window operators use it to bound how far
//! apart two matches may be.

use crate::error::{HopdexError, Result};
use crate::hopper::{Hopper, backward_fixed_point, forward_fixed_point};
use crate::types::{Addr, Interval, MAXFINITY, MINFINITY};

#[derive(Debug, Clone, Copy)]
pub struct FixedWidthHopper {
    width: i64,
}

impl FixedWidthHopper {
    /// Create a hopper over intervals of `width` addresses.
    pub fn new(width: i64) -> Result<Self> {
        if width < 1 {
            return Err(HopdexError::invalid_config(format!(
                "fixed-width hopper needs a positive width, got {width}"
            )));
        }
        Ok(FixedWidthHopper { width })
    }

    pub fn width(&self) -> i64 {
        self.width
    }

    fn starting_at(&self, p: Addr) -> Interval {
        Interval::new(p, p + (self.width - 1), 0.0)
    }

    fn ending_at(&self, q: Addr) -> Interval {
        Interval::new(q - (self.width - 1), q, 0.0)
    }

    fn max_start(&self) -> Addr {
        MAXFINITY - self.width
    }

    fn min_end(&self) -> Addr {
        MINFINITY + self.width
    }
}

impl Hopper for FixedWidthHopper {
    fn tau(&self, k: Addr) -> Interval {
        if let Some(fixed) = forward_fixed_point(k) {
            return fixed;
        }
        if k > self.max_start() {
            Interval::PLUS_INFINITY
        } else {
            self.starting_at(k)
        }
    }

    fn rho(&self, k: Addr) -> Interval {
        if let Some(fixed) = backward_fixed_point(k) {
            return fixed;
        }
        if k == MINFINITY {
            Interval::MINUS_INFINITY
        } else {
            self.starting_at(k.min(self.max_start()))
        }
    }

    fn uat(&self, k: Addr) -> Interval {
        if let Some(fixed) = backward_fixed_point(k) {
            return fixed;
        }
        if k < self.min_end() {
            Interval::MINUS_INFINITY
        } else {
            self.ending_at(k)
        }
    }

    fn ohr(&self, k: Addr) -> Interval {
        if let Some(fixed) = forward_fixed_point(k) {
            return fixed;
        }
        if k == MAXFINITY {
            Interval::PLUS_INFINITY
        } else {
            self.ending_at(k.max(self.min_end()))
        }
    }
}
