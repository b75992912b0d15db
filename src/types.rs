//! Core scalar types shared by postings, hoppers and the index.
//!
//! A text is a sequence of tokens, each occupying one address. A feature
//! names a term or an annotation kind; its posting list is a set of
//! intervals `[p, q]` over addresses, optionally carrying a value.

use serde::{Deserialize, Serialize};

/// An address in the token space.
pub type Addr = i64;

/// A feature identifier (hashed term, annotation tag, ...).
pub type Feature = i64;

/// The value associated with an interval.
pub type Fval = f64;

/// Sentinel above every real address.
pub const MAXFINITY: Addr = i64::MAX;

/// Sentinel below every real address.
pub const MINFINITY: Addr = i64::MIN;

/// A closed interval `[p, q]` with an associated value.
///
/// When a posting list carries no values, `v` is `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub p: Addr,
    pub q: Addr,
    pub v: Fval,
}

impl Interval {
    /// The "nothing further" sentinel.
    pub const PLUS_INFINITY: Interval = Interval {
        p: MAXFINITY,
        q: MAXFINITY,
        v: 0.0,
    };

    /// The "nothing before" sentinel.
    pub const MINUS_INFINITY: Interval = Interval {
        p: MINFINITY,
        q: MINFINITY,
        v: 0.0,
    };

    /// Create a new interval.
    pub fn new(p: Addr, q: Addr, v: Fval) -> Self {
        Interval { p, q, v }
    }

    /// Whether this is one of the two sentinel intervals.
    pub fn is_sentinel(&self) -> bool {
        (self.p == MAXFINITY && self.q == MAXFINITY) || (self.p == MINFINITY && self.q == MINFINITY)
    }

    /// Number of addresses covered.
    pub fn width(&self) -> i64 {
        self.q.saturating_sub(self.p).saturating_add(1)
    }
}

/// A single occurrence of a feature at an address, as buffered by a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct TokenRecord {
    pub feature: Feature,
    pub address: Addr,
}

/// A feature attached to an interval with a value, as buffered by a
/// builder or updater.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Annotation {
    pub feature: Feature,
    pub p: Addr,
    pub q: Addr,
    pub v: Fval,
}

impl Annotation {
    /// Create a new annotation.
    pub fn new(feature: Feature, p: Addr, q: Addr, v: Fval) -> Self {
        Annotation { feature, p, q, v }
    }

    /// Annotations must start at a real address and not end before they start.
    pub fn is_valid(&self) -> bool {
        self.p >= 0 && self.p <= self.q
    }

    /// Sort key used before building postings from a buffer.
    pub(crate) fn key(&self) -> (Feature, Addr, Addr) {
        (self.feature, self.p, self.q)
    }
}
