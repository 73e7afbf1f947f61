//! Temporal expressions and their interval algebra.
//!
//! A temporal expression is either an instant or an interval over epoch
//! timestamps. Intervals may be open-ended on the right, which denotes
//! "valid until further notice" (+∞). Instants behave like degenerate
//! closed intervals `[t, t]` under the algebra.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// An instant or an interval over `i64` timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemporalExpr {
    /// A single point in time.
    Instant(i64),

    /// A closed-start interval; `end == None` means unbounded (+∞).
    Interval { start: i64, end: Option<i64> },
}

impl TemporalExpr {
    /// Create an instant.
    pub fn instant(t: i64) -> Self {
        TemporalExpr::Instant(t)
    }

    /// Create a bounded interval. Requires `start <= end`.
    pub fn interval(start: i64, end: i64) -> Result<Self> {
        if end < start {
            return Err(Error::domain(format!(
                "interval end {} before start {}",
                end, start
            )));
        }
        Ok(TemporalExpr::Interval {
            start,
            end: Some(end),
        })
    }

    /// Create an interval open on the right.
    pub fn from_instant(start: i64) -> Self {
        TemporalExpr::Interval { start, end: None }
    }

    /// Start of the expression.
    pub fn start(&self) -> i64 {
        match self {
            TemporalExpr::Instant(t) => *t,
            TemporalExpr::Interval { start, .. } => *start,
        }
    }

    /// End of the expression; `None` means +∞.
    pub fn end(&self) -> Option<i64> {
        match self {
            TemporalExpr::Instant(t) => Some(*t),
            TemporalExpr::Interval { end, .. } => *end,
        }
    }

    /// True when the two expressions share at least one point in time.
    pub fn intersects(&self, other: &TemporalExpr) -> bool {
        !ends_before(self.end(), other.start()) && !ends_before(other.end(), self.start())
    }

    /// True when `other` lies fully within `self`.
    pub fn contains(&self, other: &TemporalExpr) -> bool {
        if self.start() > other.start() {
            return false;
        }
        match (self.end(), other.end()) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(a), Some(b)) => b <= a,
        }
    }

    /// True when `self` ends strictly before `other` starts.
    pub fn before(&self, other: &TemporalExpr) -> bool {
        ends_before(self.end(), other.start())
    }
}

/// `end < start`, treating an open end as +∞.
fn ends_before(end: Option<i64>, start: i64) -> bool {
    match end {
        Some(e) => e < start,
        None => false,
    }
}
