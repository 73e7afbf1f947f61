//! Join and filter predicates.
//!
//! Predicates are a tagged variant so operators dispatch internally
//! instead of taking trait objects. Each predicate knows two things: how
//! to evaluate itself exactly on a pair of objects, and which partitions
//! can possibly hold a match for a given query envelope (the prune test,
//! always a superset of the exact result).

use crate::cell::NRectRange;
use crate::geometry::DistanceMetric;
use crate::object::StObject;
use serde::{Deserialize, Serialize};

/// A spatio-temporal binary predicate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum JoinPredicate {
    /// The operands share at least one point.
    Intersects,
    /// The left operand contains the right.
    Contains,
    /// The left operand lies within the right.
    ContainedBy,
    /// The left operand covers the right.
    Covers,
    /// The left operand is covered by the right.
    CoveredBy,
    /// The operands lie within `max_dist` of each other.
    WithinDistance {
        max_dist: f64,
        metric: DistanceMetric,
    },
}

impl JoinPredicate {
    /// Evaluate the exact predicate on a pair of objects.
    pub fn eval(&self, left: &StObject, right: &StObject) -> bool {
        match self {
            JoinPredicate::Intersects => left.intersects(right),
            JoinPredicate::Contains => left.contains(right),
            JoinPredicate::ContainedBy => left.contained_by(right),
            JoinPredicate::Covers => left.covers(right),
            JoinPredicate::CoveredBy => left.covered_by(right),
            JoinPredicate::WithinDistance { max_dist, metric } => {
                left.within_distance(right, *metric, *max_dist)
            }
        }
    }

    /// Partition prune test: can a partition with the given extent hold an
    /// object matching `query_env` under this predicate?
    ///
    /// Containment-style predicates reduce to the overlap test as well:
    /// containment implies overlap, so overlap is the safe superset.
    /// Distance predicates inflate the query envelope by the maximum
    /// distance before testing.
    pub fn prune_keep(&self, extent: &NRectRange, query_env: &NRectRange) -> bool {
        match self {
            JoinPredicate::WithinDistance { max_dist, .. } => {
                extent.intersects(&query_env.inflate(*max_dist))
            }
            _ => extent.intersects(query_env),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geo;

    #[test]
    fn test_eval_dispatch() {
        let outer = StObject::from_wkt("POLYGON((0 0, 10 0, 10 10, 0 10, 0 0))").unwrap();
        let inner = StObject::from_wkt("POLYGON((2 2, 4 2, 4 4, 2 4, 2 2))").unwrap();

        assert!(JoinPredicate::Intersects.eval(&outer, &inner));
        assert!(JoinPredicate::Contains.eval(&outer, &inner));
        assert!(JoinPredicate::ContainedBy.eval(&inner, &outer));
        assert!(JoinPredicate::Covers.eval(&outer, &inner));
        assert!(JoinPredicate::CoveredBy.eval(&inner, &outer));
        assert!(!JoinPredicate::Contains.eval(&inner, &outer));
    }

    #[test]
    fn test_within_distance_eval() {
        let a = StObject::new(Geo::point(0.0, 0.0).unwrap());
        let b = StObject::new(Geo::point(6.0, 8.0).unwrap());
        let pred = JoinPredicate::WithinDistance {
            max_dist: 10.0,
            metric: DistanceMetric::Euclidean,
        };
        assert!(pred.eval(&a, &b));
    }

    #[test]
    fn test_prune_inflates_for_distance() {
        let extent = NRectRange::new2(0.0, 0.0, 1.0, 1.0).unwrap();
        let far_query = NRectRange::new2(5.0, 5.0, 6.0, 6.0).unwrap();

        assert!(!JoinPredicate::Intersects.prune_keep(&extent, &far_query));
        let pred = JoinPredicate::WithinDistance {
            max_dist: 10.0,
            metric: DistanceMetric::Euclidean,
        };
        assert!(pred.prune_keep(&extent, &far_query));
    }
}
