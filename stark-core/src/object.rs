//! The spatio-temporal value type.
//!
//! An [`StObject`] pairs a geometry with an optional temporal expression.
//! Binary predicates compose the spatial and the temporal component: the
//! predicate holds iff its spatial part holds AND either both sides lack a
//! temporal component or both have one and the temporal part holds. A
//! one-sided temporal component never matches: an object pinned to a time
//! range is not comparable to one floating outside time.

use crate::error::Result;
use crate::geometry::{DistanceMetric, Geo};
use crate::temporal::TemporalExpr;
use serde::{Deserialize, Serialize};

/// A geometry with an optional temporal component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StObject {
    geo: Geo,
    time: Option<TemporalExpr>,
}

impl StObject {
    /// A purely spatial object.
    pub fn new(geo: Geo) -> Self {
        Self { geo, time: None }
    }

    /// A spatio-temporal object.
    pub fn with_time(geo: Geo, time: TemporalExpr) -> Self {
        Self {
            geo,
            time: Some(time),
        }
    }

    /// Parse a purely spatial object from WKT.
    pub fn from_wkt(wkt: &str) -> Result<Self> {
        Ok(Self::new(Geo::from_wkt(wkt)?))
    }

    /// The spatial component.
    pub fn geo(&self) -> &Geo {
        &self.geo
    }

    /// The temporal component, if any.
    pub fn time(&self) -> Option<&TemporalExpr> {
        self.time.as_ref()
    }

    /// Apply the composition rule to the temporal components.
    fn temporal_ok<F>(&self, other: &StObject, pred: F) -> bool
    where
        F: Fn(&TemporalExpr, &TemporalExpr) -> bool,
    {
        match (&self.time, &other.time) {
            (None, None) => true,
            (Some(a), Some(b)) => pred(a, b),
            _ => false,
        }
    }

    /// Spatio-temporal intersection.
    pub fn intersects(&self, other: &StObject) -> bool {
        self.geo.intersects(&other.geo) && self.temporal_ok(other, TemporalExpr::intersects)
    }

    /// `self` contains `other` in space and time.
    pub fn contains(&self, other: &StObject) -> bool {
        self.geo.contains(&other.geo) && self.temporal_ok(other, TemporalExpr::contains)
    }

    /// `self` lies within `other`.
    pub fn contained_by(&self, other: &StObject) -> bool {
        other.contains(self)
    }

    /// `self` covers `other` in space and time.
    pub fn covers(&self, other: &StObject) -> bool {
        self.geo.covers(&other.geo) && self.temporal_ok(other, TemporalExpr::contains)
    }

    /// `self` is covered by `other`.
    pub fn covered_by(&self, other: &StObject) -> bool {
        self.geo.covered_by(&other.geo) && self.temporal_ok(other, |a, b| b.contains(a))
    }

    /// Distance to another object under the given metric.
    pub fn distance(&self, other: &StObject, metric: DistanceMetric) -> f64 {
        self.geo.distance(&other.geo, metric)
    }

    /// True when the objects lie within `max_dist` of each other and their
    /// temporal components intersect under the composition rule.
    pub fn within_distance(
        &self,
        other: &StObject,
        metric: DistanceMetric,
        max_dist: f64,
    ) -> bool {
        self.distance(other, metric) <= max_dist
            && self.temporal_ok(other, TemporalExpr::intersects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geo;

    fn point(x: f64, y: f64) -> Geo {
        Geo::point(x, y).unwrap()
    }

    #[test]
    fn test_spatial_only_composition() {
        let a = StObject::new(point(0.0, 0.0));
        let b = StObject::new(point(0.0, 0.0));
        assert!(a.intersects(&b));
        assert!(b.intersects(&a));
    }

    #[test]
    fn test_temporal_composition() {
        let a = StObject::with_time(point(0.0, 0.0), TemporalExpr::interval(10, 20).unwrap());
        let b = StObject::with_time(point(0.0, 0.0), TemporalExpr::interval(15, 25).unwrap());
        let c = StObject::new(point(0.0, 0.0));

        assert!(a.intersects(&b));
        // one-sided time never matches
        assert!(!a.intersects(&c));
        assert!(!c.intersects(&a));
        // both sides timeless match spatially
        assert!(c.intersects(&StObject::new(point(0.0, 0.0))));
    }

    #[test]
    fn test_disjoint_times_spatially_equal() {
        let a = StObject::with_time(point(1.0, 1.0), TemporalExpr::interval(0, 10).unwrap());
        let b = StObject::with_time(point(1.0, 1.0), TemporalExpr::interval(20, 30).unwrap());
        assert!(!a.intersects(&b));
    }

    #[test]
    fn test_contains_implies_covered_by() {
        let outer = StObject::with_time(
            Geo::from_wkt("POLYGON((0 0, 10 0, 10 10, 0 10, 0 0))").unwrap(),
            TemporalExpr::interval(0, 100).unwrap(),
        );
        let inner = StObject::with_time(
            Geo::from_wkt("POLYGON((2 2, 4 2, 4 4, 2 4, 2 2))").unwrap(),
            TemporalExpr::interval(10, 50).unwrap(),
        );
        assert!(outer.contains(&inner));
        assert!(inner.covered_by(&outer));
        assert!(inner.contained_by(&outer));
        // contains implies intersects
        assert!(outer.intersects(&inner));
    }

    #[test]
    fn test_within_distance() {
        let a = StObject::new(point(0.0, 0.0));
        let b = StObject::new(point(3.0, 4.0));
        assert!(a.within_distance(&b, DistanceMetric::Euclidean, 5.0));
        assert!(!a.within_distance(&b, DistanceMetric::Euclidean, 4.9));
    }
}
