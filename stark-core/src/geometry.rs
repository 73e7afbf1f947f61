//! Geometry facade over the `geo` crate family.
//!
//! The engine treats geometry as a black box: everything it needs is an
//! envelope, a centroid, the DE-9IM predicates, and a distance. [`Geo`]
//! wraps a parsed `geo_types::Geometry<f64>`, validates it once, and
//! precomputes envelope and centroid so the hot partitioning paths never
//! reparse or rescan coordinates.
//!
//! WKT is the interchange form: parsing happens here, and serde support
//! round-trips through the WKT string rather than the coordinate tree.

use crate::cell::{NPoint, NRectRange};
use crate::error::{Error, Result};
use geo::{BoundingRect, Centroid, Contains, CoordsIter, EuclideanDistance, Intersects, Relate};
use geo_types::{Geometry, LineString, Point};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Distance metric used by distance predicates and k-NN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Planar Euclidean distance in coordinate units.
    Euclidean,
    /// Spherical distance in meters, interpreting coordinates as (lng, lat).
    Haversine,
}

/// A validated geometry with precomputed envelope and centroid.
///
/// Equality is structural on coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Geo {
    geom: Geometry<f64>,
    envelope: NRectRange,
    centroid: NPoint,
}

impl Geo {
    /// Wrap a geometry, validating that it is non-empty and all
    /// coordinates are finite.
    pub fn new(geom: Geometry<f64>) -> Result<Self> {
        for c in geom.coords_iter() {
            if !c.x.is_finite() || !c.y.is_finite() {
                return Err(Error::geometry(format!(
                    "non-finite coordinate ({}, {})",
                    c.x, c.y
                )));
            }
        }
        let rect = geom
            .bounding_rect()
            .ok_or_else(|| Error::geometry("empty geometry has no envelope"))?;
        let centroid = geom
            .centroid()
            .ok_or_else(|| Error::geometry("empty geometry has no centroid"))?;
        Ok(Self {
            envelope: NRectRange::from_envelope(
                &[rect.min().x, rect.min().y],
                &[rect.max().x, rect.max().y],
            )?,
            centroid: NPoint::new2(centroid.x(), centroid.y())?,
            geom,
        })
    }

    /// Parse a WKT string.
    pub fn from_wkt(wkt: &str) -> Result<Self> {
        Self::new(parse_wkt(wkt)?)
    }

    /// Create a point geometry.
    pub fn point(x: f64, y: f64) -> Result<Self> {
        Self::new(Geometry::Point(Point::new(x, y)))
    }

    /// The wrapped geometry.
    pub fn inner(&self) -> &Geometry<f64> {
        &self.geom
    }

    /// Serialize to WKT.
    pub fn to_wkt(&self) -> String {
        use wkt::ToWkt;
        self.geom.wkt_string()
    }

    /// The geometry's envelope as a right-open range (max sides padded by
    /// [`crate::cell::EPS`]).
    pub fn envelope(&self) -> &NRectRange {
        &self.envelope
    }

    /// The geometry's centroid.
    pub fn centroid(&self) -> &NPoint {
        &self.centroid
    }

    /// All coordinates in traversal order.
    pub fn coordinates(&self) -> Vec<(f64, f64)> {
        self.geom.coords_iter().map(|c| (c.x, c.y)).collect()
    }

    /// True if this is a point geometry.
    pub fn is_point(&self) -> bool {
        matches!(self.geom, Geometry::Point(_))
    }

    /// Spatial intersection test.
    pub fn intersects(&self, other: &Geo) -> bool {
        self.geom.intersects(&other.geom)
    }

    /// Spatial containment test (interior containment per DE-9IM).
    pub fn contains(&self, other: &Geo) -> bool {
        self.geom.contains(&other.geom)
    }

    /// DE-9IM covers.
    pub fn covers(&self, other: &Geo) -> bool {
        self.geom.relate(&other.geom).is_covers()
    }

    /// DE-9IM coveredBy.
    pub fn covered_by(&self, other: &Geo) -> bool {
        self.geom.relate(&other.geom).is_coveredby()
    }

    /// Distance to another geometry under the given metric.
    ///
    /// Haversine distance is computed between centroids for non-point
    /// geometries; coordinates are interpreted as (lng, lat) degrees.
    pub fn distance(&self, other: &Geo, metric: DistanceMetric) -> f64 {
        match metric {
            DistanceMetric::Euclidean => euclidean(&self.geom, &other.geom),
            DistanceMetric::Haversine => haversine_distance(
                self.centroid.get(1),
                self.centroid.get(0),
                other.centroid.get(1),
                other.centroid.get(0),
            ),
        }
    }
}

impl Serialize for Geo {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_wkt())
    }
}

impl<'de> Deserialize<'de> for Geo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Geo::from_wkt(&s).map_err(serde::de::Error::custom)
    }
}

/// Parse a WKT string to a geo-types Geometry.
pub fn parse_wkt(wkt: &str) -> Result<Geometry<f64>> {
    use std::str::FromStr;
    wkt::Wkt::from_str(wkt)
        .map_err(|e| Error::geometry(format!("WKT parse error: {:?}", e)))
        .and_then(|w| {
            w.try_into()
                .map_err(|e: wkt::conversion::Error| {
                    Error::geometry(format!("WKT conversion error: {:?}", e))
                })
        })
}

/// Haversine distance between two (lat, lng) points in meters.
///
/// Spherical Earth approximation with mean radius 6,371,000 m.
pub fn haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    const EARTH_RADIUS_M: f64 = 6_371_000.0;

    let lat1_r = lat1.to_radians();
    let lat2_r = lat2.to_radians();
    let dlat = (lat2 - lat1).to_radians();
    let dlng = (lng2 - lng1).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (dlng / 2.0).sin().powi(2);

    EARTH_RADIUS_M * 2.0 * a.sqrt().asin()
}

/// Euclidean distance between two geometries.
///
/// Multi-part and derived shapes are decomposed to the point / linestring /
/// polygon base cases the `geo` crate implements directly.
fn euclidean(a: &Geometry<f64>, b: &Geometry<f64>) -> f64 {
    match a {
        Geometry::MultiPoint(mp) => {
            return mp
                .iter()
                .map(|p| euclidean(&Geometry::Point(*p), b))
                .fold(f64::INFINITY, f64::min)
        }
        Geometry::MultiLineString(mls) => {
            return mls
                .iter()
                .map(|l| euclidean(&Geometry::LineString(l.clone()), b))
                .fold(f64::INFINITY, f64::min)
        }
        Geometry::MultiPolygon(mpg) => {
            return mpg
                .iter()
                .map(|p| euclidean(&Geometry::Polygon(p.clone()), b))
                .fold(f64::INFINITY, f64::min)
        }
        Geometry::GeometryCollection(gc) => {
            return gc.iter().map(|g| euclidean(g, b)).fold(f64::INFINITY, f64::min)
        }
        Geometry::Rect(r) => return euclidean(&Geometry::Polygon(r.to_polygon()), b),
        Geometry::Triangle(t) => return euclidean(&Geometry::Polygon(t.to_polygon()), b),
        Geometry::Line(l) => {
            return euclidean(
                &Geometry::LineString(LineString::from(vec![l.start, l.end])),
                b,
            )
        }
        _ => {}
    }
    // a is now Point / LineString / Polygon; normalize b by symmetry
    if !matches!(
        b,
        Geometry::Point(_) | Geometry::LineString(_) | Geometry::Polygon(_)
    ) {
        return euclidean(b, a);
    }
    match (a, b) {
        (Geometry::Point(p), Geometry::Point(q)) => p.euclidean_distance(q),
        (Geometry::Point(p), Geometry::LineString(l)) => p.euclidean_distance(l),
        (Geometry::Point(p), Geometry::Polygon(pg)) => p.euclidean_distance(pg),
        (Geometry::LineString(l), Geometry::Point(p)) => p.euclidean_distance(l),
        (Geometry::LineString(l1), Geometry::LineString(l2)) => l1.euclidean_distance(l2),
        (Geometry::LineString(l), Geometry::Polygon(pg)) => l.euclidean_distance(pg),
        (Geometry::Polygon(pg), Geometry::Point(p)) => p.euclidean_distance(pg),
        (Geometry::Polygon(pg), Geometry::LineString(l)) => l.euclidean_distance(pg),
        (Geometry::Polygon(p1), Geometry::Polygon(p2)) => p1.euclidean_distance(p2),
        _ => unreachable!("non-base geometry variants normalized above"),
    }
}
