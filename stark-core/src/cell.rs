//! N-dimensional points, axis-aligned ranges, and grid cells.
//!
//! `NRectRange` is the workhorse of the partitioning layer: universes,
//! grid cells, partition bounds, accumulated extents, and R-tree MBRs are
//! all axis-aligned ranges that are **right-open** on their max sides.
//! A point exactly on a max boundary belongs to the neighbor on the lower
//! side. Closed geometry envelopes are converted with [`EPS`] padding on
//! the max sides so that a degenerate point envelope still occupies a
//! non-empty range under the right-open convention.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Padding applied to closed max bounds to make them right-open.
pub const EPS: f64 = 1e-6;

/// A point in n-dimensional space (n = 2 in practice).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NPoint {
    coords: Vec<f64>,
}

impl NPoint {
    /// Create a point from its coordinates.
    ///
    /// Fails with a geometry error on non-finite coordinates.
    pub fn new(coords: Vec<f64>) -> Result<Self> {
        if coords.is_empty() {
            return Err(Error::geometry("point must have at least one dimension"));
        }
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(Error::geometry(format!(
                "non-finite coordinate in {:?}",
                coords
            )));
        }
        Ok(Self { coords })
    }

    /// Create a 2-D point.
    pub fn new2(x: f64, y: f64) -> Result<Self> {
        Self::new(vec![x, y])
    }

    /// Number of dimensions.
    pub fn dim(&self) -> usize {
        self.coords.len()
    }

    /// Coordinate in dimension `d`.
    pub fn get(&self, d: usize) -> f64 {
        self.coords[d]
    }

    /// All coordinates in dimension order.
    pub fn coords(&self) -> &[f64] {
        &self.coords
    }

    /// Squared Euclidean distance to another point.
    pub fn dist_sq(&self, other: &NPoint) -> f64 {
        self.coords
            .iter()
            .zip(other.coords.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum()
    }
}

/// An n-dimensional axis-aligned range `[ll, ur)`, right-open per dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NRectRange {
    ll: NPoint,
    ur: NPoint,
}

impl NRectRange {
    /// Create a range from its lower-left and upper-right corners.
    ///
    /// Requires `ll[d] <= ur[d]` in every dimension.
    pub fn new(ll: NPoint, ur: NPoint) -> Result<Self> {
        if ll.dim() != ur.dim() {
            return Err(Error::domain(format!(
                "corner dimensions differ: {} vs {}",
                ll.dim(),
                ur.dim()
            )));
        }
        for d in 0..ll.dim() {
            if ll.get(d) > ur.get(d) {
                return Err(Error::domain(format!(
                    "inverted range in dimension {}: {} > {}",
                    d,
                    ll.get(d),
                    ur.get(d)
                )));
            }
        }
        Ok(Self { ll, ur })
    }

    /// Create a 2-D range.
    pub fn new2(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Result<Self> {
        Self::new(NPoint::new2(min_x, min_y)?, NPoint::new2(max_x, max_y)?)
    }

    /// Convert a closed envelope to a right-open range by padding the max
    /// sides with [`EPS`].
    pub fn from_envelope(min: &[f64], max: &[f64]) -> Result<Self> {
        let ll = NPoint::new(min.to_vec())?;
        let ur = NPoint::new(max.iter().map(|c| c + EPS).collect())?;
        Self::new(ll, ur)
    }

    /// Lower-left corner.
    pub fn ll(&self) -> &NPoint {
        &self.ll
    }

    /// Upper-right corner (exclusive).
    pub fn ur(&self) -> &NPoint {
        &self.ur
    }

    /// Number of dimensions.
    pub fn dim(&self) -> usize {
        self.ll.dim()
    }

    /// Check if the range contains a point under right-open semantics.
    pub fn contains_point(&self, p: &NPoint) -> bool {
        (0..self.dim()).all(|d| self.ll.get(d) <= p.get(d) && p.get(d) < self.ur.get(d))
    }

    /// Check if the range fully contains another range.
    pub fn contains(&self, other: &NRectRange) -> bool {
        (0..self.dim())
            .all(|d| self.ll.get(d) <= other.ll.get(d) && other.ur.get(d) <= self.ur.get(d))
    }

    /// Check if two right-open ranges overlap.
    pub fn intersects(&self, other: &NRectRange) -> bool {
        (0..self.dim())
            .all(|d| self.ll.get(d) < other.ur.get(d) && other.ll.get(d) < self.ur.get(d))
    }

    /// The smallest range enclosing both `self` and `other`.
    pub fn extend(&self, other: &NRectRange) -> NRectRange {
        let ll: Vec<f64> = (0..self.dim())
            .map(|d| self.ll.get(d).min(other.ll.get(d)))
            .collect();
        let ur: Vec<f64> = (0..self.dim())
            .map(|d| self.ur.get(d).max(other.ur.get(d)))
            .collect();
        NRectRange {
            ll: NPoint { coords: ll },
            ur: NPoint { coords: ur },
        }
    }

    /// Grow the range by `d` on every side.
    pub fn inflate(&self, d: f64) -> NRectRange {
        let ll: Vec<f64> = self.ll.coords.iter().map(|c| c - d).collect();
        let ur: Vec<f64> = self.ur.coords.iter().map(|c| c + d).collect();
        NRectRange {
            ll: NPoint { coords: ll },
            ur: NPoint { coords: ur },
        }
    }

    /// The remainder of `self` after removing `other`.
    ///
    /// Only defined when `other` is a slab of `self`: equal to `self` in
    /// every dimension except one, where it touches either the lower or
    /// the upper face. This is exactly the shape produced by a binary
    /// split, which is the only caller.
    pub fn diff(&self, other: &NRectRange) -> Result<NRectRange> {
        if self.dim() != other.dim() {
            return Err(Error::domain("dimension mismatch in diff"));
        }
        let mut split_dim = None;
        for d in 0..self.dim() {
            if self.ll.get(d) == other.ll.get(d) && self.ur.get(d) == other.ur.get(d) {
                continue;
            }
            if split_dim.is_some() {
                return Err(Error::domain("diff operands differ in more than one dimension"));
            }
            split_dim = Some(d);
        }
        let d = split_dim.ok_or_else(|| Error::domain("diff operands are equal"))?;

        if self.ll.get(d) == other.ll.get(d) && other.ur.get(d) <= self.ur.get(d) {
            // other occupies the lower slab
            let mut ll = self.ll.clone();
            ll.coords[d] = other.ur.get(d);
            NRectRange::new(ll, self.ur.clone())
        } else if self.ur.get(d) == other.ur.get(d) && self.ll.get(d) <= other.ll.get(d) {
            // other occupies the upper slab
            let mut ur = self.ur.clone();
            ur.coords[d] = other.ll.get(d);
            NRectRange::new(self.ll.clone(), ur)
        } else {
            Err(Error::domain("diff operand is not a boundary slab"))
        }
    }

    /// Side length per dimension.
    pub fn lengths(&self) -> Vec<f64> {
        (0..self.dim())
            .map(|d| self.ur.get(d) - self.ll.get(d))
            .collect()
    }

    /// Product of the side lengths.
    pub fn volume(&self) -> f64 {
        self.lengths().iter().product()
    }

    /// Center point of the range.
    pub fn center(&self) -> NPoint {
        let coords = (0..self.dim())
            .map(|d| (self.ll.get(d) + self.ur.get(d)) * 0.5)
            .collect();
        NPoint { coords }
    }

    /// Minimum Euclidean distance from a point to the range (MINDIST).
    ///
    /// Zero when the point lies inside the range.
    pub fn min_dist(&self, p: &NPoint) -> f64 {
        let mut sum = 0.0;
        for d in 0..self.dim() {
            let c = p.get(d);
            let delta = if c < self.ll.get(d) {
                self.ll.get(d) - c
            } else if c > self.ur.get(d) {
                c - self.ur.get(d)
            } else {
                0.0
            };
            sum += delta * delta;
        }
        sum.sqrt()
    }
}

/// A grid cell: an id, its fixed range, and the accumulated extent of all
/// objects assigned to it.
///
/// `extent` always contains `range`. For point-only datasets the extent is
/// identical to the range, which lets the histogram skip extent updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Cell id in row-major grid order (or partition id when used as
    /// partition bounds).
    pub id: u32,

    /// The fixed range of the cell.
    pub range: NRectRange,

    /// Accumulated envelope of all contributing objects.
    pub extent: NRectRange,
}

impl Cell {
    /// Create a cell whose extent equals its range.
    pub fn new(id: u32, range: NRectRange) -> Self {
        let extent = range.clone();
        Self { id, range, extent }
    }

    /// Create a cell with a precomputed extent.
    ///
    /// The extent is widened to the range if it does not already contain it.
    pub fn with_extent(id: u32, range: NRectRange, extent: NRectRange) -> Self {
        let extent = extent.extend(&range);
        Self { id, range, extent }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> NRectRange {
        NRectRange::new2(min_x, min_y, max_x, max_y).unwrap()
    }

    #[test]
    fn test_right_open_contains() {
        let r = range(0.0, 0.0, 10.0, 10.0);
        assert!(r.contains_point(&NPoint::new2(0.0, 0.0).unwrap()));
        assert!(r.contains_point(&NPoint::new2(9.999, 9.999).unwrap()));
        // the max boundary belongs to the neighbor
        assert!(!r.contains_point(&NPoint::new2(10.0, 5.0).unwrap()));
        assert!(!r.contains_point(&NPoint::new2(5.0, 10.0).unwrap()));
    }

    #[test]
    fn test_intersects_is_strict_on_touching_faces() {
        let a = range(0.0, 0.0, 5.0, 5.0);
        let b = range(5.0, 0.0, 10.0, 5.0);
        // [0,5) and [5,10) share no point
        assert!(!a.intersects(&b));
        let c = range(4.0, 0.0, 10.0, 5.0);
        assert!(a.intersects(&c));
        assert!(c.intersects(&a));
    }

    #[test]
    fn test_extend_and_volume() {
        let a = range(0.0, 0.0, 1.0, 1.0);
        let b = range(2.0, 3.0, 4.0, 5.0);
        let u = a.extend(&b);
        assert_eq!(u, range(0.0, 0.0, 4.0, 5.0));
        assert_eq!(u.volume(), 20.0);
        assert_eq!(u.lengths(), vec![4.0, 5.0]);
    }

    #[test]
    fn test_diff_of_split_slabs() {
        let p = range(0.0, 0.0, 10.0, 10.0);
        let lower = range(0.0, 0.0, 4.0, 10.0);
        let rest = p.diff(&lower).unwrap();
        assert_eq!(rest, range(4.0, 0.0, 10.0, 10.0));

        let upper = range(0.0, 7.0, 10.0, 10.0);
        let rest = p.diff(&upper).unwrap();
        assert_eq!(rest, range(0.0, 0.0, 10.0, 7.0));

        // not a slab
        let hole = range(2.0, 2.0, 4.0, 4.0);
        assert!(p.diff(&hole).is_err());
    }

    #[test]
    fn test_min_dist() {
        let r = range(0.0, 0.0, 10.0, 10.0);
        assert_eq!(r.min_dist(&NPoint::new2(5.0, 5.0).unwrap()), 0.0);
        assert_eq!(r.min_dist(&NPoint::new2(13.0, 14.0).unwrap()), 5.0);
        assert_eq!(r.min_dist(&NPoint::new2(-3.0, 5.0).unwrap()), 3.0);
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(NRectRange::new2(5.0, 0.0, 1.0, 10.0).is_err());
    }

    #[test]
    fn test_envelope_padding_makes_points_occupy_space() {
        let env = NRectRange::from_envelope(&[3.0, 4.0], &[3.0, 4.0]).unwrap();
        assert!(env.contains_point(&NPoint::new2(3.0, 4.0).unwrap()));
        assert!(env.volume() > 0.0);
    }

    #[test]
    fn test_cell_extent_contains_range() {
        let r = range(0.0, 0.0, 1.0, 1.0);
        let tiny = range(0.25, 0.25, 0.5, 0.5);
        let cell = Cell::with_extent(7, r.clone(), tiny);
        assert!(cell.extent.contains(&cell.range));
        assert_eq!(cell.extent, r);
    }
}
