//! Cell histogram over a uniform grid.
//!
//! The histogram is the cost model for the partitioners: a uniform grid
//! over the universe where each cell tracks how many objects fall into it
//! (by centroid) and the accumulated envelope of those objects. It is
//! built once per partitioner construction by folding over the dataset or
//! a sample of it, and is immutable afterwards.
//!
//! Building goes through [`CellHistogramBuilder`] so extents accumulate in
//! the builder and the emitted [`Cell`]s stay immutable. Builder merge is
//! associative and commutative, which makes tree reductions over dataset
//! partitions safe.

use stark_core::cell::{Cell, NPoint, NRectRange};
use stark_core::error::{Error, Result};
use stark_core::object::StObject;

use serde::{Deserialize, Serialize};

/// Geometry of a uniform grid over a right-open universe.
///
/// Shared by the histogram and both partitioners. Cells are addressed in
/// row-major order: `cell_id = cy * num_x + cx`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    universe: NRectRange,
    x_len: f64,
    y_len: f64,
    num_x: usize,
    num_y: usize,
}

impl GridSpec {
    /// Build a grid with fixed cell side lengths.
    ///
    /// The last cell per dimension is clipped to the universe, so cells
    /// always tile it exactly.
    pub fn with_side_lengths(universe: NRectRange, x_len: f64, y_len: f64) -> Result<Self> {
        if universe.dim() != 2 {
            return Err(Error::config(format!(
                "grid requires a 2-dimensional universe, got {} dimensions",
                universe.dim()
            )));
        }
        if x_len <= 0.0 || y_len <= 0.0 {
            return Err(Error::config(format!(
                "cell side lengths must be positive, got ({}, {})",
                x_len, y_len
            )));
        }
        let lengths = universe.lengths();
        if lengths[0] <= 0.0 || lengths[1] <= 0.0 {
            return Err(Error::config("universe is degenerate"));
        }
        let num_x = (lengths[0] / x_len).ceil() as usize;
        let num_y = (lengths[1] / y_len).ceil() as usize;
        Ok(Self {
            universe,
            x_len,
            y_len,
            num_x: num_x.max(1),
            num_y: num_y.max(1),
        })
    }

    /// Build a grid with a target number of cells per dimension.
    pub fn with_parts_per_dim(universe: NRectRange, parts_per_dim: usize) -> Result<Self> {
        if parts_per_dim == 0 {
            return Err(Error::config("parts per dimension must be at least 1"));
        }
        if universe.dim() != 2 {
            return Err(Error::config(format!(
                "grid requires a 2-dimensional universe, got {} dimensions",
                universe.dim()
            )));
        }
        let lengths = universe.lengths();
        if lengths[0] <= 0.0 || lengths[1] <= 0.0 {
            return Err(Error::config("universe is degenerate"));
        }
        Ok(Self {
            x_len: lengths[0] / parts_per_dim as f64,
            y_len: lengths[1] / parts_per_dim as f64,
            num_x: parts_per_dim,
            num_y: parts_per_dim,
            universe,
        })
    }

    /// The universe covered by this grid.
    pub fn universe(&self) -> &NRectRange {
        &self.universe
    }

    /// Cells along the x axis.
    pub fn num_x(&self) -> usize {
        self.num_x
    }

    /// Cells along the y axis.
    pub fn num_y(&self) -> usize {
        self.num_y
    }

    /// Total number of cells.
    pub fn num_cells(&self) -> usize {
        self.num_x * self.num_y
    }

    /// Cell side length along the x axis.
    pub fn x_len(&self) -> f64 {
        self.x_len
    }

    /// Cell side length along the y axis.
    pub fn y_len(&self) -> f64 {
        self.y_len
    }

    /// Cell id of a point, row-major.
    ///
    /// Fails with a domain error for points outside the universe; under
    /// the right-open convention a point exactly on the max boundary is
    /// outside.
    pub fn cell_id(&self, p: &NPoint) -> Result<u32> {
        if !self.universe.contains_point(p) {
            return Err(Error::domain(format!(
                "point ({}, {}) outside universe {:?}",
                p.get(0),
                p.get(1),
                self.universe
            )));
        }
        let cx = (((p.get(0) - self.universe.ll().get(0)) / self.x_len) as usize).min(self.num_x - 1);
        let cy = (((p.get(1) - self.universe.ll().get(1)) / self.y_len) as usize).min(self.num_y - 1);
        Ok((cy * self.num_x + cx) as u32)
    }

    /// Grid coordinates of a cell id.
    pub fn cell_coords(&self, id: u32) -> (usize, usize) {
        let id = id as usize;
        (id % self.num_x, id / self.num_x)
    }

    /// World-coordinate range of a cell, clipped to the universe.
    pub fn cell_range(&self, id: u32) -> Result<NRectRange> {
        if id as usize >= self.num_cells() {
            return Err(Error::domain(format!(
                "cell id {} out of range for {}x{} grid",
                id, self.num_x, self.num_y
            )));
        }
        let (cx, cy) = self.cell_coords(id);
        self.span_range(cx, cy, cx + 1, cy + 1)
    }

    /// World-coordinate range of a rectangular span of cells
    /// `[x0, x1) x [y0, y1)`, clipped to the universe.
    pub fn span_range(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> Result<NRectRange> {
        let ll = self.universe.ll();
        let ur = self.universe.ur();
        let min_x = ll.get(0) + x0 as f64 * self.x_len;
        let min_y = ll.get(1) + y0 as f64 * self.y_len;
        let max_x = if x1 >= self.num_x {
            ur.get(0)
        } else {
            ll.get(0) + x1 as f64 * self.x_len
        };
        let max_y = if y1 >= self.num_y {
            ur.get(1)
        } else {
            ll.get(1) + y1 as f64 * self.y_len
        };
        NRectRange::new2(min_x, min_y, max_x, max_y)
    }
}

/// Derive the right-open universe from the data itself.
///
/// Folds all object envelopes (whose max sides already carry the EPS
/// padding) into one bounding range. Fails on an empty iterator.
pub fn universe_from<'a>(objs: impl IntoIterator<Item = &'a StObject>) -> Result<NRectRange> {
    let mut universe: Option<NRectRange> = None;
    for obj in objs {
        let env = obj.geo().envelope();
        universe = Some(match universe {
            Some(u) => u.extend(env),
            None => env.clone(),
        });
    }
    universe.ok_or_else(|| Error::domain("cannot derive a universe from an empty dataset"))
}

/// Accumulating histogram builder.
///
/// Fold objects in with [`add`](CellHistogramBuilder::add), combine
/// partial builders with [`merge`](CellHistogramBuilder::merge), then
/// [`build`](CellHistogramBuilder::build) the immutable histogram.
#[derive(Debug, Clone)]
pub struct CellHistogramBuilder {
    grid: GridSpec,
    points_only: bool,
    counts: Vec<u64>,
    extents: Vec<Option<NRectRange>>,
    total: u64,
}

impl CellHistogramBuilder {
    /// Create an empty builder over the given grid.
    ///
    /// With `points_only` set, extent accumulation is skipped and every
    /// cell's extent stays equal to its range.
    pub fn new(grid: GridSpec, points_only: bool) -> Self {
        let n = grid.num_cells();
        Self {
            grid,
            points_only,
            counts: vec![0; n],
            extents: vec![None; n],
            total: 0,
        }
    }

    /// Account one object: bump the count of the cell holding its
    /// centroid and extend that cell's extent with its envelope.
    pub fn add(&mut self, obj: &StObject) -> Result<()> {
        let id = self.grid.cell_id(obj.geo().centroid())? as usize;
        self.counts[id] += 1;
        self.total += 1;
        if !self.points_only {
            let env = obj.geo().envelope();
            self.extents[id] = Some(match self.extents[id].take() {
                Some(e) => e.extend(env),
                None => env.clone(),
            });
        }
        Ok(())
    }

    /// Combine two partial builders. Associative and commutative.
    pub fn merge(mut self, other: CellHistogramBuilder) -> Result<CellHistogramBuilder> {
        if self.grid != other.grid || self.points_only != other.points_only {
            return Err(Error::config(
                "cannot merge histograms built over different grids",
            ));
        }
        for (c, o) in self.counts.iter_mut().zip(other.counts) {
            *c += o;
        }
        if !self.points_only {
            for (e, o) in self.extents.iter_mut().zip(other.extents) {
                *e = match (e.take(), o) {
                    (Some(a), Some(b)) => Some(a.extend(&b)),
                    (a, b) => a.or(b),
                };
            }
        }
        self.total += other.total;
        Ok(self)
    }

    /// Emit the immutable histogram.
    pub fn build(self) -> Result<CellHistogram> {
        let mut buckets = Vec::with_capacity(self.grid.num_cells());
        let mut non_empty = 0usize;
        for id in 0..self.grid.num_cells() {
            let range = self.grid.cell_range(id as u32)?;
            let cell = match &self.extents[id] {
                Some(extent) => Cell::with_extent(id as u32, range, extent.clone()),
                None => Cell::new(id as u32, range),
            };
            if self.counts[id] > 0 {
                non_empty += 1;
            }
            buckets.push((cell, self.counts[id]));
        }
        tracing::debug!(
            cells = buckets.len(),
            non_empty = non_empty,
            total = self.total,
            "built cell histogram"
        );
        Ok(CellHistogram {
            grid: self.grid,
            points_only: self.points_only,
            buckets,
            total: self.total,
            non_empty,
        })
    }
}

/// Immutable per-cell counts and extents over a uniform grid.
#[derive(Debug, Clone)]
pub struct CellHistogram {
    grid: GridSpec,
    points_only: bool,
    buckets: Vec<(Cell, u64)>,
    total: u64,
    non_empty: usize,
}

impl CellHistogram {
    /// Fold a dataset into a histogram in one pass.
    pub fn build_from<'a>(
        grid: GridSpec,
        points_only: bool,
        objs: impl IntoIterator<Item = &'a StObject>,
    ) -> Result<Self> {
        let mut builder = CellHistogramBuilder::new(grid, points_only);
        for obj in objs {
            builder.add(obj)?;
        }
        builder.build()
    }

    /// The underlying grid.
    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    /// Whether extent accumulation was skipped.
    pub fn points_only(&self) -> bool {
        self.points_only
    }

    /// Cell id of a point (delegates to the grid).
    pub fn cell_id(&self, p: &NPoint) -> Result<u32> {
        self.grid.cell_id(p)
    }

    /// The bucket for a cell id.
    pub fn bucket(&self, id: u32) -> Option<&(Cell, u64)> {
        self.buckets.get(id as usize)
    }

    /// Count for a cell id; zero for out-of-range ids.
    pub fn count(&self, id: u32) -> u64 {
        self.buckets.get(id as usize).map_or(0, |(_, c)| *c)
    }

    /// All buckets in row-major cell order.
    pub fn buckets(&self) -> &[(Cell, u64)] {
        &self.buckets
    }

    /// Buckets with a non-zero count.
    pub fn non_empty(&self) -> impl Iterator<Item = &(Cell, u64)> {
        self.buckets.iter().filter(|(_, c)| *c > 0)
    }

    /// Number of non-empty cells.
    pub fn non_empty_count(&self) -> usize {
        self.non_empty
    }

    /// Total object count.
    pub fn total(&self) -> u64 {
        self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stark_core::geometry::Geo;

    fn universe10() -> NRectRange {
        NRectRange::new2(0.0, 0.0, 10.0, 10.0).unwrap()
    }

    fn pt(x: f64, y: f64) -> StObject {
        StObject::new(Geo::point(x, y).unwrap())
    }

    #[test]
    fn test_cell_id_row_major() {
        let grid = GridSpec::with_side_lengths(universe10(), 1.0, 1.0).unwrap();
        assert_eq!(grid.num_x(), 10);
        assert_eq!(grid.num_y(), 10);
        // (3.5, 2.1) -> cy=2, cx=3 -> 2*10+3 = 23
        let id = grid.cell_id(&NPoint::new2(3.5, 2.1).unwrap()).unwrap();
        assert_eq!(id, 23);
        assert_eq!(grid.cell_coords(23), (3, 2));
    }

    #[test]
    fn test_cell_id_out_of_universe() {
        let grid = GridSpec::with_side_lengths(universe10(), 1.0, 1.0).unwrap();
        // (10, 10) is on the open max boundary
        let err = grid.cell_id(&NPoint::new2(10.0, 10.0).unwrap()).unwrap_err();
        assert!(matches!(err, Error::Domain(_)));
        assert!(grid.cell_id(&NPoint::new2(-0.1, 5.0).unwrap()).is_err());
    }

    #[test]
    fn test_invalid_grid_config() {
        assert!(GridSpec::with_side_lengths(universe10(), 0.0, 1.0).is_err());
        assert!(GridSpec::with_side_lengths(universe10(), 1.0, -1.0).is_err());
        assert!(GridSpec::with_parts_per_dim(universe10(), 0).is_err());
    }

    #[test]
    fn test_histogram_counts_sum_to_dataset_size() {
        let grid = GridSpec::with_side_lengths(universe10(), 1.0, 1.0).unwrap();
        let objs: Vec<StObject> = (0..50)
            .map(|i| pt((i % 10) as f64 + 0.5, (i / 10) as f64 + 0.5))
            .collect();
        let hist = CellHistogram::build_from(grid, true, objs.iter()).unwrap();
        assert_eq!(hist.total(), 50);
        let sum: u64 = hist.buckets().iter().map(|(_, c)| c).sum();
        assert_eq!(sum, 50);
        assert_eq!(hist.non_empty_count(), 50);
    }

    #[test]
    fn test_extent_accumulation_for_non_points() {
        let grid = GridSpec::with_side_lengths(universe10(), 5.0, 5.0).unwrap();
        // centroid (1, 1) lands in cell 0, envelope spills past the cell
        let poly = StObject::from_wkt("POLYGON((0 0, 2 0, 2 2, 0 2, 0 0))").unwrap();
        let wide = StObject::from_wkt("POLYGON((0 0, 6 0, 6 1, 0 1, 0 0))").unwrap();

        let hist = CellHistogram::build_from(grid, false, [&poly, &wide]).unwrap();
        let (cell, count) = hist.bucket(0).unwrap();
        assert_eq!(*count, 2);
        assert!(cell.extent.contains(poly.geo().envelope()));
        assert!(cell.extent.contains(wide.geo().envelope()));
        assert!(cell.extent.contains(&cell.range));
    }

    #[test]
    fn test_points_only_extent_equals_range() {
        let grid = GridSpec::with_side_lengths(universe10(), 5.0, 5.0).unwrap();
        let objs = vec![pt(1.0, 1.0), pt(2.0, 2.0)];
        let hist = CellHistogram::build_from(grid, true, objs.iter()).unwrap();
        let (cell, _) = hist.bucket(0).unwrap();
        assert_eq!(cell.extent, cell.range);
    }

    #[test]
    fn test_merge_is_commutative() {
        let grid = GridSpec::with_side_lengths(universe10(), 2.0, 2.0).unwrap();
        let left: Vec<StObject> = vec![pt(1.0, 1.0), pt(3.0, 3.0)];
        let right: Vec<StObject> = vec![pt(1.5, 1.5), pt(9.0, 9.0)];

        let mut a = CellHistogramBuilder::new(grid.clone(), true);
        for o in &left {
            a.add(o).unwrap();
        }
        let mut b = CellHistogramBuilder::new(grid, true);
        for o in &right {
            b.add(o).unwrap();
        }

        let ab = a.clone().merge(b.clone()).unwrap().build().unwrap();
        let ba = b.merge(a).unwrap().build().unwrap();

        assert_eq!(ab.total(), 4);
        for id in 0..ab.buckets().len() as u32 {
            assert_eq!(ab.count(id), ba.count(id));
        }
    }

    #[test]
    fn test_universe_from_pads_max() {
        let objs = vec![pt(0.0, 0.0), pt(10.0, 8.0)];
        let u = universe_from(objs.iter()).unwrap();
        // max side is padded, so the extreme point is inside
        assert!(u.contains_point(&NPoint::new2(10.0, 8.0).unwrap()));
        assert!(universe_from(std::iter::empty::<&StObject>()).is_err());
    }
}
