//! Cost-based binary space partitioner.
//!
//! The BSP turns a cell histogram into a partition list whose
//! per-partition cost (sum of contained cell counts) stays below a bound
//! while keeping the split tree balanced. Splits run on the histogram's
//! cell grid, so every partition is a rectangular span of whole cells and
//! cost queries reduce to a 2-D prefix-sum lookup.
//!
//! Two paths produce the partition list:
//!
//! - **Sparse path**: when few cells are non-empty, each non-empty cell
//!   becomes its own partition and a single filler partition covers the
//!   empty remainder. Splitting would only reproduce this layout with
//!   more work.
//! - **Split path**: a work queue of cell spans, starting from the whole
//!   universe. A span is emitted once its cost is within the bound or it
//!   cannot shrink below one cell; otherwise it is split at the interior
//!   cell boundary that best balances the two sides' costs.
//!
//! The build is pure: identical inputs give an identical partition list,
//! with ids assigned in emission order.

use crate::grid::check_partition_id;
use crate::histogram::{CellHistogram, GridSpec};
use crate::partitioner::SpatialPartitioner;
use serde::{Deserialize, Serialize};
use stark_core::cell::{Cell, NRectRange};
use stark_core::error::{Error, Result};
use stark_core::object::StObject;
use std::collections::VecDeque;

/// Default for [`BspConfig::num_cell_threshold`].
pub const DEFAULT_CELL_THRESHOLD: usize = 32;

/// Parameters of a BSP build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BspConfig {
    /// Upper bound on per-partition cost. Partitions spanning a single
    /// cell may exceed it, since they cannot be split further.
    pub max_cost: u64,

    /// Sparse path threshold: with at most this many non-empty cells,
    /// emit cells directly instead of splitting.
    pub num_cell_threshold: usize,
}

impl BspConfig {
    /// Config with the given cost bound and the default sparse threshold.
    pub fn new(max_cost: u64) -> Self {
        Self {
            max_cost,
            num_cell_threshold: DEFAULT_CELL_THRESHOLD,
        }
    }

    /// Override the sparse path threshold.
    pub fn with_cell_threshold(mut self, threshold: usize) -> Self {
        self.num_cell_threshold = threshold;
        self
    }
}

/// Statistics of a BSP build.
#[derive(Debug, Clone, Copy, Default)]
pub struct BspBuildStats {
    /// Non-empty cells in the input histogram.
    pub non_empty_cells: usize,
    /// Partitions emitted.
    pub partitions: usize,
    /// Splits performed (zero on the sparse path).
    pub splits: u64,
    /// Largest emitted partition cost.
    pub max_partition_cost: u64,
}

/// A rectangular span of grid cells, half-open in cell coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellSpan {
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
}

impl CellSpan {
    fn cells_in_dim(&self, d: usize) -> usize {
        if d == 0 {
            self.x1 - self.x0
        } else {
            self.y1 - self.y0
        }
    }

    fn is_single_cell(&self) -> bool {
        self.cells_in_dim(0) == 1 && self.cells_in_dim(1) == 1
    }

    /// Split at interior boundary `i` of dimension `d`, counted from the
    /// lower side.
    fn split_at(&self, d: usize, i: usize) -> (CellSpan, CellSpan) {
        if d == 0 {
            let mid = self.x0 + i;
            (
                CellSpan { x1: mid, ..*self },
                CellSpan { x0: mid, ..*self },
            )
        } else {
            let mid = self.y0 + i;
            (
                CellSpan { y1: mid, ..*self },
                CellSpan { y0: mid, ..*self },
            )
        }
    }
}

/// Cost-balanced binary space partitioner.
#[derive(Debug, Clone)]
pub struct BspPartitioner {
    grid: GridSpec,
    partitions: Vec<Cell>,
    costs: Vec<u64>,
    /// Row-major cell id -> partition id.
    lookup: Vec<u32>,
    stats: BspBuildStats,
}

impl BspPartitioner {
    /// Build the partitioner from a histogram.
    ///
    /// Fails with a configuration error on `max_cost == 0`. The build is
    /// pure and deterministic.
    pub fn build(histogram: &CellHistogram, config: &BspConfig) -> Result<Self> {
        if config.max_cost == 0 {
            return Err(Error::config("max_cost must be positive"));
        }

        let grid = histogram.grid().clone();
        let sums = PrefixSums::new(histogram);

        let mut spans: Vec<(CellSpan, u64)> = Vec::new();
        let mut splits = 0u64;
        let whole = CellSpan {
            x0: 0,
            y0: 0,
            x1: grid.num_x(),
            y1: grid.num_y(),
        };

        if histogram.total() == 0 {
            // nothing to balance; one partition covers the universe
            spans.push((whole, 0));
        } else if histogram.non_empty_count() <= config.num_cell_threshold {
            Self::sparse_spans(histogram, &grid, &mut spans);
        } else {
            let mut queue = VecDeque::new();
            queue.push_back(whole);
            while let Some(span) = queue.pop_front() {
                let cost = sums.cost(&span);
                if cost <= config.max_cost || span.is_single_cell() {
                    spans.push((span, cost));
                } else {
                    let (a, b) = best_split(&span, &sums);
                    splits += 1;
                    queue.push_back(a);
                    queue.push_back(b);
                }
            }
        }

        Self::from_spans(histogram, grid, spans, splits)
    }

    /// Sparse path: every non-empty cell is a partition, plus one filler
    /// span covering all empty cells.
    ///
    /// The filler is the bounding span of the empty cells, so it may
    /// overlap the single-cell partitions; it carries zero cost and the
    /// id lookup always prefers the occupied cell. Together the spans
    /// still cover the universe exactly.
    fn sparse_spans(
        histogram: &CellHistogram,
        grid: &GridSpec,
        spans: &mut Vec<(CellSpan, u64)>,
    ) {
        let mut filler: Option<CellSpan> = None;
        let mut occupied = Vec::new();
        for (cell, count) in histogram.buckets() {
            let (cx, cy) = grid.cell_coords(cell.id);
            let span = CellSpan {
                x0: cx,
                y0: cy,
                x1: cx + 1,
                y1: cy + 1,
            };
            if *count > 0 {
                occupied.push((span, *count));
            } else {
                filler = Some(match filler {
                    Some(f) => CellSpan {
                        x0: f.x0.min(cx),
                        y0: f.y0.min(cy),
                        x1: f.x1.max(cx + 1),
                        y1: f.y1.max(cy + 1),
                    },
                    None => span,
                });
            }
        }
        // filler first, so occupied cells win the lookup table
        if let Some(f) = filler {
            spans.push((f, 0));
        }
        spans.extend(occupied);
    }

    fn from_spans(
        histogram: &CellHistogram,
        grid: GridSpec,
        spans: Vec<(CellSpan, u64)>,
        splits: u64,
    ) -> Result<Self> {
        let mut partitions = Vec::with_capacity(spans.len());
        let mut costs = Vec::with_capacity(spans.len());
        let mut lookup = vec![u32::MAX; grid.num_cells()];
        let mut max_partition_cost = 0u64;

        for (pid, (span, cost)) in spans.iter().enumerate() {
            let range = grid.span_range(span.x0, span.y0, span.x1, span.y1)?;
            let extent = if histogram.points_only() {
                range.clone()
            } else {
                span_extent(histogram, &grid, span, &range)
            };
            // later writers win; zero-cost fillers are ordered first
            for cy in span.y0..span.y1 {
                for cx in span.x0..span.x1 {
                    lookup[cy * grid.num_x() + cx] = pid as u32;
                }
            }
            max_partition_cost = max_partition_cost.max(*cost);
            partitions.push(Cell::with_extent(pid as u32, range, extent));
            costs.push(*cost);
        }

        let stats = BspBuildStats {
            non_empty_cells: histogram.non_empty_count(),
            partitions: partitions.len(),
            splits,
            max_partition_cost,
        };
        tracing::debug!(
            partitions = stats.partitions,
            splits = stats.splits,
            non_empty_cells = stats.non_empty_cells,
            max_partition_cost = stats.max_partition_cost,
            "built BSP partitioner"
        );

        Ok(Self {
            grid,
            partitions,
            costs,
            lookup,
            stats,
        })
    }

    /// Build statistics.
    pub fn stats(&self) -> &BspBuildStats {
        &self.stats
    }

    /// The histogram grid the partitioner was built over.
    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }

    /// All partitions in id order.
    pub fn partitions(&self) -> &[Cell] {
        &self.partitions
    }

    /// Cost of a partition.
    pub fn cost(&self, id: u32) -> u64 {
        self.costs.get(id as usize).copied().unwrap_or(0)
    }
}

impl SpatialPartitioner for BspPartitioner {
    fn num_partitions(&self) -> u32 {
        self.partitions.len() as u32
    }

    fn partition_id(&self, key: &StObject) -> Result<u32> {
        let cell = self.grid.cell_id(key.geo().centroid())?;
        let pid = self.lookup[cell as usize];
        if pid == u32::MAX {
            return Err(Error::domain(format!(
                "cell {} not covered by any partition",
                cell
            )));
        }
        Ok(pid)
    }

    fn partition_bounds(&self, id: u32) -> Result<Cell> {
        check_partition_id(id, self.num_partitions())?;
        Ok(self.partitions[id as usize].clone())
    }

    fn partition_extent(&self, id: u32) -> Result<NRectRange> {
        check_partition_id(id, self.num_partitions())?;
        Ok(self.partitions[id as usize].extent.clone())
    }

    fn is_empty(&self, id: u32) -> bool {
        self.costs.get(id as usize).map_or(true, |c| *c == 0)
    }
}

/// 2-D prefix sums over the histogram counts for O(1) span costs.
struct PrefixSums {
    num_x: usize,
    sums: Vec<u64>,
}

impl PrefixSums {
    fn new(histogram: &CellHistogram) -> Self {
        let nx = histogram.grid().num_x();
        let ny = histogram.grid().num_y();
        let stride = nx + 1;
        let mut sums = vec![0u64; stride * (ny + 1)];
        for cy in 0..ny {
            for cx in 0..nx {
                let count = histogram.count((cy * nx + cx) as u32);
                sums[(cy + 1) * stride + (cx + 1)] = count
                    + sums[cy * stride + (cx + 1)]
                    + sums[(cy + 1) * stride + cx]
                    - sums[cy * stride + cx];
            }
        }
        Self { num_x: nx, sums }
    }

    /// Sum of cell counts inside a span.
    fn cost(&self, span: &CellSpan) -> u64 {
        let stride = self.num_x + 1;
        self.sums[span.y1 * stride + span.x1] + self.sums[span.y0 * stride + span.x0]
            - self.sums[span.y0 * stride + span.x1]
            - self.sums[span.y1 * stride + span.x0]
    }
}

/// Find the split minimizing the cost imbalance.
///
/// Candidates run over every interior cell boundary of every dimension;
/// ties resolve to the lexicographically first `(dim, boundary)`, which
/// keeps the build deterministic.
fn best_split(span: &CellSpan, sums: &PrefixSums) -> (CellSpan, CellSpan) {
    let mut best: Option<(u64, CellSpan, CellSpan)> = None;
    for d in 0..2 {
        for i in 1..span.cells_in_dim(d) {
            let (a, b) = span.split_at(d, i);
            let score = sums.cost(&a).abs_diff(sums.cost(&b));
            if best.as_ref().map_or(true, |(s, _, _)| score < *s) {
                best = Some((score, a, b));
            }
        }
    }
    let (_, a, b) = best.expect("span with more than one cell has an interior boundary");
    (a, b)
}

/// Extent of a span: its range extended by the extents of the non-empty
/// cells it covers.
fn span_extent(
    histogram: &CellHistogram,
    grid: &GridSpec,
    span: &CellSpan,
    range: &NRectRange,
) -> NRectRange {
    let mut extent = range.clone();
    for cy in span.y0..span.y1 {
        for cx in span.x0..span.x1 {
            let id = (cy * grid.num_x() + cx) as u32;
            if let Some((cell, count)) = histogram.bucket(id) {
                if *count > 0 {
                    extent = extent.extend(&cell.extent);
                }
            }
        }
    }
    extent
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

    fn histogram_of(objs: &[StObject], side: f64) -> CellHistogram {
        let grid = GridSpec::with_side_lengths(universe10(), side, side).unwrap();
        CellHistogram::build_from(grid, true, objs.iter()).unwrap()
    }

    #[test]
    fn test_invalid_config() {
        let hist = histogram_of(&[pt(0.5, 0.5)], 1.0);
        let err = BspPartitioner::build(&hist, &BspConfig::new(0)).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_hot_cell_sparse_path() {
        // 1000 objects in cell (0, 0), everything else empty
        let objs: Vec<StObject> = (0..1000).map(|_| pt(0.5, 0.5)).collect();
        let hist = histogram_of(&objs, 1.0);
        let bsp = BspPartitioner::build(&hist, &BspConfig::new(100)).unwrap();

        // one partition for the hot cell, one filler covering the 99
        // empty cells
        assert_eq!(bsp.num_partitions(), 2);
        let hot_id = bsp.partition_id(&pt(0.5, 0.5)).unwrap();
        let hot = bsp.partition_bounds(hot_id).unwrap();
        assert_eq!(hot.range, NRectRange::new2(0.0, 0.0, 1.0, 1.0).unwrap());
        assert_eq!(bsp.cost(hot_id), 1000);

        let filler_id = 1 - hot_id;
        assert!(bsp.is_empty(filler_id));
        assert_eq!(bsp.cost(filler_id), 0);
        // the filler covers every empty cell
        let filler = bsp.partition_bounds(filler_id).unwrap();
        for cell_id in 1..100u32 {
            let range = hist.grid().cell_range(cell_id).unwrap();
            assert!(filler.range.contains(&range), "cell {} uncovered", cell_id);
        }
    }

    #[test]
    fn test_split_path_respects_max_cost() {
        // uniform data: one object per cell, forced past the sparse path
        let objs: Vec<StObject> = (0..100)
            .map(|i| pt((i % 10) as f64 + 0.5, (i / 10) as f64 + 0.5))
            .collect();
        let hist = histogram_of(&objs, 1.0);
        let config = BspConfig::new(25).with_cell_threshold(0);
        let bsp = BspPartitioner::build(&hist, &config).unwrap();

        assert!(bsp.stats().splits > 0);
        for id in 0..bsp.num_partitions() {
            let bounds = bsp.partition_bounds(id).unwrap();
            let single_cell = bounds.range.lengths().iter().all(|l| *l <= 1.0);
            assert!(
                bsp.cost(id) <= 25 || single_cell,
                "partition {} has cost {} over more than one cell",
                id,
                bsp.cost(id)
            );
        }
    }

    #[test]
    fn test_split_path_covers_universe_disjointly() {
        let objs: Vec<StObject> = (0..100)
            .map(|i| pt((i % 10) as f64 + 0.5, (i / 10) as f64 + 0.5))
            .collect();
        let hist = histogram_of(&objs, 1.0);
        let config = BspConfig::new(10).with_cell_threshold(0);
        let bsp = BspPartitioner::build(&hist, &config).unwrap();

        // every cell belongs to exactly one partition
        let mut covered = vec![0u32; 100];
        for id in 0..bsp.num_partitions() {
            let bounds = bsp.partition_bounds(id).unwrap();
            for cell_id in 0..100u32 {
                let range = hist.grid().cell_range(cell_id).unwrap();
                if bounds.range.contains(&range) {
                    covered[cell_id as usize] += 1;
                }
            }
        }
        assert!(covered.iter().all(|c| *c == 1));

        // total cost is conserved
        let total: u64 = (0..bsp.num_partitions()).map(|id| bsp.cost(id)).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_deterministic_build() {
        let objs: Vec<StObject> = (0..200)
            .map(|i| pt((i % 10) as f64 + 0.3, ((i / 2) % 10) as f64 + 0.7))
            .collect();
        let hist = histogram_of(&objs, 1.0);
        let config = BspConfig::new(20).with_cell_threshold(4);
        let a = BspPartitioner::build(&hist, &config).unwrap();
        let b = BspPartitioner::build(&hist, &config).unwrap();

        assert_eq!(a.num_partitions(), b.num_partitions());
        for id in 0..a.num_partitions() {
            assert_eq!(
                a.partition_bounds(id).unwrap(),
                b.partition_bounds(id).unwrap()
            );
        }
    }

    #[test]
    fn test_empty_histogram_single_partition() {
        let grid = GridSpec::with_side_lengths(universe10(), 1.0, 1.0).unwrap();
        let hist =
            CellHistogram::build_from(grid, true, std::iter::empty::<&StObject>()).unwrap();
        let bsp = BspPartitioner::build(&hist, &BspConfig::new(10)).unwrap();
        assert_eq!(bsp.num_partitions(), 1);
        assert_eq!(bsp.partition_bounds(0).unwrap().range, universe10());
    }

    #[test]
    fn test_extent_accumulation_on_split_path() {
        // polygons whose envelopes spill over their centroid cells
        let objs: Vec<StObject> = (0..100)
            .map(|i| {
                let x = (i % 10) as f64;
                let y = (i / 10) as f64;
                StObject::from_wkt(&format!(
                    "POLYGON(({} {}, {} {}, {} {}, {} {}))",
                    x,
                    y,
                    x + 1.4,
                    y,
                    x + 0.7,
                    y + 0.9,
                    x,
                    y
                ))
                .unwrap()
            })
            .collect();
        let grid = GridSpec::with_side_lengths(universe10(), 1.0, 1.0).unwrap();
        let hist = CellHistogram::build_from(grid, false, objs.iter()).unwrap();
        let config = BspConfig::new(25).with_cell_threshold(0);
        let bsp = BspPartitioner::build(&hist, &config).unwrap();

        for (i, obj) in objs.iter().enumerate() {
            let pid = bsp.partition_id(obj).unwrap();
            let extent = bsp.partition_extent(pid).unwrap();
            assert!(
                extent.contains(obj.geo().envelope()),
                "object {} envelope outside its partition extent",
                i
            );
        }
    }
}
