//! Uniform grid partitioner.
//!
//! Maps every object to the grid cell holding its centroid. The grid is
//! derived either from a target number of cells per dimension or from a
//! fixed cell side length. The builder walks the dataset once to record
//! which cells were ever assigned, so the runtime can skip empty
//! partitions without scanning them.

use crate::histogram::GridSpec;
use crate::partitioner::SpatialPartitioner;
use rustc_hash::FxHashSet;
use stark_core::cell::{Cell, NRectRange};
use stark_core::error::{Error, Result};
use stark_core::object::StObject;

/// Partitioner assigning objects to uniform grid cells.
#[derive(Debug, Clone)]
pub struct GridPartitioner {
    grid: GridSpec,
    non_empty: FxHashSet<u32>,
}

impl GridPartitioner {
    /// Build a grid partitioner with a fixed number of cells per
    /// dimension.
    pub fn with_parts_per_dim<'a>(
        universe: NRectRange,
        parts_per_dim: usize,
        objs: impl IntoIterator<Item = &'a StObject>,
    ) -> Result<Self> {
        Self::build(GridSpec::with_parts_per_dim(universe, parts_per_dim)?, objs)
    }

    /// Build a grid partitioner with a fixed cell side length.
    pub fn with_side_length<'a>(
        universe: NRectRange,
        side_length: f64,
        objs: impl IntoIterator<Item = &'a StObject>,
    ) -> Result<Self> {
        Self::build(
            GridSpec::with_side_lengths(universe, side_length, side_length)?,
            objs,
        )
    }

    fn build<'a>(grid: GridSpec, objs: impl IntoIterator<Item = &'a StObject>) -> Result<Self> {
        let mut non_empty = FxHashSet::default();
        for obj in objs {
            non_empty.insert(grid.cell_id(obj.geo().centroid())?);
        }
        tracing::debug!(
            partitions = grid.num_cells(),
            non_empty = non_empty.len(),
            "built grid partitioner"
        );
        Ok(Self { grid, non_empty })
    }

    /// The underlying grid.
    pub fn grid(&self) -> &GridSpec {
        &self.grid
    }
}

impl SpatialPartitioner for GridPartitioner {
    fn num_partitions(&self) -> u32 {
        self.grid.num_cells() as u32
    }

    fn partition_id(&self, key: &StObject) -> Result<u32> {
        self.grid.cell_id(key.geo().centroid())
    }

    fn partition_bounds(&self, id: u32) -> Result<Cell> {
        Ok(Cell::new(id, self.grid.cell_range(id)?))
    }

    fn partition_extent(&self, id: u32) -> Result<NRectRange> {
        // the grid tracks no per-object envelopes; the extent is the cell
        self.grid.cell_range(id)
    }

    fn is_empty(&self, id: u32) -> bool {
        if id as usize >= self.grid.num_cells() {
            return true;
        }
        !self.non_empty.contains(&id)
    }
}

/// Validate a partition id against a partitioner.
pub(crate) fn check_partition_id(id: u32, num: u32) -> Result<()> {
    if id >= num {
        return Err(Error::domain(format!(
            "partition id {} out of range ({} partitions)",
            id, num
        )));
    }
    Ok(())
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
    fn test_partition_id_matches_cell_id() {
        let objs = vec![pt(3.5, 2.1)];
        let p = GridPartitioner::with_parts_per_dim(universe10(), 10, objs.iter()).unwrap();
        assert_eq!(p.num_partitions(), 100);
        assert_eq!(p.partition_id(&objs[0]).unwrap(), 23);
    }

    #[test]
    fn test_non_empty_tracking() {
        let objs = vec![pt(0.5, 0.5), pt(9.5, 9.5)];
        let p = GridPartitioner::with_parts_per_dim(universe10(), 10, objs.iter()).unwrap();
        assert!(!p.is_empty(0));
        assert!(!p.is_empty(99));
        assert!(p.is_empty(50));
    }

    #[test]
    fn test_out_of_universe_object() {
        let p = GridPartitioner::with_parts_per_dim(universe10(), 10, std::iter::empty::<&StObject>())
            .unwrap();
        assert!(p.partition_id(&pt(10.0, 10.0)).is_err());
    }

    #[test]
    fn test_bounds_and_extent_coincide() {
        let p = GridPartitioner::with_side_length(universe10(), 2.0, std::iter::empty::<&StObject>())
            .unwrap();
        assert_eq!(p.num_partitions(), 25);
        let cell = p.partition_bounds(0).unwrap();
        assert_eq!(cell.range, NRectRange::new2(0.0, 0.0, 2.0, 2.0).unwrap());
        assert_eq!(p.partition_extent(0).unwrap(), cell.range);
    }
}
