//! The spatial partitioner interface.
//!
//! Both partitioners expose the same contract: a fixed number of
//! partitions, an id lookup by object centroid, and per-partition bounds
//! and extents the operators prune against. A partitioner is an immutable
//! artifact: it is built from a dataset (or a sample) in one phase and
//! then drives repartitioning and pruning in the next. It never holds a
//! reference to the data it was built from.

use stark_core::cell::{Cell, NRectRange};
use stark_core::error::Result;
use stark_core::object::StObject;

/// A spatial partitioner over a bounded universe.
pub trait SpatialPartitioner: Send + Sync {
    /// Total number of partitions.
    fn num_partitions(&self) -> u32;

    /// Partition id for an object, derived from its centroid.
    ///
    /// Fails with a domain error for objects outside the universe.
    fn partition_id(&self, key: &StObject) -> Result<u32>;

    /// Bounds of a partition.
    fn partition_bounds(&self, id: u32) -> Result<Cell>;

    /// Accumulated extent of a partition (contains its bounds).
    fn partition_extent(&self, id: u32) -> Result<NRectRange>;

    /// True when no object was ever assigned to this partition, letting
    /// the runtime skip it entirely.
    fn is_empty(&self, id: u32) -> bool;
}
