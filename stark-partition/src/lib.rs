//! Spatial partitioners for the STARK engine.
//!
//! A partitioner is built in one pass over a dataset (or a sample) and
//! then acts as an immutable artifact: it maps objects to partition ids
//! and exposes per-partition bounds and extents for operator pruning.
//!
//! - [`histogram`]: the uniform-grid cell histogram both partitioners
//!   consume, plus the shared [`GridSpec`] geometry
//! - [`grid`]: the uniform grid partitioner
//! - [`bsp`]: the cost-balanced binary space partitioner
//! - [`manifest`]: the `partition_info` sidecar writer and reader

pub mod bsp;
pub mod grid;
pub mod histogram;
pub mod manifest;
pub mod partitioner;

pub use bsp::{BspBuildStats, BspConfig, BspPartitioner};
pub use grid::GridPartitioner;
pub use histogram::{universe_from, CellHistogram, CellHistogramBuilder, GridSpec};
pub use manifest::{read_manifest, write_manifest, write_manifest_with_temporal, ManifestEntry};
pub use partitioner::SpatialPartitioner;
