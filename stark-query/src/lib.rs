//! Spatial operators for the STARK engine.
//!
//! Operators fuse two layers built elsewhere: partitioner pruning (skip
//! partitions whose extents cannot match) and per-partition R-tree
//! lookups (skip records whose MBRs cannot match), then apply the exact
//! spatio-temporal predicate. The runtime contract is the minimal
//! [`SpatialCollection`]: rayon-parallel per-partition tasks with
//! cancellable element streams.
//!
//! - [`collection`]: the partitioned collection and [`CancelToken`]
//! - [`filter`]: partition-pruning filter against one query object
//! - [`join`]: pair-pruning join of two collections
//! - [`knn`]: two-pass k-nearest-neighbor search
//! - [`skyline`]: BBS-style, aggregate, and angular skylines

pub mod collection;
pub mod filter;
pub mod join;
pub mod knn;
pub mod skyline;

pub use collection::{broadcast, CancelToken, SpatialCollection};
pub use filter::{spatial_filter, IndexMode};
pub use join::{spatial_join, JoinCondition, JoinOptions};
pub use knn::{knn, Knn};
pub use skyline::{
    distance_pair, dominates_min, skyline, skyline_agg, skyline_angular, DominatesFn, SkyPoint,
    Skyline,
};
