//! Per-partition spatial index for the STARK engine.
//!
//! A single structure, the STR-packed [`RTree`]: bulk-loaded once, then
//! immutable. Operators build it live inside a task over one partition's
//! objects, or broadcast it as a global partition filter.

pub mod rtree;

pub use rtree::{QueryIter, RTree, DEFAULT_ORDER};
