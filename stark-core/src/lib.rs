//! Core value types for the STARK spatio-temporal engine.
//!
//! This crate holds everything the partitioning, indexing, and operator
//! crates agree on:
//!
//! - [`geometry`]: the facade over the `geo` crate family (WKT parsing,
//!   DE-9IM predicates, distance, envelope, centroid)
//! - [`temporal`]: instants and intervals with their interval algebra
//! - [`object`]: [`StObject`], the spatio-temporal value, and its
//!   predicate composition rule
//! - [`cell`]: n-dimensional points, right-open axis-aligned ranges, and
//!   grid cells with accumulated extents
//! - [`predicate`]: the tagged predicate variant operators dispatch on
//! - [`error`]: the shared error type

pub mod cell;
pub mod error;
pub mod geometry;
pub mod object;
pub mod predicate;
pub mod temporal;

pub use cell::{Cell, NPoint, NRectRange, EPS};
pub use error::{Error, Result};
pub use geometry::{haversine_distance, parse_wkt, DistanceMetric, Geo};
pub use object::StObject;
pub use predicate::JoinPredicate;
pub use temporal::TemporalExpr;
