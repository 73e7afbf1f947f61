//! Error types shared across the STARK crates.

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type.
///
/// Every failure mode of the engine maps to one of these kinds; the
/// enclosing task decides whether to retry. Partitioner and index builds
/// are pure, so retrying them at the task level is always safe.
#[derive(Error, Debug)]
pub enum Error {
    /// Coordinate outside the universe, negative dimensions, or an empty
    /// dataset where a non-empty one is required.
    #[error("domain error: {0}")]
    Domain(String),

    /// Invalid partitioner or operator parameters.
    #[error("configuration error: {0}")]
    Config(String),

    /// Operation invoked on a component in the wrong state.
    #[error("usage error: {0}")]
    Usage(String),

    /// WKT parse failure, invalid geometry, or non-finite coordinates.
    #[error("geometry error: {0}")]
    Geometry(String),

    /// Cancellation observed between element emissions.
    #[error("interrupted")]
    Interrupted,

    /// I/O error during manifest read/write.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a domain error
    pub fn domain(msg: impl Into<String>) -> Self {
        Error::Domain(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a usage error
    pub fn usage(msg: impl Into<String>) -> Self {
        Error::Usage(msg.into())
    }

    /// Create a geometry error
    pub fn geometry(msg: impl Into<String>) -> Self {
        Error::Geometry(msg.into())
    }
}
