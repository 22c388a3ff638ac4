//! Error taxonomy for graph injection and configuration
//!
//! Numeric non-convergence of the line search is deliberately absent here:
//! an exhausted search accepts its last trial state and the optimizer keeps
//! going. See [`crate::controller`].

use thiserror::Error;

/// Errors that can occur while building a graph or loading configuration
#[derive(Error, Debug)]
pub enum LayoutError {
    /// Inserting would grow the store past its preallocated capacity
    #[error("capacity exceeded: the store holds at most {capacity} particles")]
    CapacityExceeded { capacity: usize },

    /// A link references a particle index that does not exist
    #[error("invalid link endpoint {endpoint}: store has {particle_count} particles")]
    InvalidEndpoint { endpoint: u32, particle_count: usize },

    /// A link connects a particle to itself
    #[error("particle {0} cannot be linked to itself")]
    SelfLink(u32),

    /// The configuration is well-formed but semantically invalid
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The configuration file extension is not recognized
    #[error("unsupported configuration format: {0}")]
    UnsupportedConfigFormat(String),

    /// An I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The GPU backend could not be initialized or failed a readback
    #[cfg(feature = "gpu")]
    #[error("GPU error: {0}")]
    Gpu(String),
}

/// Result type for layout operations
pub type LayoutResult<T> = Result<T, LayoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_their_context() {
        let err = LayoutError::InvalidEndpoint {
            endpoint: 7,
            particle_count: 5,
        };
        assert_eq!(
            err.to_string(),
            "invalid link endpoint 7: store has 5 particles"
        );

        let err = LayoutError::CapacityExceeded { capacity: 5 };
        assert!(err.to_string().contains("at most 5"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: LayoutError = io.into();
        assert!(matches!(err, LayoutError::Io(_)));
    }
}
