//! Error types for ferrodist

use thiserror::Error;

/// Result type for ferrodist operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for partitioning and collective operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A process-wide environment has already been installed
    #[error("environment has already been installed")]
    AlreadyInitialized,

    /// No process-wide environment has been installed
    #[error("environment has not been installed")]
    NotInitialized,

    /// Split dimension or axis does not name a dimension of the array
    #[error("invalid dimension {axis} for an array with {ndim} dimensions")]
    InvalidDimension {
        /// Requested axis, before negative-index normalization
        axis: isize,
        /// Number of dimensions of the array
        ndim: usize,
    },

    /// Root rank outside of the process group
    #[error("invalid root {root} for a group of size {size}")]
    InvalidRoot {
        /// Requested root rank
        root: i32,
        /// Size of the process group
        size: i32,
    },

    /// Peer rank outside of the process group
    #[error("Invalid rank: {0}")]
    InvalidRank(i32),

    /// Buffers violate the shape rules of a rooted or axis-based collective
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Source and destination buffers differ in shape
    #[error("buffer mismatch: source shape {source_shape:?}, destination shape {destination_shape:?}")]
    BufferMismatch {
        /// Shape of the source buffer
        source_shape: Vec<usize>,
        /// Shape of the destination buffer
        destination_shape: Vec<usize>,
    },

    /// The transport reported an error or the group lost a member
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a [`Error::TransportFailure`] from anything printable.
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::TransportFailure(msg.into())
    }

    /// Whether this error was raised by argument validation, i.e. before any
    /// transport call was issued.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidDimension { .. }
                | Error::InvalidRoot { .. }
                | Error::InvalidRank(_)
                | Error::ShapeMismatch(_)
                | Error::BufferMismatch { .. }
        )
    }
}
