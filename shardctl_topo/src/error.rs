use std::time::Duration;

use crate::conn::{ConnError, Version};

/// Errors of [`ServingGraph`](crate::ServingGraph) operations.
///
/// A missing node, an existing node, a version conflict and a non-empty node keep their own
/// variants so callers can branch on them; any other failure of the service is [`Error::Conn`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("node does not exist: {path}")]
    NoNode { path: String },

    #[error("node already exists: {path}")]
    NodeExists { path: String },

    #[error("bad version for {path}: expected {expected}, found {actual}")]
    BadVersion {
        path: String,
        expected: Version,
        actual: Version,
    },

    #[error("node has children: {path}")]
    NotEmpty { path: String },

    #[error("coordination service error: {0}")]
    Conn(ConnError),

    #[error("request to {path} timed out after {timeout:?}")]
    Timeout { path: String, timeout: Duration },

    #[error("failed to serialize {record}: {source}")]
    Serialize {
        record: &'static str,
        source: serde_json::Error,
    },

    #[error("malformed data at {path} ({len} bytes): {source}")]
    Malformed {
        path: String,
        len: usize,
        source: serde_json::Error,
    },
}

/// Result type of the serving graph store
pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Whether the node did not exist
    pub fn is_no_node(&self) -> bool {
        matches!(self, Self::NoNode { .. })
    }
}

impl From<ConnError> for Error {
    fn from(e: ConnError) -> Self {
        match e {
            ConnError::NoNode { path } => Self::NoNode { path },
            ConnError::NodeExists { path } => Self::NodeExists { path },
            ConnError::BadVersion {
                path,
                expected,
                actual,
            } => Self::BadVersion {
                path,
                expected,
                actual,
            },
            ConnError::NotEmpty { path } => Self::NotEmpty { path },
            e @ (ConnError::InvalidPath { .. } | ConnError::Unavailable { .. }) => Self::Conn(e),
        }
    }
}
