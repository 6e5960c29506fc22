//! The narrow interface to the coordination service.
//!
//! The service stores small values in a hierarchy of nodes addressed by `/`-separated paths,
//! in the manner of ZooKeeper. Every call is a separate round-trip and fails independently; a
//! missing node is always reported as [`ConnError::NoNode`] so callers can tell "absent" apart
//! from a failure of the service itself.
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::oneshot;

/// Receives at most one [`WatchEvent`]. A closed channel means the watch broke.
pub type WatchReceiver = oneshot::Receiver<WatchEvent>;

/// What happened to a watched node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    DataChanged,
    Deleted,
}

/// Version of a node, incremented on every write
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(i64);

impl Version {
    pub fn new(v: i64) -> Self {
        Self(v)
    }

    pub fn get(&self) -> i64 {
        self.0
    }

    /// The version after the next write
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata returned alongside a node's data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub version: Version,
    pub data_length: usize,
}

/// Failure of a single call to the coordination service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnError {
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

    #[error("invalid path: {path:?}")]
    InvalidPath { path: String },

    #[error("coordination service unavailable: {message}")]
    Unavailable { message: String },
}

impl ConnError {
    /// Whether the node did not exist
    pub fn is_no_node(&self) -> bool {
        matches!(self, Self::NoNode { .. })
    }
}

/// Client for the coordination service
#[async_trait]
pub trait TopoConn: fmt::Debug + Send + Sync + 'static {
    /// Read the data of the node at `path`
    async fn get(&self, path: &str) -> Result<(Bytes, Stat), ConnError>;

    /// Replace the data of the existing node at `path`.
    ///
    /// With `Some(version)` the write only succeeds if the node is at that version.
    async fn set(
        &self,
        path: &str,
        data: Bytes,
        version: Option<Version>,
    ) -> Result<Stat, ConnError>;

    /// Create the node at `path`. Fails with [`ConnError::NodeExists`] rather than overwrite,
    /// and with [`ConnError::NoNode`] if the parent is missing.
    async fn create(&self, path: &str, data: Bytes) -> Result<(), ConnError>;

    /// Delete the node at `path`, which must not have children
    async fn delete(&self, path: &str, version: Option<Version>) -> Result<(), ConnError>;

    /// Names (not paths) of the children of `path`, in no particular order
    async fn children(&self, path: &str) -> Result<Vec<String>, ConnError>;

    /// Register a one-shot watch on the existing node at `path`
    async fn watch(&self, path: &str) -> Result<WatchReceiver, ConnError>;
}

/// The ancestors of `path`, outermost first, excluding the root
fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/')
        .map(|(i, _)| i)
        .filter(|i| *i > 0)
        .map(move |i| &path[..i])
}

/// Create the node at `path` with `data`, first creating any missing parents with no data.
///
/// Parents created concurrently by someone else are fine, but the final node must not exist:
/// that fails with [`ConnError::NodeExists`].
pub async fn create_recursive(
    conn: &dyn TopoConn,
    path: &str,
    data: Bytes,
) -> Result<(), ConnError> {
    match conn.create(path, data.clone()).await {
        Err(ConnError::NoNode { .. }) => {}
        other => return other,
    }

    for parent in ancestors(path) {
        match conn.create(parent, Bytes::new()).await {
            Ok(()) | Err(ConnError::NodeExists { .. }) => {}
            Err(e) => return Err(e),
        }
    }
    conn.create(path, data).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryConn;

    #[test]
    fn test_ancestors() {
        assert_eq!(
            ancestors("/zk/cell/vt/ns").collect::<Vec<_>>(),
            vec!["/zk", "/zk/cell", "/zk/cell/vt"]
        );
        assert_eq!(ancestors("/zk").count(), 0);
    }

    #[tokio::test]
    async fn test_create_recursive() {
        let conn = InMemoryConn::new();
        conn.create("/zk", Bytes::new()).await.unwrap();

        create_recursive(&conn, "/zk/a/b/c", Bytes::from("leaf"))
            .await
            .unwrap();

        assert_eq!(conn.get("/zk/a/b/c").await.unwrap().0, Bytes::from("leaf"));
        assert!(conn.get("/zk/a/b").await.unwrap().0.is_empty());

        // a sibling reuses the existing parents
        create_recursive(&conn, "/zk/a/b/d", Bytes::from("other"))
            .await
            .unwrap();

        let err = create_recursive(&conn, "/zk/a/b/c", Bytes::from("again"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ConnError::NodeExists {
                path: "/zk/a/b/c".into()
            }
        );
    }

    #[tokio::test]
    async fn test_create_recursive_unavailable() {
        let conn = InMemoryConn::new();
        conn.set_available(false);

        let err = create_recursive(&conn, "/zk/a", Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConnError::Unavailable { .. }));
    }
}
