//! Per-cell storage of the serving graph.
//!
//! Each cell keeps its records under `/zk/<cell>/vt`:
//!
//! ```text
//! /zk/<cell>/vt/ns/<keyspace>    SrvKeyspace
//! /zk/<cell>/vt/vschema          SrvVSchema
//! ```
//!
//! Records are pretty printed JSON. A node that exists with no data is treated like a missing
//! node, which is what parents created on the way to a record look like.
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::debug;

use crate::conn::{ConnError, TopoConn, create_recursive};
use crate::error::{Error, Result};
use crate::records::{ServingRecord, SrvKeyspace, SrvVSchema};
use crate::watch::WatchSubscription;

/// How long a watch waits before retrying when the watched node is missing, the watch broke or
/// the coordination service failed
pub const DEFAULT_WATCH_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Tuning of a [`ServingGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServingGraphConfig {
    /// See [`DEFAULT_WATCH_POLL_INTERVAL`]
    pub watch_poll_interval: Duration,
    /// Upper bound for each store operation, none if unset. An update that falls back to
    /// creating the node and its parents is bounded as a whole. In a watch, every read and
    /// every watch registration is bounded separately.
    pub request_timeout: Option<Duration>,
}

impl Default for ServingGraphConfig {
    fn default() -> Self {
        Self {
            watch_poll_interval: DEFAULT_WATCH_POLL_INTERVAL,
            request_timeout: None,
        }
    }
}

/// Root of everything stored for `cell`
pub fn cell_path(cell: &str) -> String {
    format!("/zk/{cell}/vt")
}

/// Parent of the [`SrvKeyspace`] nodes of `cell`
pub fn srv_keyspaces_path(cell: &str) -> String {
    format!("{}/ns", cell_path(cell))
}

/// Node of the [`SrvKeyspace`] of `keyspace` in `cell`
pub fn srv_keyspace_path(cell: &str, keyspace: &str) -> String {
    format!("{}/{keyspace}", srv_keyspaces_path(cell))
}

/// Node of the [`SrvVSchema`] of `cell`
pub fn srv_vschema_path(cell: &str) -> String {
    format!("{}/vschema", cell_path(cell))
}

/// The serving graph of every cell, stored in a coordination service.
///
/// The store keeps no state of its own: every call is answered by the coordination service.
/// Dropping a returned future abandons the operation.
#[derive(Debug, Clone)]
pub struct ServingGraph {
    conn: Arc<dyn TopoConn>,
    config: ServingGraphConfig,
}

impl ServingGraph {
    /// A store using `conn` for every operation
    pub fn new(conn: Arc<dyn TopoConn>, config: ServingGraphConfig) -> Self {
        Self { conn, config }
    }

    /// The configuration the store was built with
    pub fn config(&self) -> ServingGraphConfig {
        self.config
    }

    pub(crate) fn conn(&self) -> &dyn TopoConn {
        self.conn.as_ref()
    }

    /// Names of the keyspaces with a serving descriptor in `cell`, sorted. Empty if the cell
    /// has none.
    pub async fn get_srv_keyspace_names(&self, cell: &str) -> Result<Vec<String>> {
        let path = srv_keyspaces_path(cell);
        match self.round_trip(&path, self.conn.children(&path)).await {
            Ok(mut names) => {
                names.sort();
                Ok(names)
            }
            Err(Error::NoNode { .. }) => Ok(vec![]),
            Err(e) => Err(e),
        }
    }

    /// The serving descriptor of `keyspace` in `cell`, `None` if there is none
    pub async fn get_srv_keyspace(
        &self,
        cell: &str,
        keyspace: &str,
    ) -> Result<Option<SrvKeyspace>> {
        self.get_record(&srv_keyspace_path(cell, keyspace)).await
    }

    /// Replace the serving descriptor of `keyspace` in `cell`, creating it if missing.
    ///
    /// The write is a `set` followed, if the node is missing, by a create of the node and its
    /// parents. Should another writer create the node between the two, this fails with
    /// [`Error::NodeExists`] and the other write wins; callers may retry.
    pub async fn update_srv_keyspace(
        &self,
        cell: &str,
        keyspace: &str,
        srv_keyspace: &SrvKeyspace,
    ) -> Result<()> {
        self.update_record(&srv_keyspace_path(cell, keyspace), srv_keyspace)
            .await
    }

    /// Delete the serving descriptor of `keyspace` in `cell`. Fails with [`Error::NoNode`] if
    /// there is none.
    pub async fn delete_srv_keyspace(&self, cell: &str, keyspace: &str) -> Result<()> {
        let path = srv_keyspace_path(cell, keyspace);
        self.round_trip(&path, self.conn.delete(&path, None)).await
    }

    /// The schema routing rules of `cell`, `None` if there are none
    pub async fn get_srv_vschema(&self, cell: &str) -> Result<Option<SrvVSchema>> {
        self.get_record(&srv_vschema_path(cell)).await
    }

    /// Replace the schema routing rules of `cell`, see [`Self::update_srv_keyspace`]
    pub async fn update_srv_vschema(&self, cell: &str, srv_vschema: &SrvVSchema) -> Result<()> {
        self.update_record(&srv_vschema_path(cell), srv_vschema)
            .await
    }

    /// Follow the serving descriptor of `keyspace` in `cell`.
    ///
    /// Must be called from within a tokio runtime, see [`WatchSubscription`].
    pub fn watch_srv_keyspace(
        &self,
        cell: &str,
        keyspace: &str,
    ) -> WatchSubscription<SrvKeyspace> {
        WatchSubscription::spawn(self.clone(), srv_keyspace_path(cell, keyspace))
    }

    /// Follow the schema routing rules of `cell`.
    ///
    /// Must be called from within a tokio runtime, see [`WatchSubscription`].
    pub fn watch_srv_vschema(&self, cell: &str) -> WatchSubscription<SrvVSchema> {
        WatchSubscription::spawn(self.clone(), srv_vschema_path(cell))
    }

    /// Await `fut`, bounded by the configured request timeout
    pub(crate) async fn round_trip<T, F>(&self, path: &str, fut: F) -> Result<T>
    where
        T: Send,
        F: Future<Output = Result<T, ConnError>> + Send,
    {
        let Some(timeout) = self.config.request_timeout else {
            return Ok(fut.await?);
        };
        match tokio::time::timeout(timeout, fut).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(Error::Timeout {
                path: path.to_string(),
                timeout,
            }),
        }
    }

    async fn get_record<R: ServingRecord>(&self, path: &str) -> Result<Option<R>> {
        match self.round_trip(path, self.conn.get(path)).await {
            Ok((data, _)) => decode(path, &data),
            Err(Error::NoNode { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// `set`, then create on a missing node. Both steps share one request timeout.
    async fn update_record<R: ServingRecord>(&self, path: &str, record: &R) -> Result<()> {
        let data = encode(record)?;
        let update = async {
            match self.conn.set(path, data.clone(), None).await {
                Ok(_) => Ok(()),
                Err(ConnError::NoNode { .. }) => {
                    debug!(path, record = R::NAME, "node missing, creating it");
                    create_recursive(self.conn(), path, data).await
                }
                Err(e) => Err(e),
            }
        };
        self.round_trip(path, update).await
    }
}

fn encode<R: ServingRecord>(record: &R) -> Result<Bytes> {
    serde_json::to_vec_pretty(record)
        .map(Bytes::from)
        .map_err(|source| Error::Serialize {
            record: R::NAME,
            source,
        })
}

/// Decode the data stored at `path`, empty data meaning no record
pub(crate) fn decode<R: ServingRecord>(path: &str, data: &[u8]) -> Result<Option<R>> {
    if data.is_empty() {
        return Ok(None);
    }
    serde_json::from_slice(data)
        .map(Some)
        .map_err(|source| Error::Malformed {
            path: path.to_string(),
            len: data.len(),
            source,
        })
}
