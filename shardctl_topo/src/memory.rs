//! An in-memory implementation of [`TopoConn`], suitable for testing or for running without a
//! coordination service.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::conn::{ConnError, Stat, TopoConn, Version, WatchEvent, WatchReceiver};

/// In-memory node hierarchy with the semantics of a ZooKeeper connection.
///
/// * a node can only be created under an existing parent, the root `/` always exists
/// * every `set` increments the node version
/// * a node with children cannot be deleted
/// * watches fire once, on the next `set` or `delete` of the node
///
/// [`set_available`](Self::set_available) simulates an outage: while unavailable every call
/// fails with [`ConnError::Unavailable`] and all registered watches break.
#[derive(Debug, Default)]
pub struct InMemoryConn {
    state: Mutex<State>,
}

#[derive(Debug, Default)]
struct State {
    nodes: BTreeMap<String, Node>,
    unavailable: bool,
    next_creation: u64,
}

#[derive(Debug)]
struct Node {
    data: Bytes,
    version: Version,
    creation: u64,
    watches: Vec<oneshot::Sender<WatchEvent>>,
}

impl Node {
    fn stat(&self) -> Stat {
        Stat {
            version: self.version,
            data_length: self.data.len(),
        }
    }

    fn fire(&mut self, event: WatchEvent) {
        for w in self.watches.drain(..) {
            // the watcher may have gone away, that is fine
            let _ = w.send(event);
        }
    }
}

fn validate(path: &str) -> Result<(), ConnError> {
    let valid = path.len() > 1
        && path.starts_with('/')
        && !path.ends_with('/')
        && !path.contains("//");
    if valid {
        Ok(())
    } else {
        Err(ConnError::InvalidPath {
            path: path.to_string(),
        })
    }
}

fn parent(path: &str) -> Option<&str> {
    match path.rfind('/') {
        Some(0) | None => None,
        Some(i) => Some(&path[..i]),
    }
}

fn no_node(path: &str) -> ConnError {
    ConnError::NoNode {
        path: path.to_string(),
    }
}

impl State {
    fn check_available(&self) -> Result<(), ConnError> {
        if self.unavailable {
            return Err(ConnError::Unavailable {
                message: "in-memory service marked unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn node_mut(&mut self, path: &str) -> Result<&mut Node, ConnError> {
        self.nodes.get_mut(path).ok_or_else(|| no_node(path))
    }

    /// Direct children of `path` as `(name, node)`, in path order
    fn children_of(&self, path: &str) -> Vec<(&str, &Node)> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, n)| {
                let name = &k[prefix.len()..];
                (!name.contains('/')).then_some((name, n))
            })
            .collect()
    }
}

impl InMemoryConn {
    /// An empty, available service
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage of the service, or recover from one
    pub fn set_available(&self, available: bool) {
        let mut state = self.state.lock();
        state.unavailable = !available;
        if !available {
            for node in state.nodes.values_mut() {
                // dropping the senders breaks the watches
                node.watches.clear();
            }
        }
    }

    /// The number of watches registered, not yet fired and still listened to
    pub fn pending_watches(&self) -> usize {
        self.state
            .lock()
            .nodes
            .values()
            .flat_map(|n| n.watches.iter())
            .filter(|w| !w.is_closed())
            .count()
    }
}

#[async_trait]
impl TopoConn for InMemoryConn {
    async fn get(&self, path: &str) -> Result<(Bytes, Stat), ConnError> {
        validate(path)?;
        let state = self.state.lock();
        state.check_available()?;
        let node = state.nodes.get(path).ok_or_else(|| no_node(path))?;
        Ok((node.data.clone(), node.stat()))
    }

    async fn set(
        &self,
        path: &str,
        data: Bytes,
        version: Option<Version>,
    ) -> Result<Stat, ConnError> {
        validate(path)?;
        let mut state = self.state.lock();
        state.check_available()?;
        let node = state.node_mut(path)?;
        if let Some(expected) = version {
            if expected != node.version {
                return Err(ConnError::BadVersion {
                    path: path.to_string(),
                    expected,
                    actual: node.version,
                });
            }
        }
        node.data = data;
        node.version = node.version.next();
        node.fire(WatchEvent::DataChanged);
        Ok(node.stat())
    }

    async fn create(&self, path: &str, data: Bytes) -> Result<(), ConnError> {
        validate(path)?;
        let mut state = self.state.lock();
        state.check_available()?;
        if state.nodes.contains_key(path) {
            return Err(ConnError::NodeExists {
                path: path.to_string(),
            });
        }
        if let Some(parent) = parent(path) {
            if !state.nodes.contains_key(parent) {
                return Err(no_node(parent));
            }
        }
        let creation = state.next_creation;
        state.next_creation += 1;
        state.nodes.insert(
            path.to_string(),
            Node {
                data,
                version: Version::default(),
                creation,
                watches: vec![],
            },
        );
        Ok(())
    }

    async fn delete(&self, path: &str, version: Option<Version>) -> Result<(), ConnError> {
        validate(path)?;
        let mut state = self.state.lock();
        state.check_available()?;
        let current = state.node_mut(path)?.version;
        if let Some(expected) = version {
            if expected != current {
                return Err(ConnError::BadVersion {
                    path: path.to_string(),
                    expected,
                    actual: current,
                });
            }
        }
        if !state.children_of(path).is_empty() {
            return Err(ConnError::NotEmpty {
                path: path.to_string(),
            });
        }
        if let Some(mut node) = state.nodes.remove(path) {
            node.fire(WatchEvent::Deleted);
        }
        Ok(())
    }

    async fn children(&self, path: &str) -> Result<Vec<String>, ConnError> {
        if path != "/" {
            validate(path)?;
        }
        let state = self.state.lock();
        state.check_available()?;
        if path != "/" && !state.nodes.contains_key(path) {
            return Err(no_node(path));
        }
        // like a real service, names are not sorted: they come back in creation order
        let mut children = state.children_of(path);
        children.sort_by_key(|(_, n)| n.creation);
        Ok(children
            .into_iter()
            .map(|(name, _)| name.to_string())
            .collect())
    }

    async fn watch(&self, path: &str) -> Result<WatchReceiver, ConnError> {
        validate(path)?;
        let mut state = self.state.lock();
        state.check_available()?;
        let (tx, rx) = oneshot::channel();
        state.node_mut(path)?.watches.push(tx);
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn conn_with(paths: &[&str]) -> InMemoryConn {
        let conn = InMemoryConn::new();
        for p in paths {
            conn.create(p, Bytes::new()).await.unwrap();
        }
        conn
    }

    #[tokio::test]
    async fn create_get_set() {
        let conn = conn_with(&["/zk"]).await;
        conn.create("/zk/a", Bytes::from("one")).await.unwrap();

        let (data, stat) = conn.get("/zk/a").await.unwrap();
        assert_eq!(data, Bytes::from("one"));
        assert_eq!(stat.version, Version::new(0));
        assert_eq!(stat.data_length, 3);

        let stat = conn.set("/zk/a", Bytes::from("two"), None).await.unwrap();
        assert_eq!(stat.version, Version::new(1));

        let err = conn
            .set("/zk/a", Bytes::from("three"), Some(Version::new(0)))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ConnError::BadVersion {
                path: "/zk/a".into(),
                expected: Version::new(0),
                actual: Version::new(1),
            }
        );
        conn.set("/zk/a", Bytes::from("three"), Some(Version::new(1)))
            .await
            .unwrap();
        assert_eq!(conn.get("/zk/a").await.unwrap().0, Bytes::from("three"));
    }

    #[tokio::test]
    async fn missing_nodes() {
        let conn = InMemoryConn::new();
        assert!(conn.get("/zk").await.unwrap_err().is_no_node());
        assert!(conn.set("/zk", Bytes::new(), None).await.unwrap_err().is_no_node());
        assert!(conn.delete("/zk", None).await.unwrap_err().is_no_node());
        assert!(conn.children("/zk").await.unwrap_err().is_no_node());
        assert!(conn.watch("/zk").await.unwrap_err().is_no_node());

        // the parent must exist
        let err = conn.create("/zk/a", Bytes::new()).await.unwrap_err();
        assert_eq!(err, ConnError::NoNode { path: "/zk".into() });
    }

    #[tokio::test]
    async fn create_existing() {
        let conn = conn_with(&["/zk"]).await;
        let err = conn.create("/zk", Bytes::from("x")).await.unwrap_err();
        assert_eq!(err, ConnError::NodeExists { path: "/zk".into() });
        assert!(conn.get("/zk").await.unwrap().0.is_empty());
    }

    #[tokio::test]
    async fn invalid_paths() {
        let conn = InMemoryConn::new();
        for p in ["", "/", "zk", "/zk/", "/zk//a"] {
            let err = conn.create(p, Bytes::new()).await.unwrap_err();
            assert!(matches!(err, ConnError::InvalidPath { .. }), "{p:?}: {err}");
        }
    }

    #[tokio::test]
    async fn children_in_creation_order() {
        let conn = conn_with(&["/zk", "/zk/c", "/zk/a", "/zk/b", "/zk/a/nested", "/zkx"]).await;

        assert_eq!(conn.children("/zk").await.unwrap(), vec!["c", "a", "b"]);
        assert_eq!(conn.children("/zk/a").await.unwrap(), vec!["nested"]);
        assert!(conn.children("/zk/b").await.unwrap().is_empty());
        assert_eq!(conn.children("/").await.unwrap(), vec!["zk", "zkx"]);
    }

    #[tokio::test]
    async fn delete() {
        let conn = conn_with(&["/zk", "/zk/a"]).await;

        let err = conn.delete("/zk", None).await.unwrap_err();
        assert_eq!(err, ConnError::NotEmpty { path: "/zk".into() });

        let err = conn.delete("/zk/a", Some(Version::new(3))).await.unwrap_err();
        assert!(matches!(err, ConnError::BadVersion { .. }));

        conn.delete("/zk/a", Some(Version::new(0))).await.unwrap();
        conn.delete("/zk", None).await.unwrap();
        assert!(conn.children("/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn watches_fire_once() {
        let conn = conn_with(&["/zk"]).await;

        let w = conn.watch("/zk").await.unwrap();
        assert_eq!(conn.pending_watches(), 1);
        conn.set("/zk", Bytes::from("x"), None).await.unwrap();
        assert_eq!(w.await.unwrap(), WatchEvent::DataChanged);
        assert_eq!(conn.pending_watches(), 0);

        let w = conn.watch("/zk").await.unwrap();
        conn.delete("/zk", None).await.unwrap();
        assert_eq!(w.await.unwrap(), WatchEvent::Deleted);
    }

    #[tokio::test]
    async fn outage() {
        let conn = conn_with(&["/zk"]).await;
        let w = conn.watch("/zk").await.unwrap();

        conn.set_available(false);
        // the watch broke
        assert!(w.await.is_err());
        assert!(matches!(
            conn.get("/zk").await.unwrap_err(),
            ConnError::Unavailable { .. }
        ));
        assert!(matches!(
            conn.children("/").await.unwrap_err(),
            ConnError::Unavailable { .. }
        ));

        conn.set_available(true);
        assert!(conn.get("/zk").await.unwrap().0.is_empty());
    }
}
