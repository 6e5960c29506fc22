//! Follow a serving graph record as it changes.
use std::marker::PhantomData;

use bytes::Bytes;
use tracing::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::conn::WatchEvent;
use crate::error::{Error, Result};
use crate::records::ServingRecord;
use crate::serving_graph::{ServingGraph, decode};

/// Updates a subscription buffers before the watch task waits for the subscriber
pub const WATCH_BUFFER_SIZE: usize = 16;

/// The current value of a watched record: `Ok(None)` while it does not exist, `Err` if what is
/// stored cannot be decoded
pub type WatchUpdate<R> = Result<Option<R>>;

/// Updates of one record, produced by a background task.
///
/// The first update is the value at the time the watch started, then one update follows every
/// time the stored bytes change. While the record is missing or the coordination service is
/// unreachable, the task polls at the configured interval, so changes in that state are seen
/// with up to one interval of delay.
///
/// The task stops when the subscription is cancelled or dropped.
#[derive(Debug)]
pub struct WatchSubscription<R> {
    rx: mpsc::Receiver<WatchUpdate<R>>,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl<R: ServingRecord> WatchSubscription<R> {
    pub(crate) fn spawn(graph: ServingGraph, path: String) -> Self {
        let (tx, rx) = mpsc::channel(WATCH_BUFFER_SIZE);
        let shutdown = CancellationToken::new();
        let task = WatchTask {
            graph,
            path,
            tx,
            shutdown: shutdown.clone(),
            last: None,
            _record: PhantomData,
        };
        Self {
            rx,
            shutdown,
            task: Some(tokio::spawn(task.run())),
        }
    }

    /// Wait for the next update. Returns `None` once the subscription is stopped and every
    /// buffered update was received.
    pub async fn next(&mut self) -> Option<WatchUpdate<R>> {
        self.rx.recv().await
    }

    /// Ask the background task to stop, without waiting for it
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// Stop the background task and wait for it to exit
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "serving graph watch task failed");
            }
        }
    }
}

impl<R> Drop for WatchSubscription<R> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct WatchTask<R> {
    graph: ServingGraph,
    path: String,
    tx: mpsc::Sender<WatchUpdate<R>>,
    shutdown: CancellationToken,
    /// Bytes of the last update sent, empty for a missing record
    last: Option<Bytes>,
    _record: PhantomData<fn() -> R>,
}

impl<R: ServingRecord> WatchTask<R> {
    async fn run(mut self) {
        info!(path = %self.path, record = R::NAME, "starting serving graph watch");
        while self.step().await {}
        info!(path = %self.path, record = R::NAME, "serving graph watch stopped");
    }

    /// Publish the current value then wait for it to change. Returns false once the task must
    /// stop.
    async fn step(&mut self) -> bool {
        let path = self.path.as_str();
        let conn = self.graph.conn();

        // register before reading so that a change right after the read is not missed
        let watch = self.graph.round_trip(path, conn.watch(path)).await;

        let current = match self.graph.round_trip(path, conn.get(path)).await {
            Ok((data, _)) => Some(data),
            Err(Error::NoNode { .. }) => Some(Bytes::new()),
            Err(e) => {
                warn!(path, error = %e, "failed to read watched record, will retry");
                None
            }
        };
        if let Some(data) = current {
            if self.last.as_ref() != Some(&data) {
                let update = decode::<R>(path, &data);
                self.last = Some(data);
                tokio::select! {
                    res = self.tx.send(update) => {
                        if res.is_err() {
                            return false;
                        }
                    }
                    _ = self.shutdown.cancelled() => return false,
                }
            }
        }

        let poll_interval = self.graph.config().watch_poll_interval;
        let wait = async {
            match watch {
                Ok(rx) => match rx.await {
                    Ok(WatchEvent::DataChanged) => debug!(path, "watched record changed"),
                    Ok(WatchEvent::Deleted) => debug!(path, "watched record deleted"),
                    Err(_) => {
                        warn!(path, ?poll_interval, "watch broke, polling");
                        tokio::time::sleep(poll_interval).await;
                    }
                },
                Err(Error::NoNode { .. }) => tokio::time::sleep(poll_interval).await,
                Err(e) => {
                    warn!(path, error = %e, ?poll_interval, "failed to set watch, polling");
                    tokio::time::sleep(poll_interval).await;
                }
            }
        };

        tokio::select! {
            _ = wait => true,
            _ = self.shutdown.cancelled() => false,
            _ = self.tx.closed() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::conn::{TopoConn, create_recursive};
    use crate::memory::InMemoryConn;
    use crate::records::{KeyspaceVSchema, SrvVSchema};
    use crate::serving_graph::{ServingGraphConfig, srv_vschema_path};

    const POLL: Duration = Duration::from_millis(10);

    fn graph() -> (Arc<InMemoryConn>, ServingGraph) {
        let conn = Arc::new(InMemoryConn::new());
        let graph = ServingGraph::new(
            Arc::clone(&conn) as Arc<dyn TopoConn>,
            ServingGraphConfig {
                watch_poll_interval: POLL,
                request_timeout: None,
            },
        );
        (conn, graph)
    }

    fn vschema(keyspaces: &[&str]) -> SrvVSchema {
        SrvVSchema {
            keyspaces: keyspaces
                .iter()
                .map(|k| (k.to_string(), KeyspaceVSchema::default()))
                .collect(),
        }
    }

    async fn next<R: ServingRecord>(sub: &mut WatchSubscription<R>) -> WatchUpdate<R> {
        tokio::time::timeout(Duration::from_secs(5), sub.next())
            .await
            .expect("no update in time")
            .expect("subscription closed")
    }

    #[test_log::test(tokio::test)]
    async fn follows_create_change_delete() {
        let (conn, graph) = graph();
        let mut sub = graph.watch_srv_vschema("c1");

        assert_eq!(next(&mut sub).await.unwrap(), None);

        graph.update_srv_vschema("c1", &vschema(&["a"])).await.unwrap();
        assert_eq!(next(&mut sub).await.unwrap(), Some(vschema(&["a"])));

        // rewriting the same value is not an update
        graph.update_srv_vschema("c1", &vschema(&["a"])).await.unwrap();
        graph
            .update_srv_vschema("c1", &vschema(&["a", "b"]))
            .await
            .unwrap();
        assert_eq!(next(&mut sub).await.unwrap(), Some(vschema(&["a", "b"])));

        conn.delete(&srv_vschema_path("c1"), None).await.unwrap();
        assert_eq!(next(&mut sub).await.unwrap(), None);

        sub.stop().await;
    }

    #[test_log::test(tokio::test)]
    async fn malformed_record() {
        let (conn, graph) = graph();
        create_recursive(conn.as_ref(), "/zk/c1/vt/ns/ks", Bytes::from("garbage"))
            .await
            .unwrap();

        let mut sub = graph.watch_srv_keyspace("c1", "ks");
        let err = next(&mut sub).await.unwrap_err();
        assert!(matches!(err, Error::Malformed { len: 7, .. }), "{err}");

        graph
            .update_srv_keyspace("c1", "ks", &Default::default())
            .await
            .unwrap();
        assert_eq!(next(&mut sub).await.unwrap(), Some(Default::default()));
    }

    #[test_log::test(tokio::test)]
    async fn survives_outage() {
        let (conn, graph) = graph();
        graph.update_srv_vschema("c1", &vschema(&["a"])).await.unwrap();

        let mut sub = graph.watch_srv_vschema("c1");
        assert_eq!(next(&mut sub).await.unwrap(), Some(vschema(&["a"])));

        conn.set_available(false);
        // let the task notice the broken watch and fail a few polls
        tokio::time::sleep(POLL * 5).await;
        conn.set_available(true);

        graph.update_srv_vschema("c1", &vschema(&["b"])).await.unwrap();
        assert_eq!(next(&mut sub).await.unwrap(), Some(vschema(&["b"])));
    }

    #[test_log::test(tokio::test)]
    async fn stop() {
        let (conn, graph) = graph();
        graph.update_srv_vschema("c1", &vschema(&["a"])).await.unwrap();

        let mut sub = graph.watch_srv_vschema("c1");
        next(&mut sub).await.unwrap();
        assert_eq!(conn.pending_watches(), 1);

        sub.stop().await;
        assert_eq!(conn.pending_watches(), 0);
    }

    #[test_log::test(tokio::test)]
    async fn cancel_closes_subscription() {
        let (_, graph) = graph();
        let mut sub = graph.watch_srv_vschema("c1");
        sub.cancel();

        // buffered updates may still arrive, then the subscription ends
        let drained = tokio::time::timeout(Duration::from_secs(5), async {
            while sub.next().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());
    }

    #[test_log::test(tokio::test)]
    async fn drop_stops_task() {
        let (conn, graph) = graph();
        graph.update_srv_vschema("c1", &vschema(&["a"])).await.unwrap();

        let mut sub = graph.watch_srv_vschema("c1");
        next(&mut sub).await.unwrap();
        drop(sub);

        tokio::time::timeout(Duration::from_secs(5), async {
            while conn.pending_watches() > 0 {
                tokio::time::sleep(POLL).await;
            }
        })
        .await
        .expect("watch task did not exit");
    }
}
