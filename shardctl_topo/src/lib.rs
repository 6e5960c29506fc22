//! The serving graph: which keyspaces each cell serves, and how queries are routed to them.
//!
//! Records live in a hierarchical coordination service reached through the [`TopoConn`]
//! trait. [`ServingGraph`] reads and writes them and [`WatchSubscription`] follows their
//! changes. [`InMemoryConn`] provides the coordination service in tests and single process
//! setups.
pub mod conn;
pub mod error;
pub mod memory;
pub mod records;
pub mod serving_graph;
pub mod watch;

pub use conn::{ConnError, Stat, TopoConn, Version, WatchEvent, WatchReceiver, create_recursive};
pub use error::{Error, Result};
pub use memory::InMemoryConn;
pub use records::{
    AutoIncrement, ColumnVindex, KeyRange, KeyspaceIdType, KeyspacePartition, KeyspaceVSchema,
    ServedFrom, ServingRecord, ShardReference, SrvKeyspace, SrvVSchema, Table, TabletType, Vindex,
};
pub use serving_graph::{DEFAULT_WATCH_POLL_INTERVAL, ServingGraph, ServingGraphConfig};
pub use watch::{WATCH_BUFFER_SIZE, WatchSubscription, WatchUpdate};
