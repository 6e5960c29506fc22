//! CLI config for the serving graph store.
use std::time::Duration;

use shardctl_topo::ServingGraphConfig;

/// Access to the serving graph in the coordination service
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::Parser)]
pub struct TopoConfig {
    /// How long a watch on the serving graph waits before retrying when the watched record is
    /// missing or the coordination service cannot be reached.
    ///
    /// Changes made while a watch is in that state are seen with up to this much delay.
    #[clap(
        long = "topo-watch-poll-interval",
        env = "SHARDCTL_TOPO_WATCH_POLL_INTERVAL",
        default_value = "30s",
        value_parser = humantime::parse_duration,
        action
    )]
    pub watch_poll_interval: Duration,

    /// Give up on a single request to the coordination service after this long.
    ///
    /// Requests are not bounded if unset.
    #[clap(
        long = "topo-request-timeout",
        env = "SHARDCTL_TOPO_REQUEST_TIMEOUT",
        value_parser = humantime::parse_duration,
        action
    )]
    pub request_timeout: Option<Duration>,
}

impl From<TopoConfig> for ServingGraphConfig {
    fn from(config: TopoConfig) -> Self {
        Self {
            watch_poll_interval: config.watch_poll_interval,
            request_timeout: config.request_timeout,
        }
    }
}
