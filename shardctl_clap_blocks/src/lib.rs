//! Building blocks for [`clap`]-driven configs.
pub mod topo;
