//! TaskMesh Load Balancer
//!
//! Provides:
//! - The agent registry with role / capability / capacity / heartbeat filtering
//! - Placement strategies (round robin, least connections, smooth weighted round
//!   robin, weighted least connections, performance based, capability based,
//!   adaptive) behind the [`PlacementStrategy`] trait
//! - Registry load statistics and Prometheus counters

pub mod algorithms;
pub mod metrics;
pub mod registry;
pub mod stats;

pub use algorithms::*;
pub use registry::*;
pub use stats::*;
