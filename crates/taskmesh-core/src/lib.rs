//! TaskMesh core
//!
//! Data model shared by the queue, load balancer and scheduler crates:
//! agents, tasks, the closed role/priority/status enums, configuration and
//! the error taxonomy.

pub mod agent;
pub mod config_manager;
pub mod error;
pub mod logging;
pub mod task;
pub mod types;

pub use agent::*;
pub use config_manager::*;
pub use error::*;
pub use logging::init_tracing;
pub use task::*;
pub use types::*;
