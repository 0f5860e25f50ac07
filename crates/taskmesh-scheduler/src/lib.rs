//! TaskMesh scheduler
//!
//! [`LoadBalancingSystem`] ties the pieces together: one [`TaskQueue`] per
//! role, the [`LoadBalancer`] registry, a tokio scheduler loop and a
//! semaphore-bounded worker pool that drives [`TaskExecutor`]s.
//!
//! [`TaskQueue`]: taskmesh_queue::TaskQueue
//! [`LoadBalancer`]: taskmesh_lb::LoadBalancer

pub mod executor;
mod finished;
pub mod metrics;
pub mod system;

pub use executor::*;
pub use system::*;
