use taskmesh_core::{Agent, LoadBalancingStrategy, Task};

/// A placement algorithm.
///
/// `pick` receives only eligible candidates (role, capabilities, capacity and
/// heartbeat already checked), in a stable order, and returns the index of
/// the chosen one. An empty slice yields `None`.
pub trait PlacementStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn kind(&self) -> LoadBalancingStrategy;
    fn pick(&self, task: &Task, candidates: &[Agent]) -> Option<usize>;
}

pub mod adaptive;
pub mod capability;
pub mod least_conn;
pub mod performance;
pub mod rr;
pub mod smooth_wrr;
pub mod weighted_least_conn;

pub use adaptive::{Adaptive, AdaptiveWeights};
pub use capability::CapabilityBased;
pub use least_conn::LeastConnections;
pub use performance::PerformanceBased;
pub use rr::RoundRobin;
pub use smooth_wrr::SmoothWeightedRR;
pub use weighted_least_conn::WeightedLeastConnections;

/// Build the strategy for `kind`. `seed` fixes the random source of the
/// strategies that use one.
pub fn build_strategy(kind: LoadBalancingStrategy, seed: Option<u64>) -> Box<dyn PlacementStrategy> {
    match kind {
        LoadBalancingStrategy::RoundRobin => Box::new(RoundRobin::new()),
        LoadBalancingStrategy::LeastConnections => Box::new(LeastConnections::new()),
        LoadBalancingStrategy::WeightedRoundRobin => Box::new(SmoothWeightedRR::new()),
        LoadBalancingStrategy::WeightedLeastConnections => Box::new(WeightedLeastConnections::new()),
        LoadBalancingStrategy::PerformanceBased => Box::new(PerformanceBased::new()),
        LoadBalancingStrategy::CapabilityBased => Box::new(CapabilityBased::new()),
        LoadBalancingStrategy::Adaptive => Box::new(match seed {
            Some(seed) => Adaptive::with_seed(seed),
            None => Adaptive::new(),
        }),
    }
}
