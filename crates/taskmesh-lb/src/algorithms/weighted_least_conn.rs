use super::PlacementStrategy;
use taskmesh_core::{Agent, LoadBalancingStrategy, Task};

/// Lowest `current / max * 100` wins; first wins ties.
pub struct WeightedLeastConnections;

impl WeightedLeastConnections {
    pub fn new() -> Self {
        Self
    }
}
impl Default for WeightedLeastConnections {
    fn default() -> Self {
        Self::new()
    }
}

impl PlacementStrategy for WeightedLeastConnections {
    fn name(&self) -> &'static str {
        "weighted_least_connections"
    }

    fn kind(&self) -> LoadBalancingStrategy {
        LoadBalancingStrategy::WeightedLeastConnections
    }

    fn pick(&self, _task: &Task, candidates: &[Agent]) -> Option<usize> {
        let mut best = None::<usize>;
        let mut best_load = f64::INFINITY;
        for (i, agent) in candidates.iter().enumerate() {
            let load = agent.load_percentage();
            if load < best_load {
                best_load = load;
                best = Some(i);
            }
        }
        best
    }
}
