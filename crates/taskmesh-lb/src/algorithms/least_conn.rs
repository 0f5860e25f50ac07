use super::PlacementStrategy;
use taskmesh_core::{Agent, LoadBalancingStrategy, Task};

pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}
impl Default for LeastConnections {
    fn default() -> Self {
        Self::new()
    }
}

/// Index of the candidate with the fewest current tasks; first wins ties.
pub fn least_loaded(candidates: &[Agent]) -> Option<usize> {
    let mut best = None::<usize>;
    let mut best_conn = usize::MAX;
    for (i, agent) in candidates.iter().enumerate() {
        let c = agent.current_load();
        if c < best_conn {
            best_conn = c;
            best = Some(i);
        }
    }
    best
}

impl PlacementStrategy for LeastConnections {
    fn name(&self) -> &'static str {
        "least_connections"
    }

    fn kind(&self) -> LoadBalancingStrategy {
        LoadBalancingStrategy::LeastConnections
    }

    fn pick(&self, _task: &Task, candidates: &[Agent]) -> Option<usize> {
        least_loaded(candidates)
    }
}
