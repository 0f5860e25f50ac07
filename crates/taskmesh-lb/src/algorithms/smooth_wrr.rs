use super::PlacementStrategy;
use parking_lot::Mutex;
use std::collections::HashMap;
use taskmesh_core::{Agent, AgentId, AgentRole, LoadBalancingStrategy, Task};

// Smooth Weighted Round Robin per Nginx algorithm, weight = max_concurrent_tasks.
// Effective weights are keyed by agent id so they survive changes in the
// candidate list between calls.
#[derive(Default)]
pub struct SmoothWeightedRR {
    inner: Mutex<HashMap<AgentRole, HashMap<AgentId, i64>>>,
}

impl SmoothWeightedRR {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl PlacementStrategy for SmoothWeightedRR {
    fn name(&self) -> &'static str {
        "weighted_round_robin"
    }

    fn kind(&self) -> LoadBalancingStrategy {
        LoadBalancingStrategy::WeightedRoundRobin
    }

    fn pick(&self, task: &Task, candidates: &[Agent]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        let mut roles = self.inner.lock();
        let current = roles.entry(task.required_role).or_default();
        current.retain(|id, _| candidates.iter().any(|a| &a.id == id));

        let total: i64 = candidates
            .iter()
            .map(|a| a.max_concurrent_tasks as i64)
            .sum();
        let mut best = 0usize;
        let mut best_weight = i64::MIN;
        for (i, agent) in candidates.iter().enumerate() {
            let w = current.entry(agent.id.clone()).or_insert(0);
            *w += agent.max_concurrent_tasks as i64;
            if *w > best_weight {
                best_weight = *w;
                best = i;
            }
        }
        if let Some(w) = current.get_mut(&candidates[best].id) {
            *w -= total;
        }
        Some(best)
    }
}
