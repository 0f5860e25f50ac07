use super::least_conn::least_loaded;
use super::PlacementStrategy;
use taskmesh_core::{Agent, LoadBalancingStrategy, Task};

/// Maximises `(1 / (avg_secs + 1)) * success_rate` for the task's type.
/// Falls back to least connections when the best candidate has no history
/// for that type.
pub struct PerformanceBased;

impl PerformanceBased {
    pub fn new() -> Self {
        Self
    }
}
impl Default for PerformanceBased {
    fn default() -> Self {
        Self::new()
    }
}

impl PlacementStrategy for PerformanceBased {
    fn name(&self) -> &'static str {
        "performance_based"
    }

    fn kind(&self) -> LoadBalancingStrategy {
        LoadBalancingStrategy::PerformanceBased
    }

    fn pick(&self, task: &Task, candidates: &[Agent]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        let mut best = 0usize;
        let mut best_score = f64::NEG_INFINITY;
        let mut best_has_history = false;
        for (i, agent) in candidates.iter().enumerate() {
            let (score, has_history) = match agent.performance_for(&task.task_type) {
                Some(stats) => (stats.score(), true),
                None => (0.0, false),
            };
            if score > best_score {
                best_score = score;
                best = i;
                best_has_history = has_history;
            }
        }
        if best_has_history {
            Some(best)
        } else {
            least_loaded(candidates)
        }
    }
}
