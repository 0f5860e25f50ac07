use super::PlacementStrategy;
use parking_lot::Mutex;
use std::collections::HashMap;
use taskmesh_core::{Agent, AgentRole, LoadBalancingStrategy, Task};

/// Rotates through the candidate list, one cursor per role.
pub struct RoundRobin {
    cursors: Mutex<HashMap<AgentRole, usize>>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self {
            cursors: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for RoundRobin {
    fn default() -> Self {
        Self::new()
    }
}

impl PlacementStrategy for RoundRobin {
    fn name(&self) -> &'static str {
        "round_robin"
    }

    fn kind(&self) -> LoadBalancingStrategy {
        LoadBalancingStrategy::RoundRobin
    }

    fn pick(&self, task: &Task, candidates: &[Agent]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        let mut cursors = self.cursors.lock();
        let cursor = cursors.entry(task.required_role).or_insert(0);
        let i = *cursor % candidates.len();
        *cursor = cursor.wrapping_add(1);
        Some(i)
    }
}
