use serde::Serialize;
use std::collections::BTreeMap;
use taskmesh_core::AgentRole;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoleLoad {
    pub agents: usize,
    pub available: usize,
    pub current_tasks: usize,
    pub capacity: usize,
    pub avg_load_percentage: f64,
}

/// Point-in-time view of the agent registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LoadStatistics {
    pub strategy: String,
    pub total_agents: usize,
    pub available_agents: usize,
    pub busy_agents: usize,
    pub offline_agents: usize,
    pub total_capacity: usize,
    pub total_current_tasks: usize,
    pub by_role: BTreeMap<AgentRole, RoleLoad>,
}

impl LoadStatistics {
    pub fn utilization(&self) -> f64 {
        if self.total_capacity == 0 {
            return 0.0;
        }
        self.total_current_tasks as f64 / self.total_capacity as f64 * 100.0
    }
}
