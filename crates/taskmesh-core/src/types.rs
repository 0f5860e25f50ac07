use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type TaskId = Uuid;
pub type AgentId = String;

/// Closed set of roles used to route tasks to compatible agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    ProjectManager,
    ProductManager,
    Developer,
    QaEngineer,
    DevopsEngineer,
    SecurityEngineer,
    DataScientist,
    UiDesigner,
}

impl AgentRole {
    /// Every role, in the order the scheduler visits role queues.
    pub const ALL: [AgentRole; 8] = [
        AgentRole::ProjectManager,
        AgentRole::ProductManager,
        AgentRole::Developer,
        AgentRole::QaEngineer,
        AgentRole::DevopsEngineer,
        AgentRole::SecurityEngineer,
        AgentRole::DataScientist,
        AgentRole::UiDesigner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::ProjectManager => "project_manager",
            AgentRole::ProductManager => "product_manager",
            AgentRole::Developer => "developer",
            AgentRole::QaEngineer => "qa_engineer",
            AgentRole::DevopsEngineer => "devops_engineer",
            AgentRole::SecurityEngineer => "security_engineer",
            AgentRole::DataScientist => "data_scientist",
            AgentRole::UiDesigner => "ui_designer",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        AgentRole::ALL
            .iter()
            .copied()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| format!("unknown agent role: {}", s))
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low = 0,
    #[default]
    Medium = 1,
    High = 2,
    Critical = 3,
}

impl TaskPriority {
    pub fn value(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
            TaskPriority::Critical => "critical",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" | "0" => Ok(TaskPriority::Low),
            "medium" | "1" => Ok(TaskPriority::Medium),
            "high" | "2" => Ok(TaskPriority::High),
            "critical" | "3" => Ok(TaskPriority::Critical),
            other => Err(format!("unknown task priority: {}", other)),
        }
    }
}

/// Task lifecycle.
///
/// `Pending -> Assigned -> InProgress -> {Completed, Failed}`; `Cancelled` is
/// reachable from `Pending` and `Assigned` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    Assigned,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Available,
    Busy,
    /// Heartbeat is stale; the agent is excluded from placement.
    Offline,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentStatus::Available => "available",
            AgentStatus::Busy => "busy",
            AgentStatus::Offline => "offline",
        };
        f.write_str(s)
    }
}

/// Placement algorithm used to choose among eligible agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    RoundRobin,
    LeastConnections,
    WeightedRoundRobin,
    WeightedLeastConnections,
    PerformanceBased,
    CapabilityBased,
    #[default]
    Adaptive,
}

impl LoadBalancingStrategy {
    pub const ALL: [LoadBalancingStrategy; 7] = [
        LoadBalancingStrategy::RoundRobin,
        LoadBalancingStrategy::LeastConnections,
        LoadBalancingStrategy::WeightedRoundRobin,
        LoadBalancingStrategy::WeightedLeastConnections,
        LoadBalancingStrategy::PerformanceBased,
        LoadBalancingStrategy::CapabilityBased,
        LoadBalancingStrategy::Adaptive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LoadBalancingStrategy::RoundRobin => "round_robin",
            LoadBalancingStrategy::LeastConnections => "least_connections",
            LoadBalancingStrategy::WeightedRoundRobin => "weighted_round_robin",
            LoadBalancingStrategy::WeightedLeastConnections => "weighted_least_connections",
            LoadBalancingStrategy::PerformanceBased => "performance_based",
            LoadBalancingStrategy::CapabilityBased => "capability_based",
            LoadBalancingStrategy::Adaptive => "adaptive",
        }
    }
}

impl fmt::Display for LoadBalancingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadBalancingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        LoadBalancingStrategy::ALL
            .iter()
            .copied()
            .find(|strategy| strategy.as_str() == normalized)
            .ok_or_else(|| format!("unknown load balancing strategy: {}", s))
    }
}
