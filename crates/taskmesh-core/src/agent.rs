use crate::{AgentId, AgentRole, AgentStatus, TaskId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Rolling per-task-type execution statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub avg_execution_secs: f64,
    pub success_rate: f64,
    pub samples: u64,
}

impl PerformanceStats {
    /// Incremental mean: `new = (old * n + sample) / (n + 1)`.
    pub fn record(&mut self, execution_secs: f64, success: bool) {
        let n = self.samples as f64;
        let hit = if success { 1.0 } else { 0.0 };
        self.avg_execution_secs = (self.avg_execution_secs * n + execution_secs) / (n + 1.0);
        self.success_rate = (self.success_rate * n + hit) / (n + 1.0);
        self.samples += 1;
    }

    /// `(1 / (avg + 1)) * success_rate`: fast and reliable agents score higher.
    pub fn score(&self) -> f64 {
        (1.0 / (self.avg_execution_secs + 1.0)) * self.success_rate
    }
}

/// Worker descriptor. Capacity bookkeeping goes through [`Agent::add_task`]
/// and [`Agent::remove_task`] so `current_tasks.len() <= max_concurrent_tasks`
/// always holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub role: AgentRole,
    pub capabilities: BTreeSet<String>,
    pub max_concurrent_tasks: usize,
    current_tasks: BTreeSet<TaskId>,
    performance_metrics: HashMap<String, PerformanceStats>,
    pub last_heartbeat: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(id: impl Into<AgentId>, role: AgentRole, max_concurrent_tasks: usize) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            role,
            capabilities: BTreeSet::new(),
            max_concurrent_tasks,
            current_tasks: BTreeSet::new(),
            performance_metrics: HashMap::new(),
            last_heartbeat: now,
            registered_at: now,
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities
            .extend(capabilities.into_iter().map(Into::into));
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn current_tasks(&self) -> &BTreeSet<TaskId> {
        &self.current_tasks
    }

    pub fn current_load(&self) -> usize {
        self.current_tasks.len()
    }

    pub fn performance_metrics(&self) -> &HashMap<String, PerformanceStats> {
        &self.performance_metrics
    }

    pub fn performance_for(&self, task_type: &str) -> Option<&PerformanceStats> {
        self.performance_metrics.get(task_type)
    }

    pub fn is_available(&self) -> bool {
        self.current_tasks.len() < self.max_concurrent_tasks
    }

    /// Capacity-only status; use [`Agent::status_at`] to include liveness.
    pub fn status(&self) -> AgentStatus {
        if self.is_available() {
            AgentStatus::Available
        } else {
            AgentStatus::Busy
        }
    }

    pub fn status_at(&self, now: DateTime<Utc>, heartbeat_timeout: Duration) -> AgentStatus {
        if !self.is_alive_at(now, heartbeat_timeout) {
            AgentStatus::Offline
        } else {
            self.status()
        }
    }

    pub fn is_alive_at(&self, now: DateTime<Utc>, heartbeat_timeout: Duration) -> bool {
        now - self.last_heartbeat < heartbeat_timeout
    }

    pub fn heartbeat(&mut self) {
        self.last_heartbeat = Utc::now();
    }

    pub fn load_percentage(&self) -> f64 {
        if self.max_concurrent_tasks == 0 {
            return 100.0;
        }
        self.current_tasks.len() as f64 / self.max_concurrent_tasks as f64 * 100.0
    }

    pub fn has_capabilities(&self, required: &BTreeSet<String>) -> bool {
        required.is_subset(&self.capabilities)
    }

    /// Number of capability tags this agent has beyond `required`.
    pub fn extra_capabilities(&self, required: &BTreeSet<String>) -> usize {
        self.capabilities.difference(required).count()
    }

    /// Reserve a slot for `task_id`. Returns `false` without mutating when the
    /// agent is full or already holds the task.
    pub fn add_task(&mut self, task_id: TaskId) -> bool {
        if !self.is_available() || self.current_tasks.contains(&task_id) {
            return false;
        }
        self.current_tasks.insert(task_id)
    }

    pub fn remove_task(&mut self, task_id: &TaskId) -> bool {
        self.current_tasks.remove(task_id)
    }

    pub fn update_performance(&mut self, task_type: &str, execution_secs: f64, success: bool) {
        self.performance_metrics
            .entry(task_type.to_string())
            .or_default()
            .record(execution_secs, success);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn add_task_respects_capacity() {
        let mut agent = Agent::new("dev-1", AgentRole::Developer, 2);
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        assert!(agent.add_task(a));
        assert!(!agent.add_task(a), "duplicate reservation must be rejected");
        assert!(agent.add_task(b));
        assert_eq!(agent.status(), AgentStatus::Busy);

        let before = agent.current_tasks().clone();
        assert!(!agent.add_task(c));
        assert_eq!(agent.current_tasks(), &before);

        assert!(agent.remove_task(&a));
        assert!(!agent.remove_task(&a));
        assert!(agent.add_task(c));
        assert!(agent.current_load() <= agent.max_concurrent_tasks);
    }

    #[test]
    fn capacity_invariant_holds_for_mixed_sequences() {
        let mut agent = Agent::new("qa-1", AgentRole::QaEngineer, 3);
        let ids: Vec<TaskId> = (0..8).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            agent.add_task(*id);
            if i % 3 == 2 {
                agent.remove_task(&ids[i - 1]);
            }
            assert!(agent.current_load() <= agent.max_concurrent_tasks);
        }
    }

    #[test]
    fn performance_uses_incremental_mean() {
        let mut agent = Agent::new("dev-1", AgentRole::Developer, 1);
        agent.update_performance("build", 2.0, true);
        agent.update_performance("build", 4.0, false);

        let stats = agent.performance_for("build").unwrap();
        assert_eq!(stats.samples, 2);
        assert!((stats.avg_execution_secs - 3.0).abs() < f64::EPSILON);
        assert!((stats.success_rate - 0.5).abs() < f64::EPSILON);
        assert!((stats.score() - 0.125).abs() < 1e-9);
    }

    #[test]
    fn stale_heartbeat_marks_agent_offline() {
        let mut agent = Agent::new("ops-1", AgentRole::DevopsEngineer, 1);
        let now = Utc::now();
        agent.last_heartbeat = now - Duration::seconds(61);
        assert!(!agent.is_alive_at(now, Duration::seconds(60)));
        assert_eq!(agent.status_at(now, Duration::seconds(60)), AgentStatus::Offline);

        agent.heartbeat();
        assert!(agent.is_alive_at(Utc::now(), Duration::seconds(60)));
    }

    #[test]
    fn capability_helpers() {
        let agent = Agent::new("dev-1", AgentRole::Developer, 1)
            .with_capabilities(["python", "rust", "docker"]);
        let required: BTreeSet<String> = ["python".to_string()].into_iter().collect();
        assert!(agent.has_capabilities(&required));
        assert_eq!(agent.extra_capabilities(&required), 2);
        assert_eq!(agent.load_percentage(), 0.0);
    }
}
