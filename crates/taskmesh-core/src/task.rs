use crate::{AgentId, AgentRole, TaskId, TaskPriority, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;
use uuid::Uuid;

/// A unit of work. The scheduler only ranks, places and bounds it; what the
/// task actually does is up to the execution delegate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub task_type: String,
    pub description: String,
    pub priority: TaskPriority,
    pub required_role: AgentRole,
    pub required_capabilities: BTreeSet<String>,
    /// Seconds.
    pub estimated_duration: f64,
    pub dependencies: Vec<TaskId>,
    pub status: TaskStatus,
    pub assigned_agent_id: Option<AgentId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub retry_count: u32,
}

impl Task {
    pub fn new(task_type: impl Into<String>, required_role: AgentRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type: task_type.into(),
            description: String::new(),
            priority: TaskPriority::default(),
            required_role,
            required_capabilities: BTreeSet::new(),
            estimated_duration: 1.0,
            dependencies: Vec::new(),
            status: TaskStatus::Pending,
            assigned_agent_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            max_retries: 0,
            retry_count: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_capabilities
            .extend(capabilities.into_iter().map(Into::into));
        self
    }

    pub fn with_estimated_duration(mut self, secs: f64) -> Self {
        self.estimated_duration = secs;
        self
    }

    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependencies.extend(dependencies);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// True when every dependency satisfies `is_completed`. A task without
    /// dependencies is always ready.
    pub fn dependencies_satisfied<F>(&self, is_completed: F) -> bool
    where
        F: Fn(&TaskId) -> bool,
    {
        self.dependencies.iter().all(is_completed)
    }

    pub fn execution_time(&self) -> Option<Duration> {
        let started = self.started_at?;
        let completed = self.completed_at?;
        (completed - started).to_std().ok()
    }

    pub fn waiting_time(&self) -> Duration {
        let until = self.started_at.unwrap_or_else(Utc::now);
        (until - self.created_at).to_std().unwrap_or_default()
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self.status, next),
            (Pending, Assigned)
                | (Pending, Cancelled)
                | (Assigned, InProgress)
                | (Assigned, Cancelled)
                | (InProgress, Completed)
                | (InProgress, Failed)
        )
    }

    pub fn mark_assigned(&mut self, agent_id: &str) -> bool {
        if !self.can_transition_to(TaskStatus::Assigned) {
            return false;
        }
        self.status = TaskStatus::Assigned;
        self.assigned_agent_id = Some(agent_id.to_string());
        true
    }

    pub fn mark_started(&mut self) -> bool {
        if !self.can_transition_to(TaskStatus::InProgress) {
            return false;
        }
        self.status = TaskStatus::InProgress;
        self.started_at = Some(Utc::now());
        true
    }

    pub fn mark_completed(&mut self, result: serde_json::Value) -> bool {
        if !self.can_transition_to(TaskStatus::Completed) {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.result = Some(result);
        self.error = None;
        true
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> bool {
        if !self.can_transition_to(TaskStatus::Failed) {
            return false;
        }
        self.status = TaskStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.into());
        true
    }

    pub fn mark_cancelled(&mut self) -> bool {
        if !self.can_transition_to(TaskStatus::Cancelled) {
            return false;
        }
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        true
    }

    pub fn can_retry(&self) -> bool {
        self.status == TaskStatus::Failed && self.retry_count < self.max_retries
    }

    /// Turn a failed attempt back into a pending task. The last error is kept
    /// for inspection.
    pub fn reset_for_retry(&mut self) -> bool {
        if !self.can_retry() {
            return false;
        }
        self.retry_count += 1;
        self.status = TaskStatus::Pending;
        self.assigned_agent_id = None;
        self.started_at = None;
        self.completed_at = None;
        self.result = None;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let mut task = Task::new("codegen", AgentRole::Developer);
        assert!(task.mark_assigned("dev-1"));
        assert_eq!(task.assigned_agent_id.as_deref(), Some("dev-1"));
        assert!(task.mark_started());
        assert!(task.started_at.is_some());
        assert!(task.mark_completed(serde_json::json!({"ok": true})));
        assert!(task.execution_time().is_some());
        assert!(task.status.is_terminal());
    }

    #[test]
    fn terminal_state_is_immutable() {
        let mut task = Task::new("codegen", AgentRole::Developer);
        task.mark_assigned("dev-1");
        task.mark_started();
        task.mark_failed("boom");

        assert!(!task.mark_completed(serde_json::Value::Null));
        assert!(!task.mark_started());
        assert!(!task.mark_cancelled());
        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.error.as_deref(), Some("boom"));
    }

    #[test]
    fn in_progress_cannot_be_cancelled() {
        let mut task = Task::new("scan", AgentRole::SecurityEngineer);
        task.mark_assigned("sec-1");
        task.mark_started();
        assert!(!task.mark_cancelled());
    }

    #[test]
    fn retry_resets_attempt_state() {
        let mut task = Task::new("deploy", AgentRole::DevopsEngineer).with_max_retries(1);
        task.mark_assigned("ops-1");
        task.mark_started();
        task.mark_failed("timeout");

        assert!(task.reset_for_retry());
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 1);
        assert!(task.assigned_agent_id.is_none());
        assert_eq!(task.error.as_deref(), Some("timeout"));

        task.mark_assigned("ops-1");
        task.mark_started();
        task.mark_failed("timeout");
        assert!(!task.reset_for_retry());
    }

    #[test]
    fn dependencies_readiness() {
        let dep = Uuid::new_v4();
        let task = Task::new("test", AgentRole::QaEngineer).with_dependencies([dep]);
        assert!(!task.dependencies_satisfied(|_| false));
        assert!(task.dependencies_satisfied(|id| *id == dep));
        assert!(Task::new("test", AgentRole::QaEngineer).dependencies_satisfied(|_| false));
    }
}
