use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use rand::Rng;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use taskmesh_core::{Agent, AgentId, ExecutionConfig, ExecutionError, Task};
use tracing::debug;

/// Performs the actual work of a task on behalf of an agent.
///
/// The scheduler only places and bounds tasks; everything a task "does" is
/// behind this trait.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &Task, agent: &Agent) -> Result<Value, ExecutionError>;
}

/// Stand-in executor: sleeps for a jittered fraction of the task's
/// estimated duration, capped, and reports success.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    cap: Duration,
    jitter_min: f64,
    jitter_max: f64,
}

impl SimulatedExecutor {
    pub fn new(config: &ExecutionConfig) -> Self {
        Self {
            cap: Duration::from_secs_f64(config.simulated_duration_cap_secs.max(0.0)),
            jitter_min: config.jitter_min.max(0.0),
            jitter_max: config.jitter_max.max(config.jitter_min.max(0.0)),
        }
    }

    pub fn simulated_duration(&self, estimated_secs: f64) -> Duration {
        let factor = rand::rng().random_range(self.jitter_min..=self.jitter_max);
        let secs = (estimated_secs.max(0.0) * factor).min(self.cap.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(&ExecutionConfig::default())
    }
}

#[async_trait]
impl TaskExecutor for SimulatedExecutor {
    async fn execute(&self, task: &Task, agent: &Agent) -> Result<Value, ExecutionError> {
        let duration = self.simulated_duration(task.estimated_duration);
        debug!(task_id = %task.id, agent_id = %agent.id, ?duration, "simulating task");
        tokio::time::sleep(duration).await;
        Ok(json!({
            "status": "completed",
            "task_type": task.task_type,
            "agent_id": agent.id,
            "simulated_secs": duration.as_secs_f64(),
        }))
    }
}

/// Adapts an async closure into a [`TaskExecutor`].
pub struct FnExecutor<F>(F);

#[async_trait]
impl<F, Fut> TaskExecutor for FnExecutor<F>
where
    F: Fn(Task, Agent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ExecutionError>> + Send + 'static,
{
    async fn execute(&self, task: &Task, agent: &Agent) -> Result<Value, ExecutionError> {
        (self.0)(task.clone(), agent.clone()).await
    }
}

pub fn executor_fn<F, Fut>(f: F) -> Arc<dyn TaskExecutor>
where
    F: Fn(Task, Agent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ExecutionError>> + Send + 'static,
{
    Arc::new(FnExecutor(f))
}

/// Resolves the executor for a placement: the agent's own executor first,
/// then one registered for the task type, then the default.
pub struct ExecutorRegistry {
    default: RwLock<Arc<dyn TaskExecutor>>,
    by_agent: DashMap<AgentId, Arc<dyn TaskExecutor>>,
    by_task_type: DashMap<String, Arc<dyn TaskExecutor>>,
}

impl ExecutorRegistry {
    pub fn new(default: Arc<dyn TaskExecutor>) -> Self {
        Self {
            default: RwLock::new(default),
            by_agent: DashMap::new(),
            by_task_type: DashMap::new(),
        }
    }

    pub fn set_default(&self, executor: Arc<dyn TaskExecutor>) {
        *self.default.write() = executor;
    }

    pub fn register_for_agent(&self, agent_id: impl Into<AgentId>, executor: Arc<dyn TaskExecutor>) {
        self.by_agent.insert(agent_id.into(), executor);
    }

    pub fn register_for_task_type(&self, task_type: impl Into<String>, executor: Arc<dyn TaskExecutor>) {
        self.by_task_type.insert(task_type.into(), executor);
    }

    pub fn remove_for_agent(&self, agent_id: &str) -> bool {
        self.by_agent.remove(agent_id).is_some()
    }

    pub fn resolve(&self, agent_id: &str, task_type: &str) -> Arc<dyn TaskExecutor> {
        if let Some(executor) = self.by_agent.get(agent_id) {
            return executor.value().clone();
        }
        if let Some(executor) = self.by_task_type.get(task_type) {
            return executor.value().clone();
        }
        self.default.read().clone()
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new(Arc::new(SimulatedExecutor::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_core::AgentRole;

    fn tagged(tag: &'static str) -> Arc<dyn TaskExecutor> {
        executor_fn(move |_task, _agent| async move { Ok(json!(tag)) })
    }

    #[test]
    fn simulated_duration_is_jittered_and_capped() {
        let exec = SimulatedExecutor::new(&ExecutionConfig {
            simulated_duration_cap_secs: 2.0,
            jitter_min: 0.8,
            jitter_max: 1.2,
        });
        for _ in 0..100 {
            let d = exec.simulated_duration(1.0).as_secs_f64();
            assert!((0.8..=1.2).contains(&d), "{}", d);
        }
        assert_eq!(exec.simulated_duration(100.0), Duration::from_secs(2));
        assert_eq!(exec.simulated_duration(-3.0), Duration::ZERO);
    }

    #[test]
    fn registry_resolution_order() {
        let registry = ExecutorRegistry::new(tagged("default"));
        registry.register_for_task_type("deploy", tagged("by-type"));
        registry.register_for_agent("ops-1", tagged("by-agent"));

        let task = Task::new("deploy", AgentRole::DevopsEngineer);
        let ops1 = Agent::new("ops-1", AgentRole::DevopsEngineer, 1);
        let ops2 = Agent::new("ops-2", AgentRole::DevopsEngineer, 1);

        let run = |agent: &Agent, task: &Task| {
            let exec = registry.resolve(&agent.id, &task.task_type);
            let (agent, task) = (agent.clone(), task.clone());
            tokio_test::block_on(async move { exec.execute(&task, &agent).await.unwrap() })
        };

        assert_eq!(run(&ops1, &task), json!("by-agent"));
        assert_eq!(run(&ops2, &task), json!("by-type"));
        let other = Task::new("build", AgentRole::DevopsEngineer);
        assert_eq!(run(&ops2, &other), json!("default"));

        assert!(registry.remove_for_agent("ops-1"));
        assert_eq!(run(&ops1, &task), json!("by-type"));
    }
}
