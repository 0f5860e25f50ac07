use crate::executor::{ExecutorRegistry, SimulatedExecutor, TaskExecutor};
use crate::finished::FinishedTasks;
use crate::metrics;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use taskmesh_core::{
    Agent, AgentRole, ConfigManager, ExecutionError, Result, SchedulerConfig, SchedulerError, Task,
    TaskId, TaskMeshConfig, TaskStatus,
};
use taskmesh_lb::{LoadBalancer, LoadStatistics, SharedAgent};
use taskmesh_queue::TaskQueue;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type SharedTask = Arc<RwLock<Task>>;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

struct InFlight {
    task: SharedTask,
    agent: SharedAgent,
    handle: JoinHandle<()>,
}

/// Terminal view of a task: its final status plus whatever the executor
/// produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub running: bool,
    pub strategy: String,
    pub max_workers: usize,
    pub idle_workers: usize,
    pub queued: usize,
    pub queued_by_role: BTreeMap<AgentRole, usize>,
    pub in_flight: usize,
    pub in_progress: usize,
    pub finished: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub agents: LoadStatistics,
}

/// State shared between the public handle, the scheduler loop and every
/// execution unit.
///
/// Lock order: `in_flight`, then a queue or `finished`, then an agent, then a
/// task. Nothing acquires an earlier lock while holding a later one.
struct SystemInner {
    config: SchedulerConfig,
    load_balancer: LoadBalancer,
    queues: [TaskQueue; AgentRole::ALL.len()],
    in_flight: Mutex<HashMap<TaskId, InFlight>>,
    finished: Mutex<FinishedTasks>,
    workers: Arc<Semaphore>,
    executors: ExecutorRegistry,
    shutdown: CancellationToken,
    stopped: AtomicBool,
}

/// The orchestrator: per-role queues, a periodic scheduler loop, a bounded
/// worker pool and the bookkeeping that lets callers follow a task from
/// submission to its terminal state.
pub struct LoadBalancingSystem {
    inner: Arc<SystemInner>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl LoadBalancingSystem {
    /// Build a system from a validated configuration. Nothing runs until
    /// [`start`](Self::start).
    pub fn new(config: TaskMeshConfig) -> Result<Self> {
        let config = ConfigManager::from_config(config)?.into_config();
        let executor = Arc::new(SimulatedExecutor::new(&config.execution));
        let scheduler = config.scheduler;

        let inner = SystemInner {
            load_balancer: LoadBalancer::from_config(&scheduler),
            queues: AgentRole::ALL.map(TaskQueue::new),
            in_flight: Mutex::new(HashMap::new()),
            finished: Mutex::new(FinishedTasks::new(scheduler.finished_history_limit)),
            workers: Arc::new(Semaphore::new(scheduler.max_workers)),
            executors: ExecutorRegistry::new(executor),
            shutdown: CancellationToken::new(),
            stopped: AtomicBool::new(false),
            config: scheduler,
        };

        Ok(Self {
            inner: Arc::new(inner),
            scheduler: Mutex::new(None),
        })
    }

    pub fn with_defaults() -> Result<Self> {
        Self::new(TaskMeshConfig::default())
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn load_balancer(&self) -> &LoadBalancer {
        &self.inner.load_balancer
    }

    pub fn executors(&self) -> &ExecutorRegistry {
        &self.inner.executors
    }

    /// Replace the executor used when no per-agent or per-type one matches.
    pub fn set_default_executor(&self, executor: Arc<dyn TaskExecutor>) {
        self.inner.executors.set_default(executor);
    }

    // ---- agents ----

    pub fn register_agent(&self, agent: Agent) -> Result<()> {
        self.inner.load_balancer.register_agent(agent).map(|_| ())
    }

    /// Register `agent` together with the executor that performs its work.
    pub fn register_agent_with_executor(
        &self,
        agent: Agent,
        executor: Arc<dyn TaskExecutor>,
    ) -> Result<()> {
        let id = agent.id.clone();
        self.register_agent(agent)?;
        self.inner.executors.register_for_agent(id, executor);
        Ok(())
    }

    pub fn unregister_agent(&self, agent_id: &str) -> Option<Agent> {
        let removed = self.inner.load_balancer.unregister_agent(agent_id)?;
        self.inner.executors.remove_for_agent(agent_id);
        Some(removed)
    }

    pub fn heartbeat(&self, agent_id: &str) -> bool {
        self.inner.load_balancer.heartbeat(agent_id)
    }

    pub fn get_agent(&self, agent_id: &str) -> Option<Agent> {
        self.inner.load_balancer.get_agent(agent_id)
    }

    // ---- tasks ----

    pub fn submit_task(&self, task: Task) -> Result<TaskId> {
        if self.inner.stopped.load(Ordering::Acquire) {
            return Err(SchedulerError::ShutDown);
        }
        let id = task.id;
        if task.status != TaskStatus::Pending {
            return Err(SchedulerError::InvalidTask(
                id,
                format!("expected a pending task, got {}", task.status),
            ));
        }
        if !task.estimated_duration.is_finite() || task.estimated_duration < 0.0 {
            return Err(SchedulerError::InvalidTask(
                id,
                "estimated duration must be a non-negative number of seconds".into(),
            ));
        }
        if task.dependencies.contains(&id) {
            return Err(SchedulerError::InvalidTask(id, "task depends on itself".into()));
        }

        // Ids are unique across every role queue, not just the task's own.
        let in_flight = self.inner.in_flight.lock();
        if in_flight.contains_key(&id)
            || self.inner.queues.iter().any(|q| q.contains(&id))
            || self.inner.finished.lock().contains(&id)
        {
            return Err(SchedulerError::InvalidTask(id, "already submitted".into()));
        }
        let (role, priority) = (task.required_role, task.priority);
        if !self.inner.queue(role).push(task) {
            return Err(SchedulerError::InvalidTask(id, "already submitted".into()));
        }
        drop(in_flight);

        metrics::TASKS_SUBMITTED_TOTAL.inc();
        metrics::TASKS_QUEUED.inc();
        info!(task_id = %id, role = %role, priority = %priority, "task submitted");
        Ok(id)
    }

    /// Current status, or `None` if the id was never submitted (or has aged
    /// out of the finished archive).
    pub fn get_task_status(&self, task_id: &TaskId) -> Option<TaskStatus> {
        self.get_task(task_id).map(|task| task.status)
    }

    /// Snapshot of the task wherever it currently lives.
    pub fn get_task(&self, task_id: &TaskId) -> Option<Task> {
        let in_flight = self.inner.in_flight.lock();
        if let Some(task) = self.inner.queues.iter().find_map(|q| q.get_task(task_id)) {
            return Some(task);
        }
        if let Some(entry) = in_flight.get(task_id) {
            return Some(entry.task.read().clone());
        }
        self.inner.finished.lock().get(task_id).cloned()
    }

    /// Result and error of a task that reached a terminal state. `None`
    /// while the task is still queued or running, and for unknown ids.
    pub fn get_task_result(&self, task_id: &TaskId) -> Option<TaskOutcome> {
        let finished = self.inner.finished.lock();
        let task = finished.get(task_id)?;
        Some(TaskOutcome {
            status: task.status,
            result: task.result.clone(),
            error: task.error.clone(),
        })
    }

    /// Best-effort cancellation. Succeeds for queued tasks and for tasks that
    /// are assigned but still waiting for a worker; a task that has started
    /// runs to completion and this returns `false`.
    pub fn cancel_task(&self, task_id: &TaskId) -> bool {
        let mut in_flight = self.inner.in_flight.lock();

        for queue in &self.inner.queues {
            if let Some(mut task) = queue.take(task_id) {
                task.mark_cancelled();
                self.inner.finished.lock().insert(task);
                metrics::TASKS_CANCELLED_TOTAL.inc();
                metrics::TASKS_QUEUED.dec();
                info!(task_id = %task_id, role = %queue.role(), "queued task cancelled");
                return true;
            }
        }

        if self.inner.cancel_assigned(&mut in_flight, task_id) {
            info!(task_id = %task_id, "assigned task cancelled before it started");
            return true;
        }
        debug!(task_id = %task_id, "task not cancellable");
        false
    }

    /// Poll until the task is terminal or `timeout` elapses, returning the
    /// last status seen.
    pub async fn wait_for_task(&self, task_id: &TaskId, timeout: Duration) -> Option<TaskStatus> {
        let deadline = Instant::now() + timeout;
        loop {
            let status = self.get_task_status(task_id)?;
            if status.is_terminal() || Instant::now() >= deadline {
                return Some(status);
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    pub fn queue_size(&self, role: AgentRole) -> usize {
        self.inner.queue(role).len()
    }

    pub fn queued_tasks(&self, role: AgentRole) -> Vec<Task> {
        self.inner.queue(role).snapshot()
    }

    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    // ---- lifecycle ----

    /// Spawn the scheduler loop on the current tokio runtime. Calling it on
    /// a running system is a no-op; a stopped system cannot be restarted.
    pub fn start(&self) -> Result<()> {
        if self.inner.stopped.load(Ordering::Acquire) {
            return Err(SchedulerError::ShutDown);
        }
        let mut scheduler = self.scheduler.lock();
        if scheduler.is_some() {
            debug!("scheduler already running");
            return Ok(());
        }
        *scheduler = Some(tokio::spawn(Arc::clone(&self.inner).run_scheduler()));
        info!(
            max_workers = self.inner.config.max_workers,
            strategy = self.inner.load_balancer.strategy_name(),
            poll_interval_ms = self.inner.config.poll_interval_ms,
            "load balancing system started"
        );
        Ok(())
    }

    /// Halt dispatch, close the worker pool and cancel every assigned task
    /// that has not started. Running tasks finish on their own; queued tasks
    /// stay queued. Does not wait for anything.
    pub fn stop(&self) {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.shutdown.cancel();
        self.inner.workers.close();
        if let Some(handle) = self.scheduler.lock().take() {
            handle.abort();
        }

        let cancelled = {
            let mut in_flight = self.inner.in_flight.lock();
            let ids: Vec<TaskId> = in_flight.keys().copied().collect();
            ids.iter()
                .filter(|id| self.inner.cancel_assigned(&mut in_flight, id))
                .count()
        };
        info!(cancelled, "load balancing system stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.inner.stopped.load(Ordering::Acquire) && self.scheduler.lock().is_some()
    }

    /// Run a single scheduling pass over every role queue and return the
    /// number of tasks dispatched. The background loop calls this on every
    /// tick; callers driving the system by hand can call it directly.
    /// Must be called from within a tokio runtime.
    pub fn schedule_once(&self) -> usize {
        self.inner.schedule_pass()
    }

    pub fn system_stats(&self) -> SystemStats {
        let (in_flight, in_progress) = {
            let in_flight = self.inner.in_flight.lock();
            let in_progress = in_flight
                .values()
                .filter(|entry| entry.task.read().status == TaskStatus::InProgress)
                .count();
            (in_flight.len(), in_progress)
        };
        let (finished, counts) = {
            let finished = self.inner.finished.lock();
            (finished.len(), finished.counts())
        };
        let queued_by_role: BTreeMap<AgentRole, usize> = self
            .inner
            .queues
            .iter()
            .map(|q| (q.role(), q.len()))
            .collect();

        SystemStats {
            running: self.is_running(),
            strategy: self.inner.load_balancer.strategy_name().to_string(),
            max_workers: self.inner.config.max_workers,
            idle_workers: self.inner.workers.available_permits(),
            queued: queued_by_role.values().sum(),
            queued_by_role,
            in_flight,
            in_progress,
            finished,
            completed: counts.completed,
            failed: counts.failed,
            cancelled: counts.cancelled,
            agents: self.inner.load_balancer.load_statistics(),
        }
    }
}

impl Drop for LoadBalancingSystem {
    fn drop(&mut self) {
        self.stop();
    }
}

impl SystemInner {
    fn queue(&self, role: AgentRole) -> &TaskQueue {
        &self.queues[role as usize]
    }

    async fn run_scheduler(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!("scheduler loop running");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.schedule_pass();
                }
            }
        }
        debug!("scheduler loop exited");
    }

    fn schedule_pass(self: &Arc<Self>) -> usize {
        if self.stopped.load(Ordering::Acquire) {
            return 0;
        }
        let mut dispatched = 0;
        for role in AgentRole::ALL {
            // One failing role must not starve the others.
            match std::panic::catch_unwind(AssertUnwindSafe(|| self.dispatch_role(role))) {
                Ok(count) => dispatched += count,
                Err(panic) => error!(
                    role = %role,
                    error = %panic_message(panic.as_ref()),
                    "scheduling pass failed"
                ),
            }
        }
        dispatched
    }

    fn dispatch_role(self: &Arc<Self>, role: AgentRole) -> usize {
        let queue = self.queue(role);
        let mut dispatched = 0;
        while dispatched < self.config.max_dispatch_per_role {
            let Some(task) = self.next_ready(queue) else {
                break;
            };
            let Some(agent) = self.load_balancer.select_agent_for_task(&task) else {
                break;
            };
            if !self.dispatch(queue, task.id, agent) {
                break;
            }
            dispatched += 1;
        }
        dispatched
    }

    /// Highest-priority task whose dependencies are met. Without dependency
    /// enforcement that is simply the head of the queue.
    fn next_ready(&self, queue: &TaskQueue) -> Option<Task> {
        if !self.config.enforce_dependencies {
            return queue.peek();
        }
        let candidates = queue.snapshot();
        let finished = self.finished.lock();
        candidates
            .into_iter()
            .find(|task| task.dependencies_satisfied(|dep| finished.is_completed(dep)))
    }

    /// Reserve capacity on `agent`, then move the task from its queue into
    /// the in-flight map and spawn its execution unit. Returns `false` when
    /// the agent filled up or the task left the queue in the meantime; the
    /// next tick retries.
    fn dispatch(self: &Arc<Self>, queue: &TaskQueue, task_id: TaskId, agent: SharedAgent) -> bool {
        let agent_id = {
            let mut guard = agent.write();
            if !guard.add_task(task_id) {
                metrics::CAPACITY_RACES_TOTAL.inc();
                warn!(task_id = %task_id, agent_id = %guard.id, "agent lost capacity before reservation");
                return false;
            }
            guard.id.clone()
        };

        let mut in_flight = self.in_flight.lock();
        let Some(mut task) = queue.take(&task_id) else {
            agent.write().remove_task(&task_id);
            metrics::CAPACITY_RACES_TOTAL.inc();
            debug!(task_id = %task_id, "task left the queue before dispatch");
            return false;
        };
        task.mark_assigned(&agent_id);
        info!(
            task_id = %task_id,
            agent_id = %agent_id,
            role = %task.required_role,
            priority = %task.priority,
            "task assigned"
        );

        let task = Arc::new(RwLock::new(task));
        let handle = tokio::spawn(Arc::clone(self).run_task(task.clone(), agent.clone()));
        in_flight.insert(task_id, InFlight { task, agent, handle });

        metrics::TASKS_QUEUED.dec();
        metrics::TASKS_IN_FLIGHT.set(in_flight.len() as i64);
        true
    }

    /// Execution unit: wait for a worker, run the executor, record the
    /// outcome.
    async fn run_task(self: Arc<Self>, task: SharedTask, agent: SharedAgent) {
        let task_id = task.read().id;
        let _permit = match self.workers.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                // Pool closed by stop() before a worker freed up.
                let mut in_flight = self.in_flight.lock();
                self.cancel_assigned(&mut in_flight, &task_id);
                return;
            }
        };

        let agent_snapshot = agent.read().clone();
        let snapshot = {
            let mut guard = task.write();
            if !guard.mark_started() {
                // Cancelled while waiting for a worker.
                return;
            }
            guard.clone()
        };
        info!(task_id = %task_id, agent_id = %agent_snapshot.id, "task started");

        let executor = self
            .executors
            .resolve(&agent_snapshot.id, &snapshot.task_type);
        let started = Instant::now();
        let outcome = AssertUnwindSafe(executor.execute(&snapshot, &agent_snapshot))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ExecutionError::Panicked(panic_message(panic.as_ref()))));
        let elapsed = started.elapsed().as_secs_f64();

        self.finish(&task, &agent, outcome, elapsed);
    }

    fn finish(
        &self,
        task: &SharedTask,
        agent: &SharedAgent,
        outcome: std::result::Result<Value, ExecutionError>,
        elapsed_secs: f64,
    ) {
        let mut in_flight = self.in_flight.lock();
        let (task_id, task_type) = {
            let task = task.read();
            (task.id, task.task_type.clone())
        };
        let success = outcome.is_ok();
        let agent_id = {
            let mut agent = agent.write();
            agent.update_performance(&task_type, elapsed_secs, success);
            agent.remove_task(&task_id);
            agent.id.clone()
        };
        metrics::TASK_EXECUTION_SECONDS.observe(elapsed_secs);

        let mut finished = {
            let mut task = task.write();
            match outcome {
                Ok(result) => {
                    task.mark_completed(result);
                    metrics::TASKS_COMPLETED_TOTAL.inc();
                    info!(task_id = %task_id, agent_id = %agent_id, elapsed_secs, "task completed");
                }
                Err(err) => {
                    metrics::TASKS_FAILED_TOTAL.inc();
                    error!(task_id = %task_id, agent_id = %agent_id, error = %err, "task failed");
                    task.mark_failed(err.to_string());
                }
            }
            task.clone()
        };
        in_flight.remove(&task_id);
        metrics::TASKS_IN_FLIGHT.set(in_flight.len() as i64);

        if finished.reset_for_retry() {
            let attempt = finished.retry_count;
            if self.queue(finished.required_role).push(finished) {
                metrics::TASKS_RETRIED_TOTAL.inc();
                metrics::TASKS_QUEUED.inc();
                warn!(task_id = %task_id, attempt, "task re-queued for retry");
            }
        } else {
            self.finished.lock().insert(finished);
        }
    }

    /// Cancel an in-flight task that has not started yet. Caller holds the
    /// in-flight lock.
    fn cancel_assigned(&self, in_flight: &mut HashMap<TaskId, InFlight>, task_id: &TaskId) -> bool {
        let Some(entry) = in_flight.get(task_id) else {
            return false;
        };
        if !entry.task.write().mark_cancelled() {
            return false;
        }
        let Some(entry) = in_flight.remove(task_id) else {
            return false;
        };
        entry.agent.write().remove_task(task_id);
        entry.handle.abort();
        let snapshot = entry.task.read().clone();
        self.finished.lock().insert(snapshot);

        metrics::TASKS_CANCELLED_TOTAL.inc();
        metrics::TASKS_IN_FLIGHT.set(in_flight.len() as i64);
        true
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TaskMeshConfig {
        let mut config = TaskMeshConfig::default();
        config.scheduler.rng_seed = Some(1);
        config
    }

    #[test]
    fn queues_are_indexed_by_role() {
        let system = LoadBalancingSystem::new(config()).unwrap();
        for role in AgentRole::ALL {
            assert_eq!(system.inner.queue(role).role(), role);
        }
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let mut bad = config();
        bad.scheduler.max_workers = 0;
        assert!(matches!(
            LoadBalancingSystem::new(bad),
            Err(SchedulerError::Config(_))
        ));
    }

    #[test]
    fn submit_validates_tasks() {
        let system = LoadBalancingSystem::new(config()).unwrap();

        let negative = Task::new("codegen", AgentRole::Developer).with_estimated_duration(-1.0);
        assert!(matches!(
            system.submit_task(negative),
            Err(SchedulerError::InvalidTask(..))
        ));

        let mut started = Task::new("codegen", AgentRole::Developer);
        started.status = TaskStatus::InProgress;
        assert!(system.submit_task(started).is_err());

        let task = Task::new("codegen", AgentRole::Developer);
        let looped = task.clone().with_dependencies([task.id]);
        assert!(system.submit_task(looped).is_err());

        let id = system.submit_task(task.clone()).unwrap();
        assert!(system.submit_task(task).is_err());
        assert_eq!(system.queue_size(AgentRole::Developer), 1);
        assert_eq!(system.get_task_status(&id), Some(TaskStatus::Pending));
        assert!(system.get_task_result(&id).is_none());
    }

    #[test]
    fn panic_messages_are_extracted() {
        let text: Box<dyn Any + Send> = Box::new("boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("bang"));
        let other: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(text.as_ref()), "boom");
        assert_eq!(panic_message(owned.as_ref()), "bang");
        assert_eq!(panic_message(other.as_ref()), "unknown panic payload");
    }
}
