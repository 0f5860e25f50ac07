use crate::algorithms::{build_strategy, PlacementStrategy};
use crate::metrics;
use crate::stats::{LoadStatistics, RoleLoad};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use taskmesh_core::{
    Agent, AgentId, AgentRole, AgentStatus, LoadBalancingStrategy, Result, SchedulerConfig,
    SchedulerError, Task,
};
use tracing::{debug, info, warn};

/// An agent shared between the registry, the scheduler and running tasks.
/// All mutation of agent state happens under this lock.
pub type SharedAgent = Arc<RwLock<Agent>>;

const DEFAULT_HEARTBEAT_TIMEOUT_SECS: i64 = 60;

/// Owns the agent registry and answers placement queries.
pub struct LoadBalancer {
    // BTreeMap keeps candidate order stable between calls, which the
    // rotating strategies rely on.
    agents: RwLock<BTreeMap<AgentId, SharedAgent>>,
    strategy: Box<dyn PlacementStrategy>,
    heartbeat_timeout: Duration,
}

impl LoadBalancer {
    pub fn new(kind: LoadBalancingStrategy) -> Self {
        Self::with_strategy(build_strategy(kind, None))
    }

    pub fn with_strategy(strategy: Box<dyn PlacementStrategy>) -> Self {
        Self {
            agents: RwLock::new(BTreeMap::new()),
            strategy,
            heartbeat_timeout: Duration::seconds(DEFAULT_HEARTBEAT_TIMEOUT_SECS),
        }
    }

    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::with_strategy(build_strategy(config.strategy, config.rng_seed))
            .with_heartbeat_timeout(config.heartbeat_timeout())
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn strategy_kind(&self) -> LoadBalancingStrategy {
        self.strategy.kind()
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    pub fn register_agent(&self, agent: Agent) -> Result<SharedAgent> {
        if agent.id.trim().is_empty() {
            return Err(SchedulerError::InvalidAgent("agent id is empty".into()));
        }
        if agent.max_concurrent_tasks == 0 {
            return Err(SchedulerError::InvalidAgent(format!(
                "agent {} has zero capacity",
                agent.id
            )));
        }

        let mut agents = self.agents.write();
        if agents.contains_key(&agent.id) {
            return Err(SchedulerError::DuplicateAgent(agent.id));
        }
        info!(
            agent_id = %agent.id,
            role = %agent.role,
            capacity = agent.max_concurrent_tasks,
            capabilities = ?agent.capabilities,
            "agent registered"
        );
        let id = agent.id.clone();
        let shared = Arc::new(RwLock::new(agent));
        agents.insert(id, shared.clone());
        metrics::REGISTERED_AGENTS.set(agents.len() as i64);
        Ok(shared)
    }

    /// Remove an agent. Tasks it is running keep their handle to it and
    /// finish normally; it just receives no new work.
    pub fn unregister_agent(&self, agent_id: &str) -> Option<Agent> {
        let mut agents = self.agents.write();
        let removed = agents.remove(agent_id)?;
        metrics::REGISTERED_AGENTS.set(agents.len() as i64);
        drop(agents);

        let snapshot = removed.read().clone();
        if snapshot.current_load() > 0 {
            warn!(
                agent_id,
                in_flight = snapshot.current_load(),
                "agent unregistered with tasks still running"
            );
        } else {
            info!(agent_id, "agent unregistered");
        }
        Some(snapshot)
    }

    /// Refresh an agent's heartbeat. Returns `false` for unknown agents.
    pub fn heartbeat(&self, agent_id: &str) -> bool {
        match self.agent_handle(agent_id) {
            Some(agent) => {
                agent.write().heartbeat();
                true
            }
            None => false,
        }
    }

    pub fn agent_handle(&self, agent_id: &str) -> Option<SharedAgent> {
        self.agents.read().get(agent_id).cloned()
    }

    pub fn get_agent(&self, agent_id: &str) -> Option<Agent> {
        self.agent_handle(agent_id).map(|a| a.read().clone())
    }

    pub fn agents(&self) -> Vec<Agent> {
        self.agents
            .read()
            .values()
            .map(|a| a.read().clone())
            .collect()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.read().len()
    }

    fn is_eligible(
        &self,
        agent: &Agent,
        role: AgentRole,
        capabilities: &BTreeSet<String>,
        now: DateTime<Utc>,
    ) -> bool {
        agent.role == role
            && agent.has_capabilities(capabilities)
            && agent.is_available()
            && agent.is_alive_at(now, self.heartbeat_timeout)
    }

    /// Snapshots of eligible agents, paired with their handles, in id order.
    fn eligible(
        &self,
        role: AgentRole,
        capabilities: &BTreeSet<String>,
    ) -> (Vec<SharedAgent>, Vec<Agent>) {
        let now = Utc::now();
        let agents = self.agents.read();
        let mut handles = Vec::new();
        let mut snapshots = Vec::new();
        for handle in agents.values() {
            let agent = handle.read();
            if self.is_eligible(&agent, role, capabilities, now) {
                snapshots.push(agent.clone());
                handles.push(handle.clone());
            }
        }
        (handles, snapshots)
    }

    /// Agents matching `role`, holding every capability in `capabilities`,
    /// with spare capacity and a fresh heartbeat.
    pub fn get_available_agents(
        &self,
        role: AgentRole,
        capabilities: &BTreeSet<String>,
    ) -> Vec<Agent> {
        self.eligible(role, capabilities).1
    }

    /// Choose an agent for `task` with the configured strategy. `None` means
    /// nobody is eligible right now; the caller should retry later.
    ///
    /// Selection does not reserve capacity. Reserve with
    /// [`Agent::add_task`] under the agent's write lock and treat a `false`
    /// as a lost race.
    pub fn select_agent_for_task(&self, task: &Task) -> Option<SharedAgent> {
        let (handles, snapshots) = self.eligible(task.required_role, &task.required_capabilities);
        if snapshots.is_empty() {
            metrics::PLACEMENT_MISSES_TOTAL.inc();
            debug!(
                task_id = %task.id,
                role = %task.required_role,
                capabilities = ?task.required_capabilities,
                "no eligible agent"
            );
            return None;
        }

        let index = self.strategy.pick(task, &snapshots)?;
        let chosen = handles.get(index)?.clone();
        metrics::PLACEMENTS_TOTAL.inc();
        debug!(
            task_id = %task.id,
            agent_id = %snapshots[index].id,
            strategy = self.strategy.name(),
            candidates = snapshots.len(),
            "agent selected"
        );
        Some(chosen)
    }

    pub fn load_statistics(&self) -> LoadStatistics {
        let now = Utc::now();
        let mut stats = LoadStatistics {
            strategy: self.strategy.name().to_string(),
            ..Default::default()
        };
        let mut load_sums: BTreeMap<AgentRole, f64> = BTreeMap::new();

        for handle in self.agents.read().values() {
            let agent = handle.read();
            stats.total_agents += 1;
            stats.total_capacity += agent.max_concurrent_tasks;
            stats.total_current_tasks += agent.current_load();

            let status = agent.status_at(now, self.heartbeat_timeout);
            match status {
                AgentStatus::Available => stats.available_agents += 1,
                AgentStatus::Busy => stats.busy_agents += 1,
                AgentStatus::Offline => stats.offline_agents += 1,
            }

            let role = stats.by_role.entry(agent.role).or_insert_with(RoleLoad::default);
            role.agents += 1;
            role.capacity += agent.max_concurrent_tasks;
            role.current_tasks += agent.current_load();
            if status == AgentStatus::Available {
                role.available += 1;
            }
            *load_sums.entry(agent.role).or_insert(0.0) += agent.load_percentage();
        }

        for (role, load) in stats.by_role.iter_mut() {
            if load.agents > 0 {
                load.avg_load_percentage = load_sums.get(role).copied().unwrap_or(0.0) / load.agents as f64;
            }
        }
        stats
    }
}
