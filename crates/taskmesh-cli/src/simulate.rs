use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use taskmesh_core::{Agent, AgentRole, Task, TaskMeshConfig, TaskPriority, TaskStatus};
use taskmesh_scheduler::{LoadBalancingSystem, SystemStats};
use tracing::{info, warn};

const CAPABILITY_POOL: [&str; 6] = ["python", "rust", "docker", "sql", "kubernetes", "react"];
const PRIORITIES: [TaskPriority; 4] = [
    TaskPriority::Low,
    TaskPriority::Medium,
    TaskPriority::High,
    TaskPriority::Critical,
];
const POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub agents: usize,
    pub tasks: usize,
    pub roles: Vec<AgentRole>,
    pub capacity: usize,
    pub min_duration_secs: f64,
    pub max_duration_secs: f64,
    pub seed: u64,
    pub timeout: Duration,
}

#[derive(Debug, Serialize)]
pub struct AgentSummary {
    pub role: AgentRole,
    pub capabilities: Vec<String>,
    pub assigned: usize,
    pub avg_execution_secs: f64,
    pub success_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct SimulationReport {
    pub strategy: String,
    pub agents: usize,
    pub tasks: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub unfinished: usize,
    pub elapsed_secs: f64,
    pub throughput_per_sec: f64,
    pub avg_wait_secs: f64,
    pub by_agent: BTreeMap<String, AgentSummary>,
    pub stats: SystemStats,
}

/// Agents spread round-robin over `plan.roles`, each holding two adjacent
/// capabilities from the pool.
pub fn build_agents(plan: &SimulationPlan) -> Vec<Agent> {
    (0..plan.agents)
        .map(|i| {
            let role = plan.roles[i % plan.roles.len()];
            Agent::new(format!("{}-{}", role, i), role, plan.capacity).with_capabilities([
                CAPABILITY_POOL[i % CAPABILITY_POOL.len()],
                CAPABILITY_POOL[(i + 1) % CAPABILITY_POOL.len()],
            ])
        })
        .collect()
}

/// Random tasks that some agent in `agents` can always serve.
pub fn build_tasks(plan: &SimulationPlan, agents: &[Agent], rng: &mut StdRng) -> Vec<Task> {
    let mut capabilities: BTreeMap<AgentRole, Vec<String>> = BTreeMap::new();
    for agent in agents {
        let entry = capabilities.entry(agent.role).or_default();
        for cap in &agent.capabilities {
            if !entry.contains(cap) {
                entry.push(cap.clone());
            }
        }
    }
    let roles: Vec<AgentRole> = capabilities.keys().copied().collect();
    if roles.is_empty() {
        return Vec::new();
    }

    (0..plan.tasks)
        .map(|i| {
            let role = roles[rng.random_range(0..roles.len())];
            let priority = PRIORITIES[rng.random_range(0..PRIORITIES.len())];
            let duration = if plan.max_duration_secs > plan.min_duration_secs {
                rng.random_range(plan.min_duration_secs..plan.max_duration_secs)
            } else {
                plan.min_duration_secs
            };
            let mut task = Task::new(format!("{}_work", role), role)
                .with_description(format!("simulated task #{}", i))
                .with_priority(priority)
                .with_estimated_duration(duration);

            let pool = &capabilities[&role];
            if !pool.is_empty() && rng.random_bool(0.5) {
                task = task.with_capabilities([pool[rng.random_range(0..pool.len())].clone()]);
            }
            task
        })
        .collect()
}

pub async fn run(mut config: TaskMeshConfig, plan: &SimulationPlan) -> Result<SimulationReport> {
    anyhow::ensure!(plan.agents > 0, "simulation needs at least one agent");
    anyhow::ensure!(!plan.roles.is_empty(), "simulation needs at least one role");
    config.scheduler.finished_history_limit = config.scheduler.finished_history_limit.max(plan.tasks);

    let mut rng = StdRng::seed_from_u64(plan.seed);
    let system = LoadBalancingSystem::new(config).context("Failed to build scheduler")?;

    let agents = build_agents(plan);
    for agent in &agents {
        system
            .register_agent(agent.clone())
            .with_context(|| format!("Failed to register agent {}", agent.id))?;
    }
    let tasks = build_tasks(plan, &agents, &mut rng);

    let started = Instant::now();
    system.start().context("Failed to start scheduler")?;
    let mut ids = Vec::with_capacity(tasks.len());
    for task in tasks {
        ids.push(system.submit_task(task)?);
    }
    info!(agents = agents.len(), tasks = ids.len(), "simulation running");

    let deadline = started + plan.timeout;
    loop {
        let done = ids
            .iter()
            .all(|id| system.get_task_status(id).map_or(true, |s| s.is_terminal()));
        if done {
            break;
        }
        if Instant::now() >= deadline {
            warn!(timeout = ?plan.timeout, "simulation timed out with unfinished tasks");
            break;
        }
        for agent in &agents {
            system.heartbeat(&agent.id);
        }
        tokio::time::sleep(POLL).await;
    }
    let elapsed = started.elapsed().as_secs_f64();

    let mut report = SimulationReport {
        strategy: system.load_balancer().strategy_name().to_string(),
        agents: agents.len(),
        tasks: ids.len(),
        completed: 0,
        failed: 0,
        cancelled: 0,
        unfinished: 0,
        elapsed_secs: elapsed,
        throughput_per_sec: 0.0,
        avg_wait_secs: 0.0,
        by_agent: BTreeMap::new(),
        stats: system.system_stats(),
    };

    let mut assigned: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_wait = 0.0;
    for id in &ids {
        let Some(task) = system.get_task(id) else {
            continue;
        };
        match task.status {
            TaskStatus::Completed => report.completed += 1,
            TaskStatus::Failed => report.failed += 1,
            TaskStatus::Cancelled => report.cancelled += 1,
            _ => report.unfinished += 1,
        }
        total_wait += task.waiting_time().as_secs_f64();
        if let Some(agent) = task.assigned_agent_id {
            *assigned.entry(agent).or_default() += 1;
        }
    }
    if !ids.is_empty() {
        report.avg_wait_secs = total_wait / ids.len() as f64;
    }
    if elapsed > 0.0 {
        report.throughput_per_sec = report.completed as f64 / elapsed;
    }

    for agent in &agents {
        let Some(snapshot) = system.get_agent(&agent.id) else {
            continue;
        };
        let samples: u64 = snapshot.performance_metrics().values().map(|p| p.samples).sum();
        let weighted = |f: fn(&taskmesh_core::PerformanceStats) -> f64| {
            if samples == 0 {
                return 0.0;
            }
            snapshot
                .performance_metrics()
                .values()
                .map(|p| f(p) * p.samples as f64)
                .sum::<f64>()
                / samples as f64
        };
        report.by_agent.insert(
            snapshot.id.clone(),
            AgentSummary {
                role: snapshot.role,
                capabilities: snapshot.capabilities.iter().cloned().collect(),
                assigned: assigned.get(&snapshot.id).copied().unwrap_or(0),
                avg_execution_secs: weighted(|p| p.avg_execution_secs),
                success_rate: weighted(|p| p.success_rate),
            },
        );
    }

    system.stop();
    info!(
        completed = report.completed,
        failed = report.failed,
        elapsed_secs = elapsed,
        "simulation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan() -> SimulationPlan {
        SimulationPlan {
            agents: 4,
            tasks: 20,
            roles: vec![AgentRole::Developer, AgentRole::QaEngineer],
            capacity: 2,
            min_duration_secs: 0.0,
            max_duration_secs: 0.02,
            seed: 42,
            timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn generated_tasks_are_always_placeable() {
        let plan = plan();
        let agents = build_agents(&plan);
        assert_eq!(agents.len(), 4);
        assert_eq!(agents[0].role, AgentRole::Developer);
        assert_eq!(agents[1].role, AgentRole::QaEngineer);

        let tasks = build_tasks(&plan, &agents, &mut StdRng::seed_from_u64(plan.seed));
        assert_eq!(tasks.len(), 20);
        for task in &tasks {
            assert!(agents
                .iter()
                .any(|a| a.role == task.required_role && a.has_capabilities(&task.required_capabilities)));
        }
    }

    #[tokio::test]
    async fn small_simulation_completes() {
        let mut config = TaskMeshConfig::default();
        config.scheduler.poll_interval_ms = 5;
        config.scheduler.max_dispatch_per_role = 4;
        config.scheduler.rng_seed = Some(1);

        let report = run(config, &plan()).await.unwrap();
        assert_eq!(report.tasks, 20);
        assert_eq!(report.completed, 20);
        assert_eq!(report.unfinished, 0);
        let assigned: usize = report.by_agent.values().map(|a| a.assigned).sum();
        assert_eq!(assigned, 20);
    }
}
