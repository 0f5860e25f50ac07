use super::PlacementStrategy;
use parking_lot::Mutex;
use rand::{rngs::StdRng, Rng, SeedableRng};
use taskmesh_core::{Agent, LoadBalancingStrategy, PerformanceStats, Task};

/// Performance factor for agents without history for the task type.
const NEUTRAL_PERFORMANCE: f64 = 0.5;
/// Extra capabilities beyond which the capability bonus saturates.
const CAPABILITY_SATURATION: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveWeights {
    pub load: f64,
    pub performance: f64,
    pub capability: f64,
    pub random: f64,
}

impl Default for AdaptiveWeights {
    fn default() -> Self {
        Self {
            load: 0.30,
            performance: 0.40,
            capability: 0.20,
            random: 0.10,
        }
    }
}

/// Weighted composite of headroom, past performance, spare capabilities and
/// a random term. The random term keeps otherwise-equal agents from starving.
pub struct Adaptive {
    weights: AdaptiveWeights,
    rng: Mutex<StdRng>,
}

impl Adaptive {
    pub fn new() -> Self {
        Self {
            weights: AdaptiveWeights::default(),
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self {
            weights: AdaptiveWeights::default(),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn with_weights(mut self, weights: AdaptiveWeights) -> Self {
        self.weights = weights;
        self
    }

    /// `success_rate / (1 + avg_minutes)`, in `[0, 1]`.
    pub fn performance_factor(stats: Option<&PerformanceStats>) -> f64 {
        match stats {
            Some(s) if s.samples > 0 => s.success_rate / (1.0 + s.avg_execution_secs / 60.0),
            _ => NEUTRAL_PERFORMANCE,
        }
    }

    fn score(&self, task: &Task, agent: &Agent, noise: f64) -> f64 {
        let w = &self.weights;
        let headroom = 1.0 - agent.load_percentage() / 100.0;
        let performance = Self::performance_factor(agent.performance_for(&task.task_type));
        let extra = agent.extra_capabilities(&task.required_capabilities) as f64;
        let capability = (extra / CAPABILITY_SATURATION).min(1.0);

        w.load * headroom + w.performance * performance + w.capability * capability + w.random * noise
    }
}

impl Default for Adaptive {
    fn default() -> Self {
        Self::new()
    }
}

impl PlacementStrategy for Adaptive {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn kind(&self) -> LoadBalancingStrategy {
        LoadBalancingStrategy::Adaptive
    }

    fn pick(&self, task: &Task, candidates: &[Agent]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        let noise: Vec<f64> = {
            let mut rng = self.rng.lock();
            candidates.iter().map(|_| rng.random::<f64>()).collect()
        };

        let mut best = None::<usize>;
        let mut best_score = f64::NEG_INFINITY;
        for (i, agent) in candidates.iter().enumerate() {
            let score = self.score(task, agent, noise[i]);
            if score > best_score {
                best_score = score;
                best = Some(i);
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_core::AgentRole;

    #[test]
    fn performance_factor_is_neutral_without_history() {
        assert_eq!(Adaptive::performance_factor(None), NEUTRAL_PERFORMANCE);

        let mut stats = PerformanceStats::default();
        stats.record(0.0, true);
        assert!((Adaptive::performance_factor(Some(&stats)) - 1.0).abs() < 1e-9);

        stats.record(120.0, false);
        // avg 60s, success 0.5 -> 0.5 / 2
        assert!((Adaptive::performance_factor(Some(&stats)) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn idle_specialist_beats_saturated_generalist() {
        let adaptive = Adaptive::with_seed(7);
        let task = Task::new("codegen", AgentRole::Developer).with_capabilities(["python"]);

        let mut busy = Agent::new("busy", AgentRole::Developer, 2)
            .with_capabilities(["python"]);
        busy.add_task(uuid::Uuid::new_v4());
        let idle = Agent::new("idle", AgentRole::Developer, 2)
            .with_capabilities(["python", "rust", "go", "sql", "docker", "k8s"]);

        // Score gap (0.15 headroom + 0.2 capability) exceeds the 0.1 noise range.
        for _ in 0..20 {
            assert_eq!(adaptive.pick(&task, &[busy.clone(), idle.clone()]), Some(1));
        }
    }

    #[test]
    fn random_term_spreads_equal_agents() {
        let adaptive = Adaptive::with_seed(42);
        let task = Task::new("codegen", AgentRole::Developer);
        let agents = vec![
            Agent::new("a", AgentRole::Developer, 4),
            Agent::new("b", AgentRole::Developer, 4),
        ];
        let mut hits = [0usize; 2];
        for _ in 0..200 {
            hits[adaptive.pick(&task, &agents).unwrap()] += 1;
        }
        assert!(hits[0] > 0 && hits[1] > 0, "hits = {:?}", hits);
    }
}
