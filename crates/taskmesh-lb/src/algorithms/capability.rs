use super::PlacementStrategy;
use taskmesh_core::{Agent, LoadBalancingStrategy, Task};

/// Prefers the agent with the most capabilities beyond the required set;
/// ties go to the less loaded agent.
pub struct CapabilityBased;

impl CapabilityBased {
    pub fn new() -> Self {
        Self
    }
}
impl Default for CapabilityBased {
    fn default() -> Self {
        Self::new()
    }
}

impl PlacementStrategy for CapabilityBased {
    fn name(&self) -> &'static str {
        "capability_based"
    }

    fn kind(&self) -> LoadBalancingStrategy {
        LoadBalancingStrategy::CapabilityBased
    }

    fn pick(&self, task: &Task, candidates: &[Agent]) -> Option<usize> {
        let mut best = None::<(usize, usize, usize)>;
        for (i, agent) in candidates.iter().enumerate() {
            let extra = agent.extra_capabilities(&task.required_capabilities);
            let load = agent.current_load();
            let better = match best {
                None => true,
                Some((_, best_extra, best_load)) => {
                    extra > best_extra || (extra == best_extra && load < best_load)
                }
            };
            if better {
                best = Some((i, extra, load));
            }
        }
        best.map(|(i, _, _)| i)
    }
}
