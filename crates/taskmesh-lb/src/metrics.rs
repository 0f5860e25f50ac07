use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntGauge, Registry};

pub static PLACEMENTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| IntCounter::new("taskmesh_placements_total", "Tasks matched to an agent").unwrap());
pub static PLACEMENT_MISSES_TOTAL: Lazy<IntCounter> = Lazy::new(|| IntCounter::new("taskmesh_placement_misses_total", "Placement attempts with no eligible agent").unwrap());
pub static REGISTERED_AGENTS: Lazy<IntGauge> = Lazy::new(|| IntGauge::new("taskmesh_registered_agents", "Agents in the registry").unwrap());

pub fn register(reg: &Registry) {
    reg.register(Box::new(PLACEMENTS_TOTAL.clone())).ok();
    reg.register(Box::new(PLACEMENT_MISSES_TOTAL.clone())).ok();
    reg.register(Box::new(REGISTERED_AGENTS.clone())).ok();
}
