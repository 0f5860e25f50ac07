use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};

pub static TASKS_SUBMITTED_TOTAL: Lazy<IntCounter> = Lazy::new(|| IntCounter::new("taskmesh_tasks_submitted_total", "Tasks accepted by submit_task").unwrap());
pub static TASKS_COMPLETED_TOTAL: Lazy<IntCounter> = Lazy::new(|| IntCounter::new("taskmesh_tasks_completed_total", "Tasks finished successfully").unwrap());
pub static TASKS_FAILED_TOTAL: Lazy<IntCounter> = Lazy::new(|| IntCounter::new("taskmesh_tasks_failed_total", "Task attempts that failed or panicked").unwrap());
pub static TASKS_CANCELLED_TOTAL: Lazy<IntCounter> = Lazy::new(|| IntCounter::new("taskmesh_tasks_cancelled_total", "Tasks cancelled before they started").unwrap());
pub static TASKS_RETRIED_TOTAL: Lazy<IntCounter> = Lazy::new(|| IntCounter::new("taskmesh_tasks_retried_total", "Failed tasks put back on their queue").unwrap());
pub static CAPACITY_RACES_TOTAL: Lazy<IntCounter> = Lazy::new(|| IntCounter::new("taskmesh_capacity_races_total", "Placements abandoned because the agent filled up or the task vanished").unwrap());
pub static TASKS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| IntGauge::new("taskmesh_tasks_in_flight", "Tasks assigned or running").unwrap());
pub static TASKS_QUEUED: Lazy<IntGauge> = Lazy::new(|| IntGauge::new("taskmesh_tasks_queued", "Tasks waiting in role queues").unwrap());
pub static TASK_EXECUTION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("taskmesh_task_execution_seconds", "Wall time spent in the executor")
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
    )
    .unwrap()
});

/// Register scheduler and load balancer metrics with `reg`.
pub fn register(reg: &Registry) {
    reg.register(Box::new(TASKS_SUBMITTED_TOTAL.clone())).ok();
    reg.register(Box::new(TASKS_COMPLETED_TOTAL.clone())).ok();
    reg.register(Box::new(TASKS_FAILED_TOTAL.clone())).ok();
    reg.register(Box::new(TASKS_CANCELLED_TOTAL.clone())).ok();
    reg.register(Box::new(TASKS_RETRIED_TOTAL.clone())).ok();
    reg.register(Box::new(CAPACITY_RACES_TOTAL.clone())).ok();
    reg.register(Box::new(TASKS_IN_FLIGHT.clone())).ok();
    reg.register(Box::new(TASKS_QUEUED.clone())).ok();
    reg.register(Box::new(TASK_EXECUTION_SECONDS.clone())).ok();
    taskmesh_lb::metrics::register(reg);
}
