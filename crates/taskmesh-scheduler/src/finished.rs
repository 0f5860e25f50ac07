use std::collections::{HashMap, VecDeque};
use taskmesh_core::{Task, TaskId, TaskStatus};

/// Terminal tasks, oldest evicted first once `limit` is reached.
#[derive(Debug)]
pub(crate) struct FinishedTasks {
    limit: usize,
    order: VecDeque<TaskId>,
    tasks: HashMap<TaskId, Task>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FinishedCounts {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl FinishedTasks {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            order: VecDeque::new(),
            tasks: HashMap::new(),
        }
    }

    pub fn insert(&mut self, task: Task) {
        let id = task.id;
        if self.tasks.insert(id, task).is_none() {
            self.order.push_back(id);
        }
        while self.order.len() > self.limit {
            if let Some(oldest) = self.order.pop_front() {
                self.tasks.remove(&oldest);
            }
        }
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn is_completed(&self, id: &TaskId) -> bool {
        self.tasks
            .get(id)
            .is_some_and(|t| t.status == TaskStatus::Completed)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn counts(&self) -> FinishedCounts {
        let mut counts = FinishedCounts::default();
        for task in self.tasks.values() {
            match task.status {
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Cancelled => counts.cancelled += 1,
                _ => {}
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_core::AgentRole;

    fn cancelled() -> Task {
        let mut task = Task::new("codegen", AgentRole::Developer);
        task.mark_cancelled();
        task
    }

    #[test]
    fn evicts_oldest_past_limit() {
        let mut finished = FinishedTasks::new(2);
        let (a, b, c) = (cancelled(), cancelled(), cancelled());
        let (a_id, b_id, c_id) = (a.id, b.id, c.id);
        finished.insert(a);
        finished.insert(b);
        finished.insert(c);

        assert_eq!(finished.len(), 2);
        assert!(!finished.contains(&a_id));
        assert!(finished.contains(&b_id) && finished.contains(&c_id));
        assert_eq!(finished.counts().cancelled, 2);
    }

    #[test]
    fn reinserting_does_not_duplicate_order() {
        let mut finished = FinishedTasks::new(2);
        let task = cancelled();
        finished.insert(task.clone());
        finished.insert(task);
        assert_eq!(finished.order.len(), 1);
        assert!(!finished.is_completed(&finished.order[0]));
    }
}
