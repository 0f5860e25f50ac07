//! Per-role priority queue.
//!
//! Tasks are ordered by priority (highest first) and, within a priority, by
//! arrival. The heap and the id index live behind a single mutex so every
//! operation sees a consistent view of both.

use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use taskmesh_core::{AgentRole, Task, TaskId, TaskPriority};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct QueueEntry {
    priority: TaskPriority,
    seq: u64,
    task_id: TaskId,
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher priority wins, then lower sequence.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
            .then_with(|| other.task_id.cmp(&self.task_id))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct Inner {
    heap: BinaryHeap<QueueEntry>,
    tasks: HashMap<TaskId, Task>,
    next_seq: u64,
}

impl Inner {
    fn next_seq(&mut self) -> u64 {
        if self.next_seq == u64::MAX {
            self.renumber();
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Compact sequence numbers to `0..len`, preserving the current order.
    fn renumber(&mut self) {
        let mut entries = std::mem::take(&mut self.heap).into_sorted_vec();
        entries.reverse();
        for (seq, entry) in entries.iter_mut().enumerate() {
            entry.seq = seq as u64;
        }
        self.next_seq = entries.len() as u64;
        self.heap = BinaryHeap::from(entries);
    }
}

#[derive(Debug)]
pub struct TaskQueue {
    role: AgentRole,
    inner: Mutex<Inner>,
}

impl TaskQueue {
    pub fn new(role: AgentRole) -> Self {
        Self {
            role,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    /// Enqueue `task`. Returns `false` if a task with the same id is already
    /// queued; the queued copy is left untouched.
    pub fn push(&self, task: Task) -> bool {
        let mut inner = self.inner.lock();
        if inner.tasks.contains_key(&task.id) {
            warn!(task_id = %task.id, role = %self.role, "task already queued");
            return false;
        }
        let seq = inner.next_seq();
        let entry = QueueEntry {
            priority: task.priority,
            seq,
            task_id: task.id,
        };
        debug!(task_id = %task.id, priority = %task.priority, seq, role = %self.role, "task queued");
        inner.tasks.insert(task.id, task);
        inner.heap.push(entry);
        true
    }

    /// Remove and return the highest-priority task.
    pub fn pop(&self) -> Option<Task> {
        let mut inner = self.inner.lock();
        let entry = inner.heap.pop()?;
        inner.tasks.remove(&entry.task_id)
    }

    /// Clone of the highest-priority task, left in place.
    pub fn peek(&self) -> Option<Task> {
        let inner = self.inner.lock();
        let entry = inner.heap.peek()?;
        inner.tasks.get(&entry.task_id).cloned()
    }

    /// Remove a specific task and return it.
    pub fn take(&self, task_id: &TaskId) -> Option<Task> {
        let mut inner = self.inner.lock();
        let task = inner.tasks.remove(task_id)?;
        inner.heap.retain(|entry| entry.task_id != *task_id);
        Some(task)
    }

    pub fn remove(&self, task_id: &TaskId) -> bool {
        self.take(task_id).is_some()
    }

    pub fn get_task(&self, task_id: &TaskId) -> Option<Task> {
        self.inner.lock().tasks.get(task_id).cloned()
    }

    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.inner.lock().tasks.contains_key(task_id)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().heap.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.heap.clear();
        inner.tasks.clear();
    }

    /// Queued tasks in dequeue order.
    pub fn snapshot(&self) -> Vec<Task> {
        let inner = self.inner.lock();
        let mut entries = inner.heap.clone().into_sorted_vec();
        entries.reverse();
        entries
            .iter()
            .filter_map(|entry| inner.tasks.get(&entry.task_id).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(priority: TaskPriority) -> Task {
        Task::new("codegen", AgentRole::Developer).with_priority(priority)
    }

    #[test]
    fn renumbering_keeps_fifo_order() {
        let queue = TaskQueue::new(AgentRole::Developer);
        queue.inner.lock().next_seq = u64::MAX - 1;

        let first = task(TaskPriority::Medium);
        let second = task(TaskPriority::Medium);
        let third = task(TaskPriority::Medium);
        let urgent = task(TaskPriority::High);
        let ids = [urgent.id, first.id, second.id, third.id];

        queue.push(first);
        queue.push(second);
        queue.push(third);
        queue.push(urgent);
        assert!(queue.inner.lock().next_seq < 10);

        let popped: Vec<TaskId> = std::iter::from_fn(|| queue.pop()).map(|t| t.id).collect();
        assert_eq!(popped, ids);
    }

    #[test]
    fn heap_and_index_stay_in_sync() {
        let queue = TaskQueue::new(AgentRole::Developer);
        let a = task(TaskPriority::Low);
        let b = task(TaskPriority::High);
        let (a_id, b_id) = (a.id, b.id);
        queue.push(a);
        queue.push(b);

        assert!(queue.remove(&b_id));
        let inner = queue.inner.lock();
        assert_eq!(inner.heap.len(), inner.tasks.len());
        assert!(inner.tasks.contains_key(&a_id));
    }
}
