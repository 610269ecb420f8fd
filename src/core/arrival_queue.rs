//! Pending tasks ordered by arrival offset.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::core::Task;

/// Wrapper ordering tasks by earliest arrival first, then by input index.
struct PendingTask {
    index: usize,
    task: Task,
}

impl PartialEq for PendingTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PendingTask {}

impl PartialOrd for PendingTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: BinaryHeap is a max-heap and we want the earliest on top.
        other
            .task
            .arrival_offset
            .cmp(&self.task.arrival_offset)
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// Min-heap of tasks keyed by `(arrival_offset, input index)`.
///
/// Popping yields a non-decreasing arrival order; tasks with equal offsets
/// come out in the order they were pushed.
#[derive(Default)]
pub struct ArrivalQueue {
    tasks: BinaryHeap<PendingTask>,
    next_index: usize,
}

impl ArrivalQueue {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task; its input index is its push position.
    pub fn push(&mut self, task: Task) {
        let index = self.next_index;
        self.next_index += 1;
        self.tasks.push(PendingTask { index, task });
    }

    /// Next task to admit, with its input index.
    pub fn pop(&mut self) -> Option<(usize, Task)> {
        self.tasks.pop().map(|p| (p.index, p.task))
    }

    /// Next task without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<&Task> {
        self.tasks.peek().map(|p| &p.task)
    }

    /// Tasks still pending.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether every task has been popped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl FromIterator<Task> for ArrivalQueue {
    fn from_iter<I: IntoIterator<Item = Task>>(iter: I) -> Self {
        let mut queue = Self::new();
        for task in iter {
            queue.push(task);
        }
        queue
    }
}

/// Input indices of `tasks` in admission order.
#[must_use]
pub fn admission_order(tasks: &[Task]) -> Vec<usize> {
    let mut queue: ArrivalQueue = tasks.iter().cloned().collect();
    let mut order = Vec::with_capacity(tasks.len());
    while let Some((index, _)) = queue.pop() {
        order.push(index);
    }
    order
}
