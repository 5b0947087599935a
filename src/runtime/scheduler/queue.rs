//! Ready queue for the scheduler
//!
//! Tasks are popped highest priority first. Tasks of equal priority come out
//! in the order they were pushed, which is what a stable sort by descending
//! priority after every insertion would give, at `O(log n)` per operation.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::task::{Task, TaskPriority};

struct Entry {
    priority: TaskPriority,
    seq: u64,
    task: Task,
}

impl PartialEq for Entry {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(
        &self,
        other: &Self,
    ) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(
        &self,
        other: &Self,
    ) -> Ordering {
        // Max-heap: higher priority wins, then the lower sequence number.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority-ordered, insertion-stable queue of ready tasks.
#[derive(Default)]
pub struct ReadyQueue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

impl ReadyQueue {
    /// Create a new empty queue.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task behind every queued task of the same priority.
    pub fn push(
        &mut self,
        task: Task,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            priority: task.priority(),
            seq,
            task,
        });
    }

    /// Pop the highest priority task.
    #[inline]
    pub fn pop(&mut self) -> Option<Task> {
        self.heap.pop().map(|entry| entry.task)
    }

    /// Peek at the task that would be popped next.
    #[inline]
    pub fn peek(&self) -> Option<&Task> {
        self.heap.peek().map(|entry| &entry.task)
    }

    /// Get the number of queued tasks, cancelled ones included.
    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Check if the queue is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Remove every queued task.
    pub fn clear(&mut self) -> Vec<Task> {
        self.heap.drain().map(|entry| entry.task).collect()
    }
}

impl std::fmt::Debug for ReadyQueue {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ReadyQueue")
            .field("len", &self.heap.len())
            .finish()
    }
}
