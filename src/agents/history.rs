//! Bounded ledger of finished task results.
//!
//! # Invariants
//! - Never holds more than `capacity` results.
//! - When full, insertion evicts the entry with the oldest `completed_at`;
//!   equal timestamps evict the earliest inserted, so eviction order is
//!   deterministic.

use crate::task::{TaskId, TaskResult};

#[derive(Debug)]
pub struct TaskHistory {
    entries: Vec<TaskResult>,
    capacity: usize,
}

impl TaskHistory {
    /// Ledger holding at most `capacity` results (minimum one).
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Append one result, evicting as needed to stay within capacity.
    pub fn record(&mut self, result: TaskResult) {
        self.entries.push(result);
        while self.entries.len() > self.capacity {
            self.evict_oldest();
        }
    }

    fn evict_oldest(&mut self) {
        let mut oldest = 0;
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.completed_at() < self.entries[oldest].completed_at() {
                oldest = index;
            }
        }
        self.entries.remove(oldest);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently recorded result.
    pub fn latest(&self) -> Option<&TaskResult> {
        self.entries.last()
    }

    /// Most recent result for a specific task, if still retained.
    pub fn for_task(&self, task_id: TaskId) -> Option<&TaskResult> {
        self.entries.iter().rev().find(|r| r.task_id() == task_id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TaskResult> {
        self.entries.iter()
    }

    pub fn snapshot(&self) -> Vec<TaskResult> {
        self.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};

    fn result(output: &str) -> TaskResult {
        TaskResult::completed(TaskId::new(), output)
    }

    #[test]
    fn test_bound_is_enforced() {
        let mut history = TaskHistory::new(3);
        for i in 0..5 {
            history.record(result(&format!("result {i}")));
        }

        assert_eq!(history.len(), 3);
        let outputs: Vec<&str> = history.iter().map(|r| r.output()).collect();
        assert_eq!(outputs, vec!["result 2", "result 3", "result 4"]);
    }

    #[test]
    fn test_oldest_completed_at_evicted_first() {
        let now = Utc::now();
        let mut history = TaskHistory::new(2);

        // Inserted newest-first; eviction must follow timestamps, not
        // insertion order.
        history.record(result("newest").with_completed_at(now));
        history.record(result("oldest").with_completed_at(now - ChronoDuration::seconds(60)));
        history.record(result("middle").with_completed_at(now - ChronoDuration::seconds(30)));

        let outputs: Vec<&str> = history.iter().map(|r| r.output()).collect();
        assert!(outputs.contains(&"newest"));
        assert!(outputs.contains(&"middle"));
        assert!(!outputs.contains(&"oldest"));
    }

    #[test]
    fn test_timestamp_ties_evict_in_insertion_order() {
        let now = Utc::now();
        let mut history = TaskHistory::new(2);

        history.record(result("first").with_completed_at(now));
        history.record(result("second").with_completed_at(now));
        history.record(result("third").with_completed_at(now));

        let outputs: Vec<&str> = history.iter().map(|r| r.output()).collect();
        assert_eq!(outputs, vec!["second", "third"]);
    }

    #[test]
    fn test_lookup_by_task_id() {
        let mut history = TaskHistory::new(5);
        let kept = TaskId::new();
        history.record(TaskResult::completed(kept, "found"));
        history.record(result("other"));

        assert_eq!(history.for_task(kept).unwrap().output(), "found");
        assert!(history.for_task(TaskId::new()).is_none());
    }

    #[test]
    fn test_zero_capacity_is_clamped_to_one() {
        let mut history = TaskHistory::new(0);
        history.record(result("only"));
        history.record(result("replacement"));

        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().unwrap().output(), "replacement");
    }
}
