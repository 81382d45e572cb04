//! One-shot deferred tasks fired from the simulation tick.
//!
//! Tasks carry ids, never references. Whoever executes a task must look the
//! ids up again and skip the task if they no longer resolve. There is no
//! explicit cancellation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use worldsync_types::RefId;

/// Which trigger-volume notification a [`TimerTask::TriggerEvent`] delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerTransition {
    /// The reference entered the volume.
    Enter,
    /// The reference left the volume.
    Leave,
}

/// Work scheduled for a later tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTask {
    /// Reset a harvested or opened reference.
    Reloot(RefId),
    /// Propagate an activation from `parent` to `child`.
    ActivateChild {
        /// The reference to activate.
        child: RefId,
        /// The reference that was activated first.
        parent: RefId,
    },
    /// Notify a trigger volume owner of an overlap change.
    TriggerEvent {
        /// Owner of the trigger volume.
        volume: RefId,
        /// The reference that crossed the boundary.
        other: RefId,
        /// Direction of the crossing.
        transition: TriggerTransition,
    },
}

/// Deadline-ordered queue of [`TimerTask`]s.
///
/// Tasks with the same deadline fire in scheduling order.
#[derive(Debug, Clone, Default)]
pub struct TimerQueue {
    entries: BTreeMap<(DateTime<Utc>, u64), TimerTask>,
    next_seq: u64,
}

impl TimerQueue {
    /// An empty queue.
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Schedule `task` to fire at or after `deadline`.
    pub fn schedule(&mut self, deadline: DateTime<Utc>, task: TimerTask) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.entries.insert((deadline, seq), task);
    }

    /// Remove and return every task whose deadline is not after `now`.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Vec<TimerTask> {
        let mut due = Vec::new();
        while let Some(entry) = self.entries.first_entry() {
            if entry.key().0 > now {
                break;
            }
            due.push(entry.remove());
        }
        due
    }

    /// Tasks currently waiting.
    pub fn iter(&self) -> impl Iterator<Item = (DateTime<Utc>, &TimerTask)> {
        self.entries.iter().map(|((at, _), task)| (*at, task))
    }

    /// Number of waiting tasks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no tasks are waiting.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn fires_in_deadline_then_schedule_order() {
        let mut q = TimerQueue::new();
        q.schedule(at(20), TimerTask::Reloot(RefId::new(3)));
        q.schedule(at(10), TimerTask::Reloot(RefId::new(1)));
        q.schedule(at(10), TimerTask::Reloot(RefId::new(2)));

        assert!(q.pop_due(at(9)).is_empty());
        assert_eq!(
            q.pop_due(at(15)),
            vec![
                TimerTask::Reloot(RefId::new(1)),
                TimerTask::Reloot(RefId::new(2)),
            ]
        );
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop_due(at(20)), vec![TimerTask::Reloot(RefId::new(3))]);
        assert!(q.is_empty());
    }
}
