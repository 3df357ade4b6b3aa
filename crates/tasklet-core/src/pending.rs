use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::trace;

use crate::task::TaskId;

/// Completions waiting to be committed, at most one per task. Time is
/// supplied by the caller so the registry works with any clock.
#[derive(Debug, Clone)]
pub struct PendingCommits {
    delay: Duration,
    deadlines: HashMap<TaskId, DateTime<Utc>>,
}

impl PendingCommits {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadlines: HashMap::new(),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedules a commit for `id` at `now + delay`, replacing any earlier
    /// entry for the same task. Returns the deadline.
    pub fn schedule(&mut self, id: TaskId, now: DateTime<Utc>) -> DateTime<Utc> {
        let deadline = now + self.delay;
        trace!(%id, %deadline, "scheduling deferred commit");
        self.deadlines.insert(id, deadline);
        deadline
    }

    pub fn cancel(&mut self, id: &TaskId) -> bool {
        let removed = self.deadlines.remove(id).is_some();
        if removed {
            trace!(%id, "cancelled deferred commit");
        }
        removed
    }

    pub fn is_pending(&self, id: &TaskId) -> bool {
        self.deadlines.contains_key(id)
    }

    /// Removes and returns every entry whose deadline is at or before `now`,
    /// ordered by deadline then id.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<TaskId> {
        let mut due: Vec<(DateTime<Utc>, TaskId)> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, deadline)| (*deadline, id.clone()))
            .collect();
        due.sort();

        for (_, id) in &due {
            self.deadlines.remove(id);
        }
        due.into_iter().map(|(_, id)| id).collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = &TaskId> {
        self.deadlines.keys()
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.deadlines.values().min().copied()
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}
