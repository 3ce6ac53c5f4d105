//! In-memory per-type job queues with priority ordering.

use std::collections::HashMap;

use crate::core::{Job, JobId, Priority};

/// One pending queue per job type.
///
/// Each queue is kept sorted by priority descending. The sort is stable, so
/// jobs of equal priority stay in insertion order. Types are scanned in the
/// order they were first seen, which is the tie-break order for dispatch.
#[derive(Debug, Default)]
pub struct TypeQueues {
    /// Job types in first-seen order.
    order: Vec<String>,
    queues: HashMap<String, Vec<Job>>,
}

impl TypeQueues {
    /// Create an empty set of queues.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job to its type's queue and re-sort that queue.
    pub fn push(&mut self, job: Job) {
        if !self.queues.contains_key(&job.job_type) {
            self.order.push(job.job_type.clone());
        }
        let queue = self.queues.entry(job.job_type.clone()).or_default();
        queue.push(job);
        queue.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Highest-priority job of a type without removing it.
    pub fn head(&self, job_type: &str) -> Option<&Job> {
        self.queues.get(job_type).and_then(|q| q.first())
    }

    /// Remove and return the head of a type's queue.
    pub fn pop_head(&mut self, job_type: &str) -> Option<Job> {
        let queue = self.queues.get_mut(job_type)?;
        if queue.is_empty() {
            None
        } else {
            Some(queue.remove(0))
        }
    }

    /// Pick the type whose head should be dispatched next.
    ///
    /// A type is eligible when its queue is non-empty and `is_blocked` returns
    /// false for it. Among eligible heads the strictly greatest priority wins;
    /// ties keep the first type in scan order.
    pub fn select_next<F>(&self, is_blocked: F) -> Option<&str>
    where
        F: Fn(&str) -> bool,
    {
        let mut best: Option<(&str, Priority)> = None;
        for job_type in &self.order {
            if is_blocked(job_type) {
                continue;
            }
            let Some(head) = self.head(job_type) else {
                continue;
            };
            match best {
                Some((_, priority)) if head.priority <= priority => {}
                _ => best = Some((job_type.as_str(), head.priority)),
            }
        }
        best.map(|(job_type, _)| job_type)
    }

    /// Find a pending job by id.
    pub fn find(&self, id: &JobId) -> Option<&Job> {
        self.order
            .iter()
            .filter_map(|t| self.queues.get(t))
            .flat_map(|q| q.iter())
            .find(|job| &job.id == id)
    }

    /// Pending count for each type, in scan order (empty queues included).
    pub fn depths(&self) -> Vec<(String, usize)> {
        self.order
            .iter()
            .map(|t| (t.clone(), self.queues.get(t).map_or(0, Vec::len)))
            .collect()
    }

    /// Remove every pending job and return how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.len();
        for queue in self.queues.values_mut() {
            queue.clear();
        }
        removed
    }

    /// Total pending jobs across all types.
    pub fn len(&self) -> usize {
        self.queues.values().map(Vec::len).sum()
    }

    /// Whether no job is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
