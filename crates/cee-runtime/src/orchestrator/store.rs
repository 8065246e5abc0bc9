//! Job snapshot storage.

use cee_core::JobId;
use dashmap::DashMap;

use crate::orchestrator::job::Job;

/// Where job snapshots are kept for status queries.
pub trait JobStore: Send + Sync {
    /// Insert or overwrite the snapshot for `job.id`.
    fn put(&self, job: Job);

    /// Latest snapshot for `id`.
    fn get(&self, id: &JobId) -> Option<Job>;

    /// Number of jobs held.
    fn len(&self) -> usize;

    /// Whether the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Sharded in-memory store.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<JobId, Job>,
}

impl InMemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All snapshots (unordered).
    pub fn all(&self) -> Vec<Job> {
        self.jobs.iter().map(|e| e.value().clone()).collect()
    }
}

impl JobStore for InMemoryJobStore {
    fn put(&self, job: Job) {
        let _ = self.jobs.insert(job.id.clone(), job);
    }

    fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.get(id).map(|e| e.value().clone())
    }

    fn len(&self) -> usize {
        self.jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::job::JobState;
    use cee_core::{Mode, RequestId};
    use serde_json::json;

    #[test]
    fn put_overwrites_snapshot() {
        let store = InMemoryJobStore::new();
        let mut job = Job::new(RequestId::generate(), Mode::GovernanceCheck, "u", json!({}));
        store.put(job.clone());
        job.transition(JobState::Queued).unwrap();
        store.put(job.clone());
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&job.id).unwrap().state, JobState::Queued);
        assert!(store.get(&JobId::generate()).is_none());
        assert_eq!(store.all().len(), 1);
    }
}
