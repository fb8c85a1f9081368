//! In-process job store.

use crate::error::StoreError;
use crate::job::{JobCounts, JobState, QueuedJob};
use crate::store::{JobStore, inclusive_len};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nodeflow_core::JobId;
use std::cmp::Reverse;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// A [`JobStore`] held in memory.
///
/// Jobs do not survive the process; use it for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<JobId, QueuedJob>>,
}

impl MemoryJobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &QueuedJob) -> Result<(), StoreError> {
        self.jobs.lock().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: JobId) -> Result<Option<QueuedJob>, StoreError> {
        Ok(self.jobs.lock().await.get(&id).cloned())
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<QueuedJob>, StoreError> {
        let mut jobs = self.jobs.lock().await;
        let Some(next) = jobs
            .values_mut()
            .filter(|job| job.is_due(now))
            .min_by_key(|job| job.claim_key())
        else {
            return Ok(None);
        };
        next.begin_attempt(now);
        Ok(Some(next.clone()))
    }

    async fn replace(&self, job: &QueuedJob, expected: JobState) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(&job.id) {
            Some(stored) if stored.state == expected => {
                *stored = job.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_progress(&self, id: JobId, progress: u8) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(&id) {
            Some(job) if job.state == JobState::Active => {
                job.progress = progress;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list(
        &self,
        state: JobState,
        start: usize,
        end: usize,
    ) -> Result<Vec<QueuedJob>, StoreError> {
        let jobs = self.jobs.lock().await;
        let mut matching: Vec<&QueuedJob> = jobs.values().filter(|job| job.state == state).collect();
        if state.is_finished() {
            matching.sort_by_key(|job| Reverse((job.finished_at, job.id)));
        } else {
            matching.sort_by_key(|job| (job.enqueued_at, job.id));
        }
        Ok(matching
            .into_iter()
            .skip(start)
            .take(inclusive_len(start, end))
            .cloned()
            .collect())
    }

    async fn counts(&self) -> Result<JobCounts, StoreError> {
        let jobs = self.jobs.lock().await;
        let mut counts = JobCounts::default();
        for job in jobs.values() {
            counts.add(job.state, 1);
        }
        Ok(counts)
    }

    async fn delete(&self, id: JobId) -> Result<bool, StoreError> {
        Ok(self.jobs.lock().await.remove(&id).is_some())
    }

    async fn delete_finished_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<JobId>, StoreError> {
        let mut jobs = self.jobs.lock().await;
        let expired: Vec<JobId> = jobs
            .values()
            .filter(|job| job.state.is_finished())
            .filter(|job| job.finished_at.is_some_and(|finished| finished < cutoff))
            .map(|job| job.id)
            .collect();
        for id in &expired {
            jobs.remove(id);
        }
        Ok(expired)
    }

    async fn recover_active(&self, now: DateTime<Utc>) -> Result<Vec<QueuedJob>, StoreError> {
        let mut jobs = self.jobs.lock().await;
        let mut recovered = Vec::new();
        for job in jobs.values_mut().filter(|job| job.state == JobState::Active) {
            job.recover_interrupted(now);
            recovered.push(job.clone());
        }
        Ok(recovered)
    }
}
