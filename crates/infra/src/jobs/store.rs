//! Job storage implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::Utc;

use super::types::{DeadLetterEntry, Job, JobId, JobStatus, QueueName};

/// Job store abstraction: the durable broker behind the three queues.
pub trait JobStore: Send + Sync {
    /// Enqueue a new job.
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    /// Get a job by ID.
    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    /// Update a job.
    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Claim the next deliverable job on a queue, marking it running.
    ///
    /// Deliverable means pending/failed and past its schedule, or running
    /// with an expired visibility timeout (crashed-worker redelivery).
    fn claim_next(&self, queue: QueueName) -> Result<Option<Job>, JobStoreError>;

    /// List jobs on a queue filtered by status discriminant.
    fn list_by_status(
        &self,
        queue: QueueName,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError>;

    /// Move a job to the dead-letter set.
    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError>;

    /// List dead-lettered jobs on a queue.
    fn list_dead_letters(
        &self,
        queue: QueueName,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Move one dead-lettered job back to pending.
    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError>;

    /// Delete a dead-lettered job.
    fn delete_dead_letter(&self, job_id: JobId) -> Result<(), JobStoreError>;

    /// Requeue every dead letter on a queue (worker startup recovery after
    /// a prior crash). Returns how many jobs were requeued.
    fn requeue_dead_letters(&self, queue: QueueName) -> Result<usize, JobStoreError>;

    /// Get queue statistics.
    fn stats(&self, queue: QueueName) -> Result<JobStats, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Queue statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

/// In-memory job store.
///
/// FIFO within a queue by `created_at`. Jobs stuck in `Running` beyond the
/// visibility timeout are redelivered by `claim_next`.
#[derive(Debug)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    dead_letters: RwLock<HashMap<JobId, DeadLetterEntry>>,
    visibility_timeout: Duration,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::with_visibility_timeout(Duration::from_secs(30))
    }

    pub fn with_visibility_timeout(visibility_timeout: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            dead_letters: RwLock::new(HashMap::new()),
            visibility_timeout,
        }
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn claimable(&self, job: &Job, queue: QueueName) -> bool {
        if job.queue != queue {
            return false;
        }
        match &job.status {
            JobStatus::Pending | JobStatus::Failed { .. } => job.is_ready(),
            JobStatus::Running => match job.claimed_at {
                // Visibility timeout expired: the claiming worker is
                // presumed dead and the job is redelivered.
                Some(claimed) => {
                    let timeout =
                        chrono::Duration::from_std(self.visibility_timeout).unwrap_or_default();
                    Utc::now() - claimed >= timeout
                }
                None => false,
            },
            _ => false,
        }
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap();
        Ok(jobs.get(&job_id).cloned())
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        if !jobs.contains_key(&job.id) {
            return Err(JobStoreError::NotFound(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    fn claim_next(&self, queue: QueueName) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();

        // Oldest deliverable job first (FIFO within the queue).
        let mut candidates: Vec<_> = jobs
            .values()
            .filter(|j| self.claimable(j, queue))
            .collect();
        candidates.sort_by_key(|j| j.created_at);

        if let Some(job) = candidates.first() {
            let job_id = job.id;
            if let Some(job) = jobs.get_mut(&job_id) {
                job.mark_running();
                return Ok(Some(job.clone()));
            }
        }

        Ok(None)
    }

    fn list_by_status(
        &self,
        queue: QueueName,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().unwrap();
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| {
                j.queue == queue
                    && status.as_ref().map_or(true, |s| {
                        std::mem::discriminant(&j.status) == std::mem::discriminant(s)
                    })
            })
            .cloned()
            .collect();

        result.sort_by_key(|j| j.created_at);
        result.truncate(limit);
        Ok(result)
    }

    fn dead_letter(&self, mut job: Job, reason: String) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        let mut dls = self.dead_letters.write().unwrap();

        job.status = JobStatus::DeadLettered {
            error: reason.clone(),
            attempts: job.attempt,
        };
        job.updated_at = Utc::now();

        jobs.remove(&job.id);
        dls.insert(job.id, DeadLetterEntry::new(job, reason));

        Ok(())
    }

    fn list_dead_letters(
        &self,
        queue: QueueName,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let dls = self.dead_letters.read().unwrap();
        let mut result: Vec<_> = dls
            .values()
            .filter(|e| e.job.queue == queue)
            .cloned()
            .collect();

        result.sort_by_key(|e| e.dead_lettered_at);
        result.truncate(limit);
        Ok(result)
    }

    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.write().unwrap();
        let mut dls = self.dead_letters.write().unwrap();

        let entry = dls.remove(&job_id).ok_or(JobStoreError::NotFound(job_id))?;

        let mut job = entry.job;
        job.status = JobStatus::Pending;
        job.attempt = 0;
        job.scheduled_at = None;
        job.claimed_at = None;
        job.updated_at = Utc::now();
        job.history.clear();

        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn delete_dead_letter(&self, job_id: JobId) -> Result<(), JobStoreError> {
        let mut dls = self.dead_letters.write().unwrap();
        dls.remove(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        Ok(())
    }

    fn requeue_dead_letters(&self, queue: QueueName) -> Result<usize, JobStoreError> {
        let ids: Vec<JobId> = {
            let dls = self.dead_letters.read().unwrap();
            dls.values()
                .filter(|e| e.job.queue == queue)
                .map(|e| e.job.id)
                .collect()
        };

        for id in &ids {
            self.retry_dead_letter(*id)?;
        }
        Ok(ids.len())
    }

    fn stats(&self, queue: QueueName) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs.read().unwrap();
        let dls = self.dead_letters.read().unwrap();

        let mut stats = JobStats::default();

        for job in jobs.values() {
            if job.queue != queue {
                continue;
            }
            match &job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
                JobStatus::DeadLettered { .. } => stats.dead_lettered += 1,
            }
        }

        stats.dead_lettered += dls.values().filter(|e| e.job.queue == queue).count();

        Ok(stats)
    }
}

impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self, queue: QueueName) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next(queue)
    }

    fn list_by_status(
        &self,
        queue: QueueName,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_by_status(queue, status, limit)
    }

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        (**self).dead_letter(job, reason)
    }

    fn list_dead_letters(
        &self,
        queue: QueueName,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        (**self).list_dead_letters(queue, limit)
    }

    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        (**self).retry_dead_letter(job_id)
    }

    fn delete_dead_letter(&self, job_id: JobId) -> Result<(), JobStoreError> {
        (**self).delete_dead_letter(job_id)
    }

    fn requeue_dead_letters(&self, queue: QueueName) -> Result<usize, JobStoreError> {
        (**self).requeue_dead_letters(queue)
    }

    fn stats(&self, queue: QueueName) -> Result<JobStats, JobStoreError> {
        (**self).stats(queue)
    }
}
