//! Job executor: a long-lived worker loop draining one queue.

use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::store::JobStore;
use super::types::{Job, JobOutcome, JobStatus, QueueName};

/// Job handler function type. Must be idempotent: delivery is at-least-once
/// and a crashed worker causes redelivery after the visibility timeout.
pub type JobHandler = Box<dyn Fn(&Job) -> JobOutcome + Send + Sync>;

/// Job executor configuration.
#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// How often to poll for new jobs.
    pub poll_interval: Duration,
    /// Name for logging.
    pub name: String,
    /// Requeue dead letters left over from a prior crash on startup.
    pub recover_dead_letters: bool,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "job-executor".to_string(),
            recover_dead_letters: true,
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn without_recovery(mut self) -> Self {
        self.recover_dead_letters = false;
        self
    }
}

/// Handle to control a running executor.
#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl JobExecutorHandle {
    /// Request graceful shutdown and wait for the loop to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    /// Get current executor statistics.
    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().unwrap().clone()
    }
}

/// Executor runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
    pub uptime_secs: u64,
}

/// Background job executor for a single queue.
///
/// Polls the store for deliverable jobs and runs the registered handler,
/// applying retry/backoff and dead-lettering per the job's policy.
pub struct JobExecutor<S: JobStore> {
    store: S,
    queue: QueueName,
    handler: JobHandler,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new<F>(store: S, queue: QueueName, handler: F) -> Self
    where
        F: Fn(&Job) -> JobOutcome + Send + Sync + 'static,
    {
        Self {
            store,
            queue,
            handler: Box::new(handler),
        }
    }

    /// Spawn the executor in a background thread.
    pub fn spawn(self, config: JobExecutorConfig) -> JobExecutorHandle
    where
        S: Send,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));
        let stats_clone = stats.clone();

        let name = config.name.clone();
        let join = thread::Builder::new()
            .name(name)
            .spawn(move || {
                executor_loop(self, config, shutdown_rx, stats_clone);
            })
            .expect("failed to spawn job executor thread");

        JobExecutorHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }

    /// Claim and execute at most one job (synchronous; used by tests and
    /// single-shot drains). Returns whether a job was processed.
    pub fn execute_one(&self) -> Result<bool, String> {
        let Some(mut job) = self
            .store
            .claim_next(self.queue)
            .map_err(|e| e.to_string())?
        else {
            return Ok(false);
        };
        self.run_claimed(&mut job);
        Ok(true)
    }

    /// Drain the queue until no deliverable job remains.
    pub fn drain(&self) -> Result<usize, String> {
        let mut n = 0;
        while self.execute_one()? {
            n += 1;
        }
        Ok(n)
    }

    fn run_claimed(&self, job: &mut Job) {
        let started = Utc::now();

        match (self.handler)(job) {
            JobOutcome::Success => {
                job.mark_completed(started);
                if let Err(e) = self.store.update(job) {
                    error!(job_id = %job.id, error = %e, "failed to persist job completion");
                }
                debug!(job_id = %job.id, queue = %job.queue.as_str(), "job completed");
            }
            JobOutcome::Retry(reason) => {
                job.mark_failed(reason.clone(), started);
                if let Err(e) = self.store.update(job) {
                    error!(job_id = %job.id, error = %e, "failed to persist job failure");
                }

                if matches!(job.status, JobStatus::DeadLettered { .. }) {
                    warn!(job_id = %job.id, error = %reason, "job dead-lettered after retries");
                    if let Err(e) = self.store.dead_letter(job.clone(), reason) {
                        error!(job_id = %job.id, error = %e, "failed to dead-letter job");
                    }
                } else {
                    debug!(
                        job_id = %job.id,
                        attempt = job.attempt,
                        error = %reason,
                        "job failed, will retry"
                    );
                }
            }
            JobOutcome::Fatal(reason) => {
                job.mark_dead(reason.clone(), started);
                if let Err(e) = self.store.update(job) {
                    error!(job_id = %job.id, error = %e, "failed to persist fatal job failure");
                }
                warn!(job_id = %job.id, error = %reason, "job failed fatally, dead-lettered");
                if let Err(e) = self.store.dead_letter(job.clone(), reason) {
                    error!(job_id = %job.id, error = %e, "failed to dead-letter job");
                }
            }
        }
    }
}

fn executor_loop<S: JobStore + 'static>(
    executor: JobExecutor<S>,
    config: JobExecutorConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<ExecutorStats>>,
) {
    info!(executor = %config.name, queue = %executor.queue.as_str(), "job executor started");
    let start_time = Instant::now();

    if config.recover_dead_letters {
        match executor.store.requeue_dead_letters(executor.queue) {
            Ok(0) => {}
            Ok(n) => info!(executor = %config.name, requeued = n, "requeued dead letters on startup"),
            Err(e) => error!(executor = %config.name, error = %e, "dead-letter recovery failed"),
        }
    }

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        {
            let mut s = stats.lock().unwrap();
            s.uptime_secs = start_time.elapsed().as_secs();
        }

        match executor.store.claim_next(executor.queue) {
            Ok(Some(mut job)) => {
                debug!(
                    executor = %config.name,
                    job_id = %job.id,
                    attempt = job.attempt,
                    "claimed job"
                );

                executor.run_claimed(&mut job);

                let mut s = stats.lock().unwrap();
                s.jobs_processed += 1;
                match &job.status {
                    JobStatus::Completed => s.jobs_succeeded += 1,
                    JobStatus::DeadLettered { .. } => {
                        s.jobs_failed += 1;
                        s.jobs_dead_lettered += 1;
                    }
                    _ => s.jobs_failed += 1,
                }
            }
            Ok(None) => {
                thread::sleep(config.poll_interval);
            }
            Err(e) => {
                error!(executor = %config.name, error = %e, "failed to claim job");
                thread::sleep(config.poll_interval);
            }
        }
    }

    info!(executor = %config.name, "job executor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::types::RetryPolicy;

    #[test]
    fn execute_successful_job() {
        let store = Arc::new(InMemoryJobStore::new());
        let executor =
            JobExecutor::new(store.clone(), QueueName::Notify, |_job| JobOutcome::Success);

        let job = Job::new(QueueName::Notify, serde_json::json!({}));
        let id = store.enqueue(job).unwrap();

        assert!(executor.execute_one().unwrap());
        let done = store.get(id).unwrap().unwrap();
        assert!(matches!(done.status, JobStatus::Completed));
    }

    #[test]
    fn retry_outcome_backs_off_then_dead_letters() {
        let store = Arc::new(InMemoryJobStore::new());
        let executor = JobExecutor::new(store.clone(), QueueName::Media, |_job| {
            JobOutcome::Retry("transient".to_string())
        });

        let job = Job::new(QueueName::Media, serde_json::json!({})).with_retry_policy(
            RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::ZERO,
                ..Default::default()
            },
        );
        store.enqueue(job).unwrap();

        // First attempt: failed, scheduled for retry.
        assert!(executor.execute_one().unwrap());
        // Second attempt: exhausted, dead-lettered.
        assert!(executor.execute_one().unwrap());

        let dls = store.list_dead_letters(QueueName::Media, 10).unwrap();
        assert_eq!(dls.len(), 1);
        assert_eq!(dls[0].reason, "transient");
    }

    #[test]
    fn fatal_outcome_dead_letters_on_first_attempt() {
        let store = Arc::new(InMemoryJobStore::new());
        let executor = JobExecutor::new(store.clone(), QueueName::Media, |_job| {
            JobOutcome::Fatal("source file missing".to_string())
        });

        store
            .enqueue(Job::new(QueueName::Media, serde_json::json!({})))
            .unwrap();

        assert!(executor.execute_one().unwrap());

        let dls = store.list_dead_letters(QueueName::Media, 10).unwrap();
        assert_eq!(dls.len(), 1);
        assert_eq!(dls[0].job.attempt, 1);
    }

    #[test]
    fn drain_processes_everything_deliverable() {
        let store = Arc::new(InMemoryJobStore::new());
        let executor =
            JobExecutor::new(store.clone(), QueueName::Notify, |_job| JobOutcome::Success);

        for _ in 0..4 {
            store
                .enqueue(Job::new(QueueName::Notify, serde_json::json!({})))
                .unwrap();
        }
        // Delayed job stays invisible.
        store
            .enqueue(
                Job::new(QueueName::Notify, serde_json::json!({}))
                    .delayed(Duration::from_secs(60)),
            )
            .unwrap();

        assert_eq!(executor.drain().unwrap(), 4);
        assert_eq!(store.stats(QueueName::Notify).unwrap().pending, 1);
    }

    #[test]
    fn spawned_executor_processes_and_shuts_down() {
        let store = Arc::new(InMemoryJobStore::new());
        store
            .enqueue(Job::new(QueueName::Notify, serde_json::json!({})))
            .unwrap();

        let executor =
            JobExecutor::new(store.clone(), QueueName::Notify, |_job| JobOutcome::Success);
        let handle = executor.spawn(
            JobExecutorConfig::default()
                .with_name("notify-test")
                .without_recovery(),
        );

        // Wait for the job to drain.
        let deadline = Instant::now() + Duration::from_secs(5);
        while store.stats(QueueName::Notify).unwrap().completed == 0 {
            assert!(Instant::now() < deadline, "executor never ran the job");
            thread::sleep(Duration::from_millis(10));
        }

        let stats = handle.stats();
        assert_eq!(stats.jobs_succeeded, 1);
        handle.shutdown();
    }
}
