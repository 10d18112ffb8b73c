//! Job scheduler
//!
//! Every suspension point of the viewer core (document load, render, encode,
//! fetch, save) runs as a job here. Jobs are drained either by a
//! [`WorkerPool`](crate::WorkerPool) or by the host event loop through
//! [`JobScheduler::run_until_idle`]; the guarantees are the same.

use crate::cancel::{CancellationRegistry, CancellationToken};
use crate::priority::{Job, JobId, JobInfo, JobKind, JobPriority, PriorityQueue};
use crate::lock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;
use std::time::Duration;

/// Job scheduler statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub jobs_submitted: u64,
    pub jobs_completed: u64,
    pub jobs_cancelled: u64,
    /// Jobs whose task panicked; counted as completed too.
    pub jobs_panicked: u64,
    pub queue_size: usize,
}

impl SchedulerStats {
    pub fn pending_jobs(&self) -> u64 {
        self.jobs_submitted.saturating_sub(self.jobs_completed + self.jobs_cancelled)
    }
}

/// Thread-safe job scheduler with cooperative cancellation.
///
/// ```
/// use scorebook_scheduler::{JobKind, JobPriority, JobScheduler};
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
///
/// let scheduler = JobScheduler::new();
/// let ran = Arc::new(AtomicBool::new(false));
/// let flag = ran.clone();
///
/// let kind = JobKind::LoadDocument { generation: 1 };
/// scheduler.submit(JobPriority::Interactive, kind, move |token| {
///     if token.is_live() {
///         flag.store(true, Ordering::SeqCst);
///     }
/// });
///
/// assert_eq!(scheduler.run_until_idle(), 1);
/// assert!(ran.load(Ordering::SeqCst));
/// ```
pub struct JobScheduler {
    queue: PriorityQueue,
    stats: Mutex<SchedulerStats>,
    cancellation: CancellationRegistry,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self {
            queue: PriorityQueue::new(),
            stats: Mutex::new(SchedulerStats::default()),
            cancellation: CancellationRegistry::new(),
        }
    }

    /// Submit a task with a fresh cancellation token.
    pub fn submit<F>(
        &self,
        priority: JobPriority,
        kind: JobKind,
        task: F,
    ) -> (JobId, CancellationToken)
    where
        F: FnOnce(&CancellationToken) + Send + 'static,
    {
        let token = CancellationToken::new();
        let job_id = self.submit_with_token(priority, kind, token.clone(), task);
        (job_id, token)
    }

    /// Submit a task bound to a token owned by the caller.
    ///
    /// Several jobs may share one token, e.g. every job of one viewer session.
    pub fn submit_with_token<F>(
        &self,
        priority: JobPriority,
        kind: JobKind,
        token: CancellationToken,
        task: F,
    ) -> JobId
    where
        F: FnOnce(&CancellationToken) + Send + 'static,
    {
        lock(&self.stats).jobs_submitted += 1;

        let registered = token.clone();
        let job_id = self.queue.push_with(priority, kind.clone(), token, Box::new(task), |id| {
            self.cancellation.register(id, registered);
        });
        tracing::trace!(job_id, ?kind, ?priority, "job submitted");
        job_id
    }

    /// Take the next job off the queue without running it.
    pub fn next_job(&self) -> Option<Job> {
        self.queue.pop()
    }

    /// Like [`next_job`](Self::next_job) but waits up to `timeout`.
    pub fn next_job_timeout(&self, timeout: Duration) -> Option<Job> {
        self.queue.pop_timeout(timeout)
    }

    /// Run a job taken from this scheduler on the current thread.
    ///
    /// Jobs cancelled before they start are skipped. A panicking task is
    /// contained and logged; it never unwinds into the caller.
    pub fn execute(&self, job: Job) {
        let job_id = job.id;
        if job.token().is_live() {
            let kind = job.kind.clone();
            if catch_unwind(AssertUnwindSafe(|| job.run())).is_err() {
                tracing::error!(job_id, ?kind, "job panicked");
                lock(&self.stats).jobs_panicked += 1;
            }
        } else {
            tracing::debug!(job_id, "skipping job cancelled before start");
        }

        self.complete_job(job_id);
    }

    /// Run queued jobs on the calling thread until the queue is empty.
    ///
    /// Returns the number of jobs taken off the queue.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while let Some(job) = self.next_job() {
            self.execute(job);
            ran += 1;
        }
        ran
    }

    /// Mark a job as finished and forget its token.
    pub fn complete_job(&self, job_id: JobId) {
        lock(&self.stats).jobs_completed += 1;
        self.cancellation.unregister(job_id);
    }

    /// Cancel one job.
    ///
    /// Queued jobs are removed outright; a running job only has its token
    /// cancelled and must notice cooperatively. Returns `true` if the job was
    /// known.
    pub fn cancel_job(&self, job_id: JobId) -> bool {
        let token_cancelled = self.cancellation.cancel(job_id);
        let removed = self.queue.remove_if(|job| job.id == job_id);

        if removed.is_empty() {
            return token_cancelled;
        }

        lock(&self.stats).jobs_cancelled += removed.len() as u64;
        self.cancellation.unregister(job_id);
        true
    }

    /// Cancel every queued job whose kind matches `predicate`.
    ///
    /// Returns the number of jobs removed from the queue.
    pub fn cancel_jobs_if<F>(&self, predicate: F) -> usize
    where
        F: Fn(&JobKind) -> bool,
    {
        let removed = self.queue.remove_if(|job| predicate(&job.kind));

        for job in &removed {
            self.cancellation.cancel(job.id);
            self.cancellation.unregister(job.id);
        }

        if !removed.is_empty() {
            lock(&self.stats).jobs_cancelled += removed.len() as u64;
        }
        removed.len()
    }

    /// Cancel everything queued or running.
    pub fn clear(&self) {
        self.cancellation.cancel_all();
        self.cancel_jobs_if(|_| true);
    }

    /// Stop handing out jobs to waiting workers.
    pub fn close(&self) {
        self.queue.close();
    }

    pub fn pending_jobs(&self) -> usize {
        self.queue.len()
    }

    pub fn has_pending_jobs(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn pending_jobs_list(&self) -> Vec<JobInfo> {
        self.queue.jobs()
    }

    pub fn get_cancellation_token(&self, job_id: JobId) -> Option<CancellationToken> {
        self.cancellation.get(job_id)
    }

    pub fn stats(&self) -> SchedulerStats {
        let mut stats = lock(&self.stats).clone();
        stats.queue_size = self.queue.len();
        stats
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}
