//! Background worker pool.
//!
//! Workers pull jobs from a shared [`JobScheduler`] and run them on their own
//! threads. A host that prefers to drive work from its event loop can skip the
//! pool entirely and call [`JobScheduler::run_until_idle`].

use crate::JobScheduler;
use std::io;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads to spawn.
    /// Default: number of logical CPU cores, capped at 4.
    pub num_workers: usize,

    /// Maximum time a worker waits for a job before checking shutdown.
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::new(default_workers())
    }
}

impl WorkerPoolConfig {
    pub fn new(num_workers: usize) -> Self {
        Self { num_workers: num_workers.max(1), poll_interval: Duration::from_millis(100) }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Threads draining a [`JobScheduler`].
///
/// ```
/// use scorebook_scheduler::{JobKind, JobPriority, JobScheduler, WorkerPool, WorkerPoolConfig};
/// use std::sync::mpsc;
/// use std::sync::Arc;
///
/// let scheduler = Arc::new(JobScheduler::new());
/// let pool = WorkerPool::new(scheduler.clone(), WorkerPoolConfig::new(1)).unwrap();
///
/// let (tx, rx) = mpsc::channel();
/// scheduler.submit(JobPriority::Interactive, JobKind::LoadDocument { generation: 1 }, move |_| {
///     tx.send(42).unwrap();
/// });
///
/// assert_eq!(rx.recv().unwrap(), 42);
/// pool.shutdown();
/// ```
pub struct WorkerPool {
    workers: Vec<Worker>,
    scheduler: Arc<JobScheduler>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Spawn `config.num_workers` threads pulling from `scheduler`.
    pub fn new(scheduler: Arc<JobScheduler>, config: WorkerPoolConfig) -> io::Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut workers = Vec::with_capacity(config.num_workers);

        for id in 0..config.num_workers {
            let worker =
                Worker::spawn(id, scheduler.clone(), shutdown.clone(), config.poll_interval)?;
            workers.push(worker);
        }

        tracing::debug!(workers = workers.len(), "worker pool started");
        Ok(Self { workers, scheduler, shutdown })
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stop the workers and wait for their current jobs to finish.
    ///
    /// Jobs still queued stay in the scheduler.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.scheduler.close();

        for worker in self.workers.drain(..) {
            worker.join();
        }
        tracing::debug!("worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    id: usize,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(
        id: usize,
        scheduler: Arc<JobScheduler>,
        shutdown: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> io::Result<Self> {
        let thread = thread::Builder::new()
            .name(format!("scorebook-worker-{id}"))
            .spawn(move || Self::run(&scheduler, &shutdown, poll_interval))?;

        Ok(Self { id, thread: Some(thread) })
    }

    fn run(scheduler: &JobScheduler, shutdown: &AtomicBool, poll_interval: Duration) {
        while !shutdown.load(Ordering::Acquire) {
            if let Some(job) = scheduler.next_job_timeout(poll_interval) {
                scheduler.execute(job);
            }
        }
    }

    fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!(worker = self.id, "worker thread panicked");
            }
        }
    }
}

fn default_workers() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(2).min(4)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CancellationToken, JobKind, JobPriority};
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    fn load(generation: u64) -> JobKind {
        JobKind::LoadDocument { generation }
    }

    #[test]
    fn config_defaults() {
        let config = WorkerPoolConfig::default();
        assert!((1..=4).contains(&config.num_workers));
        assert_eq!(config.poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn config_never_spawns_zero_workers() {
        let config = WorkerPoolConfig::new(0).with_poll_interval(Duration::from_millis(5));
        assert_eq!(config.num_workers, 1);
        assert_eq!(config.poll_interval, Duration::from_millis(5));
    }

    #[test]
    fn pool_executes_jobs() {
        let scheduler = Arc::new(JobScheduler::new());
        let pool = WorkerPool::new(scheduler.clone(), WorkerPoolConfig::new(2)).unwrap();
        assert_eq!(pool.num_workers(), 2);

        let (tx, rx) = mpsc::channel();
        for generation in 0..5 {
            let tx = tx.clone();
            scheduler.submit(JobPriority::Interactive, load(generation), move |_| {
                tx.send(generation).unwrap();
            });
        }
        drop(tx);

        let mut seen: Vec<u64> = rx.iter().take(5).collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);

        pool.shutdown();
    }

    #[test]
    fn running_job_observes_cancellation() {
        let scheduler = Arc::new(JobScheduler::new());
        let pool = WorkerPool::new(scheduler.clone(), WorkerPoolConfig::new(1)).unwrap();

        let (started_tx, started_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let token = CancellationToken::new();

        scheduler.submit_with_token(JobPriority::Interactive, load(1), token.clone(), move |t| {
            started_tx.send(()).unwrap();
            while t.is_live() {
                thread::sleep(Duration::from_millis(2));
            }
            done_tx.send(()).unwrap();
        });

        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        token.cancel();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        pool.shutdown();
    }

    #[test]
    fn drop_stops_workers() {
        let scheduler = Arc::new(JobScheduler::new());
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let _pool = WorkerPool::new(
                scheduler.clone(),
                WorkerPoolConfig::new(2).with_poll_interval(Duration::from_millis(5)),
            )
            .unwrap();
        }

        let c = counter.clone();
        scheduler.submit(JobPriority::Interactive, load(1), move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(30));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending_jobs(), 1);
    }
}
