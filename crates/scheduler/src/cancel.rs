//! Cooperative cancellation
//!
//! Nothing in the scheduler preempts a running job. A job that may be
//! abandoned (its list item unmounted, its viewer session superseded) holds a
//! [`CancellationToken`] and checks it before each commit; late results are
//! detected and dropped rather than aborted mid-flight.

use crate::{lock, JobId};
use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

/// Shared liveness flag for one unit of work.
///
/// Clones observe the same state.
///
/// ```
/// use scorebook_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let worker_token = token.clone();
///
/// token.cancel();
/// assert!(worker_token.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a live token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the work as abandoned. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Inverse of [`is_cancelled`](Self::is_cancelled), reads better at commit sites.
    pub fn is_live(&self) -> bool {
        !self.is_cancelled()
    }
}

/// Tokens of queued and running jobs, by job id.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    tokens: Mutex<HashMap<JobId, CancellationToken>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `token` for `job_id`, replacing any previous entry.
    pub fn register(&self, job_id: JobId, token: CancellationToken) {
        lock(&self.tokens).insert(job_id, token);
    }

    /// Cancel the job's token. Returns `false` if the job is unknown.
    pub fn cancel(&self, job_id: JobId) -> bool {
        match lock(&self.tokens).get(&job_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every registered token. Returns how many were cancelled.
    pub fn cancel_all(&self) -> usize {
        let tokens = lock(&self.tokens);
        for token in tokens.values() {
            token.cancel();
        }
        tokens.len()
    }

    /// Forget a job once it completed or left the queue.
    pub fn unregister(&self, job_id: JobId) -> bool {
        lock(&self.tokens).remove(&job_id).is_some()
    }

    pub fn get(&self, job_id: JobId) -> Option<CancellationToken> {
        lock(&self.tokens).get(&job_id).cloned()
    }

    pub fn len(&self) -> usize {
        lock(&self.tokens).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.tokens).is_empty()
    }
}
