//! Scorebook scheduler
//!
//! Priority job queue, cooperative cancellation and a worker pool.
//!
//! Viewer work (loading the open document, saving a download) is queued at
//! [`JobPriority::Interactive`] and always runs before list thumbnails. Every
//! job carries a [`CancellationToken`]; abandoned work keeps running to its
//! next check and then drops its result.
//!
//! # Example
//!
//! ```
//! use scorebook_scheduler::{JobKind, JobPriority, JobScheduler};
//!
//! let scheduler = JobScheduler::new();
//!
//! let (job_id, token) = scheduler.submit(
//!     JobPriority::Thumbnail,
//!     JobKind::GenerateThumbnail { item_id: "score-1".into(), generation: 1 },
//!     |token| {
//!         if token.is_cancelled() {
//!             return;
//!         }
//!         // ... render and encode ...
//!     },
//! );
//!
//! // The list item unmounted before the worker got to it.
//! scheduler.cancel_job(job_id);
//! assert!(token.is_cancelled());
//! assert_eq!(scheduler.run_until_idle(), 0);
//! ```

mod cancel;
mod priority;
mod scheduler;
mod worker;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use cancel::{CancellationRegistry, CancellationToken};
pub use priority::{Job, JobId, JobInfo, JobKind, JobPriority, JobTask, PriorityQueue};
pub use scheduler::{JobScheduler, SchedulerStats};
pub use worker::{WorkerPool, WorkerPoolConfig};

/// A panicking job must not wedge the queue for everyone else.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
