//! Priority ordering for scheduled jobs
//!
//! Interactive viewer work (document loads, downloads) runs before thumbnail
//! previews; jobs of equal priority run in submission order.

use crate::{lock, CancellationToken};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Job priority levels. Higher values run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobPriority {
    /// List previews; nothing waits on them.
    Thumbnail = 0,

    /// Work the open viewer is waiting for.
    Interactive = 1,
}

/// Unique job identifier
pub type JobId = u64;

/// What a job is doing, for inspection and selective cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobKind {
    /// Load a document for the viewer session with this generation.
    LoadDocument { generation: u64 },

    /// Render the preview of a library item.
    GenerateThumbnail { item_id: String, generation: u64 },

    /// Save the open document for the viewer session with this generation.
    Download { generation: u64 },
}

/// Work to run; receives the job's token so it can stop committing when abandoned.
pub type JobTask = Box<dyn FnOnce(&CancellationToken) + Send + 'static>;

/// A queued unit of work
pub struct Job {
    pub id: JobId,
    pub priority: JobPriority,
    pub kind: JobKind,
    insertion_order: u64,
    token: CancellationToken,
    task: JobTask,
}

impl Job {
    /// Execute the job's task with its own token.
    pub fn run(self) {
        (self.task)(&self.token)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn info(&self) -> JobInfo {
        JobInfo { id: self.id, priority: self.priority, kind: self.kind.clone() }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Job {}

impl PartialOrd for Job {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Job {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            // BinaryHeap is a max heap: earlier insertion must compare greater.
            Ordering::Equal => other.insertion_order.cmp(&self.insertion_order),
            other => other,
        }
    }
}

/// Description of a pending job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub id: JobId,
    pub priority: JobPriority,
    pub kind: JobKind,
}

/// Thread-safe priority queue with blocking pop.
pub struct PriorityQueue {
    state: Mutex<QueueState>,
    available: Condvar,
}

struct QueueState {
    heap: BinaryHeap<Job>,
    next_job_id: JobId,
    next_insertion: u64,
    closed: bool,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                next_job_id: 1,
                next_insertion: 0,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Queue a task and return its id.
    pub fn push(
        &self,
        priority: JobPriority,
        kind: JobKind,
        token: CancellationToken,
        task: JobTask,
    ) -> JobId {
        self.push_with(priority, kind, token, task, |_| {})
    }

    /// Like [`push`](Self::push), calling `before_visible` with the new id
    /// before any consumer can pop the job.
    pub fn push_with(
        &self,
        priority: JobPriority,
        kind: JobKind,
        token: CancellationToken,
        task: JobTask,
        before_visible: impl FnOnce(JobId),
    ) -> JobId {
        let mut state = lock(&self.state);
        let id = state.next_job_id;
        state.next_job_id += 1;
        before_visible(id);
        let insertion_order = state.next_insertion;
        state.next_insertion += 1;
        state.heap.push(Job { id, priority, kind, insertion_order, token, task });
        drop(state);

        self.available.notify_one();
        id
    }

    pub fn pop(&self) -> Option<Job> {
        lock(&self.state).heap.pop()
    }

    /// Pop the next job, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout or once the queue has been closed.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Job> {
        let state = lock(&self.state);
        let (mut state, _) = self
            .available
            .wait_timeout_while(state, timeout, |s| s.heap.is_empty() && !s.closed)
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if state.closed {
            return None;
        }
        state.heap.pop()
    }

    /// Wake every blocked [`pop_timeout`](Self::pop_timeout) caller for good.
    pub fn close(&self) {
        lock(&self.state).closed = true;
        self.available.notify_all();
    }

    /// Remove every job matching `predicate` and return them unrun.
    pub fn remove_if<F>(&self, predicate: F) -> Vec<Job>
    where
        F: Fn(&Job) -> bool,
    {
        let mut state = lock(&self.state);
        let (removed, kept): (Vec<Job>, Vec<Job>) =
            state.heap.drain().partition(|job| predicate(job));
        state.heap = kept.into();
        removed
    }

    pub fn jobs(&self) -> Vec<JobInfo> {
        lock(&self.state).heap.iter().map(Job::info).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.state).heap.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.state).heap.is_empty()
    }
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> JobTask {
        Box::new(|_| {})
    }

    fn live() -> CancellationToken {
        CancellationToken::new()
    }

    fn load(generation: u64) -> JobKind {
        JobKind::LoadDocument { generation }
    }

    #[test]
    fn interactive_jobs_pop_before_thumbnails() {
        let queue = PriorityQueue::new();
        let thumb = queue.push(
            JobPriority::Thumbnail,
            JobKind::GenerateThumbnail { item_id: "a".into(), generation: 1 },
            CancellationToken::new(),
            noop(),
        );
        let viewer = queue.push(JobPriority::Interactive, load(1), live(), noop());

        assert_eq!(queue.pop().map(|j| j.id), Some(viewer));
        assert_eq!(queue.pop().map(|j| j.id), Some(thumb));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn equal_priority_is_fifo() {
        let queue = PriorityQueue::new();
        let ids: Vec<_> = (1..=4)
            .map(|g| queue.push(JobPriority::Interactive, load(g), live(), noop()))
            .collect();

        let popped: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|j| j.id).collect();
        assert_eq!(popped, ids);
    }

    #[test]
    fn remove_if_keeps_non_matching_jobs() {
        let queue = PriorityQueue::new();
        queue.push(JobPriority::Interactive, load(1), live(), noop());
        queue.push(JobPriority::Interactive, load(2), live(), noop());
        queue.push(JobPriority::Interactive, load(3), live(), noop());

        let removed = queue.remove_if(|job| job.kind == load(2));
        assert_eq!(removed.len(), 1);
        assert_eq!(queue.len(), 2);
        assert!(queue.jobs().iter().all(|info| info.kind != load(2)));
    }

    #[test]
    fn pop_timeout_returns_none_when_empty() {
        let queue = PriorityQueue::new();
        assert!(queue.pop_timeout(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn closed_queue_stops_handing_out_jobs() {
        let queue = PriorityQueue::new();
        queue.push(JobPriority::Interactive, load(1), live(), noop());
        queue.close();
        assert!(queue.pop_timeout(Duration::from_millis(5)).is_none());
    }
}
