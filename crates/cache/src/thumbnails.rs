//! Per-item thumbnail cache
//!
//! One entry per mounted list item, keyed by the item's id rather than by
//! document content. There is no eviction policy: an entry lives until its
//! item unmounts or is deleted. A request for a different source replaces the
//! entry under a new generation, so results of the superseded render can no
//! longer commit.

use scorebook_scheduler::CancellationToken;
use scorebook_viewer_core::DocumentReference;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Encoded list preview.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    /// `data:image/jpeg;base64,...`
    pub data_url: String,
    pub width: u32,
    pub height: u32,
}

/// Lifecycle of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThumbnailState {
    Loading,
    Ready(Thumbnail),
    Failed(String),
}

/// What a list item should draw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ThumbnailView {
    /// No entry: the item is not mounted.
    Missing,
    Loading,
    Ready { data_url: String },
    /// Generation failed; draw the fallback icon instead of a broken image.
    Placeholder { reason: String },
}

/// Outcome of [`ThumbnailCache::begin`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginOutcome {
    /// The entry already tracks this source; nothing to schedule.
    Existing,
    /// A fresh entry was created, possibly replacing one for another source.
    Started { generation: u64, superseded: bool },
}

/// Usage counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThumbnailCacheStats {
    pub entries: usize,
    pub loading: usize,
    pub ready: usize,
    pub failed: usize,
    /// Entries replaced because their item's source changed.
    pub superseded: u64,
    /// Results dropped because their entry was gone or superseded.
    pub discarded: u64,
}

struct Entry {
    source: DocumentReference,
    state: ThumbnailState,
    generation: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, Entry>,
    next_generation: u64,
    superseded: u64,
    discarded: u64,
}

/// Thread-safe thumbnail cache shared between the list and render jobs.
///
/// Cloning shares the same entries.
#[derive(Clone, Default)]
pub struct ThumbnailCache {
    state: Arc<Mutex<CacheState>>,
}

impl ThumbnailCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the entry for `item_id` before scheduling a render.
    ///
    /// `token` is cancelled if the entry is later superseded or released.
    /// Requests for the source already tracked, including failed ones, are
    /// not retried.
    pub fn begin(
        &self,
        item_id: &str,
        source: &DocumentReference,
        token: CancellationToken,
    ) -> BeginOutcome {
        let mut state = self.lock();

        if let Some(entry) = state.entries.get(item_id) {
            if entry.source.same_source(source) {
                return BeginOutcome::Existing;
            }
        }

        state.next_generation += 1;
        let generation = state.next_generation;
        let previous = state.entries.insert(
            item_id.to_owned(),
            Entry { source: source.clone(), state: ThumbnailState::Loading, generation, token },
        );

        let superseded = previous.is_some();
        if let Some(previous) = previous {
            previous.token.cancel();
            state.superseded += 1;
            tracing::debug!(item_id, generation, "thumbnail source changed, superseding entry");
        }

        BeginOutcome::Started { generation, superseded }
    }

    /// Store the result of the render started under `generation`.
    ///
    /// Returns `false`, leaving the cache untouched, when the entry was
    /// released or superseded in the meantime.
    pub fn commit(
        &self,
        item_id: &str,
        generation: u64,
        result: Result<Thumbnail, String>,
    ) -> bool {
        let mut state = self.lock();

        let live = state.entries.get_mut(item_id).filter(|entry| {
            entry.generation == generation && entry.state == ThumbnailState::Loading
        });

        let Some(entry) = live else {
            state.discarded += 1;
            tracing::debug!(item_id, generation, "discarding stale thumbnail result");
            return false;
        };

        entry.state = match result {
            Ok(thumbnail) => ThumbnailState::Ready(thumbnail),
            Err(message) => ThumbnailState::Failed(message),
        };
        true
    }

    /// Whether a commit for `generation` would still land.
    pub fn is_current(&self, item_id: &str, generation: u64) -> bool {
        self.lock().entries.get(item_id).is_some_and(|entry| entry.generation == generation)
    }

    pub fn state(&self, item_id: &str) -> Option<ThumbnailState> {
        self.lock().entries.get(item_id).map(|entry| entry.state.clone())
    }

    pub fn view(&self, item_id: &str) -> ThumbnailView {
        match self.state(item_id) {
            None => ThumbnailView::Missing,
            Some(ThumbnailState::Loading) => ThumbnailView::Loading,
            Some(ThumbnailState::Ready(thumbnail)) => {
                ThumbnailView::Ready { data_url: thumbnail.data_url }
            }
            Some(ThumbnailState::Failed(reason)) => ThumbnailView::Placeholder { reason },
        }
    }

    /// Drop the entry of an unmounted or deleted item and abandon its render.
    pub fn release(&self, item_id: &str) -> bool {
        match self.lock().entries.remove(item_id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Release every entry whose item is not in `mounted`.
    pub fn retain_items<'a>(&self, mounted: impl IntoIterator<Item = &'a str>) -> usize {
        let mounted: Vec<&str> = mounted.into_iter().collect();
        let mut state = self.lock();
        let before = state.entries.len();

        state.entries.retain(|item_id, entry| {
            let keep = mounted.iter().any(|m| *m == item_id.as_str());
            if !keep {
                entry.token.cancel();
            }
            keep
        });
        before - state.entries.len()
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        for entry in state.entries.values() {
            entry.token.cancel();
        }
        state.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn stats(&self) -> ThumbnailCacheStats {
        let state = self.lock();
        let mut stats = ThumbnailCacheStats {
            entries: state.entries.len(),
            superseded: state.superseded,
            discarded: state.discarded,
            ..Default::default()
        };

        for entry in state.entries.values() {
            match entry.state {
                ThumbnailState::Loading => stats.loading += 1,
                ThumbnailState::Ready(_) => stats.ready += 1,
                ThumbnailState::Failed(_) => stats.failed += 1,
            }
        }
        stats
    }
}
