//! Viewer state machine
//!
//! `Closed -> Opening -> Open -> Closed`, with `Opening`/`Open` re-entering
//! `Opening` when a different document is handed over. Each open bumps the
//! generation; the load job carries it and commits only while it is still
//! current. Shortcuts are registered with the keyboard hub while the viewer
//! is visible.

use crate::download::{materialize, DownloadError, DownloadSink};
use crate::fullscreen::{FullscreenCoordinator, FullscreenError, Transition};
use crate::keyboard::{KeyboardHub, ListenerId};
use crate::loader::DocumentLoader;
use crate::notifications::NotificationCenter;
use crate::resources::DisplayUrlLease;
use scorebook_scheduler::{CancellationToken, JobId, JobKind, JobPriority, JobScheduler};
use scorebook_viewer_core::{
    DocumentReference, Keymap, PaginationState, ViewerAction, ViewerPhase, ViewerSnapshot,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// Collaborators the controller drives.
pub struct ViewerServices {
    pub loader: DocumentLoader,
    pub scheduler: Arc<JobScheduler>,
    pub fullscreen: Arc<FullscreenCoordinator>,
    pub keyboard: KeyboardHub,
    pub keymap: Keymap,
    pub notifications: NotificationCenter,
    pub downloads: Arc<dyn DownloadSink>,
}

struct Session {
    reference: DocumentReference,
    title: Option<String>,
    /// `None` when no display URL could be allocated.
    lease: Option<DisplayUrlLease>,
    pagination: PaginationState,
    /// Cancels the session's load job.
    token: CancellationToken,
}

struct ViewerState {
    phase: ViewerPhase,
    generation: u64,
    session: Option<Session>,
    shortcuts: Option<ListenerId>,
}

struct Inner {
    services: ViewerServices,
    state: Mutex<ViewerState>,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, ViewerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask for NORMAL if the platform is, or is about to be, fullscreen.
    ///
    /// A failure is logged by the coordinator and leaves the flag set, so a
    /// later close or toggle tries again.
    fn leave_fullscreen(&self) {
        let fullscreen = &self.services.fullscreen;
        if fullscreen.is_fullscreen() || fullscreen.pending() == Some(true) {
            let _ = fullscreen.exit();
        }
    }

    /// End the session and unbind shortcuts. Fullscreen is left to the caller.
    fn teardown(&self, state: &mut ViewerState) {
        if let Some(session) = state.session.take() {
            session.token.cancel();
            // Dropping the lease releases the display URL.
            drop(session);
        }
        if let Some(listener) = state.shortcuts.take() {
            self.services.keyboard.unregister(listener);
        }
        state.phase = ViewerPhase::Closed;
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.leave_fullscreen();
        let mut state = self.state();
        if state.phase.is_visible() {
            self.teardown(&mut state);
        }
    }
}

/// Owns the viewer session. Clones control the same viewer.
#[derive(Clone)]
pub struct ViewerController {
    inner: Arc<Inner>,
}

impl ViewerController {
    pub fn new(services: ViewerServices) -> Self {
        let state = ViewerState {
            phase: ViewerPhase::Closed,
            generation: 0,
            session: None,
            shortcuts: None,
        };
        Self { inner: Arc::new(Inner { services, state: Mutex::new(state) }) }
    }

    pub fn services(&self) -> &ViewerServices {
        &self.inner.services
    }

    pub fn phase(&self) -> ViewerPhase {
        self.inner.state().phase
    }

    pub fn is_visible(&self) -> bool {
        self.phase().is_visible()
    }

    pub fn generation(&self) -> u64 {
        self.inner.state().generation
    }

    pub fn shortcuts_bound(&self) -> bool {
        self.inner.state().shortcuts.is_some()
    }

    /// Show `reference`; returns the session's generation.
    ///
    /// Reopening the source already shown is a no-op unless its load failed,
    /// in which case it is retried. Otherwise the current session is torn
    /// down first and a load job is scheduled.
    pub fn open(&self, reference: DocumentReference, title: Option<String>) -> u64 {
        let inner = &self.inner;
        let mut state = inner.state();

        if state.phase.is_visible() {
            if let Some(session) = &state.session {
                let failed = session.pagination.error().is_some();
                if !failed && session.reference.same_source(&reference) {
                    tracing::debug!(generation = state.generation, "document already open");
                    return state.generation;
                }
            }
        }

        if let Some(previous) = state.session.take() {
            previous.token.cancel();
            tracing::debug!(generation = state.generation, "replacing open document");
        }

        state.generation += 1;
        let generation = state.generation;
        let mut pagination = PaginationState::new();
        let token = CancellationToken::new();

        let lease = match inner.services.loader.lifecycle().lease(&reference) {
            Ok(lease) => Some(lease),
            Err(err) => {
                tracing::warn!(%err, generation, "could not allocate display URL");
                pagination.on_load_error(err.to_string());
                None
            }
        };

        if let Some(url) = lease.as_ref().and_then(DisplayUrlLease::url) {
            let loader = inner.services.loader.clone();
            let url = url.clone();
            let weak = Arc::downgrade(inner);
            inner.services.scheduler.submit_with_token(
                JobPriority::Interactive,
                JobKind::LoadDocument { generation },
                token.clone(),
                move |token| {
                    let result = loader
                        .load(&url)
                        .map(|document| document.page_count())
                        .map_err(|err| err.to_string());
                    if token.is_cancelled() {
                        return;
                    }
                    if let Some(inner) = weak.upgrade() {
                        ViewerController { inner }.commit_load(generation, result);
                    }
                },
            );
        }

        state.phase = if lease.is_some() { ViewerPhase::Opening } else { ViewerPhase::Open };
        state.session = Some(Session { reference, title, lease, pagination, token });

        if state.shortcuts.is_none() {
            state.shortcuts = Some(self.bind_shortcuts());
        }

        tracing::info!(generation, phase = ?state.phase, "viewer opened");
        generation
    }

    fn bind_shortcuts(&self) -> ListenerId {
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.services.keyboard.register(Arc::new(move |chord| {
            let Some(inner) = weak.upgrade() else {
                return false;
            };
            let Some(action) = inner.services.keymap.action_for(chord) else {
                return false;
            };
            ViewerController { inner }.perform(action);
            true
        }))
    }

    /// Apply a finished load. Returns `false` for results of stale generations.
    fn commit_load(&self, generation: u64, result: Result<u32, String>) -> bool {
        let mut state = self.inner.state();
        let current = state.generation == generation && state.phase == ViewerPhase::Opening;
        let session = state.session.as_mut().filter(|_| current);

        let Some(session) = session else {
            tracing::debug!(generation, "discarding stale load result");
            return false;
        };

        match result {
            Ok(total_pages) => {
                session.pagination.on_document_loaded(total_pages);
                tracing::debug!(generation, total_pages, "document ready");
            }
            Err(message) => {
                tracing::warn!(generation, error = message.as_str(), "document failed to load");
                session.pagination.on_load_error(message);
            }
        }
        state.phase = ViewerPhase::Open;
        true
    }

    /// Leave fullscreen, release the document and unbind shortcuts.
    ///
    /// Escape, backdrop clicks and explicit closes all end up here. A failed
    /// fullscreen exit does not stop the close; calling it again while closed
    /// retries the exit.
    pub fn close(&self) {
        self.inner.leave_fullscreen();

        let mut state = self.inner.state();
        if !state.phase.is_visible() {
            return;
        }
        self.inner.teardown(&mut state);
        state.generation += 1;
        tracing::info!(generation = state.generation, "viewer closed");
    }

    fn with_pagination(&self, f: impl FnOnce(&mut PaginationState) -> bool) -> bool {
        let mut state = self.inner.state();
        match state.session.as_mut() {
            Some(session) => f(&mut session.pagination),
            None => false,
        }
    }

    pub fn next_page(&self) -> bool {
        self.with_pagination(PaginationState::next_page)
    }

    pub fn prev_page(&self) -> bool {
        self.with_pagination(PaginationState::prev_page)
    }

    pub fn zoom_in(&self) -> bool {
        self.with_pagination(PaginationState::zoom_in)
    }

    pub fn zoom_out(&self) -> bool {
        self.with_pagination(PaginationState::zoom_out)
    }

    /// Toggle fullscreen while the viewer is visible.
    ///
    /// While closed only the way back to NORMAL is offered, for a platform
    /// left fullscreen by a failed exit.
    pub fn toggle_fullscreen(&self) -> Result<Transition, FullscreenError> {
        let fullscreen = &self.inner.services.fullscreen;
        if self.is_visible() {
            return fullscreen.toggle();
        }
        if fullscreen.is_fullscreen() {
            return fullscreen.exit();
        }
        Ok(Transition::Settled(false))
    }

    /// Run a keymap action.
    pub fn perform(&self, action: ViewerAction) {
        match action {
            ViewerAction::PreviousPage => {
                self.prev_page();
            }
            ViewerAction::NextPage => {
                self.next_page();
            }
            ViewerAction::ZoomIn => {
                self.zoom_in();
            }
            ViewerAction::ZoomOut => {
                self.zoom_out();
            }
            ViewerAction::ToggleFullscreen => {
                let _ = self.toggle_fullscreen();
            }
            ViewerAction::Close => self.close(),
        }
    }

    /// Save the open document through the download sink.
    ///
    /// Runs as a job; the outcome is reported as a notification. Returns
    /// `None` when nothing is open.
    pub fn download(&self) -> Option<JobId> {
        let state = self.inner.state();
        let session = state.session.as_ref()?;
        let generation = state.generation;

        let reference = session.reference.clone();
        let file_name = reference.file_name(session.title.as_deref());
        drop(state);

        let services = &self.inner.services;
        let fetcher = services.loader.fetcher().clone();
        let sink = services.downloads.clone();
        let notifications = services.notifications.clone();

        let (job_id, _) = services.scheduler.submit(
            JobPriority::Interactive,
            JobKind::Download { generation },
            move |_| {
                let saved = materialize(&reference, fetcher.as_ref())
                    .map_err(DownloadError::from)
                    .and_then(|bytes| sink.save(&file_name, &bytes));

                match saved {
                    Ok(path) => {
                        tracing::info!(path = %path.display(), "document downloaded");
                        notifications.info(format!("Saved {}", path.display()));
                    }
                    Err(err) => {
                        tracing::warn!(%err, file_name = file_name.as_str(), "download failed");
                        notifications.error(format!("Download failed: {err}"));
                    }
                }
            },
        );
        Some(job_id)
    }

    pub fn snapshot(&self) -> ViewerSnapshot {
        let is_fullscreen = self.inner.services.fullscreen.is_fullscreen();
        let state = self.inner.state();

        let Some(session) = state.session.as_ref().filter(|_| state.phase.is_visible()) else {
            return ViewerSnapshot::closed(state.generation, is_fullscreen);
        };

        let mut snapshot = ViewerSnapshot::from_pagination(
            state.phase,
            state.generation,
            &session.pagination,
            is_fullscreen,
        );
        snapshot.title = session.title.clone();
        snapshot.source = Some(session.reference.describe());
        snapshot.display_url = session
            .lease
            .as_ref()
            .and_then(DisplayUrlLease::url)
            .map(|url| url.as_str().to_owned());
        snapshot
    }
}
