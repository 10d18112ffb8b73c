//! Fullscreen coordination
//!
//! One logical `is_fullscreen` flag, kept in step with exactly one
//! authoritative backend: the desktop shell's window bridge or the browser
//! fullscreen API, chosen once at startup by [`select_backend`].
//!
//! The flag only ever takes values the backend confirmed. Nothing here
//! blocks: a shell request is sent and left in flight until the window's
//! event arrives, which may be on the caller's own loop. At most one request
//! is in flight; toggles issued meanwhile queue up and each one requests the
//! opposite of whatever was confirmed by the time it is sent.
//! Backend-originated changes (OS window controls, the browser's own Escape
//! handling) update the flag and notify subscribers exactly like toggles do.

mod browser;
mod headless;
mod shell;

pub use browser::{BrowserBackend, BrowserFullscreenApi};
pub use headless::{SimulatedBrowser, SimulatedShell};
pub use shell::{ShellBackend, ShellBridge};

use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

/// How long a shell confirmation may take before the request counts as failed.
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(2);

/// Receives confirmed fullscreen values.
pub type FullscreenCallback = Arc<dyn Fn(bool) + Send + Sync>;

pub type SubscriptionId = u64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FullscreenError {
    #[error("fullscreen request rejected: {0}")]
    Rejected(String),
    #[error("no fullscreen confirmation within {0:?}")]
    TimedOut(Duration),
    #[error("backend settled on fullscreen={actual} after a request for {requested}")]
    Unconfirmed { requested: bool, actual: bool },
}

/// Which control surface is authoritative in this runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Authority {
    Shell,
    Browser,
}

impl fmt::Display for Authority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Shell => "shell",
            Self::Browser => "browser",
        })
    }
}

/// What a backend knows right after a request returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The call itself settled the platform state.
    Confirmed(bool),
    /// Confirmation arrives later through the subscription.
    Pending,
}

/// Where a coordinator request stands when the call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing outstanding for this call; carries the confirmed state.
    Settled(bool),
    /// Sent; the flag follows once the platform confirms the target.
    Requested(bool),
    /// Behind an unconfirmed request, sent once that one settles.
    Queued,
}

impl Transition {
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Settled(_))
    }
}

/// Removes a backend listener when dropped.
pub struct Subscription {
    cancel: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self { cancel: Mutex::new(Some(Box::new(cancel))) }
    }

    /// A subscription with nothing to remove.
    pub fn detached() -> Self {
        Self { cancel: Mutex::new(None) }
    }

    pub fn unsubscribe(self) {}
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let cancel = self.cancel.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(cancel) = cancel {
            cancel();
        }
    }
}

/// Capability interface shared by the shell and browser backends.
pub trait FullscreenBackend: Send + Sync {
    fn authority(&self) -> Authority;

    fn request(&self, fullscreen: bool) -> Result<RequestOutcome, FullscreenError>;

    /// Listen for platform fullscreen changes, whoever caused them.
    fn subscribe(&self, callback: FullscreenCallback) -> Subscription;

    /// Platform state at startup, when the backend can tell.
    fn current(&self) -> Option<bool> {
        None
    }
}

/// Use the shell bridge when the host exposes one, the browser API otherwise.
pub fn select_backend(
    shell: Option<Arc<dyn ShellBridge>>,
    browser: Arc<dyn BrowserFullscreenApi>,
) -> Arc<dyn FullscreenBackend> {
    match shell {
        Some(bridge) => {
            tracing::debug!("fullscreen authority: shell bridge");
            Arc::new(ShellBackend::new(bridge))
        }
        None => {
            tracing::debug!("fullscreen authority: browser API");
            Arc::new(BrowserBackend::new(browser))
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Intent {
    Toggle,
    Set(bool),
}

impl Intent {
    /// The value to request from `is_fullscreen`, if any.
    fn target(self, is_fullscreen: bool) -> Option<bool> {
        match self {
            Self::Toggle => Some(!is_fullscreen),
            Self::Set(value) => (value != is_fullscreen).then_some(value),
        }
    }
}

struct InFlight {
    ticket: u64,
    target: bool,
    deadline: Instant,
}

struct State {
    is_fullscreen: bool,
    next_ticket: u64,
    in_flight: Option<InFlight>,
    queued: VecDeque<Intent>,
}

impl State {
    /// Mark a request for `intent` as in flight; `None` when there is nothing to ask for.
    fn begin(&mut self, intent: Intent, timeout: Duration) -> Option<(u64, bool)> {
        let target = intent.target(self.is_fullscreen)?;
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.in_flight = Some(InFlight { ticket, target, deadline: Instant::now() + timeout });
        Some((ticket, target))
    }

    fn begin_queued(&mut self, timeout: Duration) -> Option<(u64, bool)> {
        while let Some(intent) = self.queued.pop_front() {
            if let Some(next) = self.begin(intent, timeout) {
                return Some(next);
            }
        }
        None
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.in_flight.as_ref().is_some_and(|flight| flight.ticket == ticket)
    }
}

struct Subscribers {
    next_id: SubscriptionId,
    callbacks: BTreeMap<SubscriptionId, FullscreenCallback>,
}

struct Shared {
    backend: Arc<dyn FullscreenBackend>,
    confirm_timeout: Duration,
    state: Mutex<State>,
    subscribers: Mutex<Subscribers>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    fn is_fullscreen(&self) -> bool {
        lock(&self.state).is_fullscreen
    }

    fn submit(&self, intent: Intent) -> Result<Transition, FullscreenError> {
        self.poll();

        let mut state = lock(&self.state);
        if state.in_flight.is_some() {
            state.queued.push_back(intent);
            tracing::debug!(queued = state.queued.len(), "fullscreen request queued");
            return Ok(Transition::Queued);
        }
        let Some((ticket, target)) = state.begin(intent, self.confirm_timeout) else {
            return Ok(Transition::Settled(state.is_fullscreen));
        };
        drop(state);

        self.send(ticket, target)
    }

    /// No lock is held across the backend call; it may confirm from inside it.
    fn send(&self, ticket: u64, target: bool) -> Result<Transition, FullscreenError> {
        let outcome = match self.backend.request(target) {
            Ok(outcome) => outcome,
            Err(err) => {
                let err = self.failed(target, err);
                self.abandon(ticket);
                return Err(err);
            }
        };

        match outcome {
            RequestOutcome::Confirmed(actual) => {
                self.apply_confirmed(actual);
                if actual != target {
                    let err = self.failed(target, FullscreenError::Unconfirmed {
                        requested: target,
                        actual,
                    });
                    self.abandon(ticket);
                    return Err(err);
                }
                Ok(Transition::Settled(actual))
            }
            RequestOutcome::Pending if lock(&self.state).is_current(ticket) => {
                Ok(Transition::Requested(target))
            }
            RequestOutcome::Pending => Ok(Transition::Settled(target)),
        }
    }

    /// Record a confirmed value; subscribers hear about actual changes only.
    fn apply_confirmed(&self, is_fullscreen: bool) {
        let mut state = lock(&self.state);
        let changed = state.is_fullscreen != is_fullscreen;
        state.is_fullscreen = is_fullscreen;
        let settles = state.in_flight.as_ref().is_some_and(|flight| flight.target == is_fullscreen);
        let next = if settles {
            state.in_flight = None;
            state.begin_queued(self.confirm_timeout)
        } else {
            None
        };
        drop(state);

        if changed {
            tracing::debug!(
                is_fullscreen,
                authority = %self.backend.authority(),
                "fullscreen changed"
            );
            let callbacks: Vec<FullscreenCallback> =
                lock(&self.subscribers).callbacks.values().cloned().collect();
            for callback in callbacks {
                callback(is_fullscreen);
            }
        }

        if let Some((ticket, target)) = next {
            // Nobody waits on a queued request; `send` logs its failure.
            let _ = self.send(ticket, target);
        }
    }

    /// Drop request `ticket` if it is still in flight and move the queue on.
    fn abandon(&self, ticket: u64) {
        let mut state = lock(&self.state);
        if !state.is_current(ticket) {
            return;
        }
        state.in_flight = None;
        let next = state.begin_queued(self.confirm_timeout);
        drop(state);

        if let Some((ticket, target)) = next {
            let _ = self.send(ticket, target);
        }
    }

    fn poll(&self) -> Option<FullscreenError> {
        let state = lock(&self.state);
        let overdue = state.in_flight.as_ref().filter(|flight| Instant::now() >= flight.deadline)?;
        let (ticket, target) = (overdue.ticket, overdue.target);
        drop(state);

        let err = self.failed(target, FullscreenError::TimedOut(self.confirm_timeout));
        self.abandon(ticket);
        Some(err)
    }

    fn failed(&self, target: bool, err: FullscreenError) -> FullscreenError {
        tracing::warn!(
            %err,
            requested = target,
            authority = %self.backend.authority(),
            "fullscreen request failed"
        );
        err
    }
}

/// Owner of the logical fullscreen flag.
pub struct FullscreenCoordinator {
    shared: Arc<Shared>,
    _backend_events: Subscription,
}

impl FullscreenCoordinator {
    pub fn new(backend: Arc<dyn FullscreenBackend>) -> Self {
        Self::with_timeout(backend, DEFAULT_CONFIRM_TIMEOUT)
    }

    pub fn with_timeout(backend: Arc<dyn FullscreenBackend>, confirm_timeout: Duration) -> Self {
        let initial = backend.current().unwrap_or(false);
        let shared = Arc::new(Shared {
            backend: backend.clone(),
            confirm_timeout,
            state: Mutex::new(State {
                is_fullscreen: initial,
                next_ticket: 0,
                in_flight: None,
                queued: VecDeque::new(),
            }),
            subscribers: Mutex::new(Subscribers { next_id: 0, callbacks: BTreeMap::new() }),
        });

        // Weak: the backend keeps this callback alive, not the coordinator.
        let weak: Weak<Shared> = Arc::downgrade(&shared);
        let backend_events = backend.subscribe(Arc::new(move |is_fullscreen| {
            if let Some(shared) = weak.upgrade() {
                shared.apply_confirmed(is_fullscreen);
            }
        }));

        Self { shared, _backend_events: backend_events }
    }

    pub fn authority(&self) -> Authority {
        self.shared.backend.authority()
    }

    pub fn confirm_timeout(&self) -> Duration {
        self.shared.confirm_timeout
    }

    /// Last confirmed value.
    pub fn is_fullscreen(&self) -> bool {
        self.shared.is_fullscreen()
    }

    /// Target of the request awaiting confirmation, if any.
    pub fn pending(&self) -> Option<bool> {
        lock(&self.shared.state).in_flight.as_ref().map(|flight| flight.target)
    }

    pub fn queued(&self) -> usize {
        lock(&self.shared.state).queued.len()
    }

    /// Request the opposite of the confirmed state.
    ///
    /// Errors are immediate backend failures; the flag keeps its confirmed value.
    pub fn toggle(&self) -> Result<Transition, FullscreenError> {
        self.shared.submit(Intent::Toggle)
    }

    /// Request `fullscreen` unless it is the confirmed state when sent.
    pub fn set_fullscreen(&self, fullscreen: bool) -> Result<Transition, FullscreenError> {
        self.shared.submit(Intent::Set(fullscreen))
    }

    /// Force NORMAL; a no-op when not fullscreen.
    pub fn exit(&self) -> Result<Transition, FullscreenError> {
        self.set_fullscreen(false)
    }

    /// Give up on a request whose confirmation is overdue and send the next
    /// queued one. Host loops call this from their tick; requests check it too.
    pub fn poll(&self) -> Option<FullscreenError> {
        self.shared.poll()
    }

    pub fn subscribe(&self, callback: impl Fn(bool) + Send + Sync + 'static) -> SubscriptionId {
        let mut subscribers = lock(&self.shared.subscribers);
        subscribers.next_id += 1;
        let id = subscribers.next_id;
        subscribers.callbacks.insert(id, Arc::new(callback));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        lock(&self.shared.subscribers).callbacks.remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.shared.subscribers).callbacks.len()
    }
}

impl fmt::Debug for FullscreenCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FullscreenCoordinator")
            .field("authority", &self.authority())
            .field("is_fullscreen", &self.is_fullscreen())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}
