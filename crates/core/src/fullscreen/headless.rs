//! In-process fullscreen platforms for the CLI and tests.

use super::{lock, FullscreenCallback, Subscription};
use super::{BrowserFullscreenApi, ShellBridge};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct Listeners {
    next_id: u64,
    callbacks: BTreeMap<u64, FullscreenCallback>,
}

fn add_listener(listeners: &Arc<Mutex<Listeners>>, callback: FullscreenCallback) -> Subscription {
    let mut guard = lock(listeners);
    guard.next_id += 1;
    let id = guard.next_id;
    guard.callbacks.insert(id, callback);
    drop(guard);

    let weak = Arc::downgrade(listeners);
    Subscription::new(move || {
        if let Some(listeners) = weak.upgrade() {
            lock(&listeners).callbacks.remove(&id);
        }
    })
}

fn emit(listeners: &Mutex<Listeners>, is_fullscreen: bool) {
    let callbacks: Vec<FullscreenCallback> = lock(listeners).callbacks.values().cloned().collect();
    for callback in callbacks {
        callback(is_fullscreen);
    }
}

fn confirm(state: &Mutex<ShellState>, listeners: &Mutex<Listeners>, fullscreen: bool) {
    let mut guard = lock(state);
    guard.is_fullscreen = fullscreen;
    guard.outstanding = guard.outstanding.saturating_sub(1);
    drop(guard);
    emit(listeners, fullscreen);
}

#[derive(Default)]
struct ShellState {
    is_fullscreen: bool,
    rejecting: bool,
    silent: bool,
    requests: usize,
    outstanding: usize,
    max_outstanding: usize,
}

#[derive(Debug, Clone, Copy, Default)]
enum Delivery {
    #[default]
    Immediate,
    /// From another thread after the delay.
    Delayed(Duration),
    /// Held until [`SimulatedShell::pump`], like an event loop turn.
    Deferred,
}

/// Desktop window that confirms requests through its fullscreen event.
#[derive(Default)]
pub struct SimulatedShell {
    state: Arc<Mutex<ShellState>>,
    listeners: Arc<Mutex<Listeners>>,
    delivery: Delivery,
    backlog: Arc<Mutex<VecDeque<bool>>>,
}

impl SimulatedShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Confirm each request from another thread after `delay`.
    pub fn with_delay(delay: Duration) -> Self {
        Self { delivery: Delivery::Delayed(delay), ..Self::default() }
    }

    /// Queue confirmations until [`pump`](Self::pump) runs on the host's thread.
    pub fn deferred() -> Self {
        Self { delivery: Delivery::Deferred, ..Self::default() }
    }

    /// Deliver held confirmations, including ones requested while pumping.
    /// Returns how many were delivered.
    pub fn pump(&self) -> usize {
        let mut delivered = 0;
        loop {
            let next = lock(&self.backlog).pop_front();
            let Some(fullscreen) = next else {
                return delivered;
            };
            confirm(&self.state, &self.listeners, fullscreen);
            delivered += 1;
        }
    }

    /// Refuse every request.
    pub fn set_rejecting(&self, rejecting: bool) {
        lock(&self.state).rejecting = rejecting;
    }

    /// Acknowledge requests but never emit the confirming event.
    pub fn set_silent(&self, silent: bool) {
        lock(&self.state).silent = silent;
    }

    /// The window changed on its own, e.g. through the title bar button.
    pub fn simulate_os_change(&self, is_fullscreen: bool) {
        lock(&self.state).is_fullscreen = is_fullscreen;
        emit(&self.listeners, is_fullscreen);
    }

    pub fn is_fullscreen(&self) -> bool {
        lock(&self.state).is_fullscreen
    }

    pub fn requests(&self) -> usize {
        lock(&self.state).requests
    }

    /// Most requests ever awaiting confirmation at once.
    pub fn max_outstanding(&self) -> usize {
        lock(&self.state).max_outstanding
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).callbacks.len()
    }
}

impl ShellBridge for SimulatedShell {
    fn request_fullscreen(&self, fullscreen: bool) -> Result<(), String> {
        let mut state = lock(&self.state);
        state.requests += 1;
        if state.rejecting {
            return Err("window refused the fullscreen change".to_owned());
        }
        if state.silent {
            return Ok(());
        }
        state.outstanding += 1;
        state.max_outstanding = state.max_outstanding.max(state.outstanding);
        drop(state);

        match self.delivery {
            Delivery::Immediate => confirm(&self.state, &self.listeners, fullscreen),
            Delivery::Delayed(delay) => {
                let state = self.state.clone();
                let listeners = self.listeners.clone();
                thread::spawn(move || {
                    thread::sleep(delay);
                    confirm(&state, &listeners, fullscreen);
                });
            }
            Delivery::Deferred => lock(&self.backlog).push_back(fullscreen),
        }
        Ok(())
    }

    fn subscribe(&self, callback: FullscreenCallback) -> Subscription {
        add_listener(&self.listeners, callback)
    }

    fn is_fullscreen(&self) -> Option<bool> {
        Some(lock(&self.state).is_fullscreen)
    }
}

#[derive(Default)]
struct BrowserState {
    is_fullscreen: bool,
    rejecting: bool,
    requests: usize,
}

/// Page fullscreen API whose calls settle synchronously.
#[derive(Default)]
pub struct SimulatedBrowser {
    state: Mutex<BrowserState>,
    listeners: Arc<Mutex<Listeners>>,
}

impl SimulatedBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deny requests, as a browser does without a user gesture.
    pub fn set_rejecting(&self, rejecting: bool) {
        lock(&self.state).rejecting = rejecting;
    }

    /// The user left fullscreen with the browser's own Escape handling.
    pub fn simulate_user_exit(&self) {
        self.transition(false);
    }

    pub fn requests(&self) -> usize {
        lock(&self.state).requests
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).callbacks.len()
    }

    fn transition(&self, is_fullscreen: bool) {
        let mut state = lock(&self.state);
        let changed = state.is_fullscreen != is_fullscreen;
        state.is_fullscreen = is_fullscreen;
        drop(state);

        if changed {
            emit(&self.listeners, is_fullscreen);
        }
    }

    fn request(&self, is_fullscreen: bool) -> Result<(), String> {
        let mut state = lock(&self.state);
        state.requests += 1;
        if state.rejecting {
            return Err("fullscreen permission denied".to_owned());
        }
        drop(state);

        self.transition(is_fullscreen);
        Ok(())
    }
}

impl BrowserFullscreenApi for SimulatedBrowser {
    fn request_fullscreen(&self) -> Result<(), String> {
        self.request(true)
    }

    fn exit_fullscreen(&self) -> Result<(), String> {
        self.request(false)
    }

    fn is_fullscreen(&self) -> bool {
        lock(&self.state).is_fullscreen
    }

    fn subscribe(&self, callback: FullscreenCallback) -> Subscription {
        add_listener(&self.listeners, callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn dropping_subscription_removes_listener() {
        let browser = SimulatedBrowser::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let subscription = browser.subscribe(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        browser.request_fullscreen().expect("request should succeed");
        subscription.unsubscribe();
        browser.exit_fullscreen().expect("exit should succeed");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(browser.listener_count(), 0);
    }

    #[test]
    fn shell_emits_confirmation_for_requests() {
        let shell = SimulatedShell::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _subscription =
            shell.subscribe(Arc::new(move |value| lock(&sink).push(value)));

        shell.request_fullscreen(true).expect("request should succeed");
        shell.request_fullscreen(false).expect("request should succeed");

        assert_eq!(*lock(&seen), [true, false]);
        assert_eq!(shell.requests(), 2);
    }

    #[test]
    fn deferred_shell_confirms_on_pump() {
        let shell = SimulatedShell::deferred();
        shell.request_fullscreen(true).expect("request should succeed");
        assert!(!shell.is_fullscreen());

        assert_eq!(shell.pump(), 1);
        assert!(shell.is_fullscreen());
        assert_eq!(shell.pump(), 0);
    }
}
