use super::{
    Authority, FullscreenBackend, FullscreenCallback, FullscreenError, RequestOutcome,
    Subscription,
};
use std::sync::Arc;

/// Window bridge exposed by the desktop shell.
///
/// A request only acknowledges receipt; the window's fullscreen event is the
/// confirmation, and the shell emits the same event for changes it makes on
/// its own.
pub trait ShellBridge: Send + Sync {
    fn request_fullscreen(&self, fullscreen: bool) -> Result<(), String>;

    fn subscribe(&self, callback: FullscreenCallback) -> Subscription;

    fn is_fullscreen(&self) -> Option<bool> {
        None
    }
}

pub struct ShellBackend {
    bridge: Arc<dyn ShellBridge>,
}

impl ShellBackend {
    pub fn new(bridge: Arc<dyn ShellBridge>) -> Self {
        Self { bridge }
    }
}

impl FullscreenBackend for ShellBackend {
    fn authority(&self) -> Authority {
        Authority::Shell
    }

    fn request(&self, fullscreen: bool) -> Result<RequestOutcome, FullscreenError> {
        self.bridge.request_fullscreen(fullscreen).map_err(FullscreenError::Rejected)?;
        Ok(RequestOutcome::Pending)
    }

    fn subscribe(&self, callback: FullscreenCallback) -> Subscription {
        self.bridge.subscribe(callback)
    }

    fn current(&self) -> Option<bool> {
        self.bridge.is_fullscreen()
    }
}
