use super::{
    Authority, FullscreenBackend, FullscreenCallback, FullscreenError, RequestOutcome,
    Subscription,
};
use std::sync::Arc;

/// The page's fullscreen API (`requestFullscreen`, `exitFullscreen`,
/// `fullscreenElement`, `fullscreenchange`).
///
/// Requests resolve once the transition happened, so the state read right
/// after a successful call is already confirmed.
pub trait BrowserFullscreenApi: Send + Sync {
    fn request_fullscreen(&self) -> Result<(), String>;

    fn exit_fullscreen(&self) -> Result<(), String>;

    fn is_fullscreen(&self) -> bool;

    fn subscribe(&self, callback: FullscreenCallback) -> Subscription;
}

pub struct BrowserBackend {
    api: Arc<dyn BrowserFullscreenApi>,
}

impl BrowserBackend {
    pub fn new(api: Arc<dyn BrowserFullscreenApi>) -> Self {
        Self { api }
    }
}

impl FullscreenBackend for BrowserBackend {
    fn authority(&self) -> Authority {
        Authority::Browser
    }

    fn request(&self, fullscreen: bool) -> Result<RequestOutcome, FullscreenError> {
        let result =
            if fullscreen { self.api.request_fullscreen() } else { self.api.exit_fullscreen() };
        result.map_err(FullscreenError::Rejected)?;

        Ok(RequestOutcome::Confirmed(self.api.is_fullscreen()))
    }

    fn subscribe(&self, callback: FullscreenCallback) -> Subscription {
        self.api.subscribe(callback)
    }

    fn current(&self) -> Option<bool> {
        Some(self.api.is_fullscreen())
    }
}
