//! Display URL lifecycle
//!
//! Buffers are shown through revocable object URLs; stored documents are
//! shown through their own location. Every URL handed out by
//! [`ResourceLifecycle::acquire`] must be released exactly once. Holders
//! normally use a [`DisplayUrlLease`], which releases on drop so that every
//! exit path (close, replacement, teardown, early return) is covered.

use scorebook_viewer_core::DocumentReference;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

const OBJECT_URL_PREFIX: &str = "blob:scorebook/";

/// Errors from allocating display resources
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResourceError {
    /// The platform refused to create an object URL.
    #[error("object URL allocation refused: {0}")]
    Refused(String),
}

/// Platform object-URL table (`URL.createObjectURL` and friends).
pub trait ObjectUrlRegistry: Send + Sync {
    fn create(&self, bytes: Arc<[u8]>) -> Result<String, ResourceError>;

    /// Revoke `url`. Returns `false` if it was not live.
    fn revoke(&self, url: &str) -> bool;

    fn resolve(&self, url: &str) -> Option<Arc<[u8]>>;

    fn live_count(&self) -> usize;
}

/// Process-local registry backing `blob:scorebook/<uuid>` URLs.
#[derive(Debug, Default)]
pub struct InMemoryObjectUrls {
    urls: Mutex<HashMap<String, Arc<[u8]>>>,
    limit: Option<usize>,
}

impl InMemoryObjectUrls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse allocations once `limit` URLs are live.
    pub fn with_limit(limit: usize) -> Self {
        Self { urls: Mutex::default(), limit: Some(limit) }
    }

    fn urls(&self) -> MutexGuard<'_, HashMap<String, Arc<[u8]>>> {
        self.urls.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ObjectUrlRegistry for InMemoryObjectUrls {
    fn create(&self, bytes: Arc<[u8]>) -> Result<String, ResourceError> {
        let mut urls = self.urls();
        if let Some(limit) = self.limit {
            if urls.len() >= limit {
                return Err(ResourceError::Refused(format!("{limit} object URLs already live")));
            }
        }

        let url = format!("{OBJECT_URL_PREFIX}{}", Uuid::new_v4());
        urls.insert(url.clone(), bytes);
        Ok(url)
    }

    fn revoke(&self, url: &str) -> bool {
        self.urls().remove(url).is_some()
    }

    fn resolve(&self, url: &str) -> Option<Arc<[u8]>> {
        self.urls().get(url).cloned()
    }

    fn live_count(&self) -> usize {
        self.urls().len()
    }
}

/// A resolvable handle for showing a document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DisplayUrl {
    /// Object URL owned by the registry; must be released.
    Allocated(String),
    /// The document's own location; nothing to release.
    Passthrough(String),
}

impl DisplayUrl {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Allocated(url) | Self::Passthrough(url) => url,
        }
    }

    pub fn is_allocated(&self) -> bool {
        matches!(self, Self::Allocated(_))
    }
}

impl fmt::Display for DisplayUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derives and releases display URLs. Clones share one registry.
#[derive(Clone)]
pub struct ResourceLifecycle {
    registry: Arc<dyn ObjectUrlRegistry>,
}

impl Default for ResourceLifecycle {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryObjectUrls::new()))
    }
}

impl ResourceLifecycle {
    pub fn new(registry: Arc<dyn ObjectUrlRegistry>) -> Self {
        Self { registry }
    }

    pub fn acquire(&self, reference: &DocumentReference) -> Result<DisplayUrl, ResourceError> {
        match reference {
            DocumentReference::Buffer { bytes, name } => {
                let url = self.registry.create(bytes.clone())?;
                tracing::trace!(%url, name = name.as_str(), "allocated object URL");
                Ok(DisplayUrl::Allocated(url))
            }
            DocumentReference::Url { location } => Ok(DisplayUrl::Passthrough(location.clone())),
        }
    }

    /// Revoke `url` if it was allocated. Idempotent.
    pub fn release(&self, url: &DisplayUrl) {
        if let DisplayUrl::Allocated(raw) = url {
            if self.registry.revoke(raw) {
                tracing::trace!(url = %raw, "revoked object URL");
            }
        }
    }

    /// Acquire a URL that is released when the lease drops.
    pub fn lease(&self, reference: &DocumentReference) -> Result<DisplayUrlLease, ResourceError> {
        let url = self.acquire(reference)?;
        Ok(DisplayUrlLease { lifecycle: self.clone(), url: Some(url) })
    }

    /// Bytes behind an allocated URL, `None` for passthrough or revoked URLs.
    pub fn resolve(&self, url: &DisplayUrl) -> Option<Arc<[u8]>> {
        match url {
            DisplayUrl::Allocated(raw) => self.registry.resolve(raw),
            DisplayUrl::Passthrough(_) => None,
        }
    }

    /// Currently allocated URLs.
    pub fn live_count(&self) -> usize {
        self.registry.live_count()
    }
}

/// Scoped owner of one [`DisplayUrl`].
pub struct DisplayUrlLease {
    lifecycle: ResourceLifecycle,
    url: Option<DisplayUrl>,
}

impl DisplayUrlLease {
    pub fn url(&self) -> Option<&DisplayUrl> {
        self.url.as_ref()
    }

    pub fn is_released(&self) -> bool {
        self.url.is_none()
    }

    /// Release now instead of on drop. Safe to call repeatedly.
    pub fn release(&mut self) {
        if let Some(url) = self.url.take() {
            self.lifecycle.release(&url);
        }
    }
}

impl fmt::Debug for DisplayUrlLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisplayUrlLease").field("url", &self.url).finish()
    }
}

impl Drop for DisplayUrlLease {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> DocumentReference {
        DocumentReference::buffer("score.pdf", b"%PDF-1.7".to_vec())
    }

    #[test]
    fn buffers_allocate_and_urls_pass_through() {
        let lifecycle = ResourceLifecycle::default();

        let allocated = lifecycle.acquire(&buffer()).expect("acquire should succeed");
        assert!(allocated.is_allocated());
        assert!(allocated.as_str().starts_with("blob:scorebook/"));
        assert_eq!(lifecycle.live_count(), 1);

        let location = "https://cdn.example/score.pdf";
        let passthrough = lifecycle.acquire(&DocumentReference::url(location))
            .expect("acquire should succeed");
        assert_eq!(passthrough, DisplayUrl::Passthrough(location.into()));
        assert_eq!(lifecycle.live_count(), 1);

        lifecycle.release(&allocated);
        lifecycle.release(&passthrough);
        assert_eq!(lifecycle.live_count(), 0);
    }

    #[test]
    fn release_is_idempotent() {
        let lifecycle = ResourceLifecycle::default();
        let url = lifecycle.acquire(&buffer()).expect("acquire should succeed");

        lifecycle.release(&url);
        lifecycle.release(&url);
        assert_eq!(lifecycle.live_count(), 0);
        assert!(lifecycle.resolve(&url).is_none());
    }

    #[test]
    fn resolve_returns_shared_bytes() {
        let lifecycle = ResourceLifecycle::default();
        let reference = buffer();
        let url = lifecycle.acquire(&reference).expect("acquire should succeed");

        let DocumentReference::Buffer { bytes, .. } = &reference else { unreachable!() };
        let resolved = lifecycle.resolve(&url).expect("resolve should succeed");
        assert!(Arc::ptr_eq(bytes, &resolved));
    }

    #[test]
    fn lease_releases_on_every_exit_path() {
        let lifecycle = ResourceLifecycle::default();

        {
            let _lease = lifecycle.lease(&buffer()).expect("lease should succeed");
            assert_eq!(lifecycle.live_count(), 1);
        }
        assert_eq!(lifecycle.live_count(), 0);

        let mut lease = lifecycle.lease(&buffer()).expect("lease should succeed");
        lease.release();
        lease.release();
        assert!(lease.is_released());
        drop(lease);
        assert_eq!(lifecycle.live_count(), 0);
    }

    #[test]
    fn live_count_tracks_open_leases() {
        let lifecycle = ResourceLifecycle::default();
        let mut leases: Vec<_> = (0..5).map(|_| lifecycle.lease(&buffer())
            .expect("lease should succeed")).collect();
        assert_eq!(lifecycle.live_count(), 5);

        leases.truncate(2);
        assert_eq!(lifecycle.live_count(), 2);
        leases.clear();
        assert_eq!(lifecycle.live_count(), 0);
    }

    #[test]
    fn refused_allocation_is_an_error() {
        let lifecycle = ResourceLifecycle::new(Arc::new(InMemoryObjectUrls::with_limit(1)));
        let _first = lifecycle.lease(&buffer()).expect("lease should succeed");

        assert!(matches!(lifecycle.acquire(&buffer()), Err(ResourceError::Refused(_))));
        assert!(lifecycle.acquire(&DocumentReference::url("x")).is_ok());
    }
}
