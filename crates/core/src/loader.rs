//! Document loading
//!
//! Resolves a [`DisplayUrl`] to bytes (the object-URL registry for buffers,
//! the fetcher for locations) and opens them with a fresh engine. The engine
//! handle lives in a [`LoadedDocument`] and is closed when it drops.

use crate::fetch::{DocumentFetcher, FetchError};
use crate::resources::{DisplayUrl, ResourceError, ResourceLifecycle};
use scorebook_pdf_engine::{
    DocumentHandle, OpenSource, PageSize, PdfEngine, PdfEngineError, RenderRequest, RgbaImage,
};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("could not prepare document: {0}")]
    Resource(#[from] ResourceError),
    #[error("display URL {0} is no longer live")]
    Revoked(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("failed to open document: {0}")]
    Engine(#[from] PdfEngineError),
}

/// Builds one engine per load; engines are not shared between jobs.
pub type EngineFactory = Arc<dyn Fn() -> Box<dyn PdfEngine> + Send + Sync>;

/// PDFium when the feature is on and the library binds, otherwise lopdf.
pub fn default_engine_factory() -> EngineFactory {
    #[cfg(feature = "pdfium")]
    {
        use scorebook_pdf_engine::pdfium_backend::PdfiumEngine;

        if let Err(err) = PdfiumEngine::bind() {
            tracing::warn!(%err, "PDFium unavailable, falling back to lopdf");
        } else {
            return Arc::new(|| match PdfiumEngine::bind() {
                Ok(engine) => Box::new(engine) as Box<dyn PdfEngine>,
                Err(_) => Box::new(scorebook_pdf_engine::default_engine()),
            });
        }
    }

    Arc::new(|| Box::new(scorebook_pdf_engine::default_engine()))
}

#[derive(Clone)]
pub struct DocumentLoader {
    lifecycle: ResourceLifecycle,
    fetcher: Arc<dyn DocumentFetcher>,
    engines: EngineFactory,
}

impl DocumentLoader {
    pub fn new(
        lifecycle: ResourceLifecycle,
        fetcher: Arc<dyn DocumentFetcher>,
        engines: EngineFactory,
    ) -> Self {
        Self { lifecycle, fetcher, engines }
    }

    pub fn lifecycle(&self) -> &ResourceLifecycle {
        &self.lifecycle
    }

    pub fn fetcher(&self) -> &Arc<dyn DocumentFetcher> {
        &self.fetcher
    }

    /// Bytes behind `url`.
    pub fn read(&self, url: &DisplayUrl) -> Result<Vec<u8>, LoadError> {
        match url {
            DisplayUrl::Allocated(raw) => self
                .lifecycle
                .resolve(url)
                .map(|bytes| bytes.to_vec())
                .ok_or_else(|| LoadError::Revoked(raw.clone())),
            DisplayUrl::Passthrough(location) => Ok(self.fetcher.fetch(location)?),
        }
    }

    pub fn load(&self, url: &DisplayUrl) -> Result<LoadedDocument, LoadError> {
        let bytes = self.read(url)?;
        let mut engine = (self.engines)();
        let handle = engine.open(OpenSource::Bytes(bytes))?;

        let page_count = match engine.page_count(handle) {
            Ok(count) => count,
            Err(err) => {
                let _ = engine.close(handle);
                return Err(err.into());
            }
        };

        tracing::debug!(url = %url, page_count, "document loaded");
        Ok(LoadedDocument { engine, handle, page_count })
    }
}

/// An open document; the engine handle closes on drop.
pub struct LoadedDocument {
    engine: Box<dyn PdfEngine>,
    handle: DocumentHandle,
    page_count: u32,
}

impl LoadedDocument {
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn page_size(&self, page_index: u32) -> Result<PageSize, PdfEngineError> {
        self.engine.page_size(self.handle, page_index)
    }

    pub fn render(&self, request: RenderRequest) -> Result<RgbaImage, PdfEngineError> {
        self.engine.render_page(self.handle, request)
    }
}

impl fmt::Debug for LoadedDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedDocument")
            .field("handle", &self.handle)
            .field("page_count", &self.page_count)
            .finish_non_exhaustive()
    }
}

impl Drop for LoadedDocument {
    fn drop(&mut self) {
        if let Err(err) = self.engine.close(self.handle) {
            tracing::warn!(%err, handle = self.handle.raw(), "failed to close document");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::HttpFetcher;
    use scorebook_pdf_engine::fixtures;
    use scorebook_viewer_core::DocumentReference;

    fn loader() -> DocumentLoader {
        DocumentLoader::new(
            ResourceLifecycle::default(),
            Arc::new(HttpFetcher::default()),
            default_engine_factory(),
        )
    }

    #[test]
    fn loads_buffer_through_object_url() {
        let loader = loader();
        let reference = DocumentReference::buffer("score.pdf", fixtures::sample_pdf(3));
        let mut lease = loader.lifecycle().lease(&reference).expect("lease should succeed");

        let document = loader.load(lease.url().expect("lease should carry a url"))
            .expect("load should succeed");
        assert_eq!(document.page_count(), 3);
        assert_eq!(document.page_size(0).expect("page size should succeed"), PageSize::default());

        lease.release();
        assert_eq!(loader.lifecycle().live_count(), 0);
    }

    #[test]
    fn loads_location_through_fetcher() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("etude.pdf");
        std::fs::write(&path, fixtures::sample_pdf(2)).expect("fixture should be written");

        let url = DisplayUrl::Passthrough(path.display().to_string());
        assert_eq!(loader().load(&url).expect("load should succeed").page_count(), 2);
    }

    #[test]
    fn revoked_url_is_an_error() {
        let loader = loader();
        let reference = DocumentReference::buffer("score.pdf", fixtures::sample_pdf(1));
        let url = loader.lifecycle().acquire(&reference).expect("acquire should succeed");
        loader.lifecycle().release(&url);

        assert!(matches!(loader.load(&url), Err(LoadError::Revoked(_))));
    }

    #[test]
    fn malformed_bytes_fail_in_engine() {
        let loader = loader();
        let reference = DocumentReference::buffer("broken.pdf", fixtures::malformed_pdf());
        let lease = loader.lifecycle().lease(&reference).expect("lease should succeed");

        let url = lease.url().expect("lease should carry a url");
        assert!(matches!(loader.load(url), Err(LoadError::Engine(_))));
    }

    #[test]
    fn renders_at_requested_scale() {
        let loader = loader();
        let reference =
            DocumentReference::buffer("small.pdf", fixtures::pdf_with_page_size(1, 100.0, 50.0));
        let lease = loader.lifecycle().lease(&reference).expect("lease should succeed");
        let document = loader.load(lease.url().expect("lease should carry a url"))
            .expect("load should succeed");

        let image = document.render(RenderRequest { page_index: 0, scale: 2.0 })
            .expect("render should succeed");
        assert_eq!(image.dimensions(), (200, 100));
    }
}
