//! List thumbnails
//!
//! Page one of a document, rendered with oversampling and encoded as a JPEG
//! data URL. [`ThumbnailGenerator::request`] runs the pipeline as a
//! low-priority job whose result lands in the per-item [`ThumbnailCache`]
//! only while the item still wants it.

use crate::loader::{DocumentLoader, LoadError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use scorebook_cache::{BeginOutcome, Thumbnail, ThumbnailCache, ThumbnailView};
use scorebook_pdf_engine::{PdfEngineError, RenderRequest, RgbaImage};
use scorebook_scheduler::{CancellationToken, JobKind, JobPriority, JobScheduler};
use scorebook_viewer_core::DocumentReference;
use std::sync::Arc;

pub const DEFAULT_THUMBNAIL_SCALE: f32 = 2.0;
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("failed to render first page: {0}")]
    Render(#[from] PdfEngineError),
    #[error("failed to encode thumbnail: {0}")]
    Encode(#[from] image::ImageError),
    #[error("thumbnail no longer needed")]
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThumbnailOptions {
    /// Render scale relative to the page's point size.
    pub scale: f32,
    /// JPEG quality, 1-100.
    pub quality: u8,
}

impl Default for ThumbnailOptions {
    fn default() -> Self {
        Self { scale: DEFAULT_THUMBNAIL_SCALE, quality: DEFAULT_JPEG_QUALITY }
    }
}

/// The synchronous pipeline; cheap to clone into jobs.
#[derive(Clone)]
struct Renderer {
    loader: DocumentLoader,
    options: ThumbnailOptions,
}

impl Renderer {
    fn render(
        &self,
        reference: &DocumentReference,
        token: &CancellationToken,
    ) -> Result<Thumbnail, ThumbnailError> {
        let page = {
            let lease = self.loader.lifecycle().lease(reference).map_err(LoadError::from)?;
            let Some(url) = lease.url() else {
                return Err(ThumbnailError::Abandoned);
            };
            let document = self.loader.load(url)?;
            if token.is_cancelled() {
                return Err(ThumbnailError::Abandoned);
            }
            document.render(RenderRequest { page_index: 0, scale: self.options.scale })?
            // Document and display URL are released here, before encoding.
        };

        if token.is_cancelled() {
            return Err(ThumbnailError::Abandoned);
        }

        let (width, height) = page.dimensions();
        let data_url = encode_data_url(page, self.options.quality)?;
        Ok(Thumbnail { data_url, width, height })
    }
}

/// JPEG-encode `image` (alpha dropped) into a `data:` URL.
pub fn encode_data_url(image: RgbaImage, quality: u8) -> Result<String, image::ImageError> {
    let rgb = DynamicImage::ImageRgba8(image).into_rgb8();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)).encode_image(&rgb)?;

    Ok(format!("{DATA_URL_PREFIX}{}", STANDARD.encode(jpeg)))
}

#[derive(Clone)]
pub struct ThumbnailGenerator {
    renderer: Renderer,
    scheduler: Arc<JobScheduler>,
    cache: ThumbnailCache,
}

impl ThumbnailGenerator {
    pub fn new(
        loader: DocumentLoader,
        scheduler: Arc<JobScheduler>,
        cache: ThumbnailCache,
        options: ThumbnailOptions,
    ) -> Self {
        Self { renderer: Renderer { loader, options }, scheduler, cache }
    }

    pub fn options(&self) -> ThumbnailOptions {
        self.renderer.options
    }

    pub fn cache(&self) -> &ThumbnailCache {
        &self.cache
    }

    /// Render a thumbnail on the calling thread.
    pub fn generate(&self, reference: &DocumentReference) -> Result<Thumbnail, ThumbnailError> {
        self.renderer.render(reference, &CancellationToken::new())
    }

    /// Ensure `item_id` has a thumbnail for `reference`, scheduling a render
    /// unless the entry already tracks this source.
    pub fn request(&self, item_id: &str, reference: &DocumentReference) -> BeginOutcome {
        let token = CancellationToken::new();
        let outcome = self.cache.begin(item_id, reference, token.clone());
        let BeginOutcome::Started { generation, .. } = outcome else {
            return outcome;
        };

        let renderer = self.renderer.clone();
        let cache = self.cache.clone();
        let item = item_id.to_owned();
        let reference = reference.clone();
        let kind = JobKind::GenerateThumbnail { item_id: item.clone(), generation };

        self.scheduler.submit_with_token(JobPriority::Thumbnail, kind, token, move |token| {
            let result = renderer.render(&reference, token).map_err(|err| {
                if !matches!(err, ThumbnailError::Abandoned) {
                    tracing::warn!(item_id = item.as_str(), %err, "thumbnail generation failed");
                }
                err.to_string()
            });
            cache.commit(&item, generation, result);
        });

        tracing::trace!(item_id, generation, "thumbnail scheduled");
        outcome
    }

    /// The item left the list: drop its entry and abandon any render.
    pub fn release(&self, item_id: &str) -> bool {
        self.cache.release(item_id)
    }

    /// Release every entry whose item is not in `mounted`.
    pub fn retain<'a>(&self, mounted: impl IntoIterator<Item = &'a str>) -> usize {
        self.cache.retain_items(mounted)
    }

    pub fn view(&self, item_id: &str) -> ThumbnailView {
        self.cache.view(item_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::HttpFetcher;
    use crate::loader::default_engine_factory;
    use crate::resources::ResourceLifecycle;
    use scorebook_cache::ThumbnailState;
    use scorebook_pdf_engine::fixtures;

    struct Harness {
        lifecycle: ResourceLifecycle,
        scheduler: Arc<JobScheduler>,
        generator: ThumbnailGenerator,
    }

    fn harness() -> Harness {
        let lifecycle = ResourceLifecycle::default();
        let loader = DocumentLoader::new(
            lifecycle.clone(),
            Arc::new(HttpFetcher::default()),
            default_engine_factory(),
        );
        let scheduler = Arc::new(JobScheduler::new());
        let generator = ThumbnailGenerator::new(
            loader,
            scheduler.clone(),
            ThumbnailCache::new(),
            ThumbnailOptions::default(),
        );
        Harness { lifecycle, scheduler, generator }
    }

    fn score(pages: u32) -> DocumentReference {
        DocumentReference::buffer("score.pdf", fixtures::pdf_with_page_size(pages, 60.0, 80.0))
    }

    #[test]
    fn generates_jpeg_data_url_at_double_scale() {
        let h = harness();
        let thumbnail = h.generator.generate(&score(2)).expect("generate should succeed");

        assert!(thumbnail.data_url.starts_with("data:image/jpeg;base64,"));
        assert_eq!((thumbnail.width, thumbnail.height), (120, 160));

        let jpeg = STANDARD.decode(&thumbnail.data_url[DATA_URL_PREFIX.len()..])
            .expect("decode should succeed");
        assert_eq!(&jpeg[..2], [0xFF, 0xD8]);
        assert_eq!(h.lifecycle.live_count(), 0);
    }

    #[test]
    fn malformed_document_renders_placeholder() {
        let h = harness();
        let broken = DocumentReference::buffer("broken.pdf", fixtures::malformed_pdf());

        assert!(matches!(h.generator.generate(&broken), Err(ThumbnailError::Load(_))));

        h.generator.request("item-1", &broken);
        h.scheduler.run_until_idle();
        assert!(matches!(h.generator.view("item-1"), ThumbnailView::Placeholder { .. }));
        assert_eq!(h.lifecycle.live_count(), 0);
    }

    #[test]
    fn request_commits_into_cache() {
        let h = harness();
        let outcome = h.generator.request("item-1", &score(1));
        assert!(matches!(outcome, BeginOutcome::Started { superseded: false, .. }));
        assert_eq!(h.generator.view("item-1"), ThumbnailView::Loading);

        assert_eq!(h.scheduler.run_until_idle(), 1);
        assert!(matches!(h.generator.view("item-1"), ThumbnailView::Ready { .. }));
    }

    #[test]
    fn same_source_is_requested_once() {
        let h = harness();
        let reference = score(1);
        h.generator.request("item-1", &reference);
        assert_eq!(h.generator.request("item-1", &reference.clone()), BeginOutcome::Existing);
        assert_eq!(h.scheduler.pending_jobs(), 1);
    }

    #[test]
    fn failures_are_not_retried() {
        let h = harness();
        let broken = DocumentReference::buffer("broken.pdf", fixtures::malformed_pdf());
        h.generator.request("item-1", &broken);
        h.scheduler.run_until_idle();

        assert_eq!(h.generator.request("item-1", &broken), BeginOutcome::Existing);
        assert!(!h.scheduler.has_pending_jobs());
    }

    #[test]
    fn new_source_supersedes_in_flight_render() {
        let h = harness();
        h.generator.request("item-1", &score(1));
        let outcome = h.generator.request("item-1", &score(3));
        assert!(matches!(outcome, BeginOutcome::Started { superseded: true, .. }));

        h.scheduler.run_until_idle();
        let stats = h.generator.cache().stats();
        assert_eq!(stats.ready, 1);
        assert_eq!(stats.superseded, 1);
        assert_eq!(h.scheduler.stats().jobs_completed, 2);
    }

    #[test]
    fn released_item_discards_result() {
        let h = harness();
        h.generator.request("item-1", &score(1));
        assert!(h.generator.release("item-1"));

        h.scheduler.run_until_idle();
        assert_eq!(h.generator.view("item-1"), ThumbnailView::Missing);
        assert!(h.generator.cache().is_empty());
        assert_eq!(h.lifecycle.live_count(), 0);
    }

    #[test]
    fn abandoned_mid_flight_never_commits() {
        let h = harness();
        let token = CancellationToken::new();
        let cache = h.generator.cache().clone();
        let outcome = cache.begin("item-1", &score(1), token.clone());
        let BeginOutcome::Started { generation, .. } = outcome else {
            panic!("entry should start");
        };

        token.cancel();
        let result = h.generator.renderer.render(&score(1), &token);
        assert!(matches!(result, Err(ThumbnailError::Abandoned)));
        assert_eq!(cache.state("item-1"), Some(ThumbnailState::Loading));
        assert!(cache.is_current("item-1", generation));
    }

    #[test]
    fn retain_drops_unmounted_items() {
        let h = harness();
        h.generator.request("a", &score(1));
        h.generator.request("b", &score(1));
        h.scheduler.run_until_idle();

        assert_eq!(h.generator.retain(["a"]), 1);
        assert_eq!(h.generator.view("b"), ThumbnailView::Missing);
    }
}
