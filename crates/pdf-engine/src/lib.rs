//! PDF engine abstraction
//!
//! Opens score documents from raw bytes or paths, reports page geometry and
//! rasterises pages for the viewer and the thumbnail pipeline. The default
//! backend is pure Rust ([`LopdfEngine`]); the `pdfium` feature adds a backend
//! that renders actual page content through PDFium.

use image::{ImageBuffer, Rgba};
use std::path::{Path, PathBuf};

mod lopdf_backend;

#[cfg(feature = "pdfium")]
pub mod pdfium_backend;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use lopdf_backend::LopdfEngine;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Leading bytes of every PDF file.
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DocumentHandle(u64);

impl DocumentHandle {
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

impl Default for PageSize {
    /// US Letter, used when a page omits its MediaBox.
    fn default() -> Self {
        Self { width_pt: 612.0, height_pt: 792.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderRequest {
    pub page_index: u32,
    pub scale: f32,
}

impl Default for RenderRequest {
    fn default() -> Self {
        Self { page_index: 0, scale: 1.0 }
    }
}

impl RenderRequest {
    /// Pixel dimensions of `size` at this request's scale. Non-positive scales
    /// fall back to 1.0 and every dimension is at least one pixel.
    pub fn pixel_size(&self, size: PageSize) -> (u32, u32) {
        let scale = if self.scale <= 0.0 { 1.0 } else { self.scale };
        let width = (size.width_pt * scale).round().max(1.0) as u32;
        let height = (size.height_pt * scale).round().max(1.0) as u32;
        (width, height)
    }
}

#[derive(Debug, Clone)]
pub enum OpenSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl From<PathBuf> for OpenSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

impl From<&Path> for OpenSource {
    fn from(value: &Path) -> Self {
        Self::Path(value.to_path_buf())
    }
}

impl From<Vec<u8>> for OpenSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<&[u8]> for OpenSource {
    fn from(value: &[u8]) -> Self {
        Self::Bytes(value.to_vec())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PdfEngineError {
    #[error("failed to read document: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed PDF: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("not a PDF document")]
    NotPdf,
    #[error("document {0} is not open")]
    InvalidHandle(u64),
    #[error("page {page} does not exist; the document has {page_count}")]
    PageOutOfRange { page: u32, page_count: u32 },
    #[error("password-protected scores cannot be opened")]
    EncryptedUnsupported,
    #[error("{0}")]
    Backend(String),
}

/// One rendering backend. Handles are only meaningful to the engine that
/// issued them.
pub trait PdfEngine: Send {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError>;
    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError>;
    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError>;
    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError>;
    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError>;
}

/// Cheap header check used before handing bytes to a backend.
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    let trimmed = match bytes.iter().position(|b| !b.is_ascii_whitespace()) {
        Some(start) => &bytes[start..],
        None => return false,
    };
    trimmed.starts_with(PDF_SIGNATURE)
}

pub fn default_engine() -> LopdfEngine {
    LopdfEngine::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_size_scales_and_rounds() {
        let request = RenderRequest { page_index: 0, scale: 2.0 };
        assert_eq!(request.pixel_size(PageSize::default()), (1224, 1584));
    }

    #[test]
    fn pixel_size_treats_non_positive_scale_as_identity() {
        let request = RenderRequest { page_index: 0, scale: -3.0 };
        assert_eq!(request.pixel_size(PageSize { width_pt: 10.4, height_pt: 0.1 }), (10, 1));
    }

    #[test]
    fn signature_check_skips_leading_whitespace() {
        assert!(looks_like_pdf(b"\n  %PDF-1.7\n"));
        assert!(!looks_like_pdf(b"<html>"));
        assert!(!looks_like_pdf(b""));
    }
}
