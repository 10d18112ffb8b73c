//! PDFium-backed engine.
//!
//! Geometry comes from the `lopdf` page tree so handles behave identically to
//! [`LopdfEngine`]; rendering reloads the document bytes in PDFium for each
//! request because PDFium documents borrow the library instance.

use crate::lopdf_backend::read_source;
use crate::{
    DocumentHandle, LopdfEngine, OpenSource, PageSize, PdfEngine, PdfEngineError, RenderRequest,
    RgbaImage,
};
use pdfium_render::prelude::*;
use std::collections::HashMap;

pub struct PdfiumEngine {
    pdfium: Pdfium,
    geometry: LopdfEngine,
    bytes: HashMap<DocumentHandle, Vec<u8>>,
}

impl PdfiumEngine {
    /// Bind PDFium.
    ///
    /// Search order:
    /// 1. Executable's directory (app bundles)
    /// 2. Current working directory
    /// 3. System library paths
    pub fn bind() -> Result<Self, PdfEngineError> {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()));

        let bindings = exe_dir
            .and_then(|dir| {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir)).ok()
            })
            .map(Ok)
            .unwrap_or_else(|| {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                    .or_else(|_| Pdfium::bind_to_system_library())
            })
            .map_err(|err| PdfEngineError::Backend(format!("failed to bind pdfium: {err}")))?;

        Ok(Self {
            pdfium: Pdfium::new(bindings),
            geometry: LopdfEngine::new(),
            bytes: HashMap::new(),
        })
    }
}

impl PdfEngine for PdfiumEngine {
    fn open(&mut self, source: OpenSource) -> Result<DocumentHandle, PdfEngineError> {
        let bytes = read_source(source)?;
        let page_sizes = LopdfEngine::parse_sizes(&bytes)?;
        let handle = self.geometry.insert(page_sizes);
        self.bytes.insert(handle, bytes);
        Ok(handle)
    }

    fn page_count(&self, handle: DocumentHandle) -> Result<u32, PdfEngineError> {
        self.geometry.page_count(handle)
    }

    fn page_size(
        &self,
        handle: DocumentHandle,
        page_index: u32,
    ) -> Result<PageSize, PdfEngineError> {
        self.geometry.page_size(handle, page_index)
    }

    fn render_page(
        &self,
        handle: DocumentHandle,
        request: RenderRequest,
    ) -> Result<RgbaImage, PdfEngineError> {
        let size = self.geometry.page_size(handle, request.page_index)?;
        let (width, height) = request.pixel_size(size);
        let bytes = self.bytes.get(&handle).ok_or(PdfEngineError::InvalidHandle(handle.raw()))?;

        let document = self
            .pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|err| PdfEngineError::Backend(err.to_string()))?;

        let index = PdfPageIndex::try_from(request.page_index).map_err(|_| {
            PdfEngineError::PageOutOfRange {
                page: request.page_index,
                page_count: self.geometry.page_count(handle).unwrap_or(0),
            }
        })?;
        let page = document
            .pages()
            .get(index)
            .map_err(|err| PdfEngineError::Backend(err.to_string()))?;

        let config = PdfRenderConfig::new()
            .set_target_width(width as i32)
            .set_target_height(height as i32);

        let bitmap = page
            .render_with_config(&config)
            .map_err(|err| PdfEngineError::Backend(err.to_string()))?;

        RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes().to_vec())
            .ok_or_else(|| PdfEngineError::Backend("bitmap size mismatch".to_owned()))
    }

    fn close(&mut self, handle: DocumentHandle) -> Result<(), PdfEngineError> {
        self.bytes.remove(&handle);
        self.geometry.close(handle)
    }
}
