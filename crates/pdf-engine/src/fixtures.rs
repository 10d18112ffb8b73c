//! Generated PDF documents for tests.
//!
//! Built with `lopdf` so no binary fixtures need to live in the repository.

use lopdf::{dictionary, Document, Object, Stream};

/// A valid document with `pages` US Letter pages.
pub fn sample_pdf(pages: u32) -> Vec<u8> {
    pdf_with_page_size(pages, 612.0, 792.0)
}

/// A valid document whose pages all share the given MediaBox size.
pub fn pdf_with_page_size(pages: u32, width_pt: f32, height_pt: f32) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids: Vec<Object> = Vec::with_capacity(pages as usize);
    for index in 0..pages {
        let content = format!("BT /F1 24 Tf 72 720 Td (Page {}) Tj ET", index + 1);
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(width_pt),
                Object::Real(height_pt),
            ],
        });
        kids.push(page_id.into());
    }

    let pages_dict = dictionary! {
        "Type" => "Pages",
        "Kids" => kids,
        "Count" => pages as i64,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("in-memory PDF should serialise");
    bytes
}

/// Bytes that no backend accepts as a PDF.
pub fn malformed_pdf() -> Vec<u8> {
    b"this is not a score, just text pretending to be one".to_vec()
}
