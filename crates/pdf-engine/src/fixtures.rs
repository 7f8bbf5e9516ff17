//! Small in-memory documents for tests.

use crate::PageSize;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, Stream};

/// Builds a document with one page per entry in `sizes`.
///
/// The first page's MediaBox and a `/F1` Helvetica font live on the page tree
/// root, so pages sharing that size inherit both. Every page draws its own
/// number so original content can be told apart from drawn annotations.
pub fn sample_pdf(sizes: &[PageSize]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut font = Dictionary::new();
    font.set("Type", Object::Name(b"Font".to_vec()));
    font.set("Subtype", Object::Name(b"Type1".to_vec()));
    font.set("BaseFont", Object::Name(b"Helvetica".to_vec()));
    let font_id = doc.add_object(font);

    let mut fonts = Dictionary::new();
    fonts.set("F1", Object::Reference(font_id));
    let mut resources = Dictionary::new();
    resources.set("Font", Object::Dictionary(fonts));
    let resources_id = doc.add_object(resources);

    let root_size = sizes.first().copied().unwrap_or(PageSize { width_pt: 612.0, height_pt: 792.0 });
    let mut kids = Vec::with_capacity(sizes.len());

    for (index, size) in sizes.iter().enumerate() {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 72.into()]),
                Operation::new("Tj", vec![Object::string_literal(format!("Page {}", index + 1))]),
                Operation::new("ET", vec![]),
            ],
        };
        let bytes = content.encode().expect("fixture content encodes");
        let content_id = doc.add_object(Stream::new(Dictionary::new(), bytes));

        let mut page = Dictionary::new();
        page.set("Type", Object::Name(b"Page".to_vec()));
        page.set("Parent", Object::Reference(pages_id));
        page.set("Contents", Object::Reference(content_id));
        if *size != root_size {
            page.set("MediaBox", media_box(*size));
        }
        kids.push(Object::Reference(doc.add_object(page)));
    }

    let mut pages = Dictionary::new();
    pages.set("Type", Object::Name(b"Pages".to_vec()));
    pages.set("Count", Object::Integer(kids.len() as i64));
    pages.set("Kids", Object::Array(kids));
    pages.set("MediaBox", media_box(root_size));
    pages.set("Resources", Object::Reference(resources_id));
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let mut catalog = Dictionary::new();
    catalog.set("Type", Object::Name(b"Catalog".to_vec()));
    catalog.set("Pages", Object::Reference(pages_id));
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut output = Vec::new();
    doc.save_to(&mut output).expect("fixture document saves");
    output
}

fn media_box(size: PageSize) -> Object {
    Object::Array(vec![
        Object::Integer(0),
        Object::Integer(0),
        Object::Real(size.width_pt),
        Object::Real(size.height_pt),
    ])
}
