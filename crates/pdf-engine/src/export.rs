use crate::{inherited_attribute, load_document, page_sizes, PdfEngineError};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::BTreeMap;

/// Resource name the drawn text font is registered under on every touched page.
pub const FONT_RESOURCE_NAME: &str = "PdfAnnotHelv";

const LINE_HEIGHT_FACTOR: f32 = 1.2;

/// One run of text to draw, already in page space (origin bottom-left).
#[derive(Debug, Clone, PartialEq)]
pub struct TextDraw {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub rgb: [f32; 3],
}

/// A loaded document that text can be drawn onto and serialized back.
pub trait ExportDocument {
    fn page_heights(&self) -> Vec<f32>;
    fn draw_text(&mut self, page_index: u32, draw: &TextDraw) -> Result<(), PdfEngineError>;
    fn save(&mut self) -> Result<Vec<u8>, PdfEngineError>;
}

pub struct LopdfExportDocument {
    doc: Document,
    page_ids: Vec<ObjectId>,
    page_heights: Vec<f32>,
    font_id: Option<ObjectId>,
    pending: BTreeMap<u32, Vec<Operation>>,
}

impl LopdfExportDocument {
    pub fn load(bytes: &[u8]) -> Result<Self, PdfEngineError> {
        let doc = load_document(bytes)?;
        let page_ids = doc.get_pages().values().copied().collect();
        let page_heights = page_sizes(&doc).iter().map(|size| size.height_pt).collect();

        Ok(Self { doc, page_ids, page_heights, font_id: None, pending: BTreeMap::new() })
    }

    fn font_id(&mut self) -> ObjectId {
        if let Some(id) = self.font_id {
            return id;
        }

        let mut font = Dictionary::new();
        font.set("Type", Object::Name(b"Font".to_vec()));
        font.set("Subtype", Object::Name(b"Type1".to_vec()));
        font.set("BaseFont", Object::Name(b"Helvetica".to_vec()));
        font.set("Encoding", Object::Name(b"WinAnsiEncoding".to_vec()));

        let id = self.doc.add_object(font);
        self.font_id = Some(id);
        id
    }

    /// Copies the page's effective resources onto the page itself and adds the
    /// text font. Shared or inherited dictionaries are left untouched.
    fn register_font(&mut self, page_id: ObjectId) -> Result<(), PdfEngineError> {
        let font_id = self.font_id();

        let mut resources = match inherited_attribute(&self.doc, page_id, b"Resources") {
            Some(Object::Dictionary(dict)) => dict.clone(),
            _ => Dictionary::new(),
        };

        let mut fonts = match resources.get(b"Font") {
            Ok(Object::Dictionary(dict)) => dict.clone(),
            Ok(Object::Reference(id)) => self.doc.get_dictionary(*id)?.clone(),
            _ => Dictionary::new(),
        };

        fonts.set(FONT_RESOURCE_NAME, Object::Reference(font_id));
        resources.set("Font", Object::Dictionary(fonts));

        let page = self.doc.get_object_mut(page_id)?.as_dict_mut()?;
        page.set("Resources", Object::Dictionary(resources));
        Ok(())
    }

    /// Isolates the original content in `q … Q` and appends `operations`
    /// as a new stream after it.
    fn append_content(
        &mut self,
        page_id: ObjectId,
        operations: Vec<Operation>,
    ) -> Result<(), PdfEngineError> {
        let existing = {
            let page = self.doc.get_dictionary(page_id)?;
            match page.get(b"Contents") {
                Ok(Object::Reference(id)) => match self.doc.get_object(*id) {
                    Ok(Object::Array(items)) => items.clone(),
                    _ => vec![Object::Reference(*id)],
                },
                Ok(Object::Array(items)) => items.clone(),
                _ => Vec::new(),
            }
        };

        let mut overlay = Vec::new();
        if !existing.is_empty() {
            overlay.extend_from_slice(b"\nQ\n");
        }
        overlay.extend(Content { operations }.encode()?);
        if overlay.last() != Some(&b'\n') {
            overlay.push(b'\n');
        }

        let mut contents = Vec::with_capacity(existing.len() + 2);
        if !existing.is_empty() {
            let save_id = self.doc.add_object(Stream::new(Dictionary::new(), b"q\n".to_vec()));
            contents.push(Object::Reference(save_id));
            contents.extend(existing);
        }
        let overlay_id = self.doc.add_object(Stream::new(Dictionary::new(), overlay));
        contents.push(Object::Reference(overlay_id));

        let page = self.doc.get_object_mut(page_id)?.as_dict_mut()?;
        page.set("Contents", Object::Array(contents));
        Ok(())
    }
}

impl ExportDocument for LopdfExportDocument {
    fn page_heights(&self) -> Vec<f32> {
        self.page_heights.clone()
    }

    fn draw_text(&mut self, page_index: u32, draw: &TextDraw) -> Result<(), PdfEngineError> {
        if page_index as usize >= self.page_ids.len() {
            return Err(PdfEngineError::PageOutOfRange {
                page: page_index,
                page_count: self.page_ids.len() as u32,
            });
        }

        let operations = self.pending.entry(page_index).or_default();
        operations.extend(text_operations(draw));
        Ok(())
    }

    fn save(&mut self) -> Result<Vec<u8>, PdfEngineError> {
        for (page_index, operations) in std::mem::take(&mut self.pending) {
            let page_id = self.page_ids[page_index as usize];
            self.register_font(page_id)?;
            self.append_content(page_id, operations)?;
        }

        let mut output = Vec::new();
        self.doc.save_to(&mut output)?;
        Ok(output)
    }
}

fn text_operations(draw: &TextDraw) -> Vec<Operation> {
    let [r, g, b] = draw.rgb;
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![FONT_RESOURCE_NAME.into(), Object::Real(draw.size)]),
        Operation::new("TL", vec![Object::Real(draw.size * LINE_HEIGHT_FACTOR)]),
        Operation::new("rg", vec![Object::Real(r), Object::Real(g), Object::Real(b)]),
        Operation::new("Td", vec![Object::Real(draw.x), Object::Real(draw.y)]),
    ];

    for (index, line) in draw.text.replace('\r', "").split('\n').enumerate() {
        if index > 0 {
            operations.push(Operation::new("T*", vec![]));
        }
        let (encoded, substituted) = encode_win_ansi(line);
        if substituted > 0 {
            tracing::warn!(substituted, "replaced characters the standard font cannot show");
        }
        operations.push(Operation::new("Tj", vec![Object::String(encoded, StringFormat::Literal)]));
    }

    operations.push(Operation::new("ET", vec![]));
    operations
}

/// Encodes `text` for a WinAnsi simple font, substituting `?` for anything it
/// cannot represent. Returns the bytes and the number of substitutions.
pub(crate) fn encode_win_ansi(text: &str) -> (Vec<u8>, usize) {
    let mut substituted = 0;
    let bytes = text
        .chars()
        .map(|c| match c {
            '\t' => b' ',
            ' '..='~' => c as u8,
            '\u{a0}'..='\u{ff}' => c as u32 as u8,
            '€' => 0x80,
            '‚' => 0x82,
            '„' => 0x84,
            '…' => 0x85,
            '‘' => 0x91,
            '’' => 0x92,
            '“' => 0x93,
            '”' => 0x94,
            '•' => 0x95,
            '–' => 0x96,
            '—' => 0x97,
            '™' => 0x99,
            _ => {
                substituted += 1;
                b'?'
            }
        })
        .collect();

    (bytes, substituted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::sample_pdf;
    use crate::PageSize;

    const LETTER: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };
    const A5: PageSize = PageSize { width_pt: 420.0, height_pt: 595.0 };

    fn draw(text: &str, x: f32, y: f32) -> TextDraw {
        TextDraw { text: text.to_owned(), x, y, size: 16.0, rgb: [1.0, 0.0, 0.0] }
    }

    fn page_operations(bytes: &[u8], page_number: u32) -> Vec<Operation> {
        let doc = Document::load_mem(bytes).expect("output should parse");
        let page_id = doc.get_pages()[&page_number];
        let content = doc.get_page_content(page_id).expect("page content");
        Content::decode(&content).expect("content decodes").operations
    }

    fn operands(operations: &[Operation], operator: &str) -> Vec<Vec<f32>> {
        operations
            .iter()
            .filter(|op| op.operator == operator)
            .map(|op| op.operands.iter().filter_map(|o| o.as_float().ok()).collect())
            .collect()
    }

    fn shown_text(operations: &[Operation]) -> Vec<Vec<u8>> {
        operations
            .iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| op.operands.first()?.as_str().ok().map(<[u8]>::to_vec))
            .collect()
    }

    #[test]
    fn reports_page_heights_in_page_order() {
        let doc = LopdfExportDocument::load(&sample_pdf(&[LETTER, A5])).expect("load");
        assert_eq!(doc.page_heights(), vec![792.0, 595.0]);
    }

    #[test]
    fn drawn_text_lands_after_original_content() {
        let mut doc = LopdfExportDocument::load(&sample_pdf(&[LETTER])).expect("load");
        doc.draw_text(0, &draw("Approved", 100.0, 726.0)).expect("draw");
        let bytes = doc.save().expect("save");

        let operations = page_operations(&bytes, 1);
        assert_eq!(shown_text(&operations), vec![b"Page 1".to_vec(), b"Approved".to_vec()]);
        assert_eq!(operands(&operations, "Td").last(), Some(&vec![100.0, 726.0]));
        assert_eq!(operands(&operations, "rg"), vec![vec![1.0, 0.0, 0.0]]);

        let operators: Vec<&str> = operations.iter().map(|op| op.operator.as_str()).collect();
        assert_eq!(operators.first(), Some(&"q"));
        let restore = operators.iter().position(|op| *op == "Q").expect("Q present");
        let last_bt = operators.iter().rposition(|op| *op == "BT").expect("BT present");
        assert!(restore < last_bt, "original graphics state is restored before drawing");
        let count = |name: &str| operators.iter().filter(|op| **op == name).count();
        assert_eq!(count("q"), count("Q"));
        assert_eq!(count("BT"), count("ET"));
        assert_eq!(count("ETQ"), 0);
    }

    #[test]
    fn overlay_stream_is_delimited_from_original_content() {
        let mut doc = LopdfExportDocument::load(&sample_pdf(&[LETTER])).expect("load");
        doc.draw_text(0, &draw("Approved", 100.0, 726.0)).expect("draw");
        let bytes = doc.save().expect("save");

        let saved = Document::load_mem(&bytes).expect("output should parse");
        let page_id = saved.get_pages()[&1];
        let contents = saved
            .get_dictionary(page_id)
            .and_then(|page| page.get(b"Contents"))
            .and_then(Object::as_array)
            .expect("contents array");
        let overlay_id = contents.last().and_then(|o| o.as_reference().ok()).expect("overlay ref");
        let overlay = saved.get_object(overlay_id).and_then(Object::as_stream).expect("stream");

        assert!(overlay.content.starts_with(b"\nQ\n"));
        assert!(overlay.content.ends_with(b"\n"));
    }

    #[test]
    fn unresolvable_font_resource_fails_the_save() {
        let mut source = Document::load_mem(&sample_pdf(&[LETTER])).expect("fixture loads");
        let resources_id = source
            .objects
            .iter()
            .find(|(_, object)| {
                object.as_dict().is_ok_and(|dict| dict.get(b"Font").and_then(Object::as_dict).is_ok())
            })
            .map(|(id, _)| *id)
            .expect("shared resources dictionary");
        source
            .get_object_mut(resources_id)
            .and_then(Object::as_dict_mut)
            .expect("resources dict")
            .set("Font", Object::Reference((9999, 0)));
        let mut broken = Vec::new();
        source.save_to(&mut broken).expect("broken fixture saves");

        let mut doc = LopdfExportDocument::load(&broken).expect("load");
        doc.draw_text(0, &draw("x", 1.0, 1.0)).expect("draw");

        assert!(matches!(doc.save(), Err(PdfEngineError::Parse(_))));
    }

    #[test]
    fn font_is_registered_without_losing_inherited_resources() {
        let mut doc = LopdfExportDocument::load(&sample_pdf(&[LETTER, LETTER])).expect("load");
        doc.draw_text(1, &draw("x", 1.0, 1.0)).expect("draw");
        let bytes = doc.save().expect("save");

        let saved = Document::load_mem(&bytes).expect("output should parse");
        let pages = saved.get_pages();

        let touched = saved.get_dictionary(pages[&2]).expect("page dict");
        let fonts = touched
            .get(b"Resources")
            .and_then(Object::as_dict)
            .and_then(|resources| resources.get(b"Font"))
            .and_then(Object::as_dict)
            .expect("page-local font dictionary");
        assert!(fonts.has(b"F1"));
        assert!(fonts.has(FONT_RESOURCE_NAME.as_bytes()));

        let untouched = saved.get_dictionary(pages[&1]).expect("page dict");
        assert!(!untouched.has(b"Resources"), "other pages keep inheriting");
    }

    #[test]
    fn multi_line_text_advances_with_leading() {
        let mut doc = LopdfExportDocument::load(&sample_pdf(&[LETTER])).expect("load");
        doc.draw_text(0, &draw("first\r\nsecond", 10.0, 10.0)).expect("draw");
        let bytes = doc.save().expect("save");

        let operations = page_operations(&bytes, 1);
        assert_eq!(operands(&operations, "TL"), vec![vec![16.0 * LINE_HEIGHT_FACTOR]]);
        assert_eq!(operations.iter().filter(|op| op.operator == "T*").count(), 1);
        assert_eq!(&shown_text(&operations)[1..], &[b"first".to_vec(), b"second".to_vec()]);
    }

    #[test]
    fn drawing_outside_the_document_is_an_error() {
        let mut doc = LopdfExportDocument::load(&sample_pdf(&[LETTER])).expect("load");
        let err = doc.draw_text(1, &draw("x", 0.0, 0.0)).expect_err("no second page");

        assert!(matches!(err, PdfEngineError::PageOutOfRange { page: 1, page_count: 1 }));
    }

    #[test]
    fn saving_without_draws_keeps_pages_intact() {
        let mut doc = LopdfExportDocument::load(&sample_pdf(&[LETTER, A5])).expect("load");
        let bytes = doc.save().expect("save");

        let reloaded = LopdfExportDocument::load(&bytes).expect("reload");
        assert_eq!(reloaded.page_heights(), vec![792.0, 595.0]);
        assert_eq!(shown_text(&page_operations(&bytes, 2)), vec![b"Page 2".to_vec()]);
    }

    #[test]
    fn win_ansi_keeps_latin1_and_substitutes_the_rest() {
        assert_eq!(encode_win_ansi("Café – ok"), (b"Caf\xe9 \x96 ok".to_vec(), 0));
        assert_eq!(encode_win_ansi("日本\tx"), (b"?? x".to_vec(), 2));
    }
}
