//! Burns annotations into a PDF.
//!
//! Annotations are recorded in viewer space (origin top-left, y down). PDF
//! pages use origin bottom-left with y up, so each annotation is flipped
//! against its page height before being handed to an [`ExportDocument`].

use doc_model::{Annotation, AnnotationId, Color};
use pdf_engine::{ExportDocument, LopdfExportDocument, PdfEngineError, TextDraw};
use std::fmt;

pub const EXPORT_PREFIX: &str = "edited-";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to load source PDF: {0}")]
    Load(#[source] PdfEngineError),
    #[error("failed to draw annotation {id}: {source}")]
    Draw {
        id: AnnotationId,
        #[source]
        source: PdfEngineError,
    },
    #[error("failed to write PDF: {0}")]
    Save(#[source] PdfEngineError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawPosition {
    pub x: f32,
    pub y: f32,
}

/// Maps a viewer-space position to the draw origin on a page `page_height`
/// units tall.
///
/// The font size is subtracted because the viewer records the text box's
/// top-left corner while the PDF text origin sits at the baseline end of
/// the glyph box.
pub fn to_export_space(annotation: &Annotation, page_height: f32) -> DrawPosition {
    DrawPosition { x: annotation.x, y: page_height - annotation.y - annotation.font_size }
}

pub fn color_to_rgb(color: Color) -> [f32; 3] {
    color.to_normalized()
}

/// Annotations grouped by ascending page, creation order kept within a page.
pub fn export_order(annotations: &[Annotation]) -> Vec<&Annotation> {
    let mut ordered: Vec<&Annotation> = annotations.iter().collect();
    ordered.sort_by_key(|annotation| annotation.page_number);
    ordered
}

pub fn exported_file_name(original: &str) -> String {
    format!("{EXPORT_PREFIX}{original}")
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedDraw {
    pub id: AnnotationId,
    pub page_number: u32,
    pub color: Color,
    pub draw: TextDraw,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportPlan {
    pub page_count: u32,
    pub draws: Vec<PlannedDraw>,
    pub skipped: Vec<(AnnotationId, u32)>,
}

impl fmt::Display for ExportPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = Vec::with_capacity(self.draws.len() + self.skipped.len());

        for planned in &self.draws {
            lines.push(format!(
                "page {}: ({}, {}) {}pt {} {:?}",
                planned.page_number,
                planned.draw.x,
                planned.draw.y,
                planned.draw.size,
                planned.color,
                planned.draw.text
            ));
        }
        for (id, page_number) in &self.skipped {
            lines.push(format!("skipped {id} (page {page_number} of {})", self.page_count));
        }

        f.write_str(&lines.join("\n"))
    }
}

/// Works out every draw call for `annotations` against pages of the given
/// heights. Annotations pointing past the last page are skipped, not fatal.
pub fn plan_export(annotations: &[Annotation], page_heights: &[f32]) -> ExportPlan {
    let page_count = page_heights.len() as u32;
    let mut plan = ExportPlan { page_count, ..ExportPlan::default() };

    for annotation in export_order(annotations) {
        let page_height = annotation
            .page_number
            .checked_sub(1)
            .and_then(|index| page_heights.get(index as usize));

        let Some(&page_height) = page_height else {
            tracing::warn!(
                id = %annotation.id,
                page_number = annotation.page_number,
                page_count,
                "skipping annotation outside the document"
            );
            plan.skipped.push((annotation.id, annotation.page_number));
            continue;
        };

        let position = to_export_space(annotation, page_height);
        plan.draws.push(PlannedDraw {
            id: annotation.id,
            page_number: annotation.page_number,
            color: annotation.color,
            draw: TextDraw {
                text: annotation.text.clone(),
                x: position.x,
                y: position.y,
                size: annotation.font_size,
                rgb: color_to_rgb(annotation.color),
            },
        });
    }

    plan
}

pub fn apply_plan<D>(document: &mut D, plan: &ExportPlan) -> Result<(), ExportError>
where
    D: ExportDocument + ?Sized,
{
    for planned in &plan.draws {
        document
            .draw_text(planned.page_number - 1, &planned.draw)
            .map_err(|source| ExportError::Draw { id: planned.id, source })?;
    }

    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportOutcome {
    pub bytes: Vec<u8>,
    pub drawn: usize,
    pub skipped: Vec<AnnotationId>,
}

/// Draws `annotations` onto `document` and serializes it.
pub fn export_into<D>(document: &mut D, annotations: &[Annotation]) -> Result<ExportOutcome, ExportError>
where
    D: ExportDocument + ?Sized,
{
    let plan = plan_export(annotations, &document.page_heights());
    apply_plan(document, &plan)?;
    let bytes = document.save().map_err(ExportError::Save)?;

    tracing::info!(
        drawn = plan.draws.len(),
        skipped = plan.skipped.len(),
        bytes = bytes.len(),
        "exported annotated PDF"
    );

    Ok(ExportOutcome {
        bytes,
        drawn: plan.draws.len(),
        skipped: plan.skipped.into_iter().map(|(id, _)| id).collect(),
    })
}

/// Loads `source`, burns in `annotations` and returns the new file's bytes.
///
/// Annotations are only borrowed, so a failed export can be retried with
/// the same state.
pub fn export_pdf(source: &[u8], annotations: &[Annotation]) -> Result<ExportOutcome, ExportError> {
    let mut document = LopdfExportDocument::load(source).map_err(ExportError::Load)?;
    export_into(&mut document, annotations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use doc_model::{apply_session_action, EditorSession, Key, Preferences, SessionAction};
    use lopdf::content::Content;
    use lopdf::Document;
    use pdf_engine::fixtures::sample_pdf;
    use pdf_engine::PageSize;

    const LETTER: PageSize = PageSize { width_pt: 612.0, height_pt: 792.0 };
    const A5: PageSize = PageSize { width_pt: 420.0, height_pt: 595.0 };

    fn annotation(id: u64, page_number: u32, x: f32, y: f32, font_size: f32, text: &str) -> Annotation {
        Annotation {
            id: AnnotationId(id),
            text: text.to_owned(),
            x,
            y,
            font_size,
            color: Color::BLACK,
            page_number,
        }
    }

    #[derive(Default)]
    struct RecordingDocument {
        heights: Vec<f32>,
        calls: Vec<(u32, TextDraw)>,
        fail_save: bool,
    }

    impl ExportDocument for RecordingDocument {
        fn page_heights(&self) -> Vec<f32> {
            self.heights.clone()
        }

        fn draw_text(&mut self, page_index: u32, draw: &TextDraw) -> Result<(), PdfEngineError> {
            self.calls.push((page_index, draw.clone()));
            Ok(())
        }

        fn save(&mut self) -> Result<Vec<u8>, PdfEngineError> {
            if self.fail_save {
                return Err(PdfEngineError::Backend("disk full".to_owned()));
            }
            Ok(b"%PDF-stub".to_vec())
        }
    }

    #[test]
    fn placement_at_100_50_lands_at_100_726_on_letter() {
        let position = to_export_space(&annotation(1, 1, 100.0, 50.0, 16.0, "x"), 792.0);
        assert_eq!(position, DrawPosition { x: 100.0, y: 726.0 });
    }

    #[test]
    fn flipped_y_plus_viewer_y_plus_size_equals_height() {
        for (y, size, height) in [(0.0, 8.0, 792.0), (50.0, 16.0, 792.0), (333.0, 72.0, 595.0)] {
            let position = to_export_space(&annotation(1, 1, 0.0, y, size, "x"), height);
            assert_eq!(position.y + y + size, height);
        }
    }

    #[test]
    fn export_order_is_stable_by_page() {
        let annotations = vec![
            annotation(1, 2, 0.0, 0.0, 16.0, "a"),
            annotation(2, 1, 0.0, 0.0, 16.0, "b"),
            annotation(3, 2, 0.0, 0.0, 16.0, "c"),
            annotation(4, 1, 0.0, 0.0, 16.0, "d"),
        ];

        let ids: Vec<u64> = export_order(&annotations).iter().map(|a| a.id.0).collect();
        assert_eq!(ids, vec![2, 4, 1, 3]);
    }

    #[test]
    fn annotations_past_the_last_page_are_skipped() {
        let annotations = vec![
            annotation(1, 1, 0.0, 0.0, 16.0, "kept"),
            annotation(2, 3, 0.0, 0.0, 16.0, "gone"),
            annotation(3, 0, 0.0, 0.0, 16.0, "invalid"),
        ];

        let plan = plan_export(&annotations, &[792.0, 792.0]);
        assert_eq!(plan.draws.len(), 1);
        assert_eq!(plan.skipped, vec![(AnnotationId(3), 0), (AnnotationId(2), 3)]);
    }

    #[test]
    fn color_is_passed_as_normalized_triple() {
        let mut red = annotation(1, 1, 0.0, 0.0, 16.0, "red");
        red.color = Color::rgb(255, 0, 0);

        let plan = plan_export(&[red], &[792.0]);
        assert_eq!(plan.draws[0].draw.rgb, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn plan_describes_every_draw_call() {
        let mut multi_line = annotation(3, 1, 0.0, 0.0, 16.0, "Line1\nLine2");
        multi_line.color = Color::rgb(255, 0, 0);
        let annotations = vec![
            annotation(1, 2, 10.0, 20.0, 12.0, "Initials"),
            annotation(2, 1, 100.0, 50.0, 16.0, "Approved"),
            multi_line,
            annotation(4, 3, 0.0, 0.0, 16.0, "Lost"),
        ];

        let plan = plan_export(&annotations, &[792.0, 595.0]);

        insta::assert_snapshot!(plan.to_string(), @r#"
        page 1: (100, 726) 16pt #000000 "Approved"
        page 1: (0, 776) 16pt #ff0000 "Line1\nLine2"
        page 2: (10, 563) 12pt #000000 "Initials"
        skipped #4 (page 3 of 2)
        "#);
    }

    #[test]
    fn export_calls_collaborator_with_transformed_coordinates() {
        let mut document = RecordingDocument { heights: vec![792.0], ..RecordingDocument::default() };

        let outcome = export_into(&mut document, &[annotation(1, 1, 100.0, 50.0, 16.0, "Hi")])
            .expect("export succeeds");

        assert_eq!(outcome.drawn, 1);
        assert_eq!(document.calls.len(), 1);
        let (page_index, draw) = &document.calls[0];
        assert_eq!(*page_index, 0);
        assert_eq!((draw.x, draw.y, draw.size), (100.0, 726.0, 16.0));
        assert_eq!(draw.text, "Hi");
    }

    #[test]
    fn save_failure_surfaces_as_single_error_and_keeps_annotations() {
        let annotations = vec![annotation(1, 1, 1.0, 2.0, 16.0, "keep me")];
        let snapshot = annotations.clone();
        let mut document =
            RecordingDocument { heights: vec![792.0], fail_save: true, ..RecordingDocument::default() };

        let err = export_into(&mut document, &annotations).expect_err("save fails");
        assert!(matches!(err, ExportError::Save(_)));
        assert_eq!(annotations, snapshot);
    }

    #[test]
    fn corrupt_source_is_a_load_error() {
        let err = export_pdf(b"not a pdf", &[]).expect_err("corrupt input");
        assert!(matches!(err, ExportError::Load(_)));
    }

    #[test]
    fn exported_name_gets_prefix() {
        assert_eq!(exported_file_name("contract.pdf"), "edited-contract.pdf");
    }

    #[test]
    fn session_to_pdf_end_to_end() {
        let source = sample_pdf(&[LETTER, A5]);
        let preferences = Preferences::default();
        let mut session = EditorSession::open("contract.pdf");

        let script = vec![
            SessionAction::DocumentLoaded { page_count: 2 },
            SessionAction::GoToPage { page: 2 },
            SessionAction::BeginPlacement,
            SessionAction::PageClick { x: 40.0, y: 100.0 },
            SessionAction::SetText { id: AnnotationId(1), text: "Signed".to_owned() },
            SessionAction::KeyPress { key: Key::Enter, shift: false },
            SessionAction::SetColor { id: AnnotationId(1), color: Color::rgb(0, 0, 255) },
        ];
        for action in script {
            apply_session_action(&mut session, action, &preferences);
        }

        let outcome = export_pdf(&source, session.store().annotations()).expect("export succeeds");
        assert_eq!(outcome.drawn, 1);

        let doc = Document::load_mem(&outcome.bytes).expect("output parses");
        let page_id = doc.get_pages()[&2];
        let content = doc.get_page_content(page_id).expect("content");
        let operations = Content::decode(&content).expect("decodes").operations;

        let td = operations
            .iter()
            .filter(|op| op.operator == "Td")
            .last()
            .expect("annotation Td");
        let coords: Vec<f32> = td.operands.iter().map(|o| o.as_float().expect("number")).collect();
        assert_eq!(coords, vec![40.0, 595.0 - 100.0 - 16.0]);

        let rg = operations.iter().find(|op| op.operator == "rg").expect("fill color");
        let rgb: Vec<f32> = rg.operands.iter().map(|o| o.as_float().expect("number")).collect();
        assert_eq!(rgb, vec![0.0, 0.0, 1.0]);
    }
}
