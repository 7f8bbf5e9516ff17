use crate::annotation::{Annotation, AnnotationId, AnnotationPatch, Preferences};

/// Annotations for the open document plus the selection and edit flags.
///
/// Annotations are kept in creation order. Every operation that names an id
/// the store does not know is a silent no-op: stale ids show up legitimately
/// from double-fired UI events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationStore {
    annotations: Vec<Annotation>,
    selected: Option<AnnotationId>,
    editing: Option<AnnotationId>,
    placing: bool,
    next_id: u64,
}

impl AnnotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn get(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.iter().find(|annotation| annotation.id == id)
    }

    pub fn contains(&self, id: AnnotationId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn selected(&self) -> Option<AnnotationId> {
        self.selected
    }

    pub fn selected_annotation(&self) -> Option<&Annotation> {
        self.get(self.selected?)
    }

    pub fn editing(&self) -> Option<AnnotationId> {
        self.editing
    }

    pub fn is_editing(&self, id: AnnotationId) -> bool {
        self.editing == Some(id)
    }

    pub fn is_placing(&self) -> bool {
        self.placing
    }

    pub fn begin_placement(&mut self) {
        self.placing = true;
    }

    pub fn cancel_placement(&mut self) {
        self.placing = false;
    }

    /// Consumes placement mode and creates an annotation at `(x, y)`.
    ///
    /// The new annotation is selected and starts in the editing sub-state.
    /// Returns `None` without touching anything when not in placement mode.
    pub fn place_at(
        &mut self,
        page_number: u32,
        x: f32,
        y: f32,
        preferences: &Preferences,
    ) -> Option<AnnotationId> {
        if !self.placing {
            return None;
        }

        let id = self.new_id();
        self.annotations.push(Annotation {
            id,
            text: preferences.placeholder_text.clone(),
            x,
            y,
            font_size: preferences.effective_font_size(),
            color: preferences.default_color,
            page_number,
        });

        self.selected = Some(id);
        self.editing = Some(id);
        self.placing = false;

        tracing::debug!(%id, page_number, x, y, "placed annotation");
        Some(id)
    }

    pub fn select(&mut self, id: Option<AnnotationId>) {
        match id {
            None => self.selected = None,
            Some(id) if self.contains(id) => self.selected = Some(id),
            Some(_) => {}
        }
    }

    pub fn update(&mut self, id: AnnotationId, patch: &AnnotationPatch) {
        if let Some(annotation) = self.get_mut(id) {
            annotation.apply(patch);
        }
    }

    pub fn delete(&mut self, id: AnnotationId) -> Option<Annotation> {
        let index = self.annotations.iter().position(|annotation| annotation.id == id)?;
        let removed = self.annotations.remove(index);

        if self.selected == Some(id) {
            self.selected = None;
        }
        if self.editing == Some(id) {
            self.editing = None;
        }

        tracing::debug!(%id, "deleted annotation");
        Some(removed)
    }

    pub fn begin_edit(&mut self, id: AnnotationId) {
        if self.contains(id) {
            self.editing = Some(id);
        }
    }

    /// Finishes an edit session, dropping the annotation if its text is blank.
    pub fn end_edit(&mut self, id: AnnotationId) {
        if self.editing == Some(id) {
            self.editing = None;
        }

        if self.get(id).is_some_and(Annotation::has_blank_text) {
            tracing::debug!(%id, "discarding annotation left empty after edit");
            self.delete(id);
        }
    }

    pub fn visible_on(&self, page_number: u32) -> impl Iterator<Item = &Annotation> + '_ {
        self.annotations.iter().filter(move |annotation| annotation.page_number == page_number)
    }

    fn get_mut(&mut self, id: AnnotationId) -> Option<&mut Annotation> {
        self.annotations.iter_mut().find(|annotation| annotation.id == id)
    }

    fn new_id(&mut self) -> AnnotationId {
        self.next_id += 1;
        AnnotationId(self.next_id)
    }
}
