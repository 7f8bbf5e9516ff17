use crate::annotation::{AnnotationId, AnnotationPatch, Color, Preferences};
use crate::store::AnnotationStore;
use serde::{Deserialize, Serialize};
use viewer_core::{DragSession, Point, ViewState};

pub const MIN_PANEL_FONT_SIZE: f32 = 8.0;
pub const MAX_PANEL_FONT_SIZE: f32 = 72.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoadState {
    Loading,
    Loaded,
    Failed { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Key {
    Enter,
    Escape,
    Delete,
    Other,
}

/// Everything tied to one opened file. Replaced wholesale when another file
/// is opened.
#[derive(Debug, Clone)]
pub struct EditorSession {
    file_name: String,
    load_state: LoadState,
    view: ViewState,
    store: AnnotationStore,
    drag: DragSession<AnnotationId>,
}

impl EditorSession {
    pub fn open(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            load_state: LoadState::Loading,
            view: ViewState::default(),
            store: AnnotationStore::new(),
            drag: DragSession::new(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn load_state(&self) -> &LoadState {
        &self.load_state
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn drag(&self) -> &DragSession<AnnotationId> {
        &self.drag
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_active()
    }

    pub fn current_page(&self) -> u32 {
        self.view.current_page()
    }

    pub fn visible_annotations(&self) -> impl Iterator<Item = &crate::Annotation> + '_ {
        self.store.visible_on(self.view.current_page())
    }

    /// Ends whatever edit session is open, as if the text box lost focus.
    fn blur(&mut self) {
        if let Some(editing) = self.store.editing() {
            self.store.end_edit(editing);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum SessionAction {
    DocumentLoaded { page_count: u32 },
    DocumentFailed { message: String },
    BeginPlacement,
    CancelPlacement,
    PageClick { x: f32, y: f32 },
    Select { id: Option<AnnotationId> },
    Update { id: AnnotationId, patch: AnnotationPatch },
    Delete { id: AnnotationId },
    BeginEdit { id: AnnotationId },
    EndEdit { id: AnnotationId },
    SetText { id: AnnotationId, text: String },
    SetFontSize { id: AnnotationId, size: f32 },
    SetColor { id: AnnotationId, color: Color },
    PointerDown { id: AnnotationId, pointer: Point, page_origin: Point },
    PointerMove { pointer: Point, page_origin: Point },
    PointerUp,
    KeyPress { key: Key, #[serde(default)] shift: bool },
    NextPage,
    PreviousPage,
    GoToPage { page: u32 },
    ZoomIn,
    ZoomOut,
}

pub fn apply_session_action(
    session: &mut EditorSession,
    action: SessionAction,
    preferences: &Preferences,
) {
    match action {
        SessionAction::DocumentLoaded { page_count } => {
            session.view.set_total_pages(page_count);
            session.load_state = LoadState::Loaded;
        }
        SessionAction::DocumentFailed { message } => {
            tracing::warn!(file = %session.file_name, %message, "document failed to load");
            session.load_state = LoadState::Failed { message };
        }
        SessionAction::BeginPlacement => session.store.begin_placement(),
        SessionAction::CancelPlacement => session.store.cancel_placement(),
        SessionAction::PageClick { x, y } => {
            if session.store.is_placing() {
                session.blur();
                let page = session.view.current_page();
                session.store.place_at(page, x, y, preferences);
            } else {
                session.store.select(None);
            }
        }
        SessionAction::Select { id } => {
            if id.is_some_and(|id| !session.store.contains(id)) {
                return;
            }
            if session.store.editing().is_some_and(|editing| Some(editing) != id) {
                session.blur();
            }
            session.store.select(id);
        }
        SessionAction::Update { id, patch } => session.store.update(id, &patch),
        SessionAction::Delete { id } => {
            if session.drag.target() == Some(id) {
                session.drag.end();
            }
            session.store.delete(id);
        }
        SessionAction::BeginEdit { id } => {
            if !session.store.contains(id) {
                return;
            }
            if session.store.editing().is_some_and(|editing| editing != id) {
                session.blur();
            }
            session.store.begin_edit(id);
        }
        SessionAction::EndEdit { id } => session.store.end_edit(id),
        SessionAction::SetText { id, text } => {
            session.store.update(id, &AnnotationPatch::text(text));
        }
        SessionAction::SetFontSize { id, size } => {
            if size.is_finite() {
                let size = size.round().clamp(MIN_PANEL_FONT_SIZE, MAX_PANEL_FONT_SIZE);
                session.store.update(id, &AnnotationPatch::font_size(size));
            }
        }
        SessionAction::SetColor { id, color } => {
            session.store.update(id, &AnnotationPatch::color(color));
        }
        SessionAction::PointerDown { id, pointer, page_origin } => {
            pointer_down(session, id, pointer, page_origin);
        }
        SessionAction::PointerMove { pointer, page_origin } => {
            let Some((id, position)) = session.drag.track(pointer, page_origin) else {
                return;
            };

            if session.store.contains(id) {
                session.store.update(id, &AnnotationPatch::position(position.x, position.y));
            } else {
                session.drag.end();
            }
        }
        SessionAction::PointerUp => {
            if let Some(id) = session.drag.end() {
                tracing::debug!(%id, "drag finished");
            }
        }
        SessionAction::KeyPress { key, shift } => key_press(session, key, shift),
        SessionAction::NextPage => {
            let changed = session.view.next_page();
            after_page_change(session, changed);
        }
        SessionAction::PreviousPage => {
            let changed = session.view.previous_page();
            after_page_change(session, changed);
        }
        SessionAction::GoToPage { page } => {
            let changed = session.view.go_to_page(page);
            after_page_change(session, changed);
        }
        SessionAction::ZoomIn => session.view.zoom_in(),
        SessionAction::ZoomOut => session.view.zoom_out(),
    }
}

fn pointer_down(session: &mut EditorSession, id: AnnotationId, pointer: Point, page_origin: Point) {
    if session.store.is_editing(id) {
        return;
    }
    let Some(annotation) = session.store.get(id) else {
        return;
    };

    let origin = page_origin + Point::new(annotation.x, annotation.y);
    let was_selected = session.store.selected() == Some(id);

    if session.store.editing().is_some() {
        session.blur();
    }
    session.store.select(Some(id));

    if was_selected {
        session.drag.begin(id, pointer, origin);
        tracing::debug!(%id, "drag started");
    }
}

fn key_press(session: &mut EditorSession, key: Key, shift: bool) {
    if key == Key::Escape && session.store.is_placing() {
        session.store.cancel_placement();
        return;
    }

    if let Some(editing) = session.store.editing() {
        match key {
            Key::Enter if !shift => session.store.end_edit(editing),
            Key::Escape => session.store.end_edit(editing),
            _ => {}
        }
        return;
    }

    if key == Key::Delete {
        if let Some(selected) = session.store.selected() {
            session.store.delete(selected);
        }
    }
}

fn after_page_change(session: &mut EditorSession, changed: bool) {
    if !changed {
        return;
    }

    session.drag.end();
    session.blur();
    session.store.select(None);
}
