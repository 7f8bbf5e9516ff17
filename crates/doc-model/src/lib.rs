//! Annotation model and editor session state.
//!
//! All mutation happens synchronously through [`AnnotationStore`] methods or
//! [`apply_session_action`], one user event at a time.

mod annotation;
mod session;
mod store;

pub use annotation::{
    Annotation, AnnotationId, AnnotationPatch, Color, ColorParseError, Preferences,
    DEFAULT_FONT_SIZE, DEFAULT_PLACEHOLDER_TEXT,
};
pub use session::{
    apply_session_action, EditorSession, Key, LoadState, SessionAction, MAX_PANEL_FONT_SIZE,
    MIN_PANEL_FONT_SIZE,
};
pub use store::AnnotationStore;
pub use viewer_core::{Point, ViewState};
