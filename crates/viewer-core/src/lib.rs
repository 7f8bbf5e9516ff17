use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

pub const MIN_ZOOM_PERCENT: u16 = 50;
pub const MAX_ZOOM_PERCENT: u16 = 300;
pub const ZOOM_STEP_PERCENT: u16 = 10;

/// A position in viewer pixel space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Tracks one press-and-hold gesture on an annotation.
///
/// The grab offset is the distance between the pointer and the annotation's
/// top-left corner at press time, so moves keep the annotation under the
/// cursor at the same relative spot. Positions produced by [`track`] are
/// relative to the page container, not to the annotation's own box.
///
/// [`track`]: DragSession::track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSession<T> {
    state: Option<(T, Point)>,
}

impl<T> Default for DragSession<T> {
    fn default() -> Self {
        Self { state: None }
    }
}

impl<T: Copy + PartialEq> DragSession<T> {
    pub fn new() -> Self {
        Self { state: None }
    }

    pub fn begin(&mut self, target: T, pointer: Point, annotation_origin: Point) {
        self.state = Some((target, pointer - annotation_origin));
    }

    pub fn track(&self, pointer: Point, page_origin: Point) -> Option<(T, Point)> {
        let (target, grab_offset) = self.state?;
        Some((target, pointer - page_origin - grab_offset))
    }

    pub fn end(&mut self) -> Option<T> {
        self.state.take().map(|(target, _)| target)
    }

    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }

    pub fn target(&self) -> Option<T> {
        self.state.map(|(target, _)| target)
    }

    pub fn grab_offset(&self) -> Option<Point> {
        self.state.map(|(_, offset)| offset)
    }
}

/// Page cursor and zoom level for the displayed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewState {
    current_page: u32,
    total_pages: u32,
    zoom_percent: u16,
}

impl Default for ViewState {
    fn default() -> Self {
        Self { current_page: 1, total_pages: 1, zoom_percent: 100 }
    }
}

impl ViewState {
    pub fn new(total_pages: u32) -> Self {
        Self { total_pages: total_pages.max(1), ..Self::default() }
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn zoom_percent(&self) -> u16 {
        self.zoom_percent
    }

    pub fn scale(&self) -> f32 {
        f32::from(self.zoom_percent) / 100.0
    }

    pub fn set_total_pages(&mut self, total_pages: u32) {
        self.total_pages = total_pages.max(1);
        self.current_page = clamp_page(self.current_page, self.total_pages);
    }

    /// Returns `true` when the displayed page changed.
    pub fn go_to_page(&mut self, page: u32) -> bool {
        let target = clamp_page(page, self.total_pages);
        let changed = target != self.current_page;
        self.current_page = target;
        changed
    }

    pub fn next_page(&mut self) -> bool {
        self.go_to_page(self.current_page.saturating_add(1))
    }

    pub fn previous_page(&mut self) -> bool {
        self.go_to_page(self.current_page.saturating_sub(1))
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom_percent(self.zoom_percent.saturating_add(ZOOM_STEP_PERCENT));
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom_percent(self.zoom_percent.saturating_sub(ZOOM_STEP_PERCENT));
    }

    pub fn set_zoom_percent(&mut self, zoom_percent: u16) {
        self.zoom_percent = clamp_zoom_percent(zoom_percent);
    }

    pub fn page_label(&self) -> String {
        format!("{} / {}", self.current_page, self.total_pages)
    }

    pub fn zoom_label(&self) -> String {
        format!("{}%", self.zoom_percent)
    }
}

pub fn clamp_page(page: u32, total_pages: u32) -> u32 {
    page.clamp(1, total_pages.max(1))
}

pub fn clamp_zoom_percent(zoom_percent: u16) -> u16 {
    zoom_percent.clamp(MIN_ZOOM_PERCENT, MAX_ZOOM_PERCENT)
}

/// Converts a free-form scale (e.g. `1.25`) to a clamped zoom percent.
pub fn zoom_percent_for_scale(scale: f32) -> u16 {
    if !scale.is_finite() || scale <= 0.0 {
        return 100;
    }

    let percent = (scale * 100.0).round().clamp(0.0, f32::from(u16::MAX)) as u16;
    clamp_zoom_percent(percent)
}

/// Pixel dimensions of a page rendered at `scale`.
pub fn scaled_page_px(width_pt: f32, height_pt: f32, scale: f32) -> (u32, u32) {
    let scale = if scale <= 0.0 || !scale.is_finite() { 1.0 } else { scale };
    let width = (width_pt * scale).round().max(1.0) as u32;
    let height = (height_pt * scale).round().max(1.0) as u32;
    (width, height)
}
