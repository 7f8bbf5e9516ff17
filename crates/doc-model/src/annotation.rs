use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_PLACEHOLDER_TEXT: &str = "New Text";
pub const DEFAULT_FONT_SIZE: f32 = 16.0;

/// Stable identifier for an annotation within one store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(pub u64);

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ColorParseError {
    #[error("color must start with '#': {0:?}")]
    MissingHash(String),
    #[error("color must have 3 or 6 hex digits: {0:?}")]
    BadLength(String),
    #[error("invalid hex digit in color {0:?}")]
    BadDigit(String),
}

/// Opaque RGB text color, written as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Channels scaled to `0.0..=1.0`.
    pub fn to_normalized(self) -> [f32; 3] {
        [f32::from(self.r) / 255.0, f32::from(self.g) / 255.0, f32::from(self.b) / 255.0]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let Some(hex) = trimmed.strip_prefix('#') else {
            return Err(ColorParseError::MissingHash(value.to_owned()));
        };

        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ColorParseError::BadDigit(value.to_owned()));
        }

        let channel = |digits: &str| {
            u8::from_str_radix(digits, 16).map_err(|_| ColorParseError::BadDigit(value.to_owned()))
        };

        match hex.len() {
            6 => Ok(Color::rgb(channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?)),
            3 => {
                let r = channel(&hex[0..1])?;
                let g = channel(&hex[1..2])?;
                let b = channel(&hex[2..3])?;
                Ok(Color::rgb(r * 17, g * 17, b * 17))
            }
            _ => Err(ColorParseError::BadLength(value.to_owned())),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

/// A text label placed on one page of the document.
///
/// `x`/`y` are viewer pixels from the rendered page's top-left corner at the
/// zoom level in effect when they were recorded. They are not rescaled when
/// the zoom changes later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
    pub color: Color,
    pub page_number: u32,
}

impl Annotation {
    pub fn apply(&mut self, patch: &AnnotationPatch) {
        if let Some(text) = &patch.text {
            self.text.clone_from(text);
        }
        if let Some(x) = patch.x {
            self.x = x;
        }
        if let Some(y) = patch.y {
            self.y = y;
        }
        if let Some(font_size) = patch.font_size.filter(|size| is_valid_font_size(*size)) {
            self.font_size = font_size;
        }
        if let Some(color) = patch.color {
            self.color = color;
        }
    }

    pub fn has_blank_text(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Partial update for an [`Annotation`]. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Color>,
}

impl AnnotationPatch {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), ..Self::default() }
    }

    pub fn position(x: f32, y: f32) -> Self {
        Self { x: Some(x), y: Some(y), ..Self::default() }
    }

    pub fn font_size(font_size: f32) -> Self {
        Self { font_size: Some(font_size), ..Self::default() }
    }

    pub fn color(color: Color) -> Self {
        Self { color: Some(color), ..Self::default() }
    }
}

pub(crate) fn is_valid_font_size(size: f32) -> bool {
    size.is_finite() && size > 0.0
}

/// Defaults applied to newly placed annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub placeholder_text: String,
    pub default_font_size: f32,
    pub default_color: Color,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            placeholder_text: DEFAULT_PLACEHOLDER_TEXT.to_owned(),
            default_font_size: DEFAULT_FONT_SIZE,
            default_color: Color::BLACK,
        }
    }
}

impl Preferences {
    pub(crate) fn effective_font_size(&self) -> f32 {
        if is_valid_font_size(self.default_font_size) {
            self.default_font_size
        } else {
            DEFAULT_FONT_SIZE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Annotation {
        Annotation {
            id: AnnotationId(1),
            text: "hello".to_owned(),
            x: 10.0,
            y: 20.0,
            font_size: 16.0,
            color: Color::BLACK,
            page_number: 2,
        }
    }

    #[test]
    fn parses_long_and_short_hex_colors() {
        assert_eq!("#ff8000".parse::<Color>(), Ok(Color::rgb(255, 128, 0)));
        assert_eq!("#F80".parse::<Color>(), Ok(Color::rgb(255, 136, 0)));
        assert_eq!(Color::rgb(255, 128, 0).to_string(), "#ff8000");
    }

    #[test]
    fn rejects_malformed_colors() {
        assert!(matches!("ff8000".parse::<Color>(), Err(ColorParseError::MissingHash(_))));
        assert!(matches!("#ff80".parse::<Color>(), Err(ColorParseError::BadLength(_))));
        assert!(matches!("#gg0000".parse::<Color>(), Err(ColorParseError::BadDigit(_))));
        assert!(matches!("#ff00é".parse::<Color>(), Err(ColorParseError::BadDigit(_))));
    }

    #[test]
    fn color_serializes_as_hex_string() {
        let json = serde_json::to_string(&Color::rgb(0, 0, 255)).expect("serialize");
        assert_eq!(json, "\"#0000ff\"");

        let parsed: Color = serde_json::from_str("\"#00f\"").expect("deserialize");
        assert_eq!(parsed, Color::rgb(0, 0, 255));
    }

    #[test]
    fn normalized_channels_span_unit_range() {
        assert_eq!(Color::rgb(255, 0, 51).to_normalized(), [1.0, 0.0, 0.2]);
    }

    #[test]
    fn patch_merges_only_present_fields() {
        let mut annotation = sample();
        annotation.apply(&AnnotationPatch::position(5.0, 6.0));

        assert_eq!((annotation.x, annotation.y), (5.0, 6.0));
        assert_eq!(annotation.text, "hello");
        assert_eq!(annotation.font_size, 16.0);
        assert_eq!(annotation.page_number, 2);
        assert_eq!(annotation.id, AnnotationId(1));
    }

    #[test]
    fn patch_ignores_non_positive_font_size() {
        let mut annotation = sample();
        annotation.apply(&AnnotationPatch::font_size(0.0));
        annotation.apply(&AnnotationPatch::font_size(f32::NAN));
        assert_eq!(annotation.font_size, 16.0);

        annotation.apply(&AnnotationPatch::font_size(24.0));
        assert_eq!(annotation.font_size, 24.0);
    }

    #[test]
    fn whitespace_only_text_counts_as_blank() {
        let mut annotation = sample();
        annotation.text = " \n\t ".to_owned();
        assert!(annotation.has_blank_text());
    }
}
