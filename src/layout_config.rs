//! Layout config – the intermediate representation between layout computation
//! and PDF rendering. This is the "frozen" structure that encodes exactly what
//! goes on each page of a rendered invoice.
//!
//! Two renders of the same HTML under the same configuration produce equal
//! layouts, which makes the serialized form a convenient fingerprint.

use serde::{Deserialize, Serialize};

use crate::css::{A4_HEIGHT_PT, A4_WIDTH_PT};

/// A complete document layout ready for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Document title embedded in the PDF metadata.
    #[serde(default = "LayoutConfig::default_title")]
    pub title: String,
    /// Width of each page in PDF points (1 pt = 1/72 inch).
    pub page_width_pt: f32,
    /// Height of each page in PDF points.
    pub page_height_pt: f32,
    /// Ordered list of pages.
    pub pages: Vec<PageLayout>,
}

/// One page of content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_index: usize,
    pub boxes: Vec<LayoutBox>,
}

/// A positioned rectangle with optional content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutBox {
    /// Position relative to page top-left, in points.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,

    /// Visual styling
    pub background_color: Option<[f32; 4]>,
    pub border: Option<BorderStyle>,

    /// Content (mutually exclusive in practice)
    pub text: Option<TextContent>,
    pub image: Option<ImageContent>,

    /// Children (nested boxes)
    pub children: Vec<LayoutBox>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorderStyle {
    pub width: f32,
    pub color: [f32; 4],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    /// Pre-wrapped lines of text.
    pub lines: Vec<TextLine>,
    pub font_family: String,
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    pub color: [f32; 4],
    pub line_height: f32,
    /// Distance from the top of a line to its baseline.
    #[serde(default)]
    pub baseline: f32,
    /// Alignment already applied through each line's `x_offset`.
    pub text_align: LineAlign,
    pub underline: bool,
    /// List bullet/number prefix (e.g. "• " or "1. ")
    pub list_marker: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    /// X offset within the layout box (for alignment)
    pub x_offset: f32,
    /// Y offset from the top of the text content area
    pub y_offset: f32,
}

/// Horizontal alignment of a text box, kept for consumers of the JSON form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineAlign {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageContent {
    pub src: String,
    pub width: f32,
    pub height: f32,
}

impl LayoutConfig {
    /// Create an empty A4 portrait layout.
    pub fn a4() -> Self {
        Self {
            title: Self::default_title(),
            page_width_pt: A4_WIDTH_PT,
            page_height_pt: A4_HEIGHT_PT,
            pages: Vec::new(),
        }
    }

    pub(crate) fn default_title() -> String {
        "Fattura elettronica".to_string()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialise from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl LayoutBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            background_color: None,
            border: None,
            text: None,
            image: None,
            children: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_keeps_every_field() {
        let mut config = LayoutConfig::a4();
        let mut b = LayoutBox::new(28.35, 28.35, 100.0, 12.0);
        b.border = Some(BorderStyle {
            width: 0.5,
            color: [0.0, 0.0, 0.0, 1.0],
        });
        config.pages.push(PageLayout {
            page_index: 0,
            boxes: vec![b],
        });

        let json = config.to_json().unwrap();
        let back = LayoutConfig::from_json(&json).unwrap();
        assert_eq!(back.title, "Fattura elettronica");
        assert_eq!(back.page_count(), 1);
        assert_eq!(back.to_json().unwrap(), json);
    }

    #[test]
    fn missing_title_gets_the_default() {
        let json = r#"{"page_width_pt":595.28,"page_height_pt":841.89,"pages":[]}"#;
        let config = LayoutConfig::from_json(json).unwrap();
        assert_eq!(config.title, LayoutConfig::default_title());
        assert!(LayoutConfig::from_json("{").is_err());
    }
}
