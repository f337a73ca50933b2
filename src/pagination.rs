//! Pagination – splits a flat list of positioned boxes into pages.
//!
//! Handles:
//! - page boundaries for the configured page box
//! - page-break-before / page-break-after hints
//! - table row splitting across pages
//! - horizontal text alignment inside each text box

use crate::fonts::FontMetrics;
use crate::layout::{BoxContent, PositionedBox};
use crate::layout_config::{
    BorderStyle, ImageContent, LayoutBox, LayoutConfig, LineAlign, PageLayout, TextContent,
    TextLine,
};
use crate::style::{self, ComputedStyle, TextAlign};

/// Containers taller than a page are opened up so their children can land
/// on different pages. Text, images and list items are kept whole.
fn flatten_for_pagination<'a>(
    boxes: &'a [PositionedBox],
    content_height: f32,
    out: &mut Vec<&'a PositionedBox>,
) {
    for pbox in boxes {
        let container = matches!(pbox.content, BoxContent::None) && !pbox.children.is_empty();
        if container && pbox.height > content_height {
            flatten_for_pagination(&pbox.children, content_height, out);
        } else {
            out.push(pbox);
        }
    }
}

/// Page-filling state. Box `y` values are document coordinates; `origin`
/// is the document `y` shown at the top of the current page.
struct Pager<'f> {
    pages: Vec<PageLayout>,
    current: Vec<LayoutBox>,
    origin: f32,
    content_height: f32,
    margin: f32,
    fonts: &'f FontMetrics,
}

impl<'f> Pager<'f> {
    fn new(content_height: f32, margin: f32, fonts: &'f FontMetrics) -> Self {
        Self {
            pages: Vec::new(),
            current: Vec::new(),
            origin: 0.0,
            content_height,
            margin,
            fonts,
        }
    }

    /// Close the current page; the next one starts at document `y = origin`.
    fn break_page(&mut self, origin: f32) {
        let boxes = std::mem::take(&mut self.current);
        self.pages.push(PageLayout {
            page_index: self.pages.len(),
            boxes,
        });
        self.origin = origin;
    }

    fn overflows(&self, pbox: &PositionedBox) -> bool {
        let top = (pbox.y - self.origin).max(0.0);
        top + pbox.height > self.content_height && !self.current.is_empty()
    }

    fn place(&mut self, pbox: &PositionedBox) {
        let top = self.margin + (pbox.y - self.origin).max(0.0);
        self.current.push(build_layout_box(pbox, pbox.x, top, self.fonts));
    }

    fn add(&mut self, pbox: &PositionedBox) {
        if pbox.page_break_before && !self.current.is_empty() {
            self.break_page(pbox.y);
        }
        if self.overflows(pbox) {
            if pbox.is_table && !pbox.children.is_empty() && !pbox.page_break_inside_avoid {
                // Rows move to the next page one at a time.
                for row in &pbox.children {
                    if self.overflows(row) {
                        self.break_page(row.y);
                    }
                    self.place(row);
                }
                return;
            }
            self.break_page(pbox.y);
        }
        self.place(pbox);
        if pbox.page_break_after {
            self.break_page(pbox.y + pbox.height);
        }
    }

    fn finish(mut self) -> Vec<PageLayout> {
        if !self.current.is_empty() || self.pages.is_empty() {
            self.break_page(self.origin);
        }
        self.pages
    }
}

/// Lay `boxes` out on pages of `page_width` × `page_height` points. There
/// is always at least one page, even for an empty document.
pub fn paginate(
    boxes: &[PositionedBox],
    title: &str,
    page_width: f32,
    page_height: f32,
    page_margin: f32,
    fonts: &FontMetrics,
) -> LayoutConfig {
    let content_height = page_height - 2.0 * page_margin;
    let mut flat = Vec::new();
    flatten_for_pagination(boxes, content_height, &mut flat);

    let mut pager = Pager::new(content_height, page_margin, fonts);
    for pbox in flat {
        pager.add(pbox);
    }

    LayoutConfig {
        title: title.to_string(),
        page_width_pt: page_width,
        page_height_pt: page_height,
        pages: pager.finish(),
    }
}

fn rgba(c: &style::Color) -> [f32; 4] {
    [c.r, c.g, c.b, c.a]
}

fn line_align(align: TextAlign) -> LineAlign {
    match align {
        TextAlign::Left => LineAlign::Left,
        TextAlign::Center => LineAlign::Center,
        TextAlign::Right => LineAlign::Right,
    }
}

/// Text run settings shared by text boxes and list markers.
fn text_content(s: &ComputedStyle, lines: Vec<TextLine>, fonts: &FontMetrics) -> TextContent {
    TextContent {
        lines,
        font_family: s.font_family.clone(),
        font_size: s.font_size,
        bold: s.font_weight == style::FontWeight::Bold,
        italic: s.font_style == style::FontStyle::Italic,
        color: rgba(&s.color),
        line_height: fonts.line_height_px(s.font_size, s.line_height),
        baseline: fonts.baseline_offset(s.font_size, s.line_height),
        text_align: line_align(s.text_align),
        underline: s.text_decoration == style::TextDecoration::Underline,
        list_marker: None,
    }
}

/// Build the page box for `pbox` at page position (`x`, `y`). Children keep
/// their `x`; their `y` is shifted by the same amount as the parent's.
fn build_layout_box(pbox: &PositionedBox, x: f32, y: f32, fonts: &FontMetrics) -> LayoutBox {
    let s = &pbox.style;
    let mut lb = LayoutBox::new(x, y, pbox.width, pbox.height);

    if !s.background_color.is_transparent() {
        lb.background_color = Some(rgba(&s.background_color));
    }
    if s.border_width > 0.0 {
        lb.border = Some(BorderStyle {
            width: s.border_width,
            color: rgba(&s.border_color),
        });
    }

    match &pbox.content {
        BoxContent::Text { lines, .. } => {
            let bold = s.font_weight == style::FontWeight::Bold;
            let line_height = fonts.line_height_px(s.font_size, s.line_height);
            let lines = lines
                .iter()
                .enumerate()
                .map(|(i, line)| {
                    let slack =
                        (pbox.width - fonts.measure_text_width(line, s.font_size, bold)).max(0.0);
                    TextLine {
                        text: line.clone(),
                        x_offset: match s.text_align {
                            TextAlign::Left => 0.0,
                            TextAlign::Center => slack / 2.0,
                            TextAlign::Right => slack,
                        },
                        y_offset: i as f32 * line_height,
                    }
                })
                .collect();
            lb.text = Some(text_content(s, lines, fonts));
        }
        BoxContent::Image { src } => {
            lb.image = Some(ImageContent {
                src: src.clone(),
                width: pbox.width,
                height: pbox.height,
            });
        }
        BoxContent::ListItem { marker } => {
            // The marker is drawn left of the item; its text lives in the children.
            let mut text = text_content(s, Vec::new(), fonts);
            text.italic = false;
            text.underline = false;
            text.text_align = LineAlign::Left;
            text.list_marker = Some(marker.clone());
            lb.text = Some(text);
        }
        BoxContent::None => {}
    }

    lb.children = pbox
        .children
        .iter()
        .map(|child| build_layout_box(child, child.x, y + (child.y - pbox.y), fonts))
        .collect();
    lb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::{A4_HEIGHT_PT, A4_WIDTH_PT};
    use crate::dom::{normalize_tables, parse_html};
    use crate::layout::compute_layout;
    use crate::style::build_styled_tree;

    const MARGIN: f32 = 28.35;

    fn paginate_html(html: &str) -> LayoutConfig {
        let mut dom = parse_html(html);
        normalize_tables(&mut dom);
        let styled = build_styled_tree(&dom, None);
        let fonts = FontMetrics::default();
        let boxes = compute_layout(&styled, A4_WIDTH_PT, MARGIN, &fonts).unwrap();
        paginate(&boxes, "Fattura", A4_WIDTH_PT, A4_HEIGHT_PT, MARGIN, &fonts)
    }

    fn all_text(b: &LayoutBox, out: &mut Vec<TextContent>) {
        if let Some(t) = &b.text {
            out.push(t.clone());
        }
        for c in &b.children {
            all_text(c, out);
        }
    }

    #[test]
    fn single_page() {
        let config = paginate_html("<p>Short text</p>");
        assert_eq!(config.pages.len(), 1);
        assert_eq!(config.title, "Fattura");
        assert_eq!(config.pages[0].boxes[0].y, MARGIN);
    }

    #[test]
    fn multiple_pages() {
        let mut html = String::new();
        for i in 0..60 {
            html.push_str(&format!("<p>Paragraph {} with some text</p>", i));
        }
        let config = paginate_html(&html);
        assert!(
            config.pages.len() > 1,
            "Expected multiple pages, got {}",
            config.pages.len()
        );
        for page in &config.pages {
            for b in &page.boxes {
                assert!(b.y + b.height <= A4_HEIGHT_PT - MARGIN + 0.01);
            }
        }
    }

    #[test]
    fn long_tables_split_between_rows() {
        let mut html = String::from(r#"<table style="width:100%">"#);
        for i in 0..120 {
            html.push_str(&format!("<tr><td>Riga {i}</td><td>10,00</td></tr>"));
        }
        html.push_str("</table>");
        let config = paginate_html(&html);
        assert!(config.pages.len() > 1);
        let rows: usize = config.pages.iter().map(|p| p.boxes.len()).sum();
        assert_eq!(rows, 120);
    }

    #[test]
    fn forced_break_starts_a_new_page() {
        let config = paginate_html(
            r#"<p>uno</p><p style="page-break-before: always">due</p>"#,
        );
        assert_eq!(config.pages.len(), 2);
        assert_eq!(config.pages[1].page_index, 1);
    }

    #[test]
    fn right_aligned_text_is_offset() {
        let config = paginate_html(r#"<div style="text-align:right">1.234,56</div>"#);
        let mut texts = Vec::new();
        all_text(&config.pages[0].boxes[0], &mut texts);
        let line = &texts[0].lines[0];
        assert!(line.x_offset > 400.0, "{}", line.x_offset);
        assert_eq!(texts[0].text_align, LineAlign::Right);
    }

    #[test]
    fn empty_document_still_has_a_page() {
        let config = paginate(&[], "x", A4_WIDTH_PT, A4_HEIGHT_PT, MARGIN, &FontMetrics::default());
        assert_eq!(config.pages.len(), 1);
        assert!(config.pages[0].boxes.is_empty());
    }
}
