//! Layout engine – uses Taffy to compute flexbox / grid layout from a styled
//! DOM tree, then converts the result into a flat list of positioned boxes.
//!
//! Block boxes become flex columns. An element whose children are all
//! inline gets one anonymous text leaf holding its merged, wrapped text.
//! Tables are laid out as flex columns of flex rows; each row distributes
//! its width over the cells, fixed-width cells first.

use std::collections::HashMap;
use taffy::prelude::*;
use taffy::TaffyResult;

use crate::dom::Tag;
use crate::fonts::{wrap_text, FontMetrics, WrapMode};
use crate::style::{self, ComputedStyle, FontWeight, StyledNode, WhiteSpace};

// ---------------------------------------------------------------------------
// Intermediate layout tree (pre-pagination)
// ---------------------------------------------------------------------------

/// A positioned box in document coordinates (before page splitting).
#[derive(Debug, Clone)]
pub struct PositionedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub style: ComputedStyle,
    pub content: BoxContent,
    pub children: Vec<PositionedBox>,
    /// Table rows may be moved to the next page individually.
    pub is_table: bool,
    pub page_break_before: bool,
    pub page_break_after: bool,
    pub page_break_inside_avoid: bool,
}

#[derive(Debug, Clone)]
pub enum BoxContent {
    None,
    Text {
        text: String,
        lines: Vec<String>,
    },
    Image {
        src: String,
    },
    /// List item marker
    ListItem {
        marker: String,
    },
}

// ---------------------------------------------------------------------------
// Inline text collection
// ---------------------------------------------------------------------------

/// Return true when every child is text or an inline element with inline
/// children only. Images always get a box of their own.
fn all_inline(children: &[StyledNode]) -> bool {
    children.iter().all(|c| match c {
        StyledNode::Text { .. } => true,
        StyledNode::Element {
            tag,
            style,
            children: gc,
            ..
        } => {
            *tag != Tag::Img
                && matches!(
                    style.display,
                    style::Display::Inline | style::Display::InlineBlock
                )
                && all_inline(gc)
        }
    })
}

/// Text runs of an inline subtree with their weight. `<br>` yields `\n`.
fn collect_runs(node: &StyledNode, runs: &mut Vec<(String, bool)>) {
    match node {
        StyledNode::Text { text, style } => {
            runs.push((text.clone(), style.font_weight == FontWeight::Bold));
        }
        StyledNode::Element { tag: Tag::Br, .. } => runs.push(("\n".to_string(), false)),
        StyledNode::Element { children, .. } => {
            for child in children {
                collect_runs(child, runs);
            }
        }
    }
}

/// Collapse ASCII whitespace inside each line and trim the line ends.
fn collapse_whitespace(raw: &str) -> String {
    raw.split('\n')
        .map(|line| {
            line.split(|c: char| c.is_ascii_whitespace())
                .filter(|w| !w.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
        .trim_matches('\n')
        .to_string()
}

/// Merge the inline children of an element into one string.
///
/// Returns the text and whether every visible run is bold.
fn merge_inline_text(children: &[StyledNode]) -> (String, bool) {
    let mut runs = Vec::new();
    for child in children {
        collect_runs(child, &mut runs);
    }
    let raw: String = runs.iter().map(|(t, _)| t.as_str()).collect();
    let visible: Vec<_> = runs.iter().filter(|(t, _)| !t.trim().is_empty()).collect();
    let bold = !visible.is_empty() && visible.iter().all(|(_, b)| *b);
    (collapse_whitespace(&raw), bold)
}

fn wrap_mode(style: &ComputedStyle) -> WrapMode {
    if style.white_space == WhiteSpace::NoWrap {
        WrapMode::NoWrap
    } else if style.break_words {
        WrapMode::BreakWords
    } else {
        WrapMode::Words
    }
}

/// Outer width of each cell of a table row, used for text wrapping, and
/// the flex basis/grow pair that reproduces it in Taffy.
///
/// Cells with a resolvable width keep it; the remaining width is shared by
/// the other cells in proportion to their `colspan`.
fn cell_widths(cells: &[&StyledNode], row_width: f32) -> Vec<(f32, Option<f32>, f32)> {
    let declared: Vec<(Option<f32>, f32)> = cells
        .iter()
        .map(|cell| match cell {
            StyledNode::Element { style, attrs, .. } => {
                let span = attrs
                    .get("colspan")
                    .and_then(|v| v.trim().parse::<f32>().ok())
                    .filter(|v| *v >= 1.0)
                    .unwrap_or(1.0);
                (style.width.resolve(row_width), span)
            }
            StyledNode::Text { .. } => (None, 1.0),
        })
        .collect();

    let fixed: f32 = declared.iter().filter_map(|(w, _)| *w).sum();
    let fluid_span: f32 = declared
        .iter()
        .filter(|(w, _)| w.is_none())
        .map(|(_, s)| s)
        .sum();
    let fluid_space = (row_width - fixed).max(0.0);

    declared
        .into_iter()
        .map(|(width, span)| match width {
            Some(w) => (w, Some(w), 0.0),
            None => {
                let share = if fluid_span > 0.0 {
                    fluid_space * span / fluid_span
                } else {
                    0.0
                };
                (share.max(1.0), None, span)
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Build Taffy tree from styled nodes
// ---------------------------------------------------------------------------

struct LayoutBuilder<'a> {
    taffy: TaffyTree<()>,
    fonts: &'a FontMetrics,
    node_styles: HashMap<NodeId, ComputedStyle>,
    node_content: HashMap<NodeId, BoxContent>,
    tables: Vec<NodeId>,
}

impl<'a> LayoutBuilder<'a> {
    fn new(fonts: &'a FontMetrics) -> Self {
        Self {
            taffy: TaffyTree::new(),
            fonts,
            node_styles: HashMap::new(),
            node_content: HashMap::new(),
            tables: Vec::new(),
        }
    }

    /// Build the nodes for a list of siblings in block context. Blank text
    /// between blocks produces nothing.
    fn build_children(
        &mut self,
        parent_tag: &Tag,
        children: &[StyledNode],
        child_width: f32,
        stretch_text: bool,
    ) -> TaffyResult<Vec<NodeId>> {
        let mut ids = Vec::new();
        let mut list_counter = 0u32;

        for child in children {
            if child.is_blank_text() {
                continue;
            }
            let child_id = match child {
                StyledNode::Text { text, style } => {
                    let text = collapse_whitespace(&text.replace('\n', " "));
                    self.build_text_leaf(&text, style, child_width, stretch_text)?
                }
                StyledNode::Element { .. } => self.build_node(child, child_width, None)?,
            };

            // List items carry their bullet / number for the left gutter.
            if let StyledNode::Element { tag: Tag::Li, .. } = child {
                list_counter += 1;
                let marker = if *parent_tag == Tag::Ol {
                    format!("{}. ", list_counter)
                } else {
                    "\u{2022} ".to_string()
                };
                self.node_content
                    .insert(child_id, BoxContent::ListItem { marker });
            }
            ids.push(child_id);
        }
        Ok(ids)
    }

    fn build_node(
        &mut self,
        styled: &StyledNode,
        parent_width: f32,
        cell: Option<(f32, Option<f32>, f32)>,
    ) -> TaffyResult<NodeId> {
        match styled {
            StyledNode::Text { text, style } => {
                let text = collapse_whitespace(&text.replace('\n', " "));
                self.build_text_leaf(&text, style, parent_width, false)
            }
            StyledNode::Element {
                tag,
                style,
                children,
                attrs,
            } => self.build_element_node(tag, style, children, attrs, parent_width, cell),
        }
    }

    /// A leaf holding wrapped text. A stretched leaf takes the width of its
    /// flex-column parent; otherwise it is exactly as wide as its longest
    /// line.
    fn build_text_leaf(
        &mut self,
        text: &str,
        style: &ComputedStyle,
        max_width: f32,
        stretch: bool,
    ) -> TaffyResult<NodeId> {
        let bold = style.font_weight == FontWeight::Bold;
        let font_size = style.font_size;
        let line_height_px = self.fonts.line_height_px(font_size, style.line_height);

        let lines = wrap_text(
            text,
            font_size,
            bold,
            max_width,
            wrap_mode(style),
            self.fonts,
        );

        let text_width = lines
            .iter()
            .map(|l| self.fonts.measure_text_width(l, font_size, bold))
            .fold(0.0f32, f32::max);
        let text_height = lines.len() as f32 * line_height_px;

        let taffy_style = Style {
            size: Size {
                width: if stretch {
                    taffy::Dimension::Auto
                } else {
                    taffy::Dimension::Length(text_width)
                },
                height: taffy::Dimension::Length(text_height),
            },
            flex_shrink: 0.0,
            ..Default::default()
        };

        let node = self.taffy.new_leaf(taffy_style)?;
        self.node_styles.insert(node, style.for_text());
        self.node_content.insert(
            node,
            BoxContent::Text {
                text: text.to_string(),
                lines,
            },
        );
        Ok(node)
    }

    fn build_element_node(
        &mut self,
        tag: &Tag,
        style: &ComputedStyle,
        children: &[StyledNode],
        attrs: &HashMap<String, String>,
        parent_width: f32,
        cell: Option<(f32, Option<f32>, f32)>,
    ) -> TaffyResult<NodeId> {
        // Images resolve `auto` sizes from their intrinsic dimensions; a
        // childless flex box with auto size would collapse to 0×0.
        if *tag == Tag::Img {
            let src = attrs.get("src").cloned().unwrap_or_default();
            let sized = resolve_img_auto_dimensions(&src, style, parent_width);
            let effective = sized.as_ref().unwrap_or(style);
            let node = self
                .taffy
                .new_leaf(self.computed_to_taffy(effective, tag, None))?;
            self.node_styles.insert(node, effective.clone());
            self.node_content.insert(node, BoxContent::Image { src });
            return Ok(node);
        }

        // Width available for children.
        let my_width = match cell {
            Some((w, _, _)) => w,
            None => {
                let w = style.width.resolve(parent_width).unwrap_or(parent_width);
                style
                    .max_width
                    .resolve(parent_width)
                    .map_or(w, |max| w.min(max))
            }
        };
        let inner_width = (my_width
            - style.padding_left
            - style.padding_right
            - 2.0 * style.border_width)
            .max(1.0);

        let child_nodes = if *tag == Tag::Tr {
            self.build_row_cells(children, inner_width)?
        } else if *tag != Tag::Table && !children.is_empty() && all_inline(children) {
            let (text, bold) = merge_inline_text(children);
            if text.is_empty() {
                Vec::new()
            } else {
                let mut text_style = style.clone();
                if bold {
                    text_style.font_weight = FontWeight::Bold;
                }
                vec![self.build_text_leaf(&text, &text_style, inner_width, is_column(style))?]
            }
        } else {
            let child_width = if !is_column(style) && style.display != style::Display::Inline {
                let count = children
                    .iter()
                    .filter(|c| matches!(c, StyledNode::Element { .. }))
                    .count()
                    .max(1);
                let gap_total = style.gap * count.saturating_sub(1) as f32;
                ((inner_width - gap_total) / count as f32).max(1.0)
            } else {
                inner_width
            };
            self.build_children(tag, children, child_width, is_column(style))?
        };

        let taffy_style = self.computed_to_taffy(style, tag, cell);
        let node = self.taffy.new_with_children(taffy_style, &child_nodes)?;
        self.node_styles.insert(node, style.clone());
        if *tag == Tag::Table {
            self.tables.push(node);
        }
        Ok(node)
    }

    /// Cells of a table row, each sized from its declared width or its
    /// share of the remaining row width.
    fn build_row_cells(
        &mut self,
        children: &[StyledNode],
        row_width: f32,
    ) -> TaffyResult<Vec<NodeId>> {
        let cells: Vec<&StyledNode> = children.iter().filter(|c| !c.is_blank_text()).collect();
        let widths = cell_widths(&cells, row_width);
        let mut ids = Vec::with_capacity(cells.len());
        for (cell, sizing) in cells.into_iter().zip(widths) {
            ids.push(self.build_node(cell, row_width, Some(sizing))?);
        }
        Ok(ids)
    }

    fn computed_to_taffy(
        &self,
        s: &ComputedStyle,
        tag: &Tag,
        cell: Option<(f32, Option<f32>, f32)>,
    ) -> Style {
        let mut ts = Style {
            margin: margin_rect(s),
            padding: Rect {
                top: LengthPercentage::Length(s.padding_top),
                right: LengthPercentage::Length(s.padding_right),
                bottom: LengthPercentage::Length(s.padding_bottom),
                left: LengthPercentage::Length(s.padding_left),
            },
            border: Rect {
                top: LengthPercentage::Length(s.border_width),
                right: LengthPercentage::Length(s.border_width),
                bottom: LengthPercentage::Length(s.border_width),
                left: LengthPercentage::Length(s.border_width),
            },
            ..Default::default()
        };

        // -----------------------------------------------------------------
        // HTML table model: always use flex regardless of computed display.
        // -----------------------------------------------------------------
        match tag {
            Tag::Table => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Column;
                ts.size.width = dim_to_taffy(s.width);
                ts.size.height = dim_to_taffy(s.height);
                ts.max_size.width = dim_to_taffy(s.max_width);
                ts.min_size.width = taffy::Dimension::Length(0.0);
                ts.flex_shrink = 0.0;
                return ts;
            }
            Tag::Tr => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Row;
                ts.align_items = Some(taffy::AlignItems::Stretch);
                ts.size.width = taffy::Dimension::Percent(1.0);
                ts.min_size.width = taffy::Dimension::Length(0.0);
                ts.flex_shrink = 0.0;
                return ts;
            }
            _ => {}
        }

        if let Some((_, fixed, grow)) = cell {
            ts.display = taffy::Display::Flex;
            ts.flex_direction = taffy::FlexDirection::Column;
            match fixed {
                Some(w) => {
                    ts.flex_basis = taffy::Dimension::Length(w);
                    ts.flex_grow = 0.0;
                }
                None => {
                    ts.flex_basis = taffy::Dimension::Length(0.0);
                    ts.flex_grow = grow;
                }
            }
            ts.flex_shrink = 1.0;
            ts.min_size.width = taffy::Dimension::Length(0.0);
            ts.size.height = dim_to_taffy(s.height);
            return ts;
        }

        // Display / layout mode
        match s.display {
            style::Display::Flex => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = match s.flex_direction {
                    style::FlexDirection::Row => taffy::FlexDirection::Row,
                    style::FlexDirection::Column => taffy::FlexDirection::Column,
                };
                ts.flex_wrap = match s.flex_wrap {
                    style::FlexWrap::NoWrap => taffy::FlexWrap::NoWrap,
                    style::FlexWrap::Wrap => taffy::FlexWrap::Wrap,
                };
                ts.justify_content = Some(match s.justify_content {
                    style::JustifyContent::Start => taffy::JustifyContent::Start,
                    style::JustifyContent::End => taffy::JustifyContent::End,
                    style::JustifyContent::Center => taffy::JustifyContent::Center,
                    style::JustifyContent::SpaceBetween => taffy::JustifyContent::SpaceBetween,
                    style::JustifyContent::SpaceAround => taffy::JustifyContent::SpaceAround,
                    style::JustifyContent::SpaceEvenly => taffy::JustifyContent::SpaceEvenly,
                });
                ts.align_items = Some(match s.align_items {
                    style::AlignItems::Start => taffy::AlignItems::Start,
                    style::AlignItems::End => taffy::AlignItems::End,
                    style::AlignItems::Center => taffy::AlignItems::Center,
                    style::AlignItems::Stretch => taffy::AlignItems::Stretch,
                });
            }
            style::Display::Grid => {
                ts.display = taffy::Display::Grid;
                ts.grid_template_columns = if s.grid_template_columns.is_empty() {
                    vec![TrackSizingFunction::from_flex(1.0)]
                } else {
                    s.grid_template_columns
                        .iter()
                        .map(|t| match *t {
                            style::GridTrack::Px(v) => TrackSizingFunction::from_length(v),
                            style::GridTrack::Fr(f) => TrackSizingFunction::from_flex(f),
                            style::GridTrack::Auto => TrackSizingFunction::AUTO,
                        })
                        .collect()
                };
            }
            style::Display::Block
            | style::Display::ListItem
            | style::Display::TableRow
            | style::Display::TableCell
            | style::Display::InlineBlock => {
                // Use flex column for block-level elements (vertical stacking)
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Column;
            }
            style::Display::Inline => {
                ts.display = taffy::Display::Flex;
                ts.flex_direction = taffy::FlexDirection::Row;
                ts.flex_wrap = taffy::FlexWrap::Wrap;
            }
            style::Display::None => {
                ts.display = taffy::Display::None;
            }
        }

        // Sizing
        ts.size = Size {
            width: dim_to_taffy(s.width),
            height: dim_to_taffy(s.height),
        };
        // Allow flex/shrink items to compress below their natural content size
        ts.min_size = Size {
            width: if s.flex_shrink > 0.0 || s.flex_grow > 0.0 {
                taffy::Dimension::Length(0.0)
            } else {
                dim_to_taffy(s.min_width)
            },
            height: taffy::Dimension::Auto,
        };
        ts.max_size = Size {
            width: dim_to_taffy(s.max_width),
            height: taffy::Dimension::Auto,
        };

        ts.flex_grow = s.flex_grow;
        // Blocks stack vertically and never shrink below their content.
        ts.flex_shrink = 0.0;
        ts.gap = Size {
            width: LengthPercentage::Length(s.gap),
            height: LengthPercentage::Length(s.gap),
        };

        ts
    }

    /// Extract positioned boxes after layout computation.
    fn extract(&self, node: NodeId, offset_x: f32, offset_y: f32) -> TaffyResult<PositionedBox> {
        let layout = *self.taffy.layout(node)?;
        let style = self.node_styles.get(&node).cloned().unwrap_or_default();
        let content = self
            .node_content
            .get(&node)
            .cloned()
            .unwrap_or(BoxContent::None);

        let x = offset_x + layout.location.x;
        let y = offset_y + layout.location.y;

        let children = self
            .taffy
            .children(node)?
            .into_iter()
            .map(|child| self.extract(child, x, y))
            .collect::<TaffyResult<Vec<_>>>()?;

        Ok(PositionedBox {
            x,
            y,
            width: layout.size.width,
            height: layout.size.height,
            is_table: self.tables.contains(&node),
            page_break_before: style.page_break_before,
            page_break_after: style.page_break_after,
            page_break_inside_avoid: style.page_break_inside_avoid,
            style,
            content,
            children,
        })
    }
}

/// Whether the element lays its children out top to bottom, so that
/// text leaves can stretch to its width.
fn is_column(s: &ComputedStyle) -> bool {
    match s.display {
        style::Display::Flex => s.flex_direction == style::FlexDirection::Column,
        style::Display::Inline | style::Display::Grid => false,
        _ => true,
    }
}

fn margin_rect(s: &ComputedStyle) -> Rect<LengthPercentageAuto> {
    let horizontal = |auto: bool, v: f32| {
        if auto {
            LengthPercentageAuto::Auto
        } else {
            LengthPercentageAuto::Length(v)
        }
    };
    Rect {
        top: LengthPercentageAuto::Length(s.margin_top),
        right: horizontal(s.margin_right_auto, s.margin_right),
        bottom: LengthPercentageAuto::Length(s.margin_bottom),
        left: horizontal(s.margin_left_auto, s.margin_left),
    }
}

fn dim_to_taffy(d: style::Dimension) -> taffy::Dimension {
    match d {
        style::Dimension::Auto => taffy::Dimension::Auto,
        style::Dimension::Px(v) => taffy::Dimension::Length(v),
        style::Dimension::Percent(v) => taffy::Dimension::Percent(v / 100.0),
    }
}

// ---------------------------------------------------------------------------
// Image intrinsic-size helper
// ---------------------------------------------------------------------------

/// Attempt to decode a base64 data-URI image and return a cloned
/// [`ComputedStyle`] with any `Auto` width/height replaced by concrete pixel
/// values derived from the image's intrinsic dimensions.
///
/// Returns `None` when the src is not a parseable base64 data URI, when image
/// decoding fails, or when both dimensions are already specified.
fn resolve_img_auto_dimensions(
    src: &str,
    style: &ComputedStyle,
    parent_width: f32,
) -> Option<ComputedStyle> {
    use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};

    if !src.starts_with("data:") || !src.contains(";base64,") {
        return None;
    }
    let comma = src.find(',')?;
    let b64: String = src[comma + 1..]
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = BASE64_STD.decode(b64).ok()?;
    let img = ::image::load_from_memory(&bytes).ok()?;
    let (px_w, px_h) = (img.width() as f32, img.height() as f32);
    if px_w == 0.0 || px_h == 0.0 {
        return None;
    }
    let aspect = px_w / px_h;

    let known_w = style.width.resolve(parent_width);
    let known_h = match style.height {
        style::Dimension::Px(v) => Some(v),
        _ => None,
    };

    let mut s = style.clone();
    match (known_w, known_h) {
        (Some(w), None) => s.height = style::Dimension::Px((w / aspect).max(1.0)),
        (None, Some(h)) => s.width = style::Dimension::Px((h * aspect).max(1.0)),
        // 1 px = 1 pt; never wider than the containing block.
        (None, None) => {
            let w = px_w.min(parent_width.max(1.0));
            s.width = style::Dimension::Px(w);
            s.height = style::Dimension::Px(w / aspect);
        }
        (Some(_), Some(_)) => return None,
    }
    Some(s)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compute layout for a styled tree, returning a list of top-level positioned
/// boxes in document coordinates. `x` already includes the left page margin.
pub fn compute_layout(
    styled_nodes: &[StyledNode],
    page_width: f32,
    page_margin: f32,
    fonts: &FontMetrics,
) -> TaffyResult<Vec<PositionedBox>> {
    let content_width = (page_width - 2.0 * page_margin).max(1.0);
    let mut builder = LayoutBuilder::new(fonts);

    let child_ids = builder.build_children(&Tag::Body, styled_nodes, content_width, true)?;

    let root_style = Style {
        display: taffy::Display::Flex,
        flex_direction: taffy::FlexDirection::Column,
        size: Size {
            width: taffy::Dimension::Length(content_width),
            height: taffy::Dimension::Auto,
        },
        ..Default::default()
    };
    let root = builder.taffy.new_with_children(root_style, &child_ids)?;

    builder.taffy.compute_layout(
        root,
        Size {
            width: AvailableSpace::Definite(content_width),
            height: AvailableSpace::MaxContent,
        },
    )?;

    let root_box = builder.extract(root, page_margin, 0.0)?;
    log::debug!(
        "layout: {} top-level boxes, document height {:.1}pt",
        root_box.children.len(),
        root_box.height
    );
    Ok(root_box.children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{normalize_tables, parse_html};
    use crate::style::build_styled_tree;

    fn layout(html: &str) -> Vec<PositionedBox> {
        let mut dom = parse_html(html);
        normalize_tables(&mut dom);
        let styled = build_styled_tree(&dom, None);
        compute_layout(&styled, 595.0, 40.0, &FontMetrics::default()).unwrap()
    }

    fn texts(b: &PositionedBox, out: &mut Vec<(String, f32, f32)>) {
        if let BoxContent::Text { text, .. } = &b.content {
            out.push((text.clone(), b.x, b.width));
        }
        for c in &b.children {
            texts(c, out);
        }
    }

    #[test]
    fn layout_simple_paragraph() {
        let boxes = layout("<p>Hello world</p>");
        assert!(!boxes.is_empty(), "Should produce at least one box");
        let first = &boxes[0];
        assert!(first.width > 0.0, "Box should have width");
        assert!(first.height > 0.0, "Box should have height");
        assert_eq!(first.x, 40.0);
    }

    #[test]
    fn layout_flex_row() {
        let boxes =
            layout(r#"<div class="flex"><div class="flex-1">A</div><div class="flex-1">B</div></div>"#);
        assert_eq!(boxes.len(), 1);
        let row = &boxes[0];
        assert_eq!(row.children.len(), 2);
        assert!(row.children[1].x > row.children[0].x);
    }

    #[test]
    fn inline_runs_merge_into_one_text_box() {
        let boxes = layout("<div>Partita <b>IVA</b>: <span>IT01234567890</span></div>");
        let mut found = Vec::new();
        texts(&boxes[0], &mut found);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "Partita IVA: IT01234567890");
    }

    #[test]
    fn line_breaks_split_lines() {
        let boxes = layout("<p>Via Roma 1<br>00100 Roma</p>");
        match &boxes[0].children[0].content {
            BoxContent::Text { lines, .. } => assert_eq!(lines, &["Via Roma 1", "00100 Roma"]),
            other => panic!("unexpected content {other:?}"),
        }
    }

    #[test]
    fn blank_text_between_blocks_is_skipped() {
        let boxes = layout("<div>\n  <p>a</p>\n  <p>b</p>\n</div>");
        assert_eq!(boxes[0].children.len(), 2);
    }

    #[test]
    fn fixed_cell_keeps_width_and_fluid_cells_share_the_rest() {
        let boxes = layout(
            r#"<table style="width:500px"><tr><td style="width:100px">a</td><td>b</td><td colspan="3">c</td></tr></table>"#,
        );
        let table = &boxes[0];
        assert!(table.is_table);
        let row = &table.children[0];
        assert_eq!(row.children.len(), 3);
        assert!((row.children[0].width - 100.0).abs() < 0.5);
        assert!((row.children[1].width - 100.0).abs() < 0.5);
        assert!((row.children[2].width - 300.0).abs() < 0.5);
    }

    #[test]
    fn cells_fill_the_row() {
        let boxes = layout(r#"<table style="width:100%"><tr><td>a</td><td>b</td></tr></table>"#);
        let row = &boxes[0].children[0];
        let total: f32 = row.children.iter().map(|c| c.width).sum();
        assert!((total - 515.0).abs() < 0.5, "{total}");
    }

    #[test]
    fn auto_margins_center_a_fixed_block() {
        let boxes = layout(r#"<div style="width:200px;margin:0 auto">x</div>"#);
        let expected = 40.0 + (515.0 - 200.0) / 2.0;
        assert!((boxes[0].x - expected).abs() < 0.5, "{}", boxes[0].x);
    }

    #[test]
    fn list_items_get_markers() {
        let boxes = layout("<ol><li>uno</li><li>due</li></ol>");
        let markers: Vec<_> = boxes[0]
            .children
            .iter()
            .filter_map(|c| match &c.content {
                BoxContent::ListItem { marker } => Some(marker.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(markers, vec!["1. ", "2. "]);
    }

    #[test]
    fn cell_widths_share_fluid_space_by_colspan() {
        let html = r#"<tr><td style="width:50%">a</td><td>b</td><td colspan="2">c</td></tr>"#;
        let dom = parse_html(html);
        let styled = build_styled_tree(&dom, None);
        let StyledNode::Element { children, .. } = &styled[0] else {
            panic!("expected row");
        };
        let cells: Vec<&StyledNode> = children.iter().filter(|c| !c.is_blank_text()).collect();
        let widths = cell_widths(&cells, 300.0);
        assert_eq!(widths[0], (150.0, Some(150.0), 0.0));
        assert_eq!(widths[1], (50.0, None, 1.0));
        assert_eq!(widths[2], (100.0, None, 2.0));
    }
}
