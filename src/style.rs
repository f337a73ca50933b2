//! Style resolver – runs the cascade over the DOM and produces a flat
//! [`ComputedStyle`] per element for the layout engine.
//!
//! Precedence, lowest first:
//! 1. tag defaults and presentational attributes (`width`, `align`, ...)
//! 2. normal declarations from the document's `<style>` sheets and the
//!    override sheet, ordered by specificity, then sheet, then source order
//! 3. normal declarations of the inline `style` attribute
//! 4. `!important` declarations of the document sheets, then of the inline
//!    style, then of the override sheet

use std::collections::HashMap;

use crate::css::{self, Declaration, MatchedDeclaration, Stylesheet};
use crate::dom::{DomNode, ElementNode, Tag};

/// Fully resolved style for a single element.
#[derive(Debug, Clone)]
pub struct ComputedStyle {
    // Display / layout
    pub display: Display,
    pub flex_direction: FlexDirection,
    pub flex_wrap: FlexWrap,
    pub flex_grow: f32,
    pub flex_shrink: f32,
    pub justify_content: JustifyContent,
    pub align_items: AlignItems,
    pub gap: f32,

    // Grid
    pub grid_template_columns: Vec<GridTrack>,

    // Sizing
    pub width: Dimension,
    pub height: Dimension,
    pub min_width: Dimension,
    pub max_width: Dimension,

    // Spacing (pt)
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub margin_left_auto: bool,
    pub margin_right_auto: bool,
    pub padding_top: f32,
    pub padding_right: f32,
    pub padding_bottom: f32,
    pub padding_left: f32,

    // Border
    pub border_width: f32,
    pub border_color: Color,

    // Typography
    pub font_size: f32,
    pub font_weight: FontWeight,
    pub font_family: String,
    pub color: Color,
    pub text_align: TextAlign,
    pub line_height: f32,
    pub text_decoration: TextDecoration,
    pub font_style: FontStyle,
    pub white_space: WhiteSpace,
    /// `overflow-wrap` / `word-break`: split words longer than the line.
    pub break_words: bool,

    // Background
    pub background_color: Color,

    // Page break
    pub page_break_before: bool,
    pub page_break_after: bool,
    pub page_break_inside_avoid: bool,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: Display::Block,
            flex_direction: FlexDirection::Row,
            flex_wrap: FlexWrap::NoWrap,
            flex_grow: 0.0,
            flex_shrink: 1.0,
            justify_content: JustifyContent::Start,
            align_items: AlignItems::Stretch,
            gap: 0.0,
            grid_template_columns: Vec::new(),
            width: Dimension::Auto,
            height: Dimension::Auto,
            min_width: Dimension::Auto,
            max_width: Dimension::Auto,
            margin_top: 0.0,
            margin_right: 0.0,
            margin_bottom: 0.0,
            margin_left: 0.0,
            margin_left_auto: false,
            margin_right_auto: false,
            padding_top: 0.0,
            padding_right: 0.0,
            padding_bottom: 0.0,
            padding_left: 0.0,
            border_width: 0.0,
            border_color: Color::BLACK,
            font_size: 16.0,
            font_weight: FontWeight::Normal,
            font_family: "Helvetica".to_string(),
            color: Color::BLACK,
            text_align: TextAlign::Left,
            line_height: 1.2,
            text_decoration: TextDecoration::None,
            font_style: FontStyle::Normal,
            white_space: WhiteSpace::Normal,
            break_words: false,
            background_color: Color::TRANSPARENT,
            page_break_before: false,
            page_break_after: false,
            page_break_inside_avoid: false,
        }
    }
}

impl ComputedStyle {
    /// Copy the inherited properties of `parent`.
    fn inherit_from(&mut self, parent: &ComputedStyle) {
        self.font_size = parent.font_size;
        self.font_weight = parent.font_weight;
        self.font_family = parent.font_family.clone();
        self.color = parent.color;
        self.text_align = parent.text_align;
        self.line_height = parent.line_height;
        self.font_style = parent.font_style;
        self.white_space = parent.white_space;
        self.break_words = parent.break_words;
    }

    /// Style for text runs: typography of the parent, no box of its own.
    pub fn for_text(&self) -> ComputedStyle {
        let mut s = self.clone();
        s.display = Display::Inline;
        s.width = Dimension::Auto;
        s.height = Dimension::Auto;
        s.min_width = Dimension::Auto;
        s.max_width = Dimension::Auto;
        s.border_width = 0.0;
        s.background_color = Color::TRANSPARENT;
        s.margin_top = 0.0;
        s.margin_right = 0.0;
        s.margin_bottom = 0.0;
        s.margin_left = 0.0;
        s.margin_left_auto = false;
        s.margin_right_auto = false;
        s.padding_top = 0.0;
        s.padding_right = 0.0;
        s.padding_bottom = 0.0;
        s.padding_left = 0.0;
        s
    }
}

// ---------------------------------------------------------------------------
// Supporting enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    Flex,
    Grid,
    Inline,
    InlineBlock,
    ListItem,
    TableRow,
    TableCell,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexDirection {
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexWrap {
    NoWrap,
    Wrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JustifyContent {
    Start,
    End,
    Center,
    SpaceBetween,
    SpaceAround,
    SpaceEvenly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignItems {
    Start,
    End,
    Center,
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDecoration {
    None,
    Underline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteSpace {
    Normal,
    NoWrap,
}

/// A length in points, a percentage of the containing block, or `auto`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Auto,
    Px(f32),
    Percent(f32),
}

impl Dimension {
    /// Resolve against a containing width; `None` for `auto`.
    pub fn resolve(self, containing: f32) -> Option<f32> {
        match self {
            Dimension::Auto => None,
            Dimension::Px(v) => Some(v),
            Dimension::Percent(p) => Some(containing * p / 100.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GridTrack {
    Px(f32),
    Fr(f32),
    Auto,
}

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

/// CSS named colours that show up in invoice stylesheets.
const NAMED_COLORS: &[(&str, &str)] = &[
    ("black", "#000000"),
    ("white", "#ffffff"),
    ("red", "#ff0000"),
    ("green", "#008000"),
    ("blue", "#0000ff"),
    ("navy", "#000080"),
    ("maroon", "#800000"),
    ("purple", "#800080"),
    ("teal", "#008080"),
    ("olive", "#808000"),
    ("orange", "#ffa500"),
    ("yellow", "#ffff00"),
    ("gray", "#808080"),
    ("grey", "#808080"),
    ("silver", "#c0c0c0"),
    ("lightgray", "#d3d3d3"),
    ("lightgrey", "#d3d3d3"),
    ("darkgray", "#a9a9a9"),
    ("darkgrey", "#a9a9a9"),
    ("dimgray", "#696969"),
    ("gainsboro", "#dcdcdc"),
    ("whitesmoke", "#f5f5f5"),
    ("aliceblue", "#f0f8ff"),
    ("lightblue", "#add8e6"),
    ("steelblue", "#4682b4"),
    ("darkblue", "#00008b"),
    ("darkred", "#8b0000"),
    ("darkgreen", "#006400"),
];

impl Color {
    pub const BLACK: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    pub const WHITE: Self = Self {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub fn is_transparent(&self) -> bool {
        self.a < 0.001
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        match hex.len() {
            6 => Some(Self {
                r: channel(&hex[0..2])?,
                g: channel(&hex[2..4])?,
                b: channel(&hex[4..6])?,
                a: 1.0,
            }),
            3 => Some(Self {
                r: channel(&hex[0..1].repeat(2))?,
                g: channel(&hex[1..2].repeat(2))?,
                b: channel(&hex[2..3].repeat(2))?,
                a: 1.0,
            }),
            _ => None,
        }
    }

    /// Parse `#hex`, `rgb()`, `rgba()`, `transparent` or a named colour.
    pub fn parse(value: &str) -> Option<Self> {
        let v = value.trim().to_ascii_lowercase();
        if v.starts_with('#') {
            return Self::from_hex(&v);
        }
        if v == "transparent" {
            return Some(Self::TRANSPARENT);
        }
        if let Some(args) = v
            .strip_prefix("rgba(")
            .or_else(|| v.strip_prefix("rgb("))
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let parts: Vec<&str> = args.split(',').map(str::trim).collect();
            if parts.len() < 3 {
                return None;
            }
            let channel = |s: &str| -> Option<f32> {
                match s.strip_suffix('%') {
                    Some(p) => p.parse::<f32>().ok().map(|p| p / 100.0),
                    None => s.parse::<f32>().ok().map(|c| c / 255.0),
                }
            };
            let a = match parts.get(3) {
                Some(a) => a.parse::<f32>().ok()?,
                None => 1.0,
            };
            return Some(Self {
                r: channel(parts[0])?.clamp(0.0, 1.0),
                g: channel(parts[1])?.clamp(0.0, 1.0),
                b: channel(parts[2])?.clamp(0.0, 1.0),
                a: a.clamp(0.0, 1.0),
            });
        }
        NAMED_COLORS
            .iter()
            .find(|(name, _)| *name == v)
            .and_then(|(_, hex)| Self::from_hex(hex))
    }
}

// ---------------------------------------------------------------------------
// Cascade
// ---------------------------------------------------------------------------

/// The style sheets taking part in the cascade.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cascade<'a> {
    /// Sheets from the document's `<style>` blocks, in document order.
    pub author: &'a [Stylesheet],
    /// Sheet applied last; its `!important` declarations win.
    pub overrides: Option<&'a Stylesheet>,
}

impl<'a> Cascade<'a> {
    pub fn new(author: &'a [Stylesheet], overrides: Option<&'a Stylesheet>) -> Self {
        Self { author, overrides }
    }

    /// Sheet declarations matching `element`, sorted for application.
    /// The `usize` is the sheet rank; the override sheet ranks last.
    fn matching(
        &self,
        element: &ElementNode,
        ancestors: &[&ElementNode],
    ) -> Vec<(usize, MatchedDeclaration<'a>)> {
        let mut matched = Vec::new();
        for (rank, sheet) in self.author.iter().enumerate() {
            matched.extend(sheet.matching(element, ancestors).into_iter().map(|m| (rank, m)));
        }
        if let Some(sheet) = self.overrides {
            let rank = self.author.len();
            matched.extend(sheet.matching(element, ancestors).into_iter().map(|m| (rank, m)));
        }
        // Stable: declarations of one rule keep their source order.
        matched.sort_by_key(|(rank, m)| (m.specificity, *rank, m.order));
        matched
    }

    fn override_rank(&self) -> usize {
        self.author.len()
    }
}

/// Resolve the style for an element. `ancestors` lists its ancestors from
/// the root down to the parent, for selector matching.
pub fn resolve_style(
    element: &ElementNode,
    ancestors: &[&ElementNode],
    parent: Option<&ComputedStyle>,
    cascade: &Cascade,
) -> ComputedStyle {
    let mut style = base_style_for_tag(&element.tag);
    let root = ComputedStyle::default();
    let inherited = parent.unwrap_or(&root);
    style.inherit_from(inherited);
    // Tag defaults that override inheritance.
    apply_tag_typography(&mut style, &element.tag, inherited);
    apply_presentational_hints(&mut style, element);

    let matched = cascade.matching(element, ancestors);
    let inline = element
        .inline_style()
        .map(css::parse_declarations)
        .unwrap_or_default();
    let override_rank = cascade.override_rank();

    for (_, m) in matched.iter().filter(|(_, m)| !m.declaration.important) {
        apply_declaration(&mut style, m.declaration, parent);
    }
    for decl in inline.iter().filter(|d| !d.important) {
        apply_declaration(&mut style, decl, parent);
    }
    for (_, m) in matched
        .iter()
        .filter(|(rank, m)| m.declaration.important && *rank < override_rank)
    {
        apply_declaration(&mut style, m.declaration, parent);
    }
    for decl in inline.iter().filter(|d| d.important) {
        apply_declaration(&mut style, decl, parent);
    }
    for (_, m) in matched
        .iter()
        .filter(|(rank, m)| m.declaration.important && *rank == override_rank)
    {
        apply_declaration(&mut style, m.declaration, parent);
    }

    style
}

/// Default styles based on tag semantics.
fn base_style_for_tag(tag: &Tag) -> ComputedStyle {
    let mut s = ComputedStyle::default();
    match tag {
        Tag::P => {
            s.margin_top = 0.0;
            s.margin_bottom = 10.0;
        }
        Tag::Ul | Tag::Ol => {
            s.margin_bottom = 10.0;
            s.padding_left = 24.0;
        }
        Tag::Li => {
            s.display = Display::ListItem;
            s.margin_bottom = 4.0;
        }
        Tag::Hr => {
            s.border_width = 0.5;
            s.border_color = Color::parse("gray").unwrap_or(Color::BLACK);
            s.margin_top = 6.0;
            s.margin_bottom = 6.0;
        }
        Tag::Table => {
            s.display = Display::Grid;
        }
        Tag::Tr => {
            s.display = Display::TableRow;
        }
        Tag::Td | Tag::Th => {
            s.display = Display::TableCell;
            s.padding_top = 1.0;
            s.padding_right = 2.0;
            s.padding_bottom = 1.0;
            s.padding_left = 2.0;
        }
        Tag::Span | Tag::B | Tag::Strong | Tag::I | Tag::Em | Tag::U | Tag::A | Tag::Label | Tag::Font | Tag::Br => {
            s.display = Display::Inline;
        }
        Tag::Img => {
            s.display = Display::InlineBlock;
        }
        Tag::Head | Tag::Title | Tag::Meta | Tag::Link | Tag::Style | Tag::Script => {
            s.display = Display::None;
        }
        Tag::H1 | Tag::H2 | Tag::H3 | Tag::H4 | Tag::H5 | Tag::H6 => {
            s.margin_top = 8.0;
            s.margin_bottom = 6.0;
        }
        Tag::Div
        | Tag::Caption
        | Tag::Thead
        | Tag::Tbody
        | Tag::Tfoot
        | Tag::Body
        | Tag::Html
        | Tag::Unknown(_) => {}
    }
    s
}

/// Typography a tag imposes regardless of what it inherits.
fn apply_tag_typography(s: &mut ComputedStyle, tag: &Tag, parent: &ComputedStyle) {
    let heading = |s: &mut ComputedStyle, scale: f32| {
        s.font_size = parent.font_size * scale;
        s.font_weight = FontWeight::Bold;
    };
    match tag {
        Tag::H1 => heading(s, 2.0),
        Tag::H2 => heading(s, 1.5),
        Tag::H3 => heading(s, 1.17),
        Tag::H4 => heading(s, 1.0),
        Tag::H5 => heading(s, 0.83),
        Tag::H6 => heading(s, 0.67),
        Tag::B | Tag::Strong | Tag::Th => s.font_weight = FontWeight::Bold,
        Tag::I | Tag::Em => s.font_style = FontStyle::Italic,
        Tag::U => s.text_decoration = TextDecoration::Underline,
        Tag::Caption => s.text_align = TextAlign::Center,
        _ => {}
    }
}

/// Legacy HTML attributes (`width`, `align`, `bgcolor`, ...) at the lowest
/// author precedence.
fn apply_presentational_hints(s: &mut ComputedStyle, element: &ElementNode) {
    let attr = |name: &str| element.attributes.get(name).map(|v| v.trim());
    if let Some(w) = attr("width") {
        s.width = parse_dimension(w, s.font_size);
    }
    if let Some(h) = attr("height") {
        s.height = parse_dimension(h, s.font_size);
    }
    if let Some(align) = attr("align") {
        apply_css_property(s, "text-align", align, None);
    }
    if let Some(bg) = attr("bgcolor").and_then(Color::parse) {
        s.background_color = bg;
    }
    if element.tag == Tag::Table {
        if let Some(b) = attr("border").and_then(|b| css::parse_length(b, s.font_size)) {
            s.border_width = b;
        }
    }
    if element.tag == Tag::Font {
        if let Some(c) = attr("color").and_then(Color::parse) {
            s.color = c;
        }
        if let Some(size) = attr("size").and_then(|v| v.parse::<usize>().ok()) {
            const FONT_SIZES: [f32; 7] = [10.0, 13.0, 16.0, 18.0, 24.0, 32.0, 48.0];
            s.font_size = FONT_SIZES[size.clamp(1, 7) - 1];
        }
    }
}

// ---------------------------------------------------------------------------
// CSS properties
// ---------------------------------------------------------------------------

fn apply_declaration(s: &mut ComputedStyle, decl: &Declaration, parent: Option<&ComputedStyle>) {
    apply_css_property(s, &decl.property, &decl.value, parent);
}

fn apply_css_property(s: &mut ComputedStyle, prop: &str, val: &str, parent: Option<&ComputedStyle>) {
    let val = val.trim();
    let lower = val.to_ascii_lowercase();
    let em = s.font_size;
    match prop {
        "display" => {
            s.display = match lower.as_str() {
                "flex" | "inline-flex" => Display::Flex,
                "grid" => Display::Grid,
                "block" | "table" | "table-row-group" | "table-header-group"
                | "table-footer-group" => Display::Block,
                "inline" => Display::Inline,
                "inline-block" => Display::InlineBlock,
                "list-item" => Display::ListItem,
                "table-row" => Display::TableRow,
                "table-cell" => Display::TableCell,
                "none" => Display::None,
                _ => s.display,
            }
        }
        "flex-direction" => {
            s.flex_direction = match lower.as_str() {
                "row" => FlexDirection::Row,
                "column" => FlexDirection::Column,
                _ => s.flex_direction,
            }
        }
        "flex-wrap" => {
            s.flex_wrap = match lower.as_str() {
                "wrap" | "wrap-reverse" => FlexWrap::Wrap,
                "nowrap" => FlexWrap::NoWrap,
                _ => s.flex_wrap,
            }
        }
        "justify-content" => {
            s.justify_content = match lower.as_str() {
                "flex-start" | "start" | "left" => JustifyContent::Start,
                "flex-end" | "end" | "right" => JustifyContent::End,
                "center" => JustifyContent::Center,
                "space-between" => JustifyContent::SpaceBetween,
                "space-around" => JustifyContent::SpaceAround,
                "space-evenly" => JustifyContent::SpaceEvenly,
                _ => s.justify_content,
            }
        }
        "align-items" => {
            s.align_items = match lower.as_str() {
                "flex-start" | "start" => AlignItems::Start,
                "flex-end" | "end" => AlignItems::End,
                "center" => AlignItems::Center,
                "stretch" | "normal" => AlignItems::Stretch,
                _ => s.align_items,
            }
        }
        "flex-grow" => {
            if let Ok(v) = lower.parse::<f32>() {
                s.flex_grow = v.max(0.0);
            }
        }
        "flex-shrink" => {
            if let Ok(v) = lower.parse::<f32>() {
                s.flex_shrink = v.max(0.0);
            }
        }
        "font-size" => {
            let inherited = parent.map(|p| p.font_size).unwrap_or(16.0);
            if let Some(size) = parse_font_size(&lower, inherited) {
                s.font_size = size;
            }
        }
        "font-weight" => {
            s.font_weight = match lower.as_str() {
                "bold" | "bolder" | "600" | "700" | "800" | "900" => FontWeight::Bold,
                _ => FontWeight::Normal,
            }
        }
        "font-style" => {
            s.font_style = match lower.as_str() {
                "italic" | "oblique" => FontStyle::Italic,
                _ => FontStyle::Normal,
            }
        }
        "font-family" => {
            if let Some(first) = val.split(',').next() {
                let family = first.trim().trim_matches(|c| c == '\'' || c == '"');
                if !family.is_empty() {
                    s.font_family = family.to_string();
                }
            }
        }
        "color" => {
            if let Some(c) = Color::parse(val) {
                s.color = c;
            }
        }
        "background-color" => {
            if let Some(c) = Color::parse(val) {
                s.background_color = c;
            }
        }
        "background" => {
            if let Some(c) = val.split_whitespace().find_map(Color::parse) {
                s.background_color = c;
            }
        }
        "text-align" => {
            s.text_align = match lower.as_str() {
                "center" | "middle" => TextAlign::Center,
                "right" | "end" => TextAlign::Right,
                _ => TextAlign::Left,
            }
        }
        "text-decoration" | "text-decoration-line" => {
            s.text_decoration = if lower.contains("underline") {
                TextDecoration::Underline
            } else {
                TextDecoration::None
            }
        }
        "white-space" => {
            s.white_space = match lower.as_str() {
                "nowrap" | "pre" => WhiteSpace::NoWrap,
                _ => WhiteSpace::Normal,
            }
        }
        "overflow-wrap" | "word-wrap" | "word-break" => {
            s.break_words = matches!(lower.as_str(), "break-word" | "break-all" | "anywhere");
        }
        "width" => s.width = parse_dimension(&lower, em),
        "height" => s.height = parse_dimension(&lower, em),
        "min-width" => s.min_width = parse_dimension(&lower, em),
        "max-width" => {
            s.max_width = match lower.as_str() {
                "none" => Dimension::Auto,
                v => parse_dimension(v, em),
            }
        }
        "margin" => {
            let parts: Vec<&str> = lower.split_whitespace().collect();
            let expanded: Option<[&str; 4]> = match parts.as_slice() {
                [a] => Some([*a, *a, *a, *a]),
                [a, b] => Some([*a, *b, *a, *b]),
                [a, b, c] => Some([*a, *b, *c, *b]),
                [a, b, c, d] => Some([*a, *b, *c, *d]),
                _ => None,
            };
            if let Some([t, r, b, l]) = expanded {
                for (side, v) in [("margin-top", t), ("margin-right", r), ("margin-bottom", b), ("margin-left", l)] {
                    apply_css_property(s, side, v, parent);
                }
            }
        }
        "margin-top" => {
            if let Some(v) = css::parse_length(&lower, em) {
                s.margin_top = v;
            }
        }
        "margin-bottom" => {
            if let Some(v) = css::parse_length(&lower, em) {
                s.margin_bottom = v;
            }
        }
        "margin-left" => {
            s.margin_left_auto = lower == "auto";
            if let Some(v) = css::parse_length(&lower, em) {
                s.margin_left = v;
            }
        }
        "margin-right" => {
            s.margin_right_auto = lower == "auto";
            if let Some(v) = css::parse_length(&lower, em) {
                s.margin_right = v;
            }
        }
        "padding" => {
            if let Some([t, r, b, l]) = css::parse_box_lengths(&lower, em) {
                s.padding_top = t;
                s.padding_right = r;
                s.padding_bottom = b;
                s.padding_left = l;
            }
        }
        "padding-top" | "padding-right" | "padding-bottom" | "padding-left" => {
            if let Some(v) = css::parse_length(&lower, em) {
                match prop {
                    "padding-top" => s.padding_top = v,
                    "padding-right" => s.padding_right = v,
                    "padding-bottom" => s.padding_bottom = v,
                    _ => s.padding_left = v,
                }
            }
        }
        "border" => apply_border_shorthand(s, val),
        "border-width" => {
            if let Some(w) = parse_border_width(&lower, em) {
                s.border_width = w;
            }
        }
        "border-style" => {
            if lower == "none" || lower == "hidden" {
                s.border_width = 0.0;
            }
        }
        "border-color" => {
            if let Some(c) = Color::parse(val) {
                s.border_color = c;
            }
        }
        "line-height" => {
            if lower == "normal" {
                s.line_height = 1.2;
            } else if let Ok(v) = lower.parse::<f32>() {
                s.line_height = v;
            } else if let Some(p) = lower.strip_suffix('%').and_then(|p| p.parse::<f32>().ok()) {
                s.line_height = p / 100.0;
            } else if let Some(len) = css::parse_length(&lower, em) {
                if s.font_size > 0.0 {
                    s.line_height = len / s.font_size;
                }
            }
        }
        "gap" => {
            if let Some(v) = css::parse_length(&lower, em) {
                s.gap = v;
            }
        }
        "grid-template-columns" => {
            let tracks: Option<Vec<GridTrack>> = lower
                .split_ascii_whitespace()
                .map(|t| parse_grid_track(t, em))
                .collect();
            if let Some(tracks) = tracks.filter(|t| !t.is_empty()) {
                s.grid_template_columns = tracks;
            }
        }
        "break-after" | "page-break-after" => {
            s.page_break_after = lower == "always" || lower == "page";
        }
        "break-before" | "page-break-before" => {
            s.page_break_before = lower == "always" || lower == "page";
        }
        "page-break-inside" | "break-inside" => {
            s.page_break_inside_avoid = lower == "avoid";
        }
        _ => {}
    }
}

fn parse_font_size(value: &str, inherited: f32) -> Option<f32> {
    let keyword = match value {
        "xx-small" => Some(9.0),
        "x-small" => Some(10.0),
        "small" => Some(13.0),
        "medium" => Some(16.0),
        "large" => Some(18.0),
        "x-large" => Some(24.0),
        "xx-large" => Some(32.0),
        "smaller" => Some(inherited * 0.83),
        "larger" => Some(inherited * 1.2),
        _ => None,
    };
    keyword
        .or_else(|| {
            value
                .strip_suffix('%')
                .and_then(|p| p.trim().parse::<f32>().ok())
                .map(|p| inherited * p / 100.0)
        })
        .or_else(|| css::parse_length(value, inherited))
        .filter(|v| *v > 0.0)
}

fn parse_grid_track(token: &str, em: f32) -> Option<GridTrack> {
    if token == "auto" {
        return Some(GridTrack::Auto);
    }
    if let Some(n) = token.strip_suffix("fr") {
        return n.parse().ok().map(GridTrack::Fr);
    }
    css::parse_length(token, em).map(GridTrack::Px)
}

fn parse_dimension(value: &str, em: f32) -> Dimension {
    let v = value.trim();
    if v == "auto" {
        Dimension::Auto
    } else if let Some(p) = v.strip_suffix('%') {
        p.trim()
            .parse::<f32>()
            .map(Dimension::Percent)
            .unwrap_or(Dimension::Auto)
    } else {
        css::parse_length(v, em)
            .map(Dimension::Px)
            .unwrap_or(Dimension::Auto)
    }
}

fn parse_border_width(value: &str, em: f32) -> Option<f32> {
    match value {
        "thin" => Some(1.0),
        "medium" => Some(3.0),
        "thick" => Some(5.0),
        v => css::parse_length(v, em),
    }
}

/// `border: <width> <style> <color>` in any order.
fn apply_border_shorthand(s: &mut ComputedStyle, value: &str) {
    let lower = value.to_ascii_lowercase();
    if lower.trim() == "none" || lower.trim() == "0" {
        s.border_width = 0.0;
        return;
    }
    let mut width = None;
    let mut hidden = false;
    for token in lower.split_whitespace() {
        if let Some(w) = parse_border_width(token, s.font_size) {
            width = Some(w);
        } else if token == "none" || token == "hidden" {
            hidden = true;
        } else if let Some(c) = Color::parse(token) {
            s.border_color = c;
        }
    }
    s.border_width = if hidden { 0.0 } else { width.unwrap_or(3.0) };
}

// ---------------------------------------------------------------------------
// Styled DOM tree
// ---------------------------------------------------------------------------

/// A DOM node annotated with its computed style.
#[derive(Debug, Clone)]
pub enum StyledNode {
    Element {
        tag: Tag,
        style: ComputedStyle,
        children: Vec<StyledNode>,
        /// Source attributes (image `src`, `colspan`, ...)
        attrs: HashMap<String, String>,
    },
    Text {
        text: String,
        style: ComputedStyle,
    },
}

impl StyledNode {
    pub fn is_blank_text(&self) -> bool {
        matches!(self, StyledNode::Text { text, .. } if text.trim().is_empty())
    }
}

/// Build a styled tree with no style sheets, resolving styles top-down.
pub fn build_styled_tree(
    nodes: &[DomNode],
    parent_style: Option<&ComputedStyle>,
) -> Vec<StyledNode> {
    style_nodes(nodes, &Cascade::default(), &mut Vec::new(), parent_style)
}

/// Build a styled tree under `cascade`.
pub fn build_cascaded_tree(nodes: &[DomNode], cascade: &Cascade) -> Vec<StyledNode> {
    style_nodes(nodes, cascade, &mut Vec::new(), None)
}

/// Style the children of an element chain. Text nodes, including
/// whitespace-only ones, are kept so that inline runs keep their spacing;
/// elements with `display: none` are dropped with their subtree.
fn style_nodes<'d>(
    nodes: &'d [DomNode],
    cascade: &Cascade,
    ancestors: &mut Vec<&'d ElementNode>,
    parent_style: Option<&ComputedStyle>,
) -> Vec<StyledNode> {
    let mut result = Vec::new();
    for node in nodes {
        match node {
            DomNode::Element(e) => {
                let style = resolve_style(e, ancestors, parent_style, cascade);
                if style.display == Display::None {
                    continue;
                }
                ancestors.push(e);
                let children = style_nodes(&e.children, cascade, ancestors, Some(&style));
                ancestors.pop();
                result.push(StyledNode::Element {
                    tag: e.tag.clone(),
                    style,
                    children,
                    attrs: e.attributes.clone(),
                });
            }
            DomNode::Text(text) => {
                if text.is_empty() {
                    continue;
                }
                let style = parent_style.cloned().unwrap_or_default().for_text();
                result.push(StyledNode::Text {
                    text: text.clone(),
                    style,
                });
            }
        }
    }
    result
}
