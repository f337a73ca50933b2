//! HTML parser – converts the serialized invoice markup into a simple DOM tree.
//!
//! The parser is lenient and covers the subset the invoice stylesheets emit:
//! - Structural: div, p, h1-h6, ul, ol, li, hr, caption
//! - Tables: table, thead, tbody, tfoot, tr, td, th
//! - Inline: span, b, strong, i, em, u, a, label, font, br, img
//! - Document: html, head, body, title, meta, link, style, script
//! - Styling via `class`, `id` and `style` attributes plus `<style>` blocks

use std::collections::HashMap;

// ---------------------------------------------------------------------------
// DOM types
// ---------------------------------------------------------------------------

/// The tag name of a supported element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Div,
    P,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    Ul,
    Ol,
    Li,
    Hr,
    Table,
    Caption,
    Thead,
    Tbody,
    Tfoot,
    Tr,
    Td,
    Th,
    Span,
    B,
    Strong,
    I,
    Em,
    U,
    A,
    Label,
    Font,
    Br,
    Img,
    Body,
    Html,
    Head,
    Title,
    Meta,
    Link,
    Style,
    Script,
    /// Catch-all for unknown tags – they are kept and laid out as blocks.
    Unknown(String),
}

impl Tag {
    pub fn from_name(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "div" => Tag::Div,
            "p" => Tag::P,
            "h1" => Tag::H1,
            "h2" => Tag::H2,
            "h3" => Tag::H3,
            "h4" => Tag::H4,
            "h5" => Tag::H5,
            "h6" => Tag::H6,
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "hr" => Tag::Hr,
            "table" => Tag::Table,
            "caption" => Tag::Caption,
            "thead" => Tag::Thead,
            "tbody" => Tag::Tbody,
            "tfoot" => Tag::Tfoot,
            "tr" => Tag::Tr,
            "td" => Tag::Td,
            "th" => Tag::Th,
            "span" => Tag::Span,
            "b" => Tag::B,
            "strong" => Tag::Strong,
            "i" => Tag::I,
            "em" => Tag::Em,
            "u" => Tag::U,
            "a" => Tag::A,
            "label" => Tag::Label,
            "font" => Tag::Font,
            "br" => Tag::Br,
            "img" => Tag::Img,
            "body" => Tag::Body,
            "html" => Tag::Html,
            "head" => Tag::Head,
            "title" => Tag::Title,
            "meta" => Tag::Meta,
            "link" => Tag::Link,
            "style" => Tag::Style,
            "script" => Tag::Script,
            other => Tag::Unknown(other.to_string()),
        }
    }

    /// Lower-case element name, as matched by CSS type selectors.
    pub fn name(&self) -> &str {
        match self {
            Tag::Div => "div",
            Tag::P => "p",
            Tag::H1 => "h1",
            Tag::H2 => "h2",
            Tag::H3 => "h3",
            Tag::H4 => "h4",
            Tag::H5 => "h5",
            Tag::H6 => "h6",
            Tag::Ul => "ul",
            Tag::Ol => "ol",
            Tag::Li => "li",
            Tag::Hr => "hr",
            Tag::Table => "table",
            Tag::Caption => "caption",
            Tag::Thead => "thead",
            Tag::Tbody => "tbody",
            Tag::Tfoot => "tfoot",
            Tag::Tr => "tr",
            Tag::Td => "td",
            Tag::Th => "th",
            Tag::Span => "span",
            Tag::B => "b",
            Tag::Strong => "strong",
            Tag::I => "i",
            Tag::Em => "em",
            Tag::U => "u",
            Tag::A => "a",
            Tag::Label => "label",
            Tag::Font => "font",
            Tag::Br => "br",
            Tag::Img => "img",
            Tag::Body => "body",
            Tag::Html => "html",
            Tag::Head => "head",
            Tag::Title => "title",
            Tag::Meta => "meta",
            Tag::Link => "link",
            Tag::Style => "style",
            Tag::Script => "script",
            Tag::Unknown(name) => name,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            Tag::Span
                | Tag::B
                | Tag::Strong
                | Tag::I
                | Tag::Em
                | Tag::U
                | Tag::A
                | Tag::Label
                | Tag::Font
                | Tag::Br
                | Tag::Img
        )
    }

    /// Elements that never produce boxes.
    pub fn is_metadata(&self) -> bool {
        matches!(
            self,
            Tag::Head | Tag::Title | Tag::Meta | Tag::Link | Tag::Style | Tag::Script
        )
    }

    pub fn is_row_group(&self) -> bool {
        matches!(self, Tag::Thead | Tag::Tbody | Tag::Tfoot)
    }

    /// Elements without content or end tag.
    pub fn is_void(&self) -> bool {
        matches!(self, Tag::Br | Tag::Hr | Tag::Img | Tag::Meta | Tag::Link)
            || matches!(
                self,
                Tag::Unknown(name)
                    if matches!(name.as_str(), "area" | "base" | "col" | "embed" | "input" | "param" | "source" | "track" | "wbr")
            )
    }

    /// Elements whose content is kept verbatim.
    pub fn is_raw_text(&self) -> bool {
        matches!(self, Tag::Style | Tag::Script)
    }
}

/// A node in our DOM tree.
#[derive(Debug, Clone)]
pub enum DomNode {
    Element(ElementNode),
    Text(String),
}

impl DomNode {
    fn is_blank_text(&self) -> bool {
        matches!(self, DomNode::Text(t) if t.trim().is_empty())
    }
}

/// An element node carrying tag, attributes, and children.
#[derive(Debug, Clone)]
pub struct ElementNode {
    pub tag: Tag,
    pub attributes: HashMap<String, String>,
    pub children: Vec<DomNode>,
}

impl ElementNode {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attributes
            .get("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().contains(&class)
    }

    pub fn id(&self) -> Option<&str> {
        self.attributes.get("id").map(|s| s.as_str())
    }

    pub fn inline_style(&self) -> Option<&str> {
        self.attributes.get("style").map(|s| s.as_str())
    }

    pub fn src(&self) -> Option<&str> {
        self.attributes.get("src").map(|s| s.as_str())
    }

    /// Number of columns a table cell spans (at least 1).
    pub fn colspan(&self) -> usize {
        self.attributes
            .get("colspan")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(1)
            .max(1)
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            match child {
                DomNode::Text(t) => out.push_str(t),
                DomNode::Element(e) => out.push_str(&e.text_content()),
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Parser – simple recursive descent over HTML
// ---------------------------------------------------------------------------

/// Parse an HTML string into a list of DOM nodes.
///
/// Unbalanced markup is tolerated: a closing tag ends the innermost open
/// element with that name, and closing tags that match nothing are dropped.
pub fn parse_html(html: &str) -> Vec<DomNode> {
    let mut parser = Parser::new(html);
    parser.parse_nodes()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    /// Names of the currently open elements, outermost first.
    open: Vec<String>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            open: Vec::new(),
        }
    }

    fn parse_nodes(&mut self) -> Vec<DomNode> {
        let mut nodes = Vec::new();
        while !self.eof() {
            if self.starts_with("</") {
                let name = self.peek_closing_name();
                if self.open.iter().any(|n| *n == name) {
                    break;
                }
                // Stray closing tag.
                self.skip_past('>');
                continue;
            }
            if let Some(node) = self.parse_node() {
                nodes.push(node);
            }
        }
        nodes
    }

    fn parse_node(&mut self) -> Option<DomNode> {
        if self.starts_with("<!--") {
            self.skip_comment();
            return None;
        }
        if self.starts_with("<!") || self.starts_with("<?") {
            // Doctype / processing instructions
            self.skip_past('>');
            return None;
        }
        if self.starts_with("<") && self.next_is_tag_start() {
            Some(self.parse_element())
        } else {
            Some(self.parse_text())
        }
    }

    fn next_is_tag_start(&self) -> bool {
        self.input[self.pos + 1..]
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic())
            .unwrap_or(false)
    }

    fn parse_text(&mut self) -> DomNode {
        let start = self.pos;
        // A lone '<' that does not open a tag is text.
        self.advance(1);
        while !self.eof() && !self.starts_with("<") {
            self.advance(1);
        }
        let text = &self.input[start..self.pos];
        DomNode::Text(decode_entities(text))
    }

    fn parse_element(&mut self) -> DomNode {
        // Consume '<'
        self.advance(1);
        let tag_name = self.parse_tag_name().to_ascii_lowercase();
        let tag = Tag::from_name(&tag_name);
        let mut elem = ElementNode::new(tag.clone());

        // Parse attributes
        loop {
            self.skip_whitespace();
            if self.eof() || self.starts_with(">") || self.starts_with("/>") {
                break;
            }
            let (key, value) = self.parse_attribute();
            if key.is_empty() {
                // Garbage inside the tag; skip one character.
                self.advance(1);
                continue;
            }
            elem.attributes.entry(key).or_insert(value);
        }

        if self.starts_with("/>") {
            self.advance(2);
            return DomNode::Element(elem);
        }
        if self.starts_with(">") {
            self.advance(1);
        }
        if tag.is_void() {
            return DomNode::Element(elem);
        }

        if tag.is_raw_text() {
            let text = self.take_raw_text(&tag_name);
            if !text.is_empty() {
                elem.children.push(DomNode::Text(text));
            }
            return DomNode::Element(elem);
        }

        // Parse children
        self.open.push(tag_name.clone());
        elem.children = self.parse_nodes();
        self.open.pop();

        // Consume our own closing tag; a closing tag for an outer element
        // is left for that element.
        if self.starts_with("</") && self.peek_closing_name() == tag_name {
            self.skip_past('>');
        }

        DomNode::Element(elem)
    }

    /// Read raw content up to `</name>` and consume the closing tag.
    fn take_raw_text(&mut self, name: &str) -> String {
        let rest = &self.input[self.pos..];
        let needle = format!("</{name}");
        let end = rest
            .to_ascii_lowercase()
            .find(&needle)
            .unwrap_or(rest.len());
        let text = rest[..end].to_string();
        self.pos += end;
        if !self.eof() {
            self.skip_past('>');
        }
        text
    }

    fn peek_closing_name(&self) -> String {
        self.input[self.pos + 2..]
            .chars()
            .take_while(|c| is_name_char(*c))
            .collect::<String>()
            .to_ascii_lowercase()
    }

    fn parse_tag_name(&mut self) -> String {
        let start = self.pos;
        while !self.eof() && is_name_char(self.current_char()) {
            self.advance(1);
        }
        self.input[start..self.pos].to_string()
    }

    fn parse_attribute(&mut self) -> (String, String) {
        let key = self.parse_tag_name().to_ascii_lowercase();
        self.skip_whitespace();
        if !self.starts_with("=") {
            return (key, String::new());
        }
        self.advance(1); // skip '='
        self.skip_whitespace();
        let value = self.parse_attr_value();
        (key, value)
    }

    fn parse_attr_value(&mut self) -> String {
        for quote in ["\"", "'"] {
            if self.starts_with(quote) {
                self.advance(1);
                let start = self.pos;
                while !self.eof() && !self.starts_with(quote) {
                    self.advance(1);
                }
                let val = self.input[start..self.pos].to_string();
                if !self.eof() {
                    self.advance(1);
                }
                return decode_entities(&val);
            }
        }
        let start = self.pos;
        while !self.eof() {
            let c = self.current_char();
            if c.is_whitespace() || c == '>' {
                break;
            }
            self.advance(1);
        }
        decode_entities(&self.input[start..self.pos])
    }

    fn skip_whitespace(&mut self) {
        while !self.eof() && self.current_char().is_whitespace() {
            self.advance(1);
        }
    }

    fn skip_past(&mut self, end: char) {
        while !self.eof() && self.current_char() != end {
            self.advance(1);
        }
        if !self.eof() {
            self.advance(1);
        }
    }

    fn skip_comment(&mut self) {
        self.advance(4); // skip <!--
        while !self.eof() && !self.starts_with("-->") {
            self.advance(1);
        }
        if !self.eof() {
            self.advance(3);
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn current_char(&self) -> char {
        self.input[self.pos..].chars().next().unwrap_or('\0')
    }

    fn advance(&mut self, n: usize) {
        // Advance by `n` characters (not bytes).
        for _ in 0..n {
            if let Some(c) = self.input[self.pos..].chars().next() {
                self.pos += c.len_utf8();
            }
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')
}

/// Named entities the invoice stylesheets are known to produce.
const NAMED_ENTITIES: &[(&str, char)] = &[
    ("amp", '&'),
    ("lt", '<'),
    ("gt", '>'),
    ("quot", '"'),
    ("apos", '\''),
    ("nbsp", '\u{00A0}'),
    ("euro", '\u{20AC}'),
    ("copy", '\u{00A9}'),
    ("reg", '\u{00AE}'),
    ("deg", '\u{00B0}'),
    ("laquo", '\u{00AB}'),
    ("raquo", '\u{00BB}'),
    ("agrave", '\u{00E0}'),
    ("aacute", '\u{00E1}'),
    ("egrave", '\u{00E8}'),
    ("eacute", '\u{00E9}'),
    ("igrave", '\u{00EC}'),
    ("ograve", '\u{00F2}'),
    ("ugrave", '\u{00F9}'),
    ("Agrave", '\u{00C0}'),
    ("Egrave", '\u{00C8}'),
    ("Eacute", '\u{00C9}'),
];

/// Decode character references in a single left-to-right pass so that
/// `&amp;lt;` stays `&lt;`. Unknown references are left untouched.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        let decoded = tail
            .find(';')
            .filter(|&semi| semi > 0 && semi <= 10)
            .and_then(|semi| decode_reference(&tail[..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse::<u32>().ok()?,
        };
        return char::from_u32(code);
    }
    NAMED_ENTITIES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, c)| *c)
}

// ---------------------------------------------------------------------------
// Convenience helpers
// ---------------------------------------------------------------------------

/// Find the `<body>` element and return its children, or return all nodes if
/// no `<body>` is present.
pub fn body_children(nodes: &[DomNode]) -> Vec<DomNode> {
    for node in nodes {
        if let DomNode::Element(e) = node {
            if e.tag == Tag::Body {
                return e.children.clone();
            }
            // Recurse into <html>
            if e.tag == Tag::Html {
                let inner = body_children(&e.children);
                if !inner.is_empty() {
                    return inner;
                }
            }
        }
    }
    nodes.to_vec()
}

/// Contents of every `<style>` element in document order. Blocks whose
/// `media` attribute excludes print are skipped.
pub fn collect_style_blocks(nodes: &[DomNode]) -> Vec<String> {
    let mut blocks = Vec::new();
    collect_styles_into(nodes, &mut blocks);
    blocks
}

fn collect_styles_into(nodes: &[DomNode], blocks: &mut Vec<String>) {
    for node in nodes {
        if let DomNode::Element(e) = node {
            if e.tag == Tag::Style {
                let media = e.attributes.get("media").map(String::as_str).unwrap_or("");
                if crate::css::media_applies(media) {
                    blocks.push(e.text_content());
                }
            } else {
                collect_styles_into(&e.children, blocks);
            }
        }
    }
}

/// Hoist rows out of `thead`/`tbody`/`tfoot` so every table has its rows
/// (and an optional caption) as direct children, and drop the whitespace
/// text between table parts.
pub fn normalize_tables(nodes: &mut [DomNode]) {
    for node in nodes.iter_mut() {
        let DomNode::Element(e) = node else { continue };
        normalize_tables(&mut e.children);
        match e.tag {
            Tag::Table => {
                let children = std::mem::take(&mut e.children);
                for child in children {
                    match child {
                        DomNode::Element(group) if group.tag.is_row_group() => e
                            .children
                            .extend(group.children.into_iter().filter(|c| !c.is_blank_text())),
                        DomNode::Element(col) if matches!(&col.tag, Tag::Unknown(n) if n == "colgroup" || n == "col") => {}
                        c if c.is_blank_text() => {}
                        c => e.children.push(c),
                    }
                }
            }
            Tag::Tr | Tag::Thead | Tag::Tbody | Tag::Tfoot => {
                e.children.retain(|c| !c.is_blank_text());
            }
            _ => {}
        }
    }
}
