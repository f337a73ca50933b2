//! Presentation tree produced by the XSLT engine, and its HTML serializer.
//!
//! Serialization follows the HTML output method rather than strict XML:
//! void elements have no end tag and no self-closing slash, and the content
//! of `<script>`/`<style>` is written raw. The renderer's lenient HTML parser
//! expects exactly this shape.

use quick_xml::escape::{escape, partial_escape};

/// Elements that never have content or an end tag in HTML.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param",
    "source", "track", "wbr",
];

/// Elements whose text content is written without escaping.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputMethod {
    #[default]
    Html,
    Xml,
    Text,
}

/// Settings collected from `xsl:output`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputSettings {
    pub method: OutputMethod,
    pub doctype_public: Option<String>,
    pub doctype_system: Option<String>,
    pub indent: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResultNode {
    Element(ResultElement),
    Text { text: String, escape: bool },
    Comment(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultElement {
    pub name: String,
    /// Attributes in insertion order; setting an existing name replaces it.
    pub attributes: Vec<(String, String)>,
    pub children: Vec<ResultNode>,
}

impl ResultElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn set_attribute(&mut self, name: &str, value: String) {
        match self.attributes.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

impl ResultNode {
    pub fn text(text: impl Into<String>) -> Self {
        ResultNode::Text {
            text: text.into(),
            escape: true,
        }
    }

    /// Concatenated text of this node and its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.push_text(&mut out);
        out
    }

    fn push_text(&self, out: &mut String) {
        match self {
            ResultNode::Text { text, .. } => out.push_str(text),
            ResultNode::Element(e) => e.children.iter().for_each(|c| c.push_text(out)),
            ResultNode::Comment(_) => {}
        }
    }
}

/// The complete output of a transformation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultTree {
    pub nodes: Vec<ResultNode>,
    pub output: OutputSettings,
}

impl ResultTree {
    pub fn text_content(&self) -> String {
        self.nodes.iter().map(ResultNode::text_content).collect()
    }

    /// First top-level element, if any.
    pub fn root_element(&self) -> Option<&ResultElement> {
        self.nodes.iter().find_map(|n| match n {
            ResultNode::Element(e) => Some(e),
            _ => None,
        })
    }
}

/// Serialize a presentation tree as HTML.
pub fn serialize_html(tree: &ResultTree) -> String {
    let mut out = String::new();

    let root_is_html = tree
        .root_element()
        .map(|e| e.name.eq_ignore_ascii_case("html"))
        .unwrap_or(false);
    match (&tree.output.doctype_public, &tree.output.doctype_system) {
        (Some(public), Some(system)) => {
            out.push_str(&format!("<!DOCTYPE html PUBLIC \"{public}\" \"{system}\">\n"))
        }
        (Some(public), None) => out.push_str(&format!("<!DOCTYPE html PUBLIC \"{public}\">\n")),
        (None, Some(system)) => out.push_str(&format!("<!DOCTYPE html SYSTEM \"{system}\">\n")),
        (None, None) if root_is_html => out.push_str("<!DOCTYPE html>\n"),
        (None, None) => {}
    }

    for node in &tree.nodes {
        write_node(&mut out, node, false);
    }
    out
}

fn write_node(out: &mut String, node: &ResultNode, raw: bool) {
    match node {
        ResultNode::Text { text, escape: esc } => {
            if raw || !esc {
                out.push_str(text);
            } else {
                out.push_str(&partial_escape(text.as_str()));
            }
        }
        ResultNode::Comment(c) => {
            out.push_str("<!--");
            out.push_str(c);
            out.push_str("-->");
        }
        ResultNode::Element(e) => write_element(out, e),
    }
}

fn write_element(out: &mut String, e: &ResultElement) {
    let lower = e.name.to_ascii_lowercase();
    out.push('<');
    out.push_str(&e.name);
    for (name, value) in &e.attributes {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape(value.as_str()));
        out.push('"');
    }
    out.push('>');

    if VOID_ELEMENTS.contains(&lower.as_str()) {
        return;
    }
    let raw = RAW_TEXT_ELEMENTS.contains(&lower.as_str());
    for child in &e.children {
        write_node(out, child, raw);
    }
    out.push_str("</");
    out.push_str(&e.name);
    out.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(name: &str, children: Vec<ResultNode>) -> ResultNode {
        let mut e = ResultElement::new(name);
        e.children = children;
        ResultNode::Element(e)
    }

    #[test]
    fn void_elements_have_no_end_tag() {
        let tree = ResultTree {
            nodes: vec![el("p", vec![ResultNode::text("a"), el("br", vec![]), ResultNode::text("b")])],
            ..Default::default()
        };
        assert_eq!(serialize_html(&tree), "<p>a<br>b</p>");
    }

    #[test]
    fn empty_non_void_elements_keep_end_tag() {
        let tree = ResultTree {
            nodes: vec![el("div", vec![])],
            ..Default::default()
        };
        assert_eq!(serialize_html(&tree), "<div></div>");
    }

    #[test]
    fn escapes_text_and_attributes() {
        let mut td = ResultElement::new("td");
        td.set_attribute("title", "a \"b\" & c".into());
        td.children.push(ResultNode::text("1 < 2 & 3"));
        let tree = ResultTree {
            nodes: vec![ResultNode::Element(td)],
            ..Default::default()
        };
        let html = serialize_html(&tree);
        assert!(html.contains("1 &lt; 2 &amp; 3"), "{html}");
        assert!(html.contains("&quot;b&quot;"), "{html}");
    }

    #[test]
    fn style_content_is_raw() {
        let tree = ResultTree {
            nodes: vec![el("style", vec![ResultNode::text("td > b { color: red }")])],
            ..Default::default()
        };
        assert_eq!(serialize_html(&tree), "<style>td > b { color: red }</style>");
    }

    #[test]
    fn html_root_gets_doctype() {
        let tree = ResultTree {
            nodes: vec![el("html", vec![el("body", vec![])])],
            ..Default::default()
        };
        assert!(serialize_html(&tree).starts_with("<!DOCTYPE html>\n<html>"));
    }

    #[test]
    fn replacing_attribute_keeps_position() {
        let mut e = ResultElement::new("td");
        e.set_attribute("class", "a".into());
        e.set_attribute("id", "x".into());
        e.set_attribute("class", "b".into());
        assert_eq!(
            e.attributes,
            vec![("class".to_string(), "b".to_string()), ("id".to_string(), "x".to_string())]
        );
    }
}
