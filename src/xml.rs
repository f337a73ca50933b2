//! XML document model – an arena tree built from `quick-xml` events.
//!
//! Nodes live in a single `Vec` and are addressed by [`NodeId`]. Nodes are
//! appended in document order (an element, then its attributes, then its
//! content), so comparing ids compares document order. Namespace prefixes are
//! resolved to URIs while parsing.

use std::sync::Arc;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum XmlError {
    #[error("XML syntax error at byte {position}: {message}")]
    Syntax { position: usize, message: String },
    #[error("{0}")]
    Structure(String),
    #[error("undeclared namespace prefix '{0}'")]
    UnboundPrefix(String),
}

/// Index of a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

/// A resolved qualified name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
    pub namespace: Option<String>,
}

impl QName {
    /// The lexical `prefix:local` form.
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{p}:{}", self.local),
            None => self.local.clone(),
        }
    }

    pub fn is(&self, namespace: Option<&str>, local: &str) -> bool {
        self.local == local && self.namespace.as_deref() == namespace
    }
}

/// In-scope namespace bindings of an element, `(prefix, uri)`; the default
/// namespace has an empty prefix.
pub type Namespaces = Arc<Vec<(String, String)>>;

#[derive(Debug, Clone)]
pub enum NodeKind {
    Root,
    Element { name: QName, namespaces: Namespaces },
    Attribute { name: QName, value: String },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    parent: Option<NodeId>,
    kind: NodeKind,
    attributes: Vec<NodeId>,
    children: Vec<NodeId>,
}

/// A parsed, immutable XML document.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Document {
    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn attributes(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].attributes
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Element { .. })
    }

    pub fn is_attribute(&self, id: NodeId) -> bool {
        matches!(self.kind(id), NodeKind::Attribute { .. })
    }

    /// The single top-level element.
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .iter()
            .copied()
            .find(|&c| self.is_element(c))
    }

    pub fn name(&self, id: NodeId) -> Option<&QName> {
        match self.kind(id) {
            NodeKind::Element { name, .. } | NodeKind::Attribute { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn local_name(&self, id: NodeId) -> &str {
        self.name(id).map(|n| n.local.as_str()).unwrap_or("")
    }

    /// Value of an attribute without namespace.
    pub fn attribute(&self, id: NodeId, local: &str) -> Option<&str> {
        self.attributes(id).iter().find_map(|&a| match self.kind(a) {
            NodeKind::Attribute { name, value } if name.is(None, local) => Some(value.as_str()),
            _ => None,
        })
    }

    /// Element children, skipping text and comments.
    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(id).iter().copied().filter(|&c| self.is_element(c))
    }

    /// In-scope namespaces of the nearest element at or above `id`.
    pub fn namespaces(&self, id: NodeId) -> Option<&Namespaces> {
        let mut cur = Some(id);
        while let Some(n) = cur {
            if let NodeKind::Element { namespaces, .. } = self.kind(n) {
                return Some(namespaces);
            }
            cur = self.parent(n);
        }
        None
    }

    pub fn resolve_prefix(&self, id: NodeId, prefix: &str) -> Option<String> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE.to_string());
        }
        self.namespaces(id)?
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.clone())
    }

    /// XPath string-value of a node.
    pub fn string_value(&self, id: NodeId) -> String {
        match self.kind(id) {
            NodeKind::Attribute { value, .. } => value.clone(),
            NodeKind::Text(t) | NodeKind::Comment(t) => t.clone(),
            NodeKind::Root | NodeKind::Element { .. } => {
                let mut out = String::new();
                self.collect_text(id, &mut out);
                out
            }
        }
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for &c in self.children(id) {
            match self.kind(c) {
                NodeKind::Text(t) => out.push_str(t),
                NodeKind::Element { .. } => self.collect_text(c, out),
                _ => {}
            }
        }
    }

    /// Descendants of `id` in document order (not including `id`).
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.push_descendants(id, &mut out);
        out
    }

    fn push_descendants(&self, id: NodeId, out: &mut Vec<NodeId>) {
        for &c in self.children(id) {
            out.push(c);
            self.push_descendants(c, out);
        }
    }

    /// Copy of the document without the whitespace-only text children of
    /// elements for which `strip` returns true.
    pub fn strip_whitespace(&self, strip: impl Fn(&QName) -> bool) -> Document {
        let mut out = Document { nodes: Vec::new() };
        let root = out.push(None, NodeKind::Root);
        self.copy_children(self.root(), root, &mut out, &strip);
        out
    }

    fn copy_children(
        &self,
        from: NodeId,
        to: NodeId,
        out: &mut Document,
        strip: &dyn Fn(&QName) -> bool,
    ) {
        let strip_here = self.name(from).map(strip).unwrap_or(false);
        for &child in self.children(from) {
            if let NodeKind::Text(t) = self.kind(child) {
                if strip_here && t.trim().is_empty() {
                    continue;
                }
            }
            let id = out.push(Some(to), self.kind(child).clone());
            out.nodes[to.0].children.push(id);
            for &a in self.attributes(child) {
                let attr = out.push(Some(id), self.kind(a).clone());
                out.nodes[id.0].attributes.push(attr);
            }
            self.copy_children(child, id, out, strip);
        }
    }

    fn push(&mut self, parent: Option<NodeId>, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(NodeData {
            parent,
            kind,
            attributes: Vec::new(),
            children: Vec::new(),
        });
        id
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse a well-formed XML document.
pub fn parse(bytes: &[u8]) -> Result<Document, XmlError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = Reader::from_reader(bytes);
    reader.trim_text(false);
    reader.check_end_names(true);

    let mut doc = Document { nodes: Vec::new() };
    let root = doc.push(None, NodeKind::Root);
    let mut stack: Vec<NodeId> = vec![root];
    let mut buf = Vec::new();

    loop {
        let position = reader.buffer_position();
        let event = reader.read_event_into(&mut buf).map_err(|e| XmlError::Syntax {
            position,
            message: e.to_string(),
        })?;
        let parent = *stack.last().unwrap_or(&root);
        match event {
            Event::Start(e) => {
                let id = open_element(&mut doc, parent, &e, &reader, stack.len() == 1)?;
                stack.push(id);
            }
            Event::Empty(e) => {
                open_element(&mut doc, parent, &e, &reader, stack.len() == 1)?;
            }
            Event::End(_) => {
                if stack.len() <= 1 {
                    return Err(XmlError::Structure("unexpected closing tag".into()));
                }
                stack.pop();
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(|err| XmlError::Syntax {
                    position,
                    message: err.to_string(),
                })?;
                if parent == root {
                    if !text.trim().is_empty() {
                        return Err(XmlError::Structure(
                            "text content outside the document element".into(),
                        ));
                    }
                } else {
                    push_text(&mut doc, parent, &text);
                }
            }
            Event::CData(e) => {
                let text = reader.decoder().decode(&e).map_err(|err| XmlError::Syntax {
                    position,
                    message: err.to_string(),
                })?;
                if parent == root {
                    return Err(XmlError::Structure("CDATA outside the document element".into()));
                }
                push_text(&mut doc, parent, &text);
            }
            Event::Comment(e) => {
                let text = reader.decoder().decode(&e).map_err(|err| XmlError::Syntax {
                    position,
                    message: err.to_string(),
                })?;
                let id = doc.push(Some(parent), NodeKind::Comment(text.into_owned()));
                doc.nodes[parent.0].children.push(id);
            }
            Event::Eof => break,
            // Declarations, doctypes and processing instructions carry no
            // content for the transformer.
            _ => {}
        }
        buf.clear();
    }

    if stack.len() > 1 {
        let open = doc.name(stack[stack.len() - 1]).map(|n| n.qualified());
        return Err(XmlError::Structure(format!(
            "unexpected end of document, <{}> is not closed",
            open.unwrap_or_default()
        )));
    }
    if doc.document_element().is_none() {
        return Err(XmlError::Structure("document has no root element".into()));
    }
    Ok(doc)
}

/// Parse a UTF-8 string. Convenience for tests and embedded resources.
pub fn parse_str(s: &str) -> Result<Document, XmlError> {
    parse(s.as_bytes())
}

fn push_text(doc: &mut Document, parent: NodeId, text: &str) {
    // Merge adjacent text (e.g. text + CDATA + text) into one node.
    if let Some(&last) = doc.nodes[parent.0].children.last() {
        if let NodeKind::Text(existing) = &mut doc.nodes[last.0].kind {
            existing.push_str(text);
            return;
        }
    }
    let id = doc.push(Some(parent), NodeKind::Text(text.to_string()));
    doc.nodes[parent.0].children.push(id);
}

fn open_element<R>(
    doc: &mut Document,
    parent: NodeId,
    start: &BytesStart<'_>,
    reader: &Reader<R>,
    top_level: bool,
) -> Result<NodeId, XmlError> {
    if top_level && doc.document_element().is_some() {
        return Err(XmlError::Structure(
            "document has more than one root element".into(),
        ));
    }

    let decode = |bytes: &[u8]| -> Result<String, XmlError> {
        reader
            .decoder()
            .decode(bytes)
            .map(|c| c.into_owned())
            .map_err(|e| XmlError::Structure(e.to_string()))
    };

    // First pass: namespace declarations, plain attributes.
    let inherited: Vec<(String, String)> = doc
        .namespaces(parent)
        .map(|ns| ns.as_ref().clone())
        .unwrap_or_default();
    let mut namespaces = inherited;
    let mut raw_attrs: Vec<(String, String)> = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| XmlError::Structure(e.to_string()))?;
        let key = decode(attr.key.as_ref())?;
        let value = attr
            .unescape_value()
            .map_err(|e| XmlError::Structure(e.to_string()))?
            .into_owned();
        if key == "xmlns" {
            namespaces.push((String::new(), value));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            namespaces.push((prefix.to_string(), value));
        } else {
            raw_attrs.push((key, value));
        }
    }
    let namespaces: Namespaces = Arc::new(namespaces);

    let lookup = |prefix: &str| -> Option<String> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE.to_string());
        }
        namespaces
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.clone())
            .filter(|uri| !uri.is_empty())
    };

    let raw_name = decode(start.name().as_ref())?;
    let name = match raw_name.split_once(':') {
        Some((prefix, local)) => QName {
            namespace: Some(
                lookup(prefix).ok_or_else(|| XmlError::UnboundPrefix(prefix.to_string()))?,
            ),
            prefix: Some(prefix.to_string()),
            local: local.to_string(),
        },
        None => QName {
            namespace: lookup(""),
            prefix: None,
            local: raw_name.clone(),
        },
    };

    let id = doc.push(
        Some(parent),
        NodeKind::Element {
            name,
            namespaces: Arc::clone(&namespaces),
        },
    );
    doc.nodes[parent.0].children.push(id);

    for (key, value) in raw_attrs {
        let name = match key.split_once(':') {
            Some((prefix, local)) => QName {
                namespace: Some(
                    lookup(prefix).ok_or_else(|| XmlError::UnboundPrefix(prefix.to_string()))?,
                ),
                prefix: Some(prefix.to_string()),
                local: local.to_string(),
            },
            None => QName {
                namespace: None,
                prefix: None,
                local: key,
            },
        };
        let attr_id = doc.push(Some(id), NodeKind::Attribute { name, value });
        doc.nodes[id.0].attributes.push(attr_id);
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<p:FatturaElettronica versione="FPR12" xmlns:p="http://ivaservizi.agenziaentrate.gov.it/docs/xsd/fatture/v1.2">
  <FatturaElettronicaHeader>
    <CedentePrestatore><Denominazione>ACME &amp; Figli</Denominazione></CedentePrestatore>
  </FatturaElettronicaHeader>
  <!-- note -->
</p:FatturaElettronica>"#;

    #[test]
    fn parses_namespaced_root() {
        let doc = parse_str(SAMPLE).unwrap();
        let root = doc.document_element().unwrap();
        let name = doc.name(root).unwrap();
        assert_eq!(name.local, "FatturaElettronica");
        assert_eq!(name.prefix.as_deref(), Some("p"));
        assert_eq!(
            name.namespace.as_deref(),
            Some("http://ivaservizi.agenziaentrate.gov.it/docs/xsd/fatture/v1.2")
        );
        assert_eq!(doc.attribute(root, "versione"), Some("FPR12"));
    }

    #[test]
    fn unprefixed_children_have_no_namespace() {
        let doc = parse_str(SAMPLE).unwrap();
        let root = doc.document_element().unwrap();
        let header = doc.element_children(root).next().unwrap();
        assert_eq!(doc.name(header).unwrap().namespace, None);
        assert!(doc.string_value(header).contains("ACME & Figli"));
    }

    #[test]
    fn ids_follow_document_order() {
        let doc = parse_str("<a x='1'><b/><c>t</c></a>").unwrap();
        let a = doc.document_element().unwrap();
        let attr = doc.attributes(a)[0];
        let kids: Vec<_> = doc.element_children(a).collect();
        assert!(a < attr && attr < kids[0] && kids[0] < kids[1]);
    }

    #[test]
    fn rejects_mismatched_tags() {
        assert!(parse_str("<a><b></a></b>").is_err());
    }

    #[test]
    fn rejects_unclosed_root() {
        let err = parse_str("<a><b></b>").unwrap_err();
        assert!(matches!(err, XmlError::Structure(_)));
    }

    #[test]
    fn rejects_empty_and_multi_root() {
        assert!(parse_str("").is_err());
        assert!(parse_str("<a/><b/>").is_err());
        assert!(parse_str("just text").is_err());
    }

    #[test]
    fn rejects_unbound_prefix() {
        assert_eq!(
            parse_str("<x:a/>").unwrap_err(),
            XmlError::UnboundPrefix("x".into())
        );
    }

    #[test]
    fn cdata_merges_with_text() {
        let doc = parse_str("<a>one <![CDATA[<two>]]> three</a>").unwrap();
        let a = doc.document_element().unwrap();
        assert_eq!(doc.children(a).len(), 1);
        assert_eq!(doc.string_value(a), "one <two> three");
    }

    #[test]
    fn strip_whitespace_keeps_order_and_content() {
        let doc = parse_str("<a>\n  <b x='1'> </b>\n  <c>t</c>\n</a>").unwrap();
        let stripped = doc.strip_whitespace(|name| name.local == "a");
        let a = stripped.document_element().unwrap();
        let kids = stripped.children(a);
        assert_eq!(kids.len(), 2);
        // <b> is not stripped, so its whitespace child survives.
        assert_eq!(stripped.children(kids[0]).len(), 1);
        assert_eq!(stripped.attribute(kids[0], "x"), Some("1"));
        assert!(kids[0] < kids[1]);
    }

    #[test]
    fn strips_utf8_bom() {
        let mut bytes = b"\xEF\xBB\xBF".to_vec();
        bytes.extend_from_slice(b"<a/>");
        assert!(parse(&bytes).is_ok());
    }
}
