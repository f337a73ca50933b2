//! XSLT 1.0 transformer.
//!
//! [`Stylesheet::parse`] compiles an `xsl:stylesheet` document into template
//! rules and instruction trees; [`Stylesheet::transform`] runs it against a
//! source [`Document`] and yields a [`ResultTree`]. The engine covers what
//! invoice stylesheets use: template rules with modes and priorities, named
//! templates with parameters, sorting, conditionals, variables, attribute
//! value templates, `format-number` with named decimal formats and
//! whitespace stripping. Imports, includes and keys are rejected.

use std::cmp::Ordering;
use std::sync::Arc;

use thiserror::Error;

use crate::markup::{OutputMethod, OutputSettings, ResultElement, ResultNode, ResultTree};
use crate::xml::{self, Document, NodeId, NodeKind, QName, XmlError};
use crate::xpath::{
    self, axis_nodes, compare_numbers, filter_by_predicate, node_test_matches, Axis, Context,
    DecimalFormat, Environment, Expr, NodeTest, Step, Value, XPathError,
};

pub const XSLT_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";

/// Maximum nesting of template invocations.
pub const MAX_DEPTH: usize = 512;

/// Stack of the thread a transformation runs on. Template invocations nest
/// on the native stack, so the run must not depend on the caller's stack.
const TRANSFORM_STACK_SIZE: usize = 64 * 1024 * 1024;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum XsltError {
    #[error("stylesheet is not well-formed: {0}")]
    Parse(#[from] XmlError),
    #[error("{0}")]
    Compile(String),
    #[error(transparent)]
    XPath(#[from] XPathError),
    #[error("no template named '{0}'")]
    UnknownTemplate(String),
    #[error("template recursion deeper than {0} levels")]
    RecursionLimit(usize),
    #[error("terminated by xsl:message: {0}")]
    Terminated(String),
    #[error("transformation thread failed: {0}")]
    Thread(String),
}

type XsltResult<T> = Result<T, XsltError>;

// ---------------------------------------------------------------------------
// Compiled form
// ---------------------------------------------------------------------------

/// Attribute value template: literal text with `{expr}` holes.
#[derive(Debug, Clone)]
struct Avt(Vec<AvtPart>);

#[derive(Debug, Clone)]
enum AvtPart {
    Literal(String),
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SortType {
    Text,
    Number,
}

#[derive(Debug, Clone)]
struct SortKey {
    select: Expr,
    data_type: SortType,
    descending: bool,
}

#[derive(Debug, Clone)]
struct Variable {
    name: String,
    select: Option<Expr>,
    body: Vec<Instruction>,
}

#[derive(Debug, Clone)]
enum Instruction {
    Text {
        text: String,
        escape: bool,
    },
    LiteralElement {
        name: String,
        attributes: Vec<(String, Avt)>,
        body: Vec<Instruction>,
    },
    ValueOf {
        select: Expr,
        escape: bool,
    },
    ApplyTemplates {
        select: Option<Expr>,
        mode: Option<String>,
        sorts: Vec<SortKey>,
        params: Vec<Variable>,
    },
    CallTemplate {
        name: String,
        params: Vec<Variable>,
    },
    ForEach {
        select: Expr,
        sorts: Vec<SortKey>,
        body: Vec<Instruction>,
    },
    If {
        test: Expr,
        body: Vec<Instruction>,
    },
    Choose {
        branches: Vec<(Expr, Vec<Instruction>)>,
        otherwise: Vec<Instruction>,
    },
    Variable(Variable),
    Element {
        name: Avt,
        body: Vec<Instruction>,
    },
    Attribute {
        name: Avt,
        body: Vec<Instruction>,
    },
    Copy {
        body: Vec<Instruction>,
    },
    CopyOf {
        select: Expr,
    },
    Comment {
        body: Vec<Instruction>,
    },
    Number {
        value: Option<Expr>,
        width: usize,
    },
    Message {
        body: Vec<Instruction>,
        terminate: bool,
    },
}

#[derive(Debug, Clone)]
struct Template {
    name: Option<String>,
    params: Vec<Variable>,
    body: Vec<Instruction>,
}

/// One alternative of a match pattern, with the priority it competes at.
#[derive(Debug, Clone)]
struct Rule {
    template: usize,
    mode: Option<String>,
    absolute: bool,
    steps: Vec<Step>,
    priority: f64,
}

/// A compiled XSLT stylesheet. Immutable and reusable across transforms.
#[derive(Debug, Clone)]
pub struct Stylesheet {
    templates: Vec<Template>,
    rules: Vec<Rule>,
    globals: Vec<Variable>,
    decimal_formats: Vec<(Option<String>, DecimalFormat)>,
    strip_space: Vec<NodeTest>,
    preserve_space: Vec<NodeTest>,
    output: OutputSettings,
}

impl Stylesheet {
    /// Compile a stylesheet from its XML bytes.
    pub fn parse(bytes: &[u8]) -> XsltResult<Self> {
        let doc = xml::parse(bytes)?;
        let top = doc
            .document_element()
            .ok_or_else(|| XsltError::Compile("stylesheet has no document element".into()))?;
        if !is_xsl(&doc, top, "stylesheet") && !is_xsl(&doc, top, "transform") {
            return Err(XsltError::Compile(format!(
                "<{}> is not an xsl:stylesheet",
                doc.name(top).map(|n| n.qualified()).unwrap_or_default()
            )));
        }

        let mut compiler = Compiler {
            doc: &doc,
            called: Vec::new(),
        };
        let mut sheet = Stylesheet {
            templates: Vec::new(),
            rules: Vec::new(),
            globals: Vec::new(),
            decimal_formats: Vec::new(),
            strip_space: Vec::new(),
            preserve_space: Vec::new(),
            output: OutputSettings::default(),
        };

        for child in doc.element_children(top) {
            if !is_xsl_element(&doc, child) {
                // Top-level elements in other namespaces are user data.
                continue;
            }
            match doc.local_name(child) {
                "template" => compiler.template(child, &mut sheet)?,
                "variable" | "param" => sheet.globals.push(compiler.variable(child)?),
                "output" => sheet.output = compiler.output(child),
                "strip-space" => sheet.strip_space.extend(compiler.name_tests(child)?),
                "preserve-space" => sheet.preserve_space.extend(compiler.name_tests(child)?),
                "decimal-format" => sheet.decimal_formats.push(compiler.decimal_format(child)?),
                other => {
                    return Err(XsltError::Compile(format!(
                        "unsupported top-level element xsl:{other}"
                    )))
                }
            }
        }

        for name in &compiler.called {
            if !sheet.templates.iter().any(|t| t.name.as_ref() == Some(name)) {
                return Err(XsltError::UnknownTemplate(name.clone()));
            }
        }

        log::debug!(
            "compiled stylesheet: {} templates, {} match rules, {} globals",
            sheet.templates.len(),
            sheet.rules.len(),
            sheet.globals.len()
        );
        Ok(sheet)
    }

    pub fn output(&self) -> &OutputSettings {
        &self.output
    }

    /// Run the stylesheet against `source`.
    ///
    /// The run happens on a scoped thread with a stack sized for
    /// [`MAX_DEPTH`], so runaway recursion ends in
    /// [`XsltError::RecursionLimit`] on any caller thread.
    pub fn transform(&self, source: &Document) -> XsltResult<ResultTree> {
        std::thread::scope(|scope| {
            std::thread::Builder::new()
                .name("xslt".into())
                .stack_size(TRANSFORM_STACK_SIZE)
                .spawn_scoped(scope, || self.run(source))
                .map_err(|e| XsltError::Thread(e.to_string()))?
                .join()
                .map_err(|_| XsltError::Thread("panicked".into()))?
        })
    }

    fn run(&self, source: &Document) -> XsltResult<ResultTree> {
        let stripped;
        let doc = if self.strip_space.is_empty() {
            source
        } else {
            stripped = source.strip_whitespace(|name| self.strips(name));
            &stripped
        };

        let mut run = Transformer {
            sheet: self,
            doc,
            globals: Vec::new(),
            locals: Vec::new(),
            depth: 0,
        };
        let root = Frame {
            node: doc.root(),
            position: 1,
            size: 1,
        };
        for var in &self.globals {
            let value = run.variable_value(var, root)?;
            run.globals.push((var.name.clone(), value));
        }

        let mut sink = Sink::default();
        run.apply_templates(vec![doc.root()], None, Vec::new(), &mut sink)?;
        if !sink.attributes.is_empty() {
            log::warn!(
                "discarding {} attribute(s) created outside any element",
                sink.attributes.len()
            );
        }
        Ok(ResultTree {
            nodes: sink.nodes,
            output: self.output.clone(),
        })
    }

    fn strips(&self, name: &QName) -> bool {
        let matches = |test: &NodeTest| match test {
            NodeTest::AnyName => true,
            NodeTest::Namespace(uri) => name.namespace.as_deref() == Some(uri.as_str()),
            NodeTest::Name { namespace, local } => name.is(namespace.as_deref(), local),
            _ => false,
        };
        self.strip_space.iter().any(matches) && !self.preserve_space.iter().any(matches)
    }
}

fn is_xsl_element(doc: &Document, id: NodeId) -> bool {
    doc.name(id)
        .map(|n| n.namespace.as_deref() == Some(XSLT_NAMESPACE))
        .unwrap_or(false)
}

fn is_xsl(doc: &Document, id: NodeId, local: &str) -> bool {
    is_xsl_element(doc, id) && doc.local_name(id) == local
}

// ---------------------------------------------------------------------------
// Compiler
// ---------------------------------------------------------------------------

struct Compiler<'d> {
    doc: &'d Document,
    /// Names used by xsl:call-template, checked once all templates are known.
    called: Vec<String>,
}

impl<'d> Compiler<'d> {
    fn required(&self, id: NodeId, attr: &str) -> XsltResult<&'d str> {
        self.doc.attribute(id, attr).ok_or_else(|| {
            XsltError::Compile(format!(
                "xsl:{} is missing the required '{attr}' attribute",
                self.doc.local_name(id)
            ))
        })
    }

    fn expr(&self, id: NodeId, src: &str) -> XsltResult<Expr> {
        let doc = self.doc;
        let resolver = |prefix: &str| doc.resolve_prefix(id, prefix);
        Ok(xpath::compile(src, &resolver)?)
    }

    fn avt(&self, id: NodeId, src: &str) -> XsltResult<Avt> {
        let chars: Vec<char> = src.chars().collect();
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut i = 0;
        while i < chars.len() {
            match chars[i] {
                '{' if chars.get(i + 1) == Some(&'{') => {
                    literal.push('{');
                    i += 2;
                }
                '{' => {
                    let mut j = i + 1;
                    let mut quote: Option<char> = None;
                    while j < chars.len() {
                        match (quote, chars[j]) {
                            (None, '}') => break,
                            (None, q @ ('"' | '\'')) => quote = Some(q),
                            (Some(q), c) if c == q => quote = None,
                            _ => {}
                        }
                        j += 1;
                    }
                    if j >= chars.len() {
                        return Err(XsltError::Compile(format!(
                            "unterminated '{{' in attribute value template \"{src}\""
                        )));
                    }
                    if !literal.is_empty() {
                        parts.push(AvtPart::Literal(std::mem::take(&mut literal)));
                    }
                    let inner: String = chars[i + 1..j].iter().collect();
                    parts.push(AvtPart::Expr(self.expr(id, &inner)?));
                    i = j + 1;
                }
                '}' if chars.get(i + 1) == Some(&'}') => {
                    literal.push('}');
                    i += 2;
                }
                '}' => {
                    return Err(XsltError::Compile(format!(
                        "unbalanced '}}' in attribute value template \"{src}\""
                    )))
                }
                c => {
                    literal.push(c);
                    i += 1;
                }
            }
        }
        if !literal.is_empty() {
            parts.push(AvtPart::Literal(literal));
        }
        Ok(Avt(parts))
    }

    fn template(&mut self, id: NodeId, sheet: &mut Stylesheet) -> XsltResult<()> {
        let name = self.doc.attribute(id, "name").map(str::to_string);
        let pattern = self.doc.attribute(id, "match");
        if name.is_none() && pattern.is_none() {
            return Err(XsltError::Compile(
                "xsl:template needs a 'match' or a 'name' attribute".into(),
            ));
        }

        let doc = self.doc;
        let mut params = Vec::new();
        let mut rest = Vec::new();
        for &child in doc.children(id) {
            if is_xsl(doc, child, "param") && rest.iter().all(|&c| self.is_blank(c)) {
                params.push(self.variable(child)?);
            } else {
                rest.push(child);
            }
        }
        let body = self.body_of(&rest)?;

        let index = sheet.templates.len();
        sheet.templates.push(Template {
            name,
            params,
            body,
        });

        if let Some(pattern) = pattern {
            let mode = self.doc.attribute(id, "mode").map(str::to_string);
            let explicit = match self.doc.attribute(id, "priority") {
                Some(p) => Some(p.trim().parse::<f64>().map_err(|_| {
                    XsltError::Compile(format!("invalid template priority '{p}'"))
                })?),
                None => None,
            };
            for (absolute, steps) in self.pattern(id, pattern)? {
                let priority = explicit.unwrap_or_else(|| default_priority(absolute, &steps));
                sheet.rules.push(Rule {
                    template: index,
                    mode: mode.clone(),
                    absolute,
                    steps,
                    priority,
                });
            }
        }
        Ok(())
    }

    /// Split a match pattern into its union alternatives.
    fn pattern(&self, id: NodeId, src: &str) -> XsltResult<Vec<(bool, Vec<Step>)>> {
        fn collect(expr: Expr, out: &mut Vec<(bool, Vec<Step>)>, src: &str) -> XsltResult<()> {
            match expr {
                Expr::Union(l, r) => {
                    collect(*l, out, src)?;
                    collect(*r, out, src)
                }
                Expr::Path { absolute, steps } => {
                    let valid = steps.iter().all(|s| match s.axis {
                        Axis::Child | Axis::Attribute => true,
                        Axis::DescendantOrSelf => {
                            s.test == NodeTest::Node && s.predicates.is_empty()
                        }
                        _ => false,
                    });
                    if !valid {
                        return Err(XsltError::Compile(format!("unsupported pattern '{src}'")));
                    }
                    out.push((absolute, steps));
                    Ok(())
                }
                _ => Err(XsltError::Compile(format!("unsupported pattern '{src}'"))),
            }
        }
        let mut out = Vec::new();
        collect(self.expr(id, src)?, &mut out, src)?;
        Ok(out)
    }

    fn variable(&mut self, id: NodeId) -> XsltResult<Variable> {
        let name = self.required(id, "name")?.to_string();
        let select = match self.doc.attribute(id, "select") {
            Some(s) => Some(self.expr(id, s)?),
            None => None,
        };
        let body = if select.is_some() {
            Vec::new()
        } else {
            self.body(id)?
        };
        Ok(Variable { name, select, body })
    }

    fn output(&self, id: NodeId) -> OutputSettings {
        let attr = |name: &str| self.doc.attribute(id, name).map(str::to_string);
        OutputSettings {
            method: match self.doc.attribute(id, "method") {
                Some("xml") => OutputMethod::Xml,
                Some("text") => OutputMethod::Text,
                _ => OutputMethod::Html,
            },
            doctype_public: attr("doctype-public"),
            doctype_system: attr("doctype-system"),
            indent: self.doc.attribute(id, "indent") == Some("yes"),
        }
    }

    fn name_tests(&self, id: NodeId) -> XsltResult<Vec<NodeTest>> {
        let elements = self.required(id, "elements")?;
        let mut tests = Vec::new();
        for token in elements.split_whitespace() {
            let test = if token == "*" {
                NodeTest::AnyName
            } else {
                let resolve = |prefix: &str| {
                    self.doc
                        .resolve_prefix(id, prefix)
                        .ok_or_else(|| XsltError::XPath(XPathError::UnboundPrefix(prefix.into())))
                };
                match token.split_once(':') {
                    Some((prefix, "*")) => NodeTest::Namespace(resolve(prefix)?),
                    Some((prefix, local)) => NodeTest::Name {
                        namespace: Some(resolve(prefix)?),
                        local: local.to_string(),
                    },
                    None => NodeTest::Name {
                        namespace: None,
                        local: token.to_string(),
                    },
                }
            };
            tests.push(test);
        }
        Ok(tests)
    }

    fn decimal_format(&self, id: NodeId) -> XsltResult<(Option<String>, DecimalFormat)> {
        let mut format = DecimalFormat::default();
        let single = |attr: &str, slot: &mut char| -> XsltResult<()> {
            if let Some(v) = self.doc.attribute(id, attr) {
                let mut chars = v.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => *slot = c,
                    _ => {
                        return Err(XsltError::Compile(format!(
                            "xsl:decimal-format {attr} must be a single character, got '{v}'"
                        )))
                    }
                }
            }
            Ok(())
        };
        single("decimal-separator", &mut format.decimal_separator)?;
        single("grouping-separator", &mut format.grouping_separator)?;
        single("minus-sign", &mut format.minus_sign)?;
        single("percent", &mut format.percent)?;
        single("zero-digit", &mut format.zero_digit)?;
        single("digit", &mut format.digit)?;
        single("pattern-separator", &mut format.pattern_separator)?;
        if let Some(v) = self.doc.attribute(id, "infinity") {
            format.infinity = v.to_string();
        }
        if let Some(v) = self.doc.attribute(id, "NaN") {
            format.nan = v.to_string();
        }
        let name = self.doc.attribute(id, "name").map(str::to_string);
        Ok((name, format))
    }

    fn is_blank(&self, id: NodeId) -> bool {
        match self.doc.kind(id) {
            NodeKind::Text(t) => t.trim().is_empty(),
            NodeKind::Comment(_) => true,
            _ => false,
        }
    }

    fn body(&mut self, id: NodeId) -> XsltResult<Vec<Instruction>> {
        let children = self.doc.children(id).to_vec();
        self.body_of(&children)
    }

    fn body_of(&mut self, nodes: &[NodeId]) -> XsltResult<Vec<Instruction>> {
        let doc = self.doc;
        let mut out = Vec::new();
        for &child in nodes {
            match doc.kind(child) {
                NodeKind::Text(t) => {
                    if !t.trim().is_empty() {
                        out.push(Instruction::Text {
                            text: t.clone(),
                            escape: true,
                        });
                    }
                }
                NodeKind::Element { .. } if is_xsl_element(doc, child) => {
                    if let Some(instr) = self.instruction(child)? {
                        out.push(instr);
                    }
                }
                NodeKind::Element { name, .. } => out.push(self.literal_element(child, name)?),
                _ => {}
            }
        }
        Ok(out)
    }

    fn literal_element(&mut self, id: NodeId, name: &QName) -> XsltResult<Instruction> {
        let doc = self.doc;
        let mut attributes = Vec::new();
        for &attr in doc.attributes(id) {
            if let NodeKind::Attribute { name, value } = doc.kind(attr) {
                if name.namespace.as_deref() == Some(XSLT_NAMESPACE) {
                    continue;
                }
                attributes.push((name.qualified(), self.avt(id, value)?));
            }
        }
        Ok(Instruction::LiteralElement {
            name: name.qualified(),
            attributes,
            body: self.body(id)?,
        })
    }

    fn with_params(&mut self, id: NodeId) -> XsltResult<Vec<Variable>> {
        let doc = self.doc;
        let mut params = Vec::new();
        for child in doc.element_children(id) {
            if is_xsl(doc, child, "with-param") {
                params.push(self.variable(child)?);
            }
        }
        Ok(params)
    }

    fn sorts(&self, id: NodeId) -> XsltResult<Vec<SortKey>> {
        let mut sorts = Vec::new();
        for child in self.doc.element_children(id) {
            if !is_xsl(self.doc, child, "sort") {
                continue;
            }
            let select = self.doc.attribute(child, "select").unwrap_or(".");
            sorts.push(SortKey {
                select: self.expr(child, select)?,
                data_type: match self.doc.attribute(child, "data-type") {
                    Some("number") => SortType::Number,
                    _ => SortType::Text,
                },
                descending: self.doc.attribute(child, "order") == Some("descending"),
            });
        }
        Ok(sorts)
    }

    fn escape_flag(&self, id: NodeId) -> bool {
        self.doc.attribute(id, "disable-output-escaping") != Some("yes")
    }

    fn instruction(&mut self, id: NodeId) -> XsltResult<Option<Instruction>> {
        let doc = self.doc;
        let instr = match doc.local_name(id) {
            "apply-templates" => Instruction::ApplyTemplates {
                select: match doc.attribute(id, "select") {
                    Some(s) => Some(self.expr(id, s)?),
                    None => None,
                },
                mode: doc.attribute(id, "mode").map(str::to_string),
                sorts: self.sorts(id)?,
                params: self.with_params(id)?,
            },
            "call-template" => {
                let name = self.required(id, "name")?.to_string();
                self.called.push(name.clone());
                Instruction::CallTemplate {
                    name,
                    params: self.with_params(id)?,
                }
            }
            "value-of" => Instruction::ValueOf {
                select: self.expr(id, self.required(id, "select")?)?,
                escape: self.escape_flag(id),
            },
            "text" => Instruction::Text {
                text: doc.string_value(id),
                escape: self.escape_flag(id),
            },
            "for-each" => {
                let rest: Vec<NodeId> = doc
                    .children(id)
                    .iter()
                    .copied()
                    .filter(|&c| !is_xsl(doc, c, "sort"))
                    .collect();
                Instruction::ForEach {
                    select: self.expr(id, self.required(id, "select")?)?,
                    sorts: self.sorts(id)?,
                    body: self.body_of(&rest)?,
                }
            }
            "if" => Instruction::If {
                test: self.expr(id, self.required(id, "test")?)?,
                body: self.body(id)?,
            },
            "choose" => {
                let mut branches = Vec::new();
                let mut otherwise = Vec::new();
                for child in doc.element_children(id) {
                    if is_xsl(doc, child, "when") {
                        let test = self.expr(child, self.required(child, "test")?)?;
                        branches.push((test, self.body(child)?));
                    } else if is_xsl(doc, child, "otherwise") {
                        otherwise = self.body(child)?;
                    } else {
                        return Err(XsltError::Compile(format!(
                            "unexpected <{}> inside xsl:choose",
                            doc.name(child).map(|n| n.qualified()).unwrap_or_default()
                        )));
                    }
                }
                if branches.is_empty() {
                    return Err(XsltError::Compile(
                        "xsl:choose needs at least one xsl:when".into(),
                    ));
                }
                Instruction::Choose {
                    branches,
                    otherwise,
                }
            }
            "variable" | "param" => Instruction::Variable(self.variable(id)?),
            "element" => Instruction::Element {
                name: self.avt(id, self.required(id, "name")?)?,
                body: self.body(id)?,
            },
            "attribute" => Instruction::Attribute {
                name: self.avt(id, self.required(id, "name")?)?,
                body: self.body(id)?,
            },
            "copy" => Instruction::Copy {
                body: self.body(id)?,
            },
            "copy-of" => Instruction::CopyOf {
                select: self.expr(id, self.required(id, "select")?)?,
            },
            "comment" => Instruction::Comment {
                body: self.body(id)?,
            },
            "number" => Instruction::Number {
                value: match doc.attribute(id, "value") {
                    Some(v) => Some(self.expr(id, v)?),
                    None => None,
                },
                width: doc
                    .attribute(id, "format")
                    .map(|f| f.chars().filter(|c| c.is_ascii_digit()).count())
                    .unwrap_or(1)
                    .max(1),
            },
            "message" => Instruction::Message {
                body: self.body(id)?,
                terminate: doc.attribute(id, "terminate") == Some("yes"),
            },
            "fallback" => return Ok(None),
            other => {
                return Err(XsltError::Compile(format!(
                    "unsupported instruction xsl:{other}"
                )))
            }
        };
        Ok(Some(instr))
    }
}

/// Default priority of a pattern alternative (XSLT 1.0 §5.5).
fn default_priority(absolute: bool, steps: &[Step]) -> f64 {
    if absolute || steps.len() != 1 || !steps[0].predicates.is_empty() {
        return 0.5;
    }
    match steps[0].test {
        NodeTest::Name { .. } => 0.0,
        NodeTest::Namespace(_) => -0.25,
        _ => -0.5,
    }
}

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Frame {
    node: NodeId,
    position: usize,
    size: usize,
}

/// Output under construction: content nodes plus attributes destined for
/// the enclosing element.
#[derive(Default)]
struct Sink {
    nodes: Vec<ResultNode>,
    attributes: Vec<(String, String)>,
}

impl Sink {
    fn push_text(&mut self, text: &str, escape: bool) {
        if text.is_empty() {
            return;
        }
        if let Some(ResultNode::Text {
            text: last,
            escape: last_escape,
        }) = self.nodes.last_mut()
        {
            if *last_escape == escape {
                last.push_str(text);
                return;
            }
        }
        self.nodes.push(ResultNode::Text {
            text: text.to_string(),
            escape,
        });
    }

    fn set_attribute(&mut self, name: String, value: String) {
        match self.attributes.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name, value)),
        }
    }

    fn text_content(&self) -> String {
        self.nodes.iter().map(ResultNode::text_content).collect()
    }
}

/// Variable bindings visible to an XPath evaluation.
struct Scope<'t> {
    locals: &'t [(String, Value)],
    globals: &'t [(String, Value)],
    current: NodeId,
    formats: &'t [(Option<String>, DecimalFormat)],
}

impl Environment for Scope<'_> {
    fn variable(&self, name: &str) -> Option<Value> {
        self.locals
            .iter()
            .rev()
            .chain(self.globals.iter().rev())
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    fn current(&self) -> NodeId {
        self.current
    }

    fn decimal_format(&self, name: Option<&str>) -> Option<&DecimalFormat> {
        self.formats
            .iter()
            .find(|(n, _)| n.as_deref() == name)
            .map(|(_, f)| f)
    }
}

struct Transformer<'s, 'd> {
    sheet: &'s Stylesheet,
    doc: &'d Document,
    globals: Vec<(String, Value)>,
    locals: Vec<(String, Value)>,
    depth: usize,
}

impl<'s, 'd> Transformer<'s, 'd> {
    fn eval(&self, expr: &Expr, frame: Frame) -> XsltResult<Value> {
        let scope = Scope {
            locals: &self.locals,
            globals: &self.globals,
            current: frame.node,
            formats: &self.sheet.decimal_formats,
        };
        let ctx = Context {
            doc: self.doc,
            node: frame.node,
            position: frame.position,
            size: frame.size,
            env: &scope,
        };
        Ok(expr.evaluate(&ctx)?)
    }

    fn eval_avt(&self, avt: &Avt, frame: Frame) -> XsltResult<String> {
        let mut out = String::new();
        for part in &avt.0 {
            match part {
                AvtPart::Literal(s) => out.push_str(s),
                AvtPart::Expr(e) => out.push_str(&self.eval(e, frame)?.to_string_value(self.doc)),
            }
        }
        Ok(out)
    }

    fn variable_value(&mut self, var: &'s Variable, frame: Frame) -> XsltResult<Value> {
        if let Some(select) = &var.select {
            return self.eval(select, frame);
        }
        if var.body.is_empty() {
            return Ok(Value::Str(String::new()));
        }
        let mut sink = Sink::default();
        self.execute(&var.body, frame, &mut sink)?;
        Ok(Value::Fragment(Arc::new(sink.nodes)))
    }

    fn params(&mut self, params: &'s [Variable], frame: Frame) -> XsltResult<Vec<(String, Value)>> {
        let mut out = Vec::with_capacity(params.len());
        for p in params {
            out.push((p.name.clone(), self.variable_value(p, frame)?));
        }
        Ok(out)
    }

    fn execute(
        &mut self,
        body: &'s [Instruction],
        frame: Frame,
        sink: &mut Sink,
    ) -> XsltResult<()> {
        let mark = self.locals.len();
        let result = self.execute_all(body, frame, sink);
        self.locals.truncate(mark);
        result
    }

    fn execute_all(
        &mut self,
        body: &'s [Instruction],
        frame: Frame,
        sink: &mut Sink,
    ) -> XsltResult<()> {
        for instr in body {
            self.instruction(instr, frame, sink)?;
        }
        Ok(())
    }

    fn instruction(
        &mut self,
        instr: &'s Instruction,
        frame: Frame,
        sink: &mut Sink,
    ) -> XsltResult<()> {
        match instr {
            Instruction::Text { text, escape } => sink.push_text(text, *escape),
            Instruction::LiteralElement {
                name,
                attributes,
                body,
            } => {
                let mut element = ResultElement::new(name.clone());
                for (attr, avt) in attributes {
                    element.set_attribute(attr, self.eval_avt(avt, frame)?);
                }
                self.fill_element(&mut element, body, frame)?;
                sink.nodes.push(ResultNode::Element(element));
            }
            Instruction::ValueOf { select, escape } => {
                let text = self.eval(select, frame)?.to_string_value(self.doc);
                sink.push_text(&text, *escape);
            }
            Instruction::ApplyTemplates {
                select,
                mode,
                sorts,
                params,
            } => {
                let nodes = match select {
                    Some(e) => self.eval(e, frame)?.into_nodes()?,
                    None => self.doc.children(frame.node).to_vec(),
                };
                let nodes = self.sort(nodes, sorts)?;
                let params = self.params(params, frame)?;
                self.apply_templates(nodes, mode.as_deref(), params, sink)?;
            }
            Instruction::CallTemplate { name, params } => {
                let sheet = self.sheet;
                let template = sheet
                    .templates
                    .iter()
                    .rev()
                    .find(|t| t.name.as_ref() == Some(name))
                    .ok_or_else(|| XsltError::UnknownTemplate(name.clone()))?;
                let params = self.params(params, frame)?;
                self.invoke(template, frame, params, sink)?;
            }
            Instruction::ForEach {
                select,
                sorts,
                body,
            } => {
                let nodes = self.eval(select, frame)?.into_nodes()?;
                let nodes = self.sort(nodes, sorts)?;
                let size = nodes.len();
                for (i, node) in nodes.into_iter().enumerate() {
                    let inner = Frame {
                        node,
                        position: i + 1,
                        size,
                    };
                    self.execute(body, inner, sink)?;
                }
            }
            Instruction::If { test, body } => {
                if self.eval(test, frame)?.to_bool() {
                    self.execute(body, frame, sink)?;
                }
            }
            Instruction::Choose {
                branches,
                otherwise,
            } => {
                let mut chosen: &'s [Instruction] = otherwise;
                for (test, body) in branches {
                    if self.eval(test, frame)?.to_bool() {
                        chosen = body;
                        break;
                    }
                }
                self.execute(chosen, frame, sink)?;
            }
            Instruction::Variable(var) => {
                let value = self.variable_value(var, frame)?;
                self.locals.push((var.name.clone(), value));
            }
            Instruction::Element { name, body } => {
                let name = self.eval_avt(name, frame)?;
                if name.trim().is_empty() {
                    return Err(XsltError::Compile("xsl:element produced an empty name".into()));
                }
                let mut element = ResultElement::new(name);
                self.fill_element(&mut element, body, frame)?;
                sink.nodes.push(ResultNode::Element(element));
            }
            Instruction::Attribute { name, body } => {
                let name = self.eval_avt(name, frame)?;
                let mut inner = Sink::default();
                self.execute(body, frame, &mut inner)?;
                sink.set_attribute(name, inner.text_content());
            }
            Instruction::Copy { body } => self.copy_shallow(frame, body, sink)?,
            Instruction::CopyOf { select } => match self.eval(select, frame)? {
                Value::Nodes(nodes) => {
                    for node in nodes {
                        self.copy_deep(node, sink);
                    }
                }
                Value::Fragment(nodes) => sink.nodes.extend(nodes.iter().cloned()),
                other => sink.push_text(&other.to_string_value(self.doc), true),
            },
            Instruction::Comment { body } => {
                let mut inner = Sink::default();
                self.execute(body, frame, &mut inner)?;
                sink.nodes.push(ResultNode::Comment(inner.text_content()));
            }
            Instruction::Number { value, width } => {
                let n = match value {
                    Some(e) => xpath::xpath_round(self.eval(e, frame)?.to_number(self.doc)),
                    None => self.sibling_number(frame.node) as f64,
                };
                let text = if n.is_finite() && n >= 0.0 {
                    format!("{:0width$}", n as u64, width = *width)
                } else {
                    xpath::number_to_string(n)
                };
                sink.push_text(&text, true);
            }
            Instruction::Message { body, terminate } => {
                let mut inner = Sink::default();
                self.execute(body, frame, &mut inner)?;
                let text = inner.text_content();
                if *terminate {
                    return Err(XsltError::Terminated(text));
                }
                log::info!("xsl:message: {text}");
            }
        }
        Ok(())
    }

    fn fill_element(
        &mut self,
        element: &mut ResultElement,
        body: &'s [Instruction],
        frame: Frame,
    ) -> XsltResult<()> {
        let mut inner = Sink::default();
        self.execute(body, frame, &mut inner)?;
        for (name, value) in inner.attributes {
            element.set_attribute(&name, value);
        }
        element.children = inner.nodes;
        Ok(())
    }

    /// Position among preceding siblings with the same name, 1-based.
    fn sibling_number(&self, node: NodeId) -> usize {
        let name = self.doc.name(node);
        1 + axis_nodes(self.doc, node, Axis::PrecedingSibling)
            .into_iter()
            .filter(|&s| self.doc.is_element(s) && self.doc.name(s) == name)
            .count()
    }

    fn copy_shallow(
        &mut self,
        frame: Frame,
        body: &'s [Instruction],
        sink: &mut Sink,
    ) -> XsltResult<()> {
        let doc = self.doc;
        match doc.kind(frame.node) {
            NodeKind::Root => self.execute(body, frame, sink)?,
            NodeKind::Element { name, .. } => {
                let mut element = ResultElement::new(name.qualified());
                self.fill_element(&mut element, body, frame)?;
                sink.nodes.push(ResultNode::Element(element));
            }
            NodeKind::Attribute { name, value } => {
                sink.set_attribute(name.qualified(), value.clone())
            }
            NodeKind::Text(t) => sink.push_text(t, true),
            NodeKind::Comment(c) => sink.nodes.push(ResultNode::Comment(c.clone())),
        }
        Ok(())
    }

    fn copy_deep(&self, node: NodeId, sink: &mut Sink) {
        match self.doc.kind(node) {
            NodeKind::Root => {
                for &c in self.doc.children(node) {
                    self.copy_deep(c, sink);
                }
            }
            NodeKind::Element { name, .. } => {
                let mut inner = Sink::default();
                for &a in self.doc.attributes(node) {
                    self.copy_deep(a, &mut inner);
                }
                for &c in self.doc.children(node) {
                    self.copy_deep(c, &mut inner);
                }
                let mut element = ResultElement::new(name.qualified());
                element.attributes = inner.attributes;
                element.children = inner.nodes;
                sink.nodes.push(ResultNode::Element(element));
            }
            NodeKind::Attribute { name, value } => {
                sink.set_attribute(name.qualified(), value.clone())
            }
            NodeKind::Text(t) => sink.push_text(t, true),
            NodeKind::Comment(c) => sink.nodes.push(ResultNode::Comment(c.clone())),
        }
    }

    fn sort(&self, nodes: Vec<NodeId>, sorts: &[SortKey]) -> XsltResult<Vec<NodeId>> {
        if sorts.is_empty() {
            return Ok(nodes);
        }
        enum Key {
            Text(String),
            Number(f64),
        }
        let size = nodes.len();
        let mut keyed = Vec::with_capacity(size);
        for (i, &node) in nodes.iter().enumerate() {
            let frame = Frame {
                node,
                position: i + 1,
                size,
            };
            let mut keys = Vec::with_capacity(sorts.len());
            for sort in sorts {
                let value = self.eval(&sort.select, frame)?;
                keys.push(match sort.data_type {
                    SortType::Number => Key::Number(value.to_number(self.doc)),
                    SortType::Text => Key::Text(value.to_string_value(self.doc)),
                });
            }
            keyed.push((keys, node));
        }
        keyed.sort_by(|(a, _), (b, _)| {
            for ((ka, kb), sort) in a.iter().zip(b).zip(sorts) {
                let ord = match (ka, kb) {
                    (Key::Number(x), Key::Number(y)) => compare_numbers(*x, *y),
                    (Key::Text(x), Key::Text(y)) => x.cmp(y),
                    _ => Ordering::Equal,
                };
                let ord = if sort.descending { ord.reverse() } else { ord };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            Ordering::Equal
        });
        Ok(keyed.into_iter().map(|(_, n)| n).collect())
    }

    fn apply_templates(
        &mut self,
        nodes: Vec<NodeId>,
        mode: Option<&str>,
        params: Vec<(String, Value)>,
        sink: &mut Sink,
    ) -> XsltResult<()> {
        let sheet = self.sheet;
        let size = nodes.len();
        for (i, node) in nodes.into_iter().enumerate() {
            let frame = Frame {
                node,
                position: i + 1,
                size,
            };
            match self.find_rule(node, mode)? {
                Some(rule) => {
                    let template = &sheet.templates[rule.template];
                    self.invoke(template, frame, params.clone(), sink)?;
                }
                None => self.builtin(frame, mode, sink)?,
            }
        }
        Ok(())
    }

    /// Built-in template rules: recurse through the root and elements, copy
    /// text and attribute values, drop comments.
    fn builtin(&mut self, frame: Frame, mode: Option<&str>, sink: &mut Sink) -> XsltResult<()> {
        let doc = self.doc;
        match doc.kind(frame.node) {
            NodeKind::Root | NodeKind::Element { .. } => {
                self.enter()?;
                let children = doc.children(frame.node).to_vec();
                let result = self.apply_templates(children, mode, Vec::new(), sink);
                self.depth -= 1;
                result?;
            }
            NodeKind::Text(t) => sink.push_text(t, true),
            NodeKind::Attribute { value, .. } => sink.push_text(value, true),
            NodeKind::Comment(_) => {}
        }
        Ok(())
    }

    fn enter(&mut self) -> XsltResult<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            self.depth -= 1;
            return Err(XsltError::RecursionLimit(MAX_DEPTH));
        }
        Ok(())
    }

    fn invoke(
        &mut self,
        template: &'s Template,
        frame: Frame,
        params: Vec<(String, Value)>,
        sink: &mut Sink,
    ) -> XsltResult<()> {
        self.enter()?;
        // A template sees only its own parameters and the globals.
        let saved = std::mem::take(&mut self.locals);
        let result = self.bind_and_run(template, frame, params, sink);
        self.locals = saved;
        self.depth -= 1;
        result
    }

    fn bind_and_run(
        &mut self,
        template: &'s Template,
        frame: Frame,
        mut params: Vec<(String, Value)>,
        sink: &mut Sink,
    ) -> XsltResult<()> {
        for param in &template.params {
            let value = match params.iter().position(|(n, _)| *n == param.name) {
                Some(i) => params.swap_remove(i).1,
                None => self.variable_value(param, frame)?,
            };
            self.locals.push((param.name.clone(), value));
        }
        self.execute(&template.body, frame, sink)
    }

    fn find_rule(&self, node: NodeId, mode: Option<&str>) -> XsltResult<Option<&'s Rule>> {
        let sheet = self.sheet;
        let mut best: Option<&'s Rule> = None;
        for rule in &sheet.rules {
            if rule.mode.as_deref() != mode {
                continue;
            }
            if let Some(b) = best {
                if rule.priority < b.priority {
                    continue;
                }
            }
            // Later rules win ties, so `>=` replaces.
            if self.matches(node, &rule.steps, rule.absolute)? {
                best = Some(rule);
            }
        }
        Ok(best)
    }

    /// Match a pattern right to left, walking up from `node`.
    fn matches(&self, node: NodeId, steps: &[Step], absolute: bool) -> XsltResult<bool> {
        let Some((last, rest)) = steps.split_last() else {
            return Ok(!absolute || node == self.doc.root());
        };

        if last.axis == Axis::DescendantOrSelf {
            let mut cur = Some(node);
            while let Some(n) = cur {
                if self.matches(n, rest, absolute)? {
                    return Ok(true);
                }
                cur = self.doc.parent(n);
            }
            return Ok(false);
        }

        let on_axis = match last.axis {
            Axis::Attribute => self.doc.is_attribute(node),
            _ => !self.doc.is_attribute(node),
        };
        if !on_axis || !node_test_matches(self.doc, node, &last.test, last.axis) {
            return Ok(false);
        }
        let Some(parent) = self.doc.parent(node) else {
            return Ok(false);
        };

        if !last.predicates.is_empty() {
            let scope = Scope {
                locals: &[],
                globals: &self.globals,
                current: node,
                formats: &self.sheet.decimal_formats,
            };
            let ctx = Context::new(self.doc, parent, &scope);
            let mut candidates: Vec<NodeId> = axis_nodes(self.doc, parent, last.axis)
                .into_iter()
                .filter(|&n| node_test_matches(self.doc, n, &last.test, last.axis))
                .collect();
            for pred in &last.predicates {
                candidates = filter_by_predicate(&candidates, pred, &ctx)?;
            }
            if !candidates.contains(&node) {
                return Ok(false);
            }
        }

        self.matches(parent, rest, absolute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::markup::serialize_html;

    fn run(xsl: &str, xml: &str) -> String {
        let sheet = Stylesheet::parse(xsl.as_bytes()).unwrap();
        let doc = xml::parse_str(xml).unwrap();
        serialize_html(&sheet.transform(&doc).unwrap())
    }

    fn sheet(body: &str) -> String {
        format!(
            r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">{body}</xsl:stylesheet>"#
        )
    }

    #[test]
    fn builtin_rules_copy_text() {
        let out = run(&sheet(""), "<a><b>one</b><c>two</c></a>");
        assert_eq!(out, "onetwo");
    }

    #[test]
    fn higher_default_priority_wins() {
        let xsl = sheet(
            r#"<xsl:template match="*"><any/></xsl:template>
               <xsl:template match="b"><named/></xsl:template>
               <xsl:template match="a"><xsl:apply-templates/></xsl:template>"#,
        );
        assert_eq!(run(&xsl, "<a><b/><c/></a>"), "<named></named><any></any>");
    }

    #[test]
    fn later_rule_wins_ties() {
        let xsl = sheet(
            r#"<xsl:template match="a">first</xsl:template>
               <xsl:template match="a">second</xsl:template>"#,
        );
        assert_eq!(run(&xsl, "<a/>"), "second");
    }

    #[test]
    fn predicate_patterns_use_sibling_position() {
        let xsl = sheet(
            r#"<xsl:template match="/"><xsl:apply-templates select="l/i"/></xsl:template>
               <xsl:template match="i">[<xsl:value-of select="."/>]</xsl:template>
               <xsl:template match="i[1]">first:<xsl:value-of select="."/></xsl:template>"#,
        );
        assert_eq!(run(&xsl, "<l><i>x</i><i>y</i></l>"), "first:x[y]");
    }

    #[test]
    fn descendant_pattern() {
        let xsl = sheet(
            r#"<xsl:template match="/"><xsl:apply-templates select="//n"/></xsl:template>
               <xsl:template match="r//n">in</xsl:template>
               <xsl:template match="n">out</xsl:template>"#,
        );
        assert_eq!(run(&xsl, "<r><x><n/></x></r>"), "in");
    }

    #[test]
    fn literal_elements_and_avts() {
        let xsl = sheet(
            r#"<xsl:template match="/p"><td class="c-{@k}" title="{{x}}"><xsl:value-of select="@k"/></td></xsl:template>"#,
        );
        assert_eq!(run(&xsl, "<p k='7'/>"), r#"<td class="c-7" title="{x}">7</td>"#);
    }

    #[test]
    fn attribute_instruction_overrides_literal() {
        let xsl = sheet(
            r#"<xsl:template match="/"><div class="a"><xsl:attribute name="class">b</xsl:attribute></div></xsl:template>"#,
        );
        assert_eq!(run(&xsl, "<x/>"), r#"<div class="b"></div>"#);
    }

    #[test]
    fn disable_output_escaping() {
        let xsl = sheet(
            r#"<xsl:template match="/"><p><xsl:text disable-output-escaping="yes">&lt;b&gt;</xsl:text><xsl:text>&lt;</xsl:text></p></xsl:template>"#,
        );
        assert_eq!(run(&xsl, "<x/>"), "<p><b>&lt;</p>");
    }

    #[test]
    fn variables_are_scoped_to_following_siblings() {
        let xsl = sheet(
            r#"<xsl:variable name="g" select="'G'"/>
               <xsl:template match="/">
                 <xsl:variable name="v">fragment</xsl:variable>
                 <xsl:value-of select="concat($g, '-', $v)"/>
               </xsl:template>"#,
        );
        assert_eq!(run(&xsl, "<x/>"), "G-fragment");
    }

    #[test]
    fn undefined_variable_is_an_error() {
        let xsl = sheet(
            r#"<xsl:template match="/"><xsl:if test="true()"><xsl:variable name="v" select="1"/></xsl:if><xsl:value-of select="$v"/></xsl:template>"#,
        );
        let sheet = Stylesheet::parse(xsl.as_bytes()).unwrap();
        let doc = xml::parse_str("<x/>").unwrap();
        assert_eq!(
            sheet.transform(&doc).unwrap_err(),
            XsltError::XPath(XPathError::UndefinedVariable("v".into()))
        );
    }

    #[test]
    fn named_templates_and_params() {
        let xsl = sheet(
            r#"<xsl:template match="/">
                 <xsl:call-template name="greet"><xsl:with-param name="who" select="'Rossi'"/></xsl:call-template>
                 <xsl:call-template name="greet"/>
               </xsl:template>
               <xsl:template name="greet"><xsl:param name="who" select="'anon'"/>[<xsl:value-of select="$who"/>]</xsl:template>"#,
        );
        assert_eq!(run(&xsl, "<x/>"), "[Rossi][anon]");
    }

    #[test]
    fn templates_do_not_see_caller_locals() {
        let xsl = sheet(
            r#"<xsl:template match="/"><xsl:variable name="secret" select="1"/><xsl:call-template name="t"/></xsl:template>
               <xsl:template name="t"><xsl:value-of select="$secret"/></xsl:template>"#,
        );
        let sheet = Stylesheet::parse(xsl.as_bytes()).unwrap();
        let doc = xml::parse_str("<x/>").unwrap();
        assert!(sheet.transform(&doc).is_err());
    }

    #[test]
    fn unknown_named_template_fails_at_compile_time() {
        let xsl = sheet(r#"<xsl:template match="/"><xsl:call-template name="nope"/></xsl:template>"#);
        assert_eq!(
            Stylesheet::parse(xsl.as_bytes()).unwrap_err(),
            XsltError::UnknownTemplate("nope".into())
        );
    }

    #[test]
    fn modes_select_separate_rule_sets() {
        let xsl = sheet(
            r#"<xsl:template match="/"><xsl:apply-templates select="a" mode="m"/>|<xsl:apply-templates select="a"/></xsl:template>
               <xsl:template match="a" mode="m">moded</xsl:template>
               <xsl:template match="a">plain</xsl:template>"#,
        );
        assert_eq!(run(&xsl, "<a/>"), "moded|plain");
    }

    #[test]
    fn for_each_with_sort() {
        let xsl = sheet(
            r#"<xsl:template match="/">
                 <xsl:for-each select="l/i"><xsl:sort select="@n" data-type="number" order="descending"/><xsl:value-of select="@n"/>,</xsl:for-each>
                 <xsl:for-each select="l/i"><xsl:sort select="."/><xsl:value-of select="."/></xsl:for-each>
               </xsl:template>"#,
        );
        let xml = "<l><i n='2'>b</i><i n='10'>c</i><i n='1'>a</i></l>";
        assert_eq!(run(&xsl, xml), "10,2,1,abc");
    }

    #[test]
    fn choose_when_otherwise() {
        let xsl = sheet(
            r#"<xsl:template match="/v"><xsl:choose><xsl:when test=". &gt; 10">big</xsl:when><xsl:when test=". &gt; 5">mid</xsl:when><xsl:otherwise>small</xsl:otherwise></xsl:choose></xsl:template>"#,
        );
        assert_eq!(run(&xsl, "<v>7</v>"), "mid");
        assert_eq!(run(&xsl, "<v>1</v>"), "small");
    }

    #[test]
    fn decimal_format_and_format_number() {
        let xsl = sheet(
            r#"<xsl:decimal-format name="euro" decimal-separator="," grouping-separator="."/>
               <xsl:template match="/v"><xsl:value-of select="format-number(., '###.###.##0,00', 'euro')"/></xsl:template>"#,
        );
        assert_eq!(run(&xsl, "<v>1234567.5</v>"), "1.234.567,50");
    }

    #[test]
    fn strip_space_removes_whitespace_nodes() {
        let xsl = sheet(
            r#"<xsl:strip-space elements="*"/>
               <xsl:template match="/"><xsl:value-of select="count(l/node())"/></xsl:template>"#,
        );
        assert_eq!(run(&xsl, "<l>\n  <i/>\n  <i/>\n</l>"), "2");
    }

    #[test]
    fn copy_of_and_copy() {
        let xsl = sheet(
            r#"<xsl:template match="/"><xsl:copy-of select="r/b"/><xsl:apply-templates select="r/b" mode="c"/></xsl:template>
               <xsl:template match="b" mode="c"><xsl:copy>shallow</xsl:copy></xsl:template>"#,
        );
        assert_eq!(run(&xsl, "<r><b k='1'>deep</b></r>"), r#"<b k="1">deep</b><b>shallow</b>"#);
    }

    #[test]
    fn number_with_value_and_format() {
        let xsl = sheet(
            r#"<xsl:template match="/"><xsl:number value="2.5"/>-<xsl:number value="7" format="001"/></xsl:template>"#,
        );
        assert_eq!(run(&xsl, "<x/>"), "3-007");
    }

    #[test]
    fn namespaced_source_matches_prefixed_pattern() {
        let xsl = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform" xmlns:a="urn:a">
            <xsl:template match="/a:r"><xsl:value-of select="local-name()"/></xsl:template>
        </xsl:stylesheet>"#;
        assert_eq!(run(xsl, "<x:r xmlns:x='urn:a'/>"), "r");
    }

    #[test]
    fn rejects_unsupported_constructs() {
        for body in [
            r#"<xsl:import href="x.xsl"/>"#,
            r#"<xsl:include href="x.xsl"/>"#,
            r#"<xsl:template match="/"><xsl:frobnicate/></xsl:template>"#,
        ] {
            assert!(matches!(
                Stylesheet::parse(sheet(body).as_bytes()),
                Err(XsltError::Compile(_))
            ));
        }
    }

    #[test]
    fn rejects_non_stylesheet_root() {
        assert!(Stylesheet::parse(b"<html/>").is_err());
        assert!(matches!(
            Stylesheet::parse(b"<xsl:stylesheet"),
            Err(XsltError::Parse(_))
        ));
    }

    const LOOP: &str = r#"<xsl:template match="/"><xsl:call-template name="loop"/></xsl:template>
               <xsl:template name="loop"><xsl:call-template name="loop"/></xsl:template>"#;

    #[test]
    fn runaway_recursion_is_bounded() {
        let compiled = Stylesheet::parse(sheet(LOOP).as_bytes()).unwrap();
        let doc = xml::parse_str("<x/>").unwrap();
        assert_eq!(
            compiled.transform(&doc).unwrap_err(),
            XsltError::RecursionLimit(MAX_DEPTH)
        );
    }

    #[test]
    fn recursion_limit_holds_on_a_small_caller_stack() {
        let xsl = sheet(LOOP);
        let handle = std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || {
                let sheet = Stylesheet::parse(xsl.as_bytes()).unwrap();
                let doc = xml::parse_str("<x/>").unwrap();
                sheet.transform(&doc).unwrap_err()
            })
            .unwrap();
        assert_eq!(handle.join().unwrap(), XsltError::RecursionLimit(MAX_DEPTH));
    }
}
