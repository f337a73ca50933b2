//! XPath 1.0 expression engine over [`xml::Document`](crate::xml::Document).
//!
//! Expressions are compiled once (names resolved against the namespace
//! bindings of the stylesheet element that carries them) and evaluated many
//! times against a [`Context`]. Variables, `current()` and decimal formats
//! come from an [`Environment`] supplied by the XSLT engine.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use crate::markup::ResultNode;
use crate::xml::{Document, NodeId, NodeKind};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum XPathError {
    #[error("syntax error in '{expr}': {message}")]
    Syntax { expr: String, message: String },
    #[error("undeclared namespace prefix '{0}'")]
    UnboundPrefix(String),
    #[error("unknown function {0}()")]
    UnknownFunction(String),
    #[error("function {name}() takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: &'static str,
        got: usize,
    },
    #[error("undefined variable ${0}")]
    UndefinedVariable(String),
    #[error("expected a node-set, got {0}")]
    NotANodeSet(&'static str),
    #[error("unknown decimal format '{0}'")]
    UnknownDecimalFormat(String),
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Value {
    /// Sorted in document order, no duplicates.
    Nodes(Vec<NodeId>),
    Str(String),
    Num(f64),
    Bool(bool),
    /// A result tree fragment bound by `xsl:variable` content.
    Fragment(Arc<Vec<ResultNode>>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nodes(_) => "node-set",
            Value::Str(_) => "string",
            Value::Num(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Fragment(_) => "result tree fragment",
        }
    }

    pub fn to_string_value(&self, doc: &Document) -> String {
        match self {
            Value::Nodes(nodes) => nodes
                .first()
                .map(|&n| doc.string_value(n))
                .unwrap_or_default(),
            Value::Str(s) => s.clone(),
            Value::Num(n) => number_to_string(*n),
            Value::Bool(b) => b.to_string(),
            Value::Fragment(nodes) => nodes.iter().map(ResultNode::text_content).collect(),
        }
    }

    pub fn to_number(&self, doc: &Document) -> f64 {
        match self {
            Value::Num(n) => *n,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            other => string_to_number(&other.to_string_value(doc)),
        }
    }

    pub fn to_bool(&self) -> bool {
        match self {
            Value::Nodes(n) => !n.is_empty(),
            Value::Str(s) => !s.is_empty(),
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
            Value::Fragment(_) => true,
        }
    }

    pub fn into_nodes(self) -> Result<Vec<NodeId>, XPathError> {
        match self {
            Value::Nodes(n) => Ok(n),
            other => Err(XPathError::NotANodeSet(other.type_name())),
        }
    }
}

/// XPath `string(number)`.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let s = if n > 0.0 { "Infinity" } else { "-Infinity" };
        s.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e17 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// XPath `number(string)`: optional minus, digits, optional fraction.
pub fn string_to_number(s: &str) -> f64 {
    let t = s.trim();
    let body = t.strip_prefix('-').unwrap_or(t);
    let valid = !body.is_empty()
        && body != "."
        && body.chars().all(|c| c.is_ascii_digit() || c == '.')
        && body.chars().filter(|&c| c == '.').count() <= 1;
    if !valid {
        return f64::NAN;
    }
    t.parse().unwrap_or(f64::NAN)
}

// ---------------------------------------------------------------------------
// Decimal formats (xsl:decimal-format / format-number)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct DecimalFormat {
    pub decimal_separator: char,
    pub grouping_separator: char,
    pub minus_sign: char,
    pub percent: char,
    pub zero_digit: char,
    pub digit: char,
    pub pattern_separator: char,
    pub infinity: String,
    pub nan: String,
}

impl Default for DecimalFormat {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            grouping_separator: ',',
            minus_sign: '-',
            percent: '%',
            zero_digit: '0',
            digit: '#',
            pattern_separator: ';',
            infinity: "Infinity".to_string(),
            nan: "NaN".to_string(),
        }
    }
}

impl DecimalFormat {
    /// Format `value` according to a JDK-style decimal pattern.
    pub fn format(&self, value: f64, pattern: &str) -> String {
        if value.is_nan() {
            return self.nan.clone();
        }
        let (positive, negative) = match pattern.split_once(self.pattern_separator) {
            Some((p, n)) => (p, Some(n)),
            None => (pattern, None),
        };
        let pos = self.parse_subpattern(positive);
        let (prefix, suffix, picture) = if value < 0.0 {
            match negative {
                Some(n) => {
                    let neg = self.parse_subpattern(n);
                    (neg.prefix, neg.suffix, pos)
                }
                None => (
                    format!("{}{}", self.minus_sign, pos.prefix),
                    pos.suffix.clone(),
                    pos,
                ),
            }
        } else {
            (pos.prefix.clone(), pos.suffix.clone(), pos)
        };

        let mut abs = value.abs();
        if picture.percent {
            abs *= 100.0;
        }
        if abs.is_infinite() {
            return format!("{prefix}{}{suffix}", self.infinity);
        }

        let fixed = format!("{:.*}", picture.max_fraction, abs);
        let (int_part, frac_part) = match fixed.split_once('.') {
            Some((i, f)) => (i.to_string(), f.to_string()),
            None => (fixed.clone(), String::new()),
        };

        let mut frac = frac_part;
        while frac.len() > picture.min_fraction && frac.ends_with('0') {
            frac.pop();
        }

        let mut int_digits = int_part.trim_start_matches('0').to_string();
        while int_digits.len() < picture.min_integer {
            int_digits.insert(0, '0');
        }
        if int_digits.is_empty() && frac.is_empty() {
            int_digits.push('0');
        }

        let grouped = match picture.grouping {
            Some(size) if size > 0 => {
                let chars: Vec<char> = int_digits.chars().collect();
                let mut out = String::new();
                for (i, c) in chars.iter().enumerate() {
                    if i > 0 && (chars.len() - i) % size == 0 {
                        out.push(self.grouping_separator);
                    }
                    out.push(*c);
                }
                out
            }
            _ => int_digits,
        };

        let localize = |s: &str| -> String {
            s.chars()
                .map(|c| match c.to_digit(10) {
                    Some(d) => char::from_u32(self.zero_digit as u32 + d).unwrap_or(c),
                    None => c,
                })
                .collect()
        };
        let (grouped, frac) = if self.zero_digit == '0' {
            (grouped, frac)
        } else {
            (localize(&grouped), localize(&frac))
        };

        let mut out = prefix;
        out.push_str(&grouped);
        if !frac.is_empty() {
            out.push(self.decimal_separator);
            out.push_str(&frac);
        }
        out.push_str(&suffix);
        out
    }

    fn parse_subpattern(&self, pattern: &str) -> PatternPart {
        let is_active = |c: char| {
            c == self.digit
                || c == self.zero_digit
                || c == self.grouping_separator
                || c == self.decimal_separator
        };
        let chars: Vec<char> = pattern.chars().collect();
        let start = chars.iter().position(|&c| is_active(c)).unwrap_or(chars.len());
        let end = chars
            .iter()
            .rposition(|&c| is_active(c))
            .map(|i| i + 1)
            .unwrap_or(start);
        let prefix: String = chars[..start].iter().collect();
        let body = &chars[start..end.max(start)];
        let suffix: String = chars[end.max(start)..].iter().collect();

        let (int_part, frac_part): (&[char], &[char]) =
            match body.iter().position(|&c| c == self.decimal_separator) {
                Some(i) => (&body[..i], &body[i + 1..]),
                None => (body, &[]),
            };

        let min_integer = int_part.iter().filter(|&&c| c == self.zero_digit).count();
        let grouping = int_part
            .iter()
            .rposition(|&c| c == self.grouping_separator)
            .map(|i| int_part.len() - i - 1);
        let min_fraction = frac_part.iter().filter(|&&c| c == self.zero_digit).count();
        let max_fraction = min_fraction + frac_part.iter().filter(|&&c| c == self.digit).count();

        PatternPart {
            percent: prefix.contains(self.percent) || suffix.contains(self.percent),
            prefix,
            suffix,
            min_integer,
            grouping,
            min_fraction,
            max_fraction,
        }
    }
}

#[derive(Debug, Clone)]
struct PatternPart {
    prefix: String,
    suffix: String,
    min_integer: usize,
    grouping: Option<usize>,
    min_fraction: usize,
    max_fraction: usize,
    percent: bool,
}

// ---------------------------------------------------------------------------
// Evaluation context
// ---------------------------------------------------------------------------

/// Host hooks needed during evaluation.
pub trait Environment {
    fn variable(&self, name: &str) -> Option<Value>;
    /// The XSLT current node (`current()`).
    fn current(&self) -> NodeId;
    fn decimal_format(&self, name: Option<&str>) -> Option<&DecimalFormat>;
}

/// Evaluation context: context node, position and size, host environment.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub doc: &'a Document,
    pub node: NodeId,
    pub position: usize,
    pub size: usize,
    pub env: &'a dyn Environment,
}

impl<'a> Context<'a> {
    pub fn new(doc: &'a Document, node: NodeId, env: &'a dyn Environment) -> Self {
        Self {
            doc,
            node,
            position: 1,
            size: 1,
            env,
        }
    }

    pub fn with_node(&self, node: NodeId, position: usize, size: usize) -> Self {
        Self {
            node,
            position,
            size,
            ..*self
        }
    }
}

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    SelfAxis,
    Attribute,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "self" => Axis::SelfAxis,
            "attribute" => Axis::Attribute,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "following" => Axis::Following,
            "preceding" => Axis::Preceding,
            _ => return None,
        })
    }

    fn is_reverse(self) -> bool {
        matches!(
            self,
            Axis::Parent
                | Axis::Ancestor
                | Axis::AncestorOrSelf
                | Axis::PrecedingSibling
                | Axis::Preceding
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeTest {
    /// `*`
    AnyName,
    /// `prefix:*`
    Namespace(String),
    Name {
        namespace: Option<String>,
        local: String,
    },
    Node,
    Text,
    Comment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Binary(BinOp, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Literal(String),
    Number(f64),
    Variable(String),
    Function(String, Vec<Expr>),
    Path {
        absolute: bool,
        steps: Vec<Step>,
    },
    /// `primary[pred]*` optionally followed by `/steps`.
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    LBracket,
    RBracket,
    Dot,
    DotDot,
    At,
    Comma,
    ColonColon,
    Slash,
    DoubleSlash,
    Pipe,
    Plus,
    Minus,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// `*` used as a name test.
    Star,
    Multiply,
    And,
    Or,
    Div,
    Mod,
    Literal(String),
    Number(f64),
    Variable(String),
    /// NCName, QName or `prefix:*`.
    Name(String),
}

fn tokenize(src: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    // Per XPath 1.0 §3.7: after these tokens `*` is a name test and an
    // NCName is a name, not an operator.
    let operator_context = |tokens: &[Token]| -> bool {
        match tokens.last() {
            None => false,
            Some(t) => !matches!(
                t,
                Token::At
                    | Token::ColonColon
                    | Token::LParen
                    | Token::LBracket
                    | Token::Comma
                    | Token::Slash
                    | Token::DoubleSlash
                    | Token::Pipe
                    | Token::Plus
                    | Token::Minus
                    | Token::Eq
                    | Token::Ne
                    | Token::Lt
                    | Token::Le
                    | Token::Gt
                    | Token::Ge
                    | Token::Multiply
                    | Token::And
                    | Token::Or
                    | Token::Div
                    | Token::Mod
            ),
        }
    };

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            c if c.is_whitespace() => {
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '@' => {
                tokens.push(Token::At);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '=' => {
                tokens.push(Token::Eq);
                i += 1;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '<' if next == Some('=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if next == Some('=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            ':' if next == Some(':') => {
                tokens.push(Token::ColonColon);
                i += 2;
            }
            '/' if next == Some('/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '*' => {
                if operator_context(&tokens) {
                    tokens.push(Token::Multiply);
                } else {
                    tokens.push(Token::Star);
                }
                i += 1;
            }
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&q| q == c)
                    .ok_or("unterminated string literal")?;
                tokens.push(Token::Literal(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            '.' if next == Some('.') => {
                tokens.push(Token::DotDot);
                i += 2;
            }
            '.' if !next.map(|n| n.is_ascii_digit()).unwrap_or(false) => {
                tokens.push(Token::Dot);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| format!("bad number '{text}'"))?;
                tokens.push(Token::Number(n));
            }
            '$' => {
                i += 1;
                let (name, len) = read_qname(&chars[i..]);
                if name.is_empty() {
                    return Err("expected variable name after '$'".into());
                }
                tokens.push(Token::Variable(name));
                i += len;
            }
            c if is_name_start(c) => {
                let (name, len) = read_qname(&chars[i..]);
                i += len;
                if operator_context(&tokens) {
                    match name.as_str() {
                        "and" => {
                            tokens.push(Token::And);
                            continue;
                        }
                        "or" => {
                            tokens.push(Token::Or);
                            continue;
                        }
                        "div" => {
                            tokens.push(Token::Div);
                            continue;
                        }
                        "mod" => {
                            tokens.push(Token::Mod);
                            continue;
                        }
                        _ => {}
                    }
                }
                // prefix:*
                if chars.get(i) == Some(&':')
                    && chars.get(i + 1) == Some(&'*')
                    && !name.contains(':')
                {
                    tokens.push(Token::Name(format!("{name}:*")));
                    i += 2;
                } else {
                    tokens.push(Token::Name(name));
                }
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-' || c == '.'
}

/// Read an NCName or `prefix:local` QName. Does not consume `::`.
fn read_qname(chars: &[char]) -> (String, usize) {
    let mut i = 0;
    if chars.first().map(|&c| is_name_start(c)) != Some(true) {
        return (String::new(), 0);
    }
    while i < chars.len() && is_name_char(chars[i]) {
        i += 1;
    }
    if chars.get(i) == Some(&':')
        && chars.get(i + 1) != Some(&':')
        && chars.get(i + 1).map(|&c| is_name_start(c)) == Some(true)
    {
        i += 1;
        while i < chars.len() && is_name_char(chars[i]) {
            i += 1;
        }
    }
    (chars[..i].iter().collect(), i)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Resolves a namespace prefix to its URI.
pub type PrefixResolver<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Compile an XPath expression.
pub fn compile(src: &str, resolver: PrefixResolver<'_>) -> Result<Expr, XPathError> {
    let syntax = |message: String| XPathError::Syntax {
        expr: src.to_string(),
        message,
    };
    let tokens = tokenize(src).map_err(syntax)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        resolver,
        src,
    };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(parser.error(format!(
            "unexpected token {:?}",
            parser.tokens[parser.pos]
        )));
    }
    Ok(expr)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    resolver: PrefixResolver<'a>,
    src: &'a str,
}

impl<'a> Parser<'a> {
    fn error(&self, message: String) -> XPathError {
        XPathError::Syntax {
            expr: self.src.to_string(),
            message,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Token) -> Result<(), XPathError> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(self.error(format!("expected {tok:?}, found {:?}", self.peek())))
        }
    }

    fn binary_level(
        &mut self,
        ops: &[(Token, BinOp)],
        next: fn(&mut Self) -> Result<Expr, XPathError>,
    ) -> Result<Expr, XPathError> {
        let mut left = next(self)?;
        'outer: loop {
            for (tok, op) in ops {
                if self.eat(tok) {
                    let right = next(self)?;
                    left = Expr::Binary(*op, Box::new(left), Box::new(right));
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn parse_or(&mut self) -> Result<Expr, XPathError> {
        self.binary_level(&[(Token::Or, BinOp::Or)], Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expr, XPathError> {
        self.binary_level(&[(Token::And, BinOp::And)], Self::parse_equality)
    }

    fn parse_equality(&mut self) -> Result<Expr, XPathError> {
        self.binary_level(
            &[(Token::Eq, BinOp::Eq), (Token::Ne, BinOp::Ne)],
            Self::parse_relational,
        )
    }

    fn parse_relational(&mut self) -> Result<Expr, XPathError> {
        self.binary_level(
            &[
                (Token::Le, BinOp::Le),
                (Token::Lt, BinOp::Lt),
                (Token::Ge, BinOp::Ge),
                (Token::Gt, BinOp::Gt),
            ],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, XPathError> {
        self.binary_level(
            &[(Token::Plus, BinOp::Add), (Token::Minus, BinOp::Sub)],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, XPathError> {
        self.binary_level(
            &[
                (Token::Multiply, BinOp::Mul),
                (Token::Div, BinOp::Div),
                (Token::Mod, BinOp::Mod),
            ],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Expr, XPathError> {
        if self.eat(&Token::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> Result<Expr, XPathError> {
        let mut left = self.parse_path_expr()?;
        while self.eat(&Token::Pipe) {
            let right = self.parse_path_expr()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn starts_primary(&self) -> bool {
        match self.peek() {
            Some(Token::Variable(_))
            | Some(Token::LParen)
            | Some(Token::Literal(_))
            | Some(Token::Number(_)) => true,
            Some(Token::Name(name)) => {
                self.peek_at(1) == Some(&Token::LParen)
                    && !matches!(
                        name.as_str(),
                        "node" | "text" | "comment" | "processing-instruction"
                    )
            }
            _ => false,
        }
    }

    fn parse_path_expr(&mut self) -> Result<Expr, XPathError> {
        if self.starts_primary() {
            let primary = self.parse_primary()?;
            let mut predicates = Vec::new();
            while self.peek() == Some(&Token::LBracket) {
                predicates.push(self.parse_predicate()?);
            }
            let mut steps = Vec::new();
            loop {
                if self.eat(&Token::Slash) {
                    steps.push(self.parse_step()?);
                } else if self.eat(&Token::DoubleSlash) {
                    steps.push(descendant_or_self_step());
                    steps.push(self.parse_step()?);
                } else {
                    break;
                }
            }
            if predicates.is_empty() && steps.is_empty() {
                return Ok(primary);
            }
            return Ok(Expr::Filter {
                primary: Box::new(primary),
                predicates,
                steps,
            });
        }
        self.parse_location_path()
    }

    fn parse_location_path(&mut self) -> Result<Expr, XPathError> {
        let mut steps = Vec::new();
        let absolute;
        if self.eat(&Token::Slash) {
            absolute = true;
            if !self.starts_step() {
                return Ok(Expr::Path { absolute, steps });
            }
        } else if self.eat(&Token::DoubleSlash) {
            absolute = true;
            steps.push(descendant_or_self_step());
        } else {
            absolute = false;
        }
        steps.push(self.parse_step()?);
        loop {
            if self.eat(&Token::Slash) {
                steps.push(self.parse_step()?);
            } else if self.eat(&Token::DoubleSlash) {
                steps.push(descendant_or_self_step());
                steps.push(self.parse_step()?);
            } else {
                break;
            }
        }
        Ok(Expr::Path { absolute, steps })
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Dot)
                | Some(Token::DotDot)
                | Some(Token::At)
                | Some(Token::Star)
                | Some(Token::Name(_))
        )
    }

    fn parse_step(&mut self) -> Result<Step, XPathError> {
        if self.eat(&Token::Dot) {
            return Ok(Step {
                axis: Axis::SelfAxis,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }

        let mut axis = Axis::Child;
        if self.eat(&Token::At) {
            axis = Axis::Attribute;
        } else if let (Some(Token::Name(name)), Some(Token::ColonColon)) =
            (self.peek(), self.peek_at(1))
        {
            axis = Axis::from_name(name)
                .ok_or_else(|| self.error(format!("unknown axis '{name}'")))?;
            self.pos += 2;
        }

        let test = self.parse_node_test()?;
        let mut predicates = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            predicates.push(self.parse_predicate()?);
        }
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_node_test(&mut self) -> Result<NodeTest, XPathError> {
        match self.peek().cloned() {
            Some(Token::Star) => {
                self.pos += 1;
                Ok(NodeTest::AnyName)
            }
            Some(Token::Name(name)) => {
                self.pos += 1;
                if self.peek() == Some(&Token::LParen) {
                    let test = match name.as_str() {
                        "node" => NodeTest::Node,
                        "text" => NodeTest::Text,
                        "comment" => NodeTest::Comment,
                        other => return Err(self.error(format!("unknown node type '{other}'"))),
                    };
                    self.pos += 1;
                    self.expect(&Token::RParen)?;
                    return Ok(test);
                }
                if let Some(prefix) = name.strip_suffix(":*") {
                    let uri = (self.resolver)(prefix)
                        .ok_or_else(|| XPathError::UnboundPrefix(prefix.to_string()))?;
                    return Ok(NodeTest::Namespace(uri));
                }
                match name.split_once(':') {
                    Some((prefix, local)) => {
                        let uri = (self.resolver)(prefix)
                            .ok_or_else(|| XPathError::UnboundPrefix(prefix.to_string()))?;
                        Ok(NodeTest::Name {
                            namespace: Some(uri),
                            local: local.to_string(),
                        })
                    }
                    None => Ok(NodeTest::Name {
                        namespace: None,
                        local: name,
                    }),
                }
            }
            other => Err(self.error(format!("expected a node test, found {other:?}"))),
        }
    }

    fn parse_predicate(&mut self) -> Result<Expr, XPathError> {
        self.expect(&Token::LBracket)?;
        let expr = self.parse_or()?;
        self.expect(&Token::RBracket)?;
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, XPathError> {
        match self.peek().cloned() {
            Some(Token::Variable(name)) => {
                self.pos += 1;
                Ok(Expr::Variable(name))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Literal(s)) => {
                self.pos += 1;
                Ok(Expr::Literal(s))
            }
            Some(Token::Number(n)) => {
                self.pos += 1;
                Ok(Expr::Number(n))
            }
            Some(Token::Name(name)) => {
                self.pos += 2; // name + '('
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.parse_or()?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(&Token::RParen)?;
                        break;
                    }
                }
                check_function(&name, args.len())?;
                Ok(Expr::Function(name, args))
            }
            other => Err(self.error(format!("unexpected token {other:?}"))),
        }
    }
}

fn descendant_or_self_step() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::Node,
        predicates: Vec::new(),
    }
}

/// Known functions and their arities.
fn check_function(name: &str, got: usize) -> Result<(), XPathError> {
    let (min, max, expected): (usize, usize, &'static str) = match name {
        "last" | "position" | "true" | "false" | "current" => (0, 0, "0"),
        "count" | "not" | "boolean" | "sum" | "floor" | "ceiling" | "round" => (1, 1, "1"),
        "local-name" | "name" | "namespace-uri" | "string" | "number" | "string-length"
        | "normalize-space" | "generate-id" => (0, 1, "0 or 1"),
        "starts-with" | "contains" | "substring-before" | "substring-after" => (2, 2, "2"),
        "substring" => (2, 3, "2 or 3"),
        "translate" => (3, 3, "3"),
        "concat" => (2, usize::MAX, "2 or more"),
        "format-number" => (2, 3, "2 or 3"),
        _ => return Err(XPathError::UnknownFunction(name.to_string())),
    };
    if got < min || got > max {
        return Err(XPathError::Arity {
            name: name.to_string(),
            expected,
            got,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

impl Expr {
    pub fn evaluate(&self, ctx: &Context<'_>) -> Result<Value, XPathError> {
        match self {
            Expr::Literal(s) => Ok(Value::Str(s.clone())),
            Expr::Number(n) => Ok(Value::Num(*n)),
            Expr::Variable(name) => ctx
                .env
                .variable(name)
                .ok_or_else(|| XPathError::UndefinedVariable(name.clone())),
            Expr::Negate(inner) => Ok(Value::Num(-inner.evaluate(ctx)?.to_number(ctx.doc))),
            Expr::Binary(op, l, r) => eval_binary(*op, l, r, ctx),
            Expr::Union(l, r) => {
                let mut set: BTreeSet<NodeId> = l.evaluate(ctx)?.into_nodes()?.into_iter().collect();
                set.extend(r.evaluate(ctx)?.into_nodes()?);
                Ok(Value::Nodes(set.into_iter().collect()))
            }
            Expr::Function(name, args) => call_function(name, args, ctx),
            Expr::Path { absolute, steps } => {
                let start = if *absolute {
                    vec![ctx.doc.root()]
                } else {
                    vec![ctx.node]
                };
                Ok(Value::Nodes(apply_steps(start, steps, ctx)?))
            }
            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                let value = primary.evaluate(ctx)?;
                if predicates.is_empty() && steps.is_empty() {
                    return Ok(value);
                }
                let mut nodes = value.into_nodes()?;
                for pred in predicates {
                    nodes = filter_by_predicate(&nodes, pred, ctx)?;
                }
                Ok(Value::Nodes(apply_steps(nodes, steps, ctx)?))
            }
        }
    }

    pub fn eval_string(&self, ctx: &Context<'_>) -> Result<String, XPathError> {
        Ok(self.evaluate(ctx)?.to_string_value(ctx.doc))
    }

    pub fn eval_bool(&self, ctx: &Context<'_>) -> Result<bool, XPathError> {
        Ok(self.evaluate(ctx)?.to_bool())
    }

    pub fn eval_number(&self, ctx: &Context<'_>) -> Result<f64, XPathError> {
        Ok(self.evaluate(ctx)?.to_number(ctx.doc))
    }

    pub fn eval_nodes(&self, ctx: &Context<'_>) -> Result<Vec<NodeId>, XPathError> {
        self.evaluate(ctx)?.into_nodes()
    }
}

fn apply_steps(
    start: Vec<NodeId>,
    steps: &[Step],
    ctx: &Context<'_>,
) -> Result<Vec<NodeId>, XPathError> {
    let mut current = start;
    for step in steps {
        let mut next: BTreeSet<NodeId> = BTreeSet::new();
        for &node in &current {
            let mut candidates: Vec<NodeId> = axis_nodes(ctx.doc, node, step.axis)
                .into_iter()
                .filter(|&n| node_test_matches(ctx.doc, n, &step.test, step.axis))
                .collect();
            for pred in &step.predicates {
                candidates = filter_by_predicate(&candidates, pred, ctx)?;
            }
            next.extend(candidates);
        }
        current = next.into_iter().collect();
    }
    Ok(current)
}

/// Filter `nodes` (in axis order) by a predicate expression.
pub fn filter_by_predicate(
    nodes: &[NodeId],
    pred: &Expr,
    ctx: &Context<'_>,
) -> Result<Vec<NodeId>, XPathError> {
    let size = nodes.len();
    let mut kept = Vec::new();
    for (i, &n) in nodes.iter().enumerate() {
        let inner = ctx.with_node(n, i + 1, size);
        let keep = match pred.evaluate(&inner)? {
            Value::Num(num) => num == (i + 1) as f64,
            other => other.to_bool(),
        };
        if keep {
            kept.push(n);
        }
    }
    Ok(kept)
}

/// Nodes along `axis` from `node`, in axis order (reverse axes nearest first).
pub fn axis_nodes(doc: &Document, node: NodeId, axis: Axis) -> Vec<NodeId> {
    match axis {
        Axis::Child => {
            if doc.is_attribute(node) {
                Vec::new()
            } else {
                doc.children(node).to_vec()
            }
        }
        Axis::Attribute => doc.attributes(node).to_vec(),
        Axis::SelfAxis => vec![node],
        Axis::Descendant => {
            if doc.is_attribute(node) {
                Vec::new()
            } else {
                doc.descendants(node)
            }
        }
        Axis::DescendantOrSelf => {
            let mut v = vec![node];
            if !doc.is_attribute(node) {
                v.extend(doc.descendants(node));
            }
            v
        }
        Axis::Parent => doc.parent(node).into_iter().collect(),
        Axis::Ancestor | Axis::AncestorOrSelf => {
            let mut v = Vec::new();
            if axis == Axis::AncestorOrSelf {
                v.push(node);
            }
            let mut cur = doc.parent(node);
            while let Some(p) = cur {
                v.push(p);
                cur = doc.parent(p);
            }
            v
        }
        Axis::FollowingSibling | Axis::PrecedingSibling => {
            if doc.is_attribute(node) {
                return Vec::new();
            }
            let Some(parent) = doc.parent(node) else {
                return Vec::new();
            };
            let siblings = doc.children(parent);
            let idx = siblings.iter().position(|&s| s == node).unwrap_or(0);
            if axis == Axis::FollowingSibling {
                siblings[idx + 1..].to_vec()
            } else {
                siblings[..idx].iter().rev().copied().collect()
            }
        }
        Axis::Following => {
            // Everything after `node` in document order that is not a
            // descendant and not an attribute.
            let mut after = node;
            if let Some(last) = doc.descendants(node).last() {
                after = *last;
            }
            (after.0 + 1..doc.len())
                .map(NodeId)
                .filter(|&n| !doc.is_attribute(n))
                .collect()
        }
        Axis::Preceding => {
            let ancestors: BTreeSet<NodeId> =
                axis_nodes(doc, node, Axis::Ancestor).into_iter().collect();
            (1..node.0)
                .rev()
                .map(NodeId)
                .filter(|n| !doc.is_attribute(*n) && !ancestors.contains(n))
                .collect()
        }
    }
}

pub fn node_test_matches(doc: &Document, node: NodeId, test: &NodeTest, axis: Axis) -> bool {
    let principal_is_attr = axis == Axis::Attribute;
    match test {
        NodeTest::Node => true,
        NodeTest::Text => matches!(doc.kind(node), NodeKind::Text(_)),
        NodeTest::Comment => matches!(doc.kind(node), NodeKind::Comment(_)),
        NodeTest::AnyName => principal_matches(doc, node, principal_is_attr),
        NodeTest::Namespace(uri) => {
            principal_matches(doc, node, principal_is_attr)
                && doc.name(node).and_then(|n| n.namespace.as_deref()) == Some(uri.as_str())
        }
        NodeTest::Name { namespace, local } => {
            principal_matches(doc, node, principal_is_attr)
                && doc
                    .name(node)
                    .map(|n| n.is(namespace.as_deref(), local))
                    .unwrap_or(false)
        }
    }
}

fn principal_matches(doc: &Document, node: NodeId, attribute: bool) -> bool {
    if attribute {
        doc.is_attribute(node)
    } else {
        doc.is_element(node)
    }
}

fn eval_binary(op: BinOp, l: &Expr, r: &Expr, ctx: &Context<'_>) -> Result<Value, XPathError> {
    match op {
        BinOp::Or => Ok(Value::Bool(l.eval_bool(ctx)? || r.eval_bool(ctx)?)),
        BinOp::And => Ok(Value::Bool(l.eval_bool(ctx)? && r.eval_bool(ctx)?)),
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
            let a = l.eval_number(ctx)?;
            let b = r.eval_number(ctx)?;
            Ok(Value::Num(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a / b,
                _ => a % b,
            }))
        }
        _ => {
            let a = l.evaluate(ctx)?;
            let b = r.evaluate(ctx)?;
            Ok(Value::Bool(compare(op, &a, &b, ctx.doc)))
        }
    }
}

/// XPath 1.0 §3.4 comparison semantics.
fn compare(op: BinOp, a: &Value, b: &Value, doc: &Document) -> bool {
    match (a, b) {
        (Value::Nodes(x), Value::Nodes(y)) => {
            let ys: Vec<String> = y.iter().map(|&n| doc.string_value(n)).collect();
            x.iter().any(|&n| {
                let xs = doc.string_value(n);
                ys.iter().any(|s| compare_atomic(op, &Value::Str(xs.clone()), &Value::Str(s.clone()), doc))
            })
        }
        (Value::Nodes(x), other) => compare_nodes_with(op, x, other, doc, false),
        (other, Value::Nodes(y)) => compare_nodes_with(op, y, other, doc, true),
        _ => compare_atomic(op, a, b, doc),
    }
}

fn compare_nodes_with(
    op: BinOp,
    nodes: &[NodeId],
    other: &Value,
    doc: &Document,
    swapped: bool,
) -> bool {
    if let Value::Bool(_) = other {
        let left = Value::Bool(!nodes.is_empty());
        return if swapped {
            compare_atomic(op, other, &left, doc)
        } else {
            compare_atomic(op, &left, other, doc)
        };
    }
    nodes.iter().any(|&n| {
        let sv = doc.string_value(n);
        let left = match other {
            Value::Num(_) => Value::Num(string_to_number(&sv)),
            _ => Value::Str(sv),
        };
        if swapped {
            compare_atomic(op, other, &left, doc)
        } else {
            compare_atomic(op, &left, other, doc)
        }
    })
}

fn compare_atomic(op: BinOp, a: &Value, b: &Value, doc: &Document) -> bool {
    match op {
        BinOp::Eq | BinOp::Ne => {
            let eq = if matches!(a, Value::Bool(_)) || matches!(b, Value::Bool(_)) {
                a.to_bool() == b.to_bool()
            } else if matches!(a, Value::Num(_)) || matches!(b, Value::Num(_)) {
                a.to_number(doc) == b.to_number(doc)
            } else {
                a.to_string_value(doc) == b.to_string_value(doc)
            };
            if op == BinOp::Eq {
                eq
            } else {
                !eq
            }
        }
        _ => {
            let x = a.to_number(doc);
            let y = b.to_number(doc);
            match op {
                BinOp::Lt => x < y,
                BinOp::Le => x <= y,
                BinOp::Gt => x > y,
                _ => x >= y,
            }
        }
    }
}

fn call_function(name: &str, args: &[Expr], ctx: &Context<'_>) -> Result<Value, XPathError> {
    let doc = ctx.doc;
    let string_arg = |i: usize| -> Result<String, XPathError> {
        match args.get(i) {
            Some(e) => e.eval_string(ctx),
            None => Ok(doc.string_value(ctx.node)),
        }
    };
    let node_arg = |i: usize| -> Result<Option<NodeId>, XPathError> {
        match args.get(i) {
            Some(e) => Ok(e.eval_nodes(ctx)?.first().copied()),
            None => Ok(Some(ctx.node)),
        }
    };

    Ok(match name {
        "last" => Value::Num(ctx.size as f64),
        "position" => Value::Num(ctx.position as f64),
        "count" => Value::Num(args[0].eval_nodes(ctx)?.len() as f64),
        "current" => Value::Nodes(vec![ctx.env.current()]),
        "local-name" => Value::Str(
            node_arg(0)?
                .map(|n| doc.local_name(n).to_string())
                .unwrap_or_default(),
        ),
        "name" => Value::Str(
            node_arg(0)?
                .and_then(|n| doc.name(n).map(|q| q.qualified()))
                .unwrap_or_default(),
        ),
        "namespace-uri" => Value::Str(
            node_arg(0)?
                .and_then(|n| doc.name(n).and_then(|q| q.namespace.clone()))
                .unwrap_or_default(),
        ),
        "generate-id" => Value::Str(
            node_arg(0)?
                .map(|n| format!("id{}", n.0))
                .unwrap_or_default(),
        ),
        "string" => Value::Str(string_arg(0)?),
        "concat" => {
            let mut s = String::new();
            for a in args {
                s.push_str(&a.eval_string(ctx)?);
            }
            Value::Str(s)
        }
        "starts-with" => Value::Bool(string_arg(0)?.starts_with(&string_arg(1)?)),
        "contains" => Value::Bool(string_arg(0)?.contains(&string_arg(1)?)),
        "substring-before" => {
            let s = string_arg(0)?;
            let pat = string_arg(1)?;
            Value::Str(s.find(&pat).map(|i| s[..i].to_string()).unwrap_or_default())
        }
        "substring-after" => {
            let s = string_arg(0)?;
            let pat = string_arg(1)?;
            Value::Str(
                s.find(&pat)
                    .map(|i| s[i + pat.len()..].to_string())
                    .unwrap_or_default(),
            )
        }
        "substring" => {
            let s = string_arg(0)?;
            let start = args[1].eval_number(ctx)?;
            let len = match args.get(2) {
                Some(e) => Some(e.eval_number(ctx)?),
                None => None,
            };
            Value::Str(substring(&s, start, len))
        }
        "string-length" => Value::Num(string_arg(0)?.chars().count() as f64),
        "normalize-space" => Value::Str(
            string_arg(0)?
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" "),
        ),
        "translate" => {
            let s = string_arg(0)?;
            let from: Vec<char> = string_arg(1)?.chars().collect();
            let to: Vec<char> = string_arg(2)?.chars().collect();
            Value::Str(
                s.chars()
                    .filter_map(|c| match from.iter().position(|&f| f == c) {
                        Some(i) => to.get(i).copied(),
                        None => Some(c),
                    })
                    .collect(),
            )
        }
        "boolean" => Value::Bool(args[0].eval_bool(ctx)?),
        "not" => Value::Bool(!args[0].eval_bool(ctx)?),
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "number" => match args.first() {
            Some(e) => Value::Num(e.eval_number(ctx)?),
            None => Value::Num(string_to_number(&doc.string_value(ctx.node))),
        },
        "sum" => Value::Num(
            args[0]
                .eval_nodes(ctx)?
                .iter()
                .map(|&n| string_to_number(&doc.string_value(n)))
                .sum(),
        ),
        "floor" => Value::Num(args[0].eval_number(ctx)?.floor()),
        "ceiling" => Value::Num(args[0].eval_number(ctx)?.ceil()),
        "round" => Value::Num(xpath_round(args[0].eval_number(ctx)?)),
        "format-number" => {
            let value = args[0].eval_number(ctx)?;
            let pattern = args[1].eval_string(ctx)?;
            let format_name = match args.get(2) {
                Some(e) => Some(e.eval_string(ctx)?),
                None => None,
            };
            let default_format = DecimalFormat::default();
            let format = match &format_name {
                Some(n) => ctx
                    .env
                    .decimal_format(Some(n))
                    .ok_or_else(|| XPathError::UnknownDecimalFormat(n.clone()))?,
                None => ctx.env.decimal_format(None).unwrap_or(&default_format),
            };
            Value::Str(format.format(value, &pattern))
        }
        other => return Err(XPathError::UnknownFunction(other.to_string())),
    })
}

/// XPath `round()`: halves round towards positive infinity.
pub fn xpath_round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else {
        (n + 0.5).floor()
    }
}

/// XPath `substring()` with its 1-based, rounding semantics.
fn substring(s: &str, start: f64, len: Option<f64>) -> String {
    let first = xpath_round(start);
    let last = match len {
        Some(l) => first + xpath_round(l),
        None => f64::INFINITY,
    };
    s.chars()
        .enumerate()
        .filter(|(i, _)| {
            let pos = (*i + 1) as f64;
            pos >= first && pos < last
        })
        .map(|(_, c)| c)
        .collect()
}

/// Sort helper shared with `xsl:sort`: numeric order puts NaN first.
pub fn compare_numbers(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::parse_str;

    struct Env {
        current: NodeId,
        vars: Vec<(String, Value)>,
        euro: DecimalFormat,
    }

    impl Environment for Env {
        fn variable(&self, name: &str) -> Option<Value> {
            self.vars
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone())
        }
        fn current(&self) -> NodeId {
            self.current
        }
        fn decimal_format(&self, name: Option<&str>) -> Option<&DecimalFormat> {
            match name {
                Some("euro") => Some(&self.euro),
                _ => None,
            }
        }
    }

    const DOC: &str = r#"<p:Fattura xmlns:p="urn:fattura">
  <Linee>
    <Linea n="1"><Descrizione>Consulenza</Descrizione><Prezzo>100.50</Prezzo></Linea>
    <Linea n="2"><Descrizione>Hosting</Descrizione><Prezzo>20</Prezzo></Linea>
    <Linea n="3"><Descrizione>Dominio</Descrizione><Prezzo>9.5</Prezzo></Linea>
  </Linee>
</p:Fattura>"#;

    fn resolver(prefix: &str) -> Option<String> {
        (prefix == "p").then(|| "urn:fattura".to_string())
    }

    fn eval(doc: &Document, expr: &str) -> Value {
        let env = Env {
            current: doc.root(),
            vars: vec![("soglia".into(), Value::Num(15.0))],
            euro: DecimalFormat {
                decimal_separator: ',',
                grouping_separator: '.',
                ..DecimalFormat::default()
            },
        };
        let compiled = compile(expr, &resolver).unwrap();
        let ctx = Context::new(doc, doc.root(), &env);
        compiled.evaluate(&ctx).unwrap()
    }

    fn eval_str(doc: &Document, expr: &str) -> String {
        eval(doc, expr).to_string_value(doc)
    }

    #[test]
    fn namespaced_absolute_path() {
        let doc = parse_str(DOC).unwrap();
        let v = eval(&doc, "/p:Fattura/Linee/Linea");
        assert_eq!(v.into_nodes().unwrap().len(), 3);
    }

    #[test]
    fn unprefixed_name_does_not_match_namespaced_element() {
        let doc = parse_str(DOC).unwrap();
        assert_eq!(eval(&doc, "count(/Fattura)").to_number(&doc), 0.0);
    }

    #[test]
    fn descendant_and_predicates() {
        let doc = parse_str(DOC).unwrap();
        assert_eq!(eval_str(&doc, "//Linea[2]/Descrizione"), "Hosting");
        assert_eq!(eval_str(&doc, "//Linea[last()]/@n"), "3");
        assert_eq!(eval_str(&doc, "//Linea[Prezzo > $soglia][2]/Descrizione"), "Hosting");
        assert_eq!(eval_str(&doc, "//Linea[@n = '3']/Descrizione"), "Dominio");
    }

    #[test]
    fn arithmetic_and_sum() {
        let doc = parse_str(DOC).unwrap();
        assert_eq!(eval(&doc, "sum(//Prezzo)").to_number(&doc), 130.0);
        assert_eq!(eval(&doc, "7 mod 3 + 10 div 4").to_number(&doc), 3.5);
        assert_eq!(eval(&doc, "-(2 * 3)").to_number(&doc), -6.0);
    }

    #[test]
    fn star_is_name_test_or_operator_by_context() {
        let doc = parse_str(DOC).unwrap();
        assert_eq!(eval(&doc, "count(/*/*/*)").to_number(&doc), 3.0);
        assert_eq!(eval(&doc, "count(//Linea) * 2").to_number(&doc), 6.0);
    }

    #[test]
    fn string_functions() {
        let doc = parse_str(DOC).unwrap();
        assert_eq!(eval_str(&doc, "substring('12345', 2, 3)"), "234");
        assert_eq!(eval_str(&doc, "substring('12345', 1.5, 2.6)"), "234");
        assert_eq!(eval_str(&doc, "substring-before('2024-01-31', '-')"), "2024");
        assert_eq!(eval_str(&doc, "substring-after('2024-01-31', '-')"), "01-31");
        assert_eq!(eval_str(&doc, "normalize-space('  a   b ')"), "a b");
        assert_eq!(eval_str(&doc, "translate('abc', 'abc', 'AB')"), "AB");
        assert_eq!(eval_str(&doc, "concat('a', 1, true())"), "a1true");
        assert!(eval(&doc, "starts-with('IT0123', 'IT')").to_bool());
    }

    #[test]
    fn node_set_comparisons() {
        let doc = parse_str(DOC).unwrap();
        assert!(eval(&doc, "//Prezzo = 20").to_bool());
        assert!(eval(&doc, "//Prezzo != 20").to_bool());
        assert!(!eval(&doc, "//Prezzo > 1000").to_bool());
        assert!(eval(&doc, "//Descrizione = 'Hosting'").to_bool());
    }

    #[test]
    fn union_is_in_document_order() {
        let doc = parse_str(DOC).unwrap();
        let nodes = eval(&doc, "//Linea[3] | //Linea[1]").into_nodes().unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(nodes[0] < nodes[1]);
    }

    #[test]
    fn reverse_axis_positions_are_nearest_first() {
        let doc = parse_str(DOC).unwrap();
        assert_eq!(
            eval_str(&doc, "//Linea[3]/preceding-sibling::Linea[1]/@n"),
            "2"
        );
        assert_eq!(eval_str(&doc, "local-name(//Prezzo/ancestor::*[last()])"), "Fattura");
    }

    #[test]
    fn number_formatting() {
        assert_eq!(number_to_string(3.0), "3");
        assert_eq!(number_to_string(0.5), "0.5");
        assert_eq!(number_to_string(f64::NAN), "NaN");
        assert!(string_to_number("1e3").is_nan());
        assert_eq!(string_to_number(" 12 "), 12.0);
    }

    #[test]
    fn format_number_patterns() {
        let fmt = DecimalFormat::default();
        assert_eq!(fmt.format(1234567.891, "#,##0.00"), "1,234,567.89");
        assert_eq!(fmt.format(0.5, "#.00"), ".50");
        assert_eq!(fmt.format(-3.0, "0.00"), "-3.00");
        assert_eq!(fmt.format(0.25, "0%"), "25%");
        assert_eq!(fmt.format(f64::NAN, "0.00"), "NaN");

        let euro = DecimalFormat {
            decimal_separator: ',',
            grouping_separator: '.',
            ..DecimalFormat::default()
        };
        assert_eq!(euro.format(1234.5, "###.###.##0,00"), "1.234,50");
    }

    #[test]
    fn format_number_uses_named_format() {
        let doc = parse_str(DOC).unwrap();
        assert_eq!(
            eval_str(&doc, "format-number(sum(//Prezzo), '#.##0,00', 'euro')"),
            "130,00"
        );
    }

    #[test]
    fn compile_errors() {
        assert!(matches!(
            compile("foo(", &resolver),
            Err(XPathError::Syntax { .. })
        ));
        assert_eq!(
            compile("q:a", &resolver),
            Err(XPathError::UnboundPrefix("q".into()))
        );
        assert_eq!(
            compile("frobnicate(1)", &resolver),
            Err(XPathError::UnknownFunction("frobnicate".into()))
        );
        assert!(matches!(
            compile("substring('a')", &resolver),
            Err(XPathError::Arity { .. })
        ));
    }
}
