//! CSS stylesheet parser and selector matching.
//!
//! The parser is lenient the way browsers are: anything it does not
//! understand is skipped, never reported as an error. Supported:
//! - style rules with selector lists and `!important` declarations
//! - `@page` (`size`, `margin`, `margin-*`)
//! - `@media` blocks that apply to print, flattened into the sheet
//! - selectors built from type, `*`, `.class`, `#id`, `[attr]`,
//!   `[attr=value]`, `[attr~=value]`, compounds, and the descendant and
//!   child combinators
//!
//! Pseudo-classes, pseudo-elements and sibling combinators parse but never
//! match. All lengths are converted to points.

use crate::dom::ElementNode;

/// A4 portrait page size in points.
pub const A4_WIDTH_PT: f32 = 595.28;
pub const A4_HEIGHT_PT: f32 = 841.89;

const PT_PER_MM: f32 = 72.0 / 25.4;

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
    pub important: bool,
}

/// Selector specificity as (ids, classes and attributes, types).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct Specificity(pub u32, pub u32, pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttributeSelector {
    Exists(String),
    Equals(String, String),
    Includes(String, String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attributes: Vec<AttributeSelector>,
    unmatchable: bool,
}

impl Compound {
    fn matches(&self, element: &ElementNode) -> bool {
        if self.unmatchable {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !element.tag.name().eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.id() != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.iter().all(|c| element.has_class(c)) {
            return false;
        }
        self.attributes.iter().all(|a| match a {
            AttributeSelector::Exists(name) => element.attributes.contains_key(name),
            AttributeSelector::Equals(name, value) => {
                element.attributes.get(name).map(String::as_str) == Some(value.as_str())
            }
            AttributeSelector::Includes(name, value) => element
                .attributes
                .get(name)
                .map(|v| v.split_whitespace().any(|w| w == value))
                .unwrap_or(false),
        })
    }
}

/// One complex selector, e.g. `table.tbFoglio td.import`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    /// Compounds from the outermost to the subject.
    compounds: Vec<Compound>,
    /// `combinators[i]` joins `compounds[i]` and `compounds[i + 1]`.
    combinators: Vec<Combinator>,
    specificity: Specificity,
}

impl Selector {
    /// Parse a single complex selector; `None` for syntax we cannot read.
    pub fn parse(src: &str) -> Option<Selector> {
        let chars: Vec<char> = src.trim().chars().collect();
        let mut compounds: Vec<Compound> = Vec::new();
        let mut combinators = Vec::new();
        let mut pending: Option<Combinator> = None;
        let mut unsupported = false;
        let mut pos = 0;

        while pos < chars.len() {
            let c = chars[pos];
            if c.is_whitespace() {
                if !compounds.is_empty() && pending.is_none() {
                    pending = Some(Combinator::Descendant);
                }
                pos += 1;
                continue;
            }
            if c == '>' || c == '+' || c == '~' {
                if compounds.is_empty() {
                    return None;
                }
                if c != '>' {
                    unsupported = true;
                }
                pending = Some(Combinator::Child);
                pos += 1;
                continue;
            }
            let (compound, next) = parse_compound(&chars, pos)?;
            if !compounds.is_empty() {
                combinators.push(pending.take().unwrap_or(Combinator::Descendant));
            }
            compounds.push(compound);
            pending = None;
            pos = next;
        }

        // A trailing `>`, `+` or `~` leaves a combinator with no subject.
        if compounds.is_empty() || pending == Some(Combinator::Child) {
            return None;
        }
        if unsupported {
            if let Some(last) = compounds.last_mut() {
                last.unmatchable = true;
            }
        }

        let mut specificity = Specificity::default();
        for c in &compounds {
            specificity.0 += u32::from(c.id.is_some());
            specificity.1 += (c.classes.len() + c.attributes.len()) as u32;
            specificity.2 += u32::from(c.tag.is_some());
        }
        Some(Selector {
            compounds,
            combinators,
            specificity,
        })
    }

    pub fn specificity(&self) -> Specificity {
        self.specificity
    }

    /// Does the selector match `element`, whose ancestors are listed from
    /// the root down to its parent?
    pub fn matches(&self, element: &ElementNode, ancestors: &[&ElementNode]) -> bool {
        match self.compounds.last() {
            Some(subject) if subject.matches(element) => {
                self.matches_ancestors(self.compounds.len() - 1, ancestors)
            }
            _ => false,
        }
    }

    /// `compounds[idx]` matched the element just below `ancestors`; check
    /// the compounds to its left.
    fn matches_ancestors(&self, idx: usize, ancestors: &[&ElementNode]) -> bool {
        if idx == 0 {
            return true;
        }
        let target = &self.compounds[idx - 1];
        match self.combinators[idx - 1] {
            Combinator::Child => match ancestors.split_last() {
                Some((parent, rest)) => {
                    target.matches(parent) && self.matches_ancestors(idx - 1, rest)
                }
                None => false,
            },
            Combinator::Descendant => (0..ancestors.len()).rev().any(|i| {
                target.matches(ancestors[i]) && self.matches_ancestors(idx - 1, &ancestors[..i])
            }),
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || c as u32 > 0x7F
}

fn read_ident(chars: &[char], mut pos: usize) -> (String, usize) {
    let start = pos;
    while pos < chars.len() && is_ident_char(chars[pos]) {
        pos += 1;
    }
    (chars[start..pos].iter().collect(), pos)
}

fn parse_compound(chars: &[char], start: usize) -> Option<(Compound, usize)> {
    let mut compound = Compound::default();
    let mut pos = start;
    while pos < chars.len() {
        match chars[pos] {
            '*' if pos == start => pos += 1,
            '.' | '#' => {
                let (name, next) = read_ident(chars, pos + 1);
                if name.is_empty() {
                    return None;
                }
                if chars[pos] == '.' {
                    compound.classes.push(name);
                } else if compound.id.is_some() {
                    // `#a#b` can never match a single element.
                    compound.unmatchable = true;
                } else {
                    compound.id = Some(name);
                }
                pos = next;
            }
            '[' => {
                let close = chars[pos..].iter().position(|&c| c == ']')? + pos;
                let inner: String = chars[pos + 1..close].iter().collect();
                compound.attributes.push(parse_attribute_selector(&inner, &mut compound.unmatchable)?);
                pos = close + 1;
            }
            ':' => {
                compound.unmatchable = true;
                pos += 1;
                if chars.get(pos) == Some(&':') {
                    pos += 1;
                }
                let (_, next) = read_ident(chars, pos);
                pos = next;
                if chars.get(pos) == Some(&'(') {
                    let mut depth = 0;
                    while pos < chars.len() {
                        match chars[pos] {
                            '(' => depth += 1,
                            ')' => {
                                depth -= 1;
                                if depth == 0 {
                                    pos += 1;
                                    break;
                                }
                            }
                            _ => {}
                        }
                        pos += 1;
                    }
                }
            }
            c if is_ident_char(c) && pos == start => {
                let (name, next) = read_ident(chars, pos);
                compound.tag = Some(name.to_ascii_lowercase());
                pos = next;
            }
            _ => break,
        }
    }
    if pos == start {
        None
    } else {
        Some((compound, pos))
    }
}

fn parse_attribute_selector(inner: &str, unmatchable: &mut bool) -> Option<AttributeSelector> {
    let unquote = |v: &str| v.trim().trim_matches(|c| c == '"' || c == '\'').to_string();
    if let Some(eq) = inner.find('=') {
        let (lhs, value) = (&inner[..eq], unquote(&inner[eq + 1..]));
        let (name, op) = match lhs.chars().last() {
            Some(c @ ('~' | '|' | '^' | '$' | '*')) => (&lhs[..lhs.len() - 1], Some(c)),
            _ => (lhs, None),
        };
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            return None;
        }
        return Some(match op {
            None => AttributeSelector::Equals(name, value),
            Some('~') => AttributeSelector::Includes(name, value),
            Some(_) => {
                *unmatchable = true;
                AttributeSelector::Exists(name)
            }
        });
    }
    let name = inner.trim().to_ascii_lowercase();
    if name.is_empty() {
        None
    } else {
        Some(AttributeSelector::Exists(name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub selectors: Vec<Selector>,
    pub declarations: Vec<Declaration>,
}

/// Page box settings from `@page`, in points.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PageRule {
    /// Width and height.
    pub size: Option<(f32, f32)>,
    /// Top, right, bottom, left.
    pub margin: Option<[f32; 4]>,
}

impl PageRule {
    /// Later settings win field by field.
    pub fn merge(&mut self, other: &PageRule) {
        if other.size.is_some() {
            self.size = other.size;
        }
        if other.margin.is_some() {
            self.margin = other.margin;
        }
    }
}

/// A declaration selected for an element, with the keys the cascade sorts on.
#[derive(Debug, Clone, Copy)]
pub struct MatchedDeclaration<'a> {
    pub declaration: &'a Declaration,
    pub specificity: Specificity,
    /// Index of the rule inside its sheet.
    pub order: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Stylesheet {
    pub rules: Vec<Rule>,
    pub page: PageRule,
}

impl Stylesheet {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.page == PageRule::default()
    }

    /// Declarations of every rule matching `element`. A rule whose selector
    /// list matches through several selectors counts with the most specific.
    pub fn matching<'a>(
        &'a self,
        element: &ElementNode,
        ancestors: &[&ElementNode],
    ) -> Vec<MatchedDeclaration<'a>> {
        let mut out = Vec::new();
        for (order, rule) in self.rules.iter().enumerate() {
            let best = rule
                .selectors
                .iter()
                .filter(|s| s.matches(element, ancestors))
                .map(Selector::specificity)
                .max();
            if let Some(specificity) = best {
                out.extend(rule.declarations.iter().map(|declaration| MatchedDeclaration {
                    declaration,
                    specificity,
                    order,
                }));
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a complete stylesheet.
pub fn parse_stylesheet(src: &str) -> Stylesheet {
    let text = strip_comments(src);
    let mut sheet = Stylesheet::default();
    parse_rules(&text, &mut sheet);
    sheet
}

fn parse_rules(text: &str, sheet: &mut Stylesheet) {
    let mut rest = text;
    loop {
        rest = rest.trim_start();
        // Legacy comment markers around style content.
        if let Some(r) = rest.strip_prefix("<!--").or_else(|| rest.strip_prefix("-->")) {
            rest = r;
            continue;
        }
        if rest.is_empty() {
            break;
        }
        let Some(brace) = find_top_level(rest, '{') else {
            break;
        };
        // Block-less at-rules: `@import url(x);`, `@charset "utf-8";`
        if rest.starts_with('@') {
            if let Some(semi) = find_top_level(rest, ';').filter(|&s| s < brace) {
                rest = &rest[semi + 1..];
                continue;
            }
        }
        let prelude = rest[..brace].trim();
        let close = matching_brace(rest, brace).unwrap_or(rest.len());
        let body = &rest[brace + 1..close];
        rest = rest.get(close + 1..).unwrap_or("");

        if let Some(at) = prelude.strip_prefix('@') {
            let name_len = at
                .find(|c: char| !(c.is_alphanumeric() || c == '-'))
                .unwrap_or(at.len());
            let (name, condition) = at.split_at(name_len);
            match name.to_ascii_lowercase().as_str() {
                "media" if media_applies(condition) => parse_rules(body, sheet),
                "page" if condition.trim().is_empty() => {
                    let page = parse_page_rule(body);
                    sheet.page.merge(&page);
                }
                other => log::debug!("skipping @{other} block"),
            }
            continue;
        }

        let selectors: Vec<Selector> = split_top_level(prelude, ',')
            .into_iter()
            .filter_map(Selector::parse)
            .collect();
        if selectors.is_empty() {
            log::debug!("skipping rule with unreadable selector '{prelude}'");
            continue;
        }
        sheet.rules.push(Rule {
            selectors,
            declarations: parse_declarations(body),
        });
    }
}

/// Does a media query list (or a `media` attribute) include print output?
pub fn media_applies(query: &str) -> bool {
    let q = query.trim().to_ascii_lowercase();
    if q.is_empty() {
        return true;
    }
    q.split(',').any(|part| {
        let part = part.trim();
        !part.starts_with("not ") && (part.contains("print") || part.contains("all"))
    })
}

/// Parse a declaration block (or the value of a `style` attribute).
pub fn parse_declarations(src: &str) -> Vec<Declaration> {
    split_top_level(src, ';')
        .into_iter()
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let property = prop.trim().to_ascii_lowercase();
            if property.is_empty() {
                return None;
            }
            let mut value = value.trim();
            let mut important = false;
            if let Some(bang) = value.rfind('!') {
                if value[bang + 1..].trim().eq_ignore_ascii_case("important") {
                    important = true;
                    value = value[..bang].trim_end();
                }
            }
            if value.is_empty() {
                return None;
            }
            Some(Declaration {
                property,
                value: value.to_string(),
                important,
            })
        })
        .collect()
}

fn parse_page_rule(body: &str) -> PageRule {
    let mut page = PageRule::default();
    let mut margin = [PT_PER_MM * 10.0; 4];
    let mut margin_set = false;
    for decl in parse_declarations(body) {
        match decl.property.as_str() {
            "size" => page.size = parse_page_size(&decl.value),
            "margin" => {
                if let Some(m) = parse_box_lengths(&decl.value, 16.0) {
                    margin = m;
                    margin_set = true;
                }
            }
            side @ ("margin-top" | "margin-right" | "margin-bottom" | "margin-left") => {
                if let Some(v) = parse_length(&decl.value, 16.0) {
                    let idx = match side {
                        "margin-top" => 0,
                        "margin-right" => 1,
                        "margin-bottom" => 2,
                        _ => 3,
                    };
                    margin[idx] = v;
                    margin_set = true;
                }
            }
            _ => {}
        }
    }
    if margin_set {
        page.margin = Some(margin);
    }
    page
}

/// `A4`, `A4 landscape`, `letter`, `landscape`, or one or two lengths.
fn parse_page_size(value: &str) -> Option<(f32, f32)> {
    let mut named: Option<(f32, f32)> = None;
    let mut landscape = false;
    let mut lengths = Vec::new();
    for word in value.split_whitespace() {
        match word.to_ascii_lowercase().as_str() {
            "a3" => named = Some((841.89, 1190.55)),
            "a4" => named = Some((A4_WIDTH_PT, A4_HEIGHT_PT)),
            "a5" => named = Some((419.53, 595.28)),
            "letter" => named = Some((612.0, 792.0)),
            "legal" => named = Some((612.0, 1008.0)),
            "landscape" => landscape = true,
            "portrait" | "auto" => {}
            other => lengths.push(parse_length(other, 16.0)?),
        }
    }
    let (w, h) = match (named, lengths.as_slice()) {
        (Some(size), []) => size,
        (None, []) => (A4_WIDTH_PT, A4_HEIGHT_PT),
        (None, [side]) => (*side, *side),
        (None, [w, h]) => (*w, *h),
        _ => return None,
    };
    Some(if landscape { (w.max(h), w.min(h)) } else { (w, h) })
}

/// Expand a 1–4 value box shorthand to top, right, bottom, left.
pub fn parse_box_lengths(value: &str, em: f32) -> Option<[f32; 4]> {
    let v: Vec<f32> = value
        .split_whitespace()
        .map(|p| parse_length(p, em))
        .collect::<Option<_>>()?;
    match v.as_slice() {
        [a] => Some([*a, *a, *a, *a]),
        [a, b] => Some([*a, *b, *a, *b]),
        [a, b, c] => Some([*a, *b, *c, *b]),
        [a, b, c, d] => Some([*a, *b, *c, *d]),
        _ => None,
    }
}

/// Convert a CSS length to points. `px` and `pt` map 1:1 because the
/// renderer lays out in points; `em` is relative to `em`.
pub fn parse_length(value: &str, em: f32) -> Option<f32> {
    let v = value.trim().to_ascii_lowercase();
    let split = v
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(v.len());
    let (num, unit) = v.split_at(split);
    let n: f32 = num.parse().ok()?;
    let factor = match unit.trim() {
        "" | "px" | "pt" => 1.0,
        "mm" => PT_PER_MM,
        "cm" => PT_PER_MM * 10.0,
        "in" => 72.0,
        "pc" => 12.0,
        "em" | "rem" => em,
        _ => return None,
    };
    Some(n * factor)
}

fn strip_comments(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Byte offset of the first `target` outside quotes, parentheses and
/// brackets.
fn find_top_level(s: &str, target: char) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[') => depth += 1,
            (None, ')' | ']') => depth -= 1,
            (None, c) if c == target && depth <= 0 => return Some(i),
            _ => {}
        }
    }
    None
}

fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(i) = find_top_level(rest, sep) {
        parts.push(&rest[..i]);
        rest = &rest[i + sep.len_utf8()..];
    }
    parts.push(rest);
    parts.retain(|p| !p.trim().is_empty());
    parts
}

/// Offset of the `}` closing the `{` at `open`.
fn matching_brace(s: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, c) in s[open..].char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '{') => depth += 1,
            (None, '}') => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Tag;

    fn el(tag: Tag, class: &str) -> ElementNode {
        ElementNode::new(tag).with_attribute("class", class)
    }

    #[test]
    fn parses_rules_and_important() {
        let sheet = parse_stylesheet(
            "/* header */ td.import, th { width: auto !important; color: red }\np{margin:0}",
        );
        assert_eq!(sheet.rules.len(), 2);
        let rule = &sheet.rules[0];
        assert_eq!(rule.selectors.len(), 2);
        assert_eq!(
            rule.declarations[0],
            Declaration {
                property: "width".into(),
                value: "auto".into(),
                important: true,
            }
        );
        assert!(!rule.declarations[1].important);
    }

    #[test]
    fn specificity_counts() {
        let s = |src| Selector::parse(src).unwrap().specificity();
        assert_eq!(s("td"), Specificity(0, 0, 1));
        assert_eq!(s("td.import"), Specificity(0, 1, 1));
        assert_eq!(s("#fattura-elettronica table.tbFoglio td"), Specificity(1, 1, 2));
        assert_eq!(s("*"), Specificity(0, 0, 0));
        assert_eq!(s("a[href]"), Specificity(0, 1, 1));
        assert!(s("td.import") > s("td"));
    }

    #[test]
    fn descendant_and_child_combinators() {
        let table = el(Tag::Table, "tbFoglio");
        let tr = ElementNode::new(Tag::Tr);
        let td = el(Tag::Td, "import");

        let desc = Selector::parse("table.tbFoglio td").unwrap();
        assert!(desc.matches(&td, &[&table, &tr]));

        let child = Selector::parse("table > td").unwrap();
        assert!(!child.matches(&td, &[&table, &tr]));
        let child = Selector::parse("tr>td.import").unwrap();
        assert!(child.matches(&td, &[&table, &tr]));

        let other = Selector::parse("table.tbNoBorder td").unwrap();
        assert!(!other.matches(&td, &[&table, &tr]));
    }

    #[test]
    fn id_and_attribute_selectors() {
        let div = ElementNode::new(Tag::Div).with_attribute("id", "fattura-elettronica");
        assert!(Selector::parse("#fattura-elettronica").unwrap().matches(&div, &[]));
        assert!(Selector::parse("div[id]").unwrap().matches(&div, &[]));
        assert!(Selector::parse("[id=\"fattura-elettronica\"]")
            .unwrap()
            .matches(&div, &[]));
        assert!(!Selector::parse("[id=other]").unwrap().matches(&div, &[]));
    }

    #[test]
    fn pseudo_classes_never_match() {
        let a = ElementNode::new(Tag::A);
        assert!(!Selector::parse("a:hover").unwrap().matches(&a, &[]));
        assert!(!Selector::parse("a::before").unwrap().matches(&a, &[]));
        assert!(!Selector::parse("p + a").unwrap().matches(&a, &[&ElementNode::new(Tag::P)]));
    }

    #[test]
    fn broken_selectors_are_dropped() {
        assert!(Selector::parse("> td").is_none());
        assert!(Selector::parse("td >").is_none());
        assert!(Selector::parse("").is_none());
        let sheet = parse_stylesheet("%%% { color: red } td { color: blue }");
        assert_eq!(sheet.rules.len(), 1);
    }

    #[test]
    fn print_media_is_flattened_and_screen_skipped() {
        let sheet = parse_stylesheet(
            "@media print { td { color: red } } @media screen { p { color: blue } } b { }",
        );
        assert_eq!(sheet.rules.len(), 2);
        let td = ElementNode::new(Tag::Td);
        assert_eq!(sheet.matching(&td, &[]).len(), 1);
        assert!(sheet.matching(&ElementNode::new(Tag::P), &[]).is_empty());
    }

    #[test]
    fn other_at_rules_are_skipped() {
        let sheet = parse_stylesheet(
            "@charset \"utf-8\"; @import url(x.css); @font-face { font-family: X } td { color: red }",
        );
        assert_eq!(sheet.rules.len(), 1);
    }

    #[test]
    fn page_rule_size_and_margin() {
        let sheet = parse_stylesheet("@page { size: A4; margin: 10mm; }");
        let (w, h) = sheet.page.size.unwrap();
        assert!((w - A4_WIDTH_PT).abs() < 0.01 && (h - A4_HEIGHT_PT).abs() < 0.01);
        let m = sheet.page.margin.unwrap();
        assert!((m[0] - 28.3465).abs() < 0.01);
        assert_eq!(m[0], m[3]);

        let landscape = parse_stylesheet("@page { size: A4 landscape }");
        assert_eq!(landscape.page.size, Some((A4_HEIGHT_PT, A4_WIDTH_PT)));
        assert_eq!(landscape.page.margin, None);
    }

    #[test]
    fn first_page_rules_do_not_apply_everywhere() {
        let sheet = parse_stylesheet("@page :first { margin: 0 }");
        assert_eq!(sheet.page, PageRule::default());
    }

    #[test]
    fn lengths_convert_to_points() {
        assert_eq!(parse_length("9pt", 16.0), Some(9.0));
        assert_eq!(parse_length("120px", 16.0), Some(120.0));
        assert_eq!(parse_length("1in", 16.0), Some(72.0));
        assert_eq!(parse_length("2em", 10.0), Some(20.0));
        assert!((parse_length("1cm", 16.0).unwrap() - 28.3465).abs() < 0.01);
        assert_eq!(parse_length("0", 16.0), Some(0.0));
        assert_eq!(parse_length("auto", 16.0), None);
        assert_eq!(parse_length("10vw", 16.0), None);
    }

    #[test]
    fn box_shorthand_expands() {
        assert_eq!(parse_box_lengths("1 2", 16.0), Some([1.0, 2.0, 1.0, 2.0]));
        assert_eq!(parse_box_lengths("1 2 3", 16.0), Some([1.0, 2.0, 3.0, 2.0]));
        assert_eq!(parse_box_lengths("1 auto", 16.0), None);
    }

    #[test]
    fn inline_declarations_keep_urls_intact() {
        let decls = parse_declarations("background: url(data:image/png;base64,AAA); color:#000");
        assert_eq!(decls.len(), 2);
        assert_eq!(decls[0].value, "url(data:image/png;base64,AAA)");
    }

    #[test]
    fn media_attribute_values() {
        assert!(media_applies(""));
        assert!(media_applies("print"));
        assert!(media_applies("screen, print"));
        assert!(media_applies("all"));
        assert!(!media_applies("screen"));
        assert!(!media_applies("not print"));
    }
}
