//! Print override layer applied on top of every rendered invoice.
//!
//! The rules make the fixed-width desktop layouts of the invoice
//! stylesheets fit an A4 page: fluid container, fixed table layout, no
//! pixel widths on amount columns, wrapping cells and a 9 pt body size for
//! dense text. The sheet is applied last in the cascade, so its
//! `!important` declarations beat the document's own.

use std::sync::OnceLock;

use crate::css::{self, Stylesheet};

/// Bump whenever `styles/overrides.css` changes.
pub const OVERRIDES_VERSION: u32 = 1;

/// The override rules, embedded at build time.
pub const OVERRIDE_CSS: &str = include_str!("../styles/overrides.css");

/// The parsed override sheet, built on first use.
pub fn override_sheet() -> &'static Stylesheet {
    static SHEET: OnceLock<Stylesheet> = OnceLock::new();
    SHEET.get_or_init(|| {
        let sheet = css::parse_stylesheet(OVERRIDE_CSS);
        log::debug!(
            "parsed override sheet v{OVERRIDES_VERSION}: {} rules",
            sheet.rules.len()
        );
        sheet
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::css::{A4_HEIGHT_PT, A4_WIDTH_PT};
    use crate::dom::{ElementNode, Tag};

    fn declared<'a>(element: &ElementNode, ancestors: &[&ElementNode], prop: &str) -> Vec<(String, bool)> {
        override_sheet()
            .matching(element, ancestors)
            .into_iter()
            .filter(|m| m.declaration.property == prop)
            .map(|m| (m.declaration.value.clone(), m.declaration.important))
            .collect()
    }

    #[test]
    fn resource_carries_its_revision() {
        assert!(OVERRIDE_CSS.contains(&format!("revision {OVERRIDES_VERSION}")));
    }

    #[test]
    fn page_is_a4_with_ten_millimetre_margins() {
        let page = override_sheet().page;
        assert_eq!(page.size, Some((A4_WIDTH_PT, A4_HEIGHT_PT)));
        let margin = page.margin.unwrap();
        for side in margin {
            assert!((side - 28.3465).abs() < 0.01, "{side}");
        }
    }

    #[test]
    fn amount_cells_lose_fixed_width() {
        let td = ElementNode::new(Tag::Td).with_attribute("class", "import");
        assert_eq!(declared(&td, &[], "width"), vec![("auto".to_string(), true)]);
        assert_eq!(
            declared(&td, &[], "overflow-wrap"),
            vec![("break-word".to_string(), true)]
        );
    }

    #[test]
    fn plain_cells_keep_their_width_but_shrink_font() {
        let td = ElementNode::new(Tag::Td);
        assert!(declared(&td, &[], "width").is_empty());
        assert_eq!(declared(&td, &[], "font-size"), vec![("9pt".to_string(), true)]);
        assert_eq!(
            declared(&td, &[], "white-space"),
            vec![("normal".to_string(), true)]
        );
    }

    #[test]
    fn header_class_selectors_need_the_element_class_pair() {
        // `.th.import` targets an element carrying both classes.
        let th = ElementNode::new(Tag::Th).with_attribute("class", "import");
        assert!(declared(&th, &[], "width").is_empty());
        let div = ElementNode::new(Tag::Div).with_attribute("class", "th import");
        assert_eq!(declared(&div, &[], "width"), vec![("auto".to_string(), true)]);
    }

    #[test]
    fn container_is_fluid() {
        let div = ElementNode::new(Tag::Div).with_attribute("id", "fattura-elettronica");
        assert_eq!(declared(&div, &[], "width"), vec![("100%".to_string(), true)]);
        assert_eq!(declared(&div, &[], "margin-left"), vec![("auto".to_string(), true)]);
        assert_eq!(declared(&div, &[], "padding"), vec![("0".to_string(), false)]);
    }

    #[test]
    fn fixed_tables_are_full_width() {
        let table = ElementNode::new(Tag::Table).with_attribute("class", "tbFoglio");
        assert_eq!(declared(&table, &[], "width"), vec![("100%".to_string(), true)]);
        let plain = ElementNode::new(Tag::Table);
        assert!(declared(&plain, &[], "width").is_empty());
    }
}
