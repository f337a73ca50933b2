//! Bundled stylesheet variants applied to sample invoices.
//!
//! These tests validate:
//! - Every variant compiles and produces an HTML page
//! - Code tables (document type, payment method, VAT chargeability) decode
//! - Amounts use the Italian grouping and decimal separators
//! - Multi-body invoices produce one section per body

use std::path::{Path, PathBuf};

use fattura_forge::pipeline::{transform_document, PipelineConfig};
use fattura_forge::stylesheet::StylesheetVariant;
use fattura_forge::ConvertError;

const INVOICE: &[u8] = include_bytes!("fixtures/IT01234567890_FPR01.xml");
const LOTTO: &[u8] = include_bytes!("fixtures/IT01234567890_lotto.xml");

// =====================================================================
// Helper
// =====================================================================

fn styles_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("styles")
}

fn config(variant: StylesheetVariant) -> PipelineConfig {
    PipelineConfig {
        stylesheet: variant,
        styles_root: Some(styles_dir()),
        ..PipelineConfig::default()
    }
}

fn transform(variant: StylesheetVariant, xml: &[u8]) -> String {
    transform_document(xml, &config(variant))
        .unwrap_or_else(|e| panic!("{variant} failed: {e}"))
}

// =====================================================================
// All variants
// =====================================================================

#[test]
fn every_variant_emits_a_styled_page() {
    for variant in StylesheetVariant::ALL {
        let html = transform(variant, INVOICE);
        assert!(html.contains("<html"), "{variant}: no <html>");
        assert!(html.contains("<style"), "{variant}: no document style sheet");
        assert!(html.contains("id=\"fattura-elettronica\""), "{variant}");
        assert!(html.contains("Officine Rossi S.r.l."), "{variant}: seller missing");
        assert!(html.contains("01234567890"), "{variant}: VAT number missing");
        assert!(html.contains("1.220,00"), "{variant}: total missing");
    }
}

#[test]
fn every_variant_handles_multiple_bodies() {
    for variant in StylesheetVariant::ALL {
        let html = transform(variant, LOTTO);
        assert!(html.contains("Pulizia scale"), "{variant}: first body missing");
        assert!(html.contains("Storno parziale"), "{variant}: second body missing");
    }
}

// =====================================================================
// SdI layout
// =====================================================================

#[test]
fn sdi_decodes_code_tables() {
    let html = transform(StylesheetVariant::Sdi, INVOICE);
    assert!(html.contains("TD01 fattura"));
    assert!(html.contains("MP05 bonifico"));
    assert!(html.contains("RF01 (ordinario)"));
    assert!(html.contains("IVA ad esigibilità immediata"));
}

#[test]
fn sdi_formats_dates_and_amounts() {
    let html = transform(StylesheetVariant::Sdi, INVOICE);
    assert!(html.contains("15-01-2024"), "document date");
    assert!(html.contains("14-02-2024"), "due date");
    assert!(html.contains("250,00"), "unit price");
    assert!(html.contains("1.000,00"), "taxable amount");
    assert!(html.contains("2,00"), "quantity");
}

#[test]
fn sdi_names_people_and_companies() {
    let html = transform(StylesheetVariant::Sdi, INVOICE);
    assert!(html.contains("Mario Bianchi"));
    assert!(html.contains("BNCMRA80A01H501U"));
    assert!(html.contains("Via Roma 12"));
}

#[test]
fn sdi_line_details() {
    let html = transform(StylesheetVariant::Sdi, INVOICE);
    assert!(html.contains("MAN-01 (INTERNO)"));
    assert!(html.contains("LOTTO: VT-2231"));
    assert!(html.contains("Ordine di acquisto ORD-88 del 20-12-2023"));
}

#[test]
fn sdi_numbers_bodies_of_a_lot() {
    let html = transform(StylesheetVariant::Sdi, LOTTO);
    assert!(html.contains("Documento 1 di 2"));
    assert!(html.contains("Documento 2 di 2"));
    assert!(html.contains("TD04 nota di credito"));
    assert!(html.contains("scissione dei pagamenti"));
    assert!(html.contains("storno.pdf"));
    // No declared total: taxable plus tax.
    assert!(html.contains("183,00"));
    assert!(html.contains("61,00"));
}

#[test]
fn sdi_single_body_has_no_counter() {
    let html = transform(StylesheetVariant::Sdi, INVOICE);
    assert!(!html.contains("Documento 1 di"));
}

// =====================================================================
// Other variants
// =====================================================================

#[test]
fn ordinaria_matches_the_v12_namespace() {
    let html = transform(StylesheetVariant::Ordinaria, INVOICE);
    assert!(html.contains("FATTURA ELETTRONICA - versione FPR12"));
    assert!(html.contains("TD01 (fattura)"));
    assert!(html.contains("MP05 (bonifico)"));
    assert!(html.contains("Bianchi Mario"));
}

#[test]
fn ordinaria_ignores_other_namespaces() {
    let xml = br#"<FatturaElettronica versione="FPR12"><FatturaElettronicaHeader/></FatturaElettronica>"#;
    let html = transform(StylesheetVariant::Ordinaria, xml);
    assert!(html.contains("id=\"fattura-elettronica\""));
    assert!(!html.contains("FATTURA ELETTRONICA - versione"));
}

#[test]
fn ordinaria_numbers_lots() {
    let html = transform(StylesheetVariant::Ordinaria, LOTTO);
    assert!(html.contains("(lotto 1)"));
    assert!(html.contains("(lotto 2)"));
}

#[test]
fn fattura_pa_shows_office_code_and_totals() {
    let html = transform(StylesheetVariant::FatturaPa, INVOICE);
    assert!(html.contains("Codice ufficio:"));
    assert!(html.contains("ABC1234"));
    assert!(html.contains("del 15/01/2024"));
    assert!(html.contains("220,00"));
    assert!(html.contains("ORD-88"));
}

#[test]
fn fattura_pa_stripes_even_rows() {
    let html = transform(StylesheetVariant::FatturaPa, INVOICE);
    assert_eq!(html.matches("background-color: #f5f8fd").count(), 1);
}

#[test]
fn fattura_pa_flags_split_payment() {
    let html = transform(StylesheetVariant::FatturaPa, LOTTO);
    assert!(html.contains("scissione dei pagamenti (art. 17-ter)"));
}

#[test]
fn asso_software_lists_management_data() {
    let html = transform(StylesheetVariant::AssoSoftware, INVOICE);
    assert!(html.contains("LOTTO: VT-2231"));
    assert!(html.contains("2024/01/15"));
    assert!(html.contains("IBAN IT60X0542811101000000123456"));
}

#[test]
fn asso_software_breaks_pages_between_bodies() {
    let html = transform(StylesheetVariant::AssoSoftware, LOTTO);
    assert_eq!(html.matches("page-break-after: always").count(), 1);
    assert!(html.contains("PEC clienti@pec.example.it"));
}

// =====================================================================
// Failures
// =====================================================================

#[test]
fn malformed_invoice_is_a_source_error() {
    let err = transform_document(b"<p:FatturaElettronica>", &config(StylesheetVariant::Sdi))
        .unwrap_err();
    assert!(matches!(err, ConvertError::MalformedSourceDocument(_)), "{err:?}");
}

#[test]
fn missing_styles_directory_is_an_io_error() {
    let config = PipelineConfig {
        styles_root: Some("/nonexistent/fattura-forge/styles".into()),
        ..PipelineConfig::default()
    };
    let err = transform_document(INVOICE, &config).unwrap_err();
    assert!(matches!(err, ConvertError::Io { .. }), "{err:?}");
}
