//! End-to-end tests for the conversion pipeline.
//!
//! These tests validate:
//! - Plain XML and signed envelopes both produce a PDF in the output dir
//! - Unwrapping failures leave no files behind
//! - The print overrides win over the invoice's own styles
//! - Repeated conversions give the same layout and the same PDF bytes

use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use sha2::{Digest, Sha256};

use fattura_forge::layout_config::{LayoutBox, LayoutConfig};
use fattura_forge::pipeline::{
    compute_layout_config, convert_bytes, convert_file, PageOrientation, PipelineConfig,
};
use fattura_forge::stylesheet::StylesheetVariant;
use fattura_forge::ConvertError;

mod common;
use common::{enveloped_data, signed_data, signed_data_ber};

const INVOICE: &[u8] = include_bytes!("fixtures/IT01234567890_FPR01.xml");
const LOTTO: &[u8] = include_bytes!("fixtures/IT01234567890_lotto.xml");

// =====================================================================
// Helper
// =====================================================================

fn styles_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("styles")
}

fn config_in(dir: &Path) -> PipelineConfig {
    PipelineConfig {
        styles_root: Some(styles_dir()),
        output_dir: dir.to_path_buf(),
        ..PipelineConfig::default()
    }
}

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

/// Sorted file names in `dir`.
fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn write_input(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn fingerprint(layout: &LayoutConfig) -> String {
    let json = layout.to_json().unwrap();
    let digest = Sha256::digest(json.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn find_text<'a>(boxes: &'a [LayoutBox], needle: &str) -> Option<&'a LayoutBox> {
    for b in boxes {
        if let Some(text) = &b.text {
            if text.lines.iter().any(|l| l.text.contains(needle)) {
                return Some(b);
            }
        }
        if let Some(found) = find_text(&b.children, needle) {
            return Some(found);
        }
    }
    None
}

fn text_box<'a>(layout: &'a LayoutConfig, needle: &str) -> &'a LayoutBox {
    layout
        .pages
        .iter()
        .find_map(|p| find_text(&p.boxes, needle))
        .unwrap_or_else(|| panic!("no text box containing {needle:?}"))
}

// =====================================================================
// Files on disk
// =====================================================================

#[test]
fn xml_input_writes_only_the_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "invoice.xml", INVOICE);

    let report = convert_file(&input, &config_in(dir.path())).unwrap();

    assert_eq!(report.pdf_path, dir.path().join("invoice.pdf"));
    assert!(report.extracted_path.is_none());
    assert!(report.html_path.is_none());
    assert!(report.pages >= 1);
    assert_valid_pdf(&fs::read(&report.pdf_path).unwrap());
    assert_eq!(listing(dir.path()), vec!["invoice.pdf", "invoice.xml"]);
}

#[test]
fn signed_input_writes_pdf_and_extracted_xml() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "invoice.xml.p7m", &signed_data(Some(INVOICE)));

    let report = convert_file(&input, &config_in(dir.path())).unwrap();

    let extracted = dir.path().join("invoice.extracted.xml");
    assert_eq!(report.extracted_path.as_deref(), Some(extracted.as_path()));
    assert_eq!(fs::read(&extracted).unwrap(), INVOICE);
    assert_valid_pdf(&fs::read(dir.path().join("invoice.pdf")).unwrap());
    assert_eq!(
        listing(dir.path()),
        vec!["invoice.extracted.xml", "invoice.pdf", "invoice.xml.p7m"]
    );
}

#[test]
fn extraction_can_be_turned_off() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "invoice.p7m", &signed_data(Some(INVOICE)));
    let config = PipelineConfig {
        write_extracted: false,
        ..config_in(dir.path())
    };

    let report = convert_file(&input, &config).unwrap();

    assert!(report.extracted_path.is_none());
    assert_eq!(listing(dir.path()), vec!["invoice.p7m", "invoice.pdf"]);
}

#[test]
fn html_is_written_on_request() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "invoice.xml", INVOICE);
    let config = PipelineConfig {
        write_html: true,
        ..config_in(dir.path())
    };

    let report = convert_file(&input, &config).unwrap();

    let html_path = report.html_path.unwrap();
    assert_eq!(html_path, dir.path().join("invoice.html"));
    let html = fs::read_to_string(html_path).unwrap();
    assert!(html.contains("Officine Rossi S.r.l."));
}

#[test]
fn output_dir_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "invoice.xml", INVOICE);
    let out = dir.path().join("out").join("pdf");

    let report = convert_file(&input, &config_in(&out)).unwrap();

    assert_eq!(report.pdf_path, out.join("invoice.pdf"));
    assert_eq!(listing(&out), vec!["invoice.pdf"]);
}

#[test]
fn enveloped_data_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "secret.p7m", &enveloped_data());

    let err = convert_file(&input, &config_in(dir.path())).unwrap_err();

    assert!(
        matches!(err, ConvertError::UnsupportedEnvelopeKind { .. }),
        "{err:?}"
    );
    assert_eq!(err.stage(), "unwrap");
    assert_eq!(listing(dir.path()), vec!["secret.p7m"]);
}

#[test]
fn detached_signature_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "detached.p7m", &signed_data(None));

    let err = convert_file(&input, &config_in(dir.path())).unwrap_err();

    assert!(matches!(err, ConvertError::MissingEmbeddedContent), "{err:?}");
    assert_eq!(listing(dir.path()), vec!["detached.p7m"]);
}

#[test]
fn truncated_envelope_is_malformed() {
    let dir = tempfile::tempdir().unwrap();
    let der = signed_data(Some(INVOICE));
    let input = write_input(dir.path(), "cut.p7m", &der[..der.len() / 2]);

    let err = convert_file(&input, &config_in(dir.path())).unwrap_err();

    assert!(matches!(err, ConvertError::MalformedEnvelope(_)), "{err:?}");
    assert_eq!(listing(dir.path()), vec!["cut.p7m"]);
}

#[test]
fn ber_envelope_writes_pdf_and_extracted_xml() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "ber.xml.p7m", &signed_data_ber(INVOICE, 512));

    let report = convert_file(&input, &config_in(dir.path())).unwrap();

    assert_valid_pdf(&fs::read(&report.pdf_path).unwrap());
    assert_eq!(fs::read(dir.path().join("ber.extracted.xml")).unwrap(), INVOICE);
    assert_eq!(
        listing(dir.path()),
        vec!["ber.extracted.xml", "ber.pdf", "ber.xml.p7m"]
    );
}

#[test]
fn transform_failure_keeps_the_extracted_xml() {
    let dir = tempfile::tempdir().unwrap();
    let broken = b"<p:FatturaElettronica xmlns:p=\"urn:x\"><unclosed>";
    let input = write_input(dir.path(), "broken.p7m", &signed_data(Some(broken)));

    let err = convert_file(&input, &config_in(dir.path())).unwrap_err();

    assert!(matches!(err, ConvertError::MalformedSourceDocument(_)), "{err:?}");
    assert_eq!(listing(dir.path()), vec!["broken.extracted.xml", "broken.p7m"]);
}

#[test]
fn missing_input_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = convert_file(&dir.path().join("nope.xml"), &config_in(dir.path())).unwrap_err();
    assert!(matches!(err, ConvertError::Io { .. }), "{err:?}");
    assert!(listing(dir.path()).is_empty());
}

// =====================================================================
// Envelope encodings
// =====================================================================

#[test]
fn envelope_encodings_render_like_plain_xml() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let plain = convert_bytes("invoice.xml", INVOICE.to_vec(), &config).unwrap();
    assert!(plain.extracted.is_none());

    let der = signed_data(Some(INVOICE));
    let armoured = base64::engine::general_purpose::STANDARD
        .encode(&der)
        .into_bytes();
    let nested = signed_data(Some(&der));
    let ber = signed_data_ber(INVOICE, 1000);

    for (name, bytes) in [
        ("invoice.p7m", der.clone()),
        ("invoice.xml.p7m", armoured),
        ("invoice.p7m", nested),
        ("invoice.p7m", ber),
    ] {
        let conv = convert_bytes(name, bytes, &config).unwrap();
        assert_eq!(conv.extracted.as_deref(), Some(INVOICE));
        assert_eq!(conv.html, plain.html);
        assert_eq!(fingerprint(&conv.layout), fingerprint(&plain.layout));
    }
}

// =====================================================================
// Configuration
// =====================================================================

#[test]
fn unknown_stylesheet_is_rejected() {
    let err = PipelineConfig::for_stylesheet("fattura_fancy").unwrap_err();
    assert!(matches!(err, ConvertError::UnknownStylesheet { .. }));
    let message = err.to_string();
    for variant in StylesheetVariant::ALL {
        assert!(message.contains(variant.name()), "{message}");
    }
    assert_eq!(err.stage(), "config");
}

#[test]
fn default_alias_selects_sdi() {
    let config = PipelineConfig::for_stylesheet("default").unwrap();
    assert_eq!(config.stylesheet, StylesheetVariant::Sdi);
}

#[test]
fn every_variant_renders_a_pdf() {
    let dir = tempfile::tempdir().unwrap();
    for variant in StylesheetVariant::ALL {
        let config = PipelineConfig {
            stylesheet: variant,
            ..config_in(dir.path())
        };
        for fixture in [INVOICE, LOTTO] {
            let conv = convert_bytes("invoice.xml", fixture.to_vec(), &config)
                .unwrap_or_else(|e| panic!("{variant}: {e}"));
            assert_valid_pdf(&conv.pdf);
            assert!(conv.layout.page_count() >= 1, "{variant}");
        }
    }
}

#[test]
fn title_defaults_to_the_input_stem() {
    let dir = tempfile::tempdir().unwrap();
    let conv = convert_bytes(
        "IT01234567890_FPR01.xml.p7m",
        signed_data(Some(INVOICE)),
        &config_in(dir.path()),
    )
    .unwrap();
    assert_eq!(conv.layout.title, "IT01234567890_FPR01");

    let config = PipelineConfig {
        title: Some("Fattura 2024/17".to_string()),
        ..config_in(dir.path())
    };
    let conv = convert_bytes("invoice.xml", INVOICE.to_vec(), &config).unwrap();
    assert_eq!(conv.layout.title, "Fattura 2024/17");
}

#[test]
fn landscape_uses_the_long_edge_as_width() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        orientation: PageOrientation::Landscape,
        ..config_in(dir.path())
    };
    let conv = convert_bytes("invoice.xml", INVOICE.to_vec(), &config).unwrap();
    assert!(conv.layout.page_width_pt > conv.layout.page_height_pt);
}

// =====================================================================
// Print overrides
// =====================================================================

#[test]
fn invoice_content_fits_the_page_width() {
    let dir = tempfile::tempdir().unwrap();
    for variant in StylesheetVariant::ALL {
        let config = PipelineConfig {
            stylesheet: variant,
            ..config_in(dir.path())
        };
        let conv = convert_bytes("invoice.xml", INVOICE.to_vec(), &config).unwrap();
        let page_width = conv.layout.page_width_pt;
        for page in &conv.layout.pages {
            for b in &page.boxes {
                assert!(
                    b.x + b.width <= page_width + 0.5,
                    "{variant}: box at x={} width={} overflows {page_width}",
                    b.x,
                    b.width
                );
            }
        }
    }
}

#[test]
fn override_beats_document_and_inline_widths() {
    let html = r#"<html><head><style>
            td.import { width: 120px; font-weight: bold; }
        </style></head><body>
        <table class="tbFoglio"><tr>
            <td class="import" style="width:120px">1.234,56</td>
            <td>Totale</td>
        </tr></table>
        </body></html>"#;
    let config = PipelineConfig::default();
    let layout = compute_layout_config(html, &config).unwrap();

    // Both cells are fluid: the second starts near the middle of the row.
    let content_width = config.page_width - 2.0 * config.page_margin;
    let second = text_box(&layout, "Totale");
    assert!(
        second.x > config.page_margin + content_width * 0.4,
        "second cell at x={}",
        second.x
    );

    // Cell text is capped at 9pt; untouched document declarations survive.
    let amount = text_box(&layout, "1.234,56");
    let text = amount.text.as_ref().unwrap();
    assert_eq!(text.font_size, 9.0);
    assert!(text.bold);
}

#[test]
fn plain_cells_keep_their_width() {
    let html = r#"<table class="tbFoglio"><tr>
            <td style="width:120px">Descrizione</td>
            <td>Importo</td>
        </tr></table>"#;
    let config = PipelineConfig::default();
    let layout = compute_layout_config(html, &config).unwrap();

    let second = text_box(&layout, "Importo");
    assert!(
        second.x < config.page_margin + 200.0,
        "second cell at x={}",
        second.x
    );
    let first = text_box(&layout, "Descrizione");
    assert_eq!(first.text.as_ref().unwrap().font_size, 9.0);
}

// =====================================================================
// Determinism
// =====================================================================

#[test]
fn conversion_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let first = convert_bytes("invoice.xml", INVOICE.to_vec(), &config).unwrap();
    let second = convert_bytes("invoice.xml", INVOICE.to_vec(), &config).unwrap();

    assert_eq!(first.html, second.html);
    assert_eq!(fingerprint(&first.layout), fingerprint(&second.layout));
    assert_eq!(first.layout.page_count(), second.layout.page_count());
    assert_eq!(first.pdf.len(), second.pdf.len());
}

/// Runs the `fattura2pdf` binary on `input`, writing into `out`.
fn run_binary(input: &Path, out: &Path) -> Vec<u8> {
    let status = std::process::Command::new(env!("CARGO_BIN_EXE_fattura2pdf"))
        .arg(input)
        .arg("--styles")
        .arg(styles_dir())
        .arg("--output-dir")
        .arg(out)
        .status()
        .unwrap();
    assert!(status.success(), "fattura2pdf exited with {status}");
    fs::read(out.join("invoice.pdf")).unwrap()
}

#[test]
fn separate_runs_write_identical_pdfs() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "invoice.xml", INVOICE);
    let first_out = dir.path().join("first");
    let second_out = dir.path().join("second");

    let first = run_binary(&input, &first_out);
    let second = run_binary(&input, &second_out);

    assert_valid_pdf(&first);
    assert!(first == second, "PDF bytes differ between runs");
}

#[test]
fn rerunning_a_file_overwrites_the_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_input(dir.path(), "invoice.xml", INVOICE);
    let config = config_in(dir.path());

    let first = convert_file(&input, &config).unwrap();
    let second = convert_file(&input, &config).unwrap();

    assert_eq!(first.pdf_path, second.pdf_path);
    assert_eq!(first.pages, second.pages);
    assert_eq!(first.pdf_bytes, second.pdf_bytes);
    assert_eq!(listing(dir.path()), vec!["invoice.pdf", "invoice.xml"]);
}
