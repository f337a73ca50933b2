//! PDF renderer – takes a [`LayoutConfig`] and produces PDF bytes using
//! `printpdf` (v0.8 ops-based API). Text is set in the builtin Helvetica
//! faces with WinAnsi encoding, so no font file is embedded.

use std::collections::{BTreeSet, HashMap};

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use printpdf::*;

use crate::fonts::FontMetrics;
use crate::layout_config::{BorderStyle, ImageContent, LayoutBox, LayoutConfig, TextContent};

const MM_PER_PT: f32 = 25.4 / 72.0;

/// A printpdf XObject together with the pixel dimensions of the source image.
struct ImageResource {
    xobj_id: XObjectId,
    px_width: u32,
    px_height: u32,
}

/// Render a LayoutConfig into PDF bytes.
///
/// `<img>` elements whose `src` is not a base64 data URI, or whose bytes
/// cannot be decoded, are skipped with a warning. Images are registered in
/// `src` order so that equal layouts produce equal documents.
pub fn render_pdf(config: &LayoutConfig) -> Result<Vec<u8>, String> {
    let page_w = Mm(config.page_width_pt * MM_PER_PT);
    let page_h = Mm(config.page_height_pt * MM_PER_PT);

    let mut doc = PdfDocument::new(&config.title);
    pin_document_dates(&mut doc)?;

    // ── Pre-register all images ────────────────────────────────────────────
    let mut all_srcs: BTreeSet<&str> = BTreeSet::new();
    for page_layout in &config.pages {
        for lbox in &page_layout.boxes {
            collect_image_srcs(lbox, &mut all_srcs);
        }
    }

    let mut image_resources: HashMap<String, ImageResource> = HashMap::new();
    let mut img_warnings: Vec<PdfWarnMsg> = Vec::new();

    for src in &all_srcs {
        let bytes = match parse_data_uri(src) {
            Ok(b) => b,
            Err(e) => {
                log::warn!("skipping image: {e}");
                continue;
            }
        };

        // Decode with the `image` crate to obtain pixel dimensions.
        let dyn_img = match ::image::load_from_memory(&bytes) {
            Ok(img) => img,
            Err(e) => {
                log::warn!("skipping image: decode error: {e}");
                continue;
            }
        };
        let (px_width, px_height) = (dyn_img.width(), dyn_img.height());

        // Register with printpdf as a reusable XObject.
        let raw = match RawImage::decode_from_bytes(&bytes, &mut img_warnings) {
            Ok(r) => r,
            Err(e) => {
                log::warn!("skipping image: PDF encode error: {e}");
                continue;
            }
        };
        let xobj_id = doc.add_image(&raw);

        image_resources.insert(
            src.to_string(),
            ImageResource {
                xobj_id,
                px_width,
                px_height,
            },
        );
    }

    // ── Render pages ──────────────────────────────────────────────────────
    let mut pages = Vec::new();

    for page_layout in &config.pages {
        let mut ops = Vec::new();

        for lbox in &page_layout.boxes {
            render_box(&mut ops, lbox, config.page_height_pt, &image_resources);
        }

        let page = PdfPage::new(page_w, page_h, ops);
        pages.push(page);
    }

    // Ensure at least one page.
    if pages.is_empty() {
        pages.push(PdfPage::new(page_w, page_h, Vec::new()));
    }

    log::debug!(
        "rendering {} page(s), {} image(s)",
        pages.len(),
        image_resources.len()
    );
    doc.with_pages(pages);
    let mut warnings = Vec::new();
    let bytes = doc.save(&PdfSaveOptions::default(), &mut warnings);
    if !warnings.is_empty() {
        log::debug!("printpdf reported {} warning(s)", warnings.len());
    }

    Ok(bytes)
}

/// Stamps every document date with the Unix epoch so that a run depends on
/// its input only. printpdf's own identifiers come from a counter seeded
/// per process, so separate runs on one input give identical bytes.
fn pin_document_dates(doc: &mut PdfDocument) -> Result<(), String> {
    let epoch = OffsetDateTime::from_unix_timestamp(0).map_err(|e| e.to_string())?;
    let info = &mut doc.metadata.info;
    info.creation_date = epoch;
    info.modification_date = epoch;
    info.metadata_date = epoch;
    Ok(())
}

/// Convert a UTF-8 string to raw Windows-1252 bytes then wrap in a String so
/// printpdf writes the bytes unchanged into the PDF stream (builtin fonts use
/// WinAnsiEncoding, so each glyph is one byte 0x00–0xFF).
fn to_winlatin(s: &str) -> String {
    let bytes: Vec<u8> = s
        .chars()
        .map(|c| match c {
            '\u{20AC}' => 0x80, // euro
            '\u{201A}' => 0x82, // single low-9 quote
            '\u{201E}' => 0x84, // double low-9 quote
            '\u{2026}' => 0x85, // ellipsis
            '\u{2018}' => 0x91, // left single quote
            '\u{2019}' => 0x92, // right single quote
            '\u{201C}' => 0x93, // left double quote
            '\u{201D}' => 0x94, // right double quote
            '\u{2022}' => 0x95, // bullet
            '\u{2013}' => 0x96, // en-dash
            '\u{2014}' => 0x97, // em-dash
            '\u{2122}' => 0x99, // trademark
            '\u{00A0}' => 0x20, // non-breaking space -> space
            c if (c as u32) < 256 => c as u8,
            _ => b'?',
        })
        .collect();
    // SAFETY: intentionally non-UTF-8 for 0x80-0x9F range; printpdf passes
    // these bytes straight to the PDF stream, decoded by WinAnsiEncoding.
    #[allow(unsafe_code)]
    unsafe {
        String::from_utf8_unchecked(bytes)
    }
}

/// Parse a `data:<mime>;base64,<data>` URI and return the raw decoded bytes.
///
/// Returns `Err` if `src` is not a data URI or does not use base64 encoding.
fn parse_data_uri(src: &str) -> Result<Vec<u8>, String> {
    if !src.starts_with("data:") {
        let preview = if src.len() > 80 { &src[..80] } else { src };
        return Err(format!(
            "Image src must be a base64 data URI \
             (e.g. `data:image/png;base64,...`). Got: {preview:?}"
        ));
    }
    let rest = &src["data:".len()..];
    let comma_pos = rest.find(',').ok_or_else(|| {
        "Invalid data URI: missing `,` separator between header and data".to_string()
    })?;
    let header = &rest[..comma_pos];
    if !header.contains(";base64") {
        return Err("Only base64-encoded data URIs are supported. \
             The header must contain `;base64` (e.g. `data:image/png;base64,...`)."
            .to_string());
    }
    let b64_data: String = rest[comma_pos + 1..]
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    BASE64_STD
        .decode(b64_data)
        .map_err(|e| format!("Base64 decode error: {e}"))
}

/// Recursively collect all unique `image.src` strings from a [`LayoutBox`] tree.
fn collect_image_srcs<'a>(lbox: &'a LayoutBox, srcs: &mut BTreeSet<&'a str>) {
    if let Some(img) = &lbox.image {
        srcs.insert(img.src.as_str());
    }
    for child in &lbox.children {
        collect_image_srcs(child, srcs);
    }
}

fn rgb(c: [f32; 4]) -> Color {
    Color::Rgb(Rgb {
        r: c[0],
        g: c[1],
        b: c[2],
        icc_profile: None,
    })
}

fn point(x: f32, y: f32) -> LinePoint {
    LinePoint {
        p: Point { x: Pt(x), y: Pt(y) },
        bezier: false,
    }
}

/// Corners of a box in PDF space, counter-clockwise from bottom-left.
fn rect_points(lbox: &LayoutBox, pdf_top: f32) -> Vec<LinePoint> {
    let (x1, x2) = (lbox.x, lbox.x + lbox.width);
    let (y1, y2) = (pdf_top - lbox.height, pdf_top);
    vec![point(x1, y1), point(x2, y1), point(x2, y2), point(x1, y2)]
}

fn draw_background(ops: &mut Vec<Op>, lbox: &LayoutBox, bg: [f32; 4], pdf_top: f32) {
    ops.push(Op::SetFillColor { col: rgb(bg) });
    ops.push(Op::DrawPolygon {
        polygon: Polygon {
            rings: vec![PolygonRing {
                points: rect_points(lbox, pdf_top),
            }],
            mode: PaintMode::Fill,
            winding_order: WindingOrder::NonZero,
        },
    });
}

/// Stroke the border along the centre of the border area.
fn draw_border(ops: &mut Vec<Op>, lbox: &LayoutBox, border: &BorderStyle, pdf_top: f32) {
    let half = border.width / 2.0;
    let inset = LayoutBox::new(
        lbox.x + half,
        lbox.y + half,
        (lbox.width - border.width).max(0.0),
        (lbox.height - border.width).max(0.0),
    );
    ops.push(Op::SetOutlineColor {
        col: rgb(border.color),
    });
    ops.push(Op::SetOutlineThickness {
        pt: Pt(border.width),
    });
    ops.push(Op::DrawLine {
        line: Line {
            points: rect_points(&inset, pdf_top - half),
            is_closed: true,
        },
    });
}

fn write_text(
    ops: &mut Vec<Op>,
    x: f32,
    y: f32,
    size: f32,
    font: BuiltinFont,
    color: [f32; 4],
    s: &str,
) {
    ops.push(Op::StartTextSection);
    ops.push(Op::SetTextCursor {
        pos: Point { x: Pt(x), y: Pt(y) },
    });
    ops.push(Op::SetFontSizeBuiltinFont {
        size: Pt(size),
        font,
    });
    ops.push(Op::SetFillColor { col: rgb(color) });
    ops.push(Op::WriteTextBuiltinFont {
        items: vec![TextItem::Text(to_winlatin(s))],
        font,
    });
    ops.push(Op::EndTextSection);
}

fn draw_text(ops: &mut Vec<Op>, lbox: &LayoutBox, text: &TextContent, pdf_top: f32) {
    let font = match (text.bold, text.italic) {
        (true, true) => BuiltinFont::HelveticaBoldOblique,
        (true, false) => BuiltinFont::HelveticaBold,
        (false, true) => BuiltinFont::HelveticaOblique,
        (false, false) => BuiltinFont::Helvetica,
    };
    let baseline = if text.baseline > 0.0 {
        text.baseline
    } else {
        text.font_size * 0.75
    };
    let metrics = FontMetrics::default();

    for tline in &text.lines {
        if tline.text.is_empty() {
            continue;
        }
        let text_x = lbox.x + tline.x_offset;
        let text_y = pdf_top - tline.y_offset - baseline;
        write_text(ops, text_x, text_y, text.font_size, font, text.color, &tline.text);

        if text.underline {
            let width = metrics.measure_text_width(&tline.text, text.font_size, text.bold);
            let underline_y = text_y - text.font_size * 0.1;
            ops.push(Op::SetOutlineThickness { pt: Pt(0.5) });
            ops.push(Op::SetOutlineColor {
                col: rgb(text.color),
            });
            ops.push(Op::DrawLine {
                line: Line {
                    points: vec![point(text_x, underline_y), point(text_x + width, underline_y)],
                    is_closed: false,
                },
            });
        }
    }

    // List marker, in the gutter left of the item.
    if let Some(marker) = &text.list_marker {
        write_text(
            ops,
            lbox.x - 16.0,
            pdf_top - baseline,
            text.font_size,
            BuiltinFont::Helvetica,
            text.color,
            marker,
        );
    }
}

fn draw_image(
    ops: &mut Vec<Op>,
    lbox: &LayoutBox,
    img: &ImageContent,
    res: &ImageResource,
    page_height: f32,
) {
    let img_bottom_y = page_height - lbox.y - img.height;
    // At dpi=72 printpdf renders 1 px = 1 pt.
    let scale = |target: f32, px: u32| if px > 0 { target / px as f32 } else { 1.0 };
    ops.push(Op::UseXobject {
        id: res.xobj_id.clone(),
        transform: XObjectTransform {
            translate_x: Some(Pt(lbox.x)),
            translate_y: Some(Pt(img_bottom_y)),
            dpi: Some(72.0),
            scale_x: Some(scale(img.width, res.px_width)),
            scale_y: Some(scale(img.height, res.px_height)),
            rotate: None,
        },
    });
}

/// Recursively render a LayoutBox and its children into PDF ops.
fn render_box(
    ops: &mut Vec<Op>,
    lbox: &LayoutBox,
    page_height: f32,
    images: &HashMap<String, ImageResource>,
) {
    // PDF origin is bottom-left; layout origin is top-left.
    let pdf_top = page_height - lbox.y;

    if let Some(bg) = lbox.background_color {
        draw_background(ops, lbox, bg, pdf_top);
    }
    if let Some(border) = &lbox.border {
        draw_border(ops, lbox, border, pdf_top);
    }
    if let Some(text) = &lbox.text {
        draw_text(ops, lbox, text, pdf_top);
    }
    if let Some(img) = &lbox.image {
        if let Some(res) = images.get(&img.src) {
            draw_image(ops, lbox, img, res, page_height);
        }
    }

    for child in &lbox.children {
        render_box(ops, child, page_height, images);
    }
}
