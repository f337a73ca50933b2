//! Pipeline – ties together envelope unwrapping, the XSLT transform, HTML
//! serialization and rendering into single function calls.
//!
//! The stages run strictly in order and the first failure ends the run:
//!
//! 1. **Unwrap** – recover the invoice XML from a `.p7m` envelope ([`envelope`])
//! 2. **Transform** – apply the selected stylesheet variant ([`xslt`])
//! 3. **Serialize** – write the result tree as HTML ([`markup`])
//! 4. **Render** – cascade, layout, paginate and emit PDF bytes
//!
//! [`envelope`]: crate::envelope
//! [`xslt`]: crate::xslt
//! [`markup`]: crate::markup

use std::fs;
use std::path::{Path, PathBuf};

use crate::css::{self, A4_HEIGHT_PT, A4_WIDTH_PT};
use crate::dom::{body_children, collect_style_blocks, normalize_tables, parse_html, DomNode};
use crate::envelope::{self, InputArtifact};
use crate::error::{ConvertError, Result};
use crate::fonts::FontMetrics;
use crate::layout::compute_layout;
use crate::layout_config::LayoutConfig;
use crate::markup::serialize_html;
use crate::overrides::override_sheet;
use crate::pagination::paginate;
use crate::render::render_pdf;
use crate::style::{build_cascaded_tree, Cascade};
use crate::stylesheet::{StylesheetRegistry, StylesheetVariant};
use crate::xml;

/// Page orientation for the generated PDF.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PageOrientation {
    /// Portrait mode: height > width (default).
    #[default]
    Portrait,
    /// Landscape mode: width > height.
    Landscape,
}

/// Configuration for the conversion pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Stylesheet variant applied to the invoice.
    pub stylesheet: StylesheetVariant,
    /// Styles directory; discovered when `None`.
    pub styles_root: Option<PathBuf>,
    /// Directory receiving `<stem>.pdf` (default: current directory).
    pub output_dir: PathBuf,
    /// Document title embedded in the PDF metadata (default: input stem).
    pub title: Option<String>,
    /// Page width in points (default: the override sheet's `@page` size).
    pub page_width: f32,
    /// Page height in points.
    pub page_height: f32,
    /// Page margin in points (default: the override sheet's `@page` margin).
    pub page_margin: f32,
    /// Page orientation; swaps effective width/height when `Landscape`.
    pub orientation: PageOrientation,
    /// Write `<stem>.extracted.xml` next to an unwrapped envelope.
    pub write_extracted: bool,
    /// Also write the intermediate `<stem>.html` to `output_dir`.
    pub write_html: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let page = override_sheet().page;
        let (page_width, page_height) = page.size.unwrap_or((A4_WIDTH_PT, A4_HEIGHT_PT));
        Self {
            stylesheet: StylesheetVariant::default(),
            styles_root: None,
            output_dir: PathBuf::from("."),
            title: None,
            page_width,
            page_height,
            page_margin: page.margin.map(|m| m[0]).unwrap_or(28.35),
            orientation: PageOrientation::Portrait,
            write_extracted: true,
            write_html: false,
        }
    }
}

impl PipelineConfig {
    /// Default configuration with the stylesheet named `name`.
    ///
    /// Fails with [`ConvertError::UnknownStylesheet`] before anything is read.
    pub fn for_stylesheet(name: &str) -> Result<Self> {
        Ok(Self {
            stylesheet: name.parse()?,
            ..Self::default()
        })
    }

    /// Effective page width after applying orientation.
    pub fn effective_width(&self) -> f32 {
        match self.orientation {
            PageOrientation::Portrait => self.page_width,
            PageOrientation::Landscape => self.page_height,
        }
    }

    /// Effective page height after applying orientation.
    pub fn effective_height(&self) -> f32 {
        match self.orientation {
            PageOrientation::Portrait => self.page_height,
            PageOrientation::Landscape => self.page_width,
        }
    }

    pub fn registry(&self) -> StylesheetRegistry {
        StylesheetRegistry::discover(self.styles_root.as_deref())
    }

    fn title_for(&self, input: &Path) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| envelope::base_stem(input))
    }
}

/// Everything one in-memory run produces.
#[derive(Debug, Clone)]
pub struct Conversion {
    /// The XML recovered from an envelope; `None` for plain XML input.
    pub extracted: Option<Vec<u8>>,
    pub html: String,
    pub pdf: Vec<u8>,
    pub layout: LayoutConfig,
}

/// Files written by [`convert_file`].
#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub pdf_path: PathBuf,
    pub extracted_path: Option<PathBuf>,
    pub html_path: Option<PathBuf>,
    pub pages: usize,
    pub pdf_bytes: usize,
}

/// Output path of the PDF for `input`: `<output_dir>/<stem>.pdf`.
pub fn pdf_path(input: &Path, config: &PipelineConfig) -> PathBuf {
    config
        .output_dir
        .join(format!("{}.pdf", envelope::base_stem(input)))
}

/// Run the whole pipeline in memory. `name` is used for input detection
/// and the default title only; nothing is read or written.
pub fn convert_bytes(
    name: impl AsRef<Path>,
    bytes: Vec<u8>,
    config: &PipelineConfig,
) -> Result<Conversion> {
    let name = name.as_ref();
    let artifact = InputArtifact::new(name, bytes);
    log::info!("converting {} ({:?})", name.display(), artifact.kind);

    let unwrapped = envelope::unwrap(&artifact)?;
    let html = transform_document(&unwrapped.xml, config)?;

    let mut titled = config.clone();
    titled.title = Some(config.title_for(name));
    let (pdf, layout) = render_html(&html, &titled)?;

    Ok(Conversion {
        extracted: unwrapped.was_extracted().then_some(unwrapped.xml),
        html,
        pdf,
        layout,
    })
}

/// Convert the file at `input` and write the results.
///
/// The extracted XML is written as soon as unwrapping succeeds. The PDF
/// is written last, through a temporary file, so a failed run leaves no
/// PDF behind.
pub fn convert_file(input: &Path, config: &PipelineConfig) -> Result<ConversionReport> {
    let artifact = InputArtifact::read(input)?;
    log::info!(
        "converting {} ({:?}, {} bytes) with stylesheet '{}'",
        input.display(),
        artifact.kind,
        artifact.bytes.len(),
        config.stylesheet
    );

    let unwrapped = envelope::unwrap(&artifact)?;
    let extracted_path = if unwrapped.was_extracted() && config.write_extracted {
        Some(envelope::persist_extracted(input, &unwrapped.xml)?)
    } else {
        None
    };

    let html = transform_document(&unwrapped.xml, config)?;

    let mut titled = config.clone();
    titled.title = Some(config.title_for(input));
    let (pdf, layout) = render_html(&html, &titled)?;

    fs::create_dir_all(&config.output_dir)
        .map_err(|e| ConvertError::io(&config.output_dir, e))?;

    let html_path = if config.write_html {
        let path = config
            .output_dir
            .join(format!("{}.html", envelope::base_stem(input)));
        write_atomic(&path, html.as_bytes())?;
        Some(path)
    } else {
        None
    };

    let pdf_path = pdf_path(input, config);
    write_atomic(&pdf_path, &pdf)?;
    log::info!(
        "wrote {} ({} bytes, {} page(s))",
        pdf_path.display(),
        pdf.len(),
        layout.page_count()
    );

    Ok(ConversionReport {
        pdf_path,
        extracted_path,
        html_path,
        pages: layout.page_count(),
        pdf_bytes: pdf.len(),
    })
}

/// Parse the invoice XML and apply the configured stylesheet, returning
/// the serialized HTML.
pub fn transform_document(xml_bytes: &[u8], config: &PipelineConfig) -> Result<String> {
    let source =
        xml::parse(xml_bytes).map_err(|e| ConvertError::MalformedSourceDocument(e.to_string()))?;
    let stylesheet = config.registry().load(config.stylesheet)?;
    let tree = stylesheet
        .transform(&source)
        .map_err(|e| ConvertError::TransformationError(e.to_string()))?;
    let html = serialize_html(&tree);
    log::info!(
        "transformed with '{}': {} bytes of HTML",
        config.stylesheet,
        html.len()
    );
    Ok(html)
}

/// Render HTML to PDF bytes under the override layer.
pub fn render_html(html: &str, config: &PipelineConfig) -> Result<(Vec<u8>, LayoutConfig)> {
    let layout = compute_layout_config(html, config)?;
    let pdf = render_pdf(&layout).map_err(ConvertError::RenderError)?;
    log::info!(
        "rendered {} page(s), {} bytes of PDF",
        layout.page_count(),
        pdf.len()
    );
    Ok((pdf, layout))
}

/// Generate only the layout config (no PDF rendering) – useful for testing.
pub fn compute_layout_config(html: &str, config: &PipelineConfig) -> Result<LayoutConfig> {
    let dom = parse_html(html);
    let author: Vec<css::Stylesheet> = collect_style_blocks(&dom)
        .iter()
        .map(|block| css::parse_stylesheet(block))
        .collect();

    let mut body = body_children(&dom);
    normalize_tables(&mut body);
    if !body.iter().any(is_renderable) {
        return Err(ConvertError::RenderError(
            "document has no renderable body".to_string(),
        ));
    }

    let cascade = Cascade::new(&author, Some(override_sheet()));
    let styled = build_cascaded_tree(&body, &cascade);
    log::debug!(
        "{} document style sheet(s), {} top-level node(s)",
        author.len(),
        styled.len()
    );

    let fonts = FontMetrics::default();
    let eff_w = config.effective_width();
    let eff_h = config.effective_height();
    let boxes = compute_layout(&styled, eff_w, config.page_margin, &fonts)
        .map_err(|e| ConvertError::RenderError(format!("layout failed: {e}")))?;

    let title = config
        .title
        .clone()
        .unwrap_or_else(LayoutConfig::default_title);
    Ok(paginate(
        &boxes,
        &title,
        eff_w,
        eff_h,
        config.page_margin,
        &fonts,
    ))
}

/// Visible content: text, or an element that is not pure metadata.
fn is_renderable(node: &DomNode) -> bool {
    match node {
        DomNode::Text(t) => !t.trim().is_empty(),
        DomNode::Element(e) => !e.tag.is_metadata(),
    }
}

/// Write `bytes` to `path` through a sibling temporary file and a rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".part");
    let tmp = path.with_file_name(tmp_name);

    if let Err(e) = fs::write(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(ConvertError::io(&tmp, e));
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        ConvertError::io(path, e)
    })
}
