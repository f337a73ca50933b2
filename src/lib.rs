//! # fattura-forge – FatturaPA invoice → PDF pipeline
//!
//! This crate converts Italian electronic invoices (FatturaPA XML, optionally
//! wrapped in a CMS/PKCS#7 `.p7m` signing envelope) into paginated A4 PDF
//! documents. The pipeline stages are:
//!
//! 1. **Unwrap** – recover the XML from a `signedData` envelope in BER or
//!    DER ([`envelope`], [`ber`])
//! 2. **Transform** – apply an XSLT 1.0 stylesheet variant ([`stylesheet`],
//!    [`xml`], [`xpath`], [`xslt`])
//! 3. **Serialize** – write the result tree as HTML ([`markup`])
//! 4. **Parse** – HTML string → DOM tree ([`dom`])
//! 5. **Style** – run the cascade: document `<style>` sheets, inline styles
//!    and the print overrides ([`css`], [`style`],
//!    [`overrides`])
//! 6. **Layout** – compute flexbox layout with Taffy ([`layout`])
//! 7. **Paginate** – split into pages ([`pagination`])
//! 8. **Render** – emit PDF bytes via printpdf ([`render`])
//!
//! Signatures are never verified: the envelope is treated as a container.

pub mod ber;
pub mod css;
pub mod dom;
pub mod envelope;
pub mod error;
pub mod fonts;
pub mod layout;
pub mod layout_config;
pub mod markup;
pub mod overrides;
pub mod pagination;
pub mod pipeline;
pub mod render;
pub mod style;
pub mod stylesheet;
pub mod xml;
pub mod xpath;
pub mod xslt;

// Re-exports for convenience
pub use error::{ConvertError, Result};
pub use pipeline::{
    convert_bytes, convert_file, render_html, Conversion, ConversionReport, PageOrientation,
    PipelineConfig,
};
pub use stylesheet::{StylesheetRegistry, StylesheetVariant};
