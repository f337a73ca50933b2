//! Error taxonomy for the conversion pipeline.
//!
//! Every variant is terminal: nothing is retried and nothing is recovered
//! locally. Stage-local errors (`XmlError`, `XPathError`) are folded into
//! these variants at the stage boundary.

use std::path::PathBuf;

use thiserror::Error;

/// Pipeline-wide result type.
pub type Result<T> = std::result::Result<T, ConvertError>;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("unsupported envelope kind: content type {content_type} is not signedData")]
    UnsupportedEnvelopeKind { content_type: String },

    #[error("signed envelope carries no embedded content (detached signature)")]
    MissingEmbeddedContent,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("unknown stylesheet '{name}' (expected one of: {expected})")]
    UnknownStylesheet { name: String, expected: String },

    #[error("malformed source document: {0}")]
    MalformedSourceDocument(String),

    #[error("transformation error: {0}")]
    TransformationError(String),

    #[error("render error: {0}")]
    RenderError(String),

    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ConvertError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Short, stable label for the failing stage. Used in log lines.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::UnsupportedEnvelopeKind { .. }
            | Self::MissingEmbeddedContent
            | Self::MalformedEnvelope(_) => "unwrap",
            Self::UnknownStylesheet { .. } => "config",
            Self::MalformedSourceDocument(_) | Self::TransformationError(_) => "transform",
            Self::RenderError(_) => "render",
            Self::Io { .. } => "io",
        }
    }
}
