//! Envelope unwrapping – recovers the invoice XML from a CMS/PKCS#7
//! `signedData` container (`.p7m`).
//!
//! The envelope is treated as a container only: signatures and certificates
//! are never checked. Plain XML input passes through untouched.

use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use cms::content_info::ContentInfo;
use cms::signed_data::SignedData;
use der::asn1::{ObjectIdentifier, OctetStringRef};
use der::Decode;

use crate::ber;
use crate::error::{ConvertError, Result};

/// `id-signedData` (RFC 5652 §5.1).
pub const ID_SIGNED_DATA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");

/// Double-signed files wrap one envelope in another; deeper nesting than
/// this is rejected.
pub const MAX_NESTING: usize = 8;

/// ASN.1 `SEQUENCE` tag, the first byte of any BER or DER `ContentInfo`.
const DER_SEQUENCE: u8 = 0x30;

/// What an input file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// An XML document, fed to the transformer as is.
    StructuredDocument,
    /// A CMS envelope (BER or DER, optionally base64-armoured).
    SignedEnvelope,
}

/// An input file read into memory.
#[derive(Debug, Clone)]
pub struct InputArtifact {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub kind: InputKind,
}

impl InputArtifact {
    pub fn new(path: impl Into<PathBuf>, bytes: Vec<u8>) -> Self {
        let path = path.into();
        let kind = detect_kind(&path, &bytes);
        Self { path, bytes, kind }
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| ConvertError::io(path, e))?;
        Ok(Self::new(path, bytes))
    }
}

/// The document recovered from an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unwrapped {
    pub xml: Vec<u8>,
    /// Envelope layers removed; 0 when the input was plain XML.
    pub layers: usize,
}

impl Unwrapped {
    pub fn was_extracted(&self) -> bool {
        self.layers > 0
    }
}

/// Classify an input by extension, then by content.
pub fn detect_kind(path: &Path, bytes: &[u8]) -> InputKind {
    let by_extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("p7m") || e.eq_ignore_ascii_case("p7s"))
        .unwrap_or(false);
    if by_extension || bytes.first() == Some(&DER_SEQUENCE) || dearmor(bytes).is_some() {
        InputKind::SignedEnvelope
    } else {
        InputKind::StructuredDocument
    }
}

/// Recover the XML carried by `artifact`.
pub fn unwrap(artifact: &InputArtifact) -> Result<Unwrapped> {
    match artifact.kind {
        InputKind::StructuredDocument => Ok(Unwrapped {
            xml: artifact.bytes.clone(),
            layers: 0,
        }),
        InputKind::SignedEnvelope => {
            let mut content = extract_signed_content(&artifact.bytes)?;
            let mut layers = 1;
            // Keep peeling while the payload is itself a signedData envelope.
            while let Some(inner) = nested_envelope(&content) {
                if layers >= MAX_NESTING {
                    return Err(ConvertError::MalformedEnvelope(format!(
                        "more than {MAX_NESTING} nested envelopes"
                    )));
                }
                content = extract_signed_content(&inner)?;
                layers += 1;
            }
            log::debug!(
                "unwrapped {} envelope layer(s), {} bytes of content",
                layers,
                content.len()
            );
            Ok(Unwrapped {
                xml: content,
                layers,
            })
        }
    }
}

/// Decode one `ContentInfo` and return its `eContent` bytes. BER input is
/// re-encoded as DER first; a segmented `eContent` comes back joined.
pub fn extract_signed_content(bytes: &[u8]) -> Result<Vec<u8>> {
    let der_bytes = envelope_der(bytes)?;

    let info = ContentInfo::from_der(&der_bytes)
        .map_err(|e| ConvertError::MalformedEnvelope(format!("ContentInfo: {e}")))?;
    if info.content_type != ID_SIGNED_DATA {
        return Err(ConvertError::UnsupportedEnvelopeKind {
            content_type: info.content_type.to_string(),
        });
    }

    let signed = info
        .content
        .decode_as::<SignedData>()
        .map_err(|e| ConvertError::MalformedEnvelope(format!("SignedData: {e}")))?;
    let econtent = signed
        .encap_content_info
        .econtent
        .ok_or(ConvertError::MissingEmbeddedContent)?;
    let octets = econtent
        .decode_as::<OctetStringRef<'_>>()
        .map_err(|e| ConvertError::MalformedEnvelope(format!("eContent: {e}")))?;
    Ok(octets.as_bytes().to_vec())
}

/// The DER form of an envelope given as DER, BER or base64 armour.
fn envelope_der(bytes: &[u8]) -> Result<Vec<u8>> {
    let armoured;
    let raw = if bytes.first() == Some(&DER_SEQUENCE) {
        bytes
    } else {
        armoured = dearmor(bytes).ok_or_else(|| {
            ConvertError::MalformedEnvelope("input is neither DER nor base64-encoded DER".into())
        })?;
        armoured.as_slice()
    };
    ber::to_der(raw).map_err(|e| ConvertError::MalformedEnvelope(format!("ContentInfo: {e}")))
}

/// If `content` is another signedData envelope, its DER bytes.
fn nested_envelope(content: &[u8]) -> Option<Vec<u8>> {
    let der_bytes = envelope_der(content).ok()?;
    let info = ContentInfo::from_der(&der_bytes).ok()?;
    (info.content_type == ID_SIGNED_DATA).then_some(der_bytes)
}

/// Decode base64-armoured DER (optionally PEM-framed). `None` unless the
/// text decodes to something that starts like a DER `SEQUENCE`.
fn dearmor(bytes: &[u8]) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(bytes).ok()?;
    let body: String = text
        .lines()
        .filter(|line| !line.trim_start().starts_with("-----"))
        .flat_map(|line| line.chars())
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if body.len() < 4
        || !body
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '='))
    {
        return None;
    }
    let decoded = base64::engine::general_purpose::STANDARD.decode(body).ok()?;
    (decoded.first() == Some(&DER_SEQUENCE)).then_some(decoded)
}

/// File stem with a trailing `.xml` removed (`invoice.xml.p7m` → `invoice`).
pub fn base_stem(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let cut = stem.len().saturating_sub(4);
    match stem.get(cut..) {
        Some(tail) if cut > 0 && tail.eq_ignore_ascii_case(".xml") => stem[..cut].to_string(),
        _ => stem,
    }
}

/// Where the extracted XML of `input` is written: next to the input, as
/// `<stem>.extracted.xml`.
pub fn extracted_path(input: &Path) -> PathBuf {
    let name = format!("{}.extracted.xml", base_stem(input));
    match input.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// Write the extracted XML next to the input. Returns the written path.
pub fn persist_extracted(input: &Path, xml: &[u8]) -> Result<PathBuf> {
    let path = extracted_path(input);
    fs::write(&path, xml).map_err(|e| ConvertError::io(&path, e))?;
    log::info!("extracted XML written to {}", path.display());
    Ok(path)
}

#[cfg(test)]
#[path = "../tests/common/mod.rs"]
mod der_fixtures;
