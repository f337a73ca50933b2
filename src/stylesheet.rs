//! Stylesheet registry – the closed set of XSLT variants and where their
//! files live.

use std::borrow::Cow;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{ConvertError, Result};
use crate::xslt::Stylesheet;

/// Environment variable that overrides the styles directory.
pub const STYLES_DIR_ENV: &str = "FATTURA_FORGE_STYLES";

/// A presentation variant for FatturaPA invoices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StylesheetVariant {
    /// The layout published by the Sistema di Interscambio.
    #[default]
    Sdi,
    Ordinaria,
    FatturaPa,
    AssoSoftware,
}

impl StylesheetVariant {
    pub const ALL: [StylesheetVariant; 4] = [
        StylesheetVariant::Sdi,
        StylesheetVariant::Ordinaria,
        StylesheetVariant::FatturaPa,
        StylesheetVariant::AssoSoftware,
    ];

    /// The name accepted on the command line.
    pub fn name(self) -> &'static str {
        match self {
            StylesheetVariant::Sdi => "sdi",
            StylesheetVariant::Ordinaria => "ordinaria_ver1.2.3",
            StylesheetVariant::FatturaPa => "fatturaPA_ver1.2.3",
            StylesheetVariant::AssoSoftware => "AssoSoftware",
        }
    }

    pub fn file_name(self) -> String {
        format!("{}.xsl", self.name())
    }

    /// The stylesheet as shipped in `styles/`, compiled into the binary.
    pub fn embedded_source(self) -> &'static [u8] {
        match self {
            StylesheetVariant::Sdi => include_bytes!("../styles/sdi.xsl"),
            StylesheetVariant::Ordinaria => include_bytes!("../styles/ordinaria_ver1.2.3.xsl"),
            StylesheetVariant::FatturaPa => include_bytes!("../styles/fatturaPA_ver1.2.3.xsl"),
            StylesheetVariant::AssoSoftware => include_bytes!("../styles/AssoSoftware.xsl"),
        }
    }

    fn expected() -> String {
        Self::ALL
            .iter()
            .map(|v| v.name())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for StylesheetVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StylesheetVariant {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self> {
        if s == "default" {
            return Ok(StylesheetVariant::Sdi);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|v| v.name() == s)
            .ok_or_else(|| ConvertError::UnknownStylesheet {
                name: s.to_string(),
                expected: Self::expected(),
            })
    }
}

/// Resolves variants to stylesheet files under a root directory, or to the
/// copies compiled into the binary when there is no root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StylesheetRegistry {
    root: Option<PathBuf>,
}

impl StylesheetRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// The stylesheets compiled into the binary.
    pub fn embedded() -> Self {
        Self { root: None }
    }

    /// Locate the styles directory: explicit path, then the
    /// `FATTURA_FORGE_STYLES` environment variable, then `styles/` next to
    /// the executable. Without any of those the embedded copies are used.
    pub fn discover(explicit: Option<&Path>) -> Self {
        if let Some(dir) = explicit {
            return Self::new(dir);
        }
        if let Some(dir) = env::var_os(STYLES_DIR_ENV) {
            return Self::new(dir);
        }
        if let Some(dir) = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|p| p.join("styles")))
            .filter(|dir| dir.is_dir())
        {
            return Self::new(dir);
        }
        Self::embedded()
    }

    /// `None` for the embedded stylesheets.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn path_of(&self, variant: StylesheetVariant) -> Option<PathBuf> {
        self.root.as_ref().map(|root| root.join(variant.file_name()))
    }

    /// Validate a variant name and resolve it.
    pub fn resolve_name(&self, name: &str) -> Result<Option<PathBuf>> {
        let variant: StylesheetVariant = name.parse()?;
        Ok(self.path_of(variant))
    }

    /// Read and compile the stylesheet of `variant`.
    pub fn load(&self, variant: StylesheetVariant) -> Result<Stylesheet> {
        let (origin, bytes) = match self.path_of(variant) {
            Some(path) => {
                let bytes = fs::read(&path).map_err(|e| ConvertError::io(&path, e))?;
                (path.display().to_string(), Cow::Owned(bytes))
            }
            None => (
                format!("embedded {}", variant.file_name()),
                Cow::Borrowed(variant.embedded_source()),
            ),
        };
        log::debug!("loading stylesheet {origin} ({} bytes)", bytes.len());
        Stylesheet::parse(&bytes)
            .map_err(|e| ConvertError::TransformationError(format!("{origin}: {e}")))
    }
}

impl Default for StylesheetRegistry {
    fn default() -> Self {
        Self::discover(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_variant_name() {
        for v in StylesheetVariant::ALL {
            assert_eq!(v.name().parse::<StylesheetVariant>().unwrap(), v);
        }
        assert_eq!(
            "default".parse::<StylesheetVariant>().unwrap(),
            StylesheetVariant::Sdi
        );
    }

    #[test]
    fn unknown_name_lists_the_choices() {
        let err = "fancy".parse::<StylesheetVariant>().unwrap_err();
        match err {
            ConvertError::UnknownStylesheet { name, expected } => {
                assert_eq!(name, "fancy");
                assert!(expected.contains("AssoSoftware"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn names_are_case_sensitive() {
        assert!("SDI".parse::<StylesheetVariant>().is_err());
    }

    #[test]
    fn resolves_under_root() {
        let reg = StylesheetRegistry::new("/opt/styles");
        assert_eq!(
            reg.resolve_name("fatturaPA_ver1.2.3").unwrap(),
            Some(PathBuf::from("/opt/styles/fatturaPA_ver1.2.3.xsl"))
        );
        assert!(reg.resolve_name("nope").is_err());
    }

    #[test]
    fn explicit_root_wins() {
        let reg = StylesheetRegistry::discover(Some(Path::new("/tmp/xsl")));
        assert_eq!(reg.root(), Some(Path::new("/tmp/xsl")));
    }

    #[test]
    fn embedded_stylesheets_compile() {
        let reg = StylesheetRegistry::embedded();
        assert_eq!(reg.root(), None);
        assert_eq!(reg.resolve_name("sdi").unwrap(), None);
        for v in StylesheetVariant::ALL {
            reg.load(v)
                .unwrap_or_else(|e| panic!("{} failed to compile: {e}", v.name()));
        }
    }

    #[test]
    fn embedded_copies_match_the_styles_directory() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("styles");
        for v in StylesheetVariant::ALL {
            let on_disk = fs::read(dir.join(v.file_name())).unwrap();
            assert_eq!(on_disk, v.embedded_source(), "{v}");
        }
    }
}
