//! File-type classification: which strategy handles which extension, and
//! whether a file's leading bytes are plausible for the extension it claims.

use crate::capability::OfficeCapability;
use std::path::Path;

/// Every extension the converter has a strategy for, lower-case, no dot.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "doc", "docx", "ppt", "pptx", "xls", "xlsx", "txt", "csv", "pdf", "png", "jpg", "jpeg", "bmp",
    "gif",
];

/// How many leading bytes [`sniff_matches`] needs to see.
pub const SNIFF_LEN: usize = 1024;

const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const OLE2_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const ZIP_MAGIC: &[u8] = &[0x50, 0x4B, 0x03, 0x04];

/// The conversion strategy chosen for one input.
///
/// Selected once from the lower-cased extension; the converter matches on it
/// exactly once per conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// `pdf`: byte-copy.
    Passthrough,
    /// `png`, `jpg`, `jpeg`, `bmp`, `gif`: one page per frame.
    Rasterize,
    /// `txt`, `csv`: monospaced lines on fixed pages.
    Paginate,
    /// `doc`/`docx` and `ppt`/`pptx`/`xls`/`xlsx`: external office converter.
    OfficeDelegate(OfficeCapability),
    /// Anything else; carries the rejected extension (lower-cased, may be empty).
    Unsupported(String),
}

impl Strategy {
    /// Select a strategy from a bare extension (no dot, any case).
    pub fn from_extension(ext: &str) -> Self {
        let ext = ext.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Strategy::Passthrough,
            "png" | "jpg" | "jpeg" | "bmp" | "gif" => Strategy::Rasterize,
            "txt" | "csv" => Strategy::Paginate,
            "doc" | "docx" => Strategy::OfficeDelegate(OfficeCapability::WordProcessor),
            "ppt" | "pptx" | "xls" | "xlsx" => {
                Strategy::OfficeDelegate(OfficeCapability::OfficeAutomation)
            }
            _ => Strategy::Unsupported(ext),
        }
    }

    /// Select a strategy from a path's extension.
    pub fn for_path(path: &Path) -> Self {
        Self::from_extension(&extension_of(path))
    }

    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Passthrough => "passthrough",
            Strategy::Rasterize => "rasterize",
            Strategy::Paginate => "paginate",
            Strategy::OfficeDelegate(_) => "office-delegate",
            Strategy::Unsupported(_) => "unsupported",
        }
    }
}

/// Lower-cased extension of `path` without the dot; empty if there is none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Returns `true` when `data` (the first bytes of a file) is plausible for `ext`.
///
/// Plain-text types are never checked. A PDF header may follow up to
/// [`SNIFF_LEN`] bytes of leading junk, which readers tolerate.
pub fn sniff_matches(data: &[u8], ext: &str) -> bool {
    match ext.to_ascii_lowercase().as_str() {
        "txt" | "csv" => true,
        "pdf" => data
            .windows(5)
            .take(SNIFF_LEN)
            .any(|w| w == b"%PDF-"),
        "png" => data.starts_with(PNG_MAGIC),
        "jpg" | "jpeg" => data.starts_with(JPEG_MAGIC),
        "gif" => data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a"),
        "bmp" => data.starts_with(b"BM"),
        "doc" | "xls" | "ppt" => data.starts_with(OLE2_MAGIC),
        "docx" | "xlsx" | "pptx" => data.starts_with(ZIP_MAGIC),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_allowed_extension_has_a_strategy() {
        for ext in ALLOWED_EXTENSIONS {
            assert!(
                !matches!(Strategy::from_extension(ext), Strategy::Unsupported(_)),
                "{ext} has no strategy"
            );
        }
    }

    #[test]
    fn selection_ignores_case() {
        assert_eq!(Strategy::from_extension("PDF"), Strategy::Passthrough);
        assert_eq!(Strategy::from_extension("JpEg"), Strategy::Rasterize);
        assert_eq!(
            Strategy::for_path(Path::new("Report.DOCX")),
            Strategy::OfficeDelegate(OfficeCapability::WordProcessor)
        );
        assert_eq!(
            Strategy::from_extension("xls"),
            Strategy::OfficeDelegate(OfficeCapability::OfficeAutomation)
        );
    }

    #[test]
    fn unknown_extension_is_named() {
        assert_eq!(
            Strategy::from_extension("EXE"),
            Strategy::Unsupported("exe".into())
        );
        assert_eq!(
            Strategy::for_path(Path::new("noext")),
            Strategy::Unsupported(String::new())
        );
    }

    #[test]
    fn png_magic() {
        assert!(sniff_matches(PNG_MAGIC, "png"));
        assert!(sniff_matches(PNG_MAGIC, "PNG"));
        assert!(!sniff_matches(PNG_MAGIC, "jpg"));
    }

    #[test]
    fn pdf_header_may_be_offset() {
        assert!(sniff_matches(b"%PDF-1.7\n", "pdf"));
        assert!(sniff_matches(b"\xEF\xBB\xBF%PDF-1.4", "pdf"));
        assert!(!sniff_matches(b"PK\x03\x04", "pdf"));
    }

    #[test]
    fn office_containers() {
        assert!(sniff_matches(OLE2_MAGIC, "doc"));
        assert!(!sniff_matches(OLE2_MAGIC, "docx"));
        assert!(sniff_matches(b"PK\x03\x04rest", "pptx"));
    }

    #[test]
    fn text_is_never_checked() {
        assert!(sniff_matches(b"", "txt"));
        assert!(sniff_matches(&[0xFF, 0x00], "csv"));
    }
}
