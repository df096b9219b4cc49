//! Configuration for the submission pipeline.
//!
//! Every tunable lives on [`PortalConfig`], built via [`PortalConfigBuilder`].
//! The same config is shared (behind an `Arc`) by the converter, the
//! coordinator and the archiver, so one value describes one deployment.

use crate::error::ConversionError;
use crate::format::ALLOWED_EXTENSIONS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// Configuration for a submission portal deployment.
///
/// Built via [`PortalConfig::builder()`] or using [`PortalConfig::default()`].
///
/// # Example
/// ```rust
/// use coursework_pdf::PortalConfig;
///
/// let config = PortalConfig::builder()
///     .upload_dir("/srv/portal/uploads")
///     .pdf_dir("/srv/portal/uploads/pdf")
///     .office_timeout_secs(60)
///     .build()
///     .unwrap();
/// assert_eq!(config.text_layout.lines_per_page(), 64);
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    /// Directory holding original uploads. Default: `uploads`.
    pub upload_dir: PathBuf,

    /// Directory holding canonical PDFs and archives. Default: `uploads/pdf`.
    pub pdf_dir: PathBuf,

    /// Lower-case extensions accepted by the coordinator. Default: every
    /// extension the converter has a strategy for.
    ///
    /// Narrowing this list (e.g. dropping `doc`/`ppt` on a server without an
    /// office suite) rejects those uploads before anything is stored.
    pub allowed_extensions: BTreeSet<String>,

    /// Compare each file's leading bytes with its extension before converting.
    /// Default: true.
    pub verify_content: bool,

    /// Resolution assumed for image pixels when sizing PDF pages. Range: 36–600.
    /// Default: 100.
    ///
    /// A 1000 px wide scan at 100 DPI becomes a 10 inch (720 pt) wide page.
    pub image_dpi: u32,

    /// Page geometry used by the text strategy.
    pub text_layout: TextLayout,

    /// Wall-clock budget for one external office conversion. Default: 120.
    ///
    /// The converter process is killed when it runs out.
    pub office_timeout_secs: u64,

    /// Conversions allowed to run at the same time. Default: 4.
    pub max_concurrent_conversions: usize,

    /// Upper bound accepted by grading. Default: 100.
    pub max_marks: u32,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            pdf_dir: PathBuf::from("uploads/pdf"),
            allowed_extensions: ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            verify_content: true,
            image_dpi: 100,
            text_layout: TextLayout::default(),
            office_timeout_secs: 120,
            max_concurrent_conversions: 4,
            max_marks: 100,
        }
    }
}

impl fmt::Debug for PortalConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalConfig")
            .field("upload_dir", &self.upload_dir)
            .field("pdf_dir", &self.pdf_dir)
            .field("allowed_extensions", &self.allowed_extensions.len())
            .field("verify_content", &self.verify_content)
            .field("image_dpi", &self.image_dpi)
            .field("lines_per_page", &self.text_layout.lines_per_page())
            .field("office_timeout_secs", &self.office_timeout_secs)
            .field("max_concurrent_conversions", &self.max_concurrent_conversions)
            .field("max_marks", &self.max_marks)
            .finish()
    }
}

impl PortalConfig {
    /// Create a new builder for `PortalConfig`.
    pub fn builder() -> PortalConfigBuilder {
        PortalConfigBuilder {
            config: Self::default(),
        }
    }

    /// `true` if `extension` (any case) is on the allow-list.
    pub fn is_allowed(&self, extension: &str) -> bool {
        self.allowed_extensions
            .contains(&extension.to_ascii_lowercase())
    }

    /// The allow-list joined for error messages, e.g. `"bmp, csv, doc"`.
    pub fn allowed_list(&self) -> String {
        self.allowed_extensions
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Builder for [`PortalConfig`].
#[derive(Debug)]
pub struct PortalConfigBuilder {
    config: PortalConfig,
}

impl PortalConfigBuilder {
    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn pdf_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.pdf_dir = dir.into();
        self
    }

    /// Replace the allow-list. Entries are lower-cased and stripped of a leading dot.
    pub fn allowed_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.config.allowed_extensions = exts
            .into_iter()
            .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        self
    }

    pub fn verify_content(mut self, v: bool) -> Self {
        self.config.verify_content = v;
        self
    }

    pub fn image_dpi(mut self, dpi: u32) -> Self {
        self.config.image_dpi = dpi.clamp(36, 600);
        self
    }

    pub fn text_layout(mut self, layout: TextLayout) -> Self {
        self.config.text_layout = layout;
        self
    }

    pub fn office_timeout_secs(mut self, secs: u64) -> Self {
        self.config.office_timeout_secs = secs.max(1);
        self
    }

    pub fn max_concurrent_conversions(mut self, n: usize) -> Self {
        self.config.max_concurrent_conversions = n.max(1);
        self
    }

    pub fn max_marks(mut self, max: u32) -> Self {
        self.config.max_marks = max;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PortalConfig, ConversionError> {
        let c = &self.config;
        if c.allowed_extensions.is_empty() {
            return Err(ConversionError::InvalidConfig(
                "At least one extension must be allowed".into(),
            ));
        }
        if let Some(ext) = c
            .allowed_extensions
            .iter()
            .find(|e| !ALLOWED_EXTENSIONS.contains(&e.as_str()))
        {
            return Err(ConversionError::InvalidConfig(format!(
                "Extension '.{ext}' has no conversion strategy"
            )));
        }
        if c.upload_dir == c.pdf_dir {
            return Err(ConversionError::InvalidConfig(
                "upload_dir and pdf_dir must differ".into(),
            ));
        }
        if c.max_marks == 0 {
            return Err(ConversionError::InvalidConfig("max_marks must be ≥ 1".into()));
        }
        c.text_layout.validate()?;
        Ok(self.config)
    }
}

// ── Text layout ──────────────────────────────────────────────────────────

/// Fixed page geometry for paginated text, in PDF points (1/72 inch).
///
/// The first baseline sits at `top_y`; each following line is `line_pitch`
/// lower. A new page starts once the next baseline would fall below
/// `bottom_margin`. The defaults (A4, baseline 800, margin 40, pitch 12) give
/// 64 lines per page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextLayout {
    pub page_width: f32,
    pub page_height: f32,
    pub top_y: f32,
    pub bottom_margin: f32,
    pub left_margin: f32,
    pub line_pitch: f32,
    pub font_size: f32,
}

impl Default for TextLayout {
    fn default() -> Self {
        Self {
            page_width: 595.0,
            page_height: 842.0,
            top_y: 800.0,
            bottom_margin: 40.0,
            left_margin: 40.0,
            line_pitch: 12.0,
            font_size: 10.0,
        }
    }
}

impl TextLayout {
    /// Number of baselines that fit between `top_y` and `bottom_margin`, inclusive.
    pub fn lines_per_page(&self) -> usize {
        let usable = self.top_y - self.bottom_margin;
        if usable < 0.0 || self.line_pitch <= 0.0 {
            return 1;
        }
        (usable / self.line_pitch).floor() as usize + 1
    }

    /// Baseline of the `index`-th line on a page (0-based).
    pub fn baseline(&self, index: usize) -> f32 {
        self.top_y - self.line_pitch * index as f32
    }

    fn validate(&self) -> Result<(), ConversionError> {
        if self.page_width <= 0.0 || self.page_height <= 0.0 {
            return Err(ConversionError::InvalidConfig(
                "Text page size must be positive".into(),
            ));
        }
        if self.line_pitch <= 0.0 || self.font_size <= 0.0 {
            return Err(ConversionError::InvalidConfig(
                "Line pitch and font size must be positive".into(),
            ));
        }
        if self.top_y > self.page_height || self.top_y < self.bottom_margin {
            return Err(ConversionError::InvalidConfig(format!(
                "Top baseline {} must lie between the bottom margin {} and the page height {}",
                self.top_y, self.bottom_margin, self.page_height
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout_fits_64_lines() {
        let layout = TextLayout::default();
        assert_eq!(layout.lines_per_page(), 64);
        assert_eq!(layout.baseline(0), 800.0);
        assert_eq!(layout.baseline(63), 44.0);
    }

    #[test]
    fn builder_clamps_dpi() {
        let c = PortalConfig::builder().image_dpi(5).build().unwrap();
        assert_eq!(c.image_dpi, 36);
        let c = PortalConfig::builder().image_dpi(10_000).build().unwrap();
        assert_eq!(c.image_dpi, 600);
    }

    #[test]
    fn allow_list_is_case_insensitive() {
        let c = PortalConfig::builder()
            .allowed_extensions([".PDF", "Txt"])
            .build()
            .unwrap();
        assert!(c.is_allowed("pdf"));
        assert!(c.is_allowed("TXT"));
        assert!(!c.is_allowed("docx"));
        assert_eq!(c.allowed_list(), "pdf, txt");
    }

    #[test]
    fn unknown_extension_rejected() {
        let err = PortalConfig::builder()
            .allowed_extensions(["pdf", "exe"])
            .build()
            .unwrap_err();
        assert!(err.to_string().contains(".exe"), "got: {err}");
    }

    #[test]
    fn same_dirs_rejected() {
        let err = PortalConfig::builder()
            .upload_dir("store")
            .pdf_dir("store")
            .build()
            .unwrap_err();
        assert!(matches!(err, ConversionError::InvalidConfig(_)));
    }

    #[test]
    fn default_allows_all_fourteen() {
        let c = PortalConfig::default();
        assert_eq!(c.allowed_extensions.len(), 14);
        assert_eq!(c.office_timeout_secs, 120);
    }
}
