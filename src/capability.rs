//! Optional external converters and how the converter finds them.
//!
//! Office formats are converted by an external program that many deployments
//! do not have. Availability is answered by a [`CapabilityProvider`] injected
//! into [`crate::Converter`], so "not installed" is an ordinary branch that
//! tests can drive directly.

use crate::error::ConversionError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// The two families of office formats, each served by its own capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OfficeCapability {
    /// `doc`, `docx`.
    WordProcessor,
    /// `ppt`, `pptx`, `xls`, `xlsx`.
    OfficeAutomation,
}

impl OfficeCapability {
    pub const ALL: [OfficeCapability; 2] = [
        OfficeCapability::WordProcessor,
        OfficeCapability::OfficeAutomation,
    ];
}

impl fmt::Display for OfficeCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfficeCapability::WordProcessor => f.write_str("Word document"),
            OfficeCapability::OfficeAutomation => f.write_str("Presentation/spreadsheet"),
        }
    }
}

/// A located external converter: program plus any fixed leading arguments.
///
/// The office strategy appends
/// `--headless --convert-to pdf --outdir <dir> <source>` after `args_prefix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfficeTool {
    pub program: PathBuf,
    pub args_prefix: Vec<String>,
}

impl OfficeTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args_prefix: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args_prefix = args.into_iter().map(Into::into).collect();
        self
    }

    /// File name of the program, used as the tool name in errors and logs.
    pub fn display_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

/// Reports whether an external converter is reachable for a capability.
///
/// Implementations must be cheap to call repeatedly; the converter asks once
/// per office conversion.
pub trait CapabilityProvider: Send + Sync {
    /// Return the tool for `capability`, or
    /// [`ConversionError::CapabilityUnavailable`] with a hint for the operator.
    fn locate(&self, capability: OfficeCapability) -> Result<OfficeTool, ConversionError>;

    /// `true` if [`locate`](Self::locate) would succeed.
    fn is_available(&self, capability: OfficeCapability) -> bool {
        self.locate(capability).is_ok()
    }
}

/// Shared provider handle, as held by [`crate::Converter`].
pub type Capabilities = Arc<dyn CapabilityProvider>;

// ── System lookup ────────────────────────────────────────────────────────

/// Finds LibreOffice on the host through `office_probe`.
///
/// LibreOffice's `soffice` serves both capabilities.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCapabilities;

impl CapabilityProvider for SystemCapabilities {
    fn locate(&self, capability: OfficeCapability) -> Result<OfficeTool, ConversionError> {
        office_probe::locate_office_converter()
            .map(OfficeTool::new)
            .map_err(|e| ConversionError::CapabilityUnavailable {
                capability,
                hint: e.to_string(),
            })
    }
}

// ── Fixed providers ──────────────────────────────────────────────────────

/// A provider with no external converters at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOfficeCapabilities;

impl CapabilityProvider for NoOfficeCapabilities {
    fn locate(&self, capability: OfficeCapability) -> Result<OfficeTool, ConversionError> {
        Err(ConversionError::CapabilityUnavailable {
            capability,
            hint: "Office conversion is disabled in this deployment.".into(),
        })
    }
}

/// A provider backed by an explicit table, e.g. a converter path from config.
#[derive(Debug, Default, Clone)]
pub struct StaticCapabilities {
    tools: HashMap<OfficeCapability, OfficeTool>,
}

impl StaticCapabilities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one tool for both capabilities.
    pub fn all(tool: OfficeTool) -> Self {
        let mut caps = Self::new();
        for c in OfficeCapability::ALL {
            caps.tools.insert(c, tool.clone());
        }
        caps
    }

    pub fn with(mut self, capability: OfficeCapability, tool: OfficeTool) -> Self {
        self.tools.insert(capability, tool);
        self
    }
}

impl CapabilityProvider for StaticCapabilities {
    fn locate(&self, capability: OfficeCapability) -> Result<OfficeTool, ConversionError> {
        self.tools
            .get(&capability)
            .cloned()
            .ok_or_else(|| ConversionError::CapabilityUnavailable {
                capability,
                hint: "No converter is configured for this format.".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_provider_reports_unavailable() {
        let p = NoOfficeCapabilities;
        for c in OfficeCapability::ALL {
            assert!(!p.is_available(c));
        }
        let err = p.locate(OfficeCapability::WordProcessor).unwrap_err();
        assert!(err.is_user_actionable());
    }

    #[test]
    fn static_provider_per_capability() {
        let p = StaticCapabilities::new().with(
            OfficeCapability::WordProcessor,
            OfficeTool::new("/usr/bin/soffice"),
        );
        assert!(p.is_available(OfficeCapability::WordProcessor));
        assert!(!p.is_available(OfficeCapability::OfficeAutomation));
    }

    #[test]
    fn tool_name_is_file_name() {
        let t = OfficeTool::new("/opt/libreoffice/program/soffice").with_args(["-x"]);
        assert_eq!(t.display_name(), "soffice");
        assert_eq!(t.args_prefix, vec!["-x".to_string()]);
    }
}
