//! Error types for the coursework-pdf library.
//!
//! Failures fall into three tiers, one per layer of the system:
//!
//! * [`ConversionError`] — **Fatal for one attempt**: the dispatcher could not
//!   turn an upload into a PDF (unknown type, malformed file, office suite
//!   missing, external tool failed). Never retried; the student re-uploads.
//!
//! * [`SubmissionError`] — the coordinator refused or failed a submission.
//!   Conversion failures pass through it verbatim so the student sees the
//!   dispatcher's message unchanged.
//!
//! * [`ArchiveOmission`] — **Non-fatal**: one canonical PDF could not be
//!   added to an assignment archive (usually deleted from disk). Recorded in
//!   [`crate::archive::ArchiveReport`] rather than aborting the whole archive.
//!   Only [`ArchiveError`] (the container itself cannot be written) is fatal.

use crate::capability::OfficeCapability;
use crate::submission::model::SubmissionId;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The step of a conversion that failed.
///
/// Reported alongside every [`ConversionError`] so logs and UIs can say
/// *where* a conversion broke without parsing the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ConversionPhase {
    /// Choosing a strategy from the extension.
    Dispatch,
    /// Comparing the file's leading bytes with its declared type.
    ContentCheck,
    /// Byte-copying an existing PDF.
    Passthrough,
    /// Decoding image frames.
    ImageDecode,
    /// Writing image frames into PDF pages.
    ImageEncode,
    /// Laying out text lines onto pages.
    TextRender,
    /// Running the external office converter.
    OfficeDelegate,
    /// The external office converter is not installed.
    OfficeDelegateUnavailable,
    /// Moving the finished PDF into place.
    Finalize,
}

impl fmt::Display for ConversionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConversionPhase::Dispatch => "unsupported extension",
            ConversionPhase::ContentCheck => "content check",
            ConversionPhase::Passthrough => "pdf copy",
            ConversionPhase::ImageDecode => "image decode",
            ConversionPhase::ImageEncode => "image encode",
            ConversionPhase::TextRender => "text render",
            ConversionPhase::OfficeDelegate => "office delegate",
            ConversionPhase::OfficeDelegateUnavailable => "office delegate unavailable",
            ConversionPhase::Finalize => "finalize",
        };
        f.write_str(s)
    }
}

/// Everything that can stop a single upload from becoming a PDF.
#[derive(Debug, Error)]
pub enum ConversionError {
    // ── User-actionable ───────────────────────────────────────────────────
    /// The extension has no conversion strategy.
    #[error("Unsupported file type '.{extension}'. Allowed types: {allowed}")]
    UnsupportedFormat { extension: String, allowed: String },

    /// The file's bytes do not look like its declared type.
    #[error("File '{path}' does not look like a .{extension} file. Re-save it in that format and upload again.")]
    ContentMismatch { path: PathBuf, extension: String },

    /// The external converter needed for this type is not installed.
    #[error("{capability} conversion is not available on this server. Upload a PDF instead, or ask an administrator to install it.\n{hint}")]
    CapabilityUnavailable {
        capability: OfficeCapability,
        hint: String,
    },

    // ── Diagnosable ───────────────────────────────────────────────────────
    /// The file is malformed for its declared type.
    #[error("Could not read '{path}' ({phase}): {detail}")]
    DecodeFailure {
        phase: ConversionPhase,
        path: PathBuf,
        detail: String,
    },

    /// The external converter ran but did not produce a PDF.
    #[error("{tool} did not produce a PDF: {detail}")]
    ExternalConversionFailure { tool: String, detail: String },

    /// The external converter exceeded its time budget and was killed.
    #[error("{tool} timed out after {secs}s and was stopped")]
    ExternalTimeout { tool: String, secs: u64 },

    // ── Storage ───────────────────────────────────────────────────────────
    /// Reading the source or writing the destination failed.
    #[error("I/O error during {phase} on '{path}': {source}")]
    Io {
        phase: ConversionPhase,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// A blocking conversion task panicked or was cancelled.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConversionError {
    /// The phase this failure belongs to.
    pub fn phase(&self) -> ConversionPhase {
        match self {
            ConversionError::UnsupportedFormat { .. } => ConversionPhase::Dispatch,
            ConversionError::ContentMismatch { .. } => ConversionPhase::ContentCheck,
            ConversionError::CapabilityUnavailable { .. } => {
                ConversionPhase::OfficeDelegateUnavailable
            }
            ConversionError::DecodeFailure { phase, .. } => *phase,
            ConversionError::ExternalConversionFailure { .. }
            | ConversionError::ExternalTimeout { .. } => ConversionPhase::OfficeDelegate,
            ConversionError::Io { phase, .. } => *phase,
            ConversionError::InvalidConfig(_) => ConversionPhase::Dispatch,
            ConversionError::Internal(_) => ConversionPhase::Finalize,
        }
    }

    /// `true` when the student can fix this by uploading something else.
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            ConversionError::UnsupportedFormat { .. }
                | ConversionError::ContentMismatch { .. }
                | ConversionError::CapabilityUnavailable { .. }
        )
    }

    pub(crate) fn io(phase: ConversionPhase, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConversionError::Io {
            phase,
            path: path.into(),
            source,
        }
    }
}

/// Failures of the persistence layer behind [`crate::submission::store::SubmissionStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read store '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write store '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store '{path}' is corrupt: {detail}")]
    Corrupt { path: PathBuf, detail: String },

    #[error("Store lock poisoned")]
    Poisoned,
}

/// Why the coordinator did not produce a submission.
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// No filename came with the upload.
    #[error("Please choose a file to upload.")]
    MissingFile,

    /// The extension is not on the allow-list. Nothing was written.
    #[error("File type '.{extension}' is not allowed. Allowed types: {allowed}")]
    RejectedExtension { extension: String, allowed: String },

    /// The assignment's start boundary is still in the future.
    #[error("Submissions for '{title}' open at {opens_at}")]
    NotYetOpen {
        title: String,
        opens_at: chrono::DateTime<chrono::Utc>,
    },

    /// Saving the original upload or preparing a storage directory failed.
    #[error("Failed to store upload at '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The dispatcher failed; the message is shown to the student as-is.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Submission {0} not found")]
    NotFound(SubmissionId),

    #[error("Marks {marks} are out of range (0–{max})")]
    InvalidMarks { marks: u32, max: u32 },
}

/// A fatal archive failure: the zip container could not be produced.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to write archive '{path}': {detail}")]
    WriteFailed { path: PathBuf, detail: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A canonical PDF that was left out of an archive.
///
/// Stored in [`crate::archive::ArchiveReport::omitted`]; the archive is still
/// produced with every other entry.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum ArchiveOmission {
    /// The PDF referenced by a submission no longer exists on disk.
    #[error("{name}: missing on disk")]
    Missing { name: String },

    /// The PDF exists but could not be read into the archive.
    #[error("{name}: unreadable: {detail}")]
    Unreadable { name: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_names_extension() {
        let e = ConversionError::UnsupportedFormat {
            extension: "exe".into(),
            allowed: "pdf, txt".into(),
        };
        assert!(e.to_string().contains(".exe"), "got: {e}");
        assert_eq!(e.phase().to_string(), "unsupported extension");
        assert!(e.is_user_actionable());
    }

    #[test]
    fn capability_unavailable_phase() {
        let e = ConversionError::CapabilityUnavailable {
            capability: OfficeCapability::WordProcessor,
            hint: "install LibreOffice".into(),
        };
        assert_eq!(e.phase().to_string(), "office delegate unavailable");
        assert!(e.is_user_actionable());
        assert!(e.to_string().contains("install LibreOffice"));
    }

    #[test]
    fn decode_failure_carries_cause() {
        let e = ConversionError::DecodeFailure {
            phase: ConversionPhase::ImageDecode,
            path: PathBuf::from("scan.png"),
            detail: "unexpected EOF".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("image decode"), "got: {msg}");
        assert!(msg.contains("unexpected EOF"), "got: {msg}");
        assert!(!e.is_user_actionable());
    }

    #[test]
    fn timeout_is_office_phase() {
        let e = ConversionError::ExternalTimeout {
            tool: "soffice".into(),
            secs: 30,
        };
        assert_eq!(e.phase(), ConversionPhase::OfficeDelegate);
        assert!(e.to_string().contains("30s"));
    }

    #[test]
    fn conversion_message_passes_through_submission_error() {
        let inner = ConversionError::ExternalConversionFailure {
            tool: "soffice".into(),
            detail: "exit status 1".into(),
        };
        let expected = inner.to_string();
        let outer = SubmissionError::from(inner);
        assert_eq!(outer.to_string(), expected);
    }

    #[test]
    fn omission_display() {
        let o = ArchiveOmission::Missing {
            name: "Ada_R1_Essay.pdf".into(),
        };
        assert!(o.to_string().contains("Ada_R1_Essay.pdf"));
    }
}
