//! # coursework-pdf
//!
//! Normalise coursework uploads into one canonical PDF per submission.
//!
//! Students upload whatever their tools produce: Word and PowerPoint files,
//! spreadsheets, phone photos, plain-text listings, or PDFs. Graders want one
//! format they can open anywhere. This crate converts each upload to a PDF,
//! names it deterministically after the student and assignment, decides
//! whether it was late, records it, and can zip an assignment's PDFs for bulk
//! download.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (bytes + declared name)
//!  │
//!  ├─ 1. Allow-list   extension check, nothing written on rejection
//!  ├─ 2. Store        original kept under {student}_{µs timestamp}_{name}
//!  ├─ 3. Timeliness   on-time / late, fixed before conversion
//!  ├─ 4. Convert      pdf copy · image → pages · text → pages · office → soffice
//!  └─ 5. Record       Submission saved only when the PDF exists
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use coursework_pdf::{
//!     Assignment, AssignmentId, Converter, MemoryStore, PortalConfig, Student, StudentId,
//!     SubmissionCoordinator, Upload,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PortalConfig::builder().build()?;
//!     let converter = Converter::with_system_capabilities(config);
//!     let coordinator = SubmissionCoordinator::new(converter, Arc::new(MemoryStore::new()));
//!
//!     let assignment = Assignment::new(AssignmentId(1), "Lab Report 1");
//!     let student = Student::new(StudentId(7), "Ada Lovelace").with_registration("R42");
//!     let upload = Upload::from_path("report.docx").await?;
//!
//!     let submission = coordinator.submit(&assignment, &student, upload).await?;
//!     println!("{} ({})", submission.canonical_pdf_name, submission.timeliness);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `cwpdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! coursework-pdf = { version = "0.3", default-features = false }
//! ```
//!
//! ## Office formats
//!
//! `doc`, `docx`, `ppt`, `pptx`, `xls` and `xlsx` need LibreOffice on the
//! host. Without it those uploads fail with
//! [`ConversionError::CapabilityUnavailable`]; every other format works with
//! no external tools.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod archive;
pub mod capability;
pub mod config;
pub mod convert;
pub mod coordinator;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod progress;
pub mod submission;
pub mod upload;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use archive::{archive_assignment, archive_file_name, ArchiveReport};
pub use capability::{
    Capabilities, CapabilityProvider, NoOfficeCapabilities, OfficeCapability, OfficeTool,
    StaticCapabilities, SystemCapabilities,
};
pub use config::{PortalConfig, PortalConfigBuilder, TextLayout};
pub use convert::{ConversionReport, Converter};
pub use coordinator::SubmissionCoordinator;
pub use error::{
    ArchiveError, ArchiveOmission, ConversionError, ConversionPhase, StoreError, SubmissionError,
};
pub use format::{Strategy, ALLOWED_EXTENSIONS};
pub use progress::{ArchiveProgress, ArchiveProgressCallback, NoopArchiveProgress};
pub use submission::{
    Assignment, AssignmentId, GradingState, JsonFileStore, MemoryStore, Student, StudentId,
    Submission, SubmissionId, SubmissionStore, Timeliness,
};
pub use upload::Upload;
