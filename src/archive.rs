//! Bulk download: every canonical PDF of one assignment in a single zip.
//!
//! The archive is written as `assignment_{id}_submissions.zip` inside the PDF
//! directory, through a temp file that is renamed into place once complete.
//! Entries are flat (no directories) and named by canonical PDF name;
//! resubmissions share a canonical name, so each name appears once.
//!
//! A PDF that a record points at but that is gone from disk is logged and
//! reported as an [`ArchiveOmission`]; only failing to write the container
//! itself is an error.

use crate::config::PortalConfig;
use crate::error::{ArchiveError, ArchiveOmission};
use crate::progress::{ArchiveProgress, NoopArchiveProgress};
use crate::submission::model::AssignmentId;
use crate::submission::store::SubmissionStore;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use zip::{CompressionMethod, ZipWriter};

/// Outcome of one archive run.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ArchiveReport {
    /// The finished zip file.
    pub path: PathBuf,
    /// Entry names written, in archive order.
    pub entries: Vec<String>,
    /// Canonical PDFs that could not be included.
    pub omitted: Vec<ArchiveOmission>,
}

/// `assignment_{id}_submissions.zip`.
pub fn archive_file_name(assignment: AssignmentId) -> String {
    format!("assignment_{assignment}_submissions.zip")
}

/// Pack every available canonical PDF for `assignment`.
///
/// An assignment without submissions yields a valid, empty archive.
pub async fn archive_assignment(
    config: &PortalConfig,
    store: &dyn SubmissionStore,
    assignment: AssignmentId,
    progress: Option<ArchiveProgress>,
) -> Result<ArchiveReport, ArchiveError> {
    let start = Instant::now();
    let names: BTreeSet<String> = store
        .list_for_assignment(assignment)?
        .into_iter()
        .map(|s| s.canonical_pdf_name)
        .collect();

    let pdf_dir = config.pdf_dir.clone();
    let dest = pdf_dir.join(archive_file_name(assignment));
    let progress = progress.unwrap_or_else(|| Arc::new(NoopArchiveProgress));

    let report = tokio::task::spawn_blocking(move || {
        write_archive(&pdf_dir, &dest, names.into_iter().collect(), &progress)
    })
    .await
    .map_err(|e| ArchiveError::Internal(format!("Archive task panicked: {e}")))??;

    info!(
        "Archived assignment {}: {} entries, {} omitted, {}ms",
        assignment,
        report.entries.len(),
        report.omitted.len(),
        start.elapsed().as_millis()
    );
    Ok(report)
}

/// Blocking core: write `names` (relative to `pdf_dir`) into a zip at `dest`.
pub fn write_archive(
    pdf_dir: &Path,
    dest: &Path,
    names: Vec<String>,
    progress: &ArchiveProgress,
) -> Result<ArchiveReport, ArchiveError> {
    let fail = |detail: String| ArchiveError::WriteFailed {
        path: dest.to_path_buf(),
        detail,
    };

    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| fail(e.to_string()))?;
    let mut tmp = tempfile::Builder::new()
        .prefix(".cwpdf-")
        .suffix(".zip.part")
        .tempfile_in(parent)
        .map_err(|e| fail(e.to_string()))?;

    let total = names.len();
    progress.on_archive_start(total);

    let mut entries = Vec::with_capacity(total);
    let mut omitted = Vec::new();
    {
        let mut zip = ZipWriter::new(tmp.as_file_mut());
        let options: zip::write::FileOptions<'_, ()> =
            zip::write::FileOptions::default().compression_method(CompressionMethod::Deflated);

        for (i, name) in names.into_iter().enumerate() {
            let path = pdf_dir.join(&name);
            let bytes = match std::fs::read(&path) {
                Ok(b) => b,
                Err(e) => {
                    let omission = if e.kind() == std::io::ErrorKind::NotFound {
                        ArchiveOmission::Missing { name: name.clone() }
                    } else {
                        ArchiveOmission::Unreadable {
                            name: name.clone(),
                            detail: e.to_string(),
                        }
                    };
                    warn!("Skipping {}: {}", path.display(), omission);
                    progress.on_entry_skipped(&name, &omission.to_string());
                    omitted.push(omission);
                    continue;
                }
            };

            zip.start_file(name.clone(), options.clone())
                .map_err(|e| fail(format!("start entry {name}: {e}")))?;
            zip.write_all(&bytes)
                .map_err(|e| fail(format!("write entry {name}: {e}")))?;
            progress.on_entry_added(&name, i + 1, total);
            entries.push(name);
        }

        zip.finish().map_err(|e| fail(format!("finalize zip: {e}")))?;
    }

    tmp.as_file().sync_all().map_err(|e| fail(e.to_string()))?;
    tmp.persist(dest).map_err(|e| fail(e.error.to_string()))?;
    progress.on_archive_complete(entries.len(), omitted.len());

    Ok(ArchiveReport {
        path: dest.to_path_buf(),
        entries,
        omitted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> ArchiveProgress {
        Arc::new(NoopArchiveProgress)
    }

    #[test]
    fn archive_name_matches_convention() {
        assert_eq!(archive_file_name(AssignmentId(12)), "assignment_12_submissions.zip");
    }

    #[test]
    fn missing_pdf_is_omitted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"%PDF-a").unwrap();
        std::fs::write(dir.path().join("c.pdf"), b"%PDF-c").unwrap();
        let dest = dir.path().join("out.zip");

        let report = write_archive(
            dir.path(),
            &dest,
            vec!["a.pdf".into(), "b.pdf".into(), "c.pdf".into()],
            &noop(),
        )
        .unwrap();
        assert_eq!(report.entries, vec!["a.pdf", "c.pdf"]);
        assert_eq!(report.omitted.len(), 1);

        let mut zip = zip::ZipArchive::new(std::fs::File::open(&dest).unwrap()).unwrap();
        assert_eq!(zip.len(), 2);
        let mut body = String::new();
        std::io::Read::read_to_string(&mut zip.by_name("c.pdf").unwrap(), &mut body).unwrap();
        assert_eq!(body, "%PDF-c");
    }

    #[test]
    fn empty_archive_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested/empty.zip");
        let report = write_archive(dir.path(), &dest, Vec::new(), &noop()).unwrap();
        assert!(report.entries.is_empty());
        let zip = zip::ZipArchive::new(std::fs::File::open(&dest).unwrap()).unwrap();
        assert_eq!(zip.len(), 0);
    }
}
