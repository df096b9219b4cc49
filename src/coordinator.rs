//! The submission lifecycle: from an upload to a stored, named, classified PDF.
//!
//! ```text
//! submit(assignment, student, upload)
//!  ├─ 1. Extension allow-list       reject before any write
//!  ├─ 2. Submission window          reject before any write
//!  ├─ 3. Store original             uploads/{student}_{µs timestamp}_{name}
//!  ├─ 4. Timeliness                 fixed now, before conversion starts
//!  ├─ 5. Convert                    pdf/{name}_{reg}_{title}.pdf
//!  └─ 6. Record                     only if conversion succeeded
//! ```
//!
//! A failed conversion leaves the stored original in place and creates no
//! record; the dispatcher's error is returned unchanged.

use crate::archive::{archive_assignment, ArchiveReport};
use crate::config::PortalConfig;
use crate::convert::Converter;
use crate::error::{ArchiveError, SubmissionError};
use crate::progress::ArchiveProgress;
use crate::submission::model::{
    Assignment, AssignmentId, GradingState, NewSubmission, Student, StudentId, Submission,
    SubmissionId,
};
use crate::submission::naming;
use crate::submission::store::SubmissionStore;
use crate::upload::Upload;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Attempts at finding a free stored-upload name before giving up.
const MAX_NAME_ATTEMPTS: u32 = 100;

/// Orchestrates storage, conversion, naming and persistence of submissions.
#[derive(Clone)]
pub struct SubmissionCoordinator {
    converter: Converter,
    store: Arc<dyn SubmissionStore>,
}

impl std::fmt::Debug for SubmissionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionCoordinator")
            .field("converter", &self.converter)
            .field("store", &"<dyn SubmissionStore>")
            .finish()
    }
}

impl SubmissionCoordinator {
    pub fn new(converter: Converter, store: Arc<dyn SubmissionStore>) -> Self {
        Self { converter, store }
    }

    pub fn config(&self) -> &PortalConfig {
        self.converter.config()
    }

    pub fn converter(&self) -> &Converter {
        &self.converter
    }

    pub fn store(&self) -> &dyn SubmissionStore {
        self.store.as_ref()
    }

    /// Where the canonical PDF of a submission lives.
    pub fn pdf_path(&self, submission: &Submission) -> PathBuf {
        self.config().pdf_dir.join(&submission.canonical_pdf_name)
    }

    /// Where the retained original of a submission lives.
    pub fn upload_path(&self, submission: &Submission) -> PathBuf {
        self.config().upload_dir.join(&submission.stored_upload_name)
    }

    /// Accept `upload` as `student`'s work on `assignment`.
    pub async fn submit(
        &self,
        assignment: &Assignment,
        student: &Student,
        mut upload: Upload,
    ) -> Result<Submission, SubmissionError> {
        let config = self.config();

        // ── Step 1: Allow-list ───────────────────────────────────────────
        let declared = upload
            .declared_name()
            .ok_or(SubmissionError::MissingFile)?
            .to_string();
        let (_, extension) = naming::split_declared(&declared);
        if !config.is_allowed(&extension) {
            warn!(
                "Rejected '.{}' upload from student {} for assignment {}",
                extension, student.id, assignment.id
            );
            return Err(SubmissionError::RejectedExtension {
                extension,
                allowed: config.allowed_list(),
            });
        }

        // ── Step 2: Window ───────────────────────────────────────────────
        let now = Utc::now();
        if !assignment.has_opened(now) {
            if let Some(opens_at) = assignment.start {
                return Err(SubmissionError::NotYetOpen {
                    title: assignment.title.clone(),
                    opens_at,
                });
            }
        }

        // ── Step 3: Store the original ───────────────────────────────────
        let original_filename = naming::sanitize_filename(&declared);
        ensure_dir(&config.upload_dir).await?;
        ensure_dir(&config.pdf_dir).await?;
        let stored_path = self
            .store_original(&mut upload, student, &original_filename)
            .await?;
        let stored_upload_name = stored_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        // ── Step 4: Timeliness, fixed before conversion ──────────────────
        let timeliness = assignment.timeliness_at(Utc::now());

        // ── Step 5: Convert to the canonical name ────────────────────────
        let canonical_pdf_name = naming::canonical_pdf_name(student, assignment);
        let dest = config.pdf_dir.join(&canonical_pdf_name);
        if let Err(e) = self.converter.convert(&stored_path, &dest).await {
            warn!(
                "Conversion failed for {} (original kept at {}): {}",
                canonical_pdf_name,
                stored_path.display(),
                e
            );
            return Err(e.into());
        }

        // ── Step 6: Record ───────────────────────────────────────────────
        let submission = self.store.insert(NewSubmission {
            assignment_id: assignment.id,
            student_id: student.id,
            original_filename,
            stored_upload_name,
            canonical_pdf_name,
            submitted_at: Utc::now(),
            timeliness,
        })?;

        info!(
            "Submission {} by student {} for assignment {}: {} ({})",
            submission.id,
            student.id,
            assignment.id,
            submission.canonical_pdf_name,
            submission.timeliness
        );
        Ok(submission)
    }

    /// Set marks and remark. Timeliness is left untouched.
    pub fn grade(
        &self,
        id: SubmissionId,
        marks: u32,
        remark: Option<String>,
    ) -> Result<Submission, SubmissionError> {
        let max = self.config().max_marks;
        if marks > max {
            return Err(SubmissionError::InvalidMarks { marks, max });
        }
        let mut submission = self
            .store
            .get(id)?
            .ok_or(SubmissionError::NotFound(id))?;
        submission.marks = Some(marks);
        submission.remark = remark.filter(|r| !r.trim().is_empty());
        submission.grading = GradingState::Graded;

        if !self.store.update(&submission)? {
            return Err(SubmissionError::NotFound(id));
        }
        info!("Graded submission {}: {}/{}", id, marks, max);
        Ok(submission)
    }

    /// Submissions for an assignment, newest first.
    pub fn submissions_for_assignment(
        &self,
        id: AssignmentId,
    ) -> Result<Vec<Submission>, SubmissionError> {
        Ok(self.store.list_for_assignment(id)?)
    }

    /// Submissions by a student, newest first.
    pub fn submissions_for_student(&self, id: StudentId) -> Result<Vec<Submission>, SubmissionError> {
        Ok(self.store.list_for_student(id)?)
    }

    /// Zip every available canonical PDF for `assignment`.
    pub async fn archive(
        &self,
        assignment: AssignmentId,
        progress: Option<ArchiveProgress>,
    ) -> Result<ArchiveReport, ArchiveError> {
        archive_assignment(self.config(), self.store.as_ref(), assignment, progress).await
    }

    /// Stream the upload into a new file whose name no earlier attempt used.
    async fn store_original(
        &self,
        upload: &mut Upload,
        student: &Student,
        sanitized: &str,
    ) -> Result<PathBuf, SubmissionError> {
        let dir = &self.config().upload_dir;
        let base = naming::stored_upload_name(student, Utc::now(), sanitized);

        let mut attempt = 1;
        let (path, mut file) = loop {
            let name = if attempt == 1 {
                base.clone()
            } else {
                naming::with_attempt(&base, attempt)
            };
            let path = dir.join(name);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => break (path, file),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists
                    && attempt < MAX_NAME_ATTEMPTS =>
                {
                    attempt += 1;
                }
                Err(source) => return Err(SubmissionError::Storage { path, source }),
            }
        };

        let storage_err = |source| SubmissionError::Storage {
            path: path.clone(),
            source,
        };
        tokio::io::copy(&mut upload.body, &mut file)
            .await
            .map_err(storage_err)?;
        file.flush().await.map_err(storage_err)?;
        file.sync_all().await.map_err(storage_err)?;
        Ok(path)
    }
}

async fn ensure_dir(dir: &Path) -> Result<(), SubmissionError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| SubmissionError::Storage {
            path: dir.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::NoOfficeCapabilities;
    use crate::submission::model::Timeliness;
    use crate::submission::store::MemoryStore;

    fn coordinator(root: &Path) -> (SubmissionCoordinator, Arc<MemoryStore>) {
        let config = PortalConfig::builder()
            .upload_dir(root.join("uploads"))
            .pdf_dir(root.join("uploads/pdf"))
            .build()
            .unwrap();
        let store = Arc::new(MemoryStore::new());
        let converter = Converter::new(config, Arc::new(NoOfficeCapabilities));
        (SubmissionCoordinator::new(converter, store.clone()), store)
    }

    fn ada() -> Student {
        Student::new(StudentId(4), "Ada Lovelace").with_registration("R7")
    }

    #[tokio::test]
    async fn text_submission_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let (coord, store) = coordinator(dir.path());
        let a = Assignment::new(AssignmentId(1), "Lab 1");

        let sub = coord
            .submit(&a, &ada(), Upload::from_bytes("answers.txt", "42\n"))
            .await
            .unwrap();
        assert_eq!(sub.canonical_pdf_name, "Ada_Lovelace_R7_Lab_1.pdf");
        assert_eq!(sub.original_filename, "answers.txt");
        assert_eq!(sub.timeliness, Timeliness::OnTime);
        assert!(sub.stored_upload_name.starts_with("4_"));
        assert!(coord.pdf_path(&sub).exists());
        assert!(coord.upload_path(&sub).exists());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn missing_filename_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (coord, _) = coordinator(dir.path());
        let a = Assignment::new(AssignmentId(1), "Lab");
        let err = coord
            .submit(&a, &ada(), Upload::from_bytes("  ", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::MissingFile));
    }

    #[tokio::test]
    async fn not_yet_open_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (coord, store) = coordinator(dir.path());
        let a = Assignment::new(AssignmentId(1), "Later")
            .with_window(Some(Utc::now() + chrono::Duration::days(1)), None);

        let err = coord
            .submit(&a, &ada(), Upload::from_bytes("a.txt", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::NotYetOpen { .. }));
        assert!(!dir.path().join("uploads").exists());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn grading_validates_and_keeps_timeliness() {
        let dir = tempfile::tempdir().unwrap();
        let (coord, _) = coordinator(dir.path());
        let a = Assignment::new(AssignmentId(1), "Essay")
            .with_window(None, Some(Utc::now() - chrono::Duration::hours(1)));
        let sub = coord
            .submit(&a, &ada(), Upload::from_bytes("e.txt", "words"))
            .await
            .unwrap();
        assert_eq!(sub.grading, GradingState::Late);

        let err = coord.grade(sub.id, 101, None).unwrap_err();
        assert!(matches!(err, SubmissionError::InvalidMarks { marks: 101, max: 100 }));

        let graded = coord.grade(sub.id, 88, Some("Good".into())).unwrap();
        assert_eq!(graded.grading, GradingState::Graded);
        assert_eq!(graded.marks, Some(88));
        assert_eq!(graded.timeliness, Timeliness::Late);

        assert!(matches!(
            coord.grade(SubmissionId(999), 1, None),
            Err(SubmissionError::NotFound(_))
        ));
    }
}
