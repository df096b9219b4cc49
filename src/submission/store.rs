//! Persistence of submission records.
//!
//! The coordinator needs only create/read/update keyed by assignment and
//! student, ordered by submission time; [`SubmissionStore`] is that contract.
//! [`MemoryStore`] backs tests and embedding applications that keep their own
//! database; [`JsonFileStore`] is the single-file store used by the CLI,
//! which also keeps assignments and students.

use crate::error::StoreError;
use crate::submission::model::{
    Assignment, AssignmentId, NewSubmission, Student, StudentId, Submission, SubmissionId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use tracing::debug;

/// Storage for [`Submission`] records.
///
/// Listings are ordered newest first (ties broken by descending id).
pub trait SubmissionStore: Send + Sync {
    /// Assign an id and persist a new record.
    fn insert(&self, new: NewSubmission) -> Result<Submission, StoreError>;

    fn get(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError>;

    /// Replace an existing record. Returns `false` if `submission.id` is unknown.
    fn update(&self, submission: &Submission) -> Result<bool, StoreError>;

    fn list_for_assignment(&self, id: AssignmentId) -> Result<Vec<Submission>, StoreError>;

    fn list_for_student(&self, id: StudentId) -> Result<Vec<Submission>, StoreError>;
}

fn newest_first(mut subs: Vec<Submission>) -> Vec<Submission> {
    subs.sort_by(|a, b| {
        b.submitted_at
            .cmp(&a.submitted_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    subs
}

// ── In-memory ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryState {
    last_id: u64,
    submissions: BTreeMap<SubmissionId, Submission>,
}

/// A process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.submissions.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SubmissionStore for MemoryStore {
    fn insert(&self, new: NewSubmission) -> Result<Submission, StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        state.last_id += 1;
        let sub = new.into_submission(SubmissionId(state.last_id));
        state.submissions.insert(sub.id, sub.clone());
        Ok(sub)
    }

    fn get(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(state.submissions.get(&id).cloned())
    }

    fn update(&self, submission: &Submission) -> Result<bool, StoreError> {
        let mut state = self.state.write().map_err(|_| StoreError::Poisoned)?;
        match state.submissions.get_mut(&submission.id) {
            Some(slot) => {
                *slot = submission.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list_for_assignment(&self, id: AssignmentId) -> Result<Vec<Submission>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(newest_first(
            state
                .submissions
                .values()
                .filter(|s| s.assignment_id == id)
                .cloned()
                .collect(),
        ))
    }

    fn list_for_student(&self, id: StudentId) -> Result<Vec<Submission>, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::Poisoned)?;
        Ok(newest_first(
            state
                .submissions
                .values()
                .filter(|s| s.student_id == id)
                .cloned()
                .collect(),
        ))
    }
}

// ── JSON file ────────────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    last_submission_id: u64,
    #[serde(default)]
    assignments: Vec<Assignment>,
    #[serde(default)]
    students: Vec<Student>,
    #[serde(default)]
    submissions: Vec<Submission>,
}

/// Everything in one pretty-printed JSON document, rewritten atomically
/// (temp file + rename) after every change.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl JsonFileStore {
    /// Open `path`, starting empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = match std::fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => StoreData::default(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
                path: path.clone(),
                detail: e.to_string(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(source) => return Err(StoreError::Read { path, source }),
        };
        debug!(
            "Opened store {} ({} submissions)",
            path.display(),
            data.submissions.len()
        );
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an assignment with the next free id.
    pub fn add_assignment(
        &self,
        title: impl Into<String>,
        subject: Option<String>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Assignment, StoreError> {
        self.mutate(|data| {
            let next = data.assignments.iter().map(|a| a.id.0).max().unwrap_or(0) + 1;
            let mut a = Assignment::new(AssignmentId(next), title).with_window(start, end);
            a.subject = subject;
            data.assignments.push(a.clone());
            a
        })
    }

    pub fn assignment(&self, id: AssignmentId) -> Result<Option<Assignment>, StoreError> {
        self.read(|data| data.assignments.iter().find(|a| a.id == id).cloned())
    }

    pub fn assignments(&self) -> Result<Vec<Assignment>, StoreError> {
        self.read(|data| data.assignments.clone())
    }

    /// Create a student with the next free id.
    pub fn add_student(
        &self,
        name: impl Into<String>,
        registration_number: Option<String>,
    ) -> Result<Student, StoreError> {
        self.mutate(|data| {
            let next = data.students.iter().map(|s| s.id.0).max().unwrap_or(0) + 1;
            let mut s = Student::new(StudentId(next), name);
            s.registration_number = registration_number;
            data.students.push(s.clone());
            s
        })
    }

    pub fn student(&self, id: StudentId) -> Result<Option<Student>, StoreError> {
        self.read(|data| data.students.iter().find(|s| s.id == id).cloned())
    }

    fn read<T>(&self, f: impl FnOnce(&StoreData) -> T) -> Result<T, StoreError> {
        let data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&data))
    }

    /// Apply `f` and persist. On a failed write the in-memory state is rolled back.
    fn mutate<T>(&self, f: impl FnOnce(&mut StoreData) -> T) -> Result<T, StoreError> {
        let mut data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        let before = serde_json::to_vec(&*data).map_err(|e| StoreError::Corrupt {
            path: self.path.clone(),
            detail: e.to_string(),
        })?;
        let out = f(&mut data);
        if let Err(e) = self.save(&data) {
            if let Ok(restored) = serde_json::from_slice(&before) {
                *data = restored;
            }
            return Err(e);
        }
        Ok(out)
    }

    fn save(&self, data: &StoreData) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        let parent = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
        serde_json::to_writer_pretty(&mut tmp, data).map_err(|e| write_err(e.into()))?;
        tmp.write_all(b"\n").map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

impl SubmissionStore for JsonFileStore {
    fn insert(&self, new: NewSubmission) -> Result<Submission, StoreError> {
        self.mutate(|data| {
            data.last_submission_id += 1;
            let sub = new.into_submission(SubmissionId(data.last_submission_id));
            data.submissions.push(sub.clone());
            sub
        })
    }

    fn get(&self, id: SubmissionId) -> Result<Option<Submission>, StoreError> {
        self.read(|data| data.submissions.iter().find(|s| s.id == id).cloned())
    }

    fn update(&self, submission: &Submission) -> Result<bool, StoreError> {
        if self.get(submission.id)?.is_none() {
            return Ok(false);
        }
        self.mutate(|data| {
            if let Some(slot) = data.submissions.iter_mut().find(|s| s.id == submission.id) {
                *slot = submission.clone();
            }
            true
        })
    }

    fn list_for_assignment(&self, id: AssignmentId) -> Result<Vec<Submission>, StoreError> {
        self.read(|data| {
            newest_first(
                data.submissions
                    .iter()
                    .filter(|s| s.assignment_id == id)
                    .cloned()
                    .collect(),
            )
        })
    }

    fn list_for_student(&self, id: StudentId) -> Result<Vec<Submission>, StoreError> {
        self.read(|data| {
            newest_first(
                data.submissions
                    .iter()
                    .filter(|s| s.student_id == id)
                    .cloned()
                    .collect(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::model::{GradingState, Timeliness};
    use chrono::Duration;

    fn new_sub(assignment: u64, student: u64, at: DateTime<Utc>) -> NewSubmission {
        NewSubmission {
            assignment_id: AssignmentId(assignment),
            student_id: StudentId(student),
            original_filename: "a.txt".into(),
            stored_upload_name: format!("{student}_x_a.txt"),
            canonical_pdf_name: format!("s{student}_a{assignment}.pdf"),
            submitted_at: at,
            timeliness: Timeliness::OnTime,
        }
    }

    fn exercise(store: &dyn SubmissionStore) {
        let t0 = Utc::now();
        let a = store.insert(new_sub(1, 1, t0)).unwrap();
        let b = store.insert(new_sub(1, 2, t0 + Duration::seconds(5))).unwrap();
        store.insert(new_sub(2, 1, t0 + Duration::seconds(1))).unwrap();
        assert_ne!(a.id, b.id);

        let for_a1: Vec<_> = store
            .list_for_assignment(AssignmentId(1))
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(for_a1, vec![b.id, a.id]);

        let for_s1 = store.list_for_student(StudentId(1)).unwrap();
        assert_eq!(for_s1.len(), 2);
        assert!(for_s1[0].submitted_at > for_s1[1].submitted_at);

        let mut graded = a.clone();
        graded.grading = GradingState::Graded;
        graded.marks = Some(70);
        assert!(store.update(&graded).unwrap());
        assert_eq!(store.get(a.id).unwrap().unwrap().marks, Some(70));

        let mut ghost = a;
        ghost.id = SubmissionId(999);
        assert!(!store.update(&ghost).unwrap());
    }

    #[test]
    fn memory_store_contract() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn json_store_contract_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portal.json");
        {
            let store = JsonFileStore::open(&path).unwrap();
            exercise(&store);
            store.add_student("Ada", Some("R1".into())).unwrap();
            store
                .add_assignment("Essay", None, None, None)
                .unwrap();
        }
        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.list_for_student(StudentId(1)).unwrap().len(), 2);
        assert_eq!(reopened.student(StudentId(1)).unwrap().unwrap().name, "Ada");
        assert_eq!(reopened.assignments().unwrap().len(), 1);

        // Ids keep counting after reload.
        let next = reopened.insert(new_sub(1, 3, Utc::now())).unwrap();
        assert_eq!(next.id, SubmissionId(4));
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(
            JsonFileStore::open(&path),
            Err(StoreError::Corrupt { .. })
        ));
    }
}
