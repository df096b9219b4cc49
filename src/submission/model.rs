//! Submission, assignment and student entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Identifies an [`Assignment`].
    AssignmentId
);
id_type!(
    /// Identifies a [`Student`].
    StudentId
);
id_type!(
    /// Identifies a [`Submission`]; assigned by the store on insert.
    SubmissionId
);

/// A piece of coursework students submit files against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub title: String,
    #[serde(default)]
    pub subject: Option<String>,
    /// Submissions are refused before this instant. `None`: always open.
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    /// Submissions after this instant are late. `None`: never late.
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

impl Assignment {
    pub fn new(id: AssignmentId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            subject: None,
            start: None,
            end: None,
        }
    }

    pub fn with_window(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    /// `false` only while the start boundary is still ahead of `now`.
    pub fn has_opened(&self, now: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| now >= s)
    }

    /// Late iff an end boundary is set and `now` is strictly after it.
    pub fn timeliness_at(&self, now: DateTime<Utc>) -> Timeliness {
        match self.end {
            Some(end) if now > end => Timeliness::Late,
            _ => Timeliness::OnTime,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub name: String,
    /// Institutional registration number. Falls back to the id in file names.
    #[serde(default)]
    pub registration_number: Option<String>,
}

impl Student {
    pub fn new(id: StudentId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            registration_number: None,
        }
    }

    pub fn with_registration(mut self, reg: impl Into<String>) -> Self {
        self.registration_number = Some(reg.into());
        self
    }
}

/// Fixed once at creation; never re-evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Timeliness {
    OnTime,
    Late,
}

impl fmt::Display for Timeliness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timeliness::OnTime => f.write_str("on-time"),
            Timeliness::Late => f.write_str("late"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradingState {
    Submitted,
    Late,
    Graded,
}

impl From<Timeliness> for GradingState {
    fn from(t: Timeliness) -> Self {
        match t {
            Timeliness::OnTime => GradingState::Submitted,
            Timeliness::Late => GradingState::Late,
        }
    }
}

impl fmt::Display for GradingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GradingState::Submitted => f.write_str("submitted"),
            GradingState::Late => f.write_str("late"),
            GradingState::Graded => f.write_str("graded"),
        }
    }
}

/// A successful submission: one canonical PDF on disk plus its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub assignment_id: AssignmentId,
    pub student_id: StudentId,
    /// Sanitised client filename, for display.
    pub original_filename: String,
    /// File name of the retained original inside the upload directory.
    pub stored_upload_name: String,
    /// File name of the canonical PDF inside the PDF directory.
    pub canonical_pdf_name: String,
    pub submitted_at: DateTime<Utc>,
    pub timeliness: Timeliness,
    pub grading: GradingState,
    pub marks: Option<u32>,
    pub remark: Option<String>,
}

/// Everything needed to create a [`Submission`] except its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubmission {
    pub assignment_id: AssignmentId,
    pub student_id: StudentId,
    pub original_filename: String,
    pub stored_upload_name: String,
    pub canonical_pdf_name: String,
    pub submitted_at: DateTime<Utc>,
    pub timeliness: Timeliness,
}

impl NewSubmission {
    pub fn into_submission(self, id: SubmissionId) -> Submission {
        Submission {
            id,
            assignment_id: self.assignment_id,
            student_id: self.student_id,
            original_filename: self.original_filename,
            stored_upload_name: self.stored_upload_name,
            canonical_pdf_name: self.canonical_pdf_name,
            submitted_at: self.submitted_at,
            timeliness: self.timeliness,
            grading: self.timeliness.into(),
            marks: None,
            remark: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn timeliness_boundaries() {
        let now = Utc::now();
        let a = Assignment::new(AssignmentId(1), "Essay");
        assert_eq!(a.timeliness_at(now), Timeliness::OnTime);

        let past = a.clone().with_window(None, Some(now - Duration::hours(1)));
        assert_eq!(past.timeliness_at(now), Timeliness::Late);

        let exact = a.clone().with_window(None, Some(now));
        assert_eq!(exact.timeliness_at(now), Timeliness::OnTime);

        let future = a.with_window(None, Some(now + Duration::hours(1)));
        assert_eq!(future.timeliness_at(now), Timeliness::OnTime);
    }

    #[test]
    fn window_opening() {
        let now = Utc::now();
        let a = Assignment::new(AssignmentId(1), "Lab")
            .with_window(Some(now + Duration::minutes(5)), None);
        assert!(!a.has_opened(now));
        assert!(a.has_opened(now + Duration::minutes(5)));
    }

    #[test]
    fn new_record_starts_ungraded() {
        let s = NewSubmission {
            assignment_id: AssignmentId(1),
            student_id: StudentId(2),
            original_filename: "a.txt".into(),
            stored_upload_name: "2_x_a.txt".into(),
            canonical_pdf_name: "Ada_R1_Lab.pdf".into(),
            submitted_at: Utc::now(),
            timeliness: Timeliness::Late,
        }
        .into_submission(SubmissionId(9));
        assert_eq!(s.grading, GradingState::Late);
        assert!(s.marks.is_none());
    }

    #[test]
    fn states_serialise_as_words() {
        assert_eq!(serde_json::to_string(&Timeliness::OnTime).unwrap(), "\"on-time\"");
        assert_eq!(serde_json::to_string(&GradingState::Graded).unwrap(), "\"graded\"");
    }
}
