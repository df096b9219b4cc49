//! Submission records: entities, naming rules and persistence.

pub mod model;
pub mod naming;
pub mod store;

pub use model::{
    Assignment, AssignmentId, GradingState, NewSubmission, Student, StudentId, Submission,
    SubmissionId, Timeliness,
};
pub use store::{JsonFileStore, MemoryStore, SubmissionStore};
