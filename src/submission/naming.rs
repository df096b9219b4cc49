//! File naming rules.
//!
//! Two names are derived per submission:
//!
//! * the **stored upload name**, `{student}_{timestamp}_{sanitised client name}`,
//!   unique per attempt so originals are never overwritten;
//! * the **canonical PDF name**, `{name}_{registration}_{title}.pdf`, which
//!   is deterministic: a resubmission by the same student to the same
//!   assignment maps to the same file and replaces it.

use crate::submission::model::{Assignment, Student};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

/// Characters allowed in a sanitised upload name; everything else is dropped.
static RE_UNSAFE_UPLOAD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_.-]").unwrap());

/// Canonical components keep any letter or digit, so accented names survive.
static RE_UNSAFE_COMPONENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\p{L}\p{N}_.-]").unwrap());

/// Device names Windows refuses as file stems.
const RESERVED_STEMS: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "LPT1", "LPT2", "LPT3",
];

const FALLBACK_STEM: &str = "upload";

/// Split a client-declared name into its last path component's stem and
/// lower-cased extension. Both `/` and `\` count as separators.
pub fn split_declared(declared: &str) -> (&str, String) {
    let last = declared
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(declared)
        .trim();
    match last.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => (stem, ext.to_ascii_lowercase()),
        _ => (last, String::new()),
    }
}

/// Reduce a client-declared filename to something safe to join onto a directory.
///
/// Path components are discarded, whitespace runs become `_`, and anything
/// outside `[A-Za-z0-9_.-]` is dropped. The extension is kept separately so a
/// name made entirely of unsafe characters still ends in it (`报告.pdf` →
/// `upload.pdf`).
pub fn sanitize_filename(declared: &str) -> String {
    let (stem, ext) = split_declared(declared);

    let stem = stem.split_whitespace().collect::<Vec<_>>().join("_");
    let stem = RE_UNSAFE_UPLOAD.replace_all(&stem, "");
    let mut stem = stem.trim_matches(|c| c == '.' || c == '_').to_string();
    if stem.is_empty() {
        stem = FALLBACK_STEM.to_string();
    }
    if RESERVED_STEMS.contains(&stem.to_ascii_uppercase().as_str()) {
        stem = format!("_{stem}");
    }

    let ext = RE_UNSAFE_UPLOAD.replace_all(&ext, "");
    if ext.is_empty() {
        stem
    } else {
        format!("{stem}.{ext}")
    }
}

/// `{student id}_{UTC timestamp to the microsecond}_{sanitised name}`.
pub fn stored_upload_name(student: &Student, now: DateTime<Utc>, sanitized: &str) -> String {
    format!(
        "{}_{}_{}",
        student.id,
        now.format("%Y%m%dT%H%M%S%6f"),
        sanitized
    )
}

/// Insert `-{attempt}` before the extension: `a_b.pdf` → `a_b-2.pdf`.
pub fn with_attempt(name: &str, attempt: u32) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{attempt}.{ext}"),
        _ => format!("{name}-{attempt}"),
    }
}

/// The deterministic canonical PDF name for a student's work on an assignment.
///
/// Missing parts fall back to `student`, the student id, and `assignment`.
pub fn canonical_pdf_name(student: &Student, assignment: &Assignment) -> String {
    let name = component(&student.name).unwrap_or_else(|| "student".into());
    let reg = student
        .registration_number
        .as_deref()
        .and_then(component)
        .unwrap_or_else(|| student.id.to_string());
    let title = component(&assignment.title).unwrap_or_else(|| "assignment".into());
    format!("{name}_{reg}_{title}.pdf")
}

fn component(raw: &str) -> Option<String> {
    let joined = raw.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = RE_UNSAFE_COMPONENT.replace_all(&joined, "");
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '_');
    (!cleaned.is_empty()).then(|| cleaned.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::submission::model::{AssignmentId, StudentId};
    use chrono::TimeZone;

    #[test]
    fn strips_traversal_and_spaces() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename(r"C:\Users\me\My Essay.DOCX"), "My_Essay.docx");
        assert_eq!(sanitize_filename("  final  draft (2).pdf "), "final_draft_2.pdf");
    }

    #[test]
    fn falls_back_when_nothing_safe_remains() {
        assert_eq!(sanitize_filename("报告.pdf"), "upload.pdf");
        assert_eq!(sanitize_filename("..."), "upload");
        assert_eq!(sanitize_filename("con.txt"), "_con.txt");
    }

    #[test]
    fn split_keeps_last_dot() {
        assert_eq!(split_declared("a.tar.GZ"), ("a.tar", "gz".to_string()));
        assert_eq!(split_declared("dir/noext"), ("noext", String::new()));
        assert_eq!(split_declared("trailing."), ("trailing.", String::new()));
    }

    #[test]
    fn canonical_name_is_deterministic() {
        let s = Student::new(StudentId(7), "Ada  Lovelace").with_registration("REG 42");
        let a = Assignment::new(AssignmentId(3), "Lab Report 1");
        assert_eq!(canonical_pdf_name(&s, &a), "Ada_Lovelace_REG_42_Lab_Report_1.pdf");
        assert_eq!(canonical_pdf_name(&s, &a), canonical_pdf_name(&s, &a));
    }

    #[test]
    fn canonical_name_defaults() {
        let s = Student::new(StudentId(7), "   ");
        let a = Assignment::new(AssignmentId(3), "../");
        assert_eq!(canonical_pdf_name(&s, &a), "student_7_assignment.pdf");
    }

    #[test]
    fn canonical_name_keeps_accents_drops_slashes() {
        let s = Student::new(StudentId(1), "José").with_registration("A/B");
        let a = Assignment::new(AssignmentId(1), "Essay");
        assert_eq!(canonical_pdf_name(&s, &a), "José_AB_Essay.pdf");
    }

    #[test]
    fn upload_name_embeds_student_and_micros() {
        let s = Student::new(StudentId(12), "x");
        let t = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 6).unwrap()
            + chrono::Duration::microseconds(123);
        assert_eq!(
            stored_upload_name(&s, t, "notes.txt"),
            "12_20240309T140506000123_notes.txt"
        );
        assert_eq!(with_attempt("12_x_notes.txt", 2), "12_x_notes-2.txt");
    }
}
