//! Conversion strategies, one submodule per input family.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌─▶ passthrough  (pdf)                 byte copy
//! source ──▶ ├─▶ raster       (png/jpg/bmp/gif)     frame → page, alpha on white
//!            ├─▶ text         (txt/csv)             64 Courier lines per page
//!            └─▶ office       (doc/docx/ppt/…)      headless soffice, timeout
//! ```
//!
//! Every strategy writes its PDF through [`write_atomically`] (or, for the
//! office delegate, a private scratch directory plus rename) so a failure
//! never leaves a partial file at the destination.
//!
//! [`passthrough`], [`raster`] and [`text`] are blocking and are run inside
//! `spawn_blocking` by [`crate::Converter`]; [`office`] is async because it
//! awaits a child process.

pub mod office;
pub mod passthrough;
pub mod raster;
pub mod text;

use crate::error::{ConversionError, ConversionPhase};
use std::io::Write;
use std::path::Path;

/// Write `bytes` to `dest` via a temporary file in the same directory, then rename.
pub(crate) fn write_atomically(dest: &Path, bytes: &[u8]) -> Result<(), ConversionError> {
    let parent = parent_dir(dest);
    let mut tmp = tempfile::Builder::new()
        .prefix(".cwpdf-")
        .suffix(".part")
        .tempfile_in(parent)
        .map_err(|e| ConversionError::io(ConversionPhase::Finalize, parent, e))?;

    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| ConversionError::io(ConversionPhase::Finalize, tmp.path(), e))?;

    tmp.persist(dest)
        .map_err(|e| ConversionError::io(ConversionPhase::Finalize, dest, e.error))?;
    Ok(())
}

/// Directory a destination lives in; `.` for bare file names.
pub(crate) fn parent_dir(dest: &Path) -> &Path {
    match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_write_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("out.pdf");
        std::fs::write(&dest, b"old").unwrap();
        write_atomically(&dest, b"new").unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"new");
        // No scratch files left behind.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn bare_name_parent_is_cwd() {
        assert_eq!(parent_dir(Path::new("a.pdf")), Path::new("."));
        assert_eq!(parent_dir(Path::new("x/a.pdf")), Path::new("x"));
    }
}
