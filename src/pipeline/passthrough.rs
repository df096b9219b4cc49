//! `pdf` inputs: the upload already is the canonical artifact.

use crate::error::{ConversionError, ConversionPhase};
use crate::pipeline::parent_dir;
use std::path::Path;
use tracing::debug;

/// Byte-copy `source` to `dest` through a scratch file in `dest`'s directory.
///
/// Converting the same source twice yields identical bytes both times.
pub fn copy_pdf(source: &Path, dest: &Path) -> Result<u64, ConversionError> {
    let mut input = std::fs::File::open(source)
        .map_err(|e| ConversionError::io(ConversionPhase::Passthrough, source, e))?;

    let parent = parent_dir(dest);
    let mut tmp = tempfile::Builder::new()
        .prefix(".cwpdf-")
        .suffix(".part")
        .tempfile_in(parent)
        .map_err(|e| ConversionError::io(ConversionPhase::Finalize, parent, e))?;

    let copied = std::io::copy(&mut input, tmp.as_file_mut())
        .map_err(|e| ConversionError::io(ConversionPhase::Passthrough, source, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| ConversionError::io(ConversionPhase::Finalize, tmp.path(), e))?;
    tmp.persist(dest)
        .map_err(|e| ConversionError::io(ConversionPhase::Finalize, dest, e.error))?;

    debug!("Copied {} bytes to {}", copied, dest.display());
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.pdf");
        let body = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\nbinary tail\x00\x01";
        std::fs::write(&src, body).unwrap();

        let dest = dir.path().join("out.pdf");
        assert_eq!(copy_pdf(&src, &dest).unwrap(), body.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[test]
    fn missing_source_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = copy_pdf(&dir.path().join("gone.pdf"), &dir.path().join("o.pdf")).unwrap_err();
        assert_eq!(err.phase(), ConversionPhase::Passthrough);
        assert!(!dir.path().join("o.pdf").exists());
    }
}
