//! Office inputs: delegated to a headless LibreOffice process.
//!
//! `soffice --headless --convert-to pdf --outdir <scratch> <source>` writes
//! `<scratch>/<stem>.pdf`, which is then renamed onto the destination. The
//! scratch directory sits next to the destination so the rename never
//! crosses filesystems, and it also holds a throwaway user profile: two
//! concurrent `soffice` processes sharing the default profile block each
//! other.
//!
//! The child is killed when the time budget runs out (`kill_on_drop`).

use crate::capability::OfficeTool;
use crate::error::{ConversionError, ConversionPhase};
use crate::pipeline::parent_dir;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Longest stderr excerpt carried into an error message.
const STDERR_TAIL: usize = 600;

/// Run `tool` to convert `source` into a PDF at `dest`.
pub async fn delegate(
    tool: &OfficeTool,
    source: &Path,
    dest: &Path,
    timeout: Duration,
) -> Result<(), ConversionError> {
    let tool_name = tool.display_name();
    let parent = parent_dir(dest);

    let scratch = tempfile::Builder::new()
        .prefix(".cwpdf-office-")
        .tempdir_in(parent)
        .map_err(|e| ConversionError::io(ConversionPhase::OfficeDelegate, parent, e))?;
    let out_dir = scratch.path().join("out");
    let profile_dir = absolute(&scratch.path().join("profile"))?;
    std::fs::create_dir_all(&out_dir)
        .map_err(|e| ConversionError::io(ConversionPhase::OfficeDelegate, &out_dir, e))?;

    let mut cmd = Command::new(&tool.program);
    cmd.args(&tool.args_prefix)
        .arg("--headless")
        .arg("--convert-to")
        .arg("pdf")
        .arg("--outdir")
        .arg(&out_dir)
        .arg(format!("-env:UserInstallation={}", file_url(&profile_dir)))
        .arg(source)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Running {} on {}", tool_name, source.display());

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Err(_) => {
            warn!(
                "{} exceeded {}s on {}; killed",
                tool_name,
                timeout.as_secs(),
                source.display()
            );
            return Err(ConversionError::ExternalTimeout {
                tool: tool_name,
                secs: timeout.as_secs(),
            });
        }
        Ok(Err(e)) => {
            return Err(ConversionError::ExternalConversionFailure {
                tool: tool_name,
                detail: format!("failed to start: {e}"),
            })
        }
        Ok(Ok(output)) => output,
    };

    if !output.status.success() {
        return Err(ConversionError::ExternalConversionFailure {
            tool: tool_name,
            detail: format!("{}: {}", output.status, stderr_tail(&output.stderr)),
        });
    }

    let produced = expected_output(&out_dir, source);
    if !produced.is_file() {
        return Err(ConversionError::ExternalConversionFailure {
            tool: tool_name,
            detail: format!(
                "no output at '{}'{}",
                produced.display(),
                match stderr_tail(&output.stderr) {
                    s if s.is_empty() => String::new(),
                    s => format!(": {s}"),
                }
            ),
        });
    }

    tokio::fs::rename(&produced, dest)
        .await
        .map_err(|e| ConversionError::io(ConversionPhase::Finalize, dest, e))?;
    Ok(())
}

/// `<out_dir>/<source stem>.pdf`, where the converter writes its result.
fn expected_output(out_dir: &Path, source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "output".into());
    let mut name = stem;
    name.push(".pdf");
    out_dir.join(name)
}

fn absolute(path: &Path) -> Result<PathBuf, ConversionError> {
    std::path::absolute(path)
        .map_err(|e| ConversionError::io(ConversionPhase::OfficeDelegate, path, e))
}

/// `file://` URL for an absolute local path, as `-env:UserInstallation` expects.
fn file_url(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    if s.starts_with('/') {
        format!("file://{s}")
    } else {
        format!("file:///{s}")
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    match text.char_indices().rev().nth(STDERR_TAIL) {
        Some((idx, _)) => format!("…{}", &text[idx..]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_uses_stem() {
        assert_eq!(
            expected_output(Path::new("/tmp/x"), Path::new("/up/7_2024_Essay.final.docx")),
            PathBuf::from("/tmp/x/7_2024_Essay.final.pdf")
        );
    }

    #[cfg(unix)]
    #[test]
    fn unix_file_url() {
        assert_eq!(file_url(Path::new("/a/b")), "file:///a/b");
    }

    #[test]
    fn stderr_is_trimmed_to_tail() {
        let long = "x".repeat(STDERR_TAIL * 2);
        let tail = stderr_tail(long.as_bytes());
        assert!(tail.starts_with('…'));
        assert!(tail.chars().count() <= STDERR_TAIL + 2);
        assert_eq!(stderr_tail(b"  short \n"), "short");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_output_is_external_failure() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.docx");
        std::fs::write(&src, b"PK\x03\x04").unwrap();
        let tool = OfficeTool::new("/bin/sh").with_args(["-c", "exit 0", "fake-soffice"]);

        let err = delegate(&tool, &src, &dir.path().join("a.pdf"), Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::ExternalConversionFailure { .. }), "got {err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_tool_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("slow.pptx");
        std::fs::write(&src, b"PK\x03\x04").unwrap();
        let tool = OfficeTool::new("/bin/sh").with_args(["-c", "sleep 30", "fake-soffice"]);

        let err = delegate(&tool, &src, &dir.path().join("slow.pdf"), Duration::from_millis(300))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::ExternalTimeout { .. }), "got {err:?}");
        assert!(!dir.path().join("slow.pdf").exists());
    }
}
