//! # office-probe
//!
//! Locate an installed [LibreOffice](https://www.libreoffice.org/) converter
//! binary (`soffice`) so that callers can run headless
//! `--convert-to pdf` exports of Word, PowerPoint and Excel documents.
//!
//! An office suite is an optional dependency of any deployment: many servers
//! simply do not have one. This crate therefore never fails loudly on a
//! missing install; it reports [`OfficeProbeError::NotFound`] together with
//! every location it searched, and the caller decides how to surface that.
//!
//! ## Search order
//!
//! On the first call to [`locate_office_converter`]:
//!
//! 1. `OFFICE_CONVERTER_PATH` — explicit path to the converter binary.
//! 2. Every directory on `PATH`, looking for `soffice` / `libreoffice`.
//! 3. Well-known per-platform install directories (see the table below).
//! 4. The per-user executable directory (`~/.local/bin` on Linux).
//!
//! A successful lookup is cached for the rest of the process lifetime.
//!
//! ## Platform support
//!
//! | OS      | Binaries                       | Install directories |
//! |---------|--------------------------------|---------------------|
//! | Linux   | `soffice`, `libreoffice`       | `/usr/bin`, `/usr/lib/libreoffice/program`, `/opt/libreoffice*/program`, `/snap/bin` |
//! | macOS   | `soffice`                      | `/Applications/LibreOffice.app/Contents/MacOS` |
//! | Windows | `soffice.exe`, `soffice.com`   | `C:\Program Files\LibreOffice\program` (and the x86 variant) |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use office_probe::{is_office_installed, locate_office_converter};
//!
//! if is_office_installed() {
//!     let soffice = locate_office_converter().expect("checked above");
//!     println!("converter at {}", soffice.display());
//! }
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use thiserror::Error;

// ── Public constants ─────────────────────────────────────────────────────────

/// Environment variable holding an explicit converter path.
pub const OFFICE_CONVERTER_ENV: &str = "OFFICE_CONVERTER_PATH";

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by office-probe operations.
#[derive(Error, Debug)]
pub enum OfficeProbeError {
    /// The current OS has no known LibreOffice layout.
    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    /// `OFFICE_CONVERTER_PATH` is set but does not name an executable file.
    #[error("OFFICE_CONVERTER_PATH points to '{path}', which is not an executable file")]
    EnvPathInvalid { path: PathBuf },

    /// No converter binary was found anywhere.
    #[error(
        "No office converter found (searched {} locations). Install LibreOffice or set OFFICE_CONVERTER_PATH.",
        .searched.len()
    )]
    NotFound { searched: Vec<PathBuf> },
}

// ── Internal: platform metadata ──────────────────────────────────────────────

struct PlatformInfo {
    /// Binary file names to look for, most specific first.
    binary_names: &'static [&'static str],
    /// Fixed install directories.
    install_dirs: &'static [&'static str],
    /// Parent directory scanned for versioned installs, e.g. `/opt/libreoffice7.6`.
    versioned_root: Option<(&'static str, &'static str)>,
}

fn detect_platform() -> Result<PlatformInfo, OfficeProbeError> {
    let os = std::env::consts::OS;

    match os {
        "linux" | "freebsd" | "openbsd" | "netbsd" => Ok(PlatformInfo {
            binary_names: &["soffice", "libreoffice"],
            install_dirs: &[
                "/usr/bin",
                "/usr/local/bin",
                "/usr/lib/libreoffice/program",
                "/opt/libreoffice/program",
                "/snap/bin",
            ],
            versioned_root: Some(("/opt", "libreoffice")),
        }),
        "macos" => Ok(PlatformInfo {
            binary_names: &["soffice"],
            install_dirs: &[
                "/Applications/LibreOffice.app/Contents/MacOS",
                "/opt/homebrew/bin",
                "/usr/local/bin",
            ],
            versioned_root: None,
        }),
        "windows" => Ok(PlatformInfo {
            binary_names: &["soffice.exe", "soffice.com"],
            install_dirs: &[
                r"C:\Program Files\LibreOffice\program",
                r"C:\Program Files (x86)\LibreOffice\program",
            ],
            versioned_root: None,
        }),
        os => Err(OfficeProbeError::UnsupportedPlatform {
            os: os.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }),
    }
}

// ── Thread-safe singleton path cache ─────────────────────────────────────────

static RESOLVED_PATH: OnceLock<PathBuf> = OnceLock::new();

// ── Public API ───────────────────────────────────────────────────────────────

/// Returns `true` if an office converter can be located on this host.
pub fn is_office_installed() -> bool {
    locate_office_converter().is_ok()
}

/// Returns the path of the office converter binary, searching on first use.
///
/// Only successful lookups are cached, so installing LibreOffice while the
/// process runs is picked up by the next call.
pub fn locate_office_converter() -> Result<PathBuf, OfficeProbeError> {
    if let Some(path) = RESOLVED_PATH.get() {
        return Ok(path.clone());
    }

    let path = resolve_office_converter()?;
    let _ = RESOLVED_PATH.set(path.clone());
    Ok(path)
}

/// Runs the full search without consulting or filling the process cache.
pub fn resolve_office_converter() -> Result<PathBuf, OfficeProbeError> {
    // 1. Environment variable override. A set-but-wrong value is an operator
    //    mistake and is reported instead of silently searching elsewhere.
    if let Some(env_path) = std::env::var_os(OFFICE_CONVERTER_ENV) {
        if !env_path.is_empty() {
            let p = PathBuf::from(env_path);
            if is_executable(&p) {
                return Ok(p);
            }
            return Err(OfficeProbeError::EnvPathInvalid { path: p });
        }
    }

    let info = detect_platform()?;
    let mut searched = Vec::new();

    // 2. PATH.
    if let Some(path_var) = std::env::var_os("PATH") {
        if let Some(found) = search_path_var(&path_var, info.binary_names, &mut searched) {
            return Ok(found);
        }
    }

    // 3 + 4. Install directories, versioned installs, per-user bin dir.
    let candidates = candidate_dirs(&info);
    find_in_dirs(&candidates, info.binary_names, &mut searched)
        .ok_or(OfficeProbeError::NotFound { searched })
}

/// Looks for any of `names` in each directory listed in a `PATH`-style value.
///
/// Every probed file is appended to `searched`.
pub fn search_path_var(
    path_var: &OsStr,
    names: &[&str],
    searched: &mut Vec<PathBuf>,
) -> Option<PathBuf> {
    let dirs: Vec<PathBuf> = std::env::split_paths(path_var).collect();
    find_in_dirs(&dirs, names, searched)
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn candidate_dirs(info: &PlatformInfo) -> Vec<PathBuf> {
    let mut candidates: Vec<PathBuf> = info.install_dirs.iter().map(PathBuf::from).collect();

    if let Some((root, prefix)) = info.versioned_root {
        candidates.extend(versioned_program_dirs(Path::new(root), prefix));
    }

    if let Some(user_bin) = dirs::executable_dir() {
        candidates.push(user_bin);
    }

    candidates
}

/// `/opt/libreoffice7.6/program`, `/opt/libreoffice24.2/program`, … in reverse name order.
fn versioned_program_dirs(root: &Path, prefix: &str) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(root) else {
        return Vec::new();
    };

    let mut found: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(prefix))
        .map(|e| e.path().join("program"))
        .filter(|p| p.is_dir())
        .collect();

    found.sort();
    found.reverse();
    found
}

fn find_in_dirs(dirs: &[PathBuf], names: &[&str], searched: &mut Vec<PathBuf>) -> Option<PathBuf> {
    for dir in dirs {
        for name in names {
            let candidate = dir.join(name);
            if is_executable(&candidate) {
                return Some(candidate);
            }
            searched.push(candidate);
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "office-probe-{}-{}",
            name,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[cfg(unix)]
    fn make_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::write(path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn detect_platform_is_supported() {
        let info = detect_platform().expect("current platform should be supported");
        assert!(!info.binary_names.is_empty());
        assert!(!info.install_dirs.is_empty());
    }

    #[test]
    fn not_found_lists_every_probe() {
        let dir = scratch_dir("empty");
        let mut searched = Vec::new();
        let found = find_in_dirs(&[dir.clone()], &["soffice", "libreoffice"], &mut searched);
        assert!(found.is_none());
        assert_eq!(searched, vec![dir.join("soffice"), dir.join("libreoffice")]);

        let err = OfficeProbeError::NotFound { searched };
        assert!(err.to_string().contains("2 locations"));
        assert!(err.to_string().contains(OFFICE_CONVERTER_ENV));
    }

    #[cfg(unix)]
    #[test]
    fn path_search_finds_second_name() {
        let empty = scratch_dir("path-a");
        let with_bin = scratch_dir("path-b");
        make_executable(&with_bin.join("libreoffice"));

        let path_var = std::env::join_paths([&empty, &with_bin]).unwrap();
        let mut searched = Vec::new();
        let found = search_path_var(&path_var, &["soffice", "libreoffice"], &mut searched);
        assert_eq!(found, Some(with_bin.join("libreoffice")));
    }

    #[cfg(unix)]
    #[test]
    fn non_executable_file_is_skipped() {
        let dir = scratch_dir("noexec");
        std::fs::write(dir.join("soffice"), "not a program").unwrap();
        let mut searched = Vec::new();
        assert!(find_in_dirs(&[dir], &["soffice"], &mut searched).is_none());
        assert_eq!(searched.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn versioned_installs_in_reverse_name_order() {
        let root = scratch_dir("opt");
        for v in ["libreoffice7.6", "libreoffice24.2", "otherapp"] {
            std::fs::create_dir_all(root.join(v).join("program")).unwrap();
        }
        let dirs = versioned_program_dirs(&root, "libreoffice");
        assert_eq!(dirs.len(), 2);
        assert!(dirs[0].ends_with("libreoffice7.6/program"));
        assert!(dirs[1].ends_with("libreoffice24.2/program"));
    }
}
