//! The conversion dispatcher.
//!
//! [`Converter::convert`] turns one source file into one PDF at a chosen
//! destination, or fails with a [`ConversionError`]. Each call is an isolated
//! unit of work:
//!
//! * the strategy is picked once from the source extension;
//! * CPU-bound strategies run on the blocking pool (`spawn_blocking`), and the
//!   office strategy awaits a child process under a timeout;
//! * at most `max_concurrent_conversions` run at once (semaphore);
//! * two conversions never write the same destination at the same time (a
//!   lock table keyed by destination path; idle entries are evicted).
//!
//! No call is retried: a failed conversion is the student's cue to upload a
//! different file.

use crate::capability::{Capabilities, CapabilityProvider, SystemCapabilities};
use crate::config::PortalConfig;
use crate::error::{ConversionError, ConversionPhase};
use crate::format::{extension_of, sniff_matches, Strategy, ALLOWED_EXTENSIONS, SNIFF_LEN};
use crate::pipeline::{office, passthrough, raster, text};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::sync::{OwnedMutexGuard, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

/// What a successful conversion produced.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConversionReport {
    /// The canonical PDF, equal to the requested destination.
    pub destination: PathBuf,
    /// Strategy name: `passthrough`, `rasterize`, `paginate` or `office-delegate`.
    pub strategy: &'static str,
    /// Pages written, when the strategy knows it (not for passthrough/office).
    pub pages: Option<usize>,
    pub duration_ms: u64,
}

/// Converts uploads into PDFs. Cheap to clone; clones share limits and locks.
#[derive(Clone)]
pub struct Converter {
    config: Arc<PortalConfig>,
    capabilities: Capabilities,
    permits: Arc<Semaphore>,
    locks: Arc<DestinationLocks>,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("config", &self.config)
            .field("capabilities", &"<dyn CapabilityProvider>")
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

impl Converter {
    pub fn new(config: impl Into<Arc<PortalConfig>>, capabilities: Capabilities) -> Self {
        let config = config.into();
        let permits = Arc::new(Semaphore::new(config.max_concurrent_conversions.max(1)));
        Self {
            config,
            capabilities,
            permits,
            locks: Arc::new(DestinationLocks::default()),
        }
    }

    /// A converter that looks for LibreOffice on the host.
    pub fn with_system_capabilities(config: impl Into<Arc<PortalConfig>>) -> Self {
        Self::new(config, Arc::new(SystemCapabilities))
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &dyn CapabilityProvider {
        self.capabilities.as_ref()
    }

    /// Convert `source` into a PDF at `dest`; returns `dest` on success.
    ///
    /// An existing file at `dest` is replaced atomically. On failure `dest`
    /// is left exactly as it was.
    pub async fn convert(
        &self,
        source: impl AsRef<Path>,
        dest: impl AsRef<Path>,
    ) -> Result<PathBuf, ConversionError> {
        self.convert_with_report(source, dest)
            .await
            .map(|r| r.destination)
    }

    /// Like [`convert`](Self::convert), returning strategy, page count and timing.
    pub async fn convert_with_report(
        &self,
        source: impl AsRef<Path>,
        dest: impl AsRef<Path>,
    ) -> Result<ConversionReport, ConversionError> {
        let start = Instant::now();
        let source = source.as_ref();
        let dest = dest.as_ref();

        // ── Step 1: Select strategy ──────────────────────────────────────
        let strategy = Strategy::for_path(source);
        let strategy_name = strategy.name();
        debug!("{} → strategy {}", source.display(), strategy_name);
        let tool = match &strategy {
            Strategy::Unsupported(ext) => {
                return Err(ConversionError::UnsupportedFormat {
                    extension: ext.clone(),
                    allowed: ALLOWED_EXTENSIONS.join(", "),
                })
            }
            Strategy::OfficeDelegate(capability) => {
                Some(self.capabilities.locate(*capability).map_err(|e| {
                    warn!("No converter for {}: {}", source.display(), e);
                    e
                })?)
            }
            _ => None,
        };

        // ── Step 2: Plausibility of content vs. extension ────────────────
        if self.config.verify_content {
            check_content(source).await?;
        }

        // ── Step 3: Exclusive destination + conversion slot ──────────────
        let parent = crate::pipeline::parent_dir(dest).to_path_buf();
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| ConversionError::io(ConversionPhase::Finalize, &parent, e))?;

        let _dest_guard = self.locks.acquire(dest).await;
        let _permit = self.acquire_permit().await?;

        // ── Step 4: Run the strategy ─────────────────────────────────────
        let pages = match strategy {
            Strategy::Passthrough => {
                let (s, d) = (source.to_path_buf(), dest.to_path_buf());
                run_blocking(move || passthrough::copy_pdf(&s, &d)).await?;
                None
            }
            Strategy::Rasterize => {
                let (s, d) = (source.to_path_buf(), dest.to_path_buf());
                let dpi = self.config.image_dpi;
                Some(run_blocking(move || raster::rasterize(&s, &d, dpi)).await?)
            }
            Strategy::Paginate => {
                let (s, d) = (source.to_path_buf(), dest.to_path_buf());
                let layout = self.config.text_layout;
                Some(run_blocking(move || text::paginate(&s, &d, &layout)).await?)
            }
            Strategy::OfficeDelegate(_) => {
                let tool = tool.ok_or_else(|| {
                    ConversionError::Internal("office tool was not resolved".into())
                })?;
                let timeout = Duration::from_secs(self.config.office_timeout_secs);
                office::delegate(&tool, source, dest, timeout).await?;
                None
            }
            Strategy::Unsupported(ext) => {
                return Err(ConversionError::Internal(format!(
                    "unsupported '.{ext}' reached the strategy step"
                )))
            }
        };

        let report = ConversionReport {
            destination: dest.to_path_buf(),
            strategy: strategy_name,
            pages,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Converted {} → {} via {} in {}ms",
            source.display(),
            dest.display(),
            report.strategy,
            report.duration_ms
        );
        Ok(report)
    }

    /// Synchronous wrapper around [`convert`](Self::convert).
    ///
    /// Creates a temporary tokio runtime internally; do not call from async code.
    pub fn convert_sync(
        &self,
        source: impl AsRef<Path>,
        dest: impl AsRef<Path>,
    ) -> Result<PathBuf, ConversionError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| ConversionError::Internal(format!("Failed to create tokio runtime: {e}")))?
            .block_on(self.convert(source, dest))
    }

    async fn acquire_permit(&self) -> Result<OwnedSemaphorePermit, ConversionError> {
        Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| ConversionError::Internal(format!("conversion limiter closed: {e}")))
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, ConversionError>
where
    F: FnOnce() -> Result<T, ConversionError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ConversionError::Internal(format!("Conversion task panicked: {e}")))?
}

async fn check_content(source: &Path) -> Result<(), ConversionError> {
    let mut file = tokio::fs::File::open(source)
        .await
        .map_err(|e| ConversionError::io(ConversionPhase::ContentCheck, source, e))?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    (&mut file)
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut head)
        .await
        .map_err(|e| ConversionError::io(ConversionPhase::ContentCheck, source, e))?;

    let ext = extension_of(source);
    if sniff_matches(&head, &ext) {
        Ok(())
    } else {
        Err(ConversionError::ContentMismatch {
            path: source.to_path_buf(),
            extension: ext,
        })
    }
}

// ── Destination locks ────────────────────────────────────────────────────

/// One async mutex per destination path currently being written.
#[derive(Default)]
struct DestinationLocks {
    table: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

struct DestinationGuard<'a> {
    locks: &'a DestinationLocks,
    key: PathBuf,
    _held: OwnedMutexGuard<()>,
}

impl DestinationLocks {
    async fn acquire(&self, dest: &Path) -> DestinationGuard<'_> {
        let key = lock_key(dest).await;
        let entry = {
            let mut table = self.table.lock().unwrap_or_else(|p| p.into_inner());
            Arc::clone(table.entry(key.clone()).or_default())
        };
        let held = entry.lock_owned().await;
        DestinationGuard {
            locks: self,
            key,
            _held: held,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().map(|t| t.len()).unwrap_or(0)
    }
}

/// One spelling per destination: the resolved parent directory plus the file
/// name, so `pdf/../pdf/x.pdf` and a symlinked `pdf/x.pdf` share a lock.
/// Falls back to the absolute path when the parent does not exist.
async fn lock_key(dest: &Path) -> PathBuf {
    let parent = crate::pipeline::parent_dir(dest);
    match (tokio::fs::canonicalize(parent).await, dest.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => std::path::absolute(dest).unwrap_or_else(|_| dest.to_path_buf()),
    }
}

impl Drop for DestinationGuard<'_> {
    fn drop(&mut self) {
        let mut table = self.locks.table.lock().unwrap_or_else(|p| p.into_inner());
        // Only the table and this guard still reference the mutex: nobody waits.
        if table
            .get(&self.key)
            .is_some_and(|m| Arc::strong_count(m) == 2)
        {
            table.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::NoOfficeCapabilities;
    use crate::capability::OfficeCapability;

    fn converter(dir: &Path) -> Converter {
        let config = PortalConfig::builder()
            .upload_dir(dir.join("up"))
            .pdf_dir(dir.join("pdf"))
            .build()
            .unwrap();
        Converter::new(config, Arc::new(NoOfficeCapabilities))
    }

    #[tokio::test]
    async fn unsupported_extension_names_it() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("setup.exe");
        std::fs::write(&src, b"MZ").unwrap();

        let err = converter(dir.path())
            .convert(&src, dir.path().join("out.pdf"))
            .await
            .unwrap_err();
        match err {
            ConversionError::UnsupportedFormat { extension, .. } => assert_eq!(extension, "exe"),
            other => panic!("expected UnsupportedFormat, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_office_is_capability_error() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("essay.docx");
        std::fs::write(&src, b"PK\x03\x04").unwrap();

        let err = converter(dir.path())
            .convert(&src, dir.path().join("essay.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConversionError::CapabilityUnavailable {
                capability: OfficeCapability::WordProcessor,
                ..
            }
        ));
        assert!(!dir.path().join("essay.pdf").exists());
    }

    #[tokio::test]
    async fn mismatched_content_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("photo.png");
        std::fs::write(&src, b"just some text").unwrap();

        let err = converter(dir.path())
            .convert(&src, dir.path().join("photo.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::ContentMismatch { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn text_report_counts_pages() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("data.csv");
        std::fs::write(&src, "a,b\n1,2\n").unwrap();

        let report = converter(dir.path())
            .convert_with_report(&src, dir.path().join("pdf/data.pdf"))
            .await
            .unwrap();
        assert_eq!(report.strategy, "paginate");
        assert_eq!(report.pages, Some(1));
        assert!(report.destination.exists());
    }

    #[tokio::test]
    async fn lock_entries_are_evicted() {
        let locks = DestinationLocks::default();
        {
            let _a = locks.acquire(Path::new("x/a.pdf")).await;
            let _b = locks.acquire(Path::new("x/b.pdf")).await;
            assert_eq!(locks.len(), 2);
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn same_destination_is_serialised() {
        let locks = Arc::new(DestinationLocks::default());
        let first = locks.acquire(Path::new("same.pdf")).await;

        let l2 = Arc::clone(&locks);
        let waiter = tokio::spawn(async move {
            let _g = l2.acquire(Path::new("same.pdf")).await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn differently_spelled_destinations_share_a_lock() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pdf")).unwrap();
        let plain = dir.path().join("pdf/x.pdf");
        let dotted = dir.path().join("pdf/../pdf/./x.pdf");
        assert_eq!(lock_key(&plain).await, lock_key(&dotted).await);

        let locks = Arc::new(DestinationLocks::default());
        let first = locks.acquire(&plain).await;
        let l2 = Arc::clone(&locks);
        let waiter = tokio::spawn(async move {
            let _g = l2.acquire(&dotted).await;
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());
        assert_eq!(locks.len(), 1);

        drop(first);
        waiter.await.unwrap();
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn convert_sync_copies_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.pdf");
        std::fs::write(&src, b"%PDF-1.4\n%%EOF\n").unwrap();
        let dest = dir.path().join("pdf/out.pdf");

        let out = converter(dir.path()).convert_sync(&src, &dest).unwrap();
        assert_eq!(out, dest);
        assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.4\n%%EOF\n");
    }
}
