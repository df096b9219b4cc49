//! An incoming upload: a byte stream plus the filename the client claimed.
//!
//! Neither part is trusted. The declared name is sanitised before it touches
//! a path, and the bytes are only checked once they are on disk.

use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::pin::Pin;
use tokio::io::AsyncRead;

pub struct Upload {
    /// Client-declared filename, exactly as received. `None` or empty means
    /// the client sent no file.
    pub declared_name: Option<String>,
    /// The file contents.
    pub body: Pin<Box<dyn AsyncRead + Send>>,
}

impl fmt::Debug for Upload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Upload")
            .field("declared_name", &self.declared_name)
            .field("body", &"<stream>")
            .finish()
    }
}

impl Upload {
    pub fn new(declared_name: impl Into<String>, body: impl AsyncRead + Send + 'static) -> Self {
        Self {
            declared_name: Some(declared_name.into()),
            body: Box::pin(body),
        }
    }

    /// An upload held entirely in memory.
    pub fn from_bytes(declared_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(declared_name, Cursor::new(bytes.into()))
    }

    /// Stream a local file, declaring its own file name.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, file))
    }

    /// The declared name, if a non-blank one was sent.
    pub fn declared_name(&self) -> Option<&str> {
        self.declared_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
    }
}
