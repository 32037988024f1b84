//! Snapshot byte sources
//!
//! A [`Source`] is an abstract, resolvable origin of snapshot bytes. It is
//! cheap to clone and hashable, because read results are cached by source
//! identity. Every variant carries a human-readable name used in error
//! messages.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{RecapError, RecapResult};

/// An abstract origin of snapshot bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Source {
    /// A filesystem path
    Path(PathBuf),
    /// A repeatable in-memory byte buffer
    Bytes {
        /// Name reported in error messages
        name: String,
        /// The snapshot bytes
        bytes: Arc<[u8]>,
    },
    /// A resource bundled with the crate, relative to a base directory
    /// (typically the crate's manifest directory)
    Resource {
        /// Base directory the resource path resolves against
        base: PathBuf,
        /// Relative resource path
        path: String,
    },
}

impl Source {
    /// Source backed by a filesystem path
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Source::Path(path.into())
    }

    /// Source backed by an in-memory buffer
    pub fn bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Source::Bytes {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Source backed by a bundled resource
    pub fn resource(base: impl Into<PathBuf>, path: impl Into<String>) -> Self {
        Source::Resource {
            base: base.into(),
            path: path.into(),
        }
    }

    /// Human-readable name for error messages
    pub fn name(&self) -> String {
        match self {
            Source::Path(path) => path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Source::Bytes { name, .. } => name.clone(),
            Source::Resource { path, .. } => path.clone(),
        }
    }

    /// Resolve this source to a byte stream
    pub fn open(&self) -> RecapResult<Box<dyn Read>> {
        match self {
            Source::Path(path) => open_file(path),
            Source::Bytes { bytes, .. } => Ok(Box::new(ByteReader {
                bytes: Arc::clone(bytes),
                pos: 0,
            })),
            Source::Resource { base, path } => open_file(&base.join(path)),
        }
    }

    /// Read this source to the end
    pub fn read_all(&self) -> RecapResult<Vec<u8>> {
        let mut stream = self.open()?;
        let mut buffer = Vec::new();
        stream.read_to_end(&mut buffer).map_err(|source| {
            RecapError::storage_from(format!("Cannot read source `{}`", self.name()), source)
        })?;
        Ok(buffer)
    }
}

fn open_file(path: &Path) -> RecapResult<Box<dyn Read>> {
    let file = File::open(path).map_err(|source| {
        RecapError::storage_from(format!("Cannot open `{}`", path.display()), source)
    })?;
    Ok(Box::new(file))
}

/// Repeatable reader over shared bytes
struct ByteReader {
    bytes: Arc<[u8]>,
    pos: usize,
}

impl Read for ByteReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = &self.bytes[self.pos..];
        let count = remaining.len().min(buf.len());
        buf[..count].copy_from_slice(&remaining[..count]);
        self.pos += count;
        Ok(count)
    }
}
