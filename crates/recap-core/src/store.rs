//! Snapshot persistence
//!
//! `SnapWriter` serializes a snapshot into its directory under a sanitized
//! `<SimpleName>_<method>_<disambiguator>.json` filename, creating the
//! directory on first use and opening group/other read permissions on what
//! it writes. Permission failures are logged and non-fatal; a failed write
//! of the snapshot itself propagates, because a lost snapshot silently
//! breaks later replay. `SnapReader` resolves a [`Source`] and decodes it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{SecondsFormat, Utc};
use tracing::{debug, info, trace, warn};

use crate::config::RecordConfig;
use crate::error::{RecapError, RecapResult};
use crate::model::Snapshot;
use crate::source::Source;

/// Writer that serializes snapshots into an output directory
pub struct SnapWriter {
    directory: PathBuf,
    pretty: bool,
    relax_permissions: bool,
    sequence: AtomicU64,
}

impl SnapWriter {
    /// Create a writer for the given directory
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        SnapWriter {
            directory: directory.into(),
            pretty: true,
            relax_permissions: true,
            sequence: AtomicU64::new(0),
        }
    }

    /// Create a writer from a recording configuration
    pub fn from_config(config: &RecordConfig) -> Self {
        SnapWriter {
            directory: config.snapshot_dir.clone(),
            pretty: config.pretty_print,
            relax_permissions: config.relax_permissions,
            sequence: AtomicU64::new(0),
        }
    }

    /// Serialize and write one snapshot, returning the written path
    pub fn write(&self, snapshot: &Snapshot) -> RecapResult<PathBuf> {
        let file_name = self.file_name(snapshot);
        trace!(file_name = file_name.as_str(), "Snap writing");
        if !self.directory.exists() {
            std::fs::create_dir_all(&self.directory).map_err(|source| {
                RecapError::storage_from(
                    format!("Cannot create snapshot directory `{}`", self.directory.display()),
                    source,
                )
            })?;
            debug!(directory = %self.directory.display(), "Snapshot directory created");
            if self.relax_permissions {
                open_for_reading(&self.directory, 0o055);
            }
        }
        let path = self.directory.join(file_name);
        let payload = if self.pretty {
            serde_json::to_vec_pretty(snapshot)
        } else {
            serde_json::to_vec(snapshot)
        }
        .map_err(|source| RecapError::codec_from("Snapshot failed to serialize", source))?;
        std::fs::write(&path, payload).map_err(|source| {
            RecapError::storage_from(format!("Cannot write snapshot `{}`", path.display()), source)
        })?;
        if self.relax_permissions {
            open_for_reading(&path, 0o044);
        }
        info!(path = %path.display(), "Snap file written");
        Ok(path)
    }

    fn file_name(&self, snapshot: &Snapshot) -> String {
        let simple = snapshot
            .main
            .subject_type_name
            .rsplit('.')
            .next()
            .unwrap_or(snapshot.main.subject_type_name.as_str());
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        sanitize(&format!(
            "{simple}_{}_{stamp}-{sequence}.json",
            snapshot.main.method_name
        ))
    }
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Grant group/other read access on a written path; failures are logged and
/// deliberately non-fatal (best-effort hardening, not correctness)
#[cfg(unix)]
fn open_for_reading(path: &Path, extra_mode: u32) {
    use std::os::unix::fs::PermissionsExt;

    let outcome = std::fs::metadata(path).and_then(|metadata| {
        let mut permissions = metadata.permissions();
        permissions.set_mode(permissions.mode() | extra_mode);
        std::fs::set_permissions(path, permissions)
    });
    if let Err(err) = outcome {
        warn!(path = %path.display(), error = %err, "Cannot set permissions");
    }
}

#[cfg(not(unix))]
fn open_for_reading(_path: &Path, _extra_mode: u32) {}

/// A snapshot together with the source it was read from
#[derive(Debug, Clone)]
pub struct SnapshotFromSource {
    /// Where the snapshot came from
    pub source: Source,
    /// The decoded snapshot
    pub snapshot: Arc<Snapshot>,
}

/// Reader that resolves a [`Source`] and decodes the snapshot in it
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapReader;

impl SnapReader {
    /// Create a reader
    pub fn new() -> Self {
        SnapReader
    }

    /// Read and decode a snapshot from a source
    pub fn read(&self, source: &Source) -> RecapResult<SnapshotFromSource> {
        let bytes = source.read_all()?;
        let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|cause| {
            RecapError::codec_from(
                format!("Snapshot from `{}` failed to decode", source.name()),
                cause,
            )
        })?;
        Ok(SnapshotFromSource {
            source: source.clone(),
            snapshot: Arc::new(snapshot),
        })
    }
}
