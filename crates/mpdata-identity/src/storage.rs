//! Persistence of the four identity artifacts.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tracing::debug;

use crate::{IdentityError, Result};

/// One persisted PEM file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    /// CA certificate (`ca.pem`)
    CaCert,
    /// CA private key (`ca.key`)
    CaKey,
    /// Leaf certificate (`cert.pem`), written last
    LeafCert,
    /// Leaf private key (`key.pem`)
    LeafKey,
}

impl Artifact {
    /// All artifacts in commit order. The leaf certificate is the
    /// completion marker and always comes last.
    pub const COMMIT_ORDER: [Self; 4] = [Self::CaCert, Self::CaKey, Self::LeafKey, Self::LeafCert];

    /// File name inside the identity directory.
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::CaCert => "ca.pem",
            Self::CaKey => "ca.key",
            Self::LeafCert => "cert.pem",
            Self::LeafKey => "key.pem",
        }
    }

    /// Whether the artifact holds private key material.
    pub const fn is_secret(self) -> bool {
        matches!(self, Self::CaKey | Self::LeafKey)
    }
}

/// Storage backend for identity artifacts.
pub trait IdentityStore {
    /// Whether the artifact is present.
    fn exists(&self, artifact: Artifact) -> Result<bool>;

    /// Read the artifact's bytes.
    fn read(&self, artifact: Artifact) -> Result<Vec<u8>>;

    /// Write the artifact, replacing any previous content.
    fn write(&self, artifact: Artifact, contents: &[u8]) -> Result<()>;
}

/// Artifacts stored as files in a single directory.
#[derive(Debug, Clone)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    /// Store rooted at `dir` (the process working directory for `"."`).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory the artifacts live in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of an artifact.
    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }

    fn staging_path(&self, artifact: Artifact) -> PathBuf {
        self.dir.join(format!(".{}.tmp", artifact.file_name()))
    }
}

impl IdentityStore for DirStore {
    fn exists(&self, artifact: Artifact) -> Result<bool> {
        let path = self.path(artifact);
        path.try_exists()
            .map_err(|e| IdentityError::storage(path, e))
    }

    fn read(&self, artifact: Artifact) -> Result<Vec<u8>> {
        let path = self.path(artifact);
        std::fs::read(&path).map_err(|e| IdentityError::storage(path, e))
    }

    fn write(&self, artifact: Artifact, contents: &[u8]) -> Result<()> {
        let target = self.path(artifact);
        let staging = self.staging_path(artifact);

        // Leftover from an interrupted write; its mode cannot be trusted.
        match std::fs::remove_file(&staging) {
            Ok(()) => debug!(path = %staging.display(), "removed stale staging file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(IdentityError::storage(&staging, e)),
        }

        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(if artifact.is_secret() { 0o600 } else { 0o644 });
        }

        let mut file = options
            .open(&staging)
            .map_err(|e| IdentityError::storage(&staging, e))?;
        file.write_all(contents)
            .and_then(|()| file.sync_all())
            .map_err(|e| IdentityError::storage(&staging, e))?;
        drop(file);

        std::fs::rename(&staging, &target).map_err(|e| IdentityError::storage(&target, e))?;
        debug!(path = %target.display(), bytes = contents.len(), "artifact written");
        Ok(())
    }
}

/// In-memory store that counts writes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<HashMap<Artifact, Vec<u8>>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `write` calls since creation.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current contents of an artifact.
    pub fn get(&self, artifact: Artifact) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&artifact)
            .cloned()
    }
}

impl IdentityStore for MemoryStore {
    fn exists(&self, artifact: Artifact) -> Result<bool> {
        Ok(self.get(artifact).is_some())
    }

    fn read(&self, artifact: Artifact) -> Result<Vec<u8>> {
        self.get(artifact)
            .ok_or_else(|| IdentityError::Missing(artifact.file_name().to_string()))
    }

    fn write(&self, artifact: Artifact, contents: &[u8]) -> Result<()> {
        self.files
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(artifact, contents.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
