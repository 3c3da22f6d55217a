//! Where rendered artifacts and their sidecar status files live.
//!
//! Layout under the export root, for a key `K` of subject `S`:
//!
//! - `S/K.{ext}`: the rendered artifact
//! - `S/K-pending-publish.{ext}`: the artifact once handed to a publisher
//! - `S/K.txt`: the sidecar status written after publishing

use super::CorrelationKey;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

const PENDING_PUBLISH_MARKER: &str = "-pending-publish";
const SIDECAR_EXTENSION: &str = "txt";

pub trait ArtifactStore: Send + Sync {
    /// Where the renderer should write the artifact. Creates parent
    /// directories as needed.
    fn prepare_output(&self, key: &CorrelationKey) -> io::Result<PathBuf>;

    fn artifact_exists(&self, key: &CorrelationKey) -> bool;

    fn pending_exists(&self, key: &CorrelationKey) -> bool;

    fn pending_path(&self, key: &CorrelationKey) -> PathBuf;

    /// Rename the artifact to its pending-publish name.
    fn mark_pending_publish(&self, key: &CorrelationKey) -> io::Result<()>;

    /// Undo [`mark_pending_publish`](Self::mark_pending_publish).
    fn unmark_pending_publish(&self, key: &CorrelationKey) -> io::Result<()>;

    /// Best effort; returns whether something was deleted.
    fn remove_artifact(&self, key: &CorrelationKey) -> bool;

    /// Best effort; returns whether something was deleted.
    fn remove_pending(&self, key: &CorrelationKey) -> bool;

    fn write_sidecar(&self, key: &CorrelationKey, contents: &str) -> io::Result<()>;

    /// Read the sidecar and delete it. A sidecar is returned at most once.
    fn take_sidecar(&self, key: &CorrelationKey) -> Option<String>;
}

pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn base_path(&self, key: &CorrelationKey) -> PathBuf {
        self.root
            .join(key.subject_id.to_string())
            .join(key.to_string())
    }

    pub fn artifact_path(&self, key: &CorrelationKey) -> PathBuf {
        self.base_path(key).with_extension(key.format.extension())
    }

    pub fn sidecar_path(&self, key: &CorrelationKey) -> PathBuf {
        self.base_path(key).with_extension(SIDECAR_EXTENSION)
    }

    /// Resolve a caller-supplied path relative to the root. Absolute paths
    /// and `..` components are refused.
    pub fn resolve_relative(&self, relative: &str) -> Option<PathBuf> {
        let relative = Path::new(relative.trim_start_matches('/'));
        let escapes = relative.components().any(|component| {
            !matches!(component, std::path::Component::Normal(_))
        });
        if relative.as_os_str().is_empty() || escapes {
            return None;
        }
        Some(self.root.join(relative))
    }

    /// Sidecar-consume for an artifact addressed by its path under the root.
    pub fn take_sidecar_for_path(&self, relative: &str) -> Option<String> {
        let artifact = self.resolve_relative(relative)?;
        take_file(&artifact.with_extension(SIDECAR_EXTENSION))
    }
}

/// Claim the file by renaming it to a unique name, then read it. Only one
/// concurrent caller wins the rename.
fn take_file(path: &Path) -> Option<String> {
    let claimed = path.with_extension(format!("{}.taken", uuid::Uuid::new_v4()));
    std::fs::rename(path, &claimed).ok()?;
    let contents = std::fs::read_to_string(&claimed);
    if let Err(err) = std::fs::remove_file(&claimed) {
        debug!("Failed to delete consumed sidecar {:?}: {}", claimed, err);
    }
    match contents {
        Ok(contents) => Some(contents),
        Err(err) => {
            debug!("Failed to read sidecar {:?}: {}", path, err);
            None
        }
    }
}

fn remove_quietly(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(err) => {
            if err.kind() != io::ErrorKind::NotFound {
                debug!("Failed to delete {:?}: {}", path, err);
            }
            false
        }
    }
}

impl ArtifactStore for FsArtifactStore {
    fn prepare_output(&self, key: &CorrelationKey) -> io::Result<PathBuf> {
        let path = self.artifact_path(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(path)
    }

    fn artifact_exists(&self, key: &CorrelationKey) -> bool {
        self.artifact_path(key).is_file()
    }

    fn pending_exists(&self, key: &CorrelationKey) -> bool {
        self.pending_path(key).is_file()
    }

    fn pending_path(&self, key: &CorrelationKey) -> PathBuf {
        let mut name = key.to_string();
        name.push_str(PENDING_PUBLISH_MARKER);
        self.root
            .join(key.subject_id.to_string())
            .join(name)
            .with_extension(key.format.extension())
    }

    fn mark_pending_publish(&self, key: &CorrelationKey) -> io::Result<()> {
        std::fs::rename(self.artifact_path(key), self.pending_path(key))
    }

    fn unmark_pending_publish(&self, key: &CorrelationKey) -> io::Result<()> {
        std::fs::rename(self.pending_path(key), self.artifact_path(key))
    }

    fn remove_artifact(&self, key: &CorrelationKey) -> bool {
        remove_quietly(&self.artifact_path(key))
    }

    fn remove_pending(&self, key: &CorrelationKey) -> bool {
        remove_quietly(&self.pending_path(key))
    }

    fn write_sidecar(&self, key: &CorrelationKey, contents: &str) -> io::Result<()> {
        let path = self.sidecar_path(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Write then rename so a poller never reads a partial sidecar.
        let tmp = path.with_extension("txt.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &path)
    }

    fn take_sidecar(&self, key: &CorrelationKey) -> Option<String> {
        take_file(&self.sidecar_path(key))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Artifact,
    Pending,
}

/// Process-local store with the same state transitions as the filesystem.
#[derive(Default)]
pub struct InMemoryArtifactStore {
    artifacts: Mutex<HashMap<CorrelationKey, Slot>>,
    sidecars: Mutex<HashMap<CorrelationKey, String>>,
    prepared: Mutex<HashSet<CorrelationKey>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the renderer finishing.
    pub fn put_artifact(&self, key: &CorrelationKey) {
        self.artifacts.lock().unwrap().insert(*key, Slot::Artifact);
    }

    pub fn was_prepared(&self, key: &CorrelationKey) -> bool {
        self.prepared.lock().unwrap().contains(key)
    }

    fn path(&self, key: &CorrelationKey, suffix: &str) -> PathBuf {
        PathBuf::from(format!(
            "memory/{}/{}{}.{}",
            key.subject_id,
            key,
            suffix,
            key.format.extension()
        ))
    }

    fn move_slot(&self, key: &CorrelationKey, from: Slot, to: Slot) -> io::Result<()> {
        let mut artifacts = self.artifacts.lock().unwrap();
        match artifacts.get_mut(key) {
            Some(slot) if *slot == from => {
                *slot = to;
                Ok(())
            }
            _ => Err(io::Error::new(io::ErrorKind::NotFound, key.to_string())),
        }
    }

    fn remove_slot(&self, key: &CorrelationKey, slot: Slot) -> bool {
        let mut artifacts = self.artifacts.lock().unwrap();
        if artifacts.get(key) == Some(&slot) {
            artifacts.remove(key);
            true
        } else {
            false
        }
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn prepare_output(&self, key: &CorrelationKey) -> io::Result<PathBuf> {
        self.prepared.lock().unwrap().insert(*key);
        Ok(self.path(key, ""))
    }

    fn artifact_exists(&self, key: &CorrelationKey) -> bool {
        self.artifacts.lock().unwrap().get(key) == Some(&Slot::Artifact)
    }

    fn pending_exists(&self, key: &CorrelationKey) -> bool {
        self.artifacts.lock().unwrap().get(key) == Some(&Slot::Pending)
    }

    fn pending_path(&self, key: &CorrelationKey) -> PathBuf {
        self.path(key, PENDING_PUBLISH_MARKER)
    }

    fn mark_pending_publish(&self, key: &CorrelationKey) -> io::Result<()> {
        self.move_slot(key, Slot::Artifact, Slot::Pending)
    }

    fn unmark_pending_publish(&self, key: &CorrelationKey) -> io::Result<()> {
        self.move_slot(key, Slot::Pending, Slot::Artifact)
    }

    fn remove_artifact(&self, key: &CorrelationKey) -> bool {
        self.remove_slot(key, Slot::Artifact)
    }

    fn remove_pending(&self, key: &CorrelationKey) -> bool {
        self.remove_slot(key, Slot::Pending)
    }

    fn write_sidecar(&self, key: &CorrelationKey, contents: &str) -> io::Result<()> {
        self.sidecars
            .lock()
            .unwrap()
            .insert(*key, contents.to_string());
        Ok(())
    }

    fn take_sidecar(&self, key: &CorrelationKey) -> Option<String> {
        self.sidecars.lock().unwrap().remove(key)
    }
}
