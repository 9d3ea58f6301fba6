use crate::config::types::SessionsConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

/// Stable name of a transcript stream: the file stem, treated as an opaque key.
///
/// Two observations with the same identity are the same stream even when the
/// file behind the path was replaced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileIdentity(String);

impl FileIdentity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identity of a transcript path, or `None` when it has no usable stem.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .map(Self::new)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-poll snapshot of the file currently being followed. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveFileRef {
    pub identity: FileIdentity,
    pub path: PathBuf,
    pub size: u64,
}

/// Which rule picked the active file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedBy {
    Pointer,
    Fallback,
    MostRecent,
}

impl fmt::Display for ResolvedBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResolvedBy::Pointer => "pointer",
            ResolvedBy::Fallback => "fallback",
            ResolvedBy::MostRecent => "most_recent",
        })
    }
}

#[derive(Debug, Deserialize)]
struct PointerEntry {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// Finds the transcript that is currently being written.
pub struct ActiveFileResolver {
    dir: PathBuf,
    pointer_file: String,
    pointer_key: String,
    fallback_id: Option<String>,
    extension: String,
    deleted_marker: String,
}

impl ActiveFileResolver {
    pub fn new(config: &SessionsConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            pointer_file: config.pointer_file.clone(),
            pointer_key: config.pointer_key.clone(),
            fallback_id: config.fallback_session_id.clone(),
            extension: config.extension.clone(),
            deleted_marker: config.deleted_marker.clone(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve the active transcript and the rule that picked it.
    ///
    /// First success wins: the manifest entry, then the configured fallback id,
    /// then the most recently modified candidate. `Ok(None)` means there is
    /// nothing to follow yet.
    pub fn resolve_with_rule(&self) -> io::Result<Option<(ActiveFileRef, ResolvedBy)>> {
        if let Some(id) = self.pointer_target() {
            if let Some(file) = self.observe_id(&id)? {
                return Ok(Some((file, ResolvedBy::Pointer)));
            }
        }

        if let Some(id) = &self.fallback_id {
            if let Some(file) = self.observe_id(id)? {
                return Ok(Some((file, ResolvedBy::Fallback)));
            }
        }

        Ok(self
            .most_recent()?
            .map(|file| (file, ResolvedBy::MostRecent)))
    }

    /// Session id named by the manifest. Unreadable or malformed manifests
    /// are not errors; resolution just moves on.
    fn pointer_target(&self) -> Option<String> {
        let path = self.dir.join(&self.pointer_file);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!(path = %path.display(), error = %e, "Could not read session manifest");
                }
                return None;
            }
        };

        let mut manifest: serde_json::Map<String, serde_json::Value> =
            match serde_json::from_str(&contents) {
                Ok(manifest) => manifest,
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Malformed session manifest");
                    return None;
                }
            };

        let entry = manifest.remove(&self.pointer_key)?;
        serde_json::from_value::<PointerEntry>(entry)
            .ok()
            .and_then(|e| e.session_id)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
    }

    fn observe_id(&self, id: &str) -> io::Result<Option<ActiveFileRef>> {
        // Ids come from files we do not control; never let one escape the directory
        if id.contains('/') || id.contains('\\') || id == "." || id == ".." {
            debug!(id, "Ignoring session id that is not a plain file name");
            return Ok(None);
        }
        let path = self.dir.join(format!("{}.{}", id, self.extension));
        observe(&path)
    }

    fn is_candidate(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        !name.contains(&self.deleted_marker)
            && path.extension().and_then(|e| e.to_str()) == Some(self.extension.as_str())
    }

    fn most_recent(&self) -> io::Result<Option<ActiveFileRef>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut best: Option<(SystemTime, ActiveFileRef)> = None;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !self.is_candidate(&path) {
                continue;
            }
            // Files can disappear between listing and stat
            let metadata = match entry.metadata() {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let Some(identity) = FileIdentity::from_path(&path) else {
                continue;
            };
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

            let newer = match &best {
                None => true,
                // Ties go to the lexically larger identity so the pick is stable
                Some((t, current)) => {
                    modified > *t || (modified == *t && identity > current.identity)
                }
            };
            if newer {
                best = Some((
                    modified,
                    ActiveFileRef {
                        identity,
                        path,
                        size: metadata.len(),
                    },
                ));
            }
        }

        Ok(best.map(|(_, file)| file))
    }
}

/// Snapshot an existing regular file. A missing file is `Ok(None)`.
pub fn observe(path: &Path) -> io::Result<Option<ActiveFileRef>> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    if !metadata.is_file() {
        return Ok(None);
    }
    Ok(FileIdentity::from_path(path).map(|identity| ActiveFileRef {
        identity,
        path: path.to_path_buf(),
        size: metadata.len(),
    }))
}
