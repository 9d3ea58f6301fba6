use crate::source::identity::FileIdentity;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to create state directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write state file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// How far one transcript has been consumed.
///
/// `offset` always sits right after a complete line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetRecord {
    pub offset: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_processed: Option<DateTime<FixedOffset>>,
}

impl OffsetRecord {
    /// State of a transcript that has never been read.
    pub fn unseen() -> Self {
        Self {
            offset: 0,
            last_processed: None,
        }
    }
}

/// On-disk snapshot: `{"files": {"<identity>": {"offset": .., "last_processed": ..}}}`
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    files: BTreeMap<FileIdentity, OffsetRecord>,
}

/// Durable map from transcript identity to consumed offset.
///
/// Loaded once at startup and written back as a whole snapshot after every
/// change. Writes go to a temp file that is renamed over the old snapshot, so
/// a crash leaves either the previous or the new snapshot on disk.
#[derive(Debug)]
pub struct OffsetStore {
    path: PathBuf,
    files: BTreeMap<FileIdentity, OffsetRecord>,
    dirty: bool,
}

impl OffsetStore {
    /// Load the snapshot at `path`.
    ///
    /// A missing file is a first run. An unreadable or malformed file is
    /// logged and replaced by an empty store; it never stops the process.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let files = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<Snapshot>(&bytes) {
                Ok(snapshot) => {
                    info!(
                        path = %path.display(),
                        tracked_files = snapshot.files.len(),
                        "Loaded offset state"
                    );
                    snapshot.files
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not parse offset state, starting empty");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No offset state yet");
                BTreeMap::new()
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not read offset state, starting empty");
                BTreeMap::new()
            }
        };

        Self {
            path,
            files,
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Stored state for `identity`; never-seen identities start at offset 0.
    pub fn get(&self, identity: &FileIdentity) -> OffsetRecord {
        self.files
            .get(identity)
            .cloned()
            .unwrap_or_else(OffsetRecord::unseen)
    }

    pub fn offset(&self, identity: &FileIdentity) -> u64 {
        self.files.get(identity).map_or(0, |r| r.offset)
    }

    /// Record that `identity` has been consumed up to `offset` at `now`.
    pub fn commit(&mut self, identity: &FileIdentity, offset: u64, now: DateTime<FixedOffset>) {
        self.files.insert(
            identity.clone(),
            OffsetRecord {
                offset,
                last_processed: Some(now),
            },
        );
        self.dirty = true;
    }

    /// Forget everything about `identity`'s progress; it will be read from the start.
    pub fn reset(&mut self, identity: &FileIdentity) {
        self.files.insert(identity.clone(), OffsetRecord::unseen());
        self.dirty = true;
    }

    /// Write the whole snapshot to disk.
    pub fn persist(&mut self) -> Result<()> {
        let snapshot = SnapshotRef { files: &self.files };
        atomic_write(&self.path, &snapshot)?;
        self.dirty = false;
        debug!(path = %self.path.display(), tracked_files = self.files.len(), "Persisted offset state");
        Ok(())
    }

    /// Persist only if something changed since the last successful persist.
    pub fn persist_if_dirty(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    files: &'a BTreeMap<FileIdentity, OffsetRecord>,
}

/// Write state to file atomically (write to temp, then rename)
fn atomic_write<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    let unique_id = COUNTER.fetch_add(1, Ordering::SeqCst);
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    let temp_path = path.with_file_name(format!(
        ".{}.tmp.{}.{}",
        file_name,
        std::process::id(),
        unique_id
    ));

    let write_err = |source: io::Error| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };

    let result = (|| {
        let file = File::create(&temp_path).map_err(write_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n").map_err(write_err)?;
        let file = writer.into_inner().map_err(|e| write_err(e.into_error()))?;
        file.sync_all().map_err(write_err)?;
        drop(file);

        fs::rename(&temp_path, path).map_err(write_err)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn now() -> DateTime<FixedOffset> {
        Utc::now().fixed_offset()
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let store = OffsetStore::load(temp_dir.path().join(".state.json"));
        assert!(store.is_empty());
        assert_eq!(store.get(&FileIdentity::new("x")), OffsetRecord::unseen());
    }

    #[test]
    fn test_commit_persist_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join(".state.json");
        let id = FileIdentity::new("abc");

        let mut store = OffsetStore::load(&path);
        store.commit(&id, 1234, now());
        assert!(store.is_dirty());
        store.persist().unwrap();
        assert!(!store.is_dirty());

        let reloaded = OffsetStore::load(&path);
        assert_eq!(reloaded.offset(&id), 1234);
        assert!(reloaded.get(&id).last_processed.is_some());
    }

    #[test]
    fn test_malformed_file_is_empty_store() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".state.json");
        fs::write(&path, "{\"files\": {\"a\": {\"offset\": -3}").unwrap();

        let store = OffsetStore::load(&path);
        assert!(store.is_empty());
    }

    #[test]
    fn test_reads_layout_without_last_processed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".state.json");
        fs::write(
            &path,
            r#"{"files": {"a": {"offset": 0}, "b": {"offset": 77, "last_processed": "2026-01-01T10:00:00.123456+01:00"}}}"#,
        )
        .unwrap();

        let store = OffsetStore::load(&path);
        assert_eq!(store.len(), 2);
        assert_eq!(store.offset(&FileIdentity::new("b")), 77);
        assert!(store.get(&FileIdentity::new("a")).last_processed.is_none());
    }

    #[test]
    fn test_reset_keeps_other_identities() {
        let temp_dir = TempDir::new().unwrap();
        let mut store = OffsetStore::load(temp_dir.path().join(".state.json"));
        let a = FileIdentity::new("a");
        let b = FileIdentity::new("b");
        store.commit(&a, 10, now());
        store.commit(&b, 20, now());

        store.reset(&a);
        assert_eq!(store.get(&a), OffsetRecord::unseen());
        assert_eq!(store.offset(&b), 20);
    }

    #[test]
    fn test_persist_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".state.json");
        let mut store = OffsetStore::load(&path);
        store.commit(&FileIdentity::new("a"), 1, now());
        store.persist().unwrap();
        store.commit(&FileIdentity::new("a"), 2, now());
        store.persist().unwrap();

        let names: Vec<String> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![".state.json".to_string()]);
    }

    #[test]
    fn test_persist_if_dirty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".state.json");
        let mut store = OffsetStore::load(&path);
        assert!(!store.persist_if_dirty().unwrap());
        assert!(!path.exists());

        store.commit(&FileIdentity::new("a"), 5, now());
        assert!(store.persist_if_dirty().unwrap());
        assert!(path.exists());
    }

    #[test]
    fn test_unwritable_location_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        fs::write(&blocker, "").unwrap();

        // Parent of the state path is a regular file
        let mut store = OffsetStore::load(blocker.join(".state.json"));
        store.commit(&FileIdentity::new("a"), 5, now());
        assert!(store.persist().is_err());
        assert!(store.is_dirty());
    }
}
