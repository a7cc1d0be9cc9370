use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::batch::list_json_files;
use crate::taxonomy::TrackRecord;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Checkpoint already exists for {0}")]
    AlreadyExists(String),
    #[error("No checkpoint for {0}")]
    Missing(String),
    #[error("IO error on checkpoint {id}: {source}")]
    Io {
        id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize checkpoint {id}: {source}")]
    Serialize {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Write-once store of per-batch results. Presence of a key means the batch is done.
pub trait CheckpointStore {
    fn exists(&self, id: &str) -> bool;

    /// Persist a batch result. Must fail rather than replace an existing entry,
    /// and must never leave a partial entry behind.
    fn write(&mut self, id: &str, tracks: &[TrackRecord]) -> Result<(), CheckpointError>;

    /// Stored keys in enumeration order.
    fn list(&self) -> Result<Vec<String>, CheckpointError>;

    /// Raw stored text; shape checking is left to the reader.
    fn read_raw(&self, id: &str) -> Result<String, CheckpointError>;
}

/// Checkpoints as `<dir>/<batch id>` JSON files.
pub struct FsCheckpointStore {
    dir: PathBuf,
}

impl FsCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl CheckpointStore for FsCheckpointStore {
    fn exists(&self, id: &str) -> bool {
        self.dir.join(id).is_file()
    }

    fn write(&mut self, id: &str, tracks: &[TrackRecord]) -> Result<(), CheckpointError> {
        let path = self.dir.join(id);
        if path.exists() {
            return Err(CheckpointError::AlreadyExists(id.to_string()));
        }
        std::fs::create_dir_all(&self.dir).map_err(|source| CheckpointError::Io {
            id: id.to_string(),
            source,
        })?;
        write_json_atomic(&path, &tracks, false).map_err(|e| match e {
            AtomicWriteError::Io(source) if source.kind() == std::io::ErrorKind::AlreadyExists => {
                CheckpointError::AlreadyExists(id.to_string())
            }
            AtomicWriteError::Io(source) => CheckpointError::Io {
                id: id.to_string(),
                source,
            },
            AtomicWriteError::Serialize(source) => CheckpointError::Serialize {
                id: id.to_string(),
                source,
            },
        })
    }

    fn list(&self) -> Result<Vec<String>, CheckpointError> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        Ok(list_json_files(&self.dir))
    }

    fn read_raw(&self, id: &str) -> Result<String, CheckpointError> {
        std::fs::read_to_string(self.dir.join(id)).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                CheckpointError::Missing(id.to_string())
            } else {
                CheckpointError::Io {
                    id: id.to_string(),
                    source,
                }
            }
        })
    }
}

/// In-memory store; keeps insertion order.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    entries: Vec<(String, String)>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert arbitrary text under a key, bypassing serialization.
    pub fn insert_raw(&mut self, id: &str, raw: impl Into<String>) {
        self.entries.push((id.to_string(), raw.into()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn exists(&self, id: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == id)
    }

    fn write(&mut self, id: &str, tracks: &[TrackRecord]) -> Result<(), CheckpointError> {
        if self.exists(id) {
            return Err(CheckpointError::AlreadyExists(id.to_string()));
        }
        let raw = to_pretty_json(&tracks).map_err(|source| CheckpointError::Serialize {
            id: id.to_string(),
            source,
        })?;
        self.entries.push((id.to_string(), raw));
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>, CheckpointError> {
        Ok(self.entries.iter().map(|(k, _)| k.clone()).collect())
    }

    fn read_raw(&self, id: &str) -> Result<String, CheckpointError> {
        self.entries
            .iter()
            .find(|(k, _)| k == id)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| CheckpointError::Missing(id.to_string()))
    }
}

#[derive(Error, Debug)]
pub enum AtomicWriteError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

/// JSON with four-space indentation; non-ASCII is written as-is.
pub(crate) fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    // serde_json only emits valid UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Write `value` to a temp file next to `path`, then move it into place.
/// With `clobber == false` an existing `path` is left alone and `AlreadyExists` is returned.
pub(crate) fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
    clobber: bool,
) -> Result<(), AtomicWriteError> {
    let json = to_pretty_json(value)?;
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(json.as_bytes())?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;

    if clobber {
        tmp.persist(path).map_err(|e| e.error)?;
    } else {
        tmp.persist_noclobber(path).map_err(|e| e.error)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::MainGenre;

    fn track(name: &str) -> TrackRecord {
        TrackRecord {
            filename: name.into(),
            artist: "Aya Nakamura".into(),
            title: "Djadja".into(),
            main_genre: MainGenre::Urban,
            sub_genre: "Afro-pop FR".into(),
            energy_level: 5,
            vibe_tags: vec!["Hit".into()],
            extra: Default::default(),
        }
    }

    #[test]
    fn test_fs_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsCheckpointStore::new(dir.path().join("out"));
        assert!(!store.exists("b1.json"));
        assert!(store.list().unwrap().is_empty());

        store.write("b1.json", &[track("a.mp3")]).unwrap();
        assert!(store.exists("b1.json"));
        let before = store.read_raw("b1.json").unwrap();

        let err = store.write("b1.json", &[track("other.mp3")]).unwrap_err();
        assert!(matches!(err, CheckpointError::AlreadyExists(_)));
        assert_eq!(store.read_raw("b1.json").unwrap(), before);
    }

    #[test]
    fn test_fs_roundtrip_keeps_unicode() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsCheckpointStore::new(dir.path());
        store.write("b.json", &[track("Jungeli - Petit Génie.mp3")]).unwrap();
        let raw = store.read_raw("b.json").unwrap();
        assert!(raw.contains("Petit Génie"));
        assert!(raw.contains("    \"filename\""));
        let back: Vec<TrackRecord> = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, vec![track("Jungeli - Petit Génie.mp3")]);
    }

    #[test]
    fn test_fs_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FsCheckpointStore::new(dir.path());
        store.write("b.json", &[track("a.mp3")]).unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_fs_directory_is_not_a_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("b1.json")).unwrap();
        let store = FsCheckpointStore::new(dir.path());
        assert!(!store.exists("b1.json"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_fs_read_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsCheckpointStore::new(dir.path());
        assert!(matches!(store.read_raw("nope.json"), Err(CheckpointError::Missing(_))));
    }

    #[test]
    fn test_memory_store_order_and_write_once() {
        let mut store = MemoryCheckpointStore::new();
        store.write("c.json", &[track("c.mp3")]).unwrap();
        store.write("a.json", &[track("a.mp3")]).unwrap();
        store.insert_raw("b.json", "{}");
        assert_eq!(store.list().unwrap(), vec!["c.json", "a.json", "b.json"]);
        assert!(store.write("a.json", &[]).is_err());
        assert_eq!(store.len(), 3);
        assert_eq!(store.read_raw("b.json").unwrap(), "{}");
    }

    #[test]
    fn test_atomic_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merged.json");
        write_json_atomic(&path, &vec![1, 2, 3], true).unwrap();
        write_json_atomic(&path, &vec![4], true).unwrap();
        let back: Vec<i32> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, vec![4]);

        let err = write_json_atomic(&path, &vec![5], false).unwrap_err();
        assert!(matches!(err, AtomicWriteError::Io(ref e) if e.kind() == std::io::ErrorKind::AlreadyExists));
    }
}
