use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use crate::BATCH_EXTENSION;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Input directory not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error reading {id}: {source}")]
    Io {
        id: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed batch {id}: {message}")]
    Malformed { id: String, message: String },
}

/// A batch of raw file references, exactly as stored on disk.
#[derive(Debug, Clone)]
pub struct InputBatch {
    pub id: String,
    pub records: Vec<Value>,
}

impl InputBatch {
    /// Filenames of the records, in order. Records without one are skipped.
    pub fn filenames(&self) -> Vec<&str> {
        self.records
            .iter()
            .filter_map(|r| r.get("filename").and_then(Value::as_str))
            .collect()
    }
}

/// Read-only view of the input directory.
pub struct BatchStore {
    root: PathBuf,
}

impl BatchStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Batch identifiers (file names) in filesystem enumeration order.
    pub fn list_batches(&self) -> Result<Vec<String>, BatchError> {
        if !self.root.is_dir() {
            return Err(BatchError::NotFound(self.root.clone()));
        }
        Ok(list_json_files(&self.root))
    }

    pub fn read_batch(&self, id: &str) -> Result<InputBatch, BatchError> {
        let path = self.root.join(id);
        let contents = std::fs::read_to_string(&path).map_err(|source| BatchError::Io {
            id: id.to_string(),
            source,
        })?;
        parse_batch(id, &contents)
    }
}

/// Parse batch contents: a JSON array of records or bare filename strings.
pub fn parse_batch(id: &str, contents: &str) -> Result<InputBatch, BatchError> {
    let malformed = |message: String| BatchError::Malformed {
        id: id.to_string(),
        message,
    };

    let value: Value = serde_json::from_str(contents).map_err(|e| malformed(e.to_string()))?;
    let Value::Array(items) = value else {
        return Err(malformed("expected a JSON array".into()));
    };

    let mut records = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(_) => records.push(item),
            Value::String(name) => {
                let mut obj = Map::new();
                obj.insert("filename".into(), Value::String(name));
                records.push(Value::Object(obj));
            }
            other => {
                return Err(malformed(format!(
                    "entry {i} is neither an object nor a string: {other}"
                )));
            }
        }
    }

    Ok(InputBatch {
        id: id.to_string(),
        records,
    })
}

/// File names of `*.json` files directly inside `dir`, unsorted.
pub(crate) fn list_json_files(dir: &Path) -> Vec<String> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(BATCH_EXTENSION))
        })
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_object_records() {
        let batch = parse_batch(
            "b1.json",
            r#"[{"filename": "Heuss - Moulaga.mp3"}, {"filename": "Gala - Freed from Desire.mp3", "size": 12}]"#,
        )
        .unwrap();
        assert_eq!(batch.records.len(), 2);
        assert_eq!(
            batch.filenames(),
            vec!["Heuss - Moulaga.mp3", "Gala - Freed from Desire.mp3"]
        );
        // Extra fields are carried through untouched
        assert_eq!(batch.records[1]["size"], 12);
    }

    #[test]
    fn test_parse_bare_strings() {
        let batch = parse_batch("b.json", r#"["a.mp3", "b.flac"]"#).unwrap();
        assert_eq!(batch.filenames(), vec!["a.mp3", "b.flac"]);
    }

    #[test]
    fn test_parse_not_json() {
        let err = parse_batch("bad.json", "not json at all").unwrap_err();
        assert!(matches!(err, BatchError::Malformed { ref id, .. } if id == "bad.json"));
    }

    #[test]
    fn test_parse_not_array() {
        let err = parse_batch("obj.json", r#"{"filename": "a.mp3"}"#).unwrap_err();
        assert!(matches!(err, BatchError::Malformed { .. }));
    }

    #[test]
    fn test_parse_bad_entry() {
        let err = parse_batch("n.json", r#"["a.mp3", 42]"#).unwrap_err();
        assert!(err.to_string().contains("entry 1"));
    }

    #[test]
    fn test_missing_root() {
        let store = BatchStore::new("/definitely/not/here/crateclass");
        assert!(matches!(store.list_batches(), Err(BatchError::NotFound(_))));
    }

    #[test]
    fn test_list_only_json_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.json"), "[]").unwrap();
        std::fs::write(dir.path().join("b.JSON"), "[]").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("nested.json")).unwrap();

        let store = BatchStore::new(dir.path());
        let mut ids = store.list_batches().unwrap();
        ids.sort();
        assert_eq!(ids, vec!["a.json", "b.JSON"]);
    }

    #[test]
    fn test_read_batch_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x.json"), r#"["Jungeli - Petit Genie.mp3"]"#).unwrap();
        let store = BatchStore::new(dir.path());
        let batch = store.read_batch("x.json").unwrap();
        assert_eq!(batch.id, "x.json");
        assert_eq!(batch.filenames(), vec!["Jungeli - Petit Genie.mp3"]);

        assert!(matches!(
            store.read_batch("missing.json"),
            Err(BatchError::Io { .. })
        ));
    }
}
