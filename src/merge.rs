use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::checkpoint::{AtomicWriteError, CheckpointError, CheckpointStore, write_json_atomic};
use crate::taxonomy::TrackRecord;

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Failed to list checkpoints: {0}")]
    List(#[from] CheckpointError),
    #[error("Failed to write merged library {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: AtomicWriteError,
    },
}

/// Checkpoint that was left out of the merge, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct Anomaly {
    pub id: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct MergeReport {
    /// Checkpoints that contributed a track list.
    pub artifacts_merged: usize,
    pub tracks_merged: usize,
    /// Merged entries that don't read as a valid track record. Kept, but warned about.
    pub irregular_records: usize,
    pub anomalies: Vec<Anomaly>,
}

/// Concatenate every checkpoint's list, in enumeration order. Entries are
/// appended exactly as stored; duplicates across batches are kept.
pub fn collect_tracks<S>(checkpoints: &S) -> Result<(Vec<Value>, MergeReport), MergeError>
where
    S: CheckpointStore + ?Sized,
{
    let mut all_tracks = Vec::new();
    let mut report = MergeReport::default();

    for id in checkpoints.list()? {
        let raw = match checkpoints.read_raw(&id) {
            Ok(raw) => raw,
            Err(e) => {
                log::warn!("Skipping unreadable checkpoint {id}: {e}");
                report.anomalies.push(Anomaly {
                    id,
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let items = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                log::warn!("Skipping {id}: not a list");
                report.anomalies.push(Anomaly {
                    id,
                    reason: "not a list".into(),
                });
                continue;
            }
            Err(e) => {
                log::warn!("Skipping {id}: invalid JSON: {e}");
                report.anomalies.push(Anomaly {
                    id,
                    reason: format!("invalid JSON: {e}"),
                });
                continue;
            }
        };

        for (i, item) in items.iter().enumerate() {
            let check = serde_json::from_value::<TrackRecord>(item.clone())
                .map_err(|e| e.to_string())
                .and_then(|t| t.validate());
            if let Err(e) = check {
                report.irregular_records += 1;
                log::warn!("{id}: entry {i} is not a valid track record ({e}); merged as-is");
            }
        }
        all_tracks.extend(items);
        report.artifacts_merged += 1;
    }

    report.tracks_merged = all_tracks.len();
    Ok((all_tracks, report))
}

/// Merge all checkpoints into `merged_path`, replacing whatever was there.
pub fn merge<S>(checkpoints: &S, merged_path: &Path) -> Result<MergeReport, MergeError>
where
    S: CheckpointStore + ?Sized,
{
    let (tracks, report) = collect_tracks(checkpoints)?;

    let write_error = |source: AtomicWriteError| MergeError::Write {
        path: merged_path.to_path_buf(),
        source,
    };
    if let Some(parent) = merged_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| write_error(AtomicWriteError::Io(e)))?;
        }
    }
    write_json_atomic(merged_path, &tracks, true).map_err(write_error)?;

    log::info!(
        "Merged {} tracks from {} checkpoints into {}",
        report.tracks_merged,
        report.artifacts_merged,
        merged_path.display()
    );
    Ok(report)
}
