use std::collections::HashSet;

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use crate::batch::{BatchError, BatchStore, InputBatch};
use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::classifier::{ClassifyError, Classifier};
use crate::taxonomy::TrackRecord;

/// Why a single batch failed. Never fatal to the run.
#[derive(Error, Debug)]
pub enum BatchFailure {
    #[error(transparent)]
    Read(#[from] BatchError),
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

/// Filenames that don't line up between a batch and what the service sent back.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FilenameDrift {
    /// Returned by the service but not present in the input.
    pub unknown: Vec<String>,
    /// Present in the input but absent from the response.
    pub missing: Vec<String>,
}

impl FilenameDrift {
    pub fn is_clean(&self) -> bool {
        self.unknown.is_empty() && self.missing.is_empty()
    }
}

#[derive(Debug)]
pub enum BatchOutcome {
    /// Not attempted this run (dry run or limit reached).
    Pending,
    /// Checkpoint already present.
    Skipped,
    Done {
        tracks: usize,
        rejected: usize,
        drift: FilenameDrift,
    },
    /// Service answered but nothing usable came back. No checkpoint written.
    Empty { rejected: usize },
    Failed(BatchFailure),
}

#[derive(Debug)]
pub struct BatchReport {
    pub id: String,
    pub outcome: BatchOutcome,
}

#[derive(Debug, Default)]
pub struct ProcessReport {
    pub batches: Vec<BatchReport>,
}

impl ProcessReport {
    fn count(&self, f: impl Fn(&BatchOutcome) -> bool) -> usize {
        self.batches.iter().filter(|b| f(&b.outcome)).count()
    }

    pub fn total(&self) -> usize {
        self.batches.len()
    }

    pub fn done(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Done { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Skipped))
    }

    pub fn empty(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Empty { .. }))
    }

    pub fn pending(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Pending))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, BatchOutcome::Failed(_)))
    }

    pub fn tracks_written(&self) -> usize {
        self.batches
            .iter()
            .map(|b| match &b.outcome {
                BatchOutcome::Done { tracks, .. } => *tracks,
                _ => 0,
            })
            .sum()
    }

    pub fn rejected_records(&self) -> usize {
        self.batches
            .iter()
            .map(|b| match &b.outcome {
                BatchOutcome::Done { rejected, .. } | BatchOutcome::Empty { rejected } => *rejected,
                _ => 0,
            })
            .sum()
    }

    /// Batches whose returned filenames didn't match their input.
    pub fn drifted(&self) -> impl Iterator<Item = (&str, &FilenameDrift)> {
        self.batches.iter().filter_map(|b| match &b.outcome {
            BatchOutcome::Done { drift, .. } if !drift.is_clean() => Some((b.id.as_str(), drift)),
            _ => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &BatchFailure)> {
        self.batches.iter().filter_map(|b| match &b.outcome {
            BatchOutcome::Failed(e) => Some((b.id.as_str(), e)),
            _ => None,
        })
    }

    pub fn empties(&self) -> impl Iterator<Item = &str> {
        self.batches.iter().filter_map(|b| match &b.outcome {
            BatchOutcome::Empty { .. } => Some(b.id.as_str()),
            _ => None,
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct ProcessOptions {
    /// Report what would be sent without calling the service.
    pub dry_run: bool,
    /// Stop after this many batches have been attempted.
    pub limit: Option<usize>,
    pub show_progress: bool,
}

/// Classify every batch that has no checkpoint yet, one at a time.
///
/// Only a missing input directory is an error; every per-batch problem is
/// recorded in the report and the run moves on.
pub fn process_batches<C, S>(
    store: &BatchStore,
    classifier: &C,
    checkpoints: &mut S,
    options: &ProcessOptions,
) -> Result<ProcessReport, BatchError>
where
    C: Classifier + ?Sized,
    S: CheckpointStore + ?Sized,
{
    let ids = store.list_batches()?;
    let total = ids.len();
    log::info!("{total} batch files found in {}", store.root().display());

    let pb = if options.show_progress {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} batches ({eta}) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
        );
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut report = ProcessReport::default();
    let mut attempted = 0usize;

    for (index, id) in ids.into_iter().enumerate() {
        pb.set_message(id.clone());
        let position = format!("{}/{total}", index + 1);

        let outcome = if checkpoints.exists(&id) {
            log::info!("[{position}] already done: {id}");
            BatchOutcome::Skipped
        } else if options.dry_run || options.limit.is_some_and(|n| attempted >= n) {
            log::info!("[{position}] pending: {id}");
            BatchOutcome::Pending
        } else {
            attempted += 1;
            log::info!("[{position}] classifying {id}");
            match process_one(store, classifier, checkpoints, &id) {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::warn!("Failed to process {id}: {e}");
                    BatchOutcome::Failed(e)
                }
            }
        };

        report.batches.push(BatchReport { id, outcome });
        pb.inc(1);
    }

    pb.finish_with_message(format!(
        "{} done, {} skipped, {} empty, {} failed",
        report.done(),
        report.skipped(),
        report.empty(),
        report.failed()
    ));

    Ok(report)
}

fn process_one<C, S>(
    store: &BatchStore,
    classifier: &C,
    checkpoints: &mut S,
    id: &str,
) -> Result<BatchOutcome, BatchFailure>
where
    C: Classifier + ?Sized,
    S: CheckpointStore + ?Sized,
{
    let batch = store.read_batch(id)?;
    let classified = classifier.classify(&batch)?;

    if classified.tracks.is_empty() {
        log::warn!("Empty result for {id}; no checkpoint written");
        return Ok(BatchOutcome::Empty {
            rejected: classified.rejected,
        });
    }

    let drift = reconcile_filenames(&batch, &classified.tracks);
    for name in &drift.unknown {
        log::warn!("{id}: service returned unknown filename {name:?}");
    }
    if !drift.missing.is_empty() {
        log::warn!("{id}: {} input files missing from response", drift.missing.len());
    }

    checkpoints.write(id, &classified.tracks)?;

    Ok(BatchOutcome::Done {
        tracks: classified.tracks.len(),
        rejected: classified.rejected,
        drift,
    })
}

/// Compare returned filenames against the batch. Records are never altered.
pub fn reconcile_filenames(batch: &InputBatch, tracks: &[TrackRecord]) -> FilenameDrift {
    let input: HashSet<&str> = batch.filenames().into_iter().collect();
    let returned: HashSet<&str> = tracks.iter().map(|t| t.filename.as_str()).collect();

    FilenameDrift {
        unknown: tracks
            .iter()
            .filter(|t| !input.contains(t.filename.as_str()))
            .map(|t| t.filename.clone())
            .collect(),
        missing: batch
            .filenames()
            .into_iter()
            .filter(|f| !returned.contains(f))
            .map(str::to_string)
            .collect(),
    }
}
