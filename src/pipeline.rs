use std::path::Path;

use thiserror::Error;

use crate::batch::{BatchError, BatchStore};
use crate::checkpoint::CheckpointStore;
use crate::classifier::Classifier;
use crate::merge::{MergeError, MergeReport, merge};
use crate::processor::{ProcessOptions, ProcessReport, process_batches};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Process(#[from] BatchError),
    #[error(transparent)]
    Merge(#[from] MergeError),
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub process: ProcessReport,
    /// `None` when the merge was not performed (dry run).
    pub merge: Option<MergeReport>,
}

/// Both phases back to back: classify pending batches, then rebuild the
/// merged library from every checkpoint. A dry run stops after phase one
/// and leaves the merged file alone.
pub fn run_pipeline<C, S>(
    store: &BatchStore,
    classifier: &C,
    checkpoints: &mut S,
    merged_path: &Path,
    options: &ProcessOptions,
) -> Result<RunReport, PipelineError>
where
    C: Classifier + ?Sized,
    S: CheckpointStore + ?Sized,
{
    let process = process_batches(store, classifier, checkpoints, options)?;

    if options.dry_run {
        log::info!("Dry run: not merging into {}", merged_path.display());
        return Ok(RunReport {
            process,
            merge: None,
        });
    }

    let merged = merge(&*checkpoints, merged_path)?;
    Ok(RunReport {
        process,
        merge: Some(merged),
    })
}
