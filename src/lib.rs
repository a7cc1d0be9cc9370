pub mod batch;
pub mod checkpoint;
pub mod classifier;
pub mod config;
pub mod merge;
pub mod pipeline;
pub mod processor;
pub mod taxonomy;

/// Extension of batch and checkpoint files
pub const BATCH_EXTENSION: &str = "json";

/// Application name for XDG paths
pub const APP_NAME: &str = "crateclass";
