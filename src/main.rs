use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use crateclass::batch::BatchStore;
use crateclass::checkpoint::{CheckpointStore, FsCheckpointStore};
use crateclass::classifier::ChatClassifier;
use crateclass::config::AppConfig;
use crateclass::merge::{MergeReport, merge};
use crateclass::pipeline::run_pipeline;
use crateclass::processor::{ProcessOptions, ProcessReport, process_batches};
use crateclass::taxonomy::MainGenre;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "crateclass", version, about = "DJ library classifier")]
struct Cli {
    /// Path to the config file (defaults to ~/.config/crateclass/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ProcessArgs {
    /// Directory of input batch files
    #[arg(long)]
    input: Option<PathBuf>,

    /// Directory for per-batch results
    #[arg(long)]
    output: Option<PathBuf>,

    /// Stop after this many batches have been sent
    #[arg(short = 'n', long)]
    limit: Option<usize>,

    /// Dry run: list pending batches without calling the service
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify every pending batch, then merge all results
    Run {
        #[command(flatten)]
        process: ProcessArgs,

        /// Merged library file
        #[arg(long)]
        merged: Option<PathBuf>,
    },

    /// Classify pending batches only
    Process {
        #[command(flatten)]
        process: ProcessArgs,
    },

    /// Merge existing per-batch results into the library file
    Merge {
        /// Directory of per-batch results
        #[arg(long)]
        output: Option<PathBuf>,

        /// Merged library file
        #[arg(long)]
        merged: Option<PathBuf>,
    },

    /// Show how many batches are done and pending
    Status {
        /// Directory of input batch files
        #[arg(long)]
        input: Option<PathBuf>,

        /// Directory for per-batch results
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the genre list and the instruction text sent with each batch
    Taxonomy,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = AppConfig::load(cli.config.as_deref());

    match cli.command {
        Commands::Run { process, merged } => {
            let merged = merged.unwrap_or(config.merged_file.clone());
            run_all(&config, process, &merged)?;
        }

        Commands::Process { process } => {
            run_process(&config, process)?;
        }

        Commands::Merge { output, merged } => {
            let output = output.unwrap_or(config.output_dir.clone());
            let merged = merged.unwrap_or(config.merged_file.clone());
            run_merge(&output, &merged)?;
        }

        Commands::Status { input, output } => {
            let input = input.unwrap_or(config.input_dir.clone());
            let output = output.unwrap_or(config.output_dir.clone());
            let ids = BatchStore::new(&input)
                .list_batches()
                .context("Failed to list input batches")?;
            let checkpoints = FsCheckpointStore::new(&output);
            let done = ids.iter().filter(|id| checkpoints.exists(id)).count();
            let orphans = checkpoints
                .list()
                .context("Failed to list checkpoints")?
                .iter()
                .filter(|id| !ids.contains(id))
                .count();

            println!("Input batches:  {} ({})", ids.len(), input.display());
            println!("Classified:     {} ({})", done, output.display());
            println!("Pending:        {}", ids.len() - done);
            if orphans > 0 {
                println!("Orphaned results (no matching input): {}", orphans);
            }
        }

        Commands::Taxonomy => {
            println!("Main genres:");
            for g in MainGenre::ALL {
                println!("  {:<14} {}", g.code(), g.description());
            }
            println!();
            let instructions = config
                .service
                .instructions()
                .context("Failed to load instructions")?;
            println!("{instructions}");
        }
    }

    Ok(())
}

/// Input and output stores plus a classifier, as the process args select them.
fn open_phase_one(
    config: &AppConfig,
    args: &ProcessArgs,
) -> Result<(BatchStore, FsCheckpointStore, ChatClassifier, ProcessOptions)> {
    let input = args.input.clone().unwrap_or(config.input_dir.clone());
    let output = args.output.clone().unwrap_or(config.output_dir.clone());

    // A dry run never sends a request, so a missing key is fine
    let api_key = std::env::var(&config.service.api_key_env)
        .ok()
        .or_else(|| args.dry_run.then(|| "dry-run".to_string()));
    let settings = config
        .service
        .chat_settings(api_key)
        .context("Invalid service configuration")?;

    if args.dry_run {
        println!("DRY RUN — nothing will be sent to the service");
    }

    let options = ProcessOptions {
        dry_run: args.dry_run,
        limit: args.limit,
        show_progress: true,
    };
    Ok((
        BatchStore::new(input),
        FsCheckpointStore::new(output),
        ChatClassifier::new(settings),
        options,
    ))
}

/// Phase 1: classify pending batches and print a summary.
fn run_process(config: &AppConfig, args: ProcessArgs) -> Result<()> {
    let (store, mut checkpoints, classifier, options) = open_phase_one(config, &args)?;
    let report = process_batches(&store, &classifier, &mut checkpoints, &options)
        .with_context(|| format!("Cannot process batches from {}", store.root().display()))?;

    print_process_report(&report);
    Ok(())
}

/// Both phases. A dry run skips the merge so the library file is left as is.
fn run_all(config: &AppConfig, args: ProcessArgs, merged: &Path) -> Result<()> {
    let (store, mut checkpoints, classifier, options) = open_phase_one(config, &args)?;
    let report = run_pipeline(&store, &classifier, &mut checkpoints, merged, &options)
        .with_context(|| format!("Run over {} failed", store.root().display()))?;

    print_process_report(&report.process);
    println!("{}", "-".repeat(40));
    match &report.merge {
        Some(merge_report) => print_merge_report(merge_report, merged),
        None => println!("Dry run: merge skipped, {} not modified", merged.display()),
    }
    Ok(())
}

/// Phase 2: merge every checkpoint into the library file and print a summary.
fn run_merge(output: &Path, merged: &Path) -> Result<()> {
    let checkpoints = FsCheckpointStore::new(output);
    let report = merge(&checkpoints, merged).context("Merge failed")?;
    print_merge_report(&report, merged);
    Ok(())
}

fn print_process_report(report: &ProcessReport) {
    println!();
    println!(
        "Processing complete: {} batches — {} classified, {} skipped, {} empty, {} failed, {} pending",
        report.total(),
        report.done(),
        report.skipped(),
        report.empty(),
        report.failed(),
        report.pending()
    );
    println!("Tracks written: {}", report.tracks_written());
    if report.rejected_records() > 0 {
        println!("Records rejected (invalid genre/energy): {}", report.rejected_records());
    }

    let drifted: Vec<_> = report.drifted().collect();
    if !drifted.is_empty() {
        println!();
        println!("Filename mismatches (records kept as returned):");
        for (id, drift) in drifted {
            println!(
                "  {:<30} {} unknown, {} missing",
                id,
                drift.unknown.len(),
                drift.missing.len()
            );
        }
    }

    let empties: Vec<_> = report.empties().collect();
    if !empties.is_empty() {
        println!();
        println!("Empty results (will be retried next run):");
        for id in empties {
            println!("  {id}");
        }
    }

    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        println!();
        println!("Failed batches (will be retried next run):");
        for (id, err) in failures {
            println!("  {:<30} {}", id, err);
        }
    }
}

fn print_merge_report(report: &MergeReport, merged: &Path) {
    println!(
        "Merge complete: {} files merged, {} tracks in library",
        report.artifacts_merged, report.tracks_merged
    );
    if report.irregular_records > 0 {
        println!(
            "Entries merged as-is but not valid track records: {}",
            report.irregular_records
        );
    }
    for a in &report.anomalies {
        println!("  skipped {:<30} {}", a.id, a.reason);
    }
    println!("Library written to {}", merged.display());
}
