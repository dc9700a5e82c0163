mod commands;
mod logging;
mod model;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scorelabel_core::config::CurationConfig;
use scorelabel_core::planner::Strategy;
use scorelabel_core::Curator;

/// Scorelabel: curate quality labels for an image corpus
#[derive(Parser)]
#[command(name = "scorelabel", version, about)]
struct Cli {
    /// Corpus directory holding the images to review
    #[arg(long)]
    corpus: PathBuf,

    /// Record store path (default: <parent>/<corpus-name>.csv)
    #[arg(long)]
    store: Option<PathBuf>,

    /// JSON configuration file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show labeling progress for the corpus
    Status,
    /// Print the review order for a strategy
    Order {
        /// identifier-order, predicted-ascending, predicted-descending or median-distance
        #[arg(long, default_value_t = Strategy::IdentifierOrder)]
        strategy: Strategy,
        /// Only print the first N ids
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Label images interactively from standard input
    Review {
        #[arg(long, default_value_t = Strategy::IdentifierOrder)]
        strategy: Strategy,
        /// Also present images that already carry a label
        #[arg(long)]
        revisit: bool,
        /// Chance of a rolling backup after each label (0-1)
        #[arg(long)]
        snapshot_probability: Option<f64>,
    },
    /// Score every unlabeled image with a linear model artifact
    Predict {
        /// JSON model file with `weights`, `bias` and optional `sigmoid`
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        batch_size: Option<usize>,
        /// Save the store after this many processed images
        #[arg(long)]
        flush_every: Option<usize>,
        /// Fraction of scored images copied to <corpus>_predicted_scores (0-1)
        #[arg(long)]
        preview_fraction: Option<f64>,
    },
    /// Copy human labels into missing or stale predictions
    Backfill,
    /// Manage the rolling backup of the record store
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    /// Save a fresh backup, replacing the previous one
    Snapshot,
    /// Overwrite the record store with its backup
    Restore,
}

fn load_config(path: Option<&Path>) -> Result<CurationConfig> {
    match path {
        Some(path) => CurationConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display())),
        None => Ok(CurationConfig::default()),
    }
}

fn open(cli: &Cli, config: CurationConfig) -> Result<Curator> {
    let curator = match &cli.store {
        Some(store) => Curator::open_with_store(&cli.corpus, store, config)?,
        None => Curator::open(&cli.corpus, config)?,
    };
    Ok(curator)
}

fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match &cli.command {
        Commands::Status => commands::status::run(&open(&cli, config)?)?,
        Commands::Order { strategy, limit } => {
            commands::order::run(&open(&cli, config)?, *strategy, *limit)?
        }
        Commands::Review {
            strategy,
            revisit,
            snapshot_probability,
        } => {
            if *revisit {
                config.skip_labeled = false;
            }
            if let Some(p) = snapshot_probability {
                config.snapshot_probability = *p;
            }
            commands::review::run(open(&cli, config)?, *strategy)?
        }
        Commands::Predict {
            model,
            batch_size,
            flush_every,
            preview_fraction,
        } => {
            if let Some(n) = batch_size {
                config.batch_size = *n;
            }
            if let Some(n) = flush_every {
                config.flush_every = *n;
            }
            if let Some(f) = preview_fraction {
                config.preview_fraction = *f;
            }
            commands::predict::run(&mut open(&cli, config)?, model)?
        }
        Commands::Backfill => commands::backfill::run(&mut open(&cli, config)?)?,
        Commands::Backup { action } => match action {
            BackupAction::Snapshot => commands::backup::snapshot(&mut open(&cli, config)?)?,
            BackupAction::Restore => {
                let store_path = match &cli.store {
                    Some(store) => store.clone(),
                    None => scorelabel_core::store::store_path_for(&cli.corpus),
                };
                commands::backup::restore(&store_path)?
            }
        },
    }

    Ok(())
}
