/// # train-mirror CLI Interface (Module)
///
/// Command parsing and orchestration for the `train-mirror` binary. All
/// mirroring logic lives in [`train_mirror_core`]; this module only builds a
/// [`SyncConfig`] from flags and the optional YAML file, wires up the HTTP
/// fetcher and reports the outcome.
///
/// For programmatic and integration use, call [`run`] with a constructed
/// [`Cli`].
use crate::load_config::{build_sync_config, load_config, resolve_mirrors, FileConfig, SyncFlags};
use crate::self_update::{check_for_update, UpdateOutcome};
use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use train_mirror_core::config::SyncConfig;
use train_mirror_core::fetch::{MirrorFetcher, MirrorList};
use train_mirror_core::synchronise::SyncEngine;

/// CLI for train-mirror: keep a local mirror of update trains in sync.
#[derive(Debug, Parser)]
#[clap(
    name = "train-mirror",
    version,
    about = "Mirror FreeNAS/TrueNAS style update trains onto local storage"
)]
pub struct Cli {
    /// More log output: -v info, -vv debug, -vvv trace (RUST_LOG wins)
    #[clap(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to an optional YAML config file
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Mirror every configured project into DESTINATION
    Sync {
        /// Project to mirror (repeatable)
        #[clap(short = 'P', long = "project")]
        project: Vec<String>,

        /// Train to mirror in every project, instead of the remote train list (repeatable)
        #[clap(short = 'T', long = "train")]
        train: Vec<String>,

        /// Mirror base URL, tried in the given order (repeatable)
        #[clap(short = 'U', long = "url")]
        url: Vec<String>,

        /// Also mirror historical delta packages
        #[clap(long, overrides_with = "no_deep")]
        deep: bool,

        /// Only mirror full packages
        #[clap(long = "no-deep", overrides_with = "deep")]
        no_deep: bool,

        /// Report what would be fetched and removed without changing anything
        #[clap(long)]
        dry_run: bool,

        /// Concurrent artifact downloads within a train
        #[clap(short = 'j', long = "jobs")]
        jobs: Option<usize>,

        /// Local mirror root
        destination: PathBuf,
    },
    /// Compare this executable with the published copy and offer to update it
    CheckForUpdate {
        /// Mirror base URL, tried in the given order (repeatable)
        #[clap(short = 'U', long = "url")]
        url: Vec<String>,

        /// Update without asking
        #[clap(short, long)]
        yes: bool,
    },
}

/// Log filter used when `RUST_LOG` is unset.
pub fn default_log_level(verbose: u8, file_verbose: bool) -> &'static str {
    match verbose {
        0 if file_verbose => "info",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let file = match &cli.config {
        Some(path) => load_config(path)?,
        None => FileConfig::default(),
    };

    match cli.command {
        Commands::Sync {
            project,
            train,
            url,
            deep,
            no_deep,
            dry_run,
            jobs,
            destination,
        } => {
            let flags = SyncFlags {
                projects: project,
                trains: train,
                mirrors: url,
                deep: if deep {
                    Some(true)
                } else if no_deep {
                    Some(false)
                } else {
                    None
                },
                dry_run,
                jobs,
            };
            let config = build_sync_config(destination, &file, flags);
            config.trace_loaded();
            sync(config).await
        }
        Commands::CheckForUpdate { url, yes } => {
            let mirrors = resolve_mirrors(url, &file);
            tracing::info!(command = "check-for-update", ?mirrors, "Checking for update");
            let fetcher = MirrorFetcher::new(MirrorList::new(&mirrors)?)?;
            let current = std::env::current_exe().context("Could not locate the running executable")?;
            let outcome = check_for_update(
                &fetcher,
                &current,
                io::BufReader::new(io::stdin()),
                io::stdout(),
                yes,
            )
            .await?;
            match outcome {
                UpdateOutcome::Unavailable => println!("No update available"),
                UpdateOutcome::UpToDate => println!("Already up to date"),
                UpdateOutcome::Updated | UpdateOutcome::Declined => {}
            }
            Ok(())
        }
    }
}

async fn sync(config: SyncConfig) -> Result<()> {
    ensure_destination(config.destination())?;
    tracing::info!(command = "sync", "Starting synchronisation process");

    let fetcher = MirrorFetcher::new(MirrorList::new(&config.mirrors)?)?;
    let engine = SyncEngine::new(config, fetcher);
    let report = engine.synchronise().await;
    println!("{report:#?}");

    if report.is_clean() {
        tracing::info!(command = "sync", "Synchronisation complete");
        Ok(())
    } else {
        let failed: Vec<&str> = report
            .failed_projects
            .iter()
            .map(|failed| failed.project.as_str())
            .collect();
        tracing::error!(command = "sync", ?failed, "Synchronisation failed");
        bail!("Synchronisation failed for project(s): {}", failed.join(", "))
    }
}

/// Rejects a destination that exists but is not a directory before any
/// network traffic happens.
fn ensure_destination(destination: &Path) -> Result<()> {
    if destination.exists() && !destination.is_dir() {
        bail!("Destination {} is not a directory", destination.display());
    }
    Ok(())
}
