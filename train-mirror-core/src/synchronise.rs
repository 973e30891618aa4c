//! Project synchronisation: trains → manifests → artifacts → sweep.
//!
//! [`SyncEngine`] mirrors each configured project into
//! `<destination>/<project>`:
//!
//!   1. builds the stale-candidate [`Inventory`] from the previous local state
//!   2. resolves the trains (explicit list, or the remote `trains.txt`)
//!   3. per train: fetches and parses `LATEST`, fetches every missing or
//!      resumable artifact, stores `LATEST` and the train's changelog
//!   4. deletes whatever the inventory still holds
//!
//! # Error Handling
//! Per-artifact and per-train failures are logged, recorded in the
//! [`ProjectReport`] and never abort sibling work. The only error that leaves
//! [`SyncEngine::sync_project`] is an unavailable train index (or an unusable
//! archive root). A train or artifact that failed keeps its previous files:
//! failures never cause pruning.
//!
//! # Concurrency
//! Trains are processed one after another. Within a train up to
//! `max_parallel_fetches` artifact downloads run at once, and their results
//! are applied in enumeration order. The sweep starts only after every train
//! has finished.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::SyncConfig;
use crate::contract::{FetchOutcome, Fetcher};
use crate::enumerate::{enumerate, is_train_name};
use crate::error::SyncError;
use crate::inventory::Inventory;
use crate::manifest::{Manifest, TrainIndex, CHANGELOG_FILE, LATEST_FILE, TRAINS_FILE};

/// Outcome of a full run over all configured projects.
#[derive(Debug, Default)]
pub struct SynchroniseReport {
    pub projects: Vec<ProjectReport>,
    pub failed_projects: Vec<FailedProject>,
}

impl SynchroniseReport {
    /// True when every project ran to completion.
    pub fn is_clean(&self) -> bool {
        self.failed_projects.is_empty()
    }
}

#[derive(Debug)]
pub struct FailedProject {
    pub project: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct ProjectReport {
    pub project: String,
    pub trains_synced: Vec<String>,
    pub trains_skipped: Vec<SkippedTrain>,
    pub fetched: Vec<FetchedArtifact>,
    /// Artifacts already on disk: existing small files and complete
    /// resumable ones.
    pub already_present: usize,
    pub failed: Vec<FailedArtifact>,
    pub removed: Vec<PathBuf>,
    pub remove_failed: Vec<FailedRemoval>,
    pub would_fetch: Vec<String>,
    pub would_remove: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedTrain {
    pub train: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The name is not a single plain directory name, e.g. `..` or `/tmp/x`.
    InvalidTrainName,
    ManifestUnavailable(String),
    ManifestInvalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtifact {
    pub path: String,
    pub bytes: u64,
    pub resumed_from: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedArtifact {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedRemoval {
    pub path: PathBuf,
    pub error: String,
}

pub struct SyncEngine<F> {
    config: SyncConfig,
    fetcher: F,
}

impl<F> SyncEngine<F>
where
    F: Fetcher,
{
    pub fn new(config: SyncConfig, fetcher: F) -> Self {
        SyncEngine { config, fetcher }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Syncs every configured project in order. A project that fails is
    /// recorded and the next one still runs.
    pub async fn synchronise(&self) -> SynchroniseReport {
        info!(
            projects = ?self.config.projects,
            deep = self.config.deep,
            dry_run = self.config.dry_run,
            "[SYNC] Starting synchronisation"
        );
        let mut report = SynchroniseReport::default();

        for project in &self.config.projects {
            let result = self
                .sync_project(project, self.config.trains.as_deref(), self.config.deep)
                .instrument(info_span!("sync_project", project = %project))
                .await;
            match result {
                Ok(project_report) => {
                    info!(
                        project = %project,
                        trains = project_report.trains_synced.len(),
                        fetched = project_report.fetched.len(),
                        removed = project_report.removed.len(),
                        failed = project_report.failed.len(),
                        "[SYNC] Project synchronised"
                    );
                    report.projects.push(project_report);
                }
                Err(e) => {
                    error!(project = %project, error = %e, "[SYNC][ERROR] Project sync failed");
                    report.failed_projects.push(FailedProject {
                        project: project.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Mirrors one project into `<destination>/<project>`.
    pub async fn sync_project(
        &self,
        project: &str,
        explicit_trains: Option<&[String]>,
        deep: bool,
    ) -> Result<ProjectReport, SyncError> {
        let archive = self.config.archive_root(project);
        let dry_run = self.config.dry_run;
        let mut report = ProjectReport {
            project: project.to_string(),
            ..ProjectReport::default()
        };

        if !dry_run {
            fs::create_dir_all(&archive).map_err(|source| SyncError::Filesystem {
                path: archive.clone(),
                source,
            })?;
        }

        // Built before trains.txt is replaced, so trains dropped from the
        // index are part of the baseline and get swept.
        let mut inventory = Inventory::build(&archive, explicit_trains, deep);

        let trains = match explicit_trains {
            Some(trains) => trains.to_vec(),
            None => {
                let relative = format!("{project}/{TRAINS_FILE}");
                let bytes = self.fetcher.fetch_bytes(&relative).await.map_err(|source| {
                    error!(project = %project, error = %source, "[SYNC][ERROR] Could not fetch train index");
                    SyncError::TrainIndexUnavailable {
                        project: project.to_string(),
                        source,
                    }
                })?;

                let index_path = archive.join(TRAINS_FILE);
                if dry_run {
                    info!(path = %index_path.display(), "[SYNC][DRY-RUN] Would write train index");
                } else if let Err(e) = write_file(&index_path, &bytes) {
                    error!(path = %index_path.display(), error = %e, "[SYNC][ERROR] Failed to store train index");
                }
                inventory.mark_live(&index_path);
                TrainIndex::from_bytes(&bytes).into_trains()
            }
        };
        info!(project = %project, trains = ?trains, "[SYNC] Resolved trains");

        for train in &trains {
            self.sync_train(project, &archive, train, deep, &mut inventory, &mut report)
                .await;
        }

        self.sweep(inventory, &mut report);
        Ok(report)
    }

    async fn sync_train(
        &self,
        project: &str,
        archive: &Path,
        train: &str,
        deep: bool,
        inventory: &mut Inventory,
        report: &mut ProjectReport,
    ) {
        let dry_run = self.config.dry_run;
        if !is_train_name(train) {
            warn!(project = %project, train = %train, "[SYNC] Train name escapes the archive, skipping train");
            inventory.retain_train(train);
            report.trains_skipped.push(SkippedTrain {
                train: train.to_string(),
                reason: SkipReason::InvalidTrainName,
            });
            return;
        }
        let latest_relative = format!("{project}/{train}/{LATEST_FILE}");

        let manifest_bytes = match self.fetcher.fetch_bytes(&latest_relative).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(project = %project, train = %train, error = %e, "[SYNC] Could not get manifest, skipping train");
                let kept = inventory.retain_train(train);
                debug!(train = %train, kept, "[SYNC] Kept previous files of skipped train");
                report.trains_skipped.push(SkippedTrain {
                    train: train.to_string(),
                    reason: SkipReason::ManifestUnavailable(e.to_string()),
                });
                return;
            }
        };

        let manifest = match Manifest::parse(&manifest_bytes, latest_relative.as_str()) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(project = %project, train = %train, error = %e, "[SYNC] Manifest did not parse, skipping train");
                inventory.retain_train(train);
                report.trains_skipped.push(SkippedTrain {
                    train: train.to_string(),
                    reason: SkipReason::ManifestInvalid(e.to_string()),
                });
                return;
            }
        };

        let artifacts = enumerate(&manifest, deep);
        info!(train = %train, artifacts = artifacts.len(), deep, "[SYNC] Enumerated manifest");

        let mut pending = Vec::new();
        for artifact in artifacts {
            let local = artifact.resolve(archive);
            if !artifact.resumable() && local.exists() {
                debug!(path = artifact.relative(), "[SYNC] Not downloading, already exists");
                inventory.mark_live(&local);
                report.already_present += 1;
            } else if dry_run {
                info!(path = artifact.relative(), "[SYNC][DRY-RUN] Would download");
                inventory.mark_live(&local);
                report.would_fetch.push(artifact.relative().to_string());
            } else {
                pending.push((artifact, local));
            }
        }

        let parallel = self.config.max_parallel_fetches.max(1);
        let results: Vec<_> = stream::iter(pending.into_iter().map(|(artifact, local)| async move {
            let relative = format!("{project}/{}", artifact.relative());
            let outcome = self
                .fetcher
                .fetch_to_file(&relative, &local, artifact.resumable())
                .await;
            (artifact, local, outcome)
        }))
        .buffered(parallel)
        .collect()
        .await;

        for (artifact, local, outcome) in results {
            // Marked live whatever happened: a failed fetch must not turn the
            // file already on disk into a sweep candidate.
            inventory.mark_live(&local);
            match outcome {
                Ok(FetchOutcome::Written {
                    bytes,
                    resumed_from,
                }) => report.fetched.push(FetchedArtifact {
                    path: artifact.relative().to_string(),
                    bytes,
                    resumed_from,
                }),
                Ok(FetchOutcome::AlreadyComplete) => {
                    debug!(path = artifact.relative(), "[SYNC] Already complete");
                    report.already_present += 1;
                }
                Err(e) => {
                    error!(path = artifact.relative(), error = %e, "[SYNC][ERROR] Artifact fetch failed");
                    report.failed.push(FailedArtifact {
                        path: artifact.relative().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let train_dir = archive.join(train);
        let latest_path = train_dir.join(LATEST_FILE);
        if dry_run {
            info!(path = %latest_path.display(), "[SYNC][DRY-RUN] Would store manifest");
        } else if let Err(e) = write_file(&latest_path, &manifest_bytes) {
            error!(path = %latest_path.display(), error = %e, "[SYNC][ERROR] Failed to store manifest");
        }
        inventory.mark_live(&latest_path);

        let changelog_path = train_dir.join(CHANGELOG_FILE);
        if !dry_run {
            let relative = format!("{project}/{train}/{CHANGELOG_FILE}");
            if let Err(e) = self
                .fetcher
                .fetch_to_file(&relative, &changelog_path, false)
                .await
            {
                debug!(train = %train, error = %e, "[SYNC] No changelog for train");
            }
        }
        inventory.mark_live(&changelog_path);

        report.trains_synced.push(train.to_string());
    }

    /// Deletes every path the pass did not mark live.
    fn sweep(&self, inventory: Inventory, report: &mut ProjectReport) {
        for path in inventory.into_stale() {
            if self.config.dry_run {
                info!(path = %path.display(), "[SWEEP][DRY-RUN] Would remove stale file");
                report.would_remove.push(path);
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "[SWEEP] Removed stale file");
                    report.removed.push(path);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "[SWEEP] Stale file already gone");
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "[SWEEP][ERROR] Failed to remove stale file");
                    report.remove_failed.push(FailedRemoval {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)
}
