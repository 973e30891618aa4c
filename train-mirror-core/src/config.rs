use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const DEFAULT_MIRRORS: [&str; 2] = ["http://update.freenas.org", "http://update-master.freenas.org"];
pub const DEFAULT_PROJECTS: [&str; 2] = ["FreeNAS", "TrueNAS"];

/// Everything one sync run needs. Built once by the caller and handed to
/// [`crate::synchronise::SyncEngine::new`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Local mirror root; each project lives in `<destination>/<project>`.
    pub destination: PathBuf,
    pub mirrors: Vec<String>,
    pub projects: Vec<String>,
    /// Trains to sync in every project. `None` means "whatever the remote
    /// `trains.txt` lists".
    pub trains: Option<Vec<String>>,
    /// Also fetch each package's historical delta tarballs.
    pub deep: bool,
    /// Log and report actions without touching the network for artifacts or
    /// the archive on disk.
    pub dry_run: bool,
    /// Upper bound on concurrent artifact fetches within one train.
    pub max_parallel_fetches: usize,
}

impl SyncConfig {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        SyncConfig {
            destination: destination.into(),
            mirrors: DEFAULT_MIRRORS.iter().map(|m| m.to_string()).collect(),
            projects: DEFAULT_PROJECTS.iter().map(|p| p.to_string()).collect(),
            trains: None,
            deep: false,
            dry_run: false,
            max_parallel_fetches: 1,
        }
    }

    pub fn archive_root(&self, project: &str) -> PathBuf {
        self.destination.join(project)
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn trace_loaded(&self) {
        info!(
            destination = %self.destination.display(),
            mirrors = self.mirrors.len(),
            projects = ?self.projects,
            deep = self.deep,
            dry_run = self.dry_run,
            "Loaded SyncConfig"
        );
        debug!(?self, "SyncConfig loaded (full debug)");
    }
}
