//! Error taxonomy for fetching, manifest parsing and project synchronisation.
//!
//! Callers tell "skip and continue" apart from "abort" by the type they get
//! back: [`FetchError`] and [`ManifestParseError`] are caught per artifact or
//! per train inside the sync engine, while [`SyncError`] is what escapes
//! [`crate::synchronise::SyncEngine::sync_project`].
//!
//! A resume request that finds the file already complete is not an error at
//! all; it comes back as [`crate::contract::FetchOutcome::AlreadyComplete`].

use std::path::PathBuf;

use thiserror::Error;

/// Failure to retrieve a resource from the mirror list.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("no mirror URLs configured")]
    NoMirrors,

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// No base URL satisfied the request.
    #[error("all {attempts} mirror(s) failed for {path}: {last_error}")]
    MirrorExhausted {
        path: String,
        attempts: usize,
        last_error: String,
    },

    /// The body stream broke after a mirror had answered.
    #[error("transfer of {path} interrupted after {written} byte(s): {reason}")]
    Interrupted {
        path: String,
        written: u64,
        reason: String,
    },

    #[error("filesystem error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FetchError::Io {
            path: path.into(),
            source,
        }
    }
}

/// A `LATEST` document that is not valid JSON or lacks a required field.
#[derive(Debug, Error)]
#[error("could not parse manifest {origin}: {source}")]
pub struct ManifestParseError {
    /// Where the bytes came from, e.g. `FreeNAS/FreeNAS-11-STABLE/LATEST`.
    pub origin: String,
    #[source]
    pub source: serde_json::Error,
}

/// Errors that abort a single project's sync pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The remote `trains.txt` could not be fetched and no explicit train
    /// list was given, so there is nothing to sync.
    #[error("train index for project {project} unavailable: {source}")]
    TrainIndexUnavailable {
        project: String,
        #[source]
        source: FetchError,
    },

    #[error("archive root {} is unusable: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
