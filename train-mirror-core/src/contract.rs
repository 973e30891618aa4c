#![allow(unused)]

//! # contract: the seam between the sync engine and the network
//!
//! The sync engine never talks HTTP itself. It asks a [`Fetcher`] for
//! resources named by their path relative to a mirror root, e.g.
//! `FreeNAS/trains.txt` or `FreeNAS/Packages/base-os-11.3.tgz`.
//!
//! - [`crate::fetch::MirrorFetcher`] is the production implementation
//!   (ordered mirror list, failover, resumable transfers).
//! - `MockFetcher` is generated by `mockall` for tests, and exported behind
//!   the `test-export-mocks` feature so dependent crates can use it too.
//!
//! Use [`Fetcher::fetch_bytes`] when the body is wanted in memory (indexes,
//! manifests) and [`Fetcher::fetch_to_file`] when it should be streamed to
//! disk.

use std::path::Path;

use async_trait::async_trait;

use mockall::{automock, predicate::*};

use crate::error::FetchError;

/// What a successful [`Fetcher::fetch_to_file`] did to the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// `bytes` were written, starting at offset `resumed_from` (zero unless a
    /// partial file was extended).
    Written { bytes: u64, resumed_from: u64 },
    /// The mirror reported the requested range as unsatisfiable: the partial
    /// file already holds the whole resource. Nothing was written.
    AlreadyComplete,
}

/// Retrieves mirror resources by relative path.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch `relative` and return the whole body.
    async fn fetch_bytes(&self, relative: &str) -> Result<Vec<u8>, FetchError>;

    /// Fetch `relative` into `destination`, creating parent directories as
    /// needed. With `resume`, an existing partial file is extended rather
    /// than replaced and is left in place if the transfer breaks.
    async fn fetch_to_file(
        &self,
        relative: &str,
        destination: &Path,
        resume: bool,
    ) -> Result<FetchOutcome, FetchError>;
}
