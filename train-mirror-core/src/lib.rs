#![doc = "train-mirror-core: core logic library for train-mirror."]

//! This crate contains the data model and pipeline for mirroring
//! manifest-described update trains onto local storage.
//!
//! # Modules
//! - [`manifest`]: `LATEST` manifests and the `trains.txt` index
//! - [`enumerate`]: the artifacts a manifest requires
//! - [`contract`] / [`fetch`]: the [`contract::Fetcher`] seam and its HTTP mirror implementation
//! - [`inventory`]: the stale-candidate baseline built from the previous pass
//! - [`synchronise`]: the [`synchronise::SyncEngine`] tying it all together
//!
//! # Usage
//! Build a [`config::SyncConfig`], a [`fetch::MirrorFetcher`] over its mirrors,
//! and call [`synchronise::SyncEngine::synchronise`].

pub mod config;
pub mod contract;
pub mod enumerate;
pub mod error;
pub mod fetch;
pub mod inventory;
pub mod manifest;
pub mod synchronise;
