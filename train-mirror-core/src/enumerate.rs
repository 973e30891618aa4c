//! Expands a manifest into the relative paths of every artifact it needs.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use tracing::warn;

use crate::manifest::Manifest;

/// Prefix of the package tarballs, the only artifacts large enough to resume.
pub const PACKAGES_PREFIX: &str = "Packages/";

/// A file required by a manifest, relative to the project's archive root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactPath {
    relative: String,
    resumable: bool,
}

impl ArtifactPath {
    pub fn new(relative: impl Into<String>) -> Self {
        let relative = relative.into();
        let resumable = relative.starts_with(PACKAGES_PREFIX);
        ArtifactPath {
            relative,
            resumable,
        }
    }

    pub fn relative(&self) -> &str {
        &self.relative
    }

    pub fn resumable(&self) -> bool {
        self.resumable
    }

    /// The artifact's location under `root`.
    pub fn resolve(&self, root: &Path) -> PathBuf {
        root.join(&self.relative)
    }
}

/// True when `relative` names something strictly below the directory it is
/// joined onto: non-empty, not absolute, and made only of plain components
/// (no `.`, `..`, root or prefix).
pub fn is_contained(relative: &str) -> bool {
    let path = Path::new(relative);
    path.components().next().is_some()
        && path.components().all(|c| matches!(c, Component::Normal(_)))
}

/// True when `name` can be used as a single directory under an archive root.
pub fn is_train_name(name: &str) -> bool {
    is_contained(name) && Path::new(name).components().count() == 1
}

/// Lists the artifacts `manifest` requires: notes, validators, package
/// tarballs and, when `deep` is set, each package's delta tarballs right
/// after the package itself.
///
/// Each path appears once, at its first position. Paths that would resolve
/// outside the archive root are dropped.
pub fn enumerate(manifest: &Manifest, deep: bool) -> Vec<ArtifactPath> {
    let mut artifacts = Vec::new();

    for file in manifest.notes.values() {
        artifacts.push(ArtifactPath::new(format!(
            "{}/Notes/{}",
            manifest.train, file
        )));
    }

    for checker in manifest.checkers() {
        artifacts.push(ArtifactPath::new(format!("Validators/{}", checker.name)));
    }

    for package in &manifest.packages {
        artifacts.push(ArtifactPath::new(format!(
            "{PACKAGES_PREFIX}{}-{}.tgz",
            package.name, package.version
        )));
        if deep {
            for upgrade in &package.upgrades {
                artifacts.push(ArtifactPath::new(format!(
                    "{PACKAGES_PREFIX}{}-{}-{}.tgz",
                    package.name, upgrade.version, package.version
                )));
            }
        }
    }

    let mut seen = HashSet::new();
    artifacts.retain(|artifact| {
        if !is_contained(artifact.relative()) {
            warn!(
                train = %manifest.train,
                path = artifact.relative(),
                "[SYNC] Ignoring manifest entry that escapes the archive"
            );
            return false;
        }
        seen.insert(artifact.relative.clone())
    });
    artifacts
}
