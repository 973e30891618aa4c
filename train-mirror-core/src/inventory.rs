//! Baseline of previously synced files: the stale-candidate set.
//!
//! The inventory replays each train's *local* `LATEST` through
//! [`crate::enumerate::enumerate`] to find what the previous pass put on
//! disk. During a pass the sync engine marks paths live as it confirms them;
//! whatever is still a candidate at the end is swept.
//!
//! Marking only ever removes candidates, so a path confirmed live cannot be
//! swept later in the same pass.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::enumerate::{enumerate, is_train_name};
use crate::manifest::{Manifest, TrainIndex, CHANGELOG_FILE, LATEST_FILE, TRAINS_FILE};

#[derive(Debug, Clone, Default)]
pub struct Inventory {
    candidates: BTreeSet<PathBuf>,
    by_train: BTreeMap<String, Vec<PathBuf>>,
}

impl Inventory {
    /// Builds the baseline for one project archive.
    ///
    /// Without `explicit_trains` the train list comes from the local
    /// `trains.txt`; if that file cannot be read this is a first sync and the
    /// inventory is empty. A train whose local manifest is missing or
    /// unreadable contributes nothing, and so does a train whose name is not
    /// a single plain directory name.
    pub fn build(archive_root: &Path, explicit_trains: Option<&[String]>, deep: bool) -> Self {
        let mut inventory = Inventory::default();

        let trains: Vec<String> = match explicit_trains {
            Some(trains) => trains.to_vec(),
            None => {
                let index_path = archive_root.join(TRAINS_FILE);
                match fs::read(&index_path) {
                    Ok(bytes) => {
                        inventory.candidates.insert(index_path);
                        TrainIndex::from_bytes(&bytes).into_trains()
                    }
                    Err(e) => {
                        debug!(
                            path = %index_path.display(),
                            error = %e,
                            "[INVENTORY] No local train index, starting from an empty baseline"
                        );
                        return inventory;
                    }
                }
            }
        };

        for train in &trains {
            if !is_train_name(train) {
                warn!(train = %train, "[INVENTORY] Ignoring train name that escapes the archive");
                continue;
            }
            let manifest_path = archive_root.join(train).join(LATEST_FILE);
            let manifest = match fs::read(&manifest_path) {
                Ok(bytes) => match Manifest::parse(&bytes, manifest_path.display().to_string()) {
                    Ok(manifest) => manifest,
                    Err(e) => {
                        warn!(train = %train, error = %e, "[INVENTORY] Local manifest unreadable, train contributes no entries");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(
                        train = %train,
                        path = %manifest_path.display(),
                        error = %e,
                        "[INVENTORY] No local manifest for train"
                    );
                    continue;
                }
            };

            let mut paths: Vec<PathBuf> = enumerate(&manifest, deep)
                .iter()
                .map(|artifact| artifact.resolve(archive_root))
                .collect();
            paths.push(manifest_path);
            paths.push(archive_root.join(train).join(CHANGELOG_FILE));

            for path in &paths {
                debug!(path = %path.display(), "[INVENTORY] Found existing file");
            }
            inventory.candidates.extend(paths.iter().cloned());
            inventory.by_train.insert(train.clone(), paths);
        }

        info!(
            archive = %archive_root.display(),
            trains = inventory.by_train.len(),
            candidates = inventory.candidates.len(),
            "[INVENTORY] Built baseline"
        );
        inventory
    }

    /// Confirms `path` is wanted by the current pass. Returns whether it was a
    /// candidate.
    pub fn mark_live(&mut self, path: &Path) -> bool {
        self.candidates.remove(path)
    }

    /// Marks every path the previous manifest of `train` contributed, used
    /// when the train could not be synced this time. Returns how many
    /// candidates were marked.
    pub fn retain_train(&mut self, train: &str) -> usize {
        let Some(paths) = self.by_train.get(train) else {
            return 0;
        };
        paths
            .iter()
            .filter(|path| self.candidates.remove(path.as_path()))
            .count()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.candidates.contains(path)
    }

    pub fn candidates(&self) -> impl Iterator<Item = &PathBuf> {
        self.candidates.iter()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Consumes the inventory, yielding the paths nothing marked live.
    pub fn into_stale(self) -> Vec<PathBuf> {
        self.candidates.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    const STABLE: &str = r#"{"Train": "stable", "Packages": [{"Name": "base", "Version": "2", "Upgrades": [{"Version": "1"}]}]}"#;

    #[test]
    fn missing_train_index_gives_empty_inventory() {
        let dir = tempdir().unwrap();
        let inventory = Inventory::build(dir.path(), None, false);
        assert!(inventory.is_empty());
    }

    #[test]
    fn replays_local_manifests_listed_in_train_index() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(&root.join("trains.txt"), "stable\tStable\n");
        write(&root.join("stable/LATEST"), STABLE);

        let inventory = Inventory::build(root, None, false);
        let expected: BTreeSet<PathBuf> = [
            root.join("trains.txt"),
            root.join("stable/LATEST"),
            root.join("stable/ChangeLog.txt"),
            root.join("Packages/base-2.tgz"),
        ]
        .into_iter()
        .collect();
        assert_eq!(inventory.candidates().cloned().collect::<BTreeSet<_>>(), expected);

        let deep = Inventory::build(root, None, true);
        assert!(deep.contains(&root.join("Packages/base-1-2.tgz")));
    }

    #[test]
    fn explicit_trains_skip_the_index() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(&root.join("stable/LATEST"), STABLE);

        let inventory = Inventory::build(root, Some(&["stable".to_string()]), false);
        assert!(!inventory.contains(&root.join("trains.txt")));
        assert!(inventory.contains(&root.join("Packages/base-2.tgz")));
    }

    #[test]
    fn unparsable_manifest_contributes_nothing() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(&root.join("trains.txt"), "stable\nbroken\n");
        write(&root.join("stable/LATEST"), STABLE);
        write(&root.join("broken/LATEST"), "{not json");

        let inventory = Inventory::build(root, None, false);
        assert!(!inventory.contains(&root.join("broken/LATEST")));
        assert!(inventory.contains(&root.join("stable/LATEST")));
    }

    #[test]
    fn paths_outside_the_archive_never_become_candidates() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("FreeNAS");
        write(&root.join("trains.txt"), "stable\n../outside\n");
        write(
            &root.join("stable/LATEST"),
            r#"{"Train": "stable", "Packages": [{"Name": "../../victim", "Version": "1"}]}"#,
        );
        write(&dir.path().join("outside/LATEST"), STABLE);

        let inventory = Inventory::build(&root, None, false);

        for path in inventory.candidates() {
            assert!(path.starts_with(&root), "{}", path.display());
            assert!(!path.to_string_lossy().contains(".."), "{}", path.display());
        }
        assert!(inventory.contains(&root.join("stable/LATEST")));
        assert!(!inventory.contains(&root.join("../outside/LATEST")));
    }

    #[test]
    fn marking_is_monotonic_and_retain_train_marks_its_paths() {
        let dir = tempdir().unwrap();
        let root = dir.path();
        write(&root.join("stable/LATEST"), STABLE);
        let mut inventory = Inventory::build(root, Some(&["stable".to_string()]), false);
        let before = inventory.len();

        assert!(inventory.mark_live(&root.join("Packages/base-2.tgz")));
        assert!(!inventory.mark_live(&root.join("Packages/base-2.tgz")));
        assert_eq!(inventory.len(), before - 1);

        assert_eq!(inventory.retain_train("stable"), before - 1);
        assert_eq!(inventory.retain_train("unknown"), 0);
        assert!(inventory.into_stale().is_empty());
    }
}
