//! Typed model of a train manifest (`LATEST`) and of the `trains.txt` index.
//!
//! Nothing in here performs I/O; bytes come in from the fetcher or from disk
//! and typed values come out.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ManifestParseError;

/// Per-project train index.
pub const TRAINS_FILE: &str = "trains.txt";
/// Per-train manifest.
pub const LATEST_FILE: &str = "LATEST";
pub const CHANGELOG_FILE: &str = "ChangeLog.txt";

/// Ordered list of train names for one project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainIndex {
    trains: Vec<String>,
}

impl TrainIndex {
    /// Parses tab-separated `trains.txt` content. Field 0 of each line is the
    /// train name; the remaining fields are descriptions and are ignored.
    /// Blank lines and repeated names are dropped.
    pub fn parse(text: &str) -> Self {
        let mut seen = HashSet::new();
        let mut trains = Vec::new();
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            let name = line.split('\t').next().unwrap_or("").trim();
            if name.is_empty() {
                continue;
            }
            if seen.insert(name.to_string()) {
                trains.push(name.to_string());
            }
        }
        TrainIndex { trains }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::parse(&String::from_utf8_lossy(bytes))
    }

    pub fn trains(&self) -> &[String] {
        &self.trains
    }

    pub fn into_trains(self) -> Vec<String> {
        self.trains
    }

    pub fn is_empty(&self) -> bool {
        self.trains.is_empty()
    }
}

/// A validator program referenced by the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checker {
    #[serde(rename = "Name")]
    pub name: String,
}

/// A historical version a delta package upgrades from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upgrade {
    #[serde(rename = "Version")]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Upgrades", default)]
    pub upgrades: Vec<Upgrade>,
}

/// The `LATEST` document of one train.
///
/// Only the keys the mirror needs are modelled; the rest of the document
/// (sequence numbers, signatures, ...) is ignored on parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "Train")]
    pub train: String,
    /// Note name to file name.
    #[serde(rename = "Notes", default)]
    pub notes: BTreeMap<String, String>,
    #[serde(rename = "InstallCheckProgram", default, skip_serializing_if = "Option::is_none")]
    pub install_check: Option<Checker>,
    #[serde(rename = "UpdateCheckProgram", default, skip_serializing_if = "Option::is_none")]
    pub update_check: Option<Checker>,
    #[serde(rename = "Packages", default)]
    pub packages: Vec<Package>,
}

impl Manifest {
    /// Parses manifest bytes. `origin` labels the error, usually the
    /// relative path the bytes were fetched from or loaded at.
    pub fn parse(bytes: &[u8], origin: impl Into<String>) -> Result<Self, ManifestParseError> {
        serde_json::from_slice(bytes).map_err(|source| ManifestParseError {
            origin: origin.into(),
            source,
        })
    }

    /// Iterates the validator programs in install, update order.
    pub fn checkers(&self) -> impl Iterator<Item = &Checker> {
        self.install_check.iter().chain(self.update_check.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_index_takes_first_field() {
        let index = TrainIndex::parse("stable\tStable\nnightly\tNightly\n");
        assert_eq!(index.trains(), ["stable", "nightly"]);
    }

    #[test]
    fn train_index_skips_blank_and_duplicate_lines() {
        let index = TrainIndex::parse("\nstable\tStable\r\n\n  \nstable\tAgain\nlegacy\n");
        assert_eq!(index.trains(), ["stable", "legacy"]);
    }

    #[test]
    fn train_index_of_empty_text_is_empty() {
        assert!(TrainIndex::parse("").is_empty());
        assert!(TrainIndex::from_bytes(b"\n\n").is_empty());
    }

    #[test]
    fn manifest_parses_full_document() {
        let json = br#"{
            "Train": "FreeNAS-11-STABLE",
            "Sequence": "11.3-U5",
            "Notes": {"ReleaseNotes": "rn-11.3.txt", "ChangeLog": "cl-11.3.txt"},
            "InstallCheckProgram": {"Name": "install-check", "Kind": "sh"},
            "UpdateCheckProgram": {"Name": "update-check"},
            "Packages": [
                {"Name": "base-os", "Version": "11.3-U5", "Upgrades": [{"Version": "11.3-U4"}]},
                {"Name": "freebsd", "Version": "11.3"}
            ]
        }"#;
        let manifest = Manifest::parse(json, "FreeNAS/FreeNAS-11-STABLE/LATEST").unwrap();
        assert_eq!(manifest.train, "FreeNAS-11-STABLE");
        assert_eq!(manifest.notes.len(), 2);
        assert_eq!(manifest.install_check.as_ref().unwrap().name, "install-check");
        assert_eq!(manifest.update_check.as_ref().unwrap().name, "update-check");
        assert_eq!(manifest.packages.len(), 2);
        assert_eq!(manifest.packages[0].upgrades[0].version, "11.3-U4");
        assert!(manifest.packages[1].upgrades.is_empty());
        assert_eq!(manifest.checkers().count(), 2);
    }

    #[test]
    fn manifest_optional_sections_default_to_empty() {
        let manifest = Manifest::parse(br#"{"Train": "t"}"#, "t/LATEST").unwrap();
        assert!(manifest.notes.is_empty());
        assert!(manifest.packages.is_empty());
        assert_eq!(manifest.checkers().count(), 0);
    }

    #[test]
    fn manifest_without_train_is_rejected() {
        let err = Manifest::parse(br#"{"Packages": []}"#, "p/t/LATEST").unwrap_err();
        assert_eq!(err.origin, "p/t/LATEST");
        assert!(err.to_string().contains("Train"), "got: {err}");
    }

    #[test]
    fn manifest_package_without_version_is_rejected() {
        let json = br#"{"Train": "t", "Packages": [{"Name": "base"}]}"#;
        assert!(Manifest::parse(json, "t/LATEST").is_err());
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(Manifest::parse(b"<html>404</html>", "t/LATEST").is_err());
    }
}
