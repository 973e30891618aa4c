/// `load_config` module: reads the optional YAML config file and merges it with
/// command-line flags into the core [`SyncConfig`].
///
/// Precedence is flags, then the file, then the built-in defaults of
/// [`SyncConfig::new`]. Every key in the file is optional:
///
/// ```yaml
/// mirrors: [ "http://update.freenas.org" ]
/// projects: [ FreeNAS ]
/// trains: [ FreeNAS-11-STABLE ]
/// deep: true
/// verbose: true
/// max_parallel_fetches: 4
/// ```
///
/// # Errors
/// Read and parse failures are `anyhow::Error`s carrying the file path, and
/// surface at the CLI boundary.
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use train_mirror_core::config::{SyncConfig, DEFAULT_MIRRORS};

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
pub struct FileConfig {
    pub mirrors: Option<Vec<String>>,
    pub projects: Option<Vec<String>>,
    pub trains: Option<Vec<String>>,
    pub deep: Option<bool>,
    /// Raises the default log level to `info` when no `-v` is given.
    pub verbose: Option<bool>,
    pub max_parallel_fetches: Option<usize>,
}

/// Flag values of the `sync` subcommand. Empty lists and `None` mean "not
/// given on the command line".
#[derive(Debug, Default, Clone)]
pub struct SyncFlags {
    pub projects: Vec<String>,
    pub trains: Vec<String>,
    pub mirrors: Vec<String>,
    pub deep: Option<bool>,
    pub dry_run: bool,
    pub jobs: Option<usize>,
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<FileConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let content = fs::read_to_string(path_ref)
        .inspect_err(|e| error!(error = ?e, config_path = ?path_ref, "Failed to read config file"))
        .with_context(|| format!("Failed to read config file {}", path_ref.display()))?;

    let config: FileConfig = serde_yaml::from_str(&content)
        .inspect_err(|e| error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML"))
        .with_context(|| format!("Failed to parse config YAML in {}", path_ref.display()))?;

    info!(config_path = ?path_ref, "Parsed config YAML successfully");
    Ok(config)
}

/// Combines flags, file and defaults into the configuration of one sync run.
pub fn build_sync_config(destination: PathBuf, file: &FileConfig, flags: SyncFlags) -> SyncConfig {
    let defaults = SyncConfig::new(destination);

    let pick = |flag: Vec<String>, from_file: &Option<Vec<String>>, default: Vec<String>| {
        if !flag.is_empty() {
            flag
        } else {
            from_file.clone().unwrap_or(default)
        }
    };

    let trains = if flags.trains.is_empty() {
        file.trains.clone().filter(|trains| !trains.is_empty())
    } else {
        Some(flags.trains)
    };

    SyncConfig {
        mirrors: pick(flags.mirrors, &file.mirrors, defaults.mirrors),
        projects: pick(flags.projects, &file.projects, defaults.projects),
        trains,
        deep: flags.deep.or(file.deep).unwrap_or(defaults.deep),
        dry_run: flags.dry_run,
        max_parallel_fetches: flags
            .jobs
            .or(file.max_parallel_fetches)
            .unwrap_or(defaults.max_parallel_fetches)
            .max(1),
        destination: defaults.destination,
    }
}

/// Mirror list for commands that only need the mirrors.
pub fn resolve_mirrors(flags: Vec<String>, file: &FileConfig) -> Vec<String> {
    if !flags.is_empty() {
        return flags;
    }
    file.mirrors
        .clone()
        .unwrap_or_else(|| DEFAULT_MIRRORS.iter().map(|m| m.to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_which_overrides_defaults() {
        let file = FileConfig {
            mirrors: Some(vec!["http://file.example".into()]),
            projects: Some(vec!["TrueNAS".into()]),
            deep: Some(true),
            max_parallel_fetches: Some(4),
            ..FileConfig::default()
        };
        let flags = SyncFlags {
            mirrors: vec!["http://flag.example".into()],
            deep: Some(false),
            ..SyncFlags::default()
        };

        let config = build_sync_config(PathBuf::from("/srv/mirror"), &file, flags);

        assert_eq!(config.mirrors, vec!["http://flag.example".to_string()]);
        assert_eq!(config.projects, vec!["TrueNAS".to_string()]);
        assert!(!config.deep);
        assert_eq!(config.max_parallel_fetches, 4);
        assert_eq!(config.trains, None);
        assert_eq!(config.destination, PathBuf::from("/srv/mirror"));
    }

    #[test]
    fn empty_file_gives_defaults() {
        let config = build_sync_config(PathBuf::from("out"), &FileConfig::default(), SyncFlags::default());
        assert_eq!(config, SyncConfig::new("out"));
    }

    #[test]
    fn zero_jobs_is_clamped_to_one() {
        let flags = SyncFlags {
            jobs: Some(0),
            ..SyncFlags::default()
        };
        let config = build_sync_config(PathBuf::from("out"), &FileConfig::default(), flags);
        assert_eq!(config.max_parallel_fetches, 1);
    }

    #[test]
    fn resolve_mirrors_falls_back_to_defaults() {
        assert_eq!(resolve_mirrors(vec![], &FileConfig::default()).len(), DEFAULT_MIRRORS.len());
        assert_eq!(
            resolve_mirrors(vec!["http://a".into()], &FileConfig::default()),
            vec!["http://a".to_string()]
        );
    }
}
