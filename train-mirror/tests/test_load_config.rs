use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use tempfile::{tempdir, NamedTempFile};
use train_mirror::load_config::{build_sync_config, load_config, FileConfig, SyncFlags};

#[test]
fn loads_every_key() {
    let config_yaml = r#"
mirrors: [ "http://update.freenas.org", "http://mirror.example/" ]
projects: [ FreeNAS ]
trains: [ FreeNAS-11-STABLE ]
deep: true
verbose: true
max_parallel_fetches: 4
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    let config = load_config(config_file.path()).expect("Config should load");

    assert_eq!(
        config,
        FileConfig {
            mirrors: Some(vec![
                "http://update.freenas.org".to_string(),
                "http://mirror.example/".to_string()
            ]),
            projects: Some(vec!["FreeNAS".to_string()]),
            trains: Some(vec!["FreeNAS-11-STABLE".to_string()]),
            deep: Some(true),
            verbose: Some(true),
            max_parallel_fetches: Some(4),
        }
    );
}

#[test]
fn partial_file_leaves_the_rest_to_defaults() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "deep: true\n").unwrap();

    let file = load_config(config_file.path()).expect("Config should load");
    let config = build_sync_config(PathBuf::from("/srv/mirror"), &file, SyncFlags::default());

    assert!(config.deep);
    assert_eq!(config.projects, vec!["FreeNAS".to_string(), "TrueNAS".to_string()]);
    assert_eq!(config.mirrors.len(), 2);
    assert_eq!(config.trains, None);
}

#[test]
fn missing_file_is_an_error() {
    let dir = tempdir().unwrap();
    let err = load_config(dir.path().join("absent.yaml")).unwrap_err();
    assert!(
        format!("{err:#}").contains("Failed to read config file"),
        "got: {err:#}"
    );
}

#[test]
fn wrongly_typed_key_is_an_error() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "deep: sometimes\n").unwrap();

    let err = load_config(config_file.path()).unwrap_err();
    assert!(
        format!("{err:#}").contains("Failed to parse config YAML"),
        "got: {err:#}"
    );
}

/// Relative config paths resolve against the working directory.
#[test]
#[serial]
fn relative_path_resolves_against_working_directory() {
    let dir = tempdir().unwrap();
    write(dir.path().join("mirror.yaml"), "projects: [ TrueNAS ]\n").unwrap();
    let previous = env::current_dir().unwrap();

    env::set_current_dir(dir.path()).unwrap();
    let result = load_config("mirror.yaml");
    env::set_current_dir(previous).unwrap();

    assert_eq!(result.unwrap().projects, Some(vec!["TrueNAS".to_string()]));
}
