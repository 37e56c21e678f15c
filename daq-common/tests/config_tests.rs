//! Config file loading and data folder creation against a real filesystem

use daq_common::config::{ensure_directory_exists, load_toml, locate_config_file, resolve_data_dir};
use daq_common::Error;
use serde::Deserialize;
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(Debug, Default, Deserialize, PartialEq)]
struct Sample {
    data_dir: Option<PathBuf>,
    #[serde(default)]
    seasons: Vec<String>,
}

#[test]
fn test_load_toml_reads_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("downloader.toml");
    std::fs::write(&path, "data_dir = \"/srv/daq\"\nseasons = [\"WFR25\", \"WFR24\"]\n").unwrap();

    let sample: Sample = load_toml(&path).unwrap();

    assert_eq!(sample.data_dir, Some(PathBuf::from("/srv/daq")));
    assert_eq!(sample.seasons, vec!["WFR25", "WFR24"]);
}

#[test]
fn test_load_toml_reports_path_on_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    std::fs::write(&path, "seasons = [unterminated").unwrap();

    match load_toml::<Sample>(&path) {
        Err(Error::Config(msg)) => assert!(msg.contains("broken.toml")),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn test_env_config_path_used_when_no_flag() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("custom.toml");
    std::fs::write(&path, "").unwrap();

    let found = locate_config_file(None, Some(path.display().to_string()), "downloader.toml").unwrap();
    assert_eq!(found, Some(path));
}

#[test]
fn test_ensure_directory_creates_nested_folders() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("a").join("b").join("c");

    ensure_directory_exists(&nested).unwrap();
    assert!(nested.is_dir());

    // Second call on an existing folder is a no-op
    ensure_directory_exists(&nested).unwrap();
}

#[test]
fn test_data_dir_priority() {
    let cli = PathBuf::from("/from/cli");
    let toml = PathBuf::from("/from/toml");

    assert_eq!(
        resolve_data_dir(Some(&cli), Some("/from/env".to_string()), Some(&toml)),
        cli
    );
    assert_eq!(
        resolve_data_dir(None, Some("/from/env".to_string()), Some(&toml)),
        PathBuf::from("/from/env")
    );
    assert_eq!(resolve_data_dir(None, None, Some(&toml)), toml);
}
