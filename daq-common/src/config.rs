//! Configuration file loading and data folder resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sub-directory used under the platform config/data folders
pub const APP_DIR: &str = "daq";

/// Data folder resolution, priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable value
/// 3. TOML config file value
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_data_dir(
    cli_arg: Option<&Path>,
    env_value: Option<String>,
    config_value: Option<&Path>,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Some(path) = env_value.filter(|v| !v.trim().is_empty()) {
        return PathBuf::from(path.trim());
    }

    if let Some(path) = config_value {
        return path.to_path_buf();
    }

    default_data_dir()
}

/// Locate the TOML config file for a service
///
/// Explicit path first, then the environment value, then
/// `<config_dir>/daq/<file_name>` and finally `/etc/daq/<file_name>` on Linux.
/// An explicit path that does not exist is an error; a missing default file
/// is not (the service runs on env + defaults).
pub fn locate_config_file(
    explicit: Option<&Path>,
    env_value: Option<String>,
    file_name: &str,
) -> Result<Option<PathBuf>> {
    let explicit = explicit
        .map(Path::to_path_buf)
        .or_else(|| env_value.filter(|v| !v.trim().is_empty()).map(PathBuf::from));

    if let Some(path) = explicit {
        if path.exists() {
            return Ok(Some(path));
        }
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let mut candidates = Vec::new();
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join(APP_DIR).join(file_name));
    }
    if cfg!(target_os = "linux") {
        candidates.push(PathBuf::from("/etc").join(APP_DIR).join(file_name));
    }

    for candidate in candidates {
        if candidate.exists() {
            return Ok(Some(candidate));
        }
        debug!("No config file at {}", candidate.display());
    }

    Ok(None)
}

/// Read and deserialize a TOML file
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Create a directory (and parents) if it does not exist yet
pub fn ensure_directory_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        debug!("Created directory {}", path.display());
    }
    Ok(())
}

/// Get OS-dependent default data folder path
fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/daq (or /var/lib/daq for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("/var/lib/daq"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/daq"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join(APP_DIR))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\daq"))
    } else {
        PathBuf::from("./data")
    }
}
