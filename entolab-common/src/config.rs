//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// TOML configuration file contents (`~/.config/entolab/entolab.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root data folder (database, scratch files)
    pub root_folder: Option<String>,
    /// Bind address for the API service, e.g. "127.0.0.1:5810"
    pub bind_address: Option<String>,
    /// Base URL of the external image-analysis (detection) service
    pub detector_url: Option<String>,
    /// API key for the detection service
    pub detector_api_key: Option<String>,
    /// Object storage settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// S3-compatible object storage settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Endpoint override for S3-compatible stores (e.g. MinIO in dev)
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Allow plain-HTTP endpoints (dev only)
    #[serde(default)]
    pub allow_http: bool,
}

/// Resolve the root data folder, in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return PathBuf::from(path);
    }

    // Priority 3: TOML config file
    if let Ok(config) = load_toml_config() {
        if let Some(root_folder) = config.root_folder {
            return PathBuf::from(root_folder);
        }
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Ensure the root folder exists, creating it if missing
pub fn ensure_root_folder(root: &Path) -> Result<()> {
    std::fs::create_dir_all(root)?;
    Ok(())
}

/// Database path inside the root folder
pub fn database_path(root: &Path) -> PathBuf {
    root.join("entolab.db")
}

/// Default configuration file path for the platform
pub fn config_file_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|d| d.join("entolab").join("entolab.toml"))
        .ok_or_else(|| Error::Config("Could not determine config directory".to_string()))
}

/// Load the TOML configuration file, if present
pub fn load_toml_config() -> Result<TomlConfig> {
    let path = config_file_path()?;
    load_toml_config_from(&path)
}

/// Load a TOML configuration file from an explicit path
pub fn load_toml_config_from(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Write a TOML configuration file atomically (write temp, then rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("entolab"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/entolab"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("entolab"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/entolab"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("entolab"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\entolab"))
    } else {
        PathBuf::from("./entolab_data")
    }
}
