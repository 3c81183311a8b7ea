//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\libromaid-scanner\config.toml
//! - macOS: ~/Library/Application Support/libromaid-scanner/config.toml
//! - Linux: ~/.config/libromaid-scanner/config.toml
//!
//! The config file is human-readable and editable. Settings are loaded at
//! startup; the scanner itself never rewrites this file (it only writes to
//! the database).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Libraries to scan.
    pub libraries: Vec<LibraryConfig>,

    /// Scanner behavior settings.
    pub scanner: ScannerConfig,

    /// Path to the SQLite database file. `None` uses [`DEFAULT_DB_NAME`](crate::db::DEFAULT_DB_NAME)
    /// in the current directory.
    pub db_path: Option<PathBuf>,
}

/// One configured library root.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Display name.
    pub name: String,
    /// Absolute filesystem root.
    pub path: PathBuf,
    /// Optional prefix used by external consumers to rewrite URLs; the
    /// scanner itself never reads this field.
    pub remote_path: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            path: PathBuf::new(),
            remote_path: String::new(),
        }
    }
}

/// Scanner behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Default for the `fullRescan` flag when a run is started without an
    /// explicit override.
    pub full_rescan: bool,

    /// Follow symlinks while walking.
    pub follow_symlinks: bool,

    /// Worker pool size for the change-filter, folder-processor and sink
    /// stages.
    pub workers: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            full_rescan: false,
            follow_symlinks: true,
            workers: 4,
        }
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("libromaid-scanner"))
}

/// Get the full path to the config file.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from disk.
///
/// Returns default config if the file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };

    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to disk.
///
/// Creates the config directory if it doesn't exist, and writes atomically
/// (write to a temp file, then rename).
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
    let path = dir.join("config.toml");

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::CreateDir(dir.clone(), e))?;

    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, &path)
        .map_err(|e| ConfigError::Rename(temp_path, path.clone(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
