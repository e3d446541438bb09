//! Centralized path resolution for stagehand
//!
//! # Environment Variables
//!
//! - `STAGEHAND_CONFIG_DIR` - Override config directory
//! - `STAGEHAND_STATE_DIR` - Override state directory (state file, catalog
//!   cache, class file, reports)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `STAGEHAND_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/stagehand` (if set)
//! 3. `~/.config/stagehand`
//!
//! For state_dir():
//! 1. `STAGEHAND_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/stagehand` (if set)
//! 3. `~/.local/state/stagehand`
//!
//! The `statedir` setting, when present, takes precedence over all of these;
//! see [`crate::settings::Settings::state_dir`].

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "STAGEHAND_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "STAGEHAND_STATE_DIR";

/// Get the stagehand config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("stagehand");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("stagehand");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the stagehand state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join("stagehand");
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".local").join("state").join("stagehand");
    log::debug!("Using default state dir: {}", path.display());
    Ok(path)
}

/// Settings file inside the config directory
pub fn settings_file(config_dir: &Path) -> PathBuf {
    config_dir.join("agent.toml")
}

/// Cross-cycle state file
pub fn state_file(state_dir: &Path) -> PathBuf {
    state_dir.join("state.toml")
}

/// Directory holding cached catalogs, one JSON file per node
pub fn catalog_cache_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("catalogs")
}

/// Class file listing the classes of the last applied catalog
pub fn class_file(state_dir: &Path) -> PathBuf {
    state_dir.join("classes.txt")
}

/// Directory receiving persisted run reports
pub fn reports_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("reports")
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
