//! Cross-cycle agent state
//!
//! A small TOML file remembering what the previous runs did. It is read at
//! the start of every run and written at the end. A file that cannot be
//! parsed is deleted and the load retried once; if it cannot even be deleted
//! the state is considered corrupt for good.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// State Structures
// ============================================================================

/// Main state structure persisted between runs
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AgentState {
    /// The last catalog that was applied
    #[serde(default)]
    pub configuration: ConfigurationState,

    /// Outcome of the last run
    #[serde(default)]
    pub last_run: Option<LastRun>,

    /// Last time the state was written
    pub last_updated: Option<DateTime<Utc>>,
}

/// What is known about the last applied catalog
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ConfigurationState {
    /// When the catalog was compiled by the server
    pub compile_time: Option<DateTime<Utc>>,

    /// Seconds spent fetching it
    pub retrieval_seconds: Option<f64>,
}

/// Outcome of a run
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LastRun {
    pub time: DateTime<Utc>,
    pub status: String,
    pub changes: usize,
    pub failures: usize,
}

/// The state file could not be recovered
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Cannot remove corrupt state file {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file {} is still unreadable after removal: {message}", path.display())]
    Unreadable { path: PathBuf, message: String },
}

// ============================================================================
// StateStore
// ============================================================================

/// Location of the state file
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load state, discarding a corrupt file once
    pub fn load(&self) -> Result<AgentState, StateError> {
        match self.read() {
            Ok(state) => Ok(state),
            Err(e) => {
                log::error!("Corrupt state file {}: {e:#}", self.path.display());
                fs::remove_file(&self.path).map_err(|source| StateError::Corrupt {
                    path: self.path.clone(),
                    source,
                })?;
                self.read().map_err(|e| StateError::Unreadable {
                    path: self.path.clone(),
                    message: format!("{e:#}"),
                })
            }
        }
    }

    /// Read state from disk, or return default if the file doesn't exist
    fn read(&self) -> Result<AgentState> {
        if !self.path.exists() {
            log::debug!("State file does not exist, using default state");
            return Ok(AgentState::default());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read state file: {}", self.path.display()))?;

        let state: AgentState = toml::from_str(&content)
            .with_context(|| format!("Failed to parse state file: {}", self.path.display()))?;

        log::debug!("Loaded state from {}", self.path.display());
        Ok(state)
    }

    /// Save state to disk, stamping `last_updated`
    pub fn save(&self, state: &mut AgentState) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create state directory: {}", dir.display())
            })?;
        }

        state.last_updated = Some(Utc::now());
        let content = toml::to_string_pretty(state).context("Failed to serialize state to TOML")?;

        fs::write(&self.path, &content)
            .with_context(|| format!("Failed to write state file: {}", self.path.display()))?;

        log::debug!("Saved state to {}", self.path.display());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_default_state() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path().join("state.toml"));
        let state = store.load().unwrap();
        assert!(state.last_run.is_none());
        assert!(state.configuration.compile_time.is_none());
    }

    #[test]
    fn save_then_load() {
        let tmp = TempDir::new().unwrap();
        let store = StateStore::new(tmp.path().join("nested").join("state.toml"));

        let mut state = AgentState::default();
        state.last_run = Some(LastRun {
            time: Utc::now(),
            status: "changed".into(),
            changes: 2,
            failures: 0,
        });
        state.configuration.retrieval_seconds = Some(0.5);
        store.save(&mut state).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.last_run.unwrap().changes, 2);
        assert_eq!(loaded.configuration.retrieval_seconds, Some(0.5));
        assert!(loaded.last_updated.is_some());
    }

    #[test]
    fn corrupt_file_is_removed_and_reset() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state.toml");
        fs::write(&path, "this is [not toml").unwrap();

        let store = StateStore::new(&path);
        let state = store.load().unwrap();
        assert!(state.last_run.is_none());
        assert!(!path.exists());
    }

    #[test]
    fn unremovable_corrupt_state_is_fatal() {
        let tmp = TempDir::new().unwrap();
        // A directory can neither be parsed nor removed with remove_file
        let path = tmp.path().join("state.toml");
        fs::create_dir(&path).unwrap();

        let err = StateStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StateError::Corrupt { .. }));
    }
}
