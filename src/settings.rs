//! Agent settings
//!
//! Settings are read from `agent.toml` in the config directory and can be
//! overridden on the command line. They are validated when loaded, so a bad
//! value (e.g. a non-numeric `configtimeout`) stops the agent before any
//! cycle starts.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{facts, paths};

const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_SERVER: &str = "https://stagehand:8140";

/// Invalid settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Configuration timeout must be a positive integer, got '{0}'")]
    InvalidTimeout(String),

    #[error("certname must not be empty")]
    EmptyCertname,
}

/// `configtimeout` as written: an integer or a string of digits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeoutSetting {
    Seconds(i64),
    Text(String),
}

impl TimeoutSetting {
    /// Validate and convert to a duration
    pub fn to_duration(&self) -> Result<Duration, SettingsError> {
        let seconds = match self {
            Self::Seconds(n) => u64::try_from(*n).ok(),
            Self::Text(text) if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) => {
                text.parse::<u64>().ok()
            }
            Self::Text(_) => None,
        };

        match seconds {
            Some(n) if n > 0 => Ok(Duration::from_secs(n)),
            _ => Err(SettingsError::InvalidTimeout(self.to_string())),
        }
    }
}

impl std::fmt::Display for TimeoutSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seconds(n) => write!(f, "{n}"),
            Self::Text(text) => write!(f, "{text}"),
        }
    }
}

impl Default for TimeoutSetting {
    fn default() -> Self {
        Self::Seconds(DEFAULT_TIMEOUT_SECS as i64)
    }
}

/// Settings consumed by the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Name identifying this node to the catalog server
    pub certname: String,

    /// Base URL of the catalog server
    pub server: String,

    /// Catalog fetch timeout in seconds
    pub configtimeout: TimeoutSetting,

    /// Fall back to the cached catalog when the server is unreachable
    pub usecacheonfailure: bool,

    /// Persist the run report
    pub report: bool,

    /// Print a summary after the run
    pub summarize: bool,

    /// Shell command run before each catalog run; empty means none
    pub prerun_command: String,

    /// Shell command run after each catalog run; empty means none
    pub postrun_command: String,

    /// Log error chains with backtraces
    pub trace: bool,

    /// Override for the state directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statedir: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            certname: facts::hostname().unwrap_or_else(|| "localhost".to_string()),
            server: DEFAULT_SERVER.to_string(),
            configtimeout: TimeoutSetting::default(),
            usecacheonfailure: true,
            report: true,
            summarize: false,
            prerun_command: String::new(),
            postrun_command: String::new(),
            trace: false,
            statedir: None,
        }
    }
}

impl Settings {
    /// Load settings from `path`, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Settings file {} does not exist, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;

        settings
            .validate()
            .with_context(|| format!("Invalid settings in {}", path.display()))?;

        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Check values that cannot be expressed in the type
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.timeout()?;
        if self.certname.trim().is_empty() {
            return Err(SettingsError::EmptyCertname);
        }
        Ok(())
    }

    /// Catalog fetch timeout
    pub fn timeout(&self) -> Result<Duration, SettingsError> {
        self.configtimeout.to_duration()
    }

    /// State directory, honoring the `statedir` override
    pub fn state_dir(&self) -> Result<PathBuf> {
        match &self.statedir {
            Some(dir) => Ok(paths::expand(dir)),
            None => paths::state_dir(),
        }
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize settings to TOML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn timeout_accepts_integers_and_digit_strings() {
        assert_eq!(
            TimeoutSetting::Seconds(30).to_duration().unwrap(),
            Duration::from_secs(30)
        );
        assert_eq!(
            TimeoutSetting::Text("45".into()).to_duration().unwrap(),
            Duration::from_secs(45)
        );
    }

    #[test]
    fn timeout_rejects_non_positive_and_non_numeric() {
        for bad in [
            TimeoutSetting::Seconds(0),
            TimeoutSetting::Seconds(-5),
            TimeoutSetting::Text("abc".into()),
            TimeoutSetting::Text("12s".into()),
            TimeoutSetting::Text(String::new()),
        ] {
            assert!(
                matches!(bad.to_duration(), Err(SettingsError::InvalidTimeout(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load(&tmp.path().join("agent.toml")).unwrap();
        assert!(settings.usecacheonfailure);
        assert!(settings.report);
        assert_eq!(settings.timeout().unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn load_parses_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("agent.toml");
        fs::write(
            &path,
            r#"
certname = "web01.example.com"
server = "http://localhost:8140"
configtimeout = "30"
usecacheonfailure = false
summarize = true
postrun_command = "logger done"
"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.certname, "web01.example.com");
        assert_eq!(settings.timeout().unwrap(), Duration::from_secs(30));
        assert!(!settings.usecacheonfailure);
        assert!(settings.summarize);
        assert!(settings.report);
        assert_eq!(settings.postrun_command, "logger done");
        assert!(settings.prerun_command.is_empty());
    }

    #[test]
    fn load_rejects_bad_timeout() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("agent.toml");
        fs::write(&path, "configtimeout = \"soon\"\n").unwrap();

        let err = Settings::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("must be a positive integer"));
    }

    #[test]
    fn statedir_override_wins() {
        let settings = Settings {
            statedir: Some("/srv/stagehand".into()),
            ..Default::default()
        };
        assert_eq!(settings.state_dir().unwrap(), PathBuf::from("/srv/stagehand"));
    }

    #[test]
    fn toml_round_trip_keeps_timeout_shape() {
        let settings = Settings {
            configtimeout: TimeoutSetting::Text("60".into()),
            ..Default::default()
        };
        let rendered = settings.to_toml().unwrap();
        let back: Settings = toml::from_str(&rendered).unwrap();
        assert_eq!(back.configtimeout, TimeoutSetting::Text("60".into()));
    }
}
