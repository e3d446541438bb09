//! Pre/post-run command hooks

use std::process::{Command, Stdio};

/// A hook command failed to run or exited unsuccessfully
#[derive(Debug, thiserror::Error)]
#[error("Could not run command from {setting}: {message}")]
pub struct HookError {
    pub setting: &'static str,
    pub message: String,
}

/// A shell command configured by a setting; empty means no-op
#[derive(Debug, Clone)]
pub struct CommandHook {
    setting: &'static str,
    command: String,
}

impl CommandHook {
    pub fn new(setting: &'static str, command: impl Into<String>) -> Self {
        Self {
            setting,
            command: command.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.command.trim().is_empty()
    }

    /// Run the command with `sh -c`, inheriting stdio
    pub fn execute(&self) -> Result<(), HookError> {
        if self.is_empty() {
            return Ok(());
        }

        log::debug!("Running {}: {}", self.setting, self.command);
        let status = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .map_err(|e| self.error(format!("failed to execute '{}': {e}", self.command)))?;

        if status.success() {
            Ok(())
        } else {
            Err(self.error(format!("'{}' exited with {status}", self.command)))
        }
    }

    fn error(&self, message: String) -> HookError {
        HookError {
            setting: self.setting,
            message,
        }
    }
}
