//! Platform operations used by file properties
//!
//! Privilege is decided once per process: ownership can only be changed when
//! the agent runs as root. The trait lets tests observe which operations a
//! property actually attempted.

use std::fmt;
use std::io;
use std::path::Path;

/// Mutating filesystem calls and the privilege they need
pub trait Platform: Send + Sync + fmt::Debug {
    /// Whether the process may change file ownership
    fn is_privileged(&self) -> bool;

    /// chmod
    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()>;

    /// chown, user only
    fn set_owner(&self, path: &Path, uid: u32) -> io::Result<()>;
}

/// The running system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPlatform;

impl Platform for SystemPlatform {
    fn is_privileged(&self) -> bool {
        // SAFETY: geteuid has no preconditions and cannot fail
        unsafe { libc::geteuid() == 0 }
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
    }

    fn set_owner(&self, path: &Path, uid: u32) -> io::Result<()> {
        std::os::unix::fs::chown(path, Some(uid), None)
    }
}

/// Records calls instead of touching the system; mode changes can be
/// forwarded to the real filesystem so stat-based tests observe them.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingPlatform {
    pub privileged: bool,
    pub apply_modes: bool,
    pub fail: bool,
    pub mode_calls: std::sync::Mutex<Vec<(std::path::PathBuf, u32)>>,
    pub owner_calls: std::sync::Mutex<Vec<(std::path::PathBuf, u32)>>,
}

#[cfg(test)]
impl RecordingPlatform {
    pub fn mode_call_count(&self) -> usize {
        self.mode_calls.lock().unwrap().len()
    }

    pub fn owner_call_count(&self) -> usize {
        self.owner_calls.lock().unwrap().len()
    }
}

#[cfg(test)]
impl Platform for RecordingPlatform {
    fn is_privileged(&self) -> bool {
        self.privileged
    }

    fn set_mode(&self, path: &Path, mode: u32) -> io::Result<()> {
        self.mode_calls
            .lock()
            .unwrap()
            .push((path.to_path_buf(), mode));
        if self.fail {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        if self.apply_modes {
            SystemPlatform.set_mode(path, mode)?;
        }
        Ok(())
    }

    fn set_owner(&self, path: &Path, uid: u32) -> io::Result<()> {
        self.owner_calls
            .lock()
            .unwrap()
            .push((path.to_path_buf(), uid));
        if self.fail {
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        Ok(())
    }
}
