//! File permission bits
//!
//! Desired modes are written as octal digit strings ("644", "0755"). On a
//! directory every read bit also grants the matching search bit, so
//! `mode => "644"` on a directory converges to `0755`.

use declarative::{PropertyError, PropertyKind};
use regex::Regex;
use std::sync::LazyLock;

use super::FileSubject;

const NAME: &str = "mode";

static MODE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("mode regex is valid"));

/// The `mode` property of a file
#[derive(Debug, Default, Clone, Copy)]
pub struct Mode;

/// Add the search bit for every read bit that is set
pub fn dirmask(mode: u32) -> u32 {
    let mut mode = mode;
    if mode & 0o400 != 0 {
        mode |= 0o100;
    }
    if mode & 0o040 != 0 {
        mode |= 0o010;
    }
    if mode & 0o004 != 0 {
        mode |= 0o001;
    }
    mode
}

impl PropertyKind<FileSubject> for Mode {
    type Value = u32;

    fn name(&self) -> &'static str {
        NAME
    }

    fn event(&self) -> &'static str {
        "inode_changed"
    }

    fn accepts_list(&self) -> bool {
        true
    }

    fn normalize(&self, raw: &str) -> Result<u32, PropertyError> {
        if !MODE_PATTERN.is_match(raw) {
            return Err(PropertyError::validation(
                NAME,
                format!("File modes can only be numbers, not '{raw}'"),
            ));
        }

        let digits = if raw.starts_with('0') {
            raw.to_string()
        } else {
            format!("0{raw}")
        };

        u32::from_str_radix(&digits, 8).map_err(|_| {
            PropertyError::validation(NAME, format!("'{raw}' is not a valid octal mode"))
        })
    }

    fn display(&self, value: &u32) -> String {
        format!("{value:o}")
    }

    fn read(&self, owner: &FileSubject) -> Result<Option<u32>, PropertyError> {
        let stat = owner
            .stat()
            .map_err(|source| PropertyError::Read { property: NAME, source })?;
        Ok(stat.map(|stat| stat.mode & 0o7777))
    }

    fn refresh(&self, owner: &FileSubject) {
        owner.invalidate();
    }

    fn adjust(&self, owner: &FileSubject, value: u32) -> u32 {
        match owner.stat() {
            Ok(Some(stat)) if stat.is_dir => dirmask(value),
            _ => value,
        }
    }

    fn write(&self, owner: &FileSubject, value: &u32) -> Result<(), PropertyError> {
        owner
            .context()
            .platform
            .set_mode(owner.path(), *value)
            .map_err(|e| {
                PropertyError::apply(
                    NAME,
                    format!("failed to set mode {value:o} on {}", owner.path().display()),
                    e,
                )
            })
    }
}
