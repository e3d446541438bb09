//! File ownership (user only)
//!
//! Ownership can only change when the agent runs privileged. Unprivileged
//! runs and unknown users are not failures: the property is skipped, and the
//! condition is reported once per process through the notice ledger.

use declarative::{Admission, PropertyError, PropertyKind};
use std::io;
use std::sync::Arc;

use super::FileSubject;
use crate::users::UserDirectory;

const NAME: &str = "owner";
const UNPRIVILEGED: &str = "owner:unprivileged";

/// A desired or actual owning user
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserRef {
    Id(u32),
    /// A name or id with no user behind it (yet)
    Unresolved(String),
}

/// The `owner` property of a file
#[derive(Debug, Clone)]
pub struct Owner {
    users: Arc<dyn UserDirectory>,
}

impl Owner {
    pub fn new(users: Arc<dyn UserDirectory>) -> Self {
        Self { users }
    }

    /// Uid for a name or numeric id, if the user exists
    fn uid(&self, value: &str) -> Option<u32> {
        match value.parse::<u32>() {
            Ok(uid) => self.users.name_of(uid).map(|_| uid),
            Err(_) => self.users.id_of(value),
        }
    }

    fn resolve(&self, value: &UserRef) -> Option<u32> {
        match value {
            UserRef::Id(uid) => Some(*uid),
            UserRef::Unresolved(text) => self.uid(text),
        }
    }
}

impl PropertyKind<FileSubject> for Owner {
    type Value = UserRef;

    fn name(&self) -> &'static str {
        NAME
    }

    fn event(&self) -> &'static str {
        "inode_changed"
    }

    fn normalize(&self, raw: &str) -> Result<UserRef, PropertyError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PropertyError::validation(NAME, "owner must not be empty"));
        }

        Ok(match self.uid(raw) {
            Some(uid) => UserRef::Id(uid),
            None => UserRef::Unresolved(raw.to_string()),
        })
    }

    fn display(&self, value: &UserRef) -> String {
        match value {
            UserRef::Id(uid) => self.users.name_of(*uid).unwrap_or_else(|| uid.to_string()),
            UserRef::Unresolved(text) => text.clone(),
        }
    }

    fn read(&self, owner: &FileSubject) -> Result<Option<UserRef>, PropertyError> {
        let stat = owner
            .stat()
            .map_err(|source| PropertyError::Read { property: NAME, source })?;
        Ok(stat.map(|stat| UserRef::Id(stat.uid)))
    }

    fn refresh(&self, owner: &FileSubject) {
        owner.invalidate();
    }

    fn admit(&self, owner: &FileSubject, target: &UserRef) -> Admission {
        let ctx = owner.context();

        if !ctx.platform.is_privileged() {
            if ctx.notices.first(UNPRIVILEGED) {
                log::warn!("Cannot manage ownership unless running as root");
            }
            return Admission::Skip;
        }

        if self.resolve(target).is_some() {
            return Admission::Proceed;
        }

        let shown = self.display(target);
        if ctx.notices.first(&format!("owner:missing:{shown}")) {
            log::warn!("user {shown} does not exist");
        } else {
            log::debug!("user {shown} does not exist");
        }
        Admission::Skip
    }

    fn write(&self, owner: &FileSubject, value: &UserRef) -> Result<(), PropertyError> {
        let path = owner.path();
        let uid = self.resolve(value).ok_or_else(|| {
            PropertyError::apply(
                NAME,
                format!("failed to set owner on {}", path.display()),
                io::Error::new(io::ErrorKind::NotFound, "no such user"),
            )
        })?;

        owner
            .context()
            .platform
            .set_owner(path, uid)
            .map_err(|e| {
                PropertyError::apply(
                    NAME,
                    format!("failed to set owner {uid} on {}", path.display()),
                    e,
                )
            })
    }
}
