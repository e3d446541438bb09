//! Concrete resource types managed by the agent
//!
//! Only files are supported. A file resource manages its permission bits
//! (`mode`) and its owning user (`owner`); both are reconciled through the
//! generic property cycle in the `declarative` crate.

pub mod file;
pub mod mode;
pub mod owner;

pub use file::{FileResource, FileStat, FileSubject};
pub use mode::Mode;
pub use owner::{Owner, UserRef};

use crate::platform::{Platform, SystemPlatform};
use crate::users::{SystemUsers, UserDirectory};
use declarative::Notices;
use std::sync::Arc;

/// Collaborators shared by every resource of a run
#[derive(Debug, Clone)]
pub struct ResourceContext {
    pub platform: Arc<dyn Platform>,
    pub users: Arc<dyn UserDirectory>,
    pub notices: Arc<Notices>,
}

impl ResourceContext {
    pub fn new(
        platform: Arc<dyn Platform>,
        users: Arc<dyn UserDirectory>,
        notices: Arc<Notices>,
    ) -> Self {
        Self {
            platform,
            users,
            notices,
        }
    }

    /// The running system with a fresh notice ledger
    pub fn system() -> Self {
        Self::new(
            Arc::new(SystemPlatform),
            Arc::new(SystemUsers),
            Arc::new(Notices::new()),
        )
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::platform::RecordingPlatform;
    use crate::users::{StaticUsers, UserRecord};

    /// Context over a recording platform and a fixed user list
    pub fn context(platform: RecordingPlatform) -> (ResourceContext, Arc<RecordingPlatform>) {
        let platform = Arc::new(platform);
        let users = StaticUsers(vec![
            UserRecord::new(0, "root"),
            UserRecord::new(4242, "deploy"),
        ]);
        let ctx = ResourceContext::new(
            platform.clone(),
            Arc::new(users),
            Arc::new(Notices::new()),
        );
        (ctx, platform)
    }
}
