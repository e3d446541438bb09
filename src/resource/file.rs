//! File resource

use anyhow::{Result, bail};
use declarative::{Desired, Property, Reconcile, Resource, ResourceOutcome, reconcile_properties};
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{Mode, Owner, ResourceContext};

/// The parts of `stat(2)` the file properties look at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub mode: u32,
    pub uid: u32,
    pub is_dir: bool,
}

/// What the file properties operate on: a path plus a cached stat
///
/// The stat is looked up at most once until [`FileSubject::invalidate`] runs,
/// so several properties of the same file share one syscall.
#[derive(Debug)]
pub struct FileSubject {
    path: PathBuf,
    ctx: ResourceContext,
    stat: Mutex<Option<Option<FileStat>>>,
}

impl FileSubject {
    pub fn new(path: impl Into<PathBuf>, ctx: ResourceContext) -> Self {
        Self {
            path: path.into(),
            ctx,
            stat: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn context(&self) -> &ResourceContext {
        &self.ctx
    }

    /// Cached stat; `Ok(None)` when the file does not exist
    pub fn stat(&self) -> io::Result<Option<FileStat>> {
        let mut cached = self.lock();
        if let Some(stat) = *cached {
            return Ok(stat);
        }

        let stat = match fs::metadata(&self.path) {
            Ok(meta) => Some(FileStat {
                mode: meta.mode(),
                uid: meta.uid(),
                is_dir: meta.is_dir(),
            }),
            Err(e) if is_missing(&e) => None,
            Err(e) => return Err(e),
        };

        *cached = Some(stat);
        Ok(stat)
    }

    /// Forget the cached stat
    pub fn invalidate(&self) {
        *self.lock() = None;
    }

    fn lock(&self) -> MutexGuard<'_, Option<Option<FileStat>>> {
        match self.stat.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn is_missing(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(libc::ENOTDIR)
}

/// A file whose mode and/or owner are managed
#[derive(Debug)]
pub struct FileResource {
    title: String,
    subject: FileSubject,
    properties: Vec<Box<dyn Reconcile<FileSubject>>>,
}

impl FileResource {
    /// Create a file resource titled by its path; the path must be absolute
    pub fn new(path: &str, ctx: ResourceContext) -> Result<Self> {
        Self::titled(path, path, ctx)
    }

    /// Create a file resource whose title differs from the managed path
    ///
    /// The path is taken literally, no `~` or `$VAR` expansion.
    pub fn titled(title: &str, path: &str, ctx: ResourceContext) -> Result<Self> {
        let path = PathBuf::from(path);
        if !path.is_absolute() {
            bail!("File paths must be fully qualified, not '{}'", path.display());
        }

        Ok(Self {
            title: title.to_string(),
            subject: FileSubject::new(path, ctx),
            properties: Vec::new(),
        })
    }

    /// Manage the owning user
    pub fn with_owner(mut self, desired: Desired) -> Self {
        let kind = Owner::new(self.subject.ctx.users.clone());
        self.properties
            .push(Box::new(Property::<Owner, FileSubject>::new(kind, desired)));
        self
    }

    /// Manage the permission bits
    pub fn with_mode(mut self, desired: Desired) -> Self {
        self.properties
            .push(Box::new(Property::<Mode, FileSubject>::new(Mode, desired)));
        self
    }

    pub fn path(&self) -> &Path {
        self.subject.path()
    }
}

impl Resource for FileResource {
    fn resource_type(&self) -> &'static str {
        "file"
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn name_var(&self) -> String {
        self.subject.path().display().to_string()
    }

    fn property_names(&self) -> Vec<&'static str> {
        self.properties.iter().map(|p| p.name()).collect()
    }

    fn apply(&mut self) -> Result<ResourceOutcome> {
        let reference = self.reference();
        Ok(reconcile_properties(
            &reference,
            self.resource_type(),
            &self.subject,
            &mut self.properties,
        ))
    }

    fn clear(&mut self) {
        self.subject.invalidate();
    }
}
