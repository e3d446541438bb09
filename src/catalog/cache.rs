//! On-disk cache of the last catalog received from the server

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::transport::TransportError;
use super::wire::WireCatalog;

/// One JSON file per node under the cache directory
#[derive(Debug, Clone)]
pub struct CatalogCache {
    dir: PathBuf,
}

impl CatalogCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Cache file for `node`
    pub fn path_for(&self, node: &str) -> Result<PathBuf, TransportError> {
        if node.is_empty() || node.contains(['/', '\\']) || node.starts_with('.') {
            return Err(self.error(&self.dir, format!("invalid node name '{node}'")));
        }
        Ok(self.dir.join(format!("{node}.json")))
    }

    /// Cached catalog for `node`, if one was saved
    pub fn load(&self, node: &str) -> Result<Option<WireCatalog>, TransportError> {
        let path = self.path_for(node)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.error(&path, e.to_string())),
        };

        let catalog = WireCatalog::from_json(&content).map_err(|e| {
            TransportError::Decode(format!("cached catalog {}: {e}", path.display()))
        })?;
        Ok(Some(catalog))
    }

    /// Replace the cached catalog for its node
    ///
    /// The new content is written to a temporary file in the same directory
    /// and renamed into place, so readers see either the old or the new file.
    pub fn save(&self, catalog: &WireCatalog) -> Result<(), TransportError> {
        let path = self.path_for(&catalog.name)?;
        fs::create_dir_all(&self.dir).map_err(|e| self.error(&self.dir, e.to_string()))?;

        let json = catalog
            .to_json()
            .map_err(|e| self.error(&path, format!("cannot serialize catalog: {e}")))?;

        let mut temp =
            NamedTempFile::new_in(&self.dir).map_err(|e| self.error(&self.dir, e.to_string()))?;
        temp.write_all(json.as_bytes())
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| self.error(temp.path(), e.to_string()))?;
        temp.persist(&path)
            .map_err(|e| self.error(&path, e.error.to_string()))?;

        log::debug!("Cached catalog for {} at {}", catalog.name, path.display());
        Ok(())
    }

    fn error(&self, path: &Path, message: String) -> TransportError {
        TransportError::Cache {
            path: path.to_path_buf(),
            message,
        }
    }
}
