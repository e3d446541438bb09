//! Catalog transports
//!
//! A transport finds the catalog for a node by name. The [`Indirector`] is
//! the production transport: it asks the catalog server over HTTP and keeps
//! the last good answer in a [`CatalogCache`] so a later run can fall back
//! to it.

use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::cache::CatalogCache;
use super::wire::WireCatalog;
use crate::facts::FactOptions;

/// How a single `find` should be answered
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Skip the cache and ask the server
    pub ignore_cache: bool,
    /// Only consult the cache
    pub ignore_terminus: bool,
    /// Facts to send along with a server request
    pub facts: Option<FactOptions>,
}

/// Errors finding a catalog
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("No catalog found for {0}")]
    NotFound(String),

    #[error("Error retrieving {url}: {message}")]
    Transport { url: String, message: String },

    #[error("Catalog cache {}: {message}", path.display())]
    Cache { path: PathBuf, message: String },

    #[error("Could not decode catalog: {0}")]
    Decode(String),
}

/// Finds catalogs by node name
pub trait CatalogTransport: Send + Sync + fmt::Debug {
    fn find(&self, node: &str, options: &FindOptions) -> Result<WireCatalog, TransportError>;

    /// Release pooled connections
    fn close(&self) {}
}

// ============================================================================
// HTTP terminus
// ============================================================================

/// Fetches catalogs from the catalog server
///
/// The HTTP agent (and its connection pool) is created on first use and
/// dropped by [`CatalogTransport::close`].
#[derive(Debug)]
pub struct HttpTerminus {
    server: String,
    timeout: Duration,
    agent: Mutex<Option<ureq::Agent>>,
}

impl HttpTerminus {
    pub fn new(server: impl Into<String>, timeout: Duration) -> Self {
        Self {
            server: server.into(),
            timeout,
            agent: Mutex::new(None),
        }
    }

    /// URL of the catalog for `node`
    pub fn catalog_url(&self, node: &str) -> String {
        format!("{}/catalog/{node}", self.server.trim_end_matches('/'))
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    fn agent(&self) -> ureq::Agent {
        self.lock()
            .get_or_insert_with(|| {
                ureq::Agent::config_builder()
                    .timeout_global(Some(self.timeout))
                    .http_status_as_error(true)
                    .build()
                    .into()
            })
            .clone()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ureq::Agent>> {
        match self.agent.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl CatalogTransport for HttpTerminus {
    fn find(&self, node: &str, options: &FindOptions) -> Result<WireCatalog, TransportError> {
        let url = self.catalog_url(node);
        let transport_error = |e: ureq::Error| TransportError::Transport {
            url: url.clone(),
            message: e.to_string(),
        };

        let mut request = self
            .agent()
            .get(&url)
            .header("Accept", "application/json")
            .header("User-Agent", concat!("stagehand/", env!("CARGO_PKG_VERSION")));
        if let Some(facts) = &options.facts {
            request = request
                .query("facts_format", &facts.format)
                .query("facts", &facts.payload);
        }

        log::debug!("Requesting catalog from {url}");
        let mut response = match request.call() {
            Ok(response) => response,
            Err(ureq::Error::StatusCode(404)) => {
                return Err(TransportError::NotFound(node.to_string()));
            }
            Err(e) => return Err(transport_error(e)),
        };

        response
            .body_mut()
            .read_json::<WireCatalog>()
            .map_err(|e| match e {
                ureq::Error::Json(e) => TransportError::Decode(e.to_string()),
                other => transport_error(other),
            })
    }

    fn close(&self) {
        if self.lock().take().is_some() {
            log::debug!("Closed connections to {}", self.server);
        }
    }
}

// ============================================================================
// Indirector
// ============================================================================

/// Server terminus with a cache in front of (and behind) it
#[derive(Debug)]
pub struct Indirector<T = HttpTerminus> {
    terminus: T,
    cache: CatalogCache,
}

impl<T: CatalogTransport> Indirector<T> {
    pub fn new(terminus: T, cache: CatalogCache) -> Self {
        Self { terminus, cache }
    }

    pub fn terminus(&self) -> &T {
        &self.terminus
    }

    pub fn cache(&self) -> &CatalogCache {
        &self.cache
    }

    fn from_cache(&self, node: &str) -> Result<WireCatalog, TransportError> {
        self.cache
            .load(node)?
            .ok_or_else(|| TransportError::NotFound(node.to_string()))
    }
}

impl<T: CatalogTransport> CatalogTransport for Indirector<T> {
    fn find(&self, node: &str, options: &FindOptions) -> Result<WireCatalog, TransportError> {
        if options.ignore_terminus {
            return self.from_cache(node);
        }

        if !options.ignore_cache {
            match self.cache.load(node) {
                Ok(Some(catalog)) => return Ok(catalog),
                Ok(None) => {}
                Err(e) => log::debug!("Ignoring unusable cache entry: {e}"),
            }
        }

        let catalog = self.terminus.find(node, options)?;
        if let Err(e) = self.cache.save(&catalog) {
            log::warn!("Could not cache catalog for {node}: {e}");
        }
        Ok(catalog)
    }

    fn close(&self) {
        self.terminus.close();
    }
}
