//! Catalog acquisition with cache fallback
//!
//! A fresh catalog is always requested first. If that fails for any reason
//! the cached copy is used instead (unless disabled). Errors never escape:
//! the caller only learns whether a usable catalog came back.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use super::transport::{CatalogTransport, FindOptions, TransportError};
use super::wire::WireCatalog;
use super::Catalog;
use crate::facts::FactOptions;
use crate::resource::ResourceContext;

/// Fetches, converts and finalizes the catalog for a node
pub struct CatalogAcquirer {
    transport: Arc<dyn CatalogTransport>,
    ctx: ResourceContext,
    class_file: PathBuf,
    use_cache_on_failure: bool,
    trace: bool,
}

impl fmt::Debug for CatalogAcquirer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogAcquirer")
            .field("class_file", &self.class_file)
            .field("use_cache_on_failure", &self.use_cache_on_failure)
            .field("trace", &self.trace)
            .finish_non_exhaustive()
    }
}

impl CatalogAcquirer {
    pub fn new(
        transport: Arc<dyn CatalogTransport>,
        ctx: ResourceContext,
        class_file: impl Into<PathBuf>,
    ) -> Self {
        Self {
            transport,
            ctx,
            class_file: class_file.into(),
            use_cache_on_failure: true,
            trace: false,
        }
    }

    /// Fall back to the cached catalog when the server fails
    pub fn use_cache_on_failure(mut self, enabled: bool) -> Self {
        self.use_cache_on_failure = enabled;
        self
    }

    /// Log full error chains
    pub fn trace(mut self, enabled: bool) -> Self {
        self.trace = enabled;
        self
    }

    /// Get a ready-to-apply catalog for `node`, or `None`
    pub fn fetch(&self, node: &str, facts: &FactOptions) -> Option<Catalog> {
        let started = Instant::now();

        let fresh = FindOptions {
            ignore_cache: true,
            facts: Some(facts.clone()),
            ..Default::default()
        };
        let (wire, started) = match self.transport.find(node, &fresh) {
            Ok(wire) => (wire, started),
            Err(e) => {
                self.log_failure("Could not retrieve catalog from remote server", e);
                let started = Instant::now();
                (self.from_cache(node)?, started)
            }
        };

        self.prepare(wire, started)
    }

    fn from_cache(&self, node: &str) -> Option<WireCatalog> {
        if !self.use_cache_on_failure {
            log::warn!("Not using cache on failed catalog");
            return None;
        }

        let cached = FindOptions {
            ignore_terminus: true,
            ..Default::default()
        };
        match self.transport.find(node, &cached) {
            Ok(wire) => {
                log::warn!("Using cached catalog");
                Some(wire)
            }
            Err(e) => {
                self.log_failure("Could not retrieve catalog from cache", e);
                None
            }
        }
    }

    fn prepare(&self, wire: WireCatalog, started: Instant) -> Option<Catalog> {
        let mut catalog = match wire.to_catalog(&self.ctx) {
            Ok(catalog) => catalog,
            Err(e) => {
                log::error!("Could not convert catalog for {}: {e}", wire.name);
                return None;
            }
        };

        if let Err(e) = catalog.finalize() {
            log::error!("Could not finalize catalog for {}: {e}", wire.name);
            return None;
        }

        catalog.retrieval_duration = Some(started.elapsed());
        catalog.host_config = true;

        if let Err(e) = catalog.write_class_file(&self.class_file) {
            log::warn!("Could not write class file: {e:#}");
        }

        Some(catalog)
    }

    fn log_failure(&self, context: &str, error: TransportError) {
        if self.trace {
            log::error!("{context}: {:?}", anyhow::Error::new(error));
        } else {
            log::error!("{context}: {error}");
        }
    }
}
