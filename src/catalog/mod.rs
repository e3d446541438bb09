//! Catalogs: the ordered set of resources a node should converge to
//!
//! A [`Catalog`] is fetched (see [`acquire`]), finalized, applied once into a
//! [`Transaction`], and cleared at the end of the run.

pub mod acquire;
pub mod cache;
pub mod transport;
pub mod wire;

pub use acquire::CatalogAcquirer;
pub use cache::CatalogCache;
pub use transport::{CatalogTransport, FindOptions, HttpTerminus, Indirector, TransportError};
pub use wire::{WireCatalog, WireResource};

use crate::resource::ResourceContext;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::{ApplySummary, BoxedResource, Resource, ResourceOutcome, RunReport};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

/// Errors building or applying a catalog
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Unsupported resource type '{kind}' for {title}")]
    UnsupportedType { kind: String, title: String },

    #[error("Unsupported parameter '{parameter}' on {resource}")]
    UnsupportedParameter { resource: String, parameter: String },

    #[error("Invalid {resource}: {message}")]
    InvalidResource { resource: String, message: String },

    #[error("Duplicate declaration: {0} is already declared")]
    Duplicate(String),

    #[error("Catalog for {0} must be finalized before it is applied")]
    NotFinalized(String),
}

/// Resources to converge, in application order
#[derive(Debug)]
pub struct Catalog {
    name: String,
    version: Option<DateTime<Utc>>,
    classes: Vec<String>,
    resources: Vec<BoxedResource>,
    finalized: bool,

    /// Set once the catalog is known to describe this host
    pub host_config: bool,

    /// How long fetching the catalog took
    pub retrieval_duration: Option<Duration>,
}

impl Catalog {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            classes: Vec::new(),
            resources: Vec::new(),
            finalized: false,
            host_config: false,
            retrieval_duration: None,
        }
    }

    /// Load, convert and finalize a catalog stored as JSON
    pub fn from_file(path: &Path, ctx: &ResourceContext) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog: {}", path.display()))?;
        let wire = WireCatalog::from_json(&content)
            .with_context(|| format!("Failed to parse catalog: {}", path.display()))?;

        let mut catalog = wire.to_catalog(ctx)?;
        catalog.finalize()?;
        Ok(catalog)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compile time of the catalog
    pub fn version(&self) -> Option<DateTime<Utc>> {
        self.version
    }

    /// Set the compile time from epoch seconds
    pub fn set_version(&mut self, epoch: Option<i64>) {
        self.version = epoch.and_then(|secs| DateTime::from_timestamp(secs, 0));
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn add_class(&mut self, class: impl Into<String>) {
        let class = class.into();
        if !self.classes.contains(&class) {
            self.classes.push(class);
        }
    }

    pub fn resources(&self) -> &[BoxedResource] {
        &self.resources
    }

    pub fn add_resource(&mut self, resource: BoxedResource) {
        self.resources.push(resource);
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Freeze the catalog after checking that no two resources share a
    /// reference, or manage the same thing under different titles
    pub fn finalize(&mut self) -> Result<(), CatalogError> {
        let mut references = HashSet::new();
        let mut names = HashSet::new();
        for resource in &self.resources {
            let reference = resource.reference();
            if !references.insert(reference.clone())
                || !names.insert((resource.resource_type(), resource.name_var()))
            {
                return Err(CatalogError::Duplicate(reference));
            }
        }
        self.finalized = true;
        Ok(())
    }

    /// Apply every resource in order, recording outcomes in `transaction`
    ///
    /// A resource that cannot be evaluated is recorded as failed; the rest
    /// still run.
    pub fn apply(&mut self, transaction: &mut Transaction) -> Result<(), CatalogError> {
        if !self.finalized {
            return Err(CatalogError::NotFinalized(self.name.clone()));
        }

        let started = Instant::now();
        for resource in &mut self.resources {
            let outcome = match resource.apply() {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("{}: could not evaluate: {e:#}", resource.reference());
                    ResourceOutcome::failed(
                        resource.reference(),
                        resource.resource_type(),
                        format!("{e:#}"),
                    )
                }
            };
            transaction.record(outcome);
        }
        transaction.evaluation_time += started.elapsed();

        Ok(())
    }

    /// Write the class names of this catalog, one per line
    pub fn write_class_file(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }

        let mut content = String::new();
        for class in &self.classes {
            content.push_str(class);
            content.push('\n');
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write class file: {}", path.display()))?;
        log::debug!("Wrote {} classes to {}", self.classes.len(), path.display());
        Ok(())
    }

    /// Drop every resource along with its cached lookups
    pub fn clear(&mut self) {
        for resource in &mut self.resources {
            resource.clear();
        }
        self.resources.clear();
        self.finalized = false;
    }
}

/// Outcomes of one catalog application
#[derive(Debug, Default)]
pub struct Transaction {
    outcomes: Vec<ResourceOutcome>,
    evaluation_time: Duration,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: ResourceOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[ResourceOutcome] {
        &self.outcomes
    }

    pub fn evaluation_time(&self) -> Duration {
        self.evaluation_time
    }

    /// Move outcomes into `report` and add the resources, changes, events
    /// and time metric groups
    pub fn add_metrics_to_report(self, report: &mut RunReport, config_retrieval: Option<Duration>) {
        let summary = ApplySummary::from_outcomes(&self.outcomes);

        let total = self.outcomes.len();
        let changed = self.outcomes.iter().filter(|o| o.is_changed()).count();
        let failed = self.outcomes.iter().filter(|o| o.is_failed()).count();
        let skipped = self.outcomes.iter().filter(|o| o.is_skipped()).count();
        let out_of_sync = self
            .outcomes
            .iter()
            .filter(|o| o.is_changed() || o.is_failed() || o.is_skipped())
            .count();

        report.add_metric(
            "resources",
            [
                ("total", total as f64),
                ("changed", changed as f64),
                ("failed", failed as f64),
                ("skipped", skipped as f64),
                ("out_of_sync", out_of_sync as f64),
            ],
        );
        report.add_metric("changes", [("total", summary.changed as f64)]);

        let events: usize = self.outcomes.iter().map(|o| o.events().count()).sum();
        report.add_metric(
            "events",
            [
                ("total", (events + summary.failed) as f64),
                ("success", events as f64),
                ("failure", summary.failed as f64),
            ],
        );

        let mut times: BTreeMap<String, f64> = BTreeMap::new();
        for outcome in &self.outcomes {
            *times.entry(outcome.resource_type.clone()).or_default() += outcome.evaluation_time;
        }
        if let Some(retrieval) = config_retrieval {
            times.insert("config_retrieval".to_string(), retrieval.as_secs_f64());
        }
        let time_total: f64 = times.values().sum();
        let mut time_values: Vec<(&str, f64)> =
            times.iter().map(|(name, secs)| (name.as_str(), *secs)).collect();
        time_values.push(("total", time_total));
        report.add_metric("time", time_values);

        for outcome in self.outcomes {
            report.add_resource_outcome(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{ChangeEvent, PropertyOutcome, PropertyStatus};
    use tempfile::TempDir;

    #[derive(Debug)]
    struct Stub {
        title: String,
        fail: bool,
        cleared: bool,
    }

    fn stub(title: &str, fail: bool) -> BoxedResource {
        Box::new(Stub {
            title: title.into(),
            fail,
            cleared: false,
        })
    }

    impl Resource for Stub {
        fn resource_type(&self) -> &'static str {
            "file"
        }

        fn title(&self) -> &str {
            &self.title
        }

        fn property_names(&self) -> Vec<&'static str> {
            vec!["mode"]
        }

        fn apply(&mut self) -> Result<ResourceOutcome> {
            if self.fail {
                anyhow::bail!("cannot evaluate");
            }
            let mut outcome = ResourceOutcome::new(self.reference(), "file");
            outcome.evaluation_time = 0.5;
            outcome.properties.push(PropertyStatus {
                property: "mode".into(),
                outcome: PropertyOutcome::Changed(ChangeEvent {
                    resource: self.reference(),
                    property: "mode".into(),
                    event: "inode_changed".into(),
                    previous: "600".into(),
                    desired: "644".into(),
                    message: "mode changed '600' to '644'".into(),
                }),
            });
            Ok(outcome)
        }

        fn clear(&mut self) {
            self.cleared = true;
        }
    }

    #[test]
    fn duplicate_references_fail_finalize() {
        let mut catalog = Catalog::new("node1");
        catalog.add_resource(stub("/a", false));
        catalog.add_resource(stub("/a", false));
        let err = catalog.finalize().unwrap_err();
        assert!(matches!(err, CatalogError::Duplicate(r) if r == "File[/a]"));
    }

    #[test]
    fn same_path_under_two_titles_fails_finalize() {
        let (ctx, _) = crate::resource::testing::context(crate::platform::RecordingPlatform::default());
        let mut catalog = Catalog::new("node1");
        catalog.add_resource(Box::new(
            crate::resource::FileResource::new("/etc/motd", ctx.clone()).unwrap(),
        ));
        catalog.add_resource(Box::new(
            crate::resource::FileResource::titled("motd", "/etc/motd", ctx).unwrap(),
        ));

        let err = catalog.finalize().unwrap_err();
        assert!(matches!(err, CatalogError::Duplicate(r) if r == "File[motd]"));
    }

    #[test]
    fn apply_requires_finalize() {
        let mut catalog = Catalog::new("node1");
        let mut transaction = Transaction::new();
        assert!(matches!(
            catalog.apply(&mut transaction),
            Err(CatalogError::NotFinalized(_))
        ));
    }

    #[test]
    fn failing_resource_does_not_stop_the_run() {
        let mut catalog = Catalog::new("node1");
        catalog.add_resource(stub("/a", true));
        catalog.add_resource(stub("/b", false));
        catalog.finalize().unwrap();

        let mut transaction = Transaction::new();
        catalog.apply(&mut transaction).unwrap();

        let outcomes = transaction.outcomes();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_failed());
        assert!(outcomes[1].is_changed());
    }

    #[test]
    fn metrics_are_added_to_report() {
        let mut catalog = Catalog::new("node1");
        catalog.add_resource(stub("/a", true));
        catalog.add_resource(stub("/b", false));
        catalog.finalize().unwrap();
        let mut transaction = Transaction::new();
        catalog.apply(&mut transaction).unwrap();

        let mut report = RunReport::new("node1");
        transaction.add_metrics_to_report(&mut report, Some(Duration::from_millis(250)));

        assert_eq!(report.resource_statuses.len(), 2);
        let resources = &report.metrics["resources"];
        assert_eq!(resources.get("total"), Some(2.0));
        assert_eq!(resources.get("changed"), Some(1.0));
        assert_eq!(resources.get("failed"), Some(1.0));
        assert_eq!(report.metrics["changes"].get("total"), Some(1.0));
        assert_eq!(report.metrics["events"].get("success"), Some(1.0));
        let time = &report.metrics["time"];
        assert_eq!(time.get("config_retrieval"), Some(0.25));
        assert_eq!(time.get("total"), Some(0.75));
    }

    #[test]
    fn class_file_lists_classes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state").join("classes.txt");

        let mut catalog = Catalog::new("node1");
        catalog.add_class("base");
        catalog.add_class("web");
        catalog.add_class("base");
        catalog.write_class_file(&path).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "base\nweb\n");
    }

    #[test]
    fn from_file_builds_a_finalized_catalog() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("catalog.json");
        fs::write(
            &path,
            r#"{"name": "node1", "classes": ["base"],
                "resources": [{"type": "file", "title": "/etc/motd", "parameters": {"mode": "0644"}}]}"#,
        )
        .unwrap();
        let (ctx, _) = crate::resource::testing::context(crate::platform::RecordingPlatform::default());

        let catalog = Catalog::from_file(&path, &ctx).unwrap();
        assert!(catalog.is_finalized());
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.classes(), ["base"]);
    }

    #[test]
    fn from_file_reports_parse_errors() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("catalog.json");
        fs::write(&path, "not json").unwrap();
        let (ctx, _) = crate::resource::testing::context(crate::platform::RecordingPlatform::default());

        let err = Catalog::from_file(&path, &ctx).unwrap_err();
        assert!(err.to_string().contains("Failed to parse catalog"));
    }

    #[test]
    fn clear_drops_resources() {
        let mut catalog = Catalog::new("node1");
        catalog.add_resource(stub("/a", false));
        catalog.finalize().unwrap();
        catalog.clear();
        assert!(catalog.is_empty());
        assert!(!catalog.is_finalized());
    }
}
