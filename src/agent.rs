//! The agent run: one full configuration cycle
//!
//! ```text
//! Preparing ─▶ Acquiring ─▶ Applying ─▶ Reporting
//!                  │                        ▲
//!                  └── no catalog ──────────┘
//! ```
//!
//! Every run ends in Reporting, whatever happened before. Failures of
//! individual phases are logged and contained; only a failing post-run hook
//! turns the run into an error, and only after the report was stored.

use anyhow::Result;
use declarative::RunReport;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::catalog::{
    Catalog, CatalogAcquirer, CatalogCache, CatalogTransport, HttpTerminus, Indirector,
    Transaction,
};
use crate::facts::{FactOptions, Facts};
use crate::hooks::{CommandHook, HookError};
use crate::logging::LogCapture;
use crate::paths;
use crate::report::{self, FileReportSink, ReportSink};
use crate::resource::ResourceContext;
use crate::settings::Settings;
use crate::state::{AgentState, LastRun, StateError, StateStore};

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Preparing,
    Acquiring,
    Applying,
    Reporting,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Acquiring => "acquiring",
            Self::Applying => "applying",
            Self::Reporting => "reporting",
        };
        f.write_str(name)
    }
}

/// Errors that end a run
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Hook(#[from] HookError),

    #[error(transparent)]
    StateCorruption(#[from] StateError),

    #[error("Plugin sync failed: {0}")]
    PluginSync(String),
}

/// Downloads plugins before a run
pub trait PluginSync: fmt::Debug {
    fn download_plugins(&self) -> Result<()>;

    fn download_fact_plugins(&self) -> Result<()>;
}

/// Plugin sync that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct SkipPluginSync;

impl PluginSync for SkipPluginSync {
    fn download_plugins(&self) -> Result<()> {
        log::debug!("Plugin sync disabled");
        Ok(())
    }

    fn download_fact_plugins(&self) -> Result<()> {
        log::debug!("Fact plugin sync disabled");
        Ok(())
    }
}

/// Options for a single run
#[derive(Debug, Default)]
pub struct RunOptions {
    /// Apply this catalog instead of fetching one
    pub catalog: Option<Catalog>,
}

/// Runs configuration cycles
pub struct Agent {
    settings: Settings,
    transport: Arc<dyn CatalogTransport>,
    ctx: ResourceContext,
    state: StateStore,
    sink: Box<dyn ReportSink>,
    plugins: Box<dyn PluginSync>,
    class_file: PathBuf,
    phase: Phase,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("certname", &self.settings.certname)
            .field("phase", &self.phase)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Agent {
    pub fn new(
        settings: Settings,
        transport: Arc<dyn CatalogTransport>,
        ctx: ResourceContext,
        state_dir: &Path,
    ) -> Self {
        Self {
            settings,
            transport,
            ctx,
            state: StateStore::new(paths::state_file(state_dir)),
            sink: Box::new(FileReportSink::new(paths::reports_dir(state_dir))),
            plugins: Box::new(SkipPluginSync),
            class_file: paths::class_file(state_dir),
            phase: Phase::Idle,
        }
    }

    /// Agent talking to the configured server, caching under the state directory
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let timeout = settings.timeout()?;
        let state_dir = settings.state_dir()?;

        let transport = Indirector::new(
            HttpTerminus::new(&settings.server, timeout),
            CatalogCache::new(paths::catalog_cache_dir(&state_dir)),
        );
        Ok(Self::new(
            settings,
            Arc::new(transport),
            ResourceContext::system(),
            &state_dir,
        ))
    }

    pub fn with_report_sink(mut self, sink: Box<dyn ReportSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_plugin_sync(mut self, plugins: Box<dyn PluginSync>) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn context(&self) -> &ResourceContext {
        &self.ctx
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        log::debug!("Run phase: {} -> {phase}", self.phase);
        self.phase = phase;
    }

    /// Run one cycle
    pub fn run(&mut self, options: RunOptions) -> Result<RunReport, AgentError> {
        let started = Instant::now();

        self.enter(Phase::Preparing);
        let mut state = match self.state.load() {
            Ok(state) => state,
            Err(e) => {
                self.log_failure(
                    "Failed to prepare catalog",
                    &anyhow::Error::new(AgentError::from(e)),
                );
                AgentState::default()
            }
        };
        if let Err(e) = self.prepare() {
            self.log_failure("Failed to prepare catalog", &anyhow::Error::new(e));
        }

        let capture = LogCapture::start();
        let mut report = RunReport::new(&self.settings.certname);

        self.enter(Phase::Acquiring);
        let mut catalog = match options.catalog {
            Some(catalog) => {
                log::debug!("Using supplied catalog for {}", catalog.name());
                Some(catalog)
            }
            None => self.acquire(),
        };

        let mut transaction = None;
        match catalog.as_mut() {
            Some(catalog) => {
                report.configuration_version = catalog.version().map(|v| v.timestamp());
                self.enter(Phase::Applying);
                transaction = Some(self.apply(catalog));
            }
            None => log::error!("Could not retrieve catalog; skipping run"),
        }

        self.enter(Phase::Reporting);
        self.transport.close();

        let postrun = CommandHook::new("postrun_command", &self.settings.postrun_command).execute();
        if let Err(e) = &postrun {
            log::error!("{e}");
        }

        report.record_logs(capture.finish());
        if let Some(transaction) = transaction {
            let retrieval = catalog.as_ref().and_then(|c| c.retrieval_duration);
            transaction.add_metrics_to_report(&mut report, retrieval);
        }
        report.set_total_time(started.elapsed());

        if self.settings.summarize {
            report::print_summary(&report);
        }
        if self.settings.report
            && let Err(e) = self.sink.save(&report)
        {
            self.log_failure("Could not send report", &e);
        }

        self.record_state(&mut state, &report, catalog.as_ref());

        if let Some(catalog) = catalog.as_mut() {
            catalog.clear();
        }
        self.enter(Phase::Idle);

        postrun?;
        Ok(report)
    }

    /// Plugin sync and the pre-run hook; the loaded state survives a failure here
    fn prepare(&self) -> Result<(), AgentError> {
        self.plugins
            .download_plugins()
            .and_then(|()| self.plugins.download_fact_plugins())
            .map_err(|e| AgentError::PluginSync(format!("{e:#}")))?;

        CommandHook::new("prerun_command", &self.settings.prerun_command).execute()?;
        Ok(())
    }

    fn acquire(&self) -> Option<Catalog> {
        let certname = &self.settings.certname;
        let facts = match Facts::collect(certname).for_uploading() {
            Ok(facts) => facts,
            Err(e) => {
                self.log_failure("Could not collect facts", &e);
                FactOptions::default()
            }
        };

        CatalogAcquirer::new(self.transport.clone(), self.ctx.clone(), &self.class_file)
            .use_cache_on_failure(self.settings.usecacheonfailure)
            .trace(self.settings.trace)
            .fetch(certname, &facts)
    }

    fn apply(&self, catalog: &mut Catalog) -> Transaction {
        let mut transaction = Transaction::new();
        let started = Instant::now();

        match catalog.apply(&mut transaction) {
            Ok(()) => log::info!(
                "Finished catalog run in {:.2} seconds",
                started.elapsed().as_secs_f64()
            ),
            Err(e) => self.log_failure("Failed to apply catalog", &anyhow::Error::new(e)),
        }
        transaction
    }

    fn record_state(&self, state: &mut AgentState, report: &RunReport, catalog: Option<&Catalog>) {
        let summary = report.apply_summary();
        state.last_run = Some(LastRun {
            time: report.time,
            status: report.status().to_string(),
            changes: summary.changed,
            failures: summary.failed,
        });
        if let Some(catalog) = catalog {
            state.configuration.compile_time = catalog.version();
            state.configuration.retrieval_seconds =
                catalog.retrieval_duration.map(|d| d.as_secs_f64());
        }

        if let Err(e) = self.state.save(state) {
            self.log_failure("Could not save state", &e);
        }
    }

    fn log_failure(&self, context: &str, error: &anyhow::Error) {
        if self.settings.trace {
            log::error!("{context}: {error:?}");
        } else {
            log::error!("{context}: {error:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::transport::testing::FakeTerminus;
    use crate::catalog::{WireCatalog, WireResource};
    use crate::platform::RecordingPlatform;
    use crate::report::MemorySink;
    use crate::resource::{FileResource, testing};
    use declarative::Desired;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    /// Cloneable handle so tests can inspect the transport after the run
    #[derive(Debug, Clone)]
    struct Shared(Arc<Indirector<FakeTerminus>>);

    impl CatalogTransport for Shared {
        fn find(
            &self,
            node: &str,
            options: &crate::catalog::FindOptions,
        ) -> Result<WireCatalog, crate::catalog::TransportError> {
            self.0.find(node, options)
        }

        fn close(&self) {
            self.0.close();
        }
    }

    #[derive(Debug, Clone, Default)]
    struct SharedSink(Arc<MemorySink>);

    impl ReportSink for SharedSink {
        fn save(&self, report: &RunReport) -> Result<()> {
            self.0.save(report)
        }
    }

    #[derive(Debug)]
    struct FailingPlugins;

    impl PluginSync for FailingPlugins {
        fn download_plugins(&self) -> Result<()> {
            anyhow::bail!("plugin server unreachable")
        }

        fn download_fact_plugins(&self) -> Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        tmp: TempDir,
        transport: Shared,
        sink: SharedSink,
        platform: Arc<RecordingPlatform>,
        agent: Agent,
    }

    fn settings() -> Settings {
        Settings {
            certname: "node1".into(),
            ..Default::default()
        }
    }

    fn fixture(settings: Settings, terminus: FakeTerminus) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let transport = Shared(Arc::new(Indirector::new(
            terminus,
            CatalogCache::new(paths::catalog_cache_dir(tmp.path())),
        )));
        let (ctx, platform) = testing::context(RecordingPlatform {
            apply_modes: true,
            ..Default::default()
        });
        let sink = SharedSink::default();
        let agent = Agent::new(settings, Arc::new(transport.clone()), ctx, tmp.path())
            .with_report_sink(Box::new(sink.clone()));

        Fixture {
            tmp,
            transport,
            sink,
            platform,
            agent,
        }
    }

    fn wire_catalog(path: &Path) -> WireCatalog {
        let mut parameters = BTreeMap::new();
        parameters.insert("mode".to_string(), json!("600"));
        WireCatalog {
            name: "node1".into(),
            version: Some(1_700_000_000),
            classes: vec!["base".into()],
            resources: vec![WireResource {
                kind: "file".into(),
                title: path.to_string_lossy().into_owned(),
                parameters,
            }],
        }
    }

    #[test]
    fn no_catalog_cleans_up_once_and_reports_nothing() {
        let mut f = fixture(settings(), FakeTerminus::default());

        let report = f.agent.run(RunOptions::default()).unwrap();

        assert!(report.resource_statuses.is_empty());
        assert!(report.metrics.is_empty());
        assert!(report.total_time.is_some());
        assert_eq!(f.transport.0.terminus().find_count(), 1);
        assert_eq!(f.transport.0.terminus().close_count(), 1);
        assert_eq!(f.sink.0.saved.lock().unwrap().len(), 1);
        assert_eq!(f.agent.phase(), Phase::Idle);
    }

    #[test]
    fn fetched_catalog_is_applied_and_reported() {
        let target = TempDir::new().unwrap();
        let path = target.path().join("motd");
        fs::write(&path, "hi").unwrap();

        let terminus = FakeTerminus::serving(wire_catalog(&path));
        let mut f = fixture(settings(), terminus);

        let report = f.agent.run(RunOptions::default()).unwrap();

        assert_eq!(report.status(), "changed");
        assert_eq!(report.configuration_version, Some(1_700_000_000));
        assert_eq!(report.metrics["resources"].get("changed"), Some(1.0));
        assert!(report.metrics["time"].get("config_retrieval").is_some());
        assert_eq!(f.platform.mode_call_count(), 1);
        assert!(f.tmp.path().join("classes.txt").exists());

        let state = StateStore::new(paths::state_file(f.tmp.path())).load().unwrap();
        let last = state.last_run.unwrap();
        assert_eq!(last.status, "changed");
        assert_eq!(last.changes, 1);
        assert_eq!(state.configuration.compile_time.unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn supplied_catalog_skips_the_network() {
        let target = TempDir::new().unwrap();
        let path = target.path().join("motd");
        fs::write(&path, "hi").unwrap();

        let mut f = fixture(settings(), FakeTerminus::default());
        let mut catalog = Catalog::new("node1");
        catalog.add_resource(Box::new(
            FileResource::new(&path.to_string_lossy(), f.agent.context().clone())
                .unwrap()
                .with_mode(Desired::Scalar("640".into())),
        ));
        catalog.finalize().unwrap();

        let report = f
            .agent
            .run(RunOptions {
                catalog: Some(catalog),
            })
            .unwrap();

        assert_eq!(report.resource_statuses.len(), 1);
        assert_eq!(f.transport.0.terminus().find_count(), 0);
        assert_eq!(f.transport.0.terminus().close_count(), 1);
    }

    #[test]
    fn prepare_failures_do_not_stop_the_run() {
        let mut f = fixture(
            Settings {
                prerun_command: "exit 1".into(),
                ..settings()
            },
            FakeTerminus::default(),
        );
        f.agent = f.agent.with_plugin_sync(Box::new(FailingPlugins));

        assert!(f.agent.run(RunOptions::default()).is_ok());
        assert_eq!(f.transport.0.terminus().find_count(), 1);
    }

    #[test]
    fn failed_plugin_sync_keeps_the_saved_state() {
        let mut f = fixture(settings(), FakeTerminus::default());
        let store = StateStore::new(paths::state_file(f.tmp.path()));
        let mut saved = AgentState::default();
        saved.configuration.compile_time = chrono::DateTime::from_timestamp(1_700_000_000, 0);
        store.save(&mut saved).unwrap();
        f.agent = f.agent.with_plugin_sync(Box::new(FailingPlugins));

        f.agent.run(RunOptions::default()).unwrap();

        let state = store.load().unwrap();
        assert_eq!(state.configuration.compile_time.unwrap().timestamp(), 1_700_000_000);
        assert!(state.last_run.is_some());
    }

    #[test]
    fn failing_postrun_is_an_error_after_reporting() {
        let mut f = fixture(
            Settings {
                postrun_command: "exit 4".into(),
                ..settings()
            },
            FakeTerminus::default(),
        );

        let err = f.agent.run(RunOptions::default()).unwrap_err();
        assert!(matches!(err, AgentError::Hook(_)));
        assert_eq!(f.sink.0.saved.lock().unwrap().len(), 1);
        assert_eq!(f.transport.0.terminus().close_count(), 1);
    }

    #[test]
    fn reporting_can_be_disabled() {
        let mut f = fixture(
            Settings {
                report: false,
                ..settings()
            },
            FakeTerminus::default(),
        );

        f.agent.run(RunOptions::default()).unwrap();
        assert!(f.sink.0.saved.lock().unwrap().is_empty());
    }

    #[test]
    fn cached_catalog_is_used_when_server_fails() {
        let target = TempDir::new().unwrap();
        let path = target.path().join("motd");
        fs::write(&path, "hi").unwrap();

        let mut f = fixture(settings(), FakeTerminus::default());
        CatalogCache::new(paths::catalog_cache_dir(f.tmp.path()))
            .save(&wire_catalog(&path))
            .unwrap();

        let report = f.agent.run(RunOptions::default()).unwrap();
        assert_eq!(report.resource_statuses.len(), 1);
    }

    #[test]
    fn corrupt_state_is_recovered() {
        let mut f = fixture(settings(), FakeTerminus::default());
        let state_file = paths::state_file(f.tmp.path());
        fs::write(&state_file, "[[[ not toml").unwrap();

        f.agent.run(RunOptions::default()).unwrap();

        let state = StateStore::new(&state_file).load().unwrap();
        assert_eq!(state.last_run.unwrap().status, "unchanged");
    }
}
