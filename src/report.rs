//! Persisting and printing run reports

use anyhow::{Context, Result};
use colored::Colorize;
use declarative::RunReport;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::ui;

/// Destination for finished run reports
pub trait ReportSink: fmt::Debug {
    fn save(&self, report: &RunReport) -> Result<()>;
}

/// One JSON file per run under `<dir>/<host>/`
#[derive(Debug, Clone)]
pub struct FileReportSink {
    dir: PathBuf,
}

impl FileReportSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Where `report` is written
    pub fn path_for(&self, report: &RunReport) -> PathBuf {
        self.dir
            .join(&report.host)
            .join(format!("{}.json", report.time.format("%Y%m%d%H%M%S")))
    }
}

impl ReportSink for FileReportSink {
    fn save(&self, report: &RunReport) -> Result<()> {
        let path = self.path_for(report);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create report directory: {}", dir.display()))?;
        }

        let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;

        log::debug!("Saved report to {}", path.display());
        Ok(())
    }
}

/// Print the human summary of a run
pub fn print_summary(report: &RunReport) {
    ui::header(&format!("Run summary for {}", report.host));

    let status = match report.status() {
        "failed" => "failed".red().bold(),
        "changed" => "changed".yellow().bold(),
        other => other.green().bold(),
    };
    ui::kv("Status", &status.to_string());
    if let Some(version) = report.configuration_version {
        ui::kv("Configuration version", &version.to_string());
    }
    if let Some(total) = report.total_time {
        ui::kv("Run time", &format!("{total:.2}s"));
    }

    let changed = report.changed_resources();
    if !changed.is_empty() {
        ui::section("Changed resources");
        for resource in changed {
            ui::dim(resource);
        }
    }

    println!();
    print!("{}", report.summary());
}

/// Most recent report file for `host`, if any
pub fn latest(dir: &Path, host: &str) -> Result<Option<PathBuf>> {
    let host_dir = dir.join(host);
    if !host_dir.exists() {
        return Ok(None);
    }

    let mut newest: Option<PathBuf> = None;
    for entry in fs::read_dir(&host_dir)
        .with_context(|| format!("Failed to read report directory: {}", host_dir.display()))?
    {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "json")
            && newest.as_ref().is_none_or(|current| path > *current)
        {
            newest = Some(path);
        }
    }
    Ok(newest)
}

/// Collects reports in memory
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemorySink {
    pub fail: bool,
    pub saved: std::sync::Mutex<Vec<RunReport>>,
}

#[cfg(test)]
impl ReportSink for MemorySink {
    fn save(&self, report: &RunReport) -> Result<()> {
        if self.fail {
            anyhow::bail!("report sink unavailable");
        }
        self.saved.lock().unwrap().push(report.clone());
        Ok(())
    }
}
