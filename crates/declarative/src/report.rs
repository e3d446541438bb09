//! Run report aggregation
//!
//! A [`RunReport`] collects, for one cycle, the outcome of every applied
//! resource, grouped metrics and the log lines emitted while the run was in
//! progress. Persisting or printing it is left to the caller.

use crate::types::{ApplySummary, ResourceOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

/// Display order of metric groups in [`RunReport::summary`]
const SUMMARY_ORDER: &[&str] = &["changes", "events", "resources", "time"];

/// One log line captured during the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    pub level: String,
    pub source: String,
    pub message: String,
}

/// A single named value inside a metric group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub name: String,
    pub label: String,
    pub value: f64,
}

/// A group of related values, e.g. resource counts or timings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub label: String,
    pub values: Vec<MetricValue>,
}

impl Metric {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.iter().find(|v| v.name == name).map(|v| v.value)
    }
}

/// Structured summary of one cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub host: String,
    pub time: DateTime<Utc>,
    /// Compile timestamp of the applied catalog
    pub configuration_version: Option<i64>,
    pub resource_statuses: Vec<ResourceOutcome>,
    pub metrics: BTreeMap<String, Metric>,
    pub logs: Vec<LogEntry>,
    /// Wall-clock seconds for the whole run
    pub total_time: Option<f64>,
}

impl RunReport {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            time: Utc::now(),
            configuration_version: None,
            resource_statuses: Vec::new(),
            metrics: BTreeMap::new(),
            logs: Vec::new(),
            total_time: None,
        }
    }

    /// Record the outcome of one applied resource
    pub fn add_resource_outcome(&mut self, outcome: ResourceOutcome) {
        self.resource_statuses.push(outcome);
    }

    /// Add (or replace) a metric group
    ///
    /// `values` are `(name, value)` pairs; labels are derived from names.
    pub fn add_metric<'a>(
        &mut self,
        name: &str,
        values: impl IntoIterator<Item = (&'a str, f64)>,
    ) {
        let metric = Metric {
            label: labelize(name),
            values: values
                .into_iter()
                .map(|(name, value)| MetricValue {
                    name: name.to_string(),
                    label: labelize(name),
                    value,
                })
                .collect(),
        };
        self.metrics.insert(name.to_string(), metric);
    }

    /// Append captured log lines
    pub fn record_logs(&mut self, entries: impl IntoIterator<Item = LogEntry>) {
        self.logs.extend(entries);
    }

    pub fn set_total_time(&mut self, elapsed: Duration) {
        self.total_time = Some(elapsed.as_secs_f64());
    }

    /// Per-property counts across all resources
    pub fn apply_summary(&self) -> ApplySummary {
        ApplySummary::from_outcomes(&self.resource_statuses)
    }

    /// Number of change events emitted during the run
    pub fn event_count(&self) -> usize {
        self.resource_statuses.iter().map(|o| o.events().count()).sum()
    }

    /// References of resources that changed
    pub fn changed_resources(&self) -> Vec<&str> {
        self.resource_statuses
            .iter()
            .filter(|o| o.is_changed())
            .map(|o| o.resource.as_str())
            .collect()
    }

    /// Overall status: "failed", "changed" or "unchanged"
    pub fn status(&self) -> &'static str {
        if self.resource_statuses.iter().any(ResourceOutcome::is_failed) {
            "failed"
        } else if self.resource_statuses.iter().any(ResourceOutcome::is_changed) {
            "changed"
        } else {
            "unchanged"
        }
    }

    /// Plain-text summary of the metric groups
    pub fn summary(&self) -> String {
        let mut out = String::new();

        for name in SUMMARY_ORDER {
            let Some(metric) = self.metrics.get(*name) else {
                continue;
            };
            let _ = writeln!(out, "{}:", metric.label);

            let mut values: Vec<&MetricValue> = metric.values.iter().collect();
            // Totals close each group
            values.sort_by_key(|v| v.name == "total");
            for value in values {
                let _ = writeln!(out, "{:>18}: {}", value.label, format_value(value.value));
            }
        }

        if out.is_empty() {
            out.push_str("No metrics recorded\n");
        }
        out
    }
}

/// "config_retrieval" -> "Config retrieval"
fn labelize(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value:.2}")
    }
}
