//! Core types for declarative property management

use serde::{Deserialize, Serialize};

/// Desired value of a property as written in the catalog, before normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Desired {
    /// A single value
    Scalar(String),
    /// Several acceptable values; the first one is applied
    List(Vec<String>),
    /// Nothing to manage for this property
    NotApplicable,
}

impl Desired {
    /// Check if the desired value carries anything to converge to
    pub fn is_applicable(&self) -> bool {
        !matches!(self, Self::NotApplicable)
    }
}

/// Normalized desired value(s) of a property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Should<T> {
    Scalar(T),
    List(Vec<T>),
    NotApplicable,
}

impl<T> Should<T> {
    /// The value `sync` converges to, if any
    pub fn target(&self) -> Option<&T> {
        match self {
            Self::Scalar(value) => Some(value),
            Self::List(values) => values.first(),
            Self::NotApplicable => None,
        }
    }

    /// Apply `f` to every value, keeping the shape
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> Should<U> {
        match self {
            Self::Scalar(value) => Should::Scalar(f(value)),
            Self::List(values) => Should::List(values.into_iter().map(f).collect()),
            Self::NotApplicable => Should::NotApplicable,
        }
    }
}

impl<T: PartialEq> Should<T> {
    /// Check whether `actual` satisfies the desired value(s)
    pub fn accepts(&self, actual: &T) -> bool {
        match self {
            Self::Scalar(value) => value == actual,
            Self::List(values) => values.contains(actual),
            Self::NotApplicable => true,
        }
    }
}

/// Actual value of a property as last read from the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Observed<T> {
    /// `retrieve` has not run yet in this cycle
    Unretrieved,
    /// The underlying subject (e.g. the file) does not exist
    NotFound,
    /// The subject exists and carries this value
    Present(T),
}

impl<T> Observed<T> {
    /// Check if state represents a missing subject
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// The present value, if any
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Present(value) => Some(value),
            _ => None,
        }
    }
}

/// Change notification emitted by a successful property sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Resource the property belongs to, e.g. `File[/etc/motd]`
    pub resource: String,
    /// Property name, e.g. `mode`
    pub property: String,
    /// Symbolic event name, e.g. `inode_changed`
    pub event: String,
    /// Rendered value before the change
    pub previous: String,
    /// Rendered value after the change
    pub desired: String,
    /// Human-readable description of the change
    pub message: String,
}

/// Result of reconciling one property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyOutcome {
    /// Actual state already matched
    InSync,
    /// Property was changed
    Changed(ChangeEvent),
    /// Out of sync, but sync declined to act (missing subject, no privilege, ...)
    Skipped,
    /// Reconciliation failed
    Failed { error: String },
}

impl PropertyOutcome {
    /// Check if the outcome represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the outcome represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Changed(_))
    }
}

/// Per-property entry of a resource outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyStatus {
    pub property: String,
    pub outcome: PropertyOutcome,
}

/// Result of applying every property of one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceOutcome {
    /// Resource reference, e.g. `File[/etc/motd]`
    pub resource: String,
    /// Resource type, e.g. `file`
    pub resource_type: String,
    pub properties: Vec<PropertyStatus>,
    /// Resource-level failure (the properties never ran)
    pub error: Option<String>,
    /// Seconds spent evaluating the resource
    pub evaluation_time: f64,
}

impl ResourceOutcome {
    /// Create an empty outcome for a resource
    pub fn new(resource: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            resource_type: resource_type.into(),
            properties: Vec::new(),
            error: None,
            evaluation_time: 0.0,
        }
    }

    /// Outcome for a resource that failed before any property ran
    pub fn failed(
        resource: impl Into<String>,
        resource_type: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(resource, resource_type)
        }
    }

    /// Change events emitted while applying the resource
    pub fn events(&self) -> impl Iterator<Item = &ChangeEvent> {
        self.properties.iter().filter_map(|status| match &status.outcome {
            PropertyOutcome::Changed(event) => Some(event),
            _ => None,
        })
    }

    pub fn is_changed(&self) -> bool {
        self.properties.iter().any(|s| s.outcome.is_change())
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some() || self.properties.iter().any(|s| !s.outcome.is_success())
    }

    /// Out of sync but not changed (skipped)
    pub fn is_skipped(&self) -> bool {
        self.properties
            .iter()
            .any(|s| matches!(s.outcome, PropertyOutcome::Skipped))
    }
}

/// Summary of apply results, counted per property
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySummary {
    pub in_sync: usize,
    pub changed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ApplySummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.changed
    }

    /// Check if application was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of properties processed
    pub fn total(&self) -> usize {
        self.in_sync + self.changed + self.skipped + self.failed
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ApplySummary) {
        self.in_sync += other.in_sync;
        self.changed += other.changed;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    /// Add a property outcome to the summary
    pub fn add_outcome(&mut self, outcome: &PropertyOutcome) {
        match outcome {
            PropertyOutcome::InSync => self.in_sync += 1,
            PropertyOutcome::Changed(_) => self.changed += 1,
            PropertyOutcome::Skipped => self.skipped += 1,
            PropertyOutcome::Failed { .. } => self.failed += 1,
        }
    }

    /// Build a summary from resource outcomes
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a ResourceOutcome>) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            if outcome.error.is_some() {
                summary.failed += 1;
            }
            for status in &outcome.properties {
                summary.add_outcome(&status.outcome);
            }
        }
        summary
    }
}
