//! # Declarative
//!
//! A framework for declarative resource management.
//!
//! This crate provides the core abstractions for declaring desired state,
//! reading actual state, and converging each managed attribute of a resource
//! to match.
//!
//! ## Core Concepts
//!
//! - **Resource**: a named, typed entity (a file, ...) that owns properties
//! - **Property**: one reconcilable attribute of a resource (mode, owner, ...)
//! - **PropertyKind**: platform behaviour of one kind of property
//! - **Reconcile**: the retrieve → in_sync → sync cycle, object-safe
//! - **RunReport**: events, metrics and logs collected during one run
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{Desired, Property, PropertyError, PropertyKind, Reconcile};
//!
//! #[derive(Debug)]
//! struct Motd;
//!
//! impl PropertyKind<std::path::Path> for Motd {
//!     type Value = String;
//!
//!     fn name(&self) -> &'static str { "content" }
//!     fn event(&self) -> &'static str { "content_changed" }
//!     fn normalize(&self, raw: &str) -> Result<String, PropertyError> { Ok(raw.into()) }
//!     fn display(&self, value: &String) -> String { value.clone() }
//!
//!     fn read(&self, path: &std::path::Path) -> Result<Option<String>, PropertyError> {
//!         Ok(std::fs::read_to_string(path).ok())
//!     }
//!
//!     fn write(&self, path: &std::path::Path, value: &String) -> Result<(), PropertyError> {
//!         std::fs::write(path, value)
//!             .map_err(|e| PropertyError::apply("content", "failed to write motd", e))
//!     }
//! }
//!
//! let path = std::path::Path::new("/etc/motd");
//! let mut property = Property::new(Motd, Desired::Scalar("hello".into()));
//! property.retrieve(path)?;
//! if !property.in_sync(path)? {
//!     property.sync("File[/etc/motd]", path)?;
//! }
//! ```
//!
//! ## Shared State
//!
//! Notices that must only be emitted once per process live in
//! [`Notices`], which callers create once and hand to the property kinds
//! that need it.

pub mod context;
pub mod executor;
pub mod property;
pub mod report;
pub mod resource;
pub mod types;

// Re-export main types at crate root
pub use context::Notices;
pub use executor::reconcile_properties;
pub use property::{Admission, Property, PropertyError, PropertyKind, Reconcile};
pub use report::{LogEntry, Metric, MetricValue, RunReport};
pub use resource::{BoxedResource, Resource};
pub use types::{
    ApplySummary, ChangeEvent, Desired, Observed, PropertyOutcome, PropertyStatus,
    ResourceOutcome, Should,
};
