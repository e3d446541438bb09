//! Resource trait for declarative state management
//!
//! A Resource is a named, typed entity (a file at a path, ...) that owns
//! properties. Its identity never changes during a run; only the properties
//! carry desired and actual values.

use crate::types::ResourceOutcome;
use anyhow::Result;
use std::fmt;

/// Core trait for declarative resources
///
/// Implementations usually hold their properties as
/// `Vec<Box<dyn Reconcile<Self::Owner>>>` and delegate [`Resource::apply`] to
/// [`crate::executor::reconcile_properties`].
pub trait Resource: Send + fmt::Debug {
    /// Resource type category, e.g. "file"
    fn resource_type(&self) -> &'static str;

    /// Title that identifies the resource within its type, e.g. "/etc/motd"
    fn title(&self) -> &str;

    /// Reference in `Type[title]` form, unique within a catalog
    fn reference(&self) -> String {
        format!("{}[{}]", capitalize(self.resource_type()), self.title())
    }

    /// What the resource manages on the system, e.g. the path of a file
    ///
    /// Two resources of one type must not share it, whatever their titles.
    fn name_var(&self) -> String {
        self.title().to_string()
    }

    /// Names of the properties this resource manages
    fn property_names(&self) -> Vec<&'static str>;

    /// Reconcile every property
    ///
    /// Property failures are recorded in the outcome. An `Err` means the
    /// resource could not be evaluated at all.
    fn apply(&mut self) -> Result<ResourceOutcome>;

    /// Drop cached lookups so nothing stale survives the cycle
    fn clear(&mut self) {}
}

/// A boxed resource for type-erased storage
pub type BoxedResource = Box<dyn Resource>;

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Service(String);

    impl Resource for Service {
        fn resource_type(&self) -> &'static str {
            "service"
        }

        fn title(&self) -> &str {
            &self.0
        }

        fn property_names(&self) -> Vec<&'static str> {
            Vec::new()
        }

        fn apply(&mut self) -> Result<ResourceOutcome> {
            Ok(ResourceOutcome::new(self.reference(), self.resource_type()))
        }
    }

    #[test]
    fn reference_capitalizes_type() {
        let service = Service("sshd".into());
        assert_eq!(service.reference(), "Service[sshd]");
    }

    #[test]
    fn name_var_defaults_to_title() {
        assert_eq!(Service("sshd".into()).name_var(), "sshd");
    }
}
