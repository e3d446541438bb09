//! Resource applier - runs the reconciliation cycle over a resource's properties

use crate::property::{PropertyError, Reconcile};
use crate::types::{PropertyOutcome, PropertyStatus, ResourceOutcome};
use std::time::Instant;

/// Reconcile every property of one resource, in order
///
/// Each property goes through `retrieve` → `in_sync` → `sync` (only when out
/// of sync). A failing property is logged and recorded; the remaining
/// properties are still reconciled.
pub fn reconcile_properties<O: ?Sized>(
    resource: &str,
    resource_type: &str,
    owner: &O,
    properties: &mut [Box<dyn Reconcile<O>>],
) -> ResourceOutcome {
    let started = Instant::now();
    let mut outcome = ResourceOutcome::new(resource, resource_type);

    for property in properties.iter_mut() {
        let name = property.name();
        let result = match converge(resource, owner, property.as_mut()) {
            Ok(result) => result,
            Err(e) => {
                log::error!("{resource}/{name}: {e}");
                PropertyOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        outcome.properties.push(PropertyStatus {
            property: name.to_string(),
            outcome: result,
        });
    }

    outcome.evaluation_time = started.elapsed().as_secs_f64();
    outcome
}

/// Run the cycle for a single property
fn converge<O: ?Sized>(
    resource: &str,
    owner: &O,
    property: &mut dyn Reconcile<O>,
) -> Result<PropertyOutcome, PropertyError> {
    property.retrieve(owner)?;

    if property.in_sync(owner)? {
        return Ok(PropertyOutcome::InSync);
    }

    log::debug!(
        "{resource}/{}: is {}, should be {}",
        property.name(),
        property.current_display(),
        property.desired_display()
    );

    match property.sync(resource, owner)? {
        Some(event) => {
            log::info!("{resource}/{}: {}", event.property, event.message);
            Ok(PropertyOutcome::Changed(event))
        }
        None => Ok(PropertyOutcome::Skipped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{Property, PropertyKind};
    use crate::types::Desired;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Key/value settings standing in for a resource's subject
    #[derive(Debug, Default)]
    struct Settings {
        values: RefCell<HashMap<&'static str, String>>,
        fail_writes: bool,
    }

    #[derive(Debug)]
    struct Key(&'static str);

    impl PropertyKind<Settings> for Key {
        type Value = String;

        fn name(&self) -> &'static str {
            self.0
        }

        fn event(&self) -> &'static str {
            "setting_changed"
        }

        fn normalize(&self, raw: &str) -> Result<String, PropertyError> {
            if raw.is_empty() {
                return Err(PropertyError::validation(self.0, "empty value"));
            }
            Ok(raw.to_string())
        }

        fn display(&self, value: &String) -> String {
            value.clone()
        }

        fn read(&self, owner: &Settings) -> Result<Option<String>, PropertyError> {
            Ok(owner.values.borrow().get(self.0).cloned())
        }

        fn write(&self, owner: &Settings, value: &String) -> Result<(), PropertyError> {
            if owner.fail_writes {
                return Err(PropertyError::apply(
                    self.0,
                    "failed to write setting",
                    std::io::Error::other("read-only"),
                ));
            }
            owner.values.borrow_mut().insert(self.0, value.clone());
            Ok(())
        }
    }

    fn key(name: &'static str, desired: &str) -> Box<dyn Reconcile<Settings>> {
        Box::new(Property::new(Key(name), Desired::Scalar(desired.to_string())))
    }

    fn settings(pairs: &[(&'static str, &str)]) -> Settings {
        Settings {
            values: RefCell::new(pairs.iter().map(|(k, v)| (*k, v.to_string())).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn failing_property_does_not_stop_siblings() {
        let owner = settings(&[("color", "red"), ("size", "s")]);
        let mut properties = vec![key("color", ""), key("size", "xl")];

        let outcome = reconcile_properties("Setting[x]", "setting", &owner, &mut properties);

        assert_eq!(outcome.properties.len(), 2);
        assert!(matches!(
            outcome.properties[0].outcome,
            PropertyOutcome::Failed { .. }
        ));
        assert!(outcome.properties[1].outcome.is_change());
        assert_eq!(owner.values.borrow()["size"], "xl");
        assert!(outcome.is_failed());
        assert_eq!(outcome.events().count(), 1);
    }

    #[test]
    fn in_sync_properties_are_not_synced() {
        let owner = settings(&[("color", "red")]);
        let mut properties = vec![key("color", "red")];

        let outcome = reconcile_properties("Setting[x]", "setting", &owner, &mut properties);

        assert_eq!(outcome.properties[0].outcome, PropertyOutcome::InSync);
        assert!(!outcome.is_changed());
    }

    #[test]
    fn apply_error_is_recorded_without_event() {
        let owner = Settings {
            fail_writes: true,
            ..settings(&[("color", "red")])
        };
        let mut properties = vec![key("color", "blue")];

        let outcome = reconcile_properties("Setting[x]", "setting", &owner, &mut properties);

        match &outcome.properties[0].outcome {
            PropertyOutcome::Failed { error } => {
                assert!(error.contains("failed to write setting"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(outcome.events().count(), 0);
    }

    #[test]
    fn missing_subject_is_skipped() {
        let owner = settings(&[]);
        let mut properties = vec![key("color", "blue")];

        let outcome = reconcile_properties("Setting[x]", "setting", &owner, &mut properties);

        assert_eq!(outcome.properties[0].outcome, PropertyOutcome::Skipped);
        assert!(outcome.is_skipped());
    }
}
