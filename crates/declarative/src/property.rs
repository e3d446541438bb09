//! Property reconciliation
//!
//! A property is one manageable attribute of a resource (a file's mode, its
//! owner, ...). [`PropertyKind`] describes how to read, validate and write one
//! kind of attribute; [`Property`] wraps a kind with the desired and actual
//! values and drives the retrieve → compare → sync cycle.
//!
//! The owning resource is never stored in the property. Every call receives
//! it as `&O`, so a property can consult sibling state (path, cached stat)
//! without forming an ownership edge back to its resource.

use crate::types::{ChangeEvent, Desired, Observed, Should};
use std::fmt;
use std::marker::PhantomData;

/// Errors raised while reconciling a single property
///
/// All of them are contained to the property: siblings still run.
#[derive(Debug, thiserror::Error)]
pub enum PropertyError {
    /// The desired value could not be parsed or has the wrong shape
    #[error("invalid {property} value: {message}")]
    Validation {
        property: &'static str,
        message: String,
    },

    /// Reading the actual value failed for a reason other than absence
    #[error("could not read {property}: {source}")]
    Read {
        property: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// The platform operation failed
    #[error("{message}: {source}")]
    Apply {
        property: &'static str,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// The actual value was inspected before `retrieve` ran
    #[error("{property} was inspected before its current value was retrieved")]
    NotRetrieved { property: &'static str },
}

impl PropertyError {
    pub fn validation(property: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            property,
            message: message.into(),
        }
    }

    pub fn apply(property: &'static str, message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Apply {
            property,
            message: message.into(),
            source,
        }
    }
}

/// Whether `sync` may touch the platform for a given target value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Proceed,
    /// Intentional skip; not an error
    Skip,
}

/// Platform behaviour of one kind of property on owner type `O`
pub trait PropertyKind<O: ?Sized>: fmt::Debug + Send + Sync {
    /// Value type shared by desired and actual state
    type Value: Clone + PartialEq + fmt::Debug + Send;

    /// Property name, e.g. "mode"
    fn name(&self) -> &'static str;

    /// Event emitted after a successful sync
    fn event(&self) -> &'static str;

    /// Whether the desired value may be given as a list
    fn accepts_list(&self) -> bool {
        false
    }

    /// Parse one raw desired value
    fn normalize(&self, raw: &str) -> Result<Self::Value, PropertyError>;

    /// Render a value for logs and events
    fn display(&self, value: &Self::Value) -> String;

    /// Read the actual value; `Ok(None)` when the subject does not exist
    fn read(&self, owner: &O) -> Result<Option<Self::Value>, PropertyError>;

    /// Drop any lookup the owner cached for this subject
    fn refresh(&self, _owner: &O) {}

    /// Per-resource adjustment of a desired value, applied once per cycle
    fn adjust(&self, _owner: &O, value: Self::Value) -> Self::Value {
        value
    }

    /// Policy check run before any platform operation
    fn admit(&self, _owner: &O, _target: &Self::Value) -> Admission {
        Admission::Proceed
    }

    /// Apply `value` to the subject
    fn write(&self, owner: &O, value: &Self::Value) -> Result<(), PropertyError>;
}

/// Object-safe view of a property, used by the resource applier
pub trait Reconcile<O: ?Sized>: fmt::Debug + Send {
    fn name(&self) -> &'static str;

    /// Read the actual value from the system
    fn retrieve(&mut self, owner: &O) -> Result<(), PropertyError>;

    /// Compare actual and desired values
    fn in_sync(&mut self, owner: &O) -> Result<bool, PropertyError>;

    /// Converge to the desired value, returning the change event if one happened
    fn sync(&mut self, resource: &str, owner: &O) -> Result<Option<ChangeEvent>, PropertyError>;

    /// Rendered actual value
    fn current_display(&self) -> String;

    /// Rendered desired value
    fn desired_display(&self) -> String;
}

/// Desired/actual state of one property plus its kind
pub struct Property<K, O: ?Sized>
where
    K: PropertyKind<O>,
{
    kind: K,
    desired: Desired,
    normalized: Option<Should<K::Value>>,
    is: Observed<K::Value>,
    fixed: bool,
    _owner: PhantomData<fn(&O)>,
}

impl<K, O> Property<K, O>
where
    K: PropertyKind<O>,
    O: ?Sized,
{
    pub fn new(kind: K, desired: Desired) -> Self {
        Self {
            kind,
            desired,
            normalized: None,
            is: Observed::Unretrieved,
            fixed: false,
            _owner: PhantomData,
        }
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    /// Last retrieved actual value
    pub fn is(&self) -> &Observed<K::Value> {
        &self.is
    }

    /// Whether the desired values were already adjusted for the owner
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Normalized desired value
    ///
    /// Normalization happens on first use. Once the subject is known to exist
    /// the kind's adjustment runs exactly once; later calls reuse the result.
    pub fn should(&mut self, owner: &O) -> Result<Should<K::Value>, PropertyError> {
        let should = match self.normalized.take() {
            Some(should) => should,
            None => self.normalize_desired()?,
        };

        let should = if !self.fixed && self.value_present() {
            self.fixed = true;
            should.map(|value| self.kind.adjust(owner, value))
        } else {
            should
        };

        Ok(self.normalized.insert(should).clone())
    }

    fn value_present(&self) -> bool {
        matches!(self.is, Observed::Present(_))
    }

    fn normalize_desired(&self) -> Result<Should<K::Value>, PropertyError> {
        match &self.desired {
            Desired::NotApplicable => Ok(Should::NotApplicable),
            Desired::Scalar(raw) => Ok(Should::Scalar(self.kind.normalize(raw)?)),
            Desired::List(raws) if raws.is_empty() => Ok(Should::NotApplicable),
            Desired::List(raws) => {
                if !self.kind.accepts_list() {
                    return Err(PropertyError::validation(
                        self.kind.name(),
                        format!("expected a single value, got {} values", raws.len()),
                    ));
                }
                raws.iter()
                    .map(|raw| self.kind.normalize(raw))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Should::List)
            }
        }
    }

    fn render(&self, should: &Should<K::Value>) -> String {
        match should {
            Should::Scalar(value) => self.kind.display(value),
            Should::List(values) => values
                .iter()
                .map(|v| self.kind.display(v))
                .collect::<Vec<_>>()
                .join(", "),
            Should::NotApplicable => "n/a".to_string(),
        }
    }
}

impl<K, O> fmt::Debug for Property<K, O>
where
    K: PropertyKind<O>,
    O: ?Sized,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("kind", &self.kind)
            .field("desired", &self.desired)
            .field("is", &self.is)
            .field("fixed", &self.fixed)
            .finish()
    }
}

impl<K, O> Reconcile<O> for Property<K, O>
where
    K: PropertyKind<O>,
    O: ?Sized,
{
    fn name(&self) -> &'static str {
        self.kind.name()
    }

    fn retrieve(&mut self, owner: &O) -> Result<(), PropertyError> {
        self.is = match self.kind.read(owner)? {
            Some(value) => Observed::Present(value),
            None => Observed::NotFound,
        };
        Ok(())
    }

    fn in_sync(&mut self, owner: &O) -> Result<bool, PropertyError> {
        if matches!(self.is, Observed::Unretrieved) {
            return Err(PropertyError::NotRetrieved {
                property: self.kind.name(),
            });
        }

        let should = self.should(owner)?;
        Ok(match &self.is {
            Observed::Present(actual) => should.accepts(actual),
            _ => matches!(should, Should::NotApplicable),
        })
    }

    fn sync(&mut self, resource: &str, owner: &O) -> Result<Option<ChangeEvent>, PropertyError> {
        let name = self.kind.name();

        if matches!(self.is, Observed::Unretrieved) {
            self.retrieve(owner)?;
        }

        let should = self.should(owner)?;
        let Some(target) = should.target() else {
            log::debug!("{resource}: no concrete {name} to apply");
            return Ok(None);
        };

        if self.kind.admit(owner, target) == Admission::Skip {
            return Ok(None);
        }

        if self.is.is_not_found() {
            self.kind.refresh(owner);
            self.retrieve(owner)?;
            if self.is.is_not_found() {
                log::info!("{resource} does not exist; cannot set {name}");
                return Ok(None);
            }
        }

        if self.in_sync(owner)? {
            return Ok(None);
        }

        // The subject may have appeared above, so the target can differ now.
        let Some(target) = self.should(owner)?.target().cloned() else {
            return Ok(None);
        };

        let previous = self.current_display();
        self.kind.write(owner, &target)?;
        self.kind.refresh(owner);

        let desired = self.kind.display(&target);
        self.is = Observed::Present(target);

        Ok(Some(ChangeEvent {
            resource: resource.to_string(),
            property: name.to_string(),
            event: self.kind.event().to_string(),
            message: format!("{name} changed '{previous}' to '{desired}'"),
            previous,
            desired,
        }))
    }

    fn current_display(&self) -> String {
        match &self.is {
            Observed::Present(value) => self.kind.display(value),
            Observed::NotFound => "absent".to_string(),
            Observed::Unretrieved => "unknown".to_string(),
        }
    }

    fn desired_display(&self) -> String {
        match &self.normalized {
            Some(should) => self.render(should),
            None => match &self.desired {
                Desired::Scalar(raw) => raw.clone(),
                Desired::List(raws) => raws.join(", "),
                Desired::NotApplicable => "n/a".to_string(),
            },
        }
    }
}
