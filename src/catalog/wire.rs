//! Catalog wire format (JSON)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::{Catalog, CatalogError};
use crate::resource::{FileResource, ResourceContext};
use declarative::Desired;

/// Catalog as served by the catalog server and stored in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireCatalog {
    pub name: String,

    /// Compile time, seconds since the epoch
    #[serde(default)]
    pub version: Option<i64>,

    #[serde(default)]
    pub classes: Vec<String>,

    #[serde(default)]
    pub resources: Vec<WireResource>,
}

/// One resource entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResource {
    #[serde(rename = "type")]
    pub kind: String,

    pub title: String,

    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

impl WireResource {
    fn reference(&self) -> String {
        format!("{}[{}]", self.kind, self.title)
    }
}

impl WireCatalog {
    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Turn the wire description into concrete resources
    pub fn to_catalog(&self, ctx: &ResourceContext) -> Result<Catalog, CatalogError> {
        let mut catalog = Catalog::new(&self.name);
        catalog.set_version(self.version);
        for class in &self.classes {
            catalog.add_class(class);
        }

        for resource in &self.resources {
            match resource.kind.to_lowercase().as_str() {
                "file" => catalog.add_resource(Box::new(file_resource(resource, ctx)?)),
                _ => {
                    return Err(CatalogError::UnsupportedType {
                        kind: resource.kind.clone(),
                        title: resource.title.clone(),
                    });
                }
            }
        }

        Ok(catalog)
    }
}

fn file_resource(wire: &WireResource, ctx: &ResourceContext) -> Result<FileResource, CatalogError> {
    let invalid = |message: String| CatalogError::InvalidResource {
        resource: wire.reference(),
        message,
    };

    let mut path = None;
    let mut owner = None;
    let mut mode = None;

    for (name, value) in &wire.parameters {
        match name.as_str() {
            "path" => match value {
                Value::String(p) => path = Some(p.as_str()),
                other => return Err(invalid(format!("path must be a string, got {other}"))),
            },
            "owner" => owner = Some(desired(value).map_err(&invalid)?),
            "mode" => mode = Some(desired(value).map_err(&invalid)?),
            _ => {
                return Err(CatalogError::UnsupportedParameter {
                    resource: wire.reference(),
                    parameter: name.clone(),
                });
            }
        }
    }

    let path = path.unwrap_or(wire.title.as_str());
    let mut file = FileResource::titled(&wire.title, path, ctx.clone())
        .map_err(|e| invalid(e.to_string()))?;
    if let Some(owner) = owner {
        file = file.with_owner(owner);
    }
    if let Some(mode) = mode {
        file = file.with_mode(mode);
    }
    Ok(file)
}

/// Numbers are taken as their decimal spelling, so `644` means mode `0644`
fn desired(value: &Value) -> Result<Desired, String> {
    match value {
        Value::Null => Ok(Desired::NotApplicable),
        Value::Array(items) => items
            .iter()
            .map(scalar)
            .collect::<Result<Vec<_>, _>>()
            .map(Desired::List),
        other => scalar(other).map(Desired::Scalar),
    }
}

fn scalar(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(format!("unsupported value {other}")),
    }
}
