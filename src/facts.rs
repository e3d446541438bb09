//! Local facts uploaded with each catalog request
//!
//! The catalog server decides what a node gets partly from these facts. The
//! agent only needs to produce them; their content is opaque to the core.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;

/// Serialization format tag sent along with the payload
pub const FACTS_FORMAT: &str = "json";

/// Facts about this machine
#[derive(Debug, Clone, Serialize)]
pub struct Facts {
    pub name: String,
    pub values: BTreeMap<String, String>,
}

/// Serialized, format-tagged facts as passed to the catalog transport
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FactOptions {
    pub format: String,
    pub payload: String,
}

impl Facts {
    /// Gather facts for the node named `certname`
    pub fn collect(certname: &str) -> Self {
        let mut values = BTreeMap::new();
        values.insert("certname".to_string(), certname.to_string());
        if let Some(host) = hostname() {
            values.insert("hostname".to_string(), host);
        }
        values.insert("kernel".to_string(), std::env::consts::OS.to_string());
        values.insert("family".to_string(), std::env::consts::FAMILY.to_string());
        values.insert(
            "architecture".to_string(),
            std::env::consts::ARCH.to_string(),
        );
        values.insert(
            "agent_version".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );
        values.insert("timestamp".to_string(), Utc::now().to_rfc3339());

        Self {
            name: certname.to_string(),
            values,
        }
    }

    /// Serialize for uploading with the catalog request
    pub fn for_uploading(&self) -> Result<FactOptions> {
        let payload = serde_json::to_string(self).context("Failed to serialize facts")?;
        Ok(FactOptions {
            format: FACTS_FORMAT.to_string(),
            payload,
        })
    }
}

/// Host name of this machine
#[cfg(unix)]
pub fn hostname() -> Option<String> {
    let mut buf = vec![0u8; 256];

    // SAFETY: buf is valid for buf.len() bytes; gethostname NUL-terminates on success
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if rc != 0 {
        return None;
    }

    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    let name = String::from_utf8_lossy(&buf[..end]).trim().to_string();
    (!name.is_empty()).then_some(name)
}

#[cfg(not(unix))]
pub fn hostname() -> Option<String> {
    std::env::var("COMPUTERNAME").ok()
}
