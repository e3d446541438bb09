//! Shared reconciliation context
//!
//! Some notices must only be emitted once per process no matter how many
//! resources trigger them (e.g. "cannot manage ownership unless running as
//! root"). Property kinds receive a [`Notices`] ledger at construction
//! instead of keeping their own global flags.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Process-scoped "already warned" ledger
///
/// Keys are free-form strings chosen by the caller. The ledger counts every
/// occurrence so repeated conditions stay observable without being re-logged.
#[derive(Debug, Default)]
pub struct Notices {
    seen: Mutex<HashMap<String, usize>>,
}

impl Notices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an occurrence of `key`, returning `true` only the first time
    pub fn first(&self, key: &str) -> bool {
        let mut seen = self.lock();
        let count = seen.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count == 1
    }

    /// Number of times `key` was recorded
    pub fn count(&self, key: &str) -> usize {
        self.lock().get(key).copied().unwrap_or(0)
    }

    /// Forget every recorded notice
    pub fn reset(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        match self.seen.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_only_once_per_key() {
        let notices = Notices::new();
        assert!(notices.first("owner:missing:bob"));
        assert!(!notices.first("owner:missing:bob"));
        assert!(notices.first("owner:missing:alice"));
        assert_eq!(notices.count("owner:missing:bob"), 2);
        assert_eq!(notices.count("unknown"), 0);
    }

    #[test]
    fn reset_forgets_keys() {
        let notices = Notices::new();
        assert!(notices.first("owner:unprivileged"));
        notices.reset();
        assert!(notices.first("owner:unprivileged"));
    }
}
