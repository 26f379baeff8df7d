//! Custom field validation hooks keyed by UI hint.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::record::Fragment;

/// Hook run before a changed fragment is written.
///
/// `submitted` is the fragment as the caller sent it (to-many payloads
/// included); `pending` is the own-row fragment about to be persisted.
pub trait FieldValidator: Send + Sync {
    /// Reject the write with a reason.
    fn validate(&self, submitted: &Fragment, pending: &Fragment) -> Result<(), String>;

    /// Adjust the pending fragment after a successful validation.
    fn apply(&self, _submitted: &Fragment, _pending: &mut Fragment) {}
}

/// UI hint to validator.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    validators: HashMap<String, Arc<dyn FieldValidator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, ui: impl Into<String>, validator: Arc<dyn FieldValidator>) -> Self {
        self.validators.insert(ui.into(), validator);
        self
    }

    pub fn get(&self, ui: &str) -> Option<&Arc<dyn FieldValidator>> {
        self.validators.get(ui)
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hints: Vec<&String> = self.validators.keys().collect();
        hints.sort();
        f.debug_struct("ValidatorRegistry").field("hints", &hints).finish()
    }
}

/// Caps the number of entries in a to-many column.
#[derive(Debug, Clone)]
pub struct MaxEntries {
    pub column: String,
    pub max: usize,
}

impl FieldValidator for MaxEntries {
    fn validate(&self, submitted: &Fragment, _pending: &Fragment) -> Result<(), String> {
        let count = submitted
            .get(&self.column)
            .map(|v| crate::record::to_many_entries(v).len())
            .unwrap_or(0);
        if count > self.max {
            Err(format!("{} entries exceed the limit of {}", count, self.max))
        } else {
            Ok(())
        }
    }
}
