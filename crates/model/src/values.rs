use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::{ElementId, fetch::lock};

/// Escape the characters that would break a single-line rendering of a value
pub fn massage_value(value: &str) -> String {
    value
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

/// Last observed value of every expression tree node, keyed by node id.
///
/// Owned by the [`crate::Model`] and shared with the nodes it creates, so a node can tell whether
/// its value changed since the previous stop. Cloning produces another handle to the same map.
#[derive(Debug, Clone, Default)]
pub struct ValueTracker {
    values: Arc<Mutex<HashMap<ElementId, String>>>,
}

impl ValueTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` for `id`, returning whether it counts as changed.
    ///
    /// A value is changed only when a non-empty previous value exists, it is not the
    /// `placeholder` of an unavailable node, and it differs from `value`.
    pub fn record(&self, id: &ElementId, value: &str, placeholder: Option<&str>) -> bool {
        let mut values = lock(&self.values);
        let changed = match values.get(id) {
            Some(previous) if !previous.is_empty() => {
                Some(previous.as_str()) != placeholder && previous != value
            }
            _ => false,
        };
        values.insert(id.clone(), value.to_string());
        changed
    }

    pub fn get(&self, id: &ElementId) -> Option<String> {
        lock(&self.values).get(id).cloned()
    }

    pub fn clear(&self) {
        tracing::debug!("clearing tracked values");
        lock(&self.values).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.values).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.values).is_empty()
    }
}
