//! In-process configuration cache.
//!
//! Operational knobs (order timeout, feature toggles) are read far more
//! often than they change, so they live in a read-through cache keyed by
//! dotted string names. Writers call [`ConfigCache::invalidate`] after a
//! change; readers fall back to their own defaults on a miss.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;

/// Key for the pending-order expiry window, in minutes.
pub const ORDER_TIMEOUT_MINUTES: &str = "order.timeout_minutes";

/// Thread-safe configuration cache.
///
/// Values are JSON so callers can store numbers, strings, and structured
/// settings under one roof. A poisoned lock is treated as a miss rather
/// than a panic.
#[derive(Debug, Default)]
pub struct ConfigCache {
    entries: RwLock<HashMap<String, Value>>,
}

impl ConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .read()
            .ok()
            .and_then(|map| map.get(key).cloned())
    }

    /// Fetch a key as an integer; any non-integer value is a miss.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        if let Ok(mut map) = self.entries.write() {
            map.insert(key.into(), value);
        }
    }

    pub fn invalidate(&self, key: &str) {
        if let Ok(mut map) = self.entries.write() {
            map.remove(key);
        }
    }

    pub fn invalidate_all(&self) {
        if let Ok(mut map) = self.entries.write() {
            map.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_get_and_invalidate() {
        let cache = ConfigCache::new();
        assert_eq!(cache.get(ORDER_TIMEOUT_MINUTES), None);

        cache.set(ORDER_TIMEOUT_MINUTES, json!(30));
        assert_eq!(cache.get_i64(ORDER_TIMEOUT_MINUTES), Some(30));

        cache.invalidate(ORDER_TIMEOUT_MINUTES);
        assert_eq!(cache.get(ORDER_TIMEOUT_MINUTES), None);
    }

    #[test]
    fn non_integer_value_is_a_miss_for_get_i64() {
        let cache = ConfigCache::new();
        cache.set("banner.text", json!("harvest season"));
        assert_eq!(cache.get_i64("banner.text"), None);
        assert_eq!(cache.get("banner.text"), Some(json!("harvest season")));
    }

    #[test]
    fn invalidate_all_clears_everything() {
        let cache = ConfigCache::new();
        cache.set("a", json!(1));
        cache.set("b", json!(2));
        cache.invalidate_all();
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), None);
    }
}
