//! Process-lifetime key/value store for action fingerprints.
//!
//! One instance is built per engine and shared through `Arc`. Keys outside
//! the protected prefixes are evicted by [`HashCache::sweep`], which the
//! reconciliation loop calls on a fixed interval.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::domain::CacheError;

/// Key prefixes that survive a sweep.
pub const PROTECTED_PREFIXES: &[&str] = &["metadata", "action", "signal"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheValue {
    Text(String),
    Flag(bool),
}

impl CacheValue {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Flag(_) => None,
        }
    }
}

impl From<String> for CacheValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<bool> for CacheValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

#[derive(Debug, Default)]
pub struct HashCache {
    entries: RwLock<HashMap<String, CacheValue>>,
}

impl HashCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<CacheValue> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Text value under `key`, if any.
    #[must_use]
    pub fn get_text(&self, key: &str) -> Option<String> {
        self.get(key).and_then(|v| v.as_text().map(str::to_string))
    }

    /// # Errors
    ///
    /// Returns [`CacheError::EmptyKey`] for an empty key.
    pub fn set(&self, key: &str, value: impl Into<CacheValue>) -> Result<(), CacheError> {
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.into());
        Ok(())
    }

    /// Store `value` under `key` unless it is already there.
    ///
    /// The comparison and the write happen under one lock, so two
    /// concurrent callers with the same value see exactly one `true`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::EmptyKey`] for an empty key.
    pub fn replace_if_changed(&self, key: &str, value: &str) -> Result<bool, CacheError> {
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.get(key).and_then(CacheValue::as_text) == Some(value) {
            return Ok(false);
        }
        entries.insert(key.to_string(), CacheValue::Text(value.to_string()));
        Ok(true)
    }

    pub fn remove(&self, key: &str) -> Option<CacheValue> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evict every key without a protected prefix. Returns the eviction count.
    pub fn sweep(&self) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|key, _| PROTECTED_PREFIXES.iter().any(|p| key.starts_with(p)));
        before - entries.len()
    }
}
