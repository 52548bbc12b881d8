//! Process-wide memo of metric results.
//!
//! An entry is served only while its TTL has not elapsed and the row set it
//! was computed from hashes to the same fingerprint, so a changed row set
//! misses immediately instead of waiting out the TTL.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use sellerdash_core::ReportRow;
use sha2::{Digest, Sha256};

use crate::types::{MetricContext, MetricResult};

#[derive(Debug, Clone)]
struct CacheEntry {
    fingerprint: String,
    expires_at: Instant,
    result: MetricResult,
}

#[derive(Debug, Default)]
pub struct MetricCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

/// `metric_id` followed by `:field=value` for each key field present in
/// `context`.
#[must_use]
pub fn cache_key(metric_id: &str, key_fields: &[String], context: &MetricContext) -> String {
    let mut key = metric_id.to_string();
    for field in key_fields {
        if let Some(value) = context.get(field) {
            key.push(':');
            key.push_str(field);
            key.push('=');
            key.push_str(value);
        }
    }
    key
}

/// SHA-256 over the serialized rows, or `None` if they cannot be serialized.
#[must_use]
pub fn fingerprint(rows: &[ReportRow]) -> Option<String> {
    let bytes = serde_json::to_vec(rows).ok()?;
    Some(format!("{:x}", Sha256::digest(&bytes)))
}

impl MetricCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, key: &str, fingerprint: &str, now: Instant) -> Option<MetricResult> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|e| e.fingerprint == fingerprint && now < e.expires_at)
            .map(|e| e.result.clone())
    }

    /// Store `result`, replacing any earlier entry for `key`. Entries that
    /// have expired by `now` are evicted first.
    pub fn insert(
        &self,
        key: String,
        fingerprint: String,
        ttl: Duration,
        now: Instant,
        result: MetricResult,
    ) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, e| now < e.expires_at);
        entries.insert(
            key,
            CacheEntry {
                fingerprint,
                expires_at: now + ttl,
                result,
            },
        );
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

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
