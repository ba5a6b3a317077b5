//! Expiring entry shared by the local backends.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A stored value plus an optional absolute expiry.
///
/// `expires_at` is seconds since the Unix epoch; `None` never expires.
/// `value` is written as a JSON string when it is valid UTF-8 and as a byte
/// array otherwise. Both forms are accepted on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    #[serde(serialize_with = "serialize_value", deserialize_with = "deserialize_value")]
    pub value: Vec<u8>,
    pub expires_at: Option<f64>,
}

impl CacheEntry {
    pub fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        let expires_at = effective_ttl(ttl).map(|ttl| now_secs() + ttl.as_secs_f64());
        Self { value, expires_at }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(now_secs())
    }

    pub fn is_expired_at(&self, now: f64) -> bool {
        matches!(self.expires_at, Some(exp) if now > exp)
    }
}

fn serialize_value<S>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match std::str::from_utf8(value) {
        Ok(text) => serializer.serialize_str(text),
        Err(_) => value.serialize(serializer),
    }
}

fn deserialize_value<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StoredValue {
        Text(String),
        Bytes(Vec<u8>),
    }

    match StoredValue::deserialize(deserializer)? {
        StoredValue::Text(text) => Ok(text.into_bytes()),
        StoredValue::Bytes(bytes) => Ok(bytes),
    }
}

/// A zero TTL means "no expiry", the same as passing none.
pub(crate) fn effective_ttl(ttl: Option<Duration>) -> Option<Duration> {
    ttl.filter(|ttl| !ttl.is_zero())
}

pub(crate) fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
