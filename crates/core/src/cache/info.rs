//! Freshness record attached to every cached artifact.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::attributes::AttributesMap;

/// Reserved cache token marking an entry as explicitly invalidated.
pub const INVALIDATED: &str = "invalidated";

/// Child map of the artifact attributes holding the cache record.
pub const CACHE: &str = "cache";

pub const LAST_VERIFIED: &str = "last_verified";

pub const CACHE_TOKEN: &str = "cache_token";

/// When a cached artifact was last verified upstream, and under which cache token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInfo {
    last_verified: DateTime<Utc>,
    cache_token: Option<String>,
}

impl CacheInfo {
    pub fn new(last_verified: DateTime<Utc>, cache_token: Option<String>) -> Self {
        Self { last_verified, cache_token }
    }

    pub fn last_verified(&self) -> DateTime<Utc> {
        self.last_verified
    }

    pub fn cache_token(&self) -> Option<&str> {
        self.cache_token.as_deref()
    }

    /// True iff the token is the [`INVALIDATED`] sentinel.
    pub fn is_invalidated(&self) -> bool {
        self.cache_token.as_deref() == Some(INVALIDATED)
    }

    /// Copy of this record carrying the invalidation sentinel.
    pub fn invalidated(&self) -> Self {
        Self { last_verified: self.last_verified, cache_token: Some(INVALIDATED.to_string()) }
    }

    /// Read a record from a flat attribute map.
    ///
    /// Returns `None` when `last_verified` is missing or unparseable; callers
    /// treat that as "never verified".
    pub fn from_attributes(attributes: &AttributesMap) -> Option<Self> {
        let raw = attributes.get_str(LAST_VERIFIED)?;
        let last_verified = match DateTime::parse_from_rfc3339(raw) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(e) => {
                tracing::debug!(value = raw, error = %e, "ignoring unparseable last_verified attribute");
                return None;
            }
        };
        let cache_token = attributes.get_str(CACHE_TOKEN).map(str::to_string);

        Some(Self { last_verified, cache_token })
    }

    pub fn to_attributes(&self) -> AttributesMap {
        let mut attributes = AttributesMap::new();
        attributes.set(LAST_VERIFIED, self.last_verified.to_rfc3339_opts(SecondsFormat::AutoSi, true));
        if let Some(token) = &self.cache_token {
            attributes.set(CACHE_TOKEN, token.as_str());
        }
        attributes
    }

    /// Read the record from the `cache` child of an artifact's attributes.
    pub fn extract_from(attributes: &AttributesMap) -> Option<Self> {
        attributes.child(CACHE).as_ref().and_then(Self::from_attributes)
    }

    /// Store the record as the `cache` child of an artifact's attributes.
    pub fn apply_to(&self, attributes: &mut AttributesMap) {
        attributes.set_child(CACHE, self.to_attributes());
    }

    /// Mark the artifact's cache record as invalidated.
    ///
    /// Returns false when the artifact carries no record, leaving it untouched.
    pub fn invalidate_in(attributes: &mut AttributesMap) -> bool {
        match Self::extract_from(attributes) {
            Some(info) => {
                info.invalidated().apply_to(attributes);
                true
            }
            None => false,
        }
    }
}
