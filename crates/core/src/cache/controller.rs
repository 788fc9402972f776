//! Staleness policy for proxied content.
//!
//! A controller combines a maximum age with the current cache token. Rotating
//! the token is how a proxy repository invalidates everything it has cached
//! without touching the stored artifacts: every [`CacheInfo`] verified under
//! an older token becomes stale on its next read.

use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Utc;

use super::info::CacheInfo;

static TOKEN_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Which cache controller a request is governed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheType {
    Content,
    Metadata,
}

/// Decides whether cached content must be re-verified upstream.
#[derive(Debug)]
pub struct CacheController {
    max_age: Option<Duration>,
    cache_token: RwLock<Option<String>>,
}

impl CacheController {
    /// `max_age` of `None` disables age-based expiry.
    pub fn new(max_age: Option<Duration>, cache_token: Option<String>) -> Self {
        Self { max_age, cache_token: RwLock::new(cache_token) }
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    pub fn cache_token(&self) -> Option<String> {
        self.cache_token.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Record for content verified right now.
    pub fn current(&self) -> CacheInfo {
        CacheInfo::new(Utc::now(), self.cache_token())
    }

    /// Rotate the cache token, making all previously verified content stale.
    pub fn invalidate_cache(&self) {
        let token = next_token();
        tracing::debug!(token = %token, "rotating cache token");
        *self.cache_token.write().unwrap_or_else(|e| e.into_inner()) = Some(token);
    }

    pub fn is_stale(&self, info: &CacheInfo) -> bool {
        if info.is_invalidated() {
            return true;
        }

        if let Some(token) = self.cache_token()
            && info.cache_token() != Some(token.as_str())
        {
            return true;
        }

        // an age reaching past the earliest representable instant never expires
        self.max_age
            .and_then(|age| chrono::Duration::from_std(age).ok())
            .and_then(|age| Utc::now().checked_sub_signed(age))
            .is_some_and(|cutoff| info.last_verified() < cutoff)
    }
}

/// Content and metadata controllers of one proxy repository.
#[derive(Debug)]
pub struct CacheControllerHolder {
    content: CacheController,
    metadata: CacheController,
}

impl CacheControllerHolder {
    pub fn new(content: CacheController, metadata: CacheController) -> Self {
        Self { content, metadata }
    }

    pub fn get(&self, cache_type: CacheType) -> &CacheController {
        match cache_type {
            CacheType::Content => &self.content,
            CacheType::Metadata => &self.metadata,
        }
    }

    pub fn content(&self) -> &CacheController {
        &self.content
    }

    pub fn metadata(&self) -> &CacheController {
        &self.metadata
    }

    /// Rotate the tokens of both controllers.
    pub fn invalidate_caches(&self) {
        self.content.invalidate_cache();
        self.metadata.invalidate_cache();
    }
}

fn next_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let seq = TOKEN_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{nanos}-{seq}")
}
