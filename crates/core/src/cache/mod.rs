//! Freshness and invalidation of proxied content.
//!
//! - [`CacheInfo`] is the per-artifact record (last verified, cache token)
//! - [`CacheController`] decides staleness from max age and the current token
//! - [`ProxyCache`] and [`GroupCache`] are the repository facets that rotate tokens
//! - [`NegativeCache`] remembers upstream misses for a TTL

pub mod controller;
pub mod info;
pub mod negative;
pub mod proxy;

pub use controller::{CacheController, CacheControllerHolder, CacheType};
pub use info::{CacheInfo, INVALIDATED};
pub use negative::NegativeCache;
pub use proxy::{GroupCache, ProxyCache};
