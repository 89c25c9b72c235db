//! Plugins implementing the response cache.

pub mod response_cache;
