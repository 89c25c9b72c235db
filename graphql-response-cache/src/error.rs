//! Response cache errors.
use displaydoc::Display;
use thiserror::Error;

pub use crate::spec::SpecError;

/// Errors raised while assembling the response cache.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// the cache controller is already bound to another response cache
    ControllerAlreadyBound,
}

/// Errors returned by the [`CacheController`](crate::CacheController).
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidationError {
    /// the cache controller is not bound to a response cache
    NotBound,
}

/// Cache-internal failures. These never reach the caller: the plugin logs them and behaves as if
/// the cache was absent for the current execution.
#[derive(Error, Display, Debug)]
pub(crate) enum CacheError {
    /// could not serialize the request variables: {0}
    Variables(#[from] serde_json::Error),

    /// could not resolve the executed operation: {0}
    Operation(#[from] SpecError),
}
