//! Entity-aware response caching for a GraphQL execution pipeline.
//!
//! The [`ResponseCache`] plugin wraps the host's parse and execution services. Queries are
//! answered from an in-memory store keyed by the printed document, the variables and an optional
//! session discriminator. Every cached response remembers which entities (`Type` and `Type:id`)
//! it contains, so that a mutation returning one of those entities, or an explicit call through
//! the [`CacheController`], removes every response depending on it.

#![warn(unreachable_pub)]

pub mod json_ext;

mod cache;
mod context;
pub mod error;
pub mod graphql;
pub mod plugin;
pub mod plugins;
pub mod services;
mod spec;

pub use context::Context;
pub use plugin::Plugin;
pub use plugins::response_cache::CacheController;
pub use plugins::response_cache::Config;
pub use plugins::response_cache::EntityId;
pub use plugins::response_cache::ExecutionOutcome;
pub use plugins::response_cache::InvalidationRequest;
pub use plugins::response_cache::PendingExecution;
pub use plugins::response_cache::ResponseCache;
pub use plugins::response_cache::SessionDiscriminator;
pub use spec::add_typename_to_document;
pub use spec::SpecError;
