//! Response cache plugin.
//!
//! Caches whole query responses in memory and tracks the entities each of them contains, so that a
//! mutation touching an entity, or an explicit call through the [`CacheController`], removes every
//! response that depended on it.

use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use apollo_compiler::ast::OperationType;
use futures::future::BoxFuture;
use itertools::Itertools;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Deserializer;
use serde_json_bytes::json;
use tower::BoxError;
use tower::Layer;
use tower::Service;
use tower::ServiceBuilder;
use tower::ServiceExt;

use self::cache_key::PrimaryCacheKey;
use self::entity::extract_entities;
use self::invalidation::Invalidation;
use crate::Context;
use crate::cache::EntityCache;
use crate::error::CacheError;
use crate::error::ConfigurationError;
use crate::graphql;
use crate::plugin::Plugin;
use crate::services::execution;
use crate::services::parse;
use crate::spec::add_typename_to_document;
use crate::spec::find_operation;

mod cache_key;
mod entity;
mod invalidation;

pub use self::entity::EntityId;
pub use self::invalidation::CacheController;
pub use self::invalidation::InvalidationRequest;

pub(crate) const PLUGIN_NAME: &str = "response_cache";
const EXTENSION_KEY: &str = "responseCache";

/// Configuration for response caching
#[derive(Clone, Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_max_entries")]
    #[schemars(with = "usize")]
    /// Maximum number of cached responses, the least recently used one is evicted first (default: 1000)
    pub max_entries: NonZeroUsize,

    #[serde(deserialize_with = "humantime_serde::deserialize", default)]
    #[schemars(with = "Option<String>", default)]
    /// Default time to live of a cached response (e.g. "30s", "5m"). Responses never expire when unset
    pub ttl: Option<Duration>,

    #[serde(deserialize_with = "deserialize_ttl_per_type", default)]
    #[schemars(with = "HashMap<String, String>", default)]
    /// Time to live per type name. A response containing several of these types, or the default
    /// ttl, expires after the shortest of them. A zero duration disables caching for the type
    pub ttl_per_type: HashMap<String, Duration>,

    #[serde(default)]
    /// Responses containing an object of one of these types are never cached
    pub ignored_types: HashSet<String>,

    #[serde(default)]
    /// Report cache hits, misses and invalidations in `extensions.responseCache`
    pub include_extension_metadata: bool,
}

const DEFAULT_MAX_ENTRIES: NonZeroUsize = NonZeroUsize::new(1000).unwrap();

const fn default_max_entries() -> NonZeroUsize {
    DEFAULT_MAX_ENTRIES
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            ttl: None,
            ttl_per_type: HashMap::new(),
            ignored_types: HashSet::new(),
            include_extension_metadata: false,
        }
    }
}

fn deserialize_ttl_per_type<'de, D>(deserializer: D) -> Result<HashMap<String, Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let ttls: HashMap<String, humantime_serde::Serde<Duration>> =
        HashMap::deserialize(deserializer)?;
    Ok(ttls
        .into_iter()
        .map(|(typename, ttl)| (typename, ttl.into_inner()))
        .collect())
}

impl Config {
    /// Time to live of a response containing these types: the shortest of the default ttl and of
    /// every matching per type ttl. `None` means the response never expires.
    fn ttl_for<'a>(&self, typenames: impl IntoIterator<Item = &'a str>) -> Option<Duration> {
        typenames
            .into_iter()
            .filter_map(|typename| self.ttl_per_type.get(typename).copied())
            .fold(self.ttl, |ttl, type_ttl| {
                Some(ttl.map_or(type_ttl, |ttl| ttl.min(type_ttl)))
            })
    }
}

/// Partitions the cache between users: responses are shared between executions whose contexts
/// map to the same value, and `None` marks a response shared by everyone.
#[derive(Clone)]
pub struct SessionDiscriminator(Arc<dyn Fn(&Context) -> Option<String> + Send + Sync>);

impl SessionDiscriminator {
    pub fn new(discriminator: impl Fn(&Context) -> Option<String> + Send + Sync + 'static) -> Self {
        Self(Arc::new(discriminator))
    }

    pub(crate) fn session(&self, context: &Context) -> Option<String> {
        (self.0)(context)
    }
}

impl Default for SessionDiscriminator {
    fn default() -> Self {
        Self::new(|_| None)
    }
}

impl fmt::Debug for SessionDiscriminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionDiscriminator").finish_non_exhaustive()
    }
}

/// The response cache, usable as a [`Plugin`] or driven directly through
/// [`before_execute`](Self::before_execute) and [`after_execute`](Self::after_execute).
#[derive(Clone, Debug)]
pub struct ResponseCache {
    config: Arc<Config>,
    session: SessionDiscriminator,
    cache: EntityCache,
    controller: CacheController,
}

#[buildstructor::buildstructor]
impl ResponseCache {
    /// Create a response cache. The controller, when provided, gets bound to this cache and must
    /// not be bound to another one already.
    #[builder(visibility = "pub")]
    fn new(
        config: Config,
        session: Option<SessionDiscriminator>,
        controller: Option<CacheController>,
    ) -> Result<Self, ConfigurationError> {
        let cache = EntityCache::new(config.max_entries, config.ttl);
        let controller = controller.unwrap_or_default();
        controller.bind(Invalidation::new(cache.clone()))?;

        Ok(Self {
            config: Arc::new(config),
            session: session.unwrap_or_default(),
            cache,
            controller,
        })
    }

    /// Handle to invalidate this cache from outside the query pipeline.
    pub fn controller(&self) -> CacheController {
        self.controller.clone()
    }

    /// Number of cached responses, including expired ones not swept yet.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every expired response, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }

    /// First phase of an execution.
    ///
    /// Breaks with the cached response on a hit, in which case the execution must not run.
    /// Otherwise the returned [`PendingExecution`] must be handed to
    /// [`after_execute`](Self::after_execute) once the execution resolves. Dropping it, for
    /// example because the execution was cancelled, leaves the cache untouched.
    pub fn before_execute(
        &self,
        request: &execution::Request,
    ) -> ControlFlow<graphql::Response, PendingExecution> {
        let operation_type =
            match find_operation(&request.document, request.operation_name.as_deref()) {
                Ok(operation) => operation.operation_type,
                Err(err) => {
                    // the execution reports the error itself
                    tracing::error!(error = %CacheError::from(err), "cannot lookup the response cache");
                    return ControlFlow::Continue(PendingExecution::bypass());
                }
            };

        match operation_type {
            OperationType::Mutation => ControlFlow::Continue(PendingExecution {
                kind: PendingKind::Mutation,
            }),
            OperationType::Subscription => ControlFlow::Continue(PendingExecution::bypass()),
            OperationType::Query => {
                let cache_key = match self.cache_key(request) {
                    Ok(cache_key) => cache_key,
                    Err(err) => {
                        tracing::error!(error = %err, "cannot compute the response cache key");
                        return ControlFlow::Continue(PendingExecution::bypass());
                    }
                };

                match self.cache.get(&cache_key) {
                    Some(cached) => {
                        tracing::debug!(cache.key = %cache_key, "response cache hit");
                        let mut response = cached.response;
                        if self.config.include_extension_metadata {
                            response.extensions.insert(
                                EXTENSION_KEY,
                                json!({ "hit": true, "ttl": cached.ttl.map(millis) }),
                            );
                        }
                        ControlFlow::Break(response)
                    }
                    None => {
                        tracing::debug!(cache.key = %cache_key, "response cache miss");
                        ControlFlow::Continue(PendingExecution {
                            kind: PendingKind::Query { cache_key },
                        })
                    }
                }
            }
        }
    }

    /// Second phase of an execution: cache a query response, or invalidate the entities a
    /// mutation returned.
    pub fn after_execute(&self, pending: PendingExecution, outcome: ExecutionOutcome<'_>) {
        let response = match outcome {
            ExecutionOutcome::Response(response) => response,
            ExecutionOutcome::Stream => {
                match pending.kind {
                    PendingKind::Query { .. } => tracing::warn!(
                        "the query result is a stream of responses, it will not be cached"
                    ),
                    PendingKind::Mutation => tracing::warn!(
                        "the mutation result is a stream of responses, it cannot invalidate the response cache"
                    ),
                    PendingKind::Bypass => {
                        tracing::debug!("streamed result passed through the response cache")
                    }
                }
                return;
            }
        };

        match pending.kind {
            PendingKind::Query { cache_key } => self.store(cache_key, response),
            PendingKind::Mutation => self.invalidate(response),
            PendingKind::Bypass => {}
        }
    }

    fn cache_key(&self, request: &execution::Request) -> Result<String, CacheError> {
        let query = request.document.to_string();
        let session = self.session.session(&request.context);
        PrimaryCacheKey {
            query: &query,
            operation_name: request.operation_name.as_deref(),
            variables: &request.variables,
            session: session.as_deref(),
        }
        .hash()
    }

    fn store(&self, cache_key: String, response: &mut graphql::Response) {
        let ttl = self.try_store(&cache_key, response);
        if self.config.include_extension_metadata {
            let ttl = ttl.map(|ttl| ttl.map(millis));
            response.extensions.insert(
                EXTENSION_KEY,
                json!({
                    "hit": false,
                    "didCache": ttl.is_some(),
                    "ttl": ttl.flatten(),
                }),
            );
        }
    }

    /// Insert the response if it can be cached, returning the ttl it was stored with.
    fn try_store(&self, cache_key: &str, response: &graphql::Response) -> Option<Option<Duration>> {
        if !response.errors.is_empty() {
            tracing::debug!(cache.key = %cache_key, "response has errors, it will not be cached");
            return None;
        }
        let data = response.data.as_ref()?;

        let mut entities = BTreeSet::new();
        extract_entities(data, &mut |entity| {
            entities.insert(entity);
        });

        let typenames: BTreeSet<&str> = entities.iter().map(EntityId::typename).collect();
        if let Some(ignored) = typenames
            .iter()
            .find(|typename| self.config.ignored_types.contains(**typename))
        {
            tracing::debug!(cache.key = %cache_key, typename = %ignored, "response contains an ignored type, it will not be cached");
            return None;
        }

        let ttl = self.config.ttl_for(typenames.iter().copied());
        if ttl.is_some_and(|ttl| ttl.is_zero()) {
            return None;
        }

        let entities: HashSet<String> = entities.iter().map(ToString::to_string).collect();
        tracing::debug!(cache.key = %cache_key, entities = entities.len(), "caching response");
        self.cache
            .insert(cache_key.to_string(), response.clone(), entities, ttl);
        Some(ttl)
    }

    fn invalidate(&self, response: &mut graphql::Response) {
        let mut entities = BTreeSet::new();
        if let Some(data) = &response.data {
            extract_entities(data, &mut |entity| {
                entities.insert(entity);
            });
        }

        let ids: Vec<String> = entities.iter().map(ToString::to_string).collect();
        let count = self.cache.invalidate(ids.iter().map(String::as_str));
        tracing::debug!(
            count,
            entities = %ids.iter().join(", "),
            "mutation invalidated cached responses"
        );

        if self.config.include_extension_metadata {
            let invalidated: Vec<_> = entities
                .iter()
                .map(|entity| match entity.id() {
                    Some(id) => json!({ "typename": entity.typename(), "id": id }),
                    None => json!({ "typename": entity.typename() }),
                })
                .collect();
            response.extensions.insert(
                EXTENSION_KEY,
                json!({ "invalidatedEntities": invalidated }),
            );
        }
    }
}

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)
}

impl Plugin for ResponseCache {
    fn name(&self) -> &'static str {
        PLUGIN_NAME
    }

    fn parse_service(&self, service: parse::BoxService) -> parse::BoxService {
        service
            .map_response(|mut response: parse::Response| {
                add_typename_to_document(Arc::make_mut(&mut response.document));
                response
            })
            .boxed()
    }

    fn execution_service(&self, service: execution::BoxService) -> execution::BoxService {
        ServiceBuilder::new()
            .layer(CacheLayer {
                cache: self.clone(),
            })
            .service(service)
            .boxed()
    }
}

/// Token carried from [`ResponseCache::before_execute`] to [`ResponseCache::after_execute`].
#[derive(Debug)]
pub struct PendingExecution {
    kind: PendingKind,
}

impl PendingExecution {
    fn bypass() -> Self {
        Self {
            kind: PendingKind::Bypass,
        }
    }
}

#[derive(Debug)]
enum PendingKind {
    Query { cache_key: String },
    Mutation,
    /// subscriptions, and executions the cache could not make sense of
    Bypass,
}

/// How an execution resolved.
#[derive(Debug)]
pub enum ExecutionOutcome<'a> {
    /// A single response, which may get cache metadata added to its extensions.
    Response(&'a mut graphql::Response),
    /// A stream of responses, never cached.
    Stream,
}

struct CacheLayer {
    cache: ResponseCache,
}

impl<S> Layer<S> for CacheLayer {
    type Service = CacheService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CacheService {
            inner,
            cache: self.cache.clone(),
        }
    }
}

struct CacheService<S> {
    inner: S,
    cache: ResponseCache,
}

impl<S> Service<execution::Request> for CacheService<S>
where
    S: Service<execution::Request, Response = execution::Response, Error = BoxError>,
    S::Future: Send + 'static,
{
    type Response = execution::Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: execution::Request) -> Self::Future {
        let pending = match self.cache.before_execute(&request) {
            ControlFlow::Break(response) => {
                return Box::pin(futures::future::ready(Ok(execution::Response::Single(
                    response,
                ))));
            }
            ControlFlow::Continue(pending) => pending,
        };

        let cache = self.cache.clone();
        let fut = self.inner.call(request);
        Box::pin(async move {
            match fut.await? {
                execution::Response::Single(mut response) => {
                    cache.after_execute(pending, ExecutionOutcome::Response(&mut response));
                    Ok(execution::Response::Single(response))
                }
                stream @ execution::Response::Stream(_) => {
                    cache.after_execute(pending, ExecutionOutcome::Stream);
                    Ok(stream)
                }
            }
        })
    }
}
