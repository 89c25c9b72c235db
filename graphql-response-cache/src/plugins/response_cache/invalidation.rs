use std::sync::Arc;

use once_cell::sync::OnceCell;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use super::entity::EntityId;
use crate::cache::EntityCache;
use crate::error::ConfigurationError;
use crate::error::InvalidationError;

#[derive(Clone, Debug)]
pub(crate) struct Invalidation {
    cache: EntityCache,
}

impl Invalidation {
    pub(crate) fn new(cache: EntityCache) -> Self {
        Self { cache }
    }

    pub(crate) fn invalidate(&self, requests: Vec<InvalidationRequest>) -> u64 {
        let _span = tracing::info_span!("cache.invalidation.batch").entered();

        let entities: Vec<String> = requests
            .iter()
            .map(|request| {
                tracing::debug!("got invalidation request: {request:?}");
                request.entity_id().to_string()
            })
            .collect();
        let count = self.cache.invalidate(entities.iter().map(String::as_str));
        tracing::debug!(count, "invalidation batch done");
        count
    }
}

/// Invalidation entry point for callers outside of the query pipeline, like a webhook or a
/// background job.
///
/// A controller is cheap to clone and can be created before the [`ResponseCache`] it will drive,
/// then handed to its builder. Until then, invalidation requests fail with
/// [`InvalidationError::NotBound`].
///
/// [`ResponseCache`]: super::ResponseCache
#[derive(Clone, Debug, Default)]
pub struct CacheController {
    invalidation: Arc<OnceCell<Invalidation>>,
}

impl CacheController {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bind(&self, invalidation: Invalidation) -> Result<(), ConfigurationError> {
        self.invalidation
            .set(invalidation)
            .map_err(|_| ConfigurationError::ControllerAlreadyBound)
    }

    pub fn is_bound(&self) -> bool {
        self.invalidation.get().is_some()
    }

    /// Remove every cached response containing an object of type `typename`, or, when `id` is
    /// set, containing that specific object. Returns the number of removed responses.
    pub fn purge(&self, typename: &str, id: Option<&str>) -> Result<u64, InvalidationError> {
        self.invalidate(vec![InvalidationRequest::from(EntityId::new(typename, id))])
    }

    /// Run a batch of invalidation requests, returning the number of removed responses.
    pub fn invalidate(&self, requests: Vec<InvalidationRequest>) -> Result<u64, InvalidationError> {
        let invalidation = self.invalidation.get().ok_or(InvalidationError::NotBound)?;
        Ok(invalidation.invalidate(requests))
    }
}

/// An invalidation request, as sent to a webhook:
/// `{"kind": "type", "type": "User"}` or `{"kind": "entity", "type": "User", "id": "1"}`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvalidationRequest {
    Type { r#type: String },
    Entity { r#type: String, id: String },
}

impl InvalidationRequest {
    fn entity_id(&self) -> EntityId {
        match self {
            InvalidationRequest::Type { r#type } => EntityId::Type(r#type.clone()),
            InvalidationRequest::Entity { r#type, id } => EntityId::Instance {
                typename: r#type.clone(),
                id: id.clone(),
            },
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InvalidationRequest::Type { .. } => "type",
            InvalidationRequest::Entity { .. } => "entity",
        }
    }
}

impl From<EntityId> for InvalidationRequest {
    fn from(entity: EntityId) -> Self {
        match entity {
            EntityId::Type(r#type) => InvalidationRequest::Type { r#type },
            EntityId::Instance { typename, id } => InvalidationRequest::Entity {
                r#type: typename,
                id,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::num::NonZeroUsize;

    use super::*;
    use crate::graphql;

    fn cache() -> EntityCache {
        let cache = EntityCache::new(NonZeroUsize::new(10).unwrap(), None);
        for (key, entities) in [
            ("q1", vec!["User", "User:1"]),
            ("q2", vec!["User", "User:2"]),
            ("q3", vec!["Post", "Post:1"]),
        ] {
            cache.insert(
                key.to_string(),
                graphql::Response::default(),
                entities.into_iter().map(String::from).collect::<HashSet<_>>(),
                None,
            );
        }
        cache
    }

    #[test]
    fn unbound_controllers_refuse_requests() {
        let controller = CacheController::new();
        assert!(!controller.is_bound());
        assert_eq!(
            controller.purge("User", None),
            Err(InvalidationError::NotBound)
        );
    }

    #[test]
    fn controllers_bind_once() {
        let controller = CacheController::new();
        controller.bind(Invalidation::new(cache())).unwrap();
        assert_eq!(
            controller.bind(Invalidation::new(cache())),
            Err(ConfigurationError::ControllerAlreadyBound)
        );
    }

    #[test]
    fn purge_targets_instances_or_types() {
        let cache = cache();
        let controller = CacheController::new();
        controller.bind(Invalidation::new(cache.clone())).unwrap();

        assert_eq!(controller.purge("User", Some("1")), Ok(1));
        assert!(cache.contains("q2"));
        assert_eq!(controller.purge("User", None), Ok(1));
        assert_eq!(cache.len(), 1);
        cache.assert_consistent();
    }

    #[test]
    fn batches_deserialize_from_webhook_payloads() {
        let cache = cache();
        let controller = CacheController::new();
        controller.bind(Invalidation::new(cache.clone())).unwrap();

        let requests: Vec<InvalidationRequest> = serde_json::from_str(
            r#"[{"kind": "entity", "type": "Post", "id": "1"}, {"kind": "type", "type": "User"}]"#,
        )
        .unwrap();
        assert_eq!(requests[0].kind(), "entity");
        assert_eq!(requests[1].kind(), "type");
        assert_eq!(controller.invalidate(requests), Ok(3));
        assert_eq!(cache.len(), 0);
        cache.assert_consistent();
    }
}
