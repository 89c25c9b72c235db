use std::collections::HashMap;
use std::collections::HashSet;

use super::storage::RemovalCause;
use super::storage::RemovalListener;

/// Bidirectional mapping between entity identifiers (`User`, `User:1`) and the cache keys of the
/// responses containing them.
///
/// Both maps always hold the same edges: a key present in `responses` has its edges mirrored in
/// `entities`, and an entity bucket disappears with its last response.
#[derive(Debug, Default)]
pub(crate) struct DependencyIndex {
    /// entity identifier -> cache keys
    entities: HashMap<String, HashSet<String>>,
    /// cache key -> entity identifiers
    responses: HashMap<String, HashSet<String>>,
}

impl DependencyIndex {
    /// Record that the response stored under `cache_key` depends on `entities`.
    ///
    /// Edges previously recorded for this key are dropped first.
    pub(crate) fn record_response<I>(&mut self, cache_key: &str, entities: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.remove_response(cache_key);

        let entities: HashSet<String> = entities.into_iter().collect();
        if entities.is_empty() {
            return;
        }
        for entity in &entities {
            self.entities
                .entry(entity.clone())
                .or_default()
                .insert(cache_key.to_string());
        }
        self.responses.insert(cache_key.to_string(), entities);
    }

    /// Drop every edge of a response. Unknown keys are ignored.
    pub(crate) fn remove_response(&mut self, cache_key: &str) {
        let Some(entities) = self.responses.remove(cache_key) else {
            return;
        };
        for entity in entities {
            if let Some(keys) = self.entities.get_mut(&entity) {
                keys.remove(cache_key);
                if keys.is_empty() {
                    self.entities.remove(&entity);
                }
            }
        }
    }

    /// Cache keys of the responses depending on an entity.
    pub(crate) fn dependents(&self, entity: &str) -> Vec<String> {
        self.entities
            .get(entity)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn entity_count(&self) -> usize {
        self.entities.len()
    }

    #[cfg(test)]
    pub(crate) fn response_count(&self) -> usize {
        self.responses.len()
    }

    #[cfg(test)]
    pub(crate) fn cache_keys(&self) -> impl Iterator<Item = &String> {
        self.responses.keys()
    }

    /// Panics if the two maps disagree on any edge.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        for (cache_key, entities) in &self.responses {
            assert!(!entities.is_empty(), "empty bucket for response {cache_key}");
            for entity in entities {
                assert!(
                    self.entities
                        .get(entity)
                        .is_some_and(|keys| keys.contains(cache_key)),
                    "missing edge {entity} -> {cache_key}"
                );
            }
        }
        for (entity, keys) in &self.entities {
            assert!(!keys.is_empty(), "empty bucket for entity {entity}");
            for cache_key in keys {
                assert!(
                    self.responses
                        .get(cache_key)
                        .is_some_and(|entities| entities.contains(entity)),
                    "missing edge {cache_key} -> {entity}"
                );
            }
        }
    }
}

impl<V> RemovalListener<String, V> for DependencyIndex {
    fn on_removal(&mut self, key: &String, _value: &V, cause: RemovalCause) {
        tracing::trace!(cache.key = %key, ?cause, "dropping response dependencies");
        self.remove_response(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entities(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn it_records_edges_in_both_directions() {
        let mut index = DependencyIndex::default();
        index.record_response("q1", entities(&["User", "User:1"]));
        index.record_response("q2", entities(&["User", "User:2"]));

        let mut users = index.dependents("User");
        users.sort();
        assert_eq!(users, vec!["q1".to_string(), "q2".to_string()]);
        assert_eq!(index.dependents("User:1"), vec!["q1".to_string()]);
        assert!(index.dependents("Post").is_empty());
        index.assert_consistent();
    }

    #[test]
    fn removing_a_response_drops_empty_entity_buckets() {
        let mut index = DependencyIndex::default();
        index.record_response("q1", entities(&["User", "User:1"]));
        index.record_response("q2", entities(&["User"]));

        index.remove_response("q1");
        assert!(index.dependents("User:1").is_empty());
        assert_eq!(index.dependents("User"), vec!["q2".to_string()]);
        assert_eq!(index.entity_count(), 1);
        assert_eq!(index.response_count(), 1);
        index.assert_consistent();

        // unknown keys are a no-op
        index.remove_response("unknown");
        index.remove_response("q1");
        index.assert_consistent();
    }

    #[test]
    fn recording_again_replaces_previous_edges() {
        let mut index = DependencyIndex::default();
        index.record_response("q1", entities(&["User", "User:1"]));
        index.record_response("q1", entities(&["Post"]));

        assert!(index.dependents("User").is_empty());
        assert_eq!(index.dependents("Post"), vec!["q1".to_string()]);
        index.assert_consistent();
    }

    #[test]
    fn responses_without_entities_have_no_edges() {
        let mut index = DependencyIndex::default();
        index.record_response("q1", Vec::new());
        assert_eq!(index.response_count(), 0);
        index.assert_consistent();
    }
}
