//! Primary cache key of a query response
use crate::error::CacheError;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::sort_keys;

/// Cache key for a query response
pub(super) struct PrimaryCacheKey<'a> {
    /// printed document, after the `__typename` rewrite
    pub(super) query: &'a str,
    pub(super) operation_name: Option<&'a str>,
    pub(super) variables: &'a Object,
    /// `None` for a response shared by every session
    pub(super) session: Option<&'a str>,
}

impl PrimaryCacheKey<'_> {
    pub(super) fn hash(&self) -> Result<String, CacheError> {
        let Self {
            query,
            operation_name,
            variables,
            session,
        } = self;

        // object keys are sorted so `{a, b}` and `{b, a}` hash the same
        let variables = serde_json::to_vec(&sort_keys(&Value::Object((*variables).clone())))?;

        let mut digest = blake3::Hasher::new();
        digest.update(query.as_bytes());
        digest.update(&[0u8; 1][..]);
        digest.update(operation_name.unwrap_or_default().as_bytes());
        digest.update(&[0u8; 1][..]);
        digest.update(&variables);
        digest.update(&[0u8; 1][..]);
        digest.update(session.unwrap_or_default().as_bytes());

        Ok(digest.finalize().to_hex().to_string())
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    fn hash(query: &str, variables: Value, session: Option<&str>) -> String {
        let variables = variables.as_object().cloned().unwrap_or_default();
        PrimaryCacheKey {
            query,
            operation_name: None,
            variables: &variables,
            session,
        }
        .hash()
        .unwrap()
    }

    #[test]
    fn identical_inputs_give_identical_keys() {
        let first = hash("{ me { name } }", json!({"id": 1}), Some("alice"));
        let second = hash("{ me { name } }", json!({"id": 1}), Some("alice"));
        assert_eq!(first, second);
        // blake3 hex digest
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn every_component_changes_the_key() {
        let reference = hash("{ me { name } }", json!({"id": 1}), None);
        assert_ne!(reference, hash("{ me { id } }", json!({"id": 1}), None));
        assert_ne!(reference, hash("{ me { name } }", json!({"id": 2}), None));
        assert_ne!(reference, hash("{ me { name } }", json!({"id": 1}), Some("alice")));

        let variables = json!({"id": 1});
        let named = PrimaryCacheKey {
            query: "{ me { name } }",
            operation_name: Some("Me"),
            variables: variables.as_object().unwrap(),
            session: None,
        }
        .hash()
        .unwrap();
        assert_ne!(reference, named);
    }

    #[test]
    fn missing_session_is_the_public_key() {
        assert_eq!(
            hash("{ me { name } }", json!({}), None),
            hash("{ me { name } }", json!({}), Some(""))
        );
    }

    #[test]
    fn variable_order_does_not_matter() {
        assert_eq!(
            hash("{ me { name } }", json!({"a": 1, "b": {"c": 1, "d": 2}}), None),
            hash("{ me { name } }", json!({"b": {"d": 2, "c": 1}, "a": 1}), None)
        );
        assert_ne!(
            hash("{ me { name } }", json!({"a": [1, 2]}), None),
            hash("{ me { name } }", json!({"a": [2, 1]}), None)
        );
    }

    #[test]
    fn separators_keep_components_apart() {
        // moving text from the query to the session must not collide
        assert_ne!(
            hash("{ me }a", json!({}), None),
            hash("{ me }", json!({}), Some("a"))
        );
    }
}
