use std::fmt;

use serde_json_bytes::Value;

pub(crate) const TYPENAME: &str = "__typename";
const ID: &str = "id";

/// Identifies the unit of invalidation: every object of a type, or one object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    /// `User`: matches every response containing any `User` object.
    Type(String),
    /// `User:1`: matches responses containing this specific object.
    Instance { typename: String, id: String },
}

impl EntityId {
    pub fn new(typename: impl Into<String>, id: Option<impl Into<String>>) -> Self {
        match id {
            Some(id) => EntityId::Instance {
                typename: typename.into(),
                id: id.into(),
            },
            None => EntityId::Type(typename.into()),
        }
    }

    pub fn typename(&self) -> &str {
        match self {
            EntityId::Type(typename) | EntityId::Instance { typename, .. } => typename,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            EntityId::Type(_) => None,
            EntityId::Instance { id, .. } => Some(id),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Type(typename) => write!(f, "{typename}"),
            EntityId::Instance { typename, id } => write!(f, "{typename}:{id}"),
        }
    }
}

/// Walk a response and report every object carrying a `__typename`.
///
/// Each such object yields its type, and also the object itself when it has an `id` that is a
/// string or a number. Objects with an `id` but no `__typename` are not identifiable and only get
/// their fields visited.
pub(crate) fn extract_entities(value: &Value, on_entity: &mut impl FnMut(EntityId)) {
    match value {
        Value::Object(object) => {
            if let Some(Value::String(typename)) = object.get(TYPENAME) {
                on_entity(EntityId::Type(typename.as_str().to_string()));
                if let Some(id) = object.get(ID).and_then(id_to_string) {
                    on_entity(EntityId::Instance {
                        typename: typename.as_str().to_string(),
                        id,
                    });
                }
            }
            for field in object.values() {
                extract_entities(field, on_entity);
            }
        }
        Value::Array(values) => {
            for value in values {
                extract_entities(value, on_entity);
            }
        }
        _ => {}
    }
}

fn id_to_string(id: &Value) -> Option<String> {
    match id {
        Value::String(id) => Some(id.as_str().to_string()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use serde_json_bytes::json;

    use super::*;

    fn extract(value: Value) -> BTreeSet<String> {
        let mut entities = BTreeSet::new();
        extract_entities(&value, &mut |entity| {
            entities.insert(entity.to_string());
        });
        entities
    }

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn it_extracts_types_and_instances() {
        let data = json!({
            "user": {
                "__typename": "User",
                "id": 1,
                "name": "A",
                "posts": [
                    {"__typename": "Post", "id": "p1", "title": "x"},
                    {"__typename": "Post", "id": "p2", "title": "y"}
                ]
            }
        });
        assert_eq!(
            extract(data),
            set(&["Post", "Post:p1", "Post:p2", "User", "User:1"])
        );
    }

    #[test]
    fn it_needs_a_typename_to_identify_an_object() {
        let data = json!({"user": {"id": 1, "profile": {"__typename": "Profile"}}});
        assert_eq!(extract(data), set(&["Profile"]));
    }

    #[test]
    fn it_skips_null_and_unusable_ids() {
        let data = json!({
            "a": {"__typename": "A", "id": null},
            "b": {"__typename": "B", "id": {"nested": true}},
            "c": null,
            "d": [null, 1, "x", {"__typename": "D", "id": 0}]
        });
        assert_eq!(extract(data), set(&["A", "B", "D", "D:0"]));
    }

    #[test]
    fn entity_ids_print_as_cache_tags() {
        assert_eq!(EntityId::new("User", None::<String>).to_string(), "User");
        assert_eq!(EntityId::new("User", Some("1")).to_string(), "User:1");
        let id = EntityId::new("User", Some("1"));
        assert_eq!(id.typename(), "User");
        assert_eq!(id.id(), Some("1"));
    }
}
