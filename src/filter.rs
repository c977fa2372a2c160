use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{TransformError, TransformResult};

pub const COMBINATOR_KEYS: [&str; 3] = ["AND", "OR", "NOT"];

// To-many relation quantifiers on a field filter key.
pub const LIST_MODIFIERS: [&str; 3] = ["_some", "_every", "_none"];

pub type FieldMap = IndexMap<String, FieldValue>;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(untagged)]
pub enum FilterNode {
    #[default]
    Empty,
    Fields(FieldMap),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(Value),
    Nested(FilterNode),
    // Branches keep their position; only `Nested` branches are rewritten.
    Combinator(Vec<FieldValue>),
}

/// Strips a single trailing list modifier, so `posts_some` resolves to `posts`.
pub fn strip_list_modifier(key: &str) -> &str {
    LIST_MODIFIERS
        .iter()
        .find_map(|modifier| key.strip_suffix(modifier))
        .unwrap_or(key)
}

pub fn is_combinator_key(key: &str) -> bool {
    COMBINATOR_KEYS.contains(&key)
}

impl FilterNode {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn fields(&self) -> Option<&FieldMap> {
        match self {
            Self::Empty => None,
            Self::Fields(fields) => Some(fields),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields().and_then(|fields| fields.get(key))
    }

    pub fn into_json(self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Fields(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, value.into_json()))
                    .collect(),
            ),
        }
    }

    fn from_object(object: serde_json::Map<String, Value>) -> Self {
        let fields = object
            .into_iter()
            .map(|(key, value)| {
                let value = FieldValue::classify(&key, value);
                (key, value)
            })
            .collect();
        Self::Fields(fields)
    }
}

impl TryFrom<Value> for FilterNode {
    type Error = TransformError;

    fn try_from(value: Value) -> TransformResult<Self> {
        match value {
            Value::Null => Ok(Self::Empty),
            Value::Object(object) => Ok(Self::from_object(object)),
            other => Err(TransformError::InvalidFilter(format!(
                "expected an object or null, found {}",
                other
            ))),
        }
    }
}

impl From<FilterNode> for Value {
    fn from(node: FilterNode) -> Self {
        node.into_json()
    }
}

impl From<FieldMap> for FilterNode {
    fn from(fields: FieldMap) -> Self {
        Self::Fields(fields)
    }
}

impl<'de> Deserialize<'de> for FilterNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        FilterNode::try_from(value).map_err(serde::de::Error::custom)
    }
}

impl FieldValue {
    fn classify(key: &str, value: Value) -> Self {
        match value {
            Value::Object(object) => Self::Nested(FilterNode::from_object(object)),
            Value::Array(items) if is_combinator_key(key) => {
                Self::Combinator(items.into_iter().map(FieldValue::from).collect())
            }
            other => Self::Scalar(other),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(value) => value.as_str(),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_json(self) -> Value {
        match self {
            Self::Scalar(value) => value,
            Self::Nested(node) => node.into_json(),
            Self::Combinator(items) => {
                Value::Array(items.into_iter().map(FieldValue::into_json).collect())
            }
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(object) => Self::Nested(FilterNode::from_object(object)),
            other => Self::Scalar(other),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Scalar(Value::String(value.to_string()))
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Scalar(Value::String(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Scalar(Value::from(value))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Scalar(Value::Bool(value))
    }
}

impl From<FilterNode> for FieldValue {
    fn from(node: FilterNode) -> Self {
        Self::Nested(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_strip_list_modifier() {
        assert_eq!(strip_list_modifier("posts_some"), "posts");
        assert_eq!(strip_list_modifier("posts_every"), "posts");
        assert_eq!(strip_list_modifier("posts_none"), "posts");
        assert_eq!(strip_list_modifier("author"), "author");
        // Only the trailing token is a modifier.
        assert_eq!(strip_list_modifier("some_posts"), "some_posts");
        assert_eq!(strip_list_modifier("tags_none_some"), "tags_none");
    }

    #[test]
    fn test_classifies_json_tree() {
        let node = FilterNode::try_from(json!({
            "age_gt": 5,
            "author": { "firstName": "Jane" },
            "AND": [{ "age_lt": 9 }, null],
            "id_in": ["a", "b"],
            "deleted": null
        }))
        .unwrap();

        assert_eq!(node.get("age_gt"), Some(&FieldValue::Scalar(json!(5))));
        assert!(matches!(node.get("author"), Some(FieldValue::Nested(FilterNode::Fields(_)))));
        match node.get("AND") {
            Some(FieldValue::Combinator(items)) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(items[0], FieldValue::Nested(FilterNode::Fields(_))));
                assert_eq!(items[1], FieldValue::Scalar(Value::Null));
            }
            other => panic!("expected combinator, got {:?}", other),
        }
        assert_eq!(node.get("id_in"), Some(&FieldValue::Scalar(json!(["a", "b"]))));
        assert_eq!(node.get("deleted"), Some(&FieldValue::Scalar(Value::Null)));
    }

    #[test]
    fn test_mixed_combinator_array_keeps_positions() {
        let input = json!({ "OR": [true, { "age_gt": 1 }, [2]], "tags": [{ "a": 1 }] });
        let node = FilterNode::try_from(input.clone()).unwrap();

        assert_eq!(
            node.get("OR"),
            Some(&FieldValue::Combinator(vec![
                FieldValue::Scalar(json!(true)),
                FieldValue::Nested(FilterNode::try_from(json!({ "age_gt": 1 })).unwrap()),
                FieldValue::Scalar(json!([2])),
            ]))
        );
        // Arrays outside the reserved keys stay opaque.
        assert_eq!(node.get("tags"), Some(&FieldValue::Scalar(json!([{ "a": 1 }]))));
        assert_eq!(node.into_json(), input);
    }

    #[test]
    fn test_rejects_non_object_root() {
        let err = FilterNode::try_from(json!("Jane")).unwrap_err();
        assert!(matches!(err, TransformError::InvalidFilter(_)));
        assert_eq!(FilterNode::try_from(Value::Null).unwrap(), FilterNode::Empty);
    }

    #[test]
    fn test_json_conversion_preserves_tree() {
        let input = json!({
            "OR": [{ "title_contains": "rust" }, { "author": { "age_gt": 30 } }],
            "published": true
        });
        let node = FilterNode::try_from(input.clone()).unwrap();
        assert_eq!(node.clone().into_json(), input);
        assert_eq!(serde_json::to_value(&node).unwrap(), input);
    }

    #[test]
    fn test_deserialize_filter_node() {
        let node: FilterNode = serde_json::from_str(r#"{"posts_some": {"title": "x"}}"#).unwrap();
        assert!(matches!(node.get("posts_some"), Some(FieldValue::Nested(_))));
        assert!(serde_json::from_str::<FilterNode>("42").is_err());
    }
}
