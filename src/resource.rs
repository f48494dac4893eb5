use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// A dynamically typed attribute value as found in a state document.
///
/// Closed set of shapes so every consumer matches exhaustively.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<AttributeValue>),
    Map(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Null, zero-length strings and empty containers. `false` is a value.
    pub fn is_empty_value(&self) -> bool {
        match self {
            AttributeValue::Null => true,
            AttributeValue::Bool(_) | AttributeValue::Number(_) => false,
            AttributeValue::String(s) => s.is_empty(),
            AttributeValue::List(items) => items.is_empty(),
            AttributeValue::Map(entries) => entries.is_empty(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for AttributeValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => AttributeValue::Null,
            serde_json::Value::Bool(b) => AttributeValue::Bool(b),
            serde_json::Value::Number(n) => AttributeValue::Number(n),
            serde_json::Value::String(s) => AttributeValue::String(s),
            serde_json::Value::Array(items) => {
                AttributeValue::List(items.into_iter().map(AttributeValue::from).collect())
            }
            serde_json::Value::Object(entries) => AttributeValue::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, AttributeValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        serde_json::Value::deserialize(deserializer).map(AttributeValue::from)
    }
}

/// One managed resource instance read from a state document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ResourceRecord {
    /// Cloud-side identifier; empty for resources that were never refreshed.
    pub id: String,
    pub resource_type: String,
    pub resource_name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Dependency keys as written in the source document (`type.name`).
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Position of the parent resource block in its source document.
    pub resource_index: usize,
}

impl ResourceRecord {
    /// State address of the resource, `type.name`.
    pub fn address(&self) -> String {
        format!("{}.{}", self.resource_type, self.resource_name)
    }

    /// Field-wise equality with `resource_name` left out of the comparison.
    pub fn eq_ignoring_name(&self, other: &ResourceRecord) -> bool {
        self.id == other.id
            && self.resource_type == other.resource_type
            && self.attributes == other.attributes
            && self.depends_on == other.depends_on
            && self.resource_index == other.resource_index
    }
}
