use std::collections::BTreeMap;

use crate::resource::{AttributeValue, ResourceRecord};
use crate::terraform::SchemaBlock;

const ID_ATTRIBUTE: &str = "id";

/// Copy of `record` with only attributes that may appear in configuration.
///
/// Drops `id`, attributes the schema marks computed-only, and empty values.
/// Attributes the schema does not mention are kept. Nested block values are
/// filtered against their own block schema.
pub fn sanitize_record(record: &ResourceRecord, schema: &SchemaBlock) -> ResourceRecord {
    let mut attributes = sanitize_attributes(&record.attributes, schema);
    attributes.remove(ID_ATTRIBUTE);

    let removed = record.attributes.len() - attributes.len();
    tracing::debug!(
        address = %record.address(),
        kept = attributes.len(),
        removed,
        "attributes sanitized"
    );

    ResourceRecord {
        attributes,
        ..record.clone()
    }
}

fn sanitize_attributes(
    attributes: &BTreeMap<String, AttributeValue>,
    schema: &SchemaBlock,
) -> BTreeMap<String, AttributeValue> {
    attributes
        .iter()
        .filter(|(name, _)| {
            schema
                .attributes
                .get(name.as_str())
                .is_none_or(|attribute| attribute.is_settable())
        })
        .filter_map(|(name, value)| {
            let value = match schema.block_types.get(name.as_str()) {
                Some(nested) => sanitize_nested(value, &nested.block),
                None => value.clone(),
            };
            (!value.is_empty_value()).then(|| (name.clone(), value))
        })
        .collect()
}

// Blocks are stored as a list of objects (list/set nesting) or a bare object
// (single nesting).
fn sanitize_nested(value: &AttributeValue, block: &SchemaBlock) -> AttributeValue {
    match value {
        AttributeValue::Map(entries) => AttributeValue::Map(sanitize_attributes(entries, block)),
        AttributeValue::List(items) => AttributeValue::List(
            items
                .iter()
                .map(|item| sanitize_nested(item, block))
                .filter(|item| !item.is_empty_value())
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terraform::{NestedBlock, SchemaAttribute};
    use serde_json::json;
    use std::collections::HashMap;

    fn optional() -> SchemaAttribute {
        SchemaAttribute {
            optional: true,
            ..SchemaAttribute::default()
        }
    }

    fn computed() -> SchemaAttribute {
        SchemaAttribute {
            computed: true,
            ..SchemaAttribute::default()
        }
    }

    fn record(attributes: serde_json::Value) -> ResourceRecord {
        let AttributeValue::Map(attributes) = AttributeValue::from(attributes) else {
            panic!("attributes must be an object");
        };
        ResourceRecord {
            id: "abc123".to_string(),
            resource_type: "vm".to_string(),
            resource_name: "db1".to_string(),
            attributes,
            depends_on: vec!["vm.web1".to_string()],
            resource_index: 1,
        }
    }

    fn schema() -> SchemaBlock {
        SchemaBlock {
            attributes: HashMap::from([
                ("x".to_string(), computed()),
                ("y".to_string(), optional()),
                ("enabled".to_string(), optional()),
                ("name".to_string(), optional()),
                ("id".to_string(), SchemaAttribute { optional: true, computed: true, required: false }),
            ]),
            block_types: HashMap::from([(
                "disk".to_string(),
                NestedBlock {
                    nesting_mode: "list".to_string(),
                    block: SchemaBlock {
                        attributes: HashMap::from([
                            ("size".to_string(), optional()),
                            ("uuid".to_string(), computed()),
                        ]),
                        block_types: HashMap::new(),
                    },
                },
            )]),
        }
    }

    #[test]
    fn test_removes_computed_empty_and_keeps_false() {
        let sanitized = sanitize_record(
            &record(json!({"x": "computed-value", "y": [], "enabled": false, "name": "db"})),
            &schema(),
        );
        assert!(!sanitized.attributes.contains_key("x"));
        assert!(!sanitized.attributes.contains_key("y"));
        assert_eq!(sanitized.attributes["enabled"], AttributeValue::Bool(false));
        assert_eq!(sanitized.attributes["name"], AttributeValue::from("db"));
    }

    #[test]
    fn test_id_always_removed() {
        let sanitized = sanitize_record(&record(json!({"id": "abc123"})), &SchemaBlock::default());
        assert!(sanitized.attributes.is_empty());
    }

    #[test]
    fn test_null_empty_string_and_empty_map_removed() {
        let sanitized = sanitize_record(
            &record(json!({"a": null, "b": "", "c": {}, "d": 0})),
            &SchemaBlock::default(),
        );
        let keys: Vec<&str> = sanitized.attributes.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["d"]);
    }

    #[test]
    fn test_unknown_attributes_are_kept() {
        let sanitized = sanitize_record(&record(json!({"extra": "v"})), &schema());
        assert!(sanitized.attributes.contains_key("extra"));
    }

    #[test]
    fn test_identity_fields_preserved() {
        let original = record(json!({"name": "db"}));
        let sanitized = sanitize_record(&original, &schema());
        assert_eq!(sanitized.id, original.id);
        assert_eq!(sanitized.resource_name, original.resource_name);
        assert_eq!(sanitized.depends_on, original.depends_on);
        assert_eq!(sanitized.resource_index, original.resource_index);
    }

    #[test]
    fn test_nested_blocks_sanitized_recursively() {
        let sanitized = sanitize_record(
            &record(json!({"disk": [
                {"size": 10, "uuid": "u-1"},
                {"uuid": "u-2"}
            ]})),
            &schema(),
        );
        assert_eq!(
            serde_json::to_value(&sanitized.attributes["disk"]).unwrap(),
            json!([{"size": 10}])
        );
    }

    #[test]
    fn test_nested_block_dropped_when_emptied() {
        let sanitized = sanitize_record(&record(json!({"disk": [{"uuid": "u-1"}]})), &schema());
        assert!(!sanitized.attributes.contains_key("disk"));
    }
}
