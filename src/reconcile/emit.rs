//! HCL rendering of sanitized resources and the append-only config writer.

use std::io::Write;
use std::path::Path;

use hcl::{Block, Body, Expression, Identifier};

use crate::error::ReconcileError;
use crate::resource::{AttributeValue, ResourceRecord};
use crate::terraform::SchemaBlock;

/// Resource blocks waiting to be rendered, in move order.
#[derive(Debug, Default)]
pub struct EmissionBuffer {
    blocks: Vec<Block>,
    addresses: Vec<String>,
}

impl EmissionBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: &ResourceRecord, schema: &SchemaBlock) {
        self.addresses.push(record.address());
        self.blocks.push(resource_block(record, schema));
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn render(&self) -> Result<String, ReconcileError> {
        let body = self
            .blocks
            .iter()
            .cloned()
            .fold(Body::builder(), |builder, block| builder.add_block(block))
            .build();
        Ok(hcl::to_string(&body)?)
    }

    /// Render and append to `path`. Existing content is never truncated; an
    /// empty buffer leaves the file alone.
    pub fn append_to(&self, path: &Path) -> Result<usize, ReconcileError> {
        if self.is_empty() {
            return Ok(0);
        }

        let rendered = self.render()?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ReconcileError::io(path, e))?;
        file.write_all(b"\n")
            .and_then(|_| file.write_all(rendered.as_bytes()))
            .map_err(|e| ReconcileError::io(path, e))?;

        tracing::info!(path = %path.display(), blocks = self.len(), "configuration appended");
        Ok(self.len())
    }
}

/// `resource "<type>" "<name>" { ... }` for an already sanitized record.
pub fn resource_block(record: &ResourceRecord, schema: &SchemaBlock) -> Block {
    let builder = Block::builder("resource")
        .add_label(record.resource_type.as_str())
        .add_label(record.resource_name.as_str());
    fill_body(builder, &record.attributes, schema, &record.address()).build()
}

fn fill_body<'a>(
    mut builder: hcl::structure::BlockBuilder,
    attributes: impl IntoIterator<Item = (&'a String, &'a AttributeValue)>,
    schema: &SchemaBlock,
    address: &str,
) -> hcl::structure::BlockBuilder {
    for (name, value) in attributes {
        if !is_identifier(name) {
            tracing::warn!(%address, attribute = %name, "skipping attribute with a non-identifier name");
            continue;
        }

        match schema.block_types.get(name.as_str()) {
            Some(nested) => {
                for body in nested_bodies(value) {
                    let child = fill_body(Block::builder(Identifier::sanitized(name)), body, &nested.block, address);
                    builder = builder.add_block(child.build());
                }
            }
            None => {
                builder = builder.add_attribute((Identifier::sanitized(name), expression(value)));
            }
        }
    }
    builder
}

fn nested_bodies(value: &AttributeValue) -> Vec<&std::collections::BTreeMap<String, AttributeValue>> {
    match value {
        AttributeValue::Map(entries) => vec![entries],
        AttributeValue::List(items) => items
            .iter()
            .filter_map(|item| match item {
                AttributeValue::Map(entries) => Some(entries),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn expression(value: &AttributeValue) -> Expression {
    Expression::from(to_hcl_value(value))
}

fn to_hcl_value(value: &AttributeValue) -> hcl::Value {
    match value {
        AttributeValue::Null => hcl::Value::Null,
        AttributeValue::Bool(b) => hcl::Value::Bool(*b),
        AttributeValue::Number(n) => hcl_number(n)
            .map(hcl::Value::Number)
            .unwrap_or_else(|| hcl::Value::String(n.to_string())),
        AttributeValue::String(s) => hcl::Value::String(s.clone()),
        AttributeValue::List(items) => hcl::Value::Array(items.iter().map(to_hcl_value).collect()),
        AttributeValue::Map(entries) => hcl::Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), to_hcl_value(v)))
                .collect(),
        ),
    }
}

fn hcl_number(n: &serde_json::Number) -> Option<hcl::Number> {
    if let Some(i) = n.as_i64() {
        Some(hcl::Number::from(i))
    } else if let Some(u) = n.as_u64() {
        Some(hcl::Number::from(u))
    } else {
        n.as_f64().and_then(hcl::Number::from_f64)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terraform::NestedBlock;
    use serde_json::json;
    use std::collections::{BTreeMap, HashMap};

    fn record(name: &str, attributes: serde_json::Value) -> ResourceRecord {
        let AttributeValue::Map(attributes) = AttributeValue::from(attributes) else {
            panic!("attributes must be an object");
        };
        ResourceRecord {
            id: "def456".to_string(),
            resource_type: "vm".to_string(),
            resource_name: name.to_string(),
            attributes,
            depends_on: vec![],
            resource_index: 0,
        }
    }

    #[test]
    fn test_render_single_resource() {
        let mut buffer = EmissionBuffer::new();
        buffer.push(
            &record("db1", json!({"name": "db", "enabled": false, "size": 20})),
            &SchemaBlock::default(),
        );
        let text = buffer.render().unwrap();

        assert!(text.contains("resource \"vm\" \"db1\" {"));
        assert!(text.contains("name = \"db\""));
        assert!(text.contains("enabled = false"));
        assert!(text.contains("size = 20"));
    }

    #[test]
    fn test_render_lists_and_maps() {
        let mut buffer = EmissionBuffer::new();
        buffer.push(
            &record("db1", json!({"tags": ["a", "b"], "labels": {"env": "prod"}})),
            &SchemaBlock::default(),
        );
        let text = buffer.render().unwrap();
        assert!(text.contains("tags = ["));
        assert!(text.contains("\"a\""));
        assert!(text.contains("labels = {"));
        assert!(text.contains("env = \"prod\""));
    }

    #[test]
    fn test_nested_block_types_render_as_blocks() {
        let schema = SchemaBlock {
            attributes: HashMap::new(),
            block_types: HashMap::from([(
                "disk".to_string(),
                NestedBlock {
                    nesting_mode: "list".to_string(),
                    block: SchemaBlock::default(),
                },
            )]),
        };
        let mut buffer = EmissionBuffer::new();
        buffer.push(&record("db1", json!({"disk": [{"size": 10}, {"size": 20}]})), &schema);
        let text = buffer.render().unwrap();

        assert_eq!(text.matches("disk {").count(), 2);
        assert!(!text.contains("disk = "));
    }

    #[test]
    fn test_non_identifier_attribute_skipped() {
        let block = resource_block(
            &record("db1", json!({"bad key": "x", "ok": "y"})),
            &SchemaBlock::default(),
        );
        let text = hcl::to_string(&Body::builder().add_block(block).build()).unwrap();
        assert!(!text.contains("bad key"));
        assert!(text.contains("ok = \"y\""));
    }

    #[test]
    fn test_append_preserves_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.tf");
        std::fs::write(&path, "provider \"ibm\" {}\n").unwrap();

        let mut buffer = EmissionBuffer::new();
        buffer.push(&record("db1", json!({"name": "db"})), &SchemaBlock::default());
        buffer.push(&record("db2", json!({"name": "db2"})), &SchemaBlock::default());
        assert_eq!(buffer.append_to(&path).unwrap(), 2);

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("provider \"ibm\" {}\n"));
        let first = written.find("\"db1\"").unwrap();
        let second = written.find("\"db2\"").unwrap();
        assert!(first < second);
        assert_eq!(buffer.addresses(), &["vm.db1".to_string(), "vm.db2".to_string()]);
    }

    #[test]
    fn test_empty_buffer_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.tf");
        assert_eq!(EmissionBuffer::new().append_to(&path).unwrap(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_number_conversion() {
        let value = to_hcl_value(&AttributeValue::from(json!(1.5)));
        assert_eq!(value, hcl::Value::Number(hcl::Number::from_f64(1.5).unwrap()));
        let value = to_hcl_value(&AttributeValue::Map(BTreeMap::new()));
        assert_eq!(value, hcl::Value::Object(hcl::Map::new()));
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("name"));
        assert!(is_identifier("_x-1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a.b"));
    }
}
