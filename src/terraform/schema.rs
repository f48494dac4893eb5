//! Provider schema as reported by `terraform providers schema -json`.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ReconcileError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderSchema {
    #[serde(default)]
    pub format_version: Option<String>,
    #[serde(default)]
    pub provider_schemas: HashMap<String, ProviderEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderEntry {
    #[serde(default)]
    pub resource_schemas: HashMap<String, ResourceSchema>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResourceSchema {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub block: SchemaBlock,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SchemaBlock {
    #[serde(default)]
    pub attributes: HashMap<String, SchemaAttribute>,
    #[serde(default)]
    pub block_types: HashMap<String, NestedBlock>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SchemaAttribute {
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub computed: bool,
}

impl SchemaAttribute {
    /// Computed-only attributes cannot appear in authored configuration.
    pub fn is_settable(&self) -> bool {
        self.optional || self.required
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct NestedBlock {
    #[serde(default)]
    pub nesting_mode: String,
    #[serde(default)]
    pub block: SchemaBlock,
}

impl ProviderSchema {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    /// Read a schema dump previously written by `terraform providers schema -json`.
    pub fn load(path: &Path) -> Result<Self, ReconcileError> {
        let content = std::fs::read_to_string(path).map_err(|e| ReconcileError::io(path, e))?;
        Self::from_json(&content).map_err(|e| ReconcileError::malformed(path, e.to_string()))
    }

    /// Block schema for `resource_type`, searched across every provider.
    pub fn lookup(&self, resource_type: &str) -> Result<&SchemaBlock, ReconcileError> {
        self.provider_schemas
            .values()
            .find_map(|provider| provider.resource_schemas.get(resource_type))
            .map(|schema| &schema.block)
            .ok_or_else(|| ReconcileError::SchemaLookup(resource_type.to_string()))
    }

    pub fn resource_type_count(&self) -> usize {
        self.provider_schemas
            .values()
            .map(|p| p.resource_schemas.len())
            .sum()
    }
}
