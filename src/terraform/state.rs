//! Terraform state parser.
//!
//! Reads both on-disk state layouts into [`ResourceRecord`]s: the legacy
//! `modules[].resources` layout and the current `resources[].instances[]`
//! layout. The raw JSON tree is kept alongside the records so it can be
//! rewritten in place and persisted.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ReconcileError;
use crate::reconcile::{Origin, ResourceCollection};
use crate::resource::{AttributeValue, ResourceRecord};

/// Wire layout of a state document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateFormat {
    /// `modules[].resources{address: {type, provider, primary}}`
    Legacy,
    /// `resources[]{mode, type, name, instances[]}`
    ResourceList,
}

impl StateFormat {
    /// `resources` wins over `modules`; anything else is not a state document.
    pub fn detect(raw: &serde_json::Value) -> Option<StateFormat> {
        if raw.get("resources").is_some_and(|r| r.is_array()) {
            Some(StateFormat::ResourceList)
        } else if raw.get("modules").is_some_and(|m| m.is_array()) {
            Some(StateFormat::Legacy)
        } else {
            None
        }
    }
}

impl fmt::Display for StateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateFormat::Legacy => f.write_str("legacy"),
            StateFormat::ResourceList => f.write_str("resource-list"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResourceListState {
    resources: Vec<StateResource>,
}

#[derive(Debug, Deserialize)]
struct StateResource {
    #[serde(default)]
    mode: String,
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    instances: Vec<StateInstance>,
}

#[derive(Debug, Deserialize)]
struct StateInstance {
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    dependencies: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct LegacyState {
    modules: Vec<LegacyModule>,
}

#[derive(Debug, Deserialize)]
struct LegacyModule {
    #[serde(default)]
    resources: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct LegacyResource {
    #[serde(rename = "type")]
    resource_type: String,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    primary: Option<LegacyPrimary>,
}

#[derive(Debug, Deserialize)]
struct LegacyPrimary {
    #[serde(default)]
    id: String,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
}

/// One parsed state file: its raw tree plus the managed records in it.
#[derive(Debug, Clone)]
pub struct StateDocument {
    path: PathBuf,
    format: StateFormat,
    raw: serde_json::Value,
    records: Vec<ResourceRecord>,
}

impl StateDocument {
    /// Read and decode `path`. `format` of `None` detects the layout.
    pub fn load(path: &Path, format: Option<StateFormat>) -> Result<Self, ReconcileError> {
        let content = std::fs::read_to_string(path).map_err(|e| ReconcileError::io(path, e))?;
        let raw: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| ReconcileError::malformed(path, e.to_string()))?;
        Self::from_value(path, raw, format)
    }

    pub fn from_value(
        path: &Path,
        raw: serde_json::Value,
        format: Option<StateFormat>,
    ) -> Result<Self, ReconcileError> {
        let format = match format {
            Some(format) => format,
            None => StateFormat::detect(&raw).ok_or_else(|| {
                ReconcileError::malformed(path, "neither a `resources` nor a `modules` array")
            })?,
        };

        let records = match format {
            StateFormat::ResourceList => parse_resource_list(path, &raw)?,
            StateFormat::Legacy => parse_legacy(path, &raw)?,
        };

        tracing::debug!(
            path = %path.display(),
            %format,
            count = records.len(),
            "state document parsed"
        );

        Ok(Self {
            path: path.to_path_buf(),
            format,
            raw,
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> StateFormat {
        self.format
    }

    /// Every managed instance in document order, data sources excluded.
    pub fn records(&self) -> &[ResourceRecord] {
        &self.records
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.raw
    }

    pub fn raw_mut(&mut self) -> &mut serde_json::Value {
        &mut self.raw
    }

    /// Identity map over the records, keyed by the given convention.
    pub fn collection(&self, origin: Origin) -> ResourceCollection {
        ResourceCollection::from_records(origin, self.records.iter().cloned())
    }

    /// Write the raw tree back to its file through a temp file + rename.
    pub fn persist(&self) -> Result<(), ReconcileError> {
        let persist_err = |source| ReconcileError::Persist {
            path: self.path.clone(),
            source,
        };

        let mut body = serde_json::to_string_pretty(&self.raw)
            .map_err(|e| persist_err(std::io::Error::other(e)))?;
        body.push('\n');

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "terraform.tfstate".to_string());
        let temp_path = self.path.with_file_name(format!("{file_name}.tmp"));

        std::fs::write(&temp_path, body).map_err(persist_err)?;
        std::fs::rename(&temp_path, &self.path).map_err(persist_err)?;

        tracing::debug!(path = %self.path.display(), "state document persisted");
        Ok(())
    }
}

/// Parse `path` and build its identity map under `origin` in one step.
pub fn parse_state_file(
    path: &Path,
    format: Option<StateFormat>,
    origin: Origin,
) -> Result<(StateDocument, ResourceCollection), ReconcileError> {
    let document = StateDocument::load(path, format)?;
    let collection = document.collection(origin);
    tracing::info!(
        path = %path.display(),
        %origin,
        count = collection.len(),
        "resources indexed"
    );
    Ok((document, collection))
}

fn parse_resource_list(
    path: &Path,
    raw: &serde_json::Value,
) -> Result<Vec<ResourceRecord>, ReconcileError> {
    let state: ResourceListState = serde_json::from_value(raw.clone())
        .map_err(|e| ReconcileError::malformed(path, e.to_string()))?;

    let mut records = Vec::new();
    for (index, resource) in state.resources.into_iter().enumerate() {
        if resource.mode == "data" {
            continue;
        }

        for instance in resource.instances {
            let id = instance.attributes.get("id").map(id_string).unwrap_or_default();
            let attributes = instance
                .attributes
                .into_iter()
                .map(|(k, v)| (k, AttributeValue::from(v)))
                .collect();

            records.push(ResourceRecord {
                id,
                resource_type: resource.resource_type.clone(),
                resource_name: resource.name.clone(),
                attributes,
                depends_on: instance.dependencies.unwrap_or_default(),
                resource_index: index,
            });
        }
    }

    Ok(records)
}

fn parse_legacy(path: &Path, raw: &serde_json::Value) -> Result<Vec<ResourceRecord>, ReconcileError> {
    let state: LegacyState = serde_json::from_value(raw.clone())
        .map_err(|e| ReconcileError::malformed(path, e.to_string()))?;

    let mut records = Vec::new();
    let mut index = 0usize;
    for module in state.modules {
        for (address, body) in module.resources {
            let position = index;
            index += 1;

            if address.starts_with("data.") {
                continue;
            }

            let resource: LegacyResource = serde_json::from_value(body).map_err(|e| {
                ReconcileError::malformed(path, format!("resource `{address}`: {e}"))
            })?;

            let primary = resource.primary.unwrap_or(LegacyPrimary {
                id: String::new(),
                attributes: serde_json::Map::new(),
            });

            records.push(ResourceRecord {
                id: primary.id,
                resource_name: legacy_resource_name(&address, &resource.resource_type),
                resource_type: resource.resource_type,
                attributes: primary
                    .attributes
                    .into_iter()
                    .map(|(k, v)| (k, AttributeValue::from(v)))
                    .collect(),
                depends_on: resource.depends_on,
                resource_index: position,
            });
        }
    }

    Ok(records)
}

// NOTE: `aws_instance.web.1` -> `web`; count suffixes collapse onto the block
fn legacy_resource_name(address: &str, resource_type: &str) -> String {
    let name = address
        .strip_prefix(resource_type)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(address);

    match name.rsplit_once('.') {
        Some((base, suffix)) if suffix.parse::<u64>().is_ok() => base.to_string(),
        _ => name.to_string(),
    }
}

fn id_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
