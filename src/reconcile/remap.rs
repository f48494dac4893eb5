//! Dependency remapping.
//!
//! Candidates carry dependencies written in the discovered namespace
//! (`type.name` as the import tool named things). Once moved, they have to
//! point at whatever the target calls the same cloud objects. The rewrite is
//! applied to the raw discovered document, since that document is what the
//! state move reads, and flushed to disk after each candidate.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use super::diff::MergeCandidate;
use super::identity::{Origin, ResourceCollection, resource_key};
use crate::error::ReconcileError;
use crate::resource::ResourceRecord;
use crate::terraform::{StateDocument, StateFormat};

/// One dependency reference resolved to its target-side address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyRewrite {
    /// Address of the candidate owning the dependency list.
    pub resource: String,
    /// Index among the distinct references of the resource block.
    pub position: usize,
    pub from: String,
    pub to: String,
}

impl DependencyRewrite {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// Not present in the discovered document at all (for example a data source).
    Dangling,
    /// Another candidate that has not been processed yet.
    PendingCandidate,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedReason::Dangling => f.write_str("not in discovered state"),
            UnresolvedReason::PendingCandidate => f.write_str("candidate not yet moved"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedDependency {
    pub resource: String,
    pub dependency: String,
    pub reason: UnresolvedReason,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RemapReport {
    pub rewrites: Vec<DependencyRewrite>,
    pub unresolved: Vec<UnresolvedDependency>,
    /// Number of times the discovered document was written back.
    pub writes: usize,
}

/// Rewrite each candidate's dependencies to target-namespace addresses.
///
/// Candidates are walked in the given order. A dependency resolves when the
/// object it names is already managed by the target, or when it is a
/// candidate processed earlier in this walk (it will be moved under its own
/// address). Anything else stays as written and is reported unresolved.
///
/// Every instance of a candidate's resource block is rewritten, matching
/// entries by value. The document is persisted after every candidate that
/// resolved at least one dependency; a persist failure aborts the walk without undoing earlier
/// writes.
pub fn remap_dependencies(
    document: &mut StateDocument,
    discovered: &ResourceCollection,
    target: &ResourceCollection,
    candidates: &mut [MergeCandidate],
) -> Result<RemapReport, ReconcileError> {
    if document.format() == StateFormat::Legacy
        && candidates.iter().any(|c| !c.record.depends_on.is_empty())
    {
        return Err(ReconcileError::malformed(
            document.path(),
            "dependencies cannot be remapped in a legacy-format state document",
        ));
    }

    let mut report = RemapReport::default();
    // discovered key -> address the candidate will have after its move
    let mut planned: HashMap<String, String> = HashMap::new();

    for candidate in candidates.iter_mut() {
        let address = candidate.address();
        let references = dependency_references(document, &candidate.record);
        let mut resolved: HashMap<String, String> = HashMap::new();

        for (position, dependency) in references.iter().enumerate() {
            let Some(referenced) = discovered.get(dependency) else {
                tracing::warn!(resource = %address, %dependency, "dependency not found in discovered state");
                report.unresolved.push(UnresolvedDependency {
                    resource: address.clone(),
                    dependency: dependency.clone(),
                    reason: UnresolvedReason::Dangling,
                });
                continue;
            };

            let target_key = Origin::Target.key_for(referenced);
            let to = match target.get(&target_key) {
                Some(existing) => resource_key(&existing.resource_type, &existing.resource_name),
                None => match planned.get(dependency) {
                    Some(planned_address) => planned_address.clone(),
                    None => {
                        tracing::warn!(
                            resource = %address,
                            %dependency,
                            "dependency is a candidate not yet moved; left unresolved"
                        );
                        report.unresolved.push(UnresolvedDependency {
                            resource: address.clone(),
                            dependency: dependency.clone(),
                            reason: UnresolvedReason::PendingCandidate,
                        });
                        continue;
                    }
                },
            };

            tracing::debug!(resource = %address, from = %dependency, %to, "dependency remapped");
            report.rewrites.push(DependencyRewrite {
                resource: address.clone(),
                position,
                from: dependency.clone(),
                to: to.clone(),
            });
            resolved.insert(dependency.clone(), to);
        }

        if !resolved.is_empty() {
            rewrite_instances(document, candidate.record.resource_index, &resolved)?;
            for dependency in candidate.record.depends_on.iter_mut() {
                if let Some(to) = resolved.get(dependency.as_str()) {
                    *dependency = to.clone();
                }
            }
            document.persist()?;
            report.writes += 1;
        }
        planned.insert(candidate.discovered_key.clone(), address);
    }

    tracing::info!(
        rewrites = report.rewrites.len(),
        unresolved = report.unresolved.len(),
        writes = report.writes,
        "dependency remap complete"
    );
    Ok(report)
}

/// Distinct dependency references of a resource block, the record's own list
/// first, then whatever other instances of the same block add.
fn dependency_references(document: &StateDocument, record: &ResourceRecord) -> Vec<String> {
    let pointer = format!("/resources/{}/instances", record.resource_index);
    let from_instances = document
        .raw()
        .pointer(&pointer)
        .and_then(serde_json::Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|instance| instance.get("dependencies")?.as_array())
        .flatten()
        .filter_map(serde_json::Value::as_str)
        .map(str::to_string);

    let mut seen = HashSet::new();
    record
        .depends_on
        .iter()
        .cloned()
        .chain(from_instances)
        .filter(|dependency| seen.insert(dependency.clone()))
        .collect()
}

/// Replace resolved entries in the `dependencies` of every instance.
fn rewrite_instances(
    document: &mut StateDocument,
    resource_index: usize,
    resolved: &HashMap<String, String>,
) -> Result<(), ReconcileError> {
    let pointer = format!("/resources/{resource_index}/instances");
    let path = document.path().to_path_buf();
    let Some(instances) = document
        .raw_mut()
        .pointer_mut(&pointer)
        .and_then(serde_json::Value::as_array_mut)
    else {
        return Err(ReconcileError::malformed(path, format!("no instance list at {pointer}")));
    };

    let lists = instances
        .iter_mut()
        .filter_map(|instance| instance.get_mut("dependencies")?.as_array_mut());
    for entry in lists.flatten() {
        if let Some(to) = entry.as_str().and_then(|from| resolved.get(from)) {
            *entry = serde_json::Value::String(to.clone());
        }
    }
    Ok(())
}
