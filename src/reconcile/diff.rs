use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use super::identity::{Origin, ResourceCollection};
use crate::resource::ResourceRecord;

/// How merge candidates are ordered before remapping and moving.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPolicy {
    /// Keep discovered-document order; the import tool is trusted to have
    /// emitted dependencies first. Violations surface as unresolved
    /// dependencies during remap.
    #[default]
    Trust,
    /// Stable topological sort over dependencies between candidates.
    Topological,
}

/// A discovered resource with no counterpart in the target state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeCandidate {
    pub record: ResourceRecord,
    /// Key in the discovered namespace, `type.name`.
    pub discovered_key: String,
    /// Key the target would use, `type.id`.
    pub target_key: String,
}

impl MergeCandidate {
    fn new(record: ResourceRecord) -> Self {
        Self {
            discovered_key: Origin::Discovered.key_for(&record),
            target_key: Origin::Target.key_for(&record),
            record,
        }
    }

    /// State address used for the move, identical in source and destination.
    pub fn address(&self) -> String {
        self.record.address()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiffReport {
    /// Both collections were equal ignoring resource names; nothing was diffed.
    pub in_sync: bool,
    /// Discovered addresses whose target key already exists.
    pub already_present: Vec<String>,
    pub candidates: Vec<MergeCandidate>,
}

impl DiffReport {
    pub fn is_noop(&self) -> bool {
        self.in_sync || self.candidates.is_empty()
    }
}

/// True when every discovered record has an equal (name aside) target record
/// under the target convention and the collections have the same size.
pub fn in_sync(target: &ResourceCollection, discovered: &ResourceCollection) -> bool {
    target.len() == discovered.len()
        && discovered.iter().all(|record| {
            target
                .get(&Origin::Target.key_for(record))
                .is_some_and(|existing| existing.eq_ignoring_name(record))
        })
}

/// Classify each discovered record as already present or a merge candidate.
///
/// Candidates keep their relative order from the discovered document.
pub fn diff(target: &ResourceCollection, discovered: &ResourceCollection) -> DiffReport {
    if in_sync(target, discovered) {
        tracing::info!(count = target.len(), "target and discovered state are in sync");
        return DiffReport {
            in_sync: true,
            ..DiffReport::default()
        };
    }

    let mut report = DiffReport::default();
    for record in discovered.iter() {
        let target_key = Origin::Target.key_for(record);
        if target.contains_key(&target_key) {
            tracing::debug!(address = %record.address(), %target_key, "already managed by target");
            report.already_present.push(record.address());
        } else {
            report.candidates.push(MergeCandidate::new(record.clone()));
        }
    }

    tracing::info!(
        candidates = report.candidates.len(),
        already_present = report.already_present.len(),
        "diff complete"
    );
    report
}

/// Apply `policy` to the candidate order.
pub fn order_candidates(candidates: Vec<MergeCandidate>, policy: OrderPolicy) -> Vec<MergeCandidate> {
    match policy {
        OrderPolicy::Trust => candidates,
        OrderPolicy::Topological => topological_order(candidates),
    }
}

// Kahn's algorithm; ready nodes are taken lowest original position first so
// independent candidates keep document order. Cyclic leftovers follow in
// document order.
fn topological_order(candidates: Vec<MergeCandidate>) -> Vec<MergeCandidate> {
    let position: HashMap<&str, usize> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (c.discovered_key.as_str(), i))
        .collect();

    let mut indegree = vec![0usize; candidates.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); candidates.len()];
    for (i, candidate) in candidates.iter().enumerate() {
        let parents: BTreeSet<usize> = candidate
            .record
            .depends_on
            .iter()
            .filter_map(|dep| position.get(dep.as_str()).copied())
            .filter(|&parent| parent != i)
            .collect();
        for parent in parents {
            indegree[i] += 1;
            dependents[parent].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..candidates.len()).filter(|&i| indegree[i] == 0).collect();
    let mut order = Vec::with_capacity(candidates.len());
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &child in &dependents[next] {
            indegree[child] -= 1;
            if indegree[child] == 0 {
                ready.insert(child);
            }
        }
    }

    if order.len() < candidates.len() {
        let placed: BTreeSet<usize> = order.iter().copied().collect();
        let cyclic: Vec<usize> = (0..candidates.len()).filter(|i| !placed.contains(i)).collect();
        tracing::warn!(count = cyclic.len(), "dependency cycle among candidates; keeping document order");
        order.extend(cyclic);
    }

    let mut slots: Vec<Option<MergeCandidate>> = candidates.into_iter().map(Some).collect();
    order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}
