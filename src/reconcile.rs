//! The reconciliation pipeline: identity, diff, remap, sanitize, move, emit.

pub mod diff;
pub mod emit;
pub mod engine;
pub mod identity;
pub mod remap;
pub mod sanitize;

pub use diff::{DiffReport, MergeCandidate, OrderPolicy, diff, order_candidates};
pub use emit::EmissionBuffer;
pub use engine::{ReconcileOutcome, ReconcileReport, Reconciler, RunPhase};
pub use identity::{Origin, ResourceCollection, resource_key};
pub use remap::{DependencyRewrite, RemapReport, UnresolvedDependency, UnresolvedReason, remap_dependencies};
pub use sanitize::sanitize_record;
