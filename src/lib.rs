//! tfmerge - Terraform state reconciliation
//!
//! Merges resources discovered by an import tool into an existing Terraform
//! configuration: finds what the target state does not manage yet, rewires
//! dependencies onto the target's names, moves the resources across state
//! files and appends sanitized HCL for them.

pub mod config;
pub mod error;
pub mod reconcile;
pub mod resource;
pub mod terraform;

pub use config::ReconcileConfig;
pub use error::{ReconcileError, RunFailure};
pub use reconcile::{
    DiffReport, MergeCandidate, OrderPolicy, Origin, ReconcileOutcome, ReconcileReport, Reconciler,
    ResourceCollection, RunPhase,
};
pub use resource::{AttributeValue, ResourceRecord};
pub use terraform::{
    CliTerraformExecutor, CommandError, CommandOutput, CommandRunner, ProviderSchema, StateDocument,
    StateFormat, TerraformExecutor,
};
