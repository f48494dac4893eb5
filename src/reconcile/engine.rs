//! Reconciliation run driver.
//!
//! One run walks `Start -> Diffed -> {NoOp | Remapping -> Remapped -> Moving
//! -> Moved -> Emitted}`. Any error moves the run to `Failed` and stops it;
//! work already flushed to disk stays where it is.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::diff::{self, DiffReport, MergeCandidate};
use super::emit::EmissionBuffer;
use super::identity::Origin;
use super::remap::{self, DependencyRewrite, UnresolvedDependency};
use super::sanitize::sanitize_record;
use crate::config::ReconcileConfig;
use crate::error::{ReconcileError, RunFailure};
use crate::resource::ResourceRecord;
use crate::terraform::{CommandError, ProviderSchema, StateDocument, TerraformExecutor};

const BACKUP_SUFFIX: &str = "_backup";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Start,
    Diffed,
    NoOp,
    Remapping,
    Remapped,
    Moving,
    Moved,
    Emitted,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::NoOp | RunPhase::Emitted | RunPhase::Failed)
    }

    pub fn can_advance_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        match (self, next) {
            (from, Failed) => !from.is_terminal(),
            (Start, Diffed)
            | (Diffed, NoOp)
            | (Diffed, Remapping)
            | (Remapping, Remapped)
            | (Remapped, Moving)
            | (Moving, Moved)
            | (Moved, Emitted) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Start => "start",
            RunPhase::Diffed => "diffed",
            RunPhase::NoOp => "no-op",
            RunPhase::Remapping => "remapping",
            RunPhase::Remapped => "remapped",
            RunPhase::Moving => "moving",
            RunPhase::Moved => "moved",
            RunPhase::Emitted => "emitted",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Nothing to merge; no file was touched.
    NoOp,
    Emitted,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub run_id: String,
    pub outcome: ReconcileOutcome,
    pub in_sync: bool,
    pub already_present: Vec<String>,
    /// Addresses moved into the target state, in move order.
    pub moved: Vec<String>,
    pub rewrites: Vec<DependencyRewrite>,
    pub unresolved: Vec<UnresolvedDependency>,
    pub backups: Vec<PathBuf>,
    pub config_file: PathBuf,
    pub emitted_blocks: usize,
}

/// Fresh run identifier, also used to name the command log files.
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub struct Reconciler<E> {
    config: ReconcileConfig,
    executor: E,
    run_id: String,
}

struct RunState<'a> {
    run_id: &'a str,
    phase: RunPhase,
    moved: Vec<String>,
    backups: Vec<PathBuf>,
    backed_up: HashSet<PathBuf>,
    deadline: Instant,
}

impl RunState<'_> {
    fn advance(&mut self, next: RunPhase) {
        debug_assert!(self.phase.can_advance_to(next), "{} -> {next}", self.phase);
        tracing::info!(run_id = %self.run_id, from = %self.phase, to = %next, "run phase");
        self.phase = next;
    }
}

impl<E: TerraformExecutor> Reconciler<E> {
    pub fn new(config: ReconcileConfig, executor: E) -> Self {
        Self {
            config,
            executor,
            run_id: new_run_id(),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    pub fn preview(&self) -> Result<DiffReport, ReconcileError> {
        preview(&self.config)
    }

    /// Execute one full reconciliation run.
    pub async fn run(&self) -> Result<ReconcileReport, RunFailure> {
        let mut state = RunState {
            run_id: &self.run_id,
            phase: RunPhase::Start,
            moved: Vec::new(),
            backups: Vec::new(),
            backed_up: HashSet::new(),
            deadline: Instant::now() + self.config.run_timeout,
        };
        tracing::info!(
            run_id = %self.run_id,
            target = %self.config.target_state.display(),
            discovered = %self.config.discovered_state.display(),
            "reconciliation started"
        );

        match self.execute(&mut state).await {
            Ok(report) => Ok(report),
            Err(source) => {
                let phase = state.phase;
                state.advance(RunPhase::Failed);
                tracing::error!(
                    run_id = %self.run_id,
                    %phase,
                    moved = state.moved.len(),
                    error = %source,
                    "reconciliation failed"
                );
                Err(RunFailure {
                    phase,
                    moved: state.moved,
                    source,
                })
            }
        }
    }

    async fn execute(&self, state: &mut RunState<'_>) -> Result<ReconcileReport, ReconcileError> {
        let config = &self.config;

        if config.refresh_discovered {
            self.backup(state, &config.discovered_state)?;
            let timeout = self.budget(state)?;
            self.executor.refresh(&config.discovered_dir, timeout).await?;
        }

        let target = StateDocument::load(&config.target_state, config.target_format)?
            .collection(Origin::Target);
        let mut discovered_doc =
            StateDocument::load(&config.discovered_state, config.discovered_format)?;
        let discovered = discovered_doc.collection(Origin::Discovered);

        let diff_report = diff::diff(&target, &discovered);
        state.advance(RunPhase::Diffed);

        if diff_report.is_noop() {
            state.advance(RunPhase::NoOp);
            tracing::info!(run_id = %self.run_id, "nothing to merge");
            return Ok(self.report(state, ReconcileOutcome::NoOp, diff_report, Vec::new(), Vec::new(), 0));
        }

        let mut candidates = diff::order_candidates(diff_report.candidates.clone(), config.order);

        let schema = self.load_schema(state).await?;
        let sanitized = sanitize_all(&candidates, &schema)?;

        self.backup(state, &config.discovered_state)?;
        self.backup(state, &config.target_state)?;

        state.advance(RunPhase::Remapping);
        let remap_report =
            remap::remap_dependencies(&mut discovered_doc, &discovered, &target, &mut candidates)?;
        state.advance(RunPhase::Remapped);

        state.advance(RunPhase::Moving);
        let mut buffer = EmissionBuffer::new();
        for (candidate, record) in candidates.iter().zip(&sanitized) {
            let address = candidate.address();
            let timeout = self.budget(state)?;
            tracing::info!(run_id = %self.run_id, %address, "moving resource");
            self.executor
                .state_mv(
                    &config.target_dir,
                    &config.discovered_state,
                    &config.target_state,
                    &address,
                    timeout,
                )
                .await?;
            state.moved.push(address);

            let block = schema.lookup(&record.resource_type)?;
            buffer.push(record, block);
        }
        state.advance(RunPhase::Moved);

        let emitted = buffer.append_to(&config.config_file)?;
        state.advance(RunPhase::Emitted);

        Ok(self.report(
            state,
            ReconcileOutcome::Emitted,
            diff_report,
            remap_report.rewrites,
            remap_report.unresolved,
            emitted,
        ))
    }

    async fn load_schema(&self, state: &RunState<'_>) -> Result<ProviderSchema, ReconcileError> {
        let schema = match &self.config.schema_file {
            Some(path) => ProviderSchema::load(path)?,
            None => {
                let timeout = self.budget(state)?;
                self.executor
                    .providers_schema(&self.config.target_dir, timeout)
                    .await?
            }
        };
        tracing::debug!(
            run_id = %self.run_id,
            resource_types = schema.resource_type_count(),
            "provider schema loaded"
        );
        Ok(schema)
    }

    /// Per-command timeout, capped by what is left of the run budget.
    fn budget(&self, state: &RunState<'_>) -> Result<Duration, ReconcileError> {
        let remaining = state.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(CommandError::TimedOut {
                program: self.config.terraform_bin.clone(),
                timeout: self.config.run_timeout,
                stdout: String::new(),
                stderr: String::new(),
            }
            .into());
        }
        Ok(remaining.min(self.config.command_timeout))
    }

    fn backup(&self, state: &mut RunState<'_>, path: &Path) -> Result<(), ReconcileError> {
        if !self.config.backup || state.backed_up.contains(path) {
            return Ok(());
        }

        let backup_path = backup_path(path);
        std::fs::copy(path, &backup_path).map_err(|e| ReconcileError::io(path, e))?;
        tracing::info!(
            run_id = %self.run_id,
            source = %path.display(),
            backup = %backup_path.display(),
            "state backed up"
        );
        state.backed_up.insert(path.to_path_buf());
        state.backups.push(backup_path);
        Ok(())
    }

    fn report(
        &self,
        state: &mut RunState<'_>,
        outcome: ReconcileOutcome,
        diff_report: DiffReport,
        rewrites: Vec<DependencyRewrite>,
        unresolved: Vec<UnresolvedDependency>,
        emitted_blocks: usize,
    ) -> ReconcileReport {
        ReconcileReport {
            run_id: self.run_id.clone(),
            outcome,
            in_sync: diff_report.in_sync,
            already_present: diff_report.already_present,
            moved: std::mem::take(&mut state.moved),
            rewrites,
            unresolved,
            backups: std::mem::take(&mut state.backups),
            config_file: self.config.config_file.clone(),
            emitted_blocks,
        }
    }
}

/// Parse both documents and report what a run would merge. Never writes.
pub fn preview(config: &ReconcileConfig) -> Result<DiffReport, ReconcileError> {
    let target = StateDocument::load(&config.target_state, config.target_format)?
        .collection(Origin::Target);
    let discovered = StateDocument::load(&config.discovered_state, config.discovered_format)?
        .collection(Origin::Discovered);

    let mut report = diff::diff(&target, &discovered);
    report.candidates = diff::order_candidates(report.candidates, config.order);
    Ok(report)
}

/// `terraform.tfstate` -> `terraform.tfstate_backup`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

fn sanitize_all(
    candidates: &[MergeCandidate],
    schema: &ProviderSchema,
) -> Result<Vec<ResourceRecord>, ReconcileError> {
    candidates
        .iter()
        .map(|candidate| -> Result<ResourceRecord, ReconcileError> {
            let block = schema.lookup(&candidate.record.resource_type)?;
            Ok(sanitize_record(&candidate.record, block))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        use RunPhase::*;
        let path = [Start, Diffed, Remapping, Remapped, Moving, Moved, Emitted];
        for pair in path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        assert!(Diffed.can_advance_to(NoOp));
    }

    #[test]
    fn test_invalid_transitions() {
        use RunPhase::*;
        assert!(!Start.can_advance_to(Moving));
        assert!(!Remapped.can_advance_to(Emitted));
        assert!(!NoOp.can_advance_to(Failed));
        assert!(!Emitted.can_advance_to(Failed));
        assert!(Moving.can_advance_to(Failed));
    }

    #[test]
    fn test_terminal_phases() {
        assert!(RunPhase::NoOp.is_terminal());
        assert!(RunPhase::Emitted.is_terminal());
        assert!(RunPhase::Failed.is_terminal());
        assert!(!RunPhase::Moving.is_terminal());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(RunPhase::Moving.to_string(), "moving");
        assert_eq!(RunPhase::NoOp.to_string(), "no-op");
    }

    #[test]
    fn test_backup_path() {
        assert_eq!(
            backup_path(Path::new("/repo/terraform.tfstate")),
            PathBuf::from("/repo/terraform.tfstate_backup")
        );
    }

    #[test]
    fn test_run_ids_are_unique() {
        assert_ne!(new_run_id(), new_run_id());
    }
}
