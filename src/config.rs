use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::reconcile::OrderPolicy;
use crate::terraform::StateFormat;

pub const DEFAULT_STATE_FILE: &str = "terraform.tfstate";
pub const DEFAULT_CONFIG_FILE: &str = "main.tf";
pub const DEFAULT_TERRAFORM_BIN: &str = "terraform";
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3 * 60);
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Everything one reconciliation run needs to know about its environment.
///
/// Passed explicitly into the engine; nothing here is read from or written
/// to process-wide state.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileConfig {
    /// Directory holding the user's configuration; state moves run here.
    pub target_dir: PathBuf,
    pub discovered_dir: PathBuf,
    pub target_state: PathBuf,
    pub discovered_state: PathBuf,
    /// `None` detects the layout from the document.
    pub target_format: Option<StateFormat>,
    pub discovered_format: Option<StateFormat>,
    /// Configuration file that emitted blocks are appended to.
    pub config_file: PathBuf,
    /// Pre-dumped `terraform providers schema -json` output; queried live when unset.
    pub schema_file: Option<PathBuf>,
    pub terraform_bin: String,
    pub log_dir: PathBuf,
    pub command_timeout: Duration,
    pub run_timeout: Duration,
    pub backup: bool,
    pub refresh_discovered: bool,
    pub order: OrderPolicy,
}

impl ReconcileConfig {
    pub fn new(target_dir: impl Into<PathBuf>, discovered_dir: impl Into<PathBuf>) -> Self {
        let target_dir = target_dir.into();
        let discovered_dir = discovered_dir.into();
        Self {
            target_state: target_dir.join(DEFAULT_STATE_FILE),
            discovered_state: discovered_dir.join(DEFAULT_STATE_FILE),
            config_file: target_dir.join(DEFAULT_CONFIG_FILE),
            log_dir: default_log_dir(&target_dir),
            target_format: None,
            discovered_format: None,
            schema_file: None,
            terraform_bin: DEFAULT_TERRAFORM_BIN.to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            run_timeout: DEFAULT_RUN_TIMEOUT,
            backup: true,
            refresh_discovered: false,
            order: OrderPolicy::default(),
            target_dir,
            discovered_dir,
        }
    }

    pub fn with_schema_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_file = Some(path.into());
        self
    }

    pub fn with_log_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_dir = path.into();
        self
    }

    pub fn with_order(mut self, order: OrderPolicy) -> Self {
        self.order = order;
        self
    }

    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    pub fn with_timeouts(mut self, command: Duration, run: Duration) -> Self {
        self.command_timeout = command;
        self.run_timeout = run;
        self
    }
}

/// `<cache>/tfmerge/logs`, or `<target_dir>/.tfmerge/logs` when the platform
/// has no cache directory.
pub fn default_log_dir(target_dir: &Path) -> PathBuf {
    match dirs::cache_dir() {
        Some(cache) => cache.join("tfmerge").join("logs"),
        None => target_dir.join(".tfmerge").join("logs"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReconcileConfig::new("/repo", "/discovery");
        assert_eq!(config.target_state, PathBuf::from("/repo/terraform.tfstate"));
        assert_eq!(config.discovered_state, PathBuf::from("/discovery/terraform.tfstate"));
        assert_eq!(config.config_file, PathBuf::from("/repo/main.tf"));
        assert_eq!(config.terraform_bin, "terraform");
        assert_eq!(config.command_timeout, Duration::from_secs(180));
        assert_eq!(config.run_timeout, Duration::from_secs(3600));
        assert!(config.backup);
        assert!(!config.refresh_discovered);
        assert_eq!(config.order, OrderPolicy::Trust);
        assert!(config.target_format.is_none());
    }

    #[test]
    fn test_builders() {
        let config = ReconcileConfig::new("/repo", "/discovery")
            .with_schema_file("/tmp/schema.json")
            .with_log_dir("/tmp/logs")
            .with_order(OrderPolicy::Topological)
            .with_backup(false)
            .with_timeouts(Duration::from_secs(1), Duration::from_secs(2));
        assert_eq!(config.schema_file, Some(PathBuf::from("/tmp/schema.json")));
        assert_eq!(config.log_dir, PathBuf::from("/tmp/logs"));
        assert_eq!(config.order, OrderPolicy::Topological);
        assert!(!config.backup);
        assert_eq!(config.run_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_default_log_dir_ends_in_logs() {
        let dir = default_log_dir(Path::new("/repo"));
        assert!(dir.ends_with("logs"));
    }
}
