//! Terraform execution abstraction.
//!
//! The engine only talks to Terraform through [`TerraformExecutor`], so the
//! whole reconciliation flow can run against a scripted executor in tests.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use super::command::{CommandError, CommandOutput, CommandRunner};
use super::schema::ProviderSchema;
use crate::error::ReconcileError;

#[async_trait]
pub trait TerraformExecutor: Send + Sync {
    /// Move `address` from `source_state` into `dest_state`, keeping the address.
    async fn state_mv(
        &self,
        work_dir: &Path,
        source_state: &Path,
        dest_state: &Path,
        address: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError>;

    /// Schemas of every provider configured in `work_dir`.
    async fn providers_schema(
        &self,
        work_dir: &Path,
        timeout: Duration,
    ) -> Result<ProviderSchema, ReconcileError>;

    async fn refresh(&self, work_dir: &Path, timeout: Duration) -> Result<CommandOutput, CommandError>;
}

/// Executor backed by the `terraform` binary.
#[derive(Debug, Clone)]
pub struct CliTerraformExecutor {
    binary: String,
    runner: CommandRunner,
}

impl CliTerraformExecutor {
    pub fn new(binary: impl Into<String>, runner: CommandRunner) -> Self {
        Self {
            binary: binary.into(),
            runner,
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }
}

pub(crate) fn state_mv_args(source_state: &Path, dest_state: &Path, address: &str) -> Vec<String> {
    vec![
        "state".to_string(),
        "mv".to_string(),
        format!("-state={}", source_state.display()),
        format!("-state-out={}", dest_state.display()),
        address.to_string(),
        address.to_string(),
    ]
}

#[async_trait]
impl TerraformExecutor for CliTerraformExecutor {
    async fn state_mv(
        &self,
        work_dir: &Path,
        source_state: &Path,
        dest_state: &Path,
        address: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, CommandError> {
        let args = state_mv_args(source_state, dest_state, address);
        self.runner.run(&self.binary, &args, work_dir, timeout).await
    }

    async fn providers_schema(
        &self,
        work_dir: &Path,
        timeout: Duration,
    ) -> Result<ProviderSchema, ReconcileError> {
        let args = ["providers", "schema", "-json"].map(String::from);
        let output = self.runner.run(&self.binary, &args, work_dir, timeout).await?;
        ProviderSchema::from_json(&output.stdout).map_err(|e| {
            ReconcileError::malformed(work_dir, format!("providers schema output: {e}"))
        })
    }

    async fn refresh(&self, work_dir: &Path, timeout: Duration) -> Result<CommandOutput, CommandError> {
        let args = ["refresh".to_string(), "-no-color".to_string()];
        self.runner.run(&self.binary, &args, work_dir, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_mv_args() {
        let args = state_mv_args(
            Path::new("/d/terraform.tfstate"),
            Path::new("/t/terraform.tfstate"),
            "vm.db1",
        );
        assert_eq!(
            args,
            vec![
                "state",
                "mv",
                "-state=/d/terraform.tfstate",
                "-state-out=/t/terraform.tfstate",
                "vm.db1",
                "vm.db1",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial_test::serial]
    async fn test_cli_executor_parses_schema_from_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-terraform");
        std::fs::write(
            &script,
            "#!/bin/sh\necho '{\"format_version\":\"1.0\",\"provider_schemas\":{\"p\":{\"resource_schemas\":{\"vm\":{\"block\":{}}}}}}'\n",
        )
        .unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let executor = CliTerraformExecutor::new(
            script.display().to_string(),
            CommandRunner::new(dir.path().join("logs"), "schema-test"),
        );
        let schema = executor
            .providers_schema(dir.path(), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(schema.lookup("vm").is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    #[serial_test::serial]
    async fn test_cli_executor_rejects_garbage_schema() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-terraform");
        std::fs::write(&script, "#!/bin/sh\necho not-json\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let executor = CliTerraformExecutor::new(
            script.display().to_string(),
            CommandRunner::new(dir.path().join("logs"), "schema-test"),
        );
        let err = executor
            .providers_schema(dir.path(), Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::MalformedState { .. }));
    }
}
