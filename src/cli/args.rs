use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use tfmerge::config::{self, ReconcileConfig};
use tfmerge::{OrderPolicy, StateFormat};

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Debug logging when RUST_LOG is not set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Move discovered resources into the target state and append their HCL
    Merge(MergeArgs),
    /// Show what a merge would do without touching any file
    Diff(DiffArgs),
}

#[derive(clap::Args, Debug)]
pub struct StateArgs {
    /// Directory of the existing configuration
    #[arg(long)]
    pub target_dir: PathBuf,

    /// Directory holding the imported state
    #[arg(long)]
    pub discovered_dir: PathBuf,

    /// Defaults to <target-dir>/terraform.tfstate
    #[arg(long)]
    pub target_state: Option<PathBuf>,

    /// Defaults to <discovered-dir>/terraform.tfstate
    #[arg(long)]
    pub discovered_state: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = FormatArg::Auto)]
    pub target_format: FormatArg,

    #[arg(long, value_enum, default_value_t = FormatArg::Auto)]
    pub discovered_format: FormatArg,

    #[arg(long, value_enum, default_value_t = OrderArg::Trust)]
    pub order: OrderArg,

    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub output: OutputFormat,
}

#[derive(clap::Args, Debug)]
pub struct MergeArgs {
    #[command(flatten)]
    pub state: StateArgs,

    /// File the generated resource blocks are appended to (default <target-dir>/main.tf)
    #[arg(long)]
    pub config_file: Option<PathBuf>,

    /// Saved `terraform providers schema -json` output
    #[arg(long)]
    pub schema_file: Option<PathBuf>,

    #[arg(long, env = "TFMERGE_TERRAFORM_BIN", default_value = config::DEFAULT_TERRAFORM_BIN)]
    pub terraform_bin: String,

    #[arg(long, env = "TFMERGE_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Per-command timeout in seconds
    #[arg(long, default_value_t = config::DEFAULT_COMMAND_TIMEOUT.as_secs())]
    pub command_timeout: u64,

    /// Whole-run timeout in seconds
    #[arg(long, default_value_t = config::DEFAULT_RUN_TIMEOUT.as_secs())]
    pub run_timeout: u64,

    /// Skip the `<state>_backup` copies
    #[arg(long)]
    pub no_backup: bool,

    /// Run `terraform refresh` in the discovered directory first
    #[arg(long)]
    pub refresh: bool,
}

#[derive(clap::Args, Debug)]
pub struct DiffArgs {
    #[command(flatten)]
    pub state: StateArgs,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatArg {
    Auto,
    Legacy,
    ResourceList,
}

impl From<FormatArg> for Option<StateFormat> {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Auto => None,
            FormatArg::Legacy => Some(StateFormat::Legacy),
            FormatArg::ResourceList => Some(StateFormat::ResourceList),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderArg {
    Trust,
    Topological,
}

impl From<OrderArg> for OrderPolicy {
    fn from(arg: OrderArg) -> Self {
        match arg {
            OrderArg::Trust => OrderPolicy::Trust,
            OrderArg::Topological => OrderPolicy::Topological,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl StateArgs {
    pub fn to_config(&self) -> ReconcileConfig {
        let mut config = ReconcileConfig::new(&self.target_dir, &self.discovered_dir)
            .with_order(self.order.into());
        if let Some(path) = &self.target_state {
            config.target_state = path.clone();
        }
        if let Some(path) = &self.discovered_state {
            config.discovered_state = path.clone();
        }
        config.target_format = self.target_format.into();
        config.discovered_format = self.discovered_format.into();
        config
    }
}

impl MergeArgs {
    pub fn to_config(&self) -> ReconcileConfig {
        let mut config = self
            .state
            .to_config()
            .with_backup(!self.no_backup)
            .with_timeouts(
                Duration::from_secs(self.command_timeout),
                Duration::from_secs(self.run_timeout),
            );
        if let Some(path) = &self.config_file {
            config.config_file = path.clone();
        }
        if let Some(path) = &self.schema_file {
            config = config.with_schema_file(path);
        }
        if let Some(path) = &self.log_dir {
            config = config.with_log_dir(path);
        }
        config.terraform_bin = self.terraform_bin.clone();
        config.refresh_discovered = self.refresh;
        config
    }
}
