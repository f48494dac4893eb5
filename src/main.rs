mod cli;
mod output;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, MergeArgs};
use tfmerge::reconcile::engine::{new_run_id, preview};
use tfmerge::{CliTerraformExecutor, CommandRunner, Reconciler};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let filter = if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Merge(args) => merge(args).await?,
        Command::Diff(args) => {
            let report = preview(&args.state.to_config())?;
            println!("{}", output::render_diff(&report, args.state.output)?);
        }
    }

    Ok(())
}

async fn merge(args: MergeArgs) -> Result<()> {
    let config = args.to_config();
    let run_id = new_run_id();
    let runner = CommandRunner::new(&config.log_dir, run_id.clone());
    tracing::info!(
        %run_id,
        stdout_log = %runner.stdout_log().display(),
        stderr_log = %runner.stderr_log().display(),
        "command output logged"
    );

    let executor = CliTerraformExecutor::new(config.terraform_bin.clone(), runner);
    let reconciler = Reconciler::new(config, executor).with_run_id(run_id);

    match reconciler.run().await {
        Ok(report) => {
            println!("{}", output::render_report(&report, args.state.output)?);
            Ok(())
        }
        Err(failure) => {
            eprint!("{}", output::render_failure(&failure));
            Err(failure.into())
        }
    }
}
