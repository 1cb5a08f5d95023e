//! armrepo - ARM Linux package repository builder

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use armrepo_cli::ui::TerminalReporter;
use armrepo_cli::{Cli, Commands, Context, cmd, load_config};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose.
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match dispatch(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    let command = cli.command.unwrap_or(Commands::Run);
    if let Commands::Config = command {
        return cmd::config::config(&config);
    }

    // Configuration mistakes are reported before host checks.
    if let Commands::Mirror { repository } = &command {
        cmd::mirror::resolve_groups(&config, repository.as_deref())?;
    }

    cmd::preflight(cli.skip_root_check)?;

    let reporter = Arc::new(TerminalReporter::new());
    let ctx = Context::new(config, reporter.clone())?;

    let result = match command {
        Commands::Run => cmd::run::run(&ctx).await,
        Commands::Mirror { repository } => cmd::mirror::mirror(&ctx, repository.as_deref()).await,
        Commands::Build => cmd::build::build(&ctx).await,
        Commands::Config => Ok(()),
    };

    // Drain the UI actor before the error chain reaches stderr.
    drop(ctx);
    drop(reporter);
    result
}
