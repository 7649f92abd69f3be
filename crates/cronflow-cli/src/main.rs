//! cronflow CLI and scheduler daemon entry point.
//!
//! Binary name: `cflow`
//!
//! Parses CLI arguments, sets up tracing, opens the job store, then
//! dispatches to the appropriate command handler or runs the scheduler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;
use cronflow_observe::{TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let tracing_options = TracingOptions {
        default_filter: cli.default_log_filter().to_string(),
        json: cli.json && matches!(cli.command, Commands::Serve),
        otel: cli.otel,
    };
    if let Err(e) = init_tracing(&tracing_options) {
        eprintln!("failed to initialize tracing: {e}");
    }

    let result = run(cli).await;
    shutdown_tracing();

    match result {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(e) => Err(e),
    }
}

/// Dispatch a parsed command. `Ok(false)` requests a failure exit status
/// without an error message.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    // Shell completions and cron helpers don't need app state
    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(shell, &mut cmd, "cflow", &mut std::io::stdout());
            Ok(true)
        }
        Commands::Cron { action } => cli::cron::handle_cron_command(action, cli.json),
        Commands::Job { action } => {
            let state = AppState::init().await?;
            cli::job::handle_job_command(action, &state, cli.json).await?;
            Ok(true)
        }
        Commands::Serve => {
            let state = AppState::init().await?;
            cli::serve::serve(&state, cli.json, cli.quiet).await?;
            Ok(true)
        }
    }
}
