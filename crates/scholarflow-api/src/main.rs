//! Scholarflow CLI entry point.
//!
//! Binary name: `sflow`
//!
//! Parses CLI arguments, loads configuration, initializes tracing and the
//! checkpoint database, then dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;

use scholarflow_infra::config::load_global_config;
use scholarflow_infra::filesystem::resolve_data_dir;
use scholarflow_observe::tracing_setup::{LogConfig, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let data_dir = resolve_data_dir();
    let config = load_global_config(&data_dir).await;

    let log_config = LogConfig {
        json: config.logging.json,
        otel: config.logging.otel,
        verbosity: cli.verbose,
        quiet: cli.quiet,
    };
    if let Err(e) = init_tracing(&log_config) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    let result = run(cli, data_dir, config).await;
    shutdown_tracing();
    result
}

async fn run(
    cli: Cli,
    data_dir: std::path::PathBuf,
    config: scholarflow_types::config::GlobalConfig,
) -> anyhow::Result<()> {
    let state = AppState::init(data_dir, config).await?;
    let out = cli::Output {
        json: cli.json,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Start(args) => cli::workflow::handle_start(&state, args, out).await,
        Commands::Status { workflow_id } => {
            cli::workflow::handle_status(&state, &workflow_id, out).await
        }
        Commands::Review {
            workflow_id,
            papers,
            all,
            none,
            note,
        } => {
            let selection = cli::workflow::ReviewSelection::from_flags(papers, all, none);
            cli::workflow::handle_review(&state, &workflow_id, selection, note, out).await
        }
        Commands::Assess {
            workflow_id,
            scores,
            accept,
            note,
        } => cli::workflow::handle_assess(&state, &workflow_id, &scores, accept, note, out).await,
        Commands::Results { workflow_id } => {
            cli::workflow::handle_results(&state, &workflow_id, out).await
        }
        Commands::Cancel { workflow_id } => {
            cli::workflow::handle_cancel(&state, &workflow_id, out).await
        }
        Commands::List { limit } => cli::workflow::handle_list(&state, limit, out).await,
        Commands::Graph => cli::workflow::handle_graph(&state, out),
    }
}
