//! TFaaS server - model serving behind grid certificate authorization

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::error;

use tfaas_server::{Verbosity, cli::Cli, config::Config, gateway::TfaasServer, setup_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    let verbosity = match setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        Ok(verbosity) => Arc::new(verbosity),
        Err(e) => {
            eprintln!("Failed to setup tracing: {e}");
            return ExitCode::FAILURE;
        }
    };

    run_server(cli, verbosity).await
}

/// Run the server
async fn run_server(cli: Cli, verbosity: Arc<Verbosity>) -> ExitCode {
    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    cli.apply(&mut config);

    let server = match TfaasServer::new(config, verbosity).await {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to create server: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
