use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use logseal::config::ServiceArgs;
use logseal::error::Result;
use logseal::server::{self, AppState};
use logseal::service::Service;

#[derive(Parser)]
#[command(name = "logseal")]
#[command(about = "Seal log uploads to a recipient key and ship them to object storage")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate configuration and serve uploads
    Serve(ServiceArgs),
    /// Validate configuration (keyring, recipient, bucket) and exit
    Check(ServiceArgs),
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve(args) => {
            let config = args.into_config()?;
            let service = Service::start(&config).await?;
            let state = AppState {
                pipeline: service.pipeline,
                max_body_bytes: config.server.max_body_bytes,
            };
            server::serve(state, config.server.listen).await
        }
        Commands::Check(args) => {
            let config = args.into_config()?;
            let service = Service::start(&config).await?;
            println!(
                "recipient: {} ({})",
                service.recipient.id,
                service.recipient.fingerprint()
            );
            println!("location:  {}", service.pipeline.publisher().location());
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(stage = ?e.stage(), "{e}");
            ExitCode::FAILURE
        }
    }
}
