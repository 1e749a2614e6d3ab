#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;
mod client;
mod serve;

use std::sync::Arc;

use args::{Args, Command, ServeArgs};
use butler_config::Config;
use butler_responder::ScriptedCapability;
use clap::Parser;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::load_or_default(&args.config)?;

    // Initialize telemetry
    let _telemetry_guard = butler_telemetry::init(config.telemetry.as_ref(), &args.log)?;

    tracing::debug!(config_path = %args.config.display(), "starting butler-bridge");

    match &args.command {
        Command::Serve(serve) => run_server(config, serve).await,
        Command::Test(client) => client::test(&config, client).await,
        Command::Generate(generate) => client::generate(&config, generate).await,
        Command::Chat(chat) => client::chat(&config, chat).await,
    }
}

async fn run_server(config: Config, args: &ServeArgs) -> anyhow::Result<()> {
    let mut capability = ScriptedCapability::new();
    if let Some(reply) = &args.reply {
        capability = capability.with_reply(reply.as_str());
    }
    if let Some(delay) = args.chunk_delay {
        capability = capability.with_chunk_delay(delay);
    }

    // Set up graceful shutdown
    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    let listen = args.listen.unwrap_or_else(|| config.transport.listen_address());
    serve::serve(listen, config.responder, Arc::new(capability), shutdown).await?;

    tracing::info!("butler-bridge stopped");
    Ok(())
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
