//! TCP front of a page-side responder
//!
//! Every connection gets its own bus and responder, linked to the peer by the
//! line-delimited JSON transport.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use butler_config::ResponderConfig;
use butler_core::{LocalBus, transport};
use butler_responder::{Capability, Responder};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

pub async fn serve(
    listen: SocketAddr,
    config: ResponderConfig,
    capability: Arc<dyn Capability>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen)
        .await
        .with_context(|| format!("failed to bind {listen}"))?;
    tracing::info!(address = %listener.local_addr()?, "serving browser AI bridge");

    let config = Arc::new(config);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(connection(
                        stream,
                        peer,
                        Arc::clone(&config),
                        Arc::clone(&capability),
                        shutdown.child_token(),
                    ));
                }
                Err(e) => tracing::warn!(error = %e, "failed to accept connection"),
            },
        }
    }

    Ok(())
}

async fn connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<ResponderConfig>,
    capability: Arc<dyn Capability>,
    shutdown: CancellationToken,
) {
    tracing::info!(%peer, "bridge peer connected");

    let bus = LocalBus::new();
    let pipe = {
        let bus = bus.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { transport::pipe(&bus, stream, shutdown).await })
    };

    // The ready announcement has to reach the peer
    while bus.listener_count() == 0 && !pipe.is_finished() {
        tokio::task::yield_now().await;
    }

    let responder = Arc::new(Responder::from_config(Arc::new(bus.clone()), capability, &config));
    let served = tokio::spawn(responder.run(shutdown.clone()));

    match pipe.await {
        Ok(Ok(())) => tracing::info!(%peer, "bridge peer disconnected"),
        Ok(Err(e)) => tracing::warn!(%peer, error = %e, "bridge transport failed"),
        Err(e) => tracing::error!(%peer, error = %e, "bridge transport task failed"),
    }

    shutdown.cancel();
    match served.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(%peer, error = %e, "responder stopped with an error"),
        Err(e) => tracing::error!(%peer, error = %e, "responder task failed"),
    }
}
