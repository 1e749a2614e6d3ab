//! One-shot requester calls against a serving responder

use std::io::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use butler_config::Config;
use butler_core::{BridgeError, ConversationMessage, LocalBus, transport};
use butler_requester::{ProgressFn, RequestOptions, Requester};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::args::{ChatArgs, ClientArgs, GenerateArgs};

struct Connection {
    requester: Requester,
    shutdown: CancellationToken,
    pipe: JoinHandle<butler_core::Result<()>>,
}

impl Connection {
    async fn open(config: &Config, address: SocketAddr) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(address)
            .await
            .with_context(|| format!("failed to connect to bridge at {address}"))?;
        tracing::debug!(%address, "connected to bridge");

        let bus = LocalBus::new();
        let shutdown = CancellationToken::new();
        let pipe = {
            let bus = bus.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                let piped = transport::pipe(&bus, stream, shutdown).await;
                // Waiting calls fail fast instead of sitting out their timeout
                bus.detach();
                piped
            })
        };
        while bus.listener_count() == 0 && !pipe.is_finished() {
            tokio::task::yield_now().await;
        }

        Ok(Self {
            requester: Requester::from_config(Arc::new(bus), &config.requester),
            shutdown,
            pipe,
        })
    }

    async fn close(self) {
        self.shutdown.cancel();
        if let Ok(Err(e)) = self.pipe.await {
            tracing::debug!(error = %e, "bridge transport closed with an error");
        }
    }
}

/// Prints cumulative snapshots as a growing line of text
#[derive(Default)]
struct ProgressPrinter {
    printed: String,
}

impl ProgressPrinter {
    fn show(&mut self, snapshot: &str) {
        let mut stdout = std::io::stdout().lock();
        let written = match snapshot.strip_prefix(self.printed.as_str()) {
            Some(suffix) => write!(stdout, "{suffix}"),
            None => write!(stdout, "\n{snapshot}"),
        };
        if written.and_then(|()| stdout.flush()).is_ok() {
            snapshot.clone_into(&mut self.printed);
        }
    }

    /// Finish the streamed line; false when nothing was streamed
    fn finish(&self) -> bool {
        if self.printed.is_empty() {
            return false;
        }
        println!();
        true
    }
}

fn options(client: &ClientArgs) -> RequestOptions {
    RequestOptions {
        request_timeout: client.timeout,
        ..RequestOptions::default()
    }
}

fn address(config: &Config, client: &ClientArgs) -> SocketAddr {
    client.connect.unwrap_or_else(|| config.transport.connect_address())
}

pub async fn test(config: &Config, client: &ClientArgs) -> anyhow::Result<()> {
    let connection = Connection::open(config, address(config, client)).await?;
    let outcome = connection.requester.test_connection(&options(client)).await;
    connection.close().await;

    println!("{}", outcome?);
    Ok(())
}

pub async fn generate(config: &Config, args: &GenerateArgs) -> anyhow::Result<()> {
    let connection = Connection::open(config, address(config, &args.client)).await?;

    let mut printer = ProgressPrinter::default();
    let mut show = |snapshot: &str| printer.show(snapshot);
    let on_progress: Option<ProgressFn<'_>> = if args.stream { Some(&mut show) } else { None };
    let outcome = connection
        .requester
        .generate(
            &args.content,
            args.base64,
            args.prompt.as_deref(),
            &options(&args.client),
            on_progress,
        )
        .await;
    connection.close().await;

    report(outcome, &printer)
}

pub async fn chat(config: &Config, args: &ChatArgs) -> anyhow::Result<()> {
    let conversation = conversation(&args.message);
    let connection = Connection::open(config, address(config, &args.client)).await?;

    let mut printer = ProgressPrinter::default();
    let mut show = |snapshot: &str| printer.show(snapshot);
    let on_progress: Option<ProgressFn<'_>> = if args.stream { Some(&mut show) } else { None };
    let outcome = connection
        .requester
        .chat(
            args.pdf.as_deref().unwrap_or_default(),
            false,
            &conversation,
            &options(&args.client),
            on_progress,
        )
        .await;
    connection.close().await;

    report(outcome, &printer)
}

/// Turns alternate between user and assistant, ending on the user's turn
fn conversation(messages: &[String]) -> Vec<ConversationMessage> {
    let offset = (messages.len() + 1) % 2;
    messages
        .iter()
        .enumerate()
        .map(|(i, content)| {
            if (i + offset) % 2 == 0 {
                ConversationMessage::user(content.as_str())
            } else {
                ConversationMessage::assistant(content.as_str())
            }
        })
        .collect()
}

fn report(outcome: Result<String, BridgeError>, printer: &ProgressPrinter) -> anyhow::Result<()> {
    let streamed = printer.finish();
    let result = outcome?;
    if !streamed {
        println!("{result}");
    }
    Ok(())
}
