use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

/// Zotero AI Butler browser AI bridge
#[derive(Debug, Parser)]
#[command(
    name = "butler-bridge",
    about = "Relay Zotero AI Butler requests to an in-browser AI capability"
)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "butler-bridge.toml", env = "BUTLER_BRIDGE_CONFIG", global = true)]
    pub config: PathBuf,

    /// Log filter directive
    #[arg(long, default_value = "info", env = "BUTLER_BRIDGE_LOG", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a responder backed by the scripted capability
    Serve(ServeArgs),
    /// Check that a serving responder is reachable and ready
    Test(ClientArgs),
    /// Summarize a paper
    Generate(GenerateArgs),
    /// Ask a question about a paper
    Chat(ChatArgs),
}

#[derive(Debug, clap::Args)]
pub struct ServeArgs {
    /// Override the listen address
    #[arg(long, env = "BUTLER_BRIDGE_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Answer every prompt with this text instead of echoing it
    #[arg(long)]
    pub reply: Option<String>,

    /// Delay between streamed snapshots
    #[arg(long, value_parser = butler_config::duration::parse)]
    pub chunk_delay: Option<Duration>,
}

#[derive(Debug, clap::Args)]
pub struct ClientArgs {
    /// Override the responder address
    #[arg(long, env = "BUTLER_BRIDGE_CONNECT")]
    pub connect: Option<SocketAddr>,

    /// Override the request timeout for this call
    #[arg(long, value_parser = butler_config::duration::parse)]
    pub timeout: Option<Duration>,
}

#[derive(Debug, clap::Args)]
pub struct GenerateArgs {
    #[command(flatten)]
    pub client: ClientArgs,

    /// Paper text
    #[arg(long)]
    pub content: String,

    /// Instruction sent with the paper
    #[arg(long)]
    pub prompt: Option<String>,

    /// Treat the content as base64-encoded PDF
    #[arg(long)]
    pub base64: bool,

    /// Print progress as it is generated
    #[arg(long)]
    pub stream: bool,
}

#[derive(Debug, clap::Args)]
pub struct ChatArgs {
    #[command(flatten)]
    pub client: ClientArgs,

    /// Message to send; repeat to replay earlier turns, alternating user and assistant
    #[arg(long, required = true)]
    pub message: Vec<String>,

    /// Paper text for context
    #[arg(long)]
    pub pdf: Option<String>,

    /// Print progress as it is generated
    #[arg(long)]
    pub stream: bool,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_generate() {
        let args = Args::parse_from([
            "butler-bridge",
            "generate",
            "--content",
            "Paper text",
            "--stream",
            "--timeout",
            "30s",
        ]);

        let Command::Generate(generate) = args.command else {
            panic!("expected generate");
        };
        assert_eq!(generate.content, "Paper text");
        assert!(generate.stream);
        assert_eq!(generate.client.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn chat_requires_a_message() {
        assert!(Args::try_parse_from(["butler-bridge", "chat"]).is_err());
    }
}
