//! onenode — terminal client for the OneNode agent service.
//!
//! # Usage
//!
//! ```text
//! onenode --token $TOKEN query --json '{"question": "what changed?"}'
//! onenode config
//! onenode clean answer.md
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use onenode_core::ClientConfig;
use onenode_stream::StreamClient;

mod commands;

#[derive(Parser)]
#[command(
    name = "onenode",
    about = "OneNode — streamed agent queries from the terminal",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Config file (default: ./onenode.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bearer token, overriding the config file
    #[arg(long, global = true)]
    token: Option<String>,

    /// Agent service base URL, overriding the config file
    #[arg(long, global = true)]
    agent_url: Option<String>,

    /// Backend service base URL, overriding the config file
    #[arg(long, global = true)]
    backend_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream a multi-agent query. Ctrl-C cancels.
    Query {
        /// Query payload as JSON
        #[arg(short, long)]
        json: String,
        /// Print stream lines as received instead of rendering events
        #[arg(long)]
        raw: bool,
    },
    /// Show the backend configuration
    Config,
    /// Generate a conversation title
    Title {
        /// Title request payload as JSON
        #[arg(short, long)]
        json: String,
    },
    /// Clean message content read from a file or stdin
    Clean {
        /// Input file (default: stdin)
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries command output; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,onenode=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    dispatch(Cli::parse()).await
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Query { json, raw } => {
            let (client, token) = connect(&cli)?;
            commands::query::query(&client, token.as_deref(), json, *raw).await
        }
        Commands::Config => {
            let (client, _) = connect(&cli)?;
            commands::api::backend_config(&client).await
        }
        Commands::Title { json } => {
            let (client, token) = connect(&cli)?;
            commands::api::generate_title(&client, token.as_deref(), json).await
        }
        Commands::Clean { file } => commands::clean::clean(file.as_deref()),
    }
}

/// Client and bearer token for the subcommands that talk to a service.
fn connect(cli: &Cli) -> anyhow::Result<(StreamClient, Option<String>)> {
    let config = resolve_config(cli)?;
    let token = config.token().map(str::to_string);
    Ok((StreamClient::new(config)?, token))
}

fn resolve_config(cli: &Cli) -> anyhow::Result<ClientConfig> {
    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(token) = &cli.token {
        config.token = Some(token.clone());
    }
    if let Some(url) = &cli.agent_url {
        config.agent_base_url = url.clone();
    }
    if let Some(url) = &cli.backend_url {
        config.backend_base_url = url.clone();
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;

    use super::*;

    #[test]
    fn title_takes_a_json_payload() {
        let cli = Cli::try_parse_from(["onenode", "title", "--json", r#"{"prompt": "hi"}"#]).unwrap();
        assert!(matches!(cli.command, Commands::Title { ref json } if json == r#"{"prompt": "hi"}"#));
        assert!(Cli::try_parse_from(["onenode", "title"]).is_err());
    }

    #[test]
    fn cli_overrides_config_values() {
        let cli = Cli::try_parse_from([
            "onenode",
            "--token",
            "t0k3n",
            "--agent-url",
            "http://agents.local/api",
            "config",
        ])
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("onenode.toml");
        std::fs::write(&path, "token = \"from-file\"\n").unwrap();
        let cli = Cli { config: Some(path), ..cli };

        let config = resolve_config(&cli).unwrap();
        assert_eq!(config.token(), Some("t0k3n"));
        assert_eq!(config.agent_base_url, "http://agents.local/api");
    }

    #[tokio::test]
    async fn clean_does_not_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("answer.md");
        std::fs::write(&input, "plain").unwrap();
        let missing = dir.path().join("missing.toml");

        let cli = Cli::try_parse_from([
            OsStr::new("onenode"),
            OsStr::new("--config"),
            missing.as_os_str(),
            OsStr::new("clean"),
            input.as_os_str(),
        ])
        .unwrap();
        dispatch(cli).await.unwrap();
    }

    #[tokio::test]
    async fn config_subcommand_reports_missing_config() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let cli = Cli::try_parse_from([
            OsStr::new("onenode"),
            OsStr::new("--config"),
            missing.as_os_str(),
            OsStr::new("config"),
        ])
        .unwrap();
        assert!(dispatch(cli).await.is_err());
    }
}
