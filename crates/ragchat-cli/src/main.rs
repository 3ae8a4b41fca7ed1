//! ragchat CLI - chat with your documents from the terminal or over HTTP.

mod chat;
mod check;
mod client;
mod logging;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use ragchat_bot::Chatbot;
use ragchat_core::RagConfig;

/// ragchat - Retrieval-augmented chatbot over local documents with Google Gemini
#[derive(Parser)]
#[command(name = "ragchat")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.config/ragchat/config.toml, then ./ragchat.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat interactively in the terminal (default)
    Chat,

    /// Run the REST API server and web interface
    Serve {
        /// Bind host
        #[arg(long)]
        host: Option<String>,

        /// Bind port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Load documents and build the vector index
    Index {
        /// Rebuild even if an index already exists
        #[arg(short, long)]
        force: bool,
    },

    /// Talk to a running API server
    Client {
        /// Server base URL
        #[arg(long, default_value = "http://localhost:8000")]
        url: String,

        /// Run a fixed demo sequence instead of the interactive client
        #[arg(long)]
        demo: bool,
    },

    /// Check the installation
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Chat);

    if let Commands::Check = command {
        return check::run(cli.config.as_deref());
    }

    let mut config = RagConfig::from_env(cli.config.as_deref())?;

    let _guard = logging::init(
        &config.logging,
        logs_to_console(&command, cli.verbose),
        cli.verbose,
    )?;

    match command {
        Commands::Chat => chat::run(config).await,
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            serve(config).await
        }
        Commands::Index { force } => index(config, force).await,
        Commands::Client { url, demo } => client::run(&url, demo).await,
        Commands::Check => Ok(()),
    }
}

async fn serve(config: RagConfig) -> Result<()> {
    create_dirs(&config)?;

    println!("Starting ragchat API server...");
    println!("  Web interface: http://{}:{}/", config.server.host, config.server.port);
    println!("  Health check:  http://{}:{}/api/health", config.server.host, config.server.port);
    println!("Press Ctrl+C to stop the server");

    ragchat_api::serve(config).await?;
    Ok(())
}

async fn index(config: RagConfig, force: bool) -> Result<()> {
    let bot = Chatbot::from_config(config)?;

    let documents = bot.load_documents(bot.documents_dir()).await?;
    if documents.is_empty() {
        println!(
            "No documents found in {}. Add PDF, TXT, or MD files and try again.",
            bot.documents_dir().display()
        );
        return Ok(());
    }

    let stats = bot.create_vector_store(&documents, force).await?;
    info!("Index ready: {:?}", stats);

    println!("Index ready");
    println!("  Documents:  {}", stats.documents);
    println!("  Chunks:     {}", stats.chunks);
    println!("  Embeddings: {}", stats.embeddings);
    if let Some(model) = &stats.embedding_model {
        println!("  Model:      {}", model);
    }
    println!("  Size:       {} bytes", stats.storage_bytes);

    Ok(())
}

/// Only the server and `--verbose` runs mirror logs to stderr.
fn logs_to_console(command: &Commands, verbose: bool) -> bool {
    verbose || matches!(command, Commands::Serve { .. })
}

/// Create the directories the server writes to.
fn create_dirs(config: &RagConfig) -> Result<()> {
    let dirs: [&Path; 3] = [
        config.logging.dir.as_path(),
        config.storage.documents_dir.as_path(),
        config.storage.vector_store_path.as_path(),
    ];

    for dir in dirs {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_command_is_chat() {
        let cli = Cli::parse_from(["ragchat"]);
        assert!(cli.command.is_none());

        let cli = Cli::parse_from(["ragchat", "serve", "--port", "9000", "-v"]);
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Some(Commands::Serve { port: Some(9000), host: None })
        ));
    }

    #[test]
    fn test_console_logging_only_for_serve_or_verbose() {
        let serve = Commands::Serve { host: None, port: None };
        let index = Commands::Index { force: false };

        assert!(logs_to_console(&serve, false));
        assert!(!logs_to_console(&index, false));
        assert!(!logs_to_console(&Commands::Chat, false));
        assert!(logs_to_console(&index, true));
    }

    #[test]
    fn test_create_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = RagConfig::default();
        config.logging.dir = dir.path().join("logs");
        config.storage.documents_dir = dir.path().join("documents");
        config.storage.vector_store_path = dir.path().join("vector_store");

        create_dirs(&config).unwrap();

        assert!(config.logging.dir.is_dir());
        assert!(config.storage.documents_dir.is_dir());
        assert!(config.storage.vector_store_path.is_dir());
    }
}
