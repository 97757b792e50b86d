//! Noteloom CLI: the main entry point.
//!
//! Commands:
//! - `chat`:     Interactive or single-message conversation over the vault
//! - `compose`:  Print the system prompt a turn would be sent with
//! - `prompts`:  List, migrate or watch saved system prompts
//! - `config`:   Show, locate or validate the configuration

use clap::{Args, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "noteloom",
    about = "Noteloom — an assistant that lives in your note vault",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// How a conversation is set up.
#[derive(Args, Debug, Clone, Default)]
pub struct ConversationArgs {
    /// Offer vault tools to the model
    #[arg(long, conflicts_with = "project")]
    pub agent: bool,

    /// Use a project profile from the config
    #[arg(long)]
    pub project: Option<String>,

    /// The note currently open, relative to the vault root
    #[arg(long)]
    pub active: Option<String>,

    /// Custom instructions to use instead of the default prompt
    #[arg(long)]
    pub prompt: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Attach a note to the first message (repeatable)
        #[arg(long = "note")]
        notes: Vec<String>,

        /// Attach a URL to the first message (repeatable)
        #[arg(long = "url")]
        urls: Vec<String>,

        #[command(flatten)]
        conversation: ConversationArgs,
    },

    /// Print the composed system prompt
    Compose {
        #[command(flatten)]
        conversation: ConversationArgs,
    },

    /// Manage saved system prompts
    Prompts {
        #[command(subcommand)]
        action: PromptsAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum PromptsAction {
    /// List saved prompts, most recently used first
    List,
    /// Move the legacy prompt setting into a saved prompt
    Migrate,
    /// Keep the prompt cache in sync with the vault until Ctrl+C
    Watch,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the configuration file path
    Path,
    /// Check the configuration for problems
    Validate,
    /// Write a default configuration file if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Chat {
            message,
            notes,
            urls,
            conversation,
        } => commands::chat::run(message, notes, urls, conversation).await?,
        Commands::Compose { conversation } => commands::compose::run(conversation).await?,
        Commands::Prompts { action } => match action {
            PromptsAction::List => commands::prompts::list().await?,
            PromptsAction::Migrate => commands::prompts::migrate().await?,
            PromptsAction::Watch => commands::prompts::watch().await?,
        },
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Init => commands::config_cmd::init().await?,
        },
    }

    Ok(())
}
