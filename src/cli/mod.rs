pub mod commands;
pub mod config;
pub mod utils;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::client::{ApiClient, AuthState};
use crate::session::FileSessionStore;

#[derive(Parser)]
#[command(name = "juris")]
#[command(about = "Juris CLI - Command-line client for the Jurisconsultor practice backend")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Authentication and session management")]
    Auth {
        #[command(subcommand)]
        cmd: commands::auth::AuthCommands,
    },

    #[command(about = "Projects (asuntos) and their members")]
    Project {
        #[command(subcommand)]
        cmd: commands::project::ProjectCommands,
    },

    #[command(about = "Tasks within a project")]
    Task {
        #[command(subcommand)]
        cmd: commands::task::TaskCommands,
    },

    #[command(about = "Indexed legal documents")]
    Document {
        #[command(subcommand)]
        cmd: commands::document::DocumentCommands,
    },

    #[command(about = "Scraping sources for the document index")]
    Source {
        #[command(subcommand)]
        cmd: commands::source::SourceCommands,
    },

    #[command(about = "Company administration")]
    Admin {
        #[command(subcommand)]
        cmd: commands::admin::AdminCommands,
    },

    #[command(about = "Platform administration across companies")]
    Superadmin {
        #[command(subcommand)]
        cmd: commands::superadmin::SuperadminCommands,
    },

    #[command(about = "Ask the legal agent a question")]
    Ask(commands::ask::AskArgs),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Client bound to the configured backend and the on-disk session
pub fn build_client() -> anyhow::Result<ApiClient> {
    let store = FileSessionStore::new(config::session_file()?);
    let client = ApiClient::new(crate::config::config(), Arc::new(store))?;
    Ok(client)
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let client = build_client()?;
    let mut auth = client.subscribe();

    let result = match cli.command {
        Commands::Auth { cmd } => commands::auth::handle(cmd, &client, output_format).await,
        Commands::Project { cmd } => commands::project::handle(cmd, &client, output_format).await,
        Commands::Task { cmd } => commands::task::handle(cmd, &client, output_format).await,
        Commands::Document { cmd } => commands::document::handle(cmd, &client, output_format).await,
        Commands::Source { cmd } => commands::source::handle(cmd, &client, output_format).await,
        Commands::Admin { cmd } => commands::admin::handle(cmd, &client, output_format).await,
        Commands::Superadmin { cmd } => commands::superadmin::handle(cmd, &client, output_format).await,
        Commands::Ask(args) => commands::ask::handle(args, &client, output_format).await,
    };

    if auth.has_changed().unwrap_or(false) && *auth.borrow_and_update() == AuthState::Expired {
        tracing::warn!("Session expired; stored credentials were removed");
    }

    result
}
