use clap::{Parser, Subcommand};
use std::path::PathBuf;

use chat_kb::Result;
use chat_kb::commands::{delete_document, ingest_file, list_documents, search, show_config};
use chat_kb::config::Config;
use chat_kb::retrieval::DEFAULT_SEARCH_LIMIT;

#[derive(Parser)]
#[command(name = "chat-kb")]
#[command(about = "Document knowledge base with semantic search for a chat backend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a plain-text document into the knowledge base
    Ingest {
        /// Path to the document to ingest
        file: PathBuf,
        /// Name to store the document under (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
    },
    /// Search the knowledge base for chunks similar to a query
    Search {
        /// The query text
        query: String,
        /// Maximum number of results to return
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    /// List all ingested documents
    List,
    /// Delete a document by id
    Delete {
        /// Document id to delete
        id: u64,
    },
    /// Show the active configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Ingest { file, name } => {
            ingest_file(&config, &file, name).await?;
        }
        Commands::Search { query, limit } => {
            search(&config, &query, limit).await?;
        }
        Commands::List => {
            list_documents(&config).await?;
        }
        Commands::Delete { id } => {
            delete_document(&config, id).await?;
        }
        Commands::Config => {
            show_config(&config)?;
        }
    }

    Ok(())
}
