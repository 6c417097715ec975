use chat_recall::Result;
use chat_recall::commands::{
    build_context, clear_store, delete_conversation, index_file, init_config, search, show_config,
    show_stats,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chat-recall")]
#[command(about = "Conversation memory: index chat history and retrieve relevant context")]
#[command(version)]
struct Cli {
    /// Override the config/store directory
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Index a conversation export (a JSON array of turns)
    Index {
        /// Path to the conversation file
        file: PathBuf,
        /// Conversation id (defaults to the file name)
        #[arg(long)]
        id: Option<String>,
    },
    /// Search indexed history
    Search {
        /// Search query
        query: String,
        /// Maximum number of results
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Restrict to one source type (message, conversation, code, documentation)
        #[arg(long)]
        source_type: Option<String>,
    },
    /// Assemble token-budgeted context for a query
    Context {
        /// Query to build context for
        query: String,
        /// Number of chunks to consider
        #[arg(long)]
        top_k: Option<usize>,
        /// Restrict to one conversation
        #[arg(long)]
        conversation: Option<String>,
        /// Keep only code-like chunks
        #[arg(long)]
        code: bool,
        /// Language hint for code context (implies --code)
        #[arg(long)]
        language: Option<String>,
    },
    /// Show store statistics
    Stats,
    /// Delete everything indexed from one conversation
    Delete {
        /// Conversation id to delete
        conversation_id: String,
    },
    /// Delete all indexed data
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config_dir = cli.config_dir;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(config_dir)?;
            } else {
                init_config(config_dir)?;
            }
        }
        Commands::Index { file, id } => {
            index_file(&file, id, config_dir).await?;
        }
        Commands::Search {
            query,
            limit,
            source_type,
        } => {
            search(&query, limit, source_type, config_dir).await?;
        }
        Commands::Context {
            query,
            top_k,
            conversation,
            code,
            language,
        } => {
            build_context(&query, top_k, conversation, language, code, config_dir).await?;
        }
        Commands::Stats => {
            show_stats(config_dir).await?;
        }
        Commands::Delete { conversation_id } => {
            delete_conversation(&conversation_id, config_dir).await?;
        }
        Commands::Clear => {
            clear_store(config_dir).await?;
        }
    }

    Ok(())
}
