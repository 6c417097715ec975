use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

use crate::chunking::ConversationTurn;
use crate::config::Config;
use crate::database::models::{SourceFilter, SourceType};
use crate::service::RecallService;

/// Directory holding config.toml and the store, unless overridden.
#[inline]
pub fn get_config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .context("Failed to determine user config directory")?
        .join("chat-recall");
    Ok(dir)
}

async fn open_service(config_dir: Option<PathBuf>) -> Result<RecallService> {
    let config_dir = match config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };
    let config = Config::load(&config_dir)?;
    RecallService::new(config).await
}

/// Print the effective configuration as TOML.
#[inline]
pub fn show_config(config_dir: Option<PathBuf>) -> Result<()> {
    let config_dir = match config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };
    let config = Config::load(&config_dir)?;

    let rendered = toml::to_string_pretty(&config).context("Failed to render configuration")?;
    println!("# {}", config_dir.join("config.toml").display());
    print!("{rendered}");
    Ok(())
}

/// Write the default configuration file if none exists yet.
#[inline]
pub fn init_config(config_dir: Option<PathBuf>) -> Result<()> {
    let config_dir = match config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };
    let config_path = config_dir.join("config.toml");

    if config_path.exists() {
        println!("Configuration already exists: {}", config_path.display());
        return Ok(());
    }

    let config = Config {
        base_dir: config_dir,
        ..Config::default()
    };
    config.save()?;

    println!("Wrote default configuration: {}", config_path.display());
    println!("Set RECALL_API_KEY (or [provider].api_key) before indexing.");
    Ok(())
}

/// Index a conversation export: a JSON array of turns.
#[inline]
pub async fn index_file(
    path: &Path,
    conversation_id: Option<String>,
    config_dir: Option<PathBuf>,
) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read conversation file: {}", path.display()))?;
    let turns: Vec<ConversationTurn> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse conversation file: {}", path.display()))?;

    let conversation_id = conversation_id.unwrap_or_else(|| {
        path.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "conversation".to_string())
    });

    info!(
        "Indexing {} turns as conversation '{}'",
        turns.len(),
        conversation_id
    );

    let service = open_service(config_dir).await?;
    let outcome = service.index_conversation(&conversation_id, &turns).await?;

    println!("Indexed conversation '{conversation_id}'");
    println!("  Chunks stored: {}", outcome.indexed);
    println!("  Chunks skipped: {}", outcome.skipped);
    Ok(())
}

/// Run a hybrid search and print the ranked results.
#[inline]
pub async fn search(
    query: &str,
    limit: usize,
    source_type: Option<String>,
    config_dir: Option<PathBuf>,
) -> Result<()> {
    let filter = parse_source_type(source_type)?.map(SourceFilter::by_type);

    let service = open_service(config_dir).await?;
    let results = service
        .search_messages(query, limit, filter.as_ref())
        .await?;

    if results.is_empty() {
        println!("No results for '{query}'.");
        return Ok(());
    }

    println!("Results for '{query}' ({} total):", results.len());
    println!();

    for (position, result) in results.iter().enumerate() {
        let percent = (result.relevance * 100.0).round() as i32;
        println!(
            "{}. [{}%] {} '{}' (chunk {})",
            position + 1,
            percent,
            result.document.source_type,
            result.document.source_id,
            result.document.chunk_index
        );
        println!("   {}", preview(&result.document.chunk_text, 160));
    }
    Ok(())
}

/// Assemble and print context for a query.
#[inline]
pub async fn build_context(
    query: &str,
    top_k: Option<usize>,
    conversation: Option<String>,
    language: Option<String>,
    code: bool,
    config_dir: Option<PathBuf>,
) -> Result<()> {
    let service = open_service(config_dir).await?;

    let context = if let Some(conversation_id) = conversation {
        service
            .build_conversation_context(&conversation_id, query)
            .await?
    } else if code || language.is_some() {
        service
            .build_code_context(query, language.as_deref())
            .await?
    } else {
        service.build_context_for_query(query, None, top_k).await?
    };

    if context.is_empty() {
        println!("No relevant context found for '{query}'.");
    } else {
        println!("{context}");
    }
    Ok(())
}

/// Print store totals and session counters.
#[inline]
pub async fn show_stats(config_dir: Option<PathBuf>) -> Result<()> {
    let service = open_service(config_dir).await?;
    let stats = service.get_statistics().await?;

    println!("Store:");
    println!("  Documents: {}", stats.store.documents);
    println!("  Embeddings: {}", stats.store.embeddings);

    if !stats.store.by_source_type.is_empty() {
        println!("  By source type:");
        let mut entries: Vec<_> = stats.store.by_source_type.iter().collect();
        entries.sort();
        for (source_type, count) in entries {
            println!("    {source_type}: {count}");
        }
    }
    Ok(())
}

/// Delete everything indexed from one conversation.
#[inline]
pub async fn delete_conversation(conversation_id: &str, config_dir: Option<PathBuf>) -> Result<()> {
    let service = open_service(config_dir).await?;
    let removed = service.delete_conversation_data(conversation_id).await?;
    println!("Removed {removed} chunks from conversation '{conversation_id}'.");
    Ok(())
}

/// Wipe the store.
#[inline]
pub async fn clear_store(config_dir: Option<PathBuf>) -> Result<()> {
    let service = open_service(config_dir).await?;
    let removed = service.clear_all_data().await?;
    println!("Removed {removed} documents from the store.");
    Ok(())
}

fn parse_source_type(raw: Option<String>) -> Result<Option<SourceType>> {
    raw.map(|value| SourceType::from_str(&value).map_err(|e| anyhow::anyhow!(e)))
        .transpose()
}

fn preview(text: &str, max_chars: usize) -> String {
    let flattened = text.replace('\n', " ");
    if flattened.chars().count() <= max_chars {
        return flattened;
    }
    let mut cut: String = flattened.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}
