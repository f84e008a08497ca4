//! Command pipelines wired from the building blocks.
//!
//! Each `run_*` function backs one CLI subcommand. The `ask` pipeline is split
//! so the retrieval-and-answer half can run against any [`Embedder`] and
//! [`ChatModel`].

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::answer;
use crate::blob_upload::{self, BlobUploader, StorageAccount};
use crate::blog;
use crate::config::{self, Config, ModelAccess, SearchChatAccess};
use crate::context::{self, ContextMode};
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::index::{self, Index, IndexOrigin, OpenOptions};
use crate::llm::{ChatModel, OpenAIChat};
use crate::models::Answer;
use crate::repo_sync;
use crate::retriever::Retriever;
use crate::search_chat;
use crate::stats;
use crate::usage;

pub const DEFAULT_QUESTION: &str = "How can you use GitHub Actions with security in mind?";

/// What `ask` should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskOptions {
    pub question: String,
    pub mode: ContextMode,
    /// Run both context modes.
    pub compare: bool,
}

impl AskOptions {
    /// Interpret the positional arguments: an optional question and any
    /// second value selecting whole-document context. A question of exactly
    /// `True` means the default question; only a second value switches mode.
    pub fn from_args(question: Option<String>, whole_documents: Option<String>, compare: bool) -> Self {
        let whole = whole_documents.is_some();
        let question = match question {
            Some(q) if q == "True" => DEFAULT_QUESTION.to_string(),
            Some(q) if !q.trim().is_empty() => q,
            _ => DEFAULT_QUESTION.to_string(),
        };
        Self {
            question,
            mode: if whole {
                ContextMode::WholeDocuments
            } else {
                ContextMode::Fragments
            },
            compare,
        }
    }

    fn modes(&self) -> Vec<ContextMode> {
        if self.compare {
            vec![ContextMode::Fragments, ContextMode::WholeDocuments]
        } else {
            vec![self.mode]
        }
    }
}

/// `sync`: bring the local checkout up to date.
pub fn run_sync(config: &Config) -> Result<PathBuf> {
    let report = repo_sync::sync_repository(&config.repository)?;
    tracing::info!(outcome = ?report.outcome, dir = %report.content_dir.display(), "repository ready");
    Ok(report.content_dir)
}

/// Sync the repository and open (or build) the index over it.
pub async fn prepare_index(
    config: &Config,
    embedder: &dyn Embedder,
    options: OpenOptions,
) -> Result<(Index, PathBuf)> {
    let content_dir = run_sync(config)?;
    let (index, origin) = index::build_or_load(&content_dir, config, embedder, options).await?;
    if origin == IndexOrigin::Built {
        tracing::info!(index_id = %index.info().index_id, "index built");
    }
    Ok((index, content_dir))
}

/// `index`: sync, build or load, and print what the index holds.
pub async fn run_index(config: &Config, access: &ModelAccess, rebuild: bool) -> Result<()> {
    let embedder = OpenAIEmbedder::new(access, &config.embedding)?;
    let (index, _) = prepare_index(
        config,
        &embedder,
        OpenOptions {
            force_rebuild: rebuild,
        },
    )
    .await?;

    let info = index.info();
    println!("Index {}", info.index_id);
    println!("  created:    {}", info.created_at.to_rfc3339());
    println!("  model:      {} ({} dims)", info.embedding_model, index.dims());
    println!("  documents:  {}", index.document_count());
    println!("  fragments:  {}", index.fragment_count());
    Ok(())
}

/// Retrieve, resolve, and answer once per requested context mode.
pub async fn answer_from_index(
    index: &Index,
    content_dir: &Path,
    config: &Config,
    embedder: &dyn Embedder,
    chat: &dyn ChatModel,
    options: &AskOptions,
) -> Result<Vec<(ContextMode, Answer)>> {
    let start = Instant::now();
    let retriever = Retriever::new(index, embedder, &config.retrieval);
    let fragments = retriever.retrieve(&options.question).await?;
    stats::log_duration(start, "Retrieval");

    let cited = context::resolve(index, &fragments);
    context::print_cited_documents(&cited, content_dir, config.blog.base_url.as_deref());

    let mut answers = Vec::new();
    for mode in options.modes() {
        let context = context::build_context(mode, &fragments, &cited, content_dir);
        let answer = answer::answer_question(chat, &options.question, &context, mode).await?;
        answers.push((mode, answer));
    }
    Ok(answers)
}

/// `ask`: the full pipeline, bracketed by usage probes.
pub async fn run_ask(config: &Config, access: &ModelAccess, options: &AskOptions) -> Result<()> {
    let before = usage::probe(access, &config.model).await?;

    let embedder = OpenAIEmbedder::new(access, &config.embedding)?;
    let chat = OpenAIChat::new(access, &config.model)?;
    let (index, content_dir) = prepare_index(config, &embedder, OpenOptions::default()).await?;
    println!();

    answer_from_index(&index, &content_dir, config, &embedder, &chat, options).await?;

    let after = usage::probe(access, &config.model).await?;
    usage::print_usage_delta(&after.used_since(&before));
    Ok(())
}

/// `probe`: check the token and print the remaining quota.
pub async fn run_probe(config: &Config, access: &ModelAccess) -> Result<()> {
    usage::probe(access, &config.model).await?;
    Ok(())
}

/// `ask-search`: one search-grounded chat call.
pub async fn run_search_chat(config: &Config, question: Option<String>) -> Result<()> {
    let access = SearchChatAccess::from_env()?;
    let question = question
        .filter(|q| !q.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_QUESTION.to_string());

    let start = Instant::now();
    let result = search_chat::ask(&access, &config.search, &question).await?;
    search_chat::print_result(&result);
    stats::log_duration(start, "Model call");
    Ok(())
}

/// `upload`: sync, then push every post to blob storage.
pub async fn run_upload(config: &Config) -> Result<()> {
    let connection_string = config::storage_connection_string()?;
    let account = StorageAccount::from_connection_string(&connection_string)?;
    let content_dir = run_sync(config)?;

    let uploader = BlobUploader::new(account, &config.upload)?;
    blob_upload::upload_directory(&uploader, &content_dir).await?;
    Ok(())
}

/// `post-url`: public URL of a post file, using the date in its header.
pub fn post_url_for_file(file: &Path, base_url: &str) -> Result<String> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let date = blog::parse_header_date(&content)
        .with_context(|| format!("{} has no date in its header", file.display()))?;
    let file_name = file.to_string_lossy();
    blog::post_url(&file_name, &date, base_url)
}

pub fn run_post_url(config: &Config, file: &Path, base_url: Option<String>) -> Result<()> {
    let base_url = base_url
        .or_else(|| config.blog.base_url.clone())
        .context("No blog base URL: pass --base-url or set blog.base_url in the config")?;
    println!("{}", post_url_for_file(file, &base_url)?);
    Ok(())
}
