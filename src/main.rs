//! # blog-rag CLI
//!
//! ## Usage
//!
//! ```bash
//! blog-rag --config ./config/blog-rag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `blog-rag sync` | Clone or refresh the blog repository |
//! | `blog-rag index [--rebuild]` | Build or load the index and print its statistics |
//! | `blog-rag ask [QUESTION] [WHOLE_DOCUMENTS]` | Answer a question from the blog |
//! | `blog-rag probe` | Check the token and print the remaining rate limit |
//! | `blog-rag ask-search [QUESTION]` | Answer through the search-grounded deployment |
//! | `blog-rag upload` | Upload the posts to Azure Blob Storage |
//! | `blog-rag post-url <FILE>` | Print the public URL of a post |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use blog_rag::config::{self, ModelAccess};
use blog_rag::{logging, pipeline};

/// Ask questions about a blog, answered by a chat model with the blog's own
/// posts as context.
///
/// Model access needs `GITHUB_TOKEN`. All other settings have defaults and
/// can be overridden in the TOML file given with `--config`.
#[derive(Parser)]
#[command(name = "blog-rag", version)]
struct Cli {
    /// Path to configuration file (TOML). A missing file means defaults.
    #[arg(long, global = true, default_value = "./config/blog-rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone the blog repository, or pull it when older than the refresh
    /// threshold.
    Sync,

    /// Sync, then build the index (or load the persisted one).
    Index {
        /// Discard the persisted index and build a new one.
        #[arg(long)]
        rebuild: bool,
    },

    /// Answer a question using retrieved blog content as context.
    ///
    /// Any second positional value switches from fragment context to the full
    /// text of the matching posts.
    Ask {
        /// The question. Defaults to a question about GitHub Actions security.
        question: Option<String>,

        /// Use whole documents instead of fragments as context.
        whole_documents: Option<String>,

        /// Answer with both context modes.
        #[arg(long)]
        compare: bool,
    },

    /// Check the token and print the remaining rate limit.
    Probe,

    /// Answer through the Azure OpenAI deployment grounded on Azure AI Search.
    AskSearch {
        question: Option<String>,
    },

    /// Upload every post to the configured blob container.
    Upload,

    /// Print the public URL of a post file.
    PostUrl {
        file: PathBuf,

        /// Blog root, e.g. `https://devopsjournal.io/blog`. Falls back to
        /// `blog.base_url` from the config.
        #[arg(long)]
        base_url: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Sync => {
            pipeline::run_sync(&cfg)?;
        }
        Commands::Index { rebuild } => {
            let access = ModelAccess::from_env(&cfg.model)?;
            pipeline::run_index(&cfg, &access, rebuild).await?;
        }
        Commands::Ask {
            question,
            whole_documents,
            compare,
        } => {
            let access = ModelAccess::from_env(&cfg.model)?;
            let options = pipeline::AskOptions::from_args(question, whole_documents, compare);
            pipeline::run_ask(&cfg, &access, &options).await?;
        }
        Commands::Probe => {
            let access = ModelAccess::from_env(&cfg.model)?;
            pipeline::run_probe(&cfg, &access).await?;
        }
        Commands::AskSearch { question } => {
            pipeline::run_search_chat(&cfg, question).await?;
        }
        Commands::Upload => {
            pipeline::run_upload(&cfg).await?;
        }
        Commands::PostUrl { file, base_url } => {
            pipeline::run_post_url(&cfg, &file, base_url)?;
        }
    }

    Ok(())
}
