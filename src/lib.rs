//! # blog-rag
//!
//! Retrieval-augmented question answering over a blog repository.
//!
//! The tool keeps a local clone of the blog's git repository, builds a
//! persisted vector index over its posts, retrieves the fragments closest to a
//! question, and asks a hosted chat model to answer with those fragments (or
//! the full posts they came from) as context. Embeddings and chat go through
//! an OpenAI-compatible HTTP API authenticated with `GITHUB_TOKEN`.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ repo_sync  │──▶│   loader    │──▶│    index     │
//! │ git clone  │   │ chunk+embed │   │ JSON stores  │
//! └────────────┘   └─────────────┘   └──────┬───────┘
//!                                           │
//!          ┌────────────┐   ┌─────────┐   ┌─▼─────────┐
//!          │   answer   │◀──│ context │◀──│ retriever │
//!          │ (llm chat) │   │ resolve │   │  top-K    │
//!          └────────────┘   └─────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GITHUB_TOKEN=...
//! blog-rag index                        # clone the blog and build the index
//! blog-rag ask "How do I pin actions?"  # answer from the two best fragments
//! blog-rag ask "How do I pin actions?" true --compare
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML settings and environment secrets |
//! | [`error`] | Typed error variants |
//! | [`models`] | Core data types |
//! | [`repo_sync`] | Clone or refresh the blog repository |
//! | [`loader`] | Read post files into documents |
//! | [`blog`] | Front matter and post URLs |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding client abstraction |
//! | [`index`] | Persisted index, build or load |
//! | [`retriever`] | Top-K similarity search |
//! | [`context`] | Document resolution and prompt context |
//! | [`llm`] | Chat client abstraction |
//! | [`answer`] | Prompt construction and answer output |
//! | [`usage`] | Rate-limit probe |
//! | [`search_chat`] | Search-grounded hosted chat |
//! | [`blob_upload`] | Azure Blob Storage upload |
//! | [`stats`] | Directory sizes and timings |
//! | [`pipeline`] | Command pipelines |

pub mod answer;
pub mod blob_upload;
pub mod blog;
pub mod chunk;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod index;
pub mod llm;
pub mod loader;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod repo_sync;
pub mod retriever;
pub mod search_chat;
pub mod stats;
pub mod usage;
