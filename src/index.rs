//! The persisted document index.
//!
//! An index is three JSON files in one directory:
//!
//! | File | Contents |
//! |------|----------|
//! | `docstore.json` | document id → [`Document`] (file name, text, header metadata) |
//! | `vector_store.json` | fragment id → embedding vector |
//! | `index_store.json` | fragment list plus build metadata (model, fingerprint, timestamp) |
//!
//! Presence of the directory decides between building and loading. The
//! directory is written next to its final location and renamed into place, so
//! it is either fully present or absent. A directory that exists but cannot be
//! read back is a [`RagError::CorruptIndex`]; there is no repair path.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

use crate::chunk;
use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::error::RagError;
use crate::loader;
use crate::models::{Document, Fragment};
use crate::stats;

pub const DOCSTORE_FILE: &str = "docstore.json";
pub const VECTOR_STORE_FILE: &str = "vector_store.json";
pub const INDEX_STORE_FILE: &str = "index_store.json";

#[derive(Serialize, Deserialize)]
struct DocStoreFile {
    documents: BTreeMap<String, Document>,
}

#[derive(Serialize, Deserialize)]
struct VectorStoreFile {
    dims: usize,
    embeddings: BTreeMap<String, Vec<f32>>,
}

#[derive(Serialize, Deserialize)]
struct IndexStoreFile {
    #[serde(flatten)]
    info: IndexInfo,
    fragments: Vec<Fragment>,
}

/// Build metadata stored alongside the fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub index_id: String,
    pub created_at: DateTime<Utc>,
    pub embedding_model: String,
    pub content_fingerprint: String,
}

/// In-memory index: documents keyed by id, fragments with their embeddings.
#[derive(Debug, Clone)]
pub struct Index {
    info: IndexInfo,
    documents: BTreeMap<String, Document>,
    fragments: Vec<Fragment>,
    embeddings: Vec<Vec<f32>>,
}

/// How [`build_or_load`] obtained the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOrigin {
    Built,
    Loaded,
}

impl Index {
    /// Assemble an index from already-embedded fragments.
    ///
    /// Fragments are not required to resolve to a document here; drift is a
    /// query-time concern. Vectors must all share one dimensionality.
    pub fn from_parts(
        info: IndexInfo,
        documents: Vec<Document>,
        embedded: Vec<(Fragment, Vec<f32>)>,
    ) -> Result<Self> {
        if let Some((_, first)) = embedded.first() {
            let dims = first.len();
            if let Some((fragment, v)) = embedded.iter().find(|(_, v)| v.len() != dims) {
                anyhow::bail!(
                    "fragment {} has {} dimensions, expected {}",
                    fragment.id,
                    v.len(),
                    dims
                );
            }
        }

        let (fragments, embeddings): (Vec<Fragment>, Vec<Vec<f32>>) =
            embedded.into_iter().unzip();
        Ok(Self {
            info,
            documents: documents.into_iter().map(|d| (d.id.clone(), d)).collect(),
            fragments,
            embeddings,
        })
    }

    pub fn info(&self) -> &IndexInfo {
        &self.info
    }

    pub fn document(&self, id: &str) -> Option<&Document> {
        self.documents.get(id)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Fragments paired with their embedding vectors.
    pub fn embedded_fragments(&self) -> impl Iterator<Item = (&Fragment, &[f32])> {
        self.fragments
            .iter()
            .zip(self.embeddings.iter().map(Vec::as_slice))
    }

    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    pub fn fragment_count(&self) -> usize {
        self.fragments.len()
    }

    pub fn dims(&self) -> usize {
        self.embeddings.first().map_or(0, Vec::len)
    }

    /// Write the three store files into `dir`, replacing any previous index.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        let staging = staging_dir(dir);
        std::fs::create_dir_all(&staging)
            .with_context(|| format!("Failed to create {}", staging.display()))?;

        let written = self.write_files(&staging).and_then(|()| {
            if dir.exists() {
                std::fs::remove_dir_all(dir)
                    .with_context(|| format!("Failed to remove old index {}", dir.display()))?;
            }
            std::fs::rename(&staging, dir).with_context(|| {
                format!("Failed to move {} to {}", staging.display(), dir.display())
            })
        });

        if written.is_err() {
            let _ = std::fs::remove_dir_all(&staging);
        }
        written
    }

    fn write_files(&self, dir: &Path) -> Result<()> {
        let docstore = DocStoreFile {
            documents: self.documents.clone(),
        };
        let vectors = VectorStoreFile {
            dims: self.dims(),
            embeddings: self
                .fragments
                .iter()
                .zip(&self.embeddings)
                .map(|(f, v)| (f.id.clone(), v.clone()))
                .collect(),
        };
        let index_store = IndexStoreFile {
            info: self.info.clone(),
            fragments: self.fragments.clone(),
        };

        write_json(&dir.join(DOCSTORE_FILE), &docstore)?;
        write_json(&dir.join(VECTOR_STORE_FILE), &vectors)?;
        write_json(&dir.join(INDEX_STORE_FILE), &index_store)?;
        Ok(())
    }

    /// Read an index back from `dir` without computing any embedding.
    pub fn load(dir: &Path) -> Result<Self> {
        let docstore: DocStoreFile = read_json(&dir.join(DOCSTORE_FILE))?;
        let vectors: VectorStoreFile = read_json(&dir.join(VECTOR_STORE_FILE))?;
        let index_store: IndexStoreFile = read_json(&dir.join(INDEX_STORE_FILE))?;

        let VectorStoreFile {
            dims,
            mut embeddings,
        } = vectors;

        let mut embedded = Vec::with_capacity(index_store.fragments.len());
        for fragment in index_store.fragments {
            let vector = embeddings.remove(&fragment.id).ok_or_else(|| {
                RagError::corrupt(
                    dir.join(VECTOR_STORE_FILE),
                    format!("no embedding for fragment {}", fragment.id),
                )
            })?;
            if vector.len() != dims {
                return Err(RagError::corrupt(
                    dir.join(VECTOR_STORE_FILE),
                    format!(
                        "fragment {} has {} dimensions, expected {}",
                        fragment.id,
                        vector.len(),
                        dims
                    ),
                )
                .into());
            }
            embedded.push((fragment, vector));
        }
        if !embeddings.is_empty() {
            tracing::warn!(
                orphaned = embeddings.len(),
                "vector store holds embeddings for unknown fragments"
            );
        }

        let index = Self::from_parts(
            index_store.info,
            docstore.documents.into_values().collect(),
            embedded,
        )?;

        let unresolved = index
            .fragments
            .iter()
            .filter(|f| !index.documents.contains_key(&f.document_id))
            .count();
        if unresolved > 0 {
            tracing::warn!(unresolved, "fragments reference documents missing from the docstore");
        }

        Ok(index)
    }
}

fn staging_dir(dir: &Path) -> PathBuf {
    let parent = dir
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "index".to_string());
    parent.join(format!(".{}.tmp-{}", name, Uuid::new_v4()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, value)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| RagError::corrupt(path, e.to_string()))?;
    let value = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| RagError::corrupt(path, e.to_string()))?;
    Ok(value)
}

/// Load, chunk, and embed every document under `content_dir`.
pub async fn build(content_dir: &Path, config: &Config, embedder: &dyn Embedder) -> Result<Index> {
    let documents = loader::load_documents(content_dir, &config.index)?;
    let fingerprint = loader::content_fingerprint(content_dir, &config.index)?;

    let fragments: Vec<Fragment> = documents
        .iter()
        .flat_map(|d| chunk::fragment_document(d, config.chunking.max_tokens))
        .collect();
    tracing::info!(
        documents = documents.len(),
        fragments = fragments.len(),
        "embedding fragments"
    );

    let texts: Vec<String> = fragments.iter().map(|f| f.text.clone()).collect();
    let vectors =
        embedding::embed_in_batches(embedder, &texts, config.embedding.batch_size).await?;

    let info = IndexInfo {
        index_id: Uuid::new_v4().to_string(),
        created_at: Utc::now(),
        embedding_model: embedder.model_name().to_string(),
        content_fingerprint: fingerprint,
    };
    Index::from_parts(info, documents, fragments.into_iter().zip(vectors).collect())
}

/// Options for [`build_or_load`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenOptions {
    /// Discard any persisted index and build a new one.
    pub force_rebuild: bool,
}

/// Return the persisted index if its directory exists, otherwise build and
/// persist a new one.
///
/// On load, the content fingerprint recorded at build time is compared with
/// the current content directory. A mismatch is logged, and triggers a
/// rebuild only when `index.rebuild_on_change` is set.
pub async fn build_or_load(
    content_dir: &Path,
    config: &Config,
    embedder: &dyn Embedder,
    options: OpenOptions,
) -> Result<(Index, IndexOrigin)> {
    let persist_dir = &config.index.persist_dir;
    let mut rebuild = options.force_rebuild;

    if persist_dir.exists() && !rebuild {
        println!("Rebuilding storage context from directory");
        let start = Instant::now();
        let index = Index::load(persist_dir)?;
        stats::log_duration(start, "Rebuilding storage context");
        stats::print_dir_entries("Size of the persist directory:", persist_dir);

        if is_stale(&index, content_dir, config) {
            if config.index.rebuild_on_change {
                tracing::info!("content changed since the index was built, rebuilding");
                rebuild = true;
            } else {
                tracing::warn!(
                    built = %index.info.created_at,
                    "content changed since the index was built; run `index --rebuild` to refresh it"
                );
            }
        }
        if !rebuild {
            return Ok((index, IndexOrigin::Loaded));
        }
    }

    println!("Loading the data from the blogposts and create the index");
    let start = Instant::now();
    let index = build(content_dir, config, embedder).await?;
    stats::log_duration(start, "Indexing");

    println!("Persisting the index to the folder");
    let start = Instant::now();
    index.persist(persist_dir)?;
    stats::log_duration(start, "Persisting");
    stats::print_dir_entries("Size of the persisted directory:", persist_dir);

    Ok((index, IndexOrigin::Built))
}

fn is_stale(index: &Index, content_dir: &Path, config: &Config) -> bool {
    if !content_dir.exists() {
        tracing::warn!(dir = %content_dir.display(), "content directory missing, skipping staleness check");
        return false;
    }
    match loader::content_fingerprint(content_dir, &config.index) {
        Ok(current) => current != index.info.content_fingerprint,
        Err(e) => {
            tracing::warn!(error = %e, "could not fingerprint content directory");
            false
        }
    }
}
