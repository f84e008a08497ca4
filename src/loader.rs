//! Reads post files from the content directory into [`Document`]s.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::path::Path;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::blog;
use crate::config::IndexConfig;
use crate::models::Document;

/// A matching file found under the content root, before it is read.
struct ContentFile {
    path: std::path::PathBuf,
    relative: String,
}

fn scan(root: &Path, index_config: &IndexConfig) -> Result<Vec<ContentFile>> {
    if !root.exists() {
        bail!("Content directory does not exist: {}", root.display());
    }

    let include_set = build_globset(&index_config.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string(), "**/.*".to_string()];
    default_excludes.extend(index_config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        files.push(ContentFile {
            path: path.to_path_buf(),
            relative: rel_str,
        });
    }

    // Sort for deterministic ordering
    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

/// Load every matching file under `root` as a document with a fresh id.
pub fn load_documents(root: &Path, index_config: &IndexConfig) -> Result<Vec<Document>> {
    let files = scan(root, index_config)?;
    let mut documents = Vec::with_capacity(files.len());

    for file in files {
        let bytes = std::fs::read(&file.path)
            .with_context(|| format!("Failed to read {}", file.path.display()))?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        let file_name = file
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file.relative.clone());

        documents.push(Document {
            id: Uuid::new_v4().to_string(),
            metadata: blog::parse_metadata(&text),
            file_name,
            relative_path: file.relative,
            text,
        });
    }

    tracing::info!(count = documents.len(), root = %root.display(), "loaded documents");
    Ok(documents)
}

/// SHA-256 over the sorted relative paths and contents of every matching
/// file. Changes whenever a post is added, removed, renamed, or edited.
pub fn content_fingerprint(root: &Path, index_config: &IndexConfig) -> Result<String> {
    let files = scan(root, index_config)?;
    let mut hasher = Sha256::new();
    for file in files {
        let bytes = std::fs::read(&file.path)
            .with_context(|| format!("Failed to read {}", file.path.display()))?;
        hasher.update(file.relative.as_bytes());
        hasher.update([0u8]);
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
