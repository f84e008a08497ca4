//! Turns retrieved fragments into prompt context.
//!
//! Two modes are supported:
//! - [`ContextMode::Fragments`]: the retrieved fragment texts themselves.
//! - [`ContextMode::WholeDocuments`]: the full text of every document that
//!   owns a retrieved fragment, each included once.
//!
//! A fragment whose document is missing from the docstore is reported and left
//! out of the cited documents, but its text still counts in fragments mode.

use std::collections::HashSet;
use std::path::Path;

use crate::blog;
use crate::index::Index;
use crate::models::{Document, ScoredFragment};

/// Separator placed between context entries.
pub const CONTEXT_DELIMITER: &str = "\n------\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    Fragments,
    WholeDocuments,
}

impl ContextMode {
    /// Suffix used when announcing the model call.
    pub fn describe(self) -> &'static str {
        match self {
            Self::Fragments => "the context in all fragments",
            Self::WholeDocuments => "the context in all file content",
        }
    }
}

/// Documents cited by a retrieval, unique by file name in first-seen order.
#[derive(Debug, Default)]
pub struct CitedDocuments<'a> {
    pub documents: Vec<&'a Document>,
    /// Ids of fragments whose owning document could not be found.
    pub unresolved: Vec<String>,
}

/// Look up the owning document of each fragment.
pub fn resolve<'a>(index: &'a Index, fragments: &[ScoredFragment]) -> CitedDocuments<'a> {
    let mut cited = CitedDocuments::default();
    let mut seen: HashSet<&str> = HashSet::new();

    for scored in fragments {
        let fragment = &scored.fragment;
        match index.document(&fragment.document_id) {
            Some(document) => {
                if seen.insert(document.file_name.as_str()) {
                    cited.documents.push(document);
                }
            }
            None => {
                tracing::warn!(
                    fragment = %fragment.id,
                    document = %fragment.document_id,
                    "document for fragment was not found"
                );
                cited.unresolved.push(fragment.id.clone());
            }
        }
    }

    cited
}

/// Fragment texts joined by [`CONTEXT_DELIMITER`], in retrieval order.
pub fn fragments_context(fragments: &[ScoredFragment]) -> String {
    fragments
        .iter()
        .map(|s| s.fragment.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER)
}

/// Full text of each cited document, read from `content_dir`. Falls back to
/// the text captured at index time when the file cannot be read.
pub fn whole_documents_context(cited: &CitedDocuments<'_>, content_dir: &Path) -> String {
    cited
        .documents
        .iter()
        .map(|document| {
            let path = content_dir.join(&document.relative_path);
            match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "cannot read post, using indexed text"
                    );
                    document.text.clone()
                }
            }
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER)
}

/// Build the context string for `mode`.
pub fn build_context(
    mode: ContextMode,
    fragments: &[ScoredFragment],
    cited: &CitedDocuments<'_>,
    content_dir: &Path,
) -> String {
    match mode {
        ContextMode::Fragments => fragments_context(fragments),
        ContextMode::WholeDocuments => whole_documents_context(cited, content_dir),
    }
}

/// Print the cited documents, with their public URL when `base_url` is set
/// and the post header carries a date.
pub fn print_cited_documents(cited: &CitedDocuments<'_>, content_dir: &Path, base_url: Option<&str>) {
    println!(
        "Found [{}] documents that match the question:",
        cited.documents.len()
    );
    for document in &cited.documents {
        let path = content_dir.join(&document.relative_path);
        match base_url.and_then(|base| document_url(document, base)) {
            Some(url) => println!("- {} ({})", path.display(), url),
            None => println!("- {}", path.display()),
        }
    }
    println!();
}

fn document_url(document: &Document, base_url: &str) -> Option<String> {
    let date = document.metadata.date.as_deref()?;
    match blog::post_url(&document.file_name, date, base_url) {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::debug!(file = %document.file_name, error = %e, "no public URL for post");
            None
        }
    }
}
