//! Top-K similarity search over an [`Index`].
//!
//! Brute force: the query vector is compared with every fragment vector and
//! the K best are kept. No minimum-score cutoff.

use anyhow::Result;

use crate::config::RetrievalConfig;
use crate::embedding::{self, Embedder};
use crate::index::Index;
use crate::models::ScoredFragment;

pub struct Retriever<'a> {
    index: &'a Index,
    embedder: &'a dyn Embedder,
    top_k: usize,
    query_prefix: String,
}

impl<'a> Retriever<'a> {
    pub fn new(index: &'a Index, embedder: &'a dyn Embedder, config: &RetrievalConfig) -> Self {
        Self {
            index,
            embedder,
            top_k: config.top_k,
            query_prefix: config.query_prefix.clone(),
        }
    }

    /// Embed the prefixed question and return at most `top_k` fragments,
    /// best first.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<ScoredFragment>> {
        let query = format!("{}{}", self.query_prefix, question);
        let query_vec = embedding::embed_query(self.embedder, &query).await?;

        if self.index.dims() > 0 && query_vec.len() != self.index.dims() {
            anyhow::bail!(
                "Query embedding has {} dimensions but the index has {}; was it built with another model ({})?",
                query_vec.len(),
                self.index.dims(),
                self.index.info().embedding_model
            );
        }

        let results = rank(self.index, &query_vec, self.top_k);
        tracing::debug!(results = results.len(), "retrieved fragments");
        Ok(results)
    }
}

/// Score every fragment against `query_vec` and keep the `k` best, ordered by
/// non-increasing score.
pub fn rank(index: &Index, query_vec: &[f32], k: usize) -> Vec<ScoredFragment> {
    let mut scored: Vec<ScoredFragment> = index
        .embedded_fragments()
        .map(|(fragment, vector)| ScoredFragment {
            fragment: fragment.clone(),
            score: embedding::cosine_similarity(query_vec, vector),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}
