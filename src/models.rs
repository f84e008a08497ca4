//! Core data models that flow through the index and answer pipeline.

use serde::{Deserialize, Serialize};

/// Header metadata parsed from a post's front matter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostMetadata {
    pub title: Option<String>,
    /// Publication date as written in the header (`YYYY-MM-DD`).
    pub date: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One post file read from the content directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub file_name: String,
    /// Path relative to the content directory.
    pub relative_path: String,
    pub text: String,
    pub metadata: PostMetadata,
}

/// A contiguous slice of a document's text; the unit that is embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: String,
    pub document_id: String,
    pub position: usize,
    pub text: String,
}

/// A fragment paired with its similarity to a query.
#[derive(Debug, Clone)]
pub struct ScoredFragment {
    pub fragment: Fragment,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Token counters reported by a chat completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Generated answer text plus what it cost.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub usage: TokenUsage,
}
