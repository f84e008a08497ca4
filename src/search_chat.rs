//! Chat against a hosted deployment that does its own retrieval from a cloud
//! search index ("chat on your data"). Nothing from the local index is used.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::{SearchChatAccess, SearchConfig};
use crate::error::RagError;
use crate::models::{ChatMessage, TokenUsage};

const SYSTEM_PROMPT: &str =
    "You are an AI assistant that helps people find information in the given documents.";
const ROLE_INFORMATION: &str = "You are an AI assistant that helps people find information.";

#[derive(Debug, Clone, Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filepath: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SearchAnswer {
    pub text: String,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone)]
pub struct SearchChatResult {
    pub answers: Vec<SearchAnswer>,
    pub usage: TokenUsage,
}

#[derive(Deserialize)]
struct Completion {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: TokenUsage,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    context: Option<MessageContext>,
}

#[derive(Deserialize, Default)]
struct MessageContext {
    #[serde(default)]
    citations: Vec<Citation>,
}

impl From<Completion> for SearchChatResult {
    fn from(completion: Completion) -> Self {
        let answers = completion
            .choices
            .into_iter()
            .map(|choice| SearchAnswer {
                text: choice.message.content.unwrap_or_default(),
                citations: choice
                    .message
                    .context
                    .map(|c| c.citations)
                    .unwrap_or_default(),
            })
            .collect();
        Self {
            answers,
            usage: completion.usage,
        }
    }
}

/// Request body: the question plus an `azure_search` data source.
pub fn request_body(access: &SearchChatAccess, config: &SearchConfig, question: &str) -> Value {
    json!({
        "messages": [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(question),
        ],
        "max_tokens": config.max_tokens,
        "temperature": config.temperature,
        "top_p": config.top_p,
        "frequency_penalty": 0,
        "presence_penalty": 0,
        "stream": false,
        "data_sources": [{
            "type": "azure_search",
            "parameters": {
                "endpoint": access.search_endpoint,
                "index_name": access.search_index,
                "semantic_configuration": config.semantic_configuration,
                "query_type": config.query_type,
                "fields_mapping": {},
                "in_scope": true,
                "role_information": ROLE_INFORMATION,
                "filter": null,
                "strictness": config.strictness,
                "top_n_documents": config.top_n_documents,
                "authentication": {
                    "type": "api_key",
                    "key": access.search_key,
                }
            }
        }]
    })
}

pub fn completions_url(access: &SearchChatAccess, config: &SearchConfig) -> String {
    format!(
        "{}/openai/deployments/{}/chat/completions?api-version={}",
        access.endpoint, access.deployment, config.api_version
    )
}

/// Send one search-grounded chat request.
pub async fn ask(
    access: &SearchChatAccess,
    config: &SearchConfig,
    question: &str,
) -> Result<SearchChatResult> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;

    tracing::debug!(deployment = %access.deployment, index = %access.search_index, "search chat request");
    let response = client
        .post(completions_url(access, config))
        .header("api-key", &access.api_key)
        .json(&request_body(access, config, question))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RagError::ModelCall {
            status: status.as_u16(),
            body,
        }
        .into());
    }

    let completion: Completion = response.json().await?;
    Ok(completion.into())
}

pub fn print_result(result: &SearchChatResult) {
    for answer in &result.answers {
        println!();
        println!("Answer:");
        for line in answer.text.lines() {
            println!("\t{}", line);
        }
        println!();
        println!("Citations:");
        for (i, citation) in answer.citations.iter().enumerate() {
            println!(
                "\t[doc{}] - {}",
                i + 1,
                citation.title.as_deref().unwrap_or("(untitled)")
            );
        }
    }
    println!();
    println!(
        "Token usage: prompt {}, completion {}, total {}",
        result.usage.prompt_tokens, result.usage.completion_tokens, result.usage.total_tokens
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access() -> SearchChatAccess {
        SearchChatAccess {
            endpoint: "https://example.openai.azure.com".to_string(),
            api_key: "k".to_string(),
            deployment: "gpt-4o-mini".to_string(),
            search_endpoint: "https://example.search.windows.net".to_string(),
            search_key: "sk".to_string(),
            search_index: "blogposts".to_string(),
        }
    }

    #[test]
    fn test_request_body_data_source() {
        let body = request_body(&access(), &SearchConfig::default(), "Why?");
        assert_eq!(body["max_tokens"], 800);
        assert_eq!(body["messages"][1]["content"], "Why?");

        let source = &body["data_sources"][0];
        assert_eq!(source["type"], "azure_search");
        let params = &source["parameters"];
        assert_eq!(params["index_name"], "blogposts");
        assert_eq!(params["semantic_configuration"], "default");
        assert_eq!(params["query_type"], "simple");
        assert_eq!(params["in_scope"], true);
        assert_eq!(params["strictness"], 3);
        assert_eq!(params["top_n_documents"], 5);
        assert_eq!(params["authentication"]["key"], "sk");
    }

    #[test]
    fn test_completions_url() {
        assert_eq!(
            completions_url(&access(), &SearchConfig::default()),
            "https://example.openai.azure.com/openai/deployments/gpt-4o-mini/chat/completions?api-version=2024-05-01-preview"
        );
    }

    #[test]
    fn test_parse_citations() {
        let completion: Completion = serde_json::from_str(
            r#"{
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": "Pin actions by SHA [doc1].",
                        "context": {"citations": [{"title": "Securing Actions", "content": "..."}]}
                    }
                }],
                "usage": {"prompt_tokens": 100, "completion_tokens": 10, "total_tokens": 110}
            }"#,
        )
        .unwrap();
        let result = SearchChatResult::from(completion);
        assert_eq!(result.answers.len(), 1);
        assert_eq!(
            result.answers[0].citations[0].title.as_deref(),
            Some("Securing Actions")
        );
        assert_eq!(result.usage.total_tokens, 110);
    }

    #[test]
    fn test_choice_without_context() {
        let completion: Completion =
            serde_json::from_str(r#"{"choices": [{"message": {"content": "hi"}}]}"#).unwrap();
        let result = SearchChatResult::from(completion);
        assert!(result.answers[0].citations.is_empty());
    }
}
