//! Chat-completion client abstraction and the OpenAI-compatible implementation.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::{ModelAccess, ModelConfig};
use crate::error::RagError;
use crate::models::{Answer, ChatMessage, TokenUsage};

#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Send the conversation and return the first choice's text.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<Answer>;
}

/// Calls `POST {base_url}/chat/completions` once per request; no retry, no
/// streaming.
pub struct OpenAIChat {
    client: reqwest::Client,
    base_url: String,
    token: String,
    model: String,
}

impl OpenAIChat {
    pub fn new(access: &ModelAccess, config: &ModelConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: access.base_url.clone(),
            token: access.token.clone(),
            model: config.chat_model.clone(),
        })
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: TokenUsage,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletion {
    fn into_answer(self) -> Result<Answer> {
        let text = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Chat completion returned no choices"))?
            .message
            .content
            .unwrap_or_default();
        Ok(Answer {
            text,
            usage: self.usage,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<Answer> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
        });

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
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

        let completion: ChatCompletion = response.json().await?;
        completion.into_answer()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completion() {
        let completion: ChatCompletion = serde_json::from_str(
            r#"{
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "Amsterdam"}}],
                "usage": {"prompt_tokens": 20, "completion_tokens": 3, "total_tokens": 23}
            }"#,
        )
        .unwrap();
        let answer = completion.into_answer().unwrap();
        assert_eq!(answer.text, "Amsterdam");
        assert_eq!(answer.usage.total_tokens, 23);
    }

    #[test]
    fn test_completion_without_choices_is_error() {
        let completion: ChatCompletion = serde_json::from_str(r#"{"choices": []}"#).unwrap();
        assert!(completion.into_answer().is_err());
    }

    #[test]
    fn test_messages_serialize_lowercase_roles() {
        let json = serde_json::to_value(vec![ChatMessage::system("s"), ChatMessage::user("u")])
            .unwrap();
        assert_eq!(json[0]["role"], "system");
        assert_eq!(json[1]["role"], "user");
    }
}
