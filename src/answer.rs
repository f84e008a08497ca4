//! Prompt construction and answer generation.

use anyhow::Result;
use std::time::Instant;

use crate::context::ContextMode;
use crate::llm::ChatModel;
use crate::models::{Answer, ChatMessage};
use crate::stats;

pub const SYSTEM_PROMPT: &str = "You are a helpful assistant that answers some questions with the help of some context data.\n\nHere is the context data:\n\n";

/// System message carrying the context, then the raw question.
pub fn build_messages(question: &str, context: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(format!("{}{}", SYSTEM_PROMPT, context)),
        ChatMessage::user(question),
    ]
}

/// One chat call with the question and context.
pub async fn generate_answer(
    model: &dyn ChatModel,
    question: &str,
    context: &str,
) -> Result<Answer> {
    model.chat(&build_messages(question, context)).await
}

/// Announce, call the model, print the answer and its timing.
pub async fn answer_question(
    model: &dyn ChatModel,
    question: &str,
    context: &str,
    mode: ContextMode,
) -> Result<Answer> {
    println!(
        "Calling the model with the question: {} and {}",
        question,
        mode.describe()
    );
    tracing::debug!(model = model.model_name(), context_len = context.len(), "chat request");

    let start = Instant::now();
    let answer = generate_answer(model, question, context).await?;
    print_answer(&answer);
    stats::log_duration(start, "Model call");
    Ok(answer)
}

pub fn print_answer(answer: &Answer) {
    println!();
    println!("Answer:");
    for line in answer.text.lines() {
        println!("\t{}", line);
    }
    println!();
    println!(
        "Token usage: prompt {}, completion {}, total {}",
        answer.usage.prompt_tokens, answer.usage.completion_tokens, answer.usage.total_tokens
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, TokenUsage};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingModel {
        seen: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait]
    impl ChatModel for RecordingModel {
        fn model_name(&self) -> &str {
            "recording"
        }
        async fn chat(&self, messages: &[ChatMessage]) -> Result<Answer> {
            self.seen.lock().unwrap().extend_from_slice(messages);
            Ok(Answer {
                text: "ok".to_string(),
                usage: TokenUsage::default(),
            })
        }
    }

    #[test]
    fn test_build_messages() {
        let messages = build_messages("Why?", "ctx one\n------\nctx two");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.starts_with("You are a helpful assistant"));
        assert!(messages[0]
            .content
            .ends_with("Here is the context data:\n\nctx one\n------\nctx two"));
        assert_eq!(messages[1], ChatMessage::user("Why?"));
    }

    #[tokio::test]
    async fn test_generate_answer_sends_two_messages() {
        let model = RecordingModel {
            seen: Mutex::new(Vec::new()),
        };
        let answer = generate_answer(&model, "q", "c").await.unwrap();
        assert_eq!(answer.text, "ok");
        let seen = model.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].content, "q");
    }
}
