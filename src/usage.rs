//! Rate-limit probe.
//!
//! Sends a small fixed prompt to the chat endpoint and reads the remaining
//! quota from the response headers. A non-200 answer means the token is not
//! accepted, so the probe doubles as a credential check before any real work.
//! Readings taken before and after a run give an approximate cost (the probes
//! themselves are included).

use anyhow::Result;
use reqwest::header::HeaderMap;
use std::time::Duration;

use crate::config::{ModelAccess, ModelConfig};
use crate::error::RagError;
use crate::models::ChatMessage;

pub const REMAINING_TOKENS_HEADER: &str = "x-ratelimit-remaining-tokens";
pub const REMAINING_REQUESTS_HEADER: &str = "x-ratelimit-remaining-requests";

const PROBE_SYSTEM: &str = "You are a helpful assistant that answers questions";
const PROBE_QUESTION: &str = "What is the capital of the Netherlands?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageReading {
    pub remaining_tokens: i64,
    pub remaining_requests: i64,
}

/// Quota consumed between two readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageDelta {
    pub tokens: i64,
    pub requests: i64,
}

impl UsageReading {
    /// Consumption since `earlier`. Negative when the window reset in between.
    pub fn used_since(&self, earlier: &UsageReading) -> UsageDelta {
        UsageDelta {
            tokens: earlier.remaining_tokens - self.remaining_tokens,
            requests: earlier.remaining_requests - self.remaining_requests,
        }
    }
}

/// Send the probe request and print the remaining quota.
pub async fn probe(access: &ModelAccess, model: &ModelConfig) -> Result<UsageReading> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(model.timeout_secs))
        .build()?;

    let body = serde_json::json!({
        "model": model.chat_model,
        "messages": [
            ChatMessage::system(PROBE_SYSTEM),
            ChatMessage::user(PROBE_QUESTION),
        ],
    });

    let response = client
        .post(format!("{}/chat/completions", access.base_url))
        .bearer_auth(&access.token)
        .json(&body)
        .send()
        .await?;

    if response.status() != reqwest::StatusCode::OK {
        let text = response.text().await.unwrap_or_default();
        return Err(RagError::InvalidCredentials(text).into());
    }

    let reading = reading_from_headers(response.headers())?;
    println!("X-Ratelimit-Remaining-Tokens: {}", reading.remaining_tokens);
    println!("X-Ratelimit-Remaining-Requests: {}", reading.remaining_requests);
    Ok(reading)
}

fn reading_from_headers(headers: &HeaderMap) -> Result<UsageReading, RagError> {
    Ok(UsageReading {
        remaining_tokens: numeric_header(headers, REMAINING_TOKENS_HEADER)?,
        remaining_requests: numeric_header(headers, REMAINING_REQUESTS_HEADER)?,
    })
}

fn numeric_header(headers: &HeaderMap, name: &'static str) -> Result<i64, RagError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
        .ok_or(RagError::RateLimitHeader(name))
}

pub fn print_usage_delta(delta: &UsageDelta) {
    println!("Total tokens used: {}", delta.tokens);
    println!("Total requests used: {}", delta.requests);
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(tokens: &'static str, requests: &'static str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(REMAINING_TOKENS_HEADER, HeaderValue::from_static(tokens));
        map.insert(REMAINING_REQUESTS_HEADER, HeaderValue::from_static(requests));
        map
    }

    #[test]
    fn test_reading_from_headers() {
        let reading = reading_from_headers(&headers("149000", "148")).unwrap();
        assert_eq!(
            reading,
            UsageReading {
                remaining_tokens: 149000,
                remaining_requests: 148
            }
        );
    }

    #[test]
    fn test_non_numeric_header() {
        let err = reading_from_headers(&headers("lots", "148")).unwrap_err();
        assert!(matches!(err, RagError::RateLimitHeader(REMAINING_TOKENS_HEADER)));
    }

    #[test]
    fn test_missing_header() {
        let mut map = HeaderMap::new();
        map.insert(REMAINING_TOKENS_HEADER, HeaderValue::from_static("10"));
        let err = reading_from_headers(&map).unwrap_err();
        assert!(matches!(err, RagError::RateLimitHeader(REMAINING_REQUESTS_HEADER)));
    }

    #[test]
    fn test_used_since() {
        let before = UsageReading {
            remaining_tokens: 1000,
            remaining_requests: 50,
        };
        let after = UsageReading {
            remaining_tokens: 700,
            remaining_requests: 47,
        };
        assert_eq!(
            after.used_since(&before),
            UsageDelta {
                tokens: 300,
                requests: 3
            }
        );
    }
}
