//! Chat-completions client used as the production [`Summarizer`].
//!
//! Blocking reqwest with Bearer auth against `{base_url}/chat/completions`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RecapError;
use crate::summarizer::Summarizer;
use crate::types::OpenAiConfig;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: Option<u64>,
}

pub struct OpenAiSummarizer {
    client: reqwest::blocking::Client,
    api_key: String,
    model: String,
    base_url: String,
    temperature: f32,
}

impl OpenAiSummarizer {
    pub fn new(api_key: &str, config: &OpenAiConfig) -> Result<Self, RecapError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.to_string(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            temperature: config.temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Summarizer for OpenAiSummarizer {
    fn summarize(&self, system: &str, user: &str) -> Result<String, RecapError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
        };
        log::debug!(
            "Chat completion request: model {}, {} input chars",
            self.model,
            user.chars().count()
        );

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().unwrap_or_default();
            return Err(RecapError::Api {
                status,
                message: format!("chat completion failed: {}", text),
            });
        }

        let text = resp.text()?;
        parse_completion(&text)
    }
}

/// Extract the first choice's text from a chat-completions response body.
fn parse_completion(body: &str) -> Result<String, RecapError> {
    let response: ChatResponse = serde_json::from_str(body)
        .map_err(|e| RecapError::Summarizer(format!("unreadable completion: {}", e)))?;
    if let Some(tokens) = response.usage.and_then(|u| u.total_tokens) {
        log::debug!("Chat completion used {} tokens", tokens);
    }
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| RecapError::Summarizer("completion had no content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completion_takes_first_choice() {
        let body = r###"{
            "choices": [
                { "message": { "role": "assistant", "content": "  ## 2025-09-26\n### Rust\n" } },
                { "message": { "role": "assistant", "content": "ignored" } }
            ],
            "usage": { "total_tokens": 1234 }
        }"###;
        assert_eq!(parse_completion(body).unwrap(), "## 2025-09-26\n### Rust");
    }

    #[test]
    fn test_parse_completion_without_content() {
        assert!(matches!(
            parse_completion(r#"{ "choices": [] }"#),
            Err(RecapError::Summarizer(_))
        ));
        assert!(matches!(
            parse_completion(r#"{ "choices": [{ "message": { "content": null } }] }"#),
            Err(RecapError::Summarizer(_))
        ));
        assert!(parse_completion("<html>").is_err());
    }

    #[test]
    fn test_request_shape() {
        let body = ChatRequest {
            model: "gpt-4o-mini",
            messages: [
                ChatMessage {
                    role: "system",
                    content: "s",
                },
                ChatMessage {
                    role: "user",
                    content: "u",
                },
            ],
            temperature: 0.3,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][0]["content"], "s");
    }
}
