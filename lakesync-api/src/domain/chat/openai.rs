//! Chat model speaking the OpenAI-compatible chat-completions wire format.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::domain::error::{PipelineError, Result};
use crate::domain::traits::{ChatCompletion, ChatModel};

pub struct OpenAiChatModel {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: String,
}

impl OpenAiChatModel {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<ChatCompletion> {
        let body = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt },
            ],
        });

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Backend(format!("chat request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Backend(format!(
                "chat endpoint returned status {}: {}",
                status, text
            )));
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| PipelineError::Backend(format!("chat response parse failed: {}", e)))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| PipelineError::Backend("no choices in chat response".to_string()))?;

        Ok(ChatCompletion {
            text,
            model: parsed.model.unwrap_or_else(|| "unknown".to_string()),
        })
    }
}
