//! Scripted chat model for tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::error::{PipelineError, Result};
use crate::domain::traits::{ChatCompletion, ChatModel};

#[derive(Clone)]
pub struct MockChatModel {
    answer: String,
    fail: bool,
    last_prompts: Arc<Mutex<Option<(String, String)>>>,
}

impl MockChatModel {
    pub fn answering(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            fail: false,
            last_prompts: Arc::new(Mutex::new(None)),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: String::new(),
            fail: true,
            last_prompts: Arc::new(Mutex::new(None)),
        }
    }

    /// The `(system, user)` prompts of the most recent call.
    pub fn last_prompts(&self) -> Option<(String, String)> {
        self.last_prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<ChatCompletion> {
        *self.last_prompts.lock().unwrap() =
            Some((system_prompt.to_string(), user_prompt.to_string()));

        if self.fail {
            return Err(PipelineError::Backend("chat model unavailable".to_string()));
        }

        Ok(ChatCompletion {
            text: self.answer.clone(),
            model: "mock-chat".to_string(),
        })
    }
}
