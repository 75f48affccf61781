//! Language model collaborators
//!
//! [`ChatCompletionsModel`] talks to any OpenAI-compatible `/chat/completions`
//! endpoint (Groq by default). [`OfflineModel`] answers deterministically without
//! network access, for dry runs and tests.

use super::{ChatMessage, CollaboratorResult, LanguageModel, LlmResponse, Role};
use crate::config::{get_env, LlmSettings};
use crate::error::CollaboratorError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;
use tracing::debug;

/// OpenAI-compatible chat-completions client
#[derive(Clone)]
pub struct ChatCompletionsModel {
    settings: LlmSettings,
    api_key: String,
    client: Client,
}

impl ChatCompletionsModel {
    /// Build a client, reading the API key from `settings.api_key_env`
    pub fn from_settings(settings: LlmSettings) -> CollaboratorResult<Self> {
        let api_key = get_env(&settings.api_key_env)
            .ok()
            .flatten()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| CollaboratorError::ApiKeyNotFound(settings.api_key_env.clone()))?;
        Self::new(settings, api_key)
    }

    pub fn new(settings: LlmSettings, api_key: impl Into<String>) -> CollaboratorResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            settings,
            api_key: api_key.into(),
            client,
        })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }
}

impl std::fmt::Debug for ChatCompletionsModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsModel")
            .field("model", &self.settings.model)
            .field("base_url", &self.settings.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LanguageModel for ChatCompletionsModel {
    async fn invoke(&self, messages: &[ChatMessage]) -> CollaboratorResult<LlmResponse> {
        let url = format!("{}/chat/completions", self.settings.base_url.trim_end_matches('/'));

        let body = CompletionRequest {
            model: &self.settings.model,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => CollaboratorError::Authentication(error_text),
                429 => CollaboratorError::RateLimitExceeded(error_text),
                _ => CollaboratorError::Provider(format!("API error {}: {}", status, error_text)),
            });
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| CollaboratorError::InvalidResponse("response has no choices".to_string()))?;

        let usage = completion.usage.unwrap_or_default();
        debug!(
            model = %self.settings.model,
            input_tokens = usage.prompt_tokens,
            output_tokens = usage.completion_tokens,
            "Chat completion finished"
        );

        Ok(LlmResponse {
            text,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        })
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: usize,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    usage: Option<CompletionUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CompletionUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Deterministic model for runs without network access
///
/// Replies with the opening line of the last user message and a digest of the
/// whole prompt, so the same input always yields the same output.
#[derive(Debug, Clone, Default)]
pub struct OfflineModel;

impl OfflineModel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LanguageModel for OfflineModel {
    async fn invoke(&self, messages: &[ChatMessage]) -> CollaboratorResult<LlmResponse> {
        let prompt = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();

        let headline: String = prompt
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("empty prompt")
            .chars()
            .take(120)
            .collect();

        let mut hasher = DefaultHasher::new();
        for message in messages {
            message.content.hash(&mut hasher);
        }

        let input_tokens = messages.iter().map(|m| m.content.split_whitespace().count()).sum::<usize>();
        let text = format!(
            "[offline] {}\n[offline] prompt digest {:016x} ({} words)",
            headline,
            hasher.finish(),
            input_tokens
        );
        let output_tokens = text.split_whitespace().count();

        Ok(LlmResponse {
            text,
            input_tokens: input_tokens as u32,
            output_tokens: output_tokens as u32,
        })
    }
}
