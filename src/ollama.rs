//! Ollama text generation for notification rewrites and chat replies.
//!
//! Sends prompts to Ollama's /api/generate endpoint. Callers decide what a
//! failure means; nothing here falls back silently.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::classifier::{first_sentences, RewriteError, Rewriter};
use crate::config::OllamaConfig;

const REWRITE_PROMPT: &str = r#"Rewrite this phone notification so it can be read aloud to the user. Mention who it is from and which app. Use at most two short, conversational sentences. Output ONLY the rewritten text, nothing else.

App: {app}
Sender: {sender}
Text: {text}

Spoken version:"#;

const CHAT_SYSTEM: &str =
    "You are a voice assistant. Answer briefly; your reply will be spoken aloud.";

#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("cannot connect to Ollama at {0}")]
    Connect(String),

    #[error("Ollama request timed out")]
    Timeout,

    #[error("Ollama request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Ollama returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("Ollama returned an empty response")]
    Empty,
}

/// Produces a spoken reply for a chat message.
#[async_trait]
pub trait ChatResponder: Send + Sync {
    async fn reply(&self, prompt: &str) -> Result<String, OllamaError>;
}

pub struct OllamaClient {
    config: OllamaConfig,
    client: Client,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self, OllamaError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    /// Run one non-streaming generation and return the trimmed response.
    pub async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
        num_predict: u32,
    ) -> Result<String, OllamaError> {
        let mut body = json!({
            "model": self.config.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": temperature,
                "num_predict": num_predict
            }
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }

        let url = format!("{}/api/generate", self.config.host.trim_end_matches('/'));
        debug!("Sending to Ollama model '{}'", self.config.model);

        let resp = self.client.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_connect() {
                OllamaError::Connect(self.config.host.clone())
            } else if e.is_timeout() {
                OllamaError::Timeout
            } else {
                OllamaError::Request(e)
            }
        })?;

        if !resp.status().is_success() {
            return Err(OllamaError::Status(resp.status()));
        }

        let data = resp.json::<serde_json::Value>().await?;
        let result = data["response"].as_str().unwrap_or("").trim().to_string();
        if result.is_empty() {
            return Err(OllamaError::Empty);
        }
        debug!("Ollama output: '{result}'");
        Ok(result)
    }
}

#[async_trait]
impl Rewriter for OllamaClient {
    async fn rewrite(
        &self,
        app: &str,
        sender: Option<&str>,
        text: &str,
    ) -> Result<String, RewriteError> {
        let prompt = REWRITE_PROMPT
            .replace("{app}", app)
            .replace("{sender}", sender.unwrap_or("unknown"))
            .replace("{text}", text);
        let rewritten = self.generate(&prompt, None, 0.3, 120).await?;
        Ok(first_sentences(&rewritten, 2))
    }
}

#[async_trait]
impl ChatResponder for OllamaClient {
    async fn reply(&self, prompt: &str) -> Result<String, OllamaError> {
        self.generate(prompt, Some(CHAT_SYSTEM), 0.7, 300).await
    }
}
