//! Generative model clients.
//!
//! Implements the [`ChatModel`] and [`VisionModel`] traits from
//! `docsight-core` over HTTP:
//! - **Ollama**: `POST {url}/api/chat` with `stream: false`; images travel as
//!   base64 strings in the message's `images` array.
//! - **OpenAI**: `POST /v1/chat/completions`; images travel as
//!   `data:` URLs in an `image_url` content part. Requires `OPENAI_API_KEY`.
//!
//! Every call is bounded by `llm.timeout_secs`. A call that exceeds it fails
//! with [`ModelTimeout`]; there is no retry.

use anyhow::{bail, Result};
use async_trait::async_trait;
use base64::Engine;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub use docsight_core::llm::{ChatModel, VisionModel};

use crate::config::LlmConfig;

/// A model call exceeded its time bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelTimeout {
    pub secs: u64,
}

impl std::fmt::Display for ModelTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "model call timed out after {}s", self.secs)
    }
}

impl std::error::Error for ModelTimeout {}

/// Run `fut` with a deadline of `secs` seconds.
pub async fn with_timeout<T>(secs: u64, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(Duration::from_secs(secs), fut).await {
        Ok(result) => result,
        Err(_) => Err(ModelTimeout { secs }.into()),
    }
}

fn encode_image(image: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(image)
}

/// `data:` URL for encoded image bytes, sniffing the format from its magic bytes.
pub fn image_data_url(image: &[u8]) -> String {
    let mime = image::guess_format(image)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream");
    format!("data:{};base64,{}", mime, encode_image(image))
}

async fn post_json(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    service: &str,
) -> Result<serde_json::Value> {
    let mut req = client.post(url).json(body);
    if let Some(key) = bearer {
        req = req.header("Authorization", format!("Bearer {}", key));
    }
    let response = req
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("{} connection error ({}): {}", service, url, e))?;
    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("{} API error {}: {}", service, status, body_text);
    }
    Ok(response.json().await?)
}

// ============ Ollama ============

/// Ollama `/api/chat` client for one model.
pub struct OllamaChat {
    model: String,
    url: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(url: &str, model: &str, timeout_secs: u64) -> Self {
        Self {
            model: model.to_string(),
            url: url.trim_end_matches('/').to_string(),
            timeout_secs,
            client: reqwest::Client::new(),
        }
    }

    async fn call(&self, messages: serde_json::Value) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
        });
        let endpoint = format!("{}/api/chat", self.url);
        let json = with_timeout(
            self.timeout_secs,
            post_json(&self.client, &endpoint, None, &body, "Ollama"),
        )
        .await?;
        parse_ollama_chat(&json)
    }
}

fn parse_ollama_chat(json: &serde_json::Value) -> Result<String> {
    json.get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing message.content"))
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.call(serde_json::json!([
            { "role": "system", "content": system_prompt },
            { "role": "user", "content": user_prompt },
        ]))
        .await
    }
}

#[async_trait]
impl VisionModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat_with_image(&self, prompt: &str, image: &[u8]) -> Result<String> {
        self.call(serde_json::json!([
            { "role": "user", "content": prompt, "images": [encode_image(image)] },
        ]))
        .await
    }
}

// ============ OpenAI ============

/// OpenAI chat completions client for one model.
pub struct OpenAIChat {
    model: String,
    api_key: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl OpenAIChat {
    pub fn new(model: &str, timeout_secs: u64) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            model: model.to_string(),
            api_key,
            timeout_secs,
            client: reqwest::Client::new(),
        })
    }

    async fn call(&self, messages: serde_json::Value) -> Result<String> {
        let body = serde_json::json!({ "model": self.model, "messages": messages });
        let json = with_timeout(
            self.timeout_secs,
            post_json(
                &self.client,
                "https://api.openai.com/v1/chat/completions",
                Some(&self.api_key),
                &body,
                "OpenAI",
            ),
        )
        .await?;
        parse_openai_chat(&json)
    }
}

fn parse_openai_chat(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.call(serde_json::json!([
            { "role": "system", "content": system_prompt },
            { "role": "user", "content": user_prompt },
        ]))
        .await
    }
}

#[async_trait]
impl VisionModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat_with_image(&self, prompt: &str, image: &[u8]) -> Result<String> {
        self.call(serde_json::json!([{
            "role": "user",
            "content": [
                { "type": "text", "text": prompt },
                { "type": "image_url", "image_url": { "url": image_data_url(image) } },
            ],
        }]))
        .await
    }
}

// ============ Disabled ============

/// Stand-in used when `llm.provider = "disabled"`; every call fails.
pub struct DisabledModel;

#[async_trait]
impl ChatModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn chat(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String> {
        bail!("LLM provider is disabled")
    }
}

#[async_trait]
impl VisionModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn chat_with_image(&self, _prompt: &str, _image: &[u8]) -> Result<String> {
        bail!("LLM provider is disabled")
    }
}

/// Create the configured text model.
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaChat::new(
            &config.url,
            &config.model,
            config.timeout_secs,
        ))),
        "openai" => Ok(Arc::new(OpenAIChat::new(&config.model, config.timeout_secs)?)),
        "disabled" => Ok(Arc::new(DisabledModel)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

/// Create the configured vision model.
pub fn create_vision_model(config: &LlmConfig) -> Result<Arc<dyn VisionModel>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaChat::new(
            &config.url,
            &config.vision_model,
            config.timeout_secs,
        ))),
        "openai" => Ok(Arc::new(OpenAIChat::new(
            &config.vision_model,
            config.timeout_secs,
        )?)),
        "disabled" => Ok(Arc::new(DisabledModel)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
