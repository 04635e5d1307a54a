//! Generative model traits.
//!
//! The text and vision models are external services. The core only depends
//! on these call contracts; HTTP clients for Ollama and OpenAI live in the
//! `docsight` app crate.

use anyhow::Result;
use async_trait::async_trait;

/// A text-only chat model: one system instruction, one user turn.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the model identifier (e.g. `"mistral"`).
    fn model_name(&self) -> &str;
    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// A vision-capable model: one prompt plus one image.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Returns the model identifier (e.g. `"llava"`).
    fn model_name(&self) -> &str;
    /// `image` holds the raw encoded image bytes (PNG, JPEG, ...).
    async fn chat_with_image(&self, prompt: &str, image: &[u8]) -> Result<String>;
}
