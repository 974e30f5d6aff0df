//! Text-generation clients.
//!
//! Every agent (enrichment, analyzer, summarizer, graph extraction, fusion)
//! talks to the model through [`TextGenerator`], so a scripted generator can
//! stand in for the real one in tests. Providers:
//!
//! | `model.provider` | Endpoint |
//! |------------------|----------|
//! | `huggingface` | HF Inference API text-generation (`HF_TOKEN`) |
//! | `openai` | `/chat/completions` (`OPENAI_API_KEY`) |
//! | `ollama` | `/api/generate` |
//! | `disabled` | always errors |

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::ModelConfig;
use crate::http::{self, post_json_with_retry};

/// Single-prompt text generation.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    fn model_name(&self) -> &str;

    /// Generate a completion for `prompt`. Returns only the new text.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Create the generator selected by `model.provider`.
pub fn create_generator(config: &ModelConfig) -> Result<Arc<dyn TextGenerator>> {
    match config.provider.as_str() {
        "huggingface" => Ok(Arc::new(HuggingFaceGenerator::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        other => bail!("Unknown model provider: {}", other),
    }
}

/// Generator used when no model is configured.
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str) -> Result<String> {
        bail!("Text generation is disabled (set [model].provider)")
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Hugging Face Inference API
// ═══════════════════════════════════════════════════════════════════════

pub struct HuggingFaceGenerator {
    model_id: String,
    url: String,
    token: Option<String>,
    max_new_tokens: u32,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl HuggingFaceGenerator {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let url = config.base_url.clone().unwrap_or_else(|| {
            format!(
                "https://api-inference.huggingface.co/models/{}",
                config.model_id
            )
        });
        Ok(Self {
            model_id: config.model_id.clone(),
            url,
            token: config.token.clone(),
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl TextGenerator for HuggingFaceGenerator {
    fn model_name(&self) -> &str {
        &self.model_id
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "inputs": prompt,
            "parameters": {
                "max_new_tokens": self.max_new_tokens,
                "temperature": self.temperature,
                "return_full_text": false,
            }
        });
        let headers: Vec<(&str, String)> = self
            .token
            .iter()
            .map(|t| ("Authorization", format!("Bearer {}", t)))
            .collect();

        let json = post_json_with_retry(
            &self.client,
            &self.url,
            &headers,
            &body,
            self.max_retries,
            "Hugging Face",
        )
        .await?;
        parse_hf_response(&json)
    }
}

/// Accepts `[{"generated_text": ..}]` or a bare `{"generated_text": ..}`.
fn parse_hf_response(json: &Value) -> Result<String> {
    let item = match json {
        Value::Array(items) => items.first(),
        other => Some(other),
    };
    if let Some(err) = json.get("error").and_then(Value::as_str) {
        bail!("Hugging Face error: {}", err);
    }
    item.and_then(|i| i.get("generated_text"))
        .and_then(Value::as_str)
        .map(|s| s.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid Hugging Face response: missing generated_text"))
}

// ═══════════════════════════════════════════════════════════════════════
// OpenAI-compatible chat completions
// ═══════════════════════════════════════════════════════════════════════

pub struct OpenAIGenerator {
    model: String,
    base_url: String,
    api_key: String,
    max_tokens: u32,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            model: config.model_id.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key,
            max_tokens: config.max_new_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        let json = post_json_with_retry(
            &self.client,
            &format!("{}/chat/completions", self.base_url.trim_end_matches('/')),
            &[("Authorization", format!("Bearer {}", self.api_key))],
            &body,
            self.max_retries,
            "OpenAI",
        )
        .await?;

        json.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing message content"))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Ollama
// ═══════════════════════════════════════════════════════════════════════

pub struct OllamaGenerator {
    model: String,
    url: String,
    max_new_tokens: u32,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        Ok(Self {
            model: config.model_id.clone(),
            url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            max_new_tokens: config.max_new_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: http::client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "num_predict": self.max_new_tokens,
                "temperature": self.temperature,
            }
        });
        let json = post_json_with_retry(
            &self.client,
            &format!("{}/api/generate", self.url.trim_end_matches('/')),
            &[],
            &body,
            self.max_retries,
            "Ollama",
        )
        .await?;

        json.get("response")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing response"))
    }
}
