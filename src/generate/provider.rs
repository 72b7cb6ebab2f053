// src/generate/provider.rs
//! Generative-text client: provider abstraction over the remote model.
//!
//! The service contract is minimal — `generate(prompt) -> text` with no
//! structured-output guarantee; everything shape-related happens downstream
//! in `schema`.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-1.0-pro";

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// One prompt in, one free-form completion out.
    async fn generate(&self, prompt: &str) -> Result<String>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type DynTextGenerator = Arc<dyn TextGenerator>;

/// Factory: build a generator from config + environment.
///
/// * If `GEN_TEST_MODE=mock`, returns a mock with a fixed valid template reply.
/// * `"gemini"` builds the real provider; anything else is disabled.
pub fn build_generator(provider: &str, model_override: Option<&str>) -> DynTextGenerator {
    if std::env::var("GEN_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(offline_mock());
    }

    match provider {
        "gemini" => Arc::new(GeminiProvider::new(model_override)),
        "mock" => Arc::new(offline_mock()),
        _ => Arc::new(DisabledGenerator),
    }
}

/// A mock whose fixed reply is a valid template, so the whole pipeline can run
/// offline end-to-end.
fn offline_mock() -> MockGenerator {
    MockGenerator::fixed(
        r#"{"relief_title": "Mock Relief Drive", "description": "Mock description.",
            "monetary_goal": 100000,
            "inkind_donation": [{"item": "Water", "item_desc": "Bottled", "quantity": 500}],
            "deployment_date": "2026-01-15"}"#,
    )
}

/// Gemini provider (generateContent API). Requires `GOOGLE_API_KEY`.
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(model_override: Option<&str>) -> Self {
        let api_key = std::env::var("GOOGLE_API_KEY").unwrap_or_default();
        let http = reqwest::Client::builder()
            .user_agent("relief-pipeline/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        let model = model_override.unwrap_or(DEFAULT_MODEL).to_string();
        Self {
            http,
            api_key,
            model,
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiProvider {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(anyhow!("GOOGLE_API_KEY is not set"));
        }

        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }
        #[derive(Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct GenerationConfig {
            temperature: f32,
            top_p: f32,
            top_k: u32,
            max_output_tokens: u32,
        }
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Req<'a> {
            contents: Vec<Content<'a>>,
            generation_config: GenerationConfig,
        }
        #[derive(Deserialize)]
        struct Resp {
            candidates: Vec<Candidate>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: RespContent,
        }
        #[derive(Deserialize)]
        struct RespContent {
            parts: Vec<RespPart>,
        }
        #[derive(Deserialize)]
        struct RespPart {
            text: String,
        }

        let req = Req {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.9,
                top_p: 1.0,
                top_k: 1,
                max_output_tokens: 2048,
            },
        };

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            self.model
        );
        let resp = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&req)
            .send()
            .await
            .context("calling generative service")?;

        if !resp.status().is_success() {
            return Err(anyhow!("generative service returned {}", resp.status()));
        }
        let body: Resp = resp.json().await.context("decoding generative response")?;
        let text = body
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<String>()
            })
            .unwrap_or_default();
        if text.is_empty() {
            return Err(anyhow!("empty completion from generative service"));
        }
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

/// Always errors; used when generation is switched off.
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(anyhow!("text generation is disabled"))
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

/// Scriptable mock for tests and local runs. Scripted replies are consumed in
/// order; once exhausted it falls back to the fixed reply, or errors if none.
pub struct MockGenerator {
    script: Mutex<VecDeque<String>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockGenerator {
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(replies.into_iter().map(Into::into).collect()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn fixed(reply: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts seen so far, for asserting on prompt construction.
    pub fn seen_prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("poisoned prompts").clone()
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts
            .lock()
            .expect("poisoned prompts")
            .push(prompt.to_string());
        if let Some(reply) = self.script.lock().expect("poisoned script").pop_front() {
            return Ok(reply);
        }
        self.fallback
            .clone()
            .ok_or_else(|| anyhow!("mock script exhausted"))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_mock_replies_in_order_then_errors() {
        let m = MockGenerator::scripted(["one", "two"]);
        assert_eq!(m.generate("a").await.unwrap(), "one");
        assert_eq!(m.generate("b").await.unwrap(), "two");
        assert!(m.generate("c").await.is_err());
        assert_eq!(m.seen_prompts().len(), 3);
    }

    #[tokio::test]
    async fn disabled_generator_always_errors() {
        assert!(DisabledGenerator.generate("x").await.is_err());
    }
}
