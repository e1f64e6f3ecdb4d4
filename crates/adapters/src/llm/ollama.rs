//! Ollama local LLM adapter

use async_trait::async_trait;
use echopost_domain::{GenerateError, GenerateInput, Generator};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{LlmConfig, SYSTEM_INSTRUCTION, build_generation_prompt};

/// Generator backed by an Ollama server
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    config: LlmConfig,
}

impl OllamaGenerator {
    pub fn with_base_url(base_url: String, config: LlmConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
        }
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Serialize)]
struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<i32>,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn generate(&self, input: GenerateInput) -> Result<String, GenerateError> {
        let request = OllamaRequest {
            model: input.model.clone(),
            prompt: build_generation_prompt(&input.samples, input.char_limit),
            system: Some(SYSTEM_INSTRUCTION.to_string()),
            stream: false,
            options: Some(OllamaOptions {
                temperature: Some(self.config.temperature),
                num_predict: Some(self.config.max_output_tokens as i32),
            }),
        };

        let url = format!("{}/api/generate", self.base_url);

        tracing::debug!(model = %input.model, samples = input.samples.len(), "Requesting generation");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerateError::Timeout
                } else {
                    GenerateError::Unreachable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::Api(format!(
                "API returned {}: {}",
                status, body
            )));
        }

        let api_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| GenerateError::Api(format!("Invalid response body: {}", e)))?;

        let text = api_response.response.trim();
        if text.is_empty() {
            return Err(GenerateError::Empty);
        }

        tracing::info!(model = %input.model, chars = text.chars().count(), "Generated post");

        Ok(text.to_string())
    }
}
