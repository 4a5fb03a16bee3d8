// src/services/llm_service.rs
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::{Value, json};

use crate::errors::AnalyzerError;
use crate::models::{ModelMessage, ModelReply};

/// One chat-completion round trip. Implementations never retry.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    async fn chat(
        &self,
        model: &str,
        messages: &[ModelMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<ModelReply, AnalyzerError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    pub referer: String,
    pub app_name: String,
}

/// OpenAI-compatible chat completions endpoint (OpenRouter by default).
pub struct OpenRouterGateway {
    config: GatewayConfig,
    client: Client,
}

impl OpenRouterGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, AnalyzerError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AnalyzerError::Configuration(format!("HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl ModelGateway for OpenRouterGateway {
    async fn chat(
        &self,
        model: &str,
        messages: &[ModelMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<ModelReply, AnalyzerError> {
        if self.config.api_key.trim().is_empty() {
            return Err(AnalyzerError::Configuration(
                "OPENROUTER_API_KEY is not configured".to_string(),
            ));
        }
        if model.trim().is_empty() {
            return Err(AnalyzerError::Configuration(
                "Model name is empty".to_string(),
            ));
        }

        let mut request = self
            .client
            .post(&self.config.base_url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&json!({
                "model": model,
                "messages": messages,
                "temperature": temperature,
                "max_tokens": max_tokens,
            }));
        if !self.config.referer.is_empty() {
            request = request.header("HTTP-Referer", &self.config.referer);
        }
        if !self.config.app_name.is_empty() {
            request = request.header("X-Title", &self.config.app_name);
        }

        debug!(
            "chat request: model={} messages={} prompt_chars={} image={}",
            model,
            messages.len(),
            messages.iter().map(|m| m.text().chars().count()).sum::<usize>(),
            messages.iter().any(ModelMessage::has_image)
        );

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                AnalyzerError::Transport(format!("request to {} timed out", model))
            } else {
                AnalyzerError::Transport(format!("request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalyzerError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| AnalyzerError::ResponseShape(format!("body is not JSON: {}", e)))?;

        let text = extract_content(&raw)
            .ok_or_else(|| AnalyzerError::ResponseShape("response is missing content".to_string()))?;

        Ok(ModelReply { text, raw })
    }
}

/// `choices[0].message.content`, as a string or joined text parts.
pub fn extract_content(raw: &Value) -> Option<String> {
    let content = raw.get("choices")?.get(0)?.get("message")?.get("content")?;
    match content {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect();
            (!texts.is_empty()).then(|| texts.join(""))
        }
        _ => None,
    }
}
