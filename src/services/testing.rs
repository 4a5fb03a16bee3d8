// src/services/testing.rs
//! In-memory gateway that replays scripted replies and records every call.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::errors::AnalyzerError;
use crate::models::{ModelMessage, ModelReply};
use crate::services::llm_service::{ModelGateway, extract_content};

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub model: String,
    pub messages: Vec<ModelMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Default)]
pub struct ScriptedGateway {
    script: Mutex<VecDeque<Result<Value, AnalyzerError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_reply(&self, text: &str) {
        self.push_raw(json!({"choices": [{"message": {"content": text}}]}));
    }

    /// Full wire body, e.g. one carrying citation annotations.
    pub fn push_raw(&self, raw: Value) {
        self.script.lock().unwrap().push_back(Ok(raw));
    }

    pub fn push_error(&self, err: AnalyzerError) {
        self.script.lock().unwrap().push_back(Err(err));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    async fn chat(
        &self,
        model: &str,
        messages: &[ModelMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<ModelReply, AnalyzerError> {
        self.calls.lock().unwrap().push(RecordedCall {
            model: model.to_string(),
            messages: messages.to_vec(),
            temperature,
            max_tokens,
        });
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AnalyzerError::Transport("script exhausted".into())));
        let raw = next?;
        let text = extract_content(&raw)
            .ok_or_else(|| AnalyzerError::ResponseShape("missing content".into()))?;
        Ok(ModelReply { text, raw })
    }
}
