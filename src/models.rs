// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::AnalyzerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ja,
    En,
    Zh,
}

impl Language {
    /// Parses a request language code; blank input falls back to Japanese.
    pub fn parse(raw: Option<&str>) -> Result<Self, AnalyzerError> {
        match raw.map(str::trim).unwrap_or("") {
            "" | "ja" => Ok(Language::Ja),
            "en" => Ok(Language::En),
            "zh" => Ok(Language::Zh),
            other => Err(AnalyzerError::Validation(format!(
                "Unsupported language: {}",
                other
            ))),
        }
    }

    /// Label used inside prompts.
    pub fn label(&self) -> &'static str {
        match self {
            Language::Ja => "Japanese",
            Language::En => "English",
            Language::Zh => "Chinese",
        }
    }
}

/// How (and whether) a price estimate is derived for an image analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PriceStrategy {
    None,
    Inline,
    Search,
    #[default]
    Dedicated,
}

impl PriceStrategy {
    pub fn parse(raw: Option<&str>) -> Result<Self, AnalyzerError> {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("dedicated") => Ok(PriceStrategy::Dedicated),
            Some("none") | Some("off") => Ok(PriceStrategy::None),
            Some("inline") => Ok(PriceStrategy::Inline),
            Some("search") | Some("online") => Ok(PriceStrategy::Search),
            Some(other) => Err(AnalyzerError::Validation(format!(
                "Unsupported price strategy: {}",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceStrategy::None => "none",
            PriceStrategy::Inline => "inline",
            PriceStrategy::Search => "search",
            PriceStrategy::Dedicated => "dedicated",
        }
    }
}

// Model wire types

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ModelMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_with_image(text: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageReference {
                        url: image_url.into(),
                    },
                },
            ]),
        }
    }

    pub fn has_image(&self) -> bool {
        match &self.content {
            MessageContent::Text(_) => false,
            MessageContent::Parts(parts) => parts
                .iter()
                .any(|p| matches!(p, ContentPart::ImageUrl { .. })),
        }
    }

    /// Concatenated text of the message, ignoring image parts.
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageReference },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageReference {
    pub url: String,
}

/// Text extracted from one chat completion plus the untouched wire body.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub text: String,
    pub raw: Value,
}

/// Top-level object recovered from one model call.
#[derive(Debug, Clone)]
pub struct RawModelResult {
    pub payload: Map<String, Value>,
    pub raw: Value,
}

// Catalog entries

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandCatalogEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub name_jp: String,
    #[serde(default)]
    pub name_en: String,
}

impl BrandCatalogEntry {
    pub fn name_variants(&self) -> [&str; 3] {
        [&self.name, &self.name_jp, &self.name_en]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCatalogEntry {
    pub id: String,
    pub name: String,
    pub group_name: String,
}

// Requests

#[derive(Debug, Clone)]
pub struct ImageInput {
    pub data: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone, Default)]
pub struct ModelOverrides {
    pub vision: Option<String>,
    pub category: Option<String>,
    pub price: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub image: ImageInput,
    pub language: Language,
    pub strategy: PriceStrategy,
    pub category_limit: usize,
    pub overrides: ModelOverrides,
    pub debug: bool,
}

#[derive(Debug, Clone)]
pub struct TitleAnalysisRequest {
    pub title: String,
    pub language: Language,
    pub image_url: Option<String>,
    pub category_limit: usize,
    pub category_model: Option<String>,
}

// Results

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandMatch {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMatch {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TieredPrice {
    pub low: i64,
    pub mid: i64,
    pub high: i64,
    pub range: PriceRange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriceEstimate {
    /// Most likely price first; empty or exactly three entries.
    List(Vec<i64>),
    Tiered(TieredPrice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceStatus {
    Skipped,
    Ok,
    Empty,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    pub title: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub processing_time_ms: u64,
    pub vision_model: String,
    pub category_model: Option<String>,
    pub price_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebugInfo {
    pub vision_raw: Value,
    pub group_name: Option<String>,
    pub category_raw: Option<Value>,
    pub price_raw: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub brand: Option<BrandMatch>,
    pub group_name: Option<String>,
    pub categories: Vec<CategoryMatch>,
    pub prices: Option<PriceEstimate>,
    pub price_status: PriceStatus,
    pub price_reason: Option<String>,
    pub citations: Vec<Citation>,
    pub strategy: PriceStrategy,
    pub metadata: AnalysisMetadata,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "_debug")]
    pub debug: Option<DebugInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    Title,
    ImageFallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAlternative {
    pub target_path: String,
    pub category_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleAnalysisResult {
    pub id: Uuid,
    pub title: String,
    pub group_name: Option<String>,
    pub categories: Vec<CategoryMatch>,
    pub best_target_path: String,
    pub best_category_id: String,
    pub alternatives: Vec<CategoryAlternative>,
    pub source: ResolutionSource,
    pub processing_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn language_parsing() {
        assert_eq!(Language::parse(None).unwrap(), Language::Ja);
        assert_eq!(Language::parse(Some(" en ")).unwrap(), Language::En);
        assert!(matches!(
            Language::parse(Some("fr")),
            Err(AnalyzerError::Validation(_))
        ));
    }

    #[test]
    fn strategy_defaults_to_dedicated() {
        assert_eq!(PriceStrategy::parse(None).unwrap(), PriceStrategy::Dedicated);
        assert_eq!(
            PriceStrategy::parse(Some("Search")).unwrap(),
            PriceStrategy::Search
        );
        assert!(PriceStrategy::parse(Some("guess")).is_err());
    }

    #[test]
    fn image_message_serializes_to_chat_parts() {
        let msg = ModelMessage::user_with_image("look", "data:image/png;base64,AAAA");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "user",
                "content": [
                    {"type": "text", "text": "look"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}
                ]
            })
        );
        assert!(msg.has_image());
        assert_eq!(msg.text(), "look");
    }

    #[test]
    fn price_estimate_serializes_untagged() {
        let list = PriceEstimate::List(vec![1000, 500, 2000]);
        assert_eq!(serde_json::to_value(&list).unwrap(), json!([1000, 500, 2000]));

        let tiered = PriceEstimate::Tiered(TieredPrice {
            low: 800,
            mid: 1000,
            high: 1500,
            range: PriceRange { min: 700, max: 1600 },
        });
        assert_eq!(
            serde_json::to_value(&tiered).unwrap(),
            json!({"low": 800, "mid": 1000, "high": 1500, "range": {"min": 700, "max": 1600}})
        );
    }
}
