// src/config.rs
use std::str::FromStr;
use std::time::Duration;

use crate::models::PriceStrategy;
use crate::services::price_normalizer::PriceBounds;
use crate::services::retry::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_PRICE_MODEL: &str = "openai/gpt-4.1:online";
const ONLINE_SUFFIX: &str = ":online";

#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: String,
    pub api_key: String,
    pub base_url: String,
    pub referer: String,
    pub app_name: String,
    pub vision_model: String,
    /// Search-grounded variant of the vision model.
    pub vision_model_online: String,
    pub category_model: String,
    pub price_model: String,
    pub brand_csv_path: String,
    pub category_csv_path: String,
    pub request_timeout: Duration,
    pub enable_debug_param: bool,
    pub max_image_bytes: usize,
    pub allowed_mime_types: Vec<String>,
    pub log_llm_raw: bool,
    pub category_retry_enabled: bool,
    pub category_max_retries: u32,
    pub price_bounds: PriceBounds,
    pub price_strategy: PriceStrategy,
    pub price_call_with_image: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup; unset or unparsable values fall
    /// back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let flag = |key: &str, default: bool| lookup(key).map(|v| parse_bool(&v)).unwrap_or(default);

        let vision_model = string("VISION_MODEL", "");
        let vision_model_online = match lookup("VISION_MODEL_ONLINE").filter(|v| !v.is_empty()) {
            Some(model) => model,
            None => online_variant(&vision_model),
        };

        let price_bounds = PriceBounds::new(
            parse_or(lookup("PRICE_MIN"), PriceBounds::default().min),
            parse_or(lookup("PRICE_MAX"), PriceBounds::default().max),
        );

        Self {
            bind_addr: string("BIND_ADDR", "0.0.0.0:8080"),
            api_key: string("OPENROUTER_API_KEY", ""),
            base_url: string("OPENROUTER_BASE_URL", DEFAULT_BASE_URL),
            referer: string("OPENROUTER_REFERER", ""),
            app_name: string("OPENROUTER_APP_NAME", "listing-analyzer"),
            vision_model,
            vision_model_online,
            category_model: string("CATEGORY_MODEL", ""),
            price_model: string("PRICE_MODEL", DEFAULT_PRICE_MODEL),
            brand_csv_path: string("BRAND_CSV_PATH", "data/brand.csv"),
            category_csv_path: string("CATEGORY_CSV_PATH", "data/category.csv"),
            request_timeout: Duration::from_secs(parse_or(lookup("REQUEST_TIMEOUT"), 60)),
            enable_debug_param: flag("ENABLE_DEBUG", true),
            max_image_bytes: parse_or(lookup("MAX_IMAGE_BYTES"), 5 * 1024 * 1024),
            allowed_mime_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
            ],
            log_llm_raw: flag("LOG_LLM_RAW", false),
            category_retry_enabled: flag("CATEGORY_LLM_RETRY_ENABLED", false),
            category_max_retries: parse_or(lookup("CATEGORY_LLM_MAX_RETRIES"), 1),
            price_bounds,
            price_strategy: PriceStrategy::parse(lookup("PRICE_STRATEGY").as_deref())
                .unwrap_or_default(),
            price_call_with_image: flag("PRICE_CALL_WITH_IMAGE", true),
        }
    }

    /// Attempt/backoff policy for the category path call.
    pub fn category_retry_policy(&self) -> RetryPolicy {
        let retries = if self.category_retry_enabled {
            self.category_max_retries
        } else {
            0
        };
        RetryPolicy::with_retries(retries)
    }
}

/// Parses straight into the target type, so out-of-range values fall back
/// instead of wrapping.
fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn online_variant(model: &str) -> String {
    if model.is_empty() || model.ends_with(ONLINE_SUFFIX) {
        model.to_string()
    } else {
        format!("{}{}", model, ONLINE_SUFFIX)
    }
}

pub fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let s = settings(&[]);
        assert_eq!(s.base_url, DEFAULT_BASE_URL);
        assert_eq!(s.price_model, DEFAULT_PRICE_MODEL);
        assert_eq!(s.request_timeout, Duration::from_secs(60));
        assert_eq!(s.max_image_bytes, 5 * 1024 * 1024);
        assert!(!s.category_retry_enabled);
        assert_eq!(s.price_strategy, PriceStrategy::Dedicated);
        assert_eq!(s.category_retry_policy().max_attempts, 1);
    }

    #[test]
    fn online_model_is_derived_from_vision_model() {
        let s = settings(&[("VISION_MODEL", "google/gemini-2.5-flash")]);
        assert_eq!(s.vision_model_online, "google/gemini-2.5-flash:online");

        let s = settings(&[("VISION_MODEL", "x/model:online")]);
        assert_eq!(s.vision_model_online, "x/model:online");

        let s = settings(&[("VISION_MODEL", "a"), ("VISION_MODEL_ONLINE", "b")]);
        assert_eq!(s.vision_model_online, "b");
    }

    #[test]
    fn retry_policy_follows_flags() {
        let s = settings(&[
            ("CATEGORY_LLM_RETRY_ENABLED", "yes"),
            ("CATEGORY_LLM_MAX_RETRIES", "2"),
        ]);
        assert_eq!(s.category_retry_policy().max_attempts, 3);

        let s = settings(&[("CATEGORY_LLM_MAX_RETRIES", "5")]);
        assert_eq!(s.category_retry_policy().max_attempts, 1);
    }

    #[test]
    fn bad_numbers_fall_back() {
        let s = settings(&[("REQUEST_TIMEOUT", "soon"), ("PRICE_MIN", "100")]);
        assert_eq!(s.request_timeout, Duration::from_secs(60));
        assert_eq!(s.price_bounds.min, 100);
    }

    #[test]
    fn oversized_numbers_fall_back() {
        let s = settings(&[
            ("PRICE_MAX", "99999999999999999999"),
            ("CATEGORY_LLM_MAX_RETRIES", "4294967297"),
            ("CATEGORY_LLM_RETRY_ENABLED", "true"),
        ]);
        assert_eq!(s.price_bounds.max, PriceBounds::default().max);
        assert_eq!(s.category_max_retries, 1);
        assert_eq!(s.category_retry_policy().max_attempts, 2);
    }

    #[test]
    fn bool_parsing() {
        assert!(parse_bool(" ON "));
        assert!(parse_bool("1"));
        assert!(!parse_bool("off"));
        assert!(!parse_bool(""));
    }
}
