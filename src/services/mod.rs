// src/services/mod.rs
pub mod analyzer;
pub mod brand_matcher;
pub mod category_resolver;
pub mod image_processor;
pub mod llm_service;
pub mod price_normalizer;
pub mod prompts;
pub mod recovery;
pub mod retry;

#[cfg(test)]
pub mod testing;

pub use analyzer::{AnalyzerConfig, ListingAnalyzer};
pub use image_processor::ImageProcessor;
pub use llm_service::{GatewayConfig, ModelGateway, OpenRouterGateway};
