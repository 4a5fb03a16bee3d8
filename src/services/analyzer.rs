// src/services/analyzer.rs
//! Runs one listing analysis end to end: vision call, field extraction,
//! brand/group resolution, category paths, then the strategy's price stage.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::catalog::CatalogSnapshot;
use crate::config::Settings;
use crate::errors::AnalyzerError;
use crate::models::*;
use crate::services::category_resolver::{
    CategoryResolver, PathResolution, clamp_limit, resolve_group,
};
use crate::services::image_processor::{ImageProcessor, to_data_url};
use crate::services::llm_service::ModelGateway;
use crate::services::price_normalizer::{PriceBounds, PriceNormalizer, PricePolicy};
use crate::services::prompts::{self, ProductContext};
use crate::services::recovery::recover_object;
use crate::services::retry::RetryPolicy;
use crate::text::compress_whitespace;

#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub vision_model: String,
    pub vision_model_online: String,
    pub category_model: String,
    pub price_model: String,
    pub price_bounds: PriceBounds,
    pub price_call_with_image: bool,
    pub log_llm_raw: bool,
}

impl AnalyzerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            vision_model: settings.vision_model.clone(),
            vision_model_online: settings.vision_model_online.clone(),
            category_model: settings.category_model.clone(),
            price_model: settings.price_model.clone(),
            price_bounds: settings.price_bounds,
            price_call_with_image: settings.price_call_with_image,
            log_llm_raw: settings.log_llm_raw,
        }
    }
}

/// What a price strategy changes in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrategyPlan {
    search_grounded_vision: bool,
    /// Policy applied to prices returned inline by the vision call.
    inline_policy: Option<PricePolicy>,
    dedicated_call: bool,
}

impl StrategyPlan {
    fn for_strategy(strategy: PriceStrategy) -> Self {
        match strategy {
            PriceStrategy::None => Self {
                search_grounded_vision: false,
                inline_policy: None,
                dedicated_call: false,
            },
            PriceStrategy::Inline => Self {
                search_grounded_vision: false,
                inline_policy: Some(PricePolicy::OrderedList),
                dedicated_call: false,
            },
            PriceStrategy::Search => Self {
                search_grounded_vision: true,
                inline_policy: Some(PricePolicy::Tiered),
                dedicated_call: false,
            },
            PriceStrategy::Dedicated => Self {
                search_grounded_vision: false,
                inline_policy: None,
                dedicated_call: true,
            },
        }
    }
}

/// Fields pulled out of the vision payload.
#[derive(Debug, Clone, Default)]
struct ExtractedFields {
    title: String,
    description: String,
    top_level_category: String,
    brand_name: String,
}

impl ExtractedFields {
    fn from_payload(payload: &Map<String, Value>) -> Self {
        Self {
            title: clean_string(payload.get("title")),
            description: clean_string(payload.get("description")),
            top_level_category: clean_string(payload.get("top_level_category")),
            brand_name: clean_string(payload.get("brand_name")),
        }
    }
}

struct PriceOutcome {
    prices: Option<PriceEstimate>,
    status: PriceStatus,
    reason: Option<String>,
    citations: Vec<Citation>,
    raw: Option<Value>,
}

impl PriceOutcome {
    fn skipped() -> Self {
        Self {
            prices: None,
            status: PriceStatus::Skipped,
            reason: None,
            citations: Vec::new(),
            raw: None,
        }
    }

    fn from_prices(prices: Option<PriceEstimate>, citations: Vec<Citation>) -> Self {
        let status = if prices.is_some() {
            PriceStatus::Ok
        } else {
            PriceStatus::Empty
        };
        Self {
            prices,
            status,
            reason: None,
            citations,
            raw: None,
        }
    }
}

pub struct ListingAnalyzer {
    catalogs: Arc<CatalogSnapshot>,
    gateway: Arc<dyn ModelGateway>,
    categories: CategoryResolver,
    prices: PriceNormalizer,
    images: Arc<ImageProcessor>,
    config: AnalyzerConfig,
}

impl ListingAnalyzer {
    pub fn new(
        catalogs: Arc<CatalogSnapshot>,
        gateway: Arc<dyn ModelGateway>,
        images: Arc<ImageProcessor>,
        config: AnalyzerConfig,
        category_retry: RetryPolicy,
    ) -> Self {
        Self {
            categories: CategoryResolver::new(gateway.clone(), category_retry, config.log_llm_raw),
            prices: PriceNormalizer::new(config.price_bounds),
            catalogs,
            gateway,
            images,
            config,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult, AnalyzerError> {
        let start = Instant::now();
        if request.image.data.is_empty() {
            return Err(AnalyzerError::Validation("Image is empty".to_string()));
        }
        let limit = clamp_limit(request.category_limit);
        let plan = StrategyPlan::for_strategy(request.strategy);
        let data_url = to_data_url(&request.image);

        // Vision
        let vision_model = pick_model(
            request.overrides.vision.as_deref(),
            if plan.search_grounded_vision {
                &self.config.vision_model_online
            } else {
                &self.config.vision_model
            },
        );
        let vision = self
            .call_for_object(
                vision_model,
                &prompts::vision_messages(request.strategy, request.language, &data_url),
                0.2,
                800,
                "vision",
            )
            .await?;
        let fields = ExtractedFields::from_payload(&vision.payload);

        // Brand and group
        let brand = self
            .catalogs
            .brands
            .find(&fields.brand_name)
            .map(|entry| BrandMatch {
                id: entry.id.clone(),
                name: entry.name.clone(),
            });
        let group = resolve_group(&fields.top_level_category);
        if group.is_none() && !fields.top_level_category.is_empty() {
            debug!("unresolved top-level category: {}", fields.top_level_category);
        }

        let brand_for_prompt = if fields.brand_name.is_empty() {
            brand.as_ref().map(|b| b.name.as_str()).unwrap_or("")
        } else {
            fields.brand_name.as_str()
        };

        // Category paths
        let category_model = pick_model(
            request.overrides.category.as_deref(),
            &self.config.category_model,
        );
        let paths = match group {
            Some(group_name) => {
                let context = ProductContext {
                    title: &fields.title,
                    description: &fields.description,
                    brand: brand_for_prompt,
                    group_name,
                };
                self.categories
                    .resolve_paths(&self.catalogs.categories, category_model, &context, limit)
                    .await?
            }
            None => PathResolution::default(),
        };

        // Price
        let price_model = pick_model(request.overrides.price.as_deref(), &self.config.price_model);
        let price = if plan.dedicated_call {
            let context = ProductContext {
                title: &fields.title,
                description: &fields.description,
                brand: brand_for_prompt,
                group_name: group.unwrap_or(""),
            };
            let image_url = self.config.price_call_with_image.then_some(data_url.as_str());
            self.dedicated_price(price_model, &context, &paths.matches, request.language, image_url)
                .await
        } else {
            match plan.inline_policy {
                Some(policy) => {
                    let raw_prices = vision.payload.get("prices").unwrap_or(&Value::Null);
                    let citations = if plan.search_grounded_vision {
                        extract_citations(&vision.raw)
                    } else {
                        Vec::new()
                    };
                    PriceOutcome::from_prices(self.prices.normalize(policy, raw_prices), citations)
                }
                None => PriceOutcome::skipped(),
            }
        };

        let elapsed = start.elapsed().as_millis() as u64;
        info!(
            "analysis done in {}ms: strategy={} group={:?} categories={} price={:?}",
            elapsed,
            request.strategy.as_str(),
            group,
            paths.matches.len(),
            price.status
        );

        let debug = request.debug.then(|| DebugInfo {
            vision_raw: Value::Object(vision.payload.clone()),
            group_name: group.map(str::to_string),
            category_raw: paths.raw.clone(),
            price_raw: price.raw.clone(),
        });

        Ok(AnalysisResult {
            id: Uuid::new_v4(),
            title: fields.title,
            description: fields.description,
            brand,
            group_name: group.map(str::to_string),
            categories: paths.matches,
            prices: price.prices,
            price_status: price.status,
            price_reason: price.reason,
            citations: price.citations,
            strategy: request.strategy,
            metadata: AnalysisMetadata {
                processing_time_ms: elapsed,
                vision_model: vision_model.to_string(),
                category_model: paths.raw.is_some().then(|| category_model.to_string()),
                price_model: plan.dedicated_call.then(|| price_model.to_string()),
            },
            created_at: chrono::Utc::now(),
            debug,
        })
    }

    /// Title-only classification, falling back to the image pipeline when the
    /// title alone does not yield a catalog path.
    pub async fn analyze_title(
        &self,
        request: TitleAnalysisRequest,
    ) -> Result<TitleAnalysisResult, AnalyzerError> {
        let start = Instant::now();
        let title = compress_whitespace(&request.title);
        if title.is_empty() {
            return Err(AnalyzerError::Validation("Title is required".to_string()));
        }
        let limit = clamp_limit(request.category_limit);
        let category_model = pick_model(
            request.category_model.as_deref(),
            &self.config.category_model,
        )
        .to_string();

        let (group, matches, source) = match self.categories_from_title(&title, &category_model, limit).await {
            Ok((Some(group), matches)) if !matches.is_empty() => {
                (Some(group.to_string()), matches, ResolutionSource::Title)
            }
            outcome => {
                let reason = match &outcome {
                    Err(e) => e.to_string(),
                    Ok((None, _)) => "top-level category unresolved".to_string(),
                    Ok((Some(_), _)) => "no catalog path selected".to_string(),
                };
                let image_url = request
                    .image_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|u| !u.is_empty());
                let Some(image_url) = image_url else {
                    return Err(match outcome {
                        Err(e) => e,
                        Ok(_) => AnalyzerError::Unresolved(reason),
                    });
                };
                warn!("title classification failed ({}), falling back to image", reason);

                let image = self.images.fetch(image_url).await?;
                let analysis = self
                    .analyze(AnalysisRequest {
                        image,
                        language: request.language,
                        strategy: PriceStrategy::None,
                        category_limit: limit,
                        overrides: ModelOverrides {
                            category: Some(category_model.clone()),
                            ..Default::default()
                        },
                        debug: false,
                    })
                    .await?;
                if analysis.categories.is_empty() {
                    return Err(AnalyzerError::Unresolved(format!(
                        "{}; image fallback found no category",
                        reason
                    )));
                }
                (
                    analysis.group_name,
                    analysis.categories,
                    ResolutionSource::ImageFallback,
                )
            }
        };

        let best = &matches[0];
        Ok(TitleAnalysisResult {
            id: Uuid::new_v4(),
            best_target_path: best.name.clone(),
            best_category_id: best.id.clone(),
            alternatives: matches[1..]
                .iter()
                .map(|m| CategoryAlternative {
                    target_path: m.name.clone(),
                    category_id: m.id.clone(),
                })
                .collect(),
            title,
            group_name: group,
            categories: matches,
            source,
            processing_time_ms: start.elapsed().as_millis() as u64,
            created_at: chrono::Utc::now(),
        })
    }

    async fn categories_from_title(
        &self,
        title: &str,
        model: &str,
        limit: usize,
    ) -> Result<(Option<&'static str>, Vec<CategoryMatch>), AnalyzerError> {
        let (group, _) = self.categories.classify_group(model, title).await?;
        let Some(group_name) = group else {
            return Ok((None, Vec::new()));
        };
        let context = ProductContext {
            title,
            group_name,
            ..Default::default()
        };
        let paths = self
            .categories
            .resolve_paths(&self.catalogs.categories, model, &context, limit)
            .await?;
        Ok((Some(group_name), paths.matches))
    }

    /// Price-focused second call. Never fails the request: errors become a
    /// `Failed` status with the reason recorded.
    async fn dedicated_price(
        &self,
        model: &str,
        context: &ProductContext<'_>,
        categories: &[CategoryMatch],
        language: Language,
        image_url: Option<&str>,
    ) -> PriceOutcome {
        let names: Vec<&str> = categories.iter().map(|c| c.name.as_str()).collect();
        let messages = prompts::price_messages(context, &names, language, image_url);
        let result = match self.call_for_object(model, &messages, 0.2, 600, "price").await {
            Ok(result) => result,
            Err(e) => {
                warn!("dedicated price call failed: {}", e);
                return PriceOutcome {
                    prices: None,
                    status: PriceStatus::Failed,
                    reason: Some(e.to_string()),
                    citations: Vec::new(),
                    raw: None,
                };
            }
        };

        let payload = Value::Object(result.payload);
        let raw_prices = payload.get("prices").unwrap_or(&payload);
        let mut outcome = PriceOutcome::from_prices(
            self.prices.normalize(PricePolicy::Tiered, raw_prices),
            extract_citations(&result.raw),
        );
        outcome.reason = payload
            .get("reason")
            .and_then(Value::as_str)
            .map(compress_whitespace)
            .filter(|r| !r.is_empty());
        outcome.raw = Some(payload);
        outcome
    }

    async fn call_for_object(
        &self,
        model: &str,
        messages: &[ModelMessage],
        temperature: f32,
        max_tokens: u32,
        stage: &str,
    ) -> Result<RawModelResult, AnalyzerError> {
        let reply = self
            .gateway
            .chat(model, messages, temperature, max_tokens)
            .await?;
        if self.config.log_llm_raw {
            debug!("{} reply: {}", stage, reply.text);
        }
        let payload = recover_object(&reply.text)?;
        Ok(RawModelResult {
            payload,
            raw: reply.raw,
        })
    }
}

fn pick_model<'a>(override_model: Option<&'a str>, default: &'a str) -> &'a str {
    override_model
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(default)
}

fn clean_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => compress_whitespace(s),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Source references from `url_citation` annotations (or a bare top-level
/// `citations` url list), deduplicated by url.
pub fn extract_citations(raw: &Value) -> Vec<Citation> {
    let mut seen = HashSet::new();
    let mut citations = Vec::new();

    let annotations = raw
        .pointer("/choices/0/message/annotations")
        .and_then(Value::as_array);
    for annotation in annotations.into_iter().flatten() {
        if annotation.get("type").and_then(Value::as_str) != Some("url_citation") {
            continue;
        }
        let Some(cite) = annotation.get("url_citation") else {
            continue;
        };
        let text = |key: &str| cite.get(key).and_then(Value::as_str).unwrap_or("").trim().to_string();
        let url = text("url");
        if url.is_empty() || !seen.insert(url.clone()) {
            continue;
        }
        citations.push(Citation {
            url,
            title: text("title"),
            snippet: text("content"),
        });
    }

    let bare = raw.get("citations").and_then(Value::as_array);
    for url in bare.into_iter().flatten().filter_map(Value::as_str) {
        let url = url.trim().to_string();
        if url.is_empty() || !seen.insert(url.clone()) {
            continue;
        }
        citations.push(Citation {
            url,
            title: String::new(),
            snippet: String::new(),
        });
    }
    citations
}
