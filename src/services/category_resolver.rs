// src/services/category_resolver.rs
use std::collections::HashSet;
use std::sync::Arc;

use log::debug;
use serde_json::{Map, Value};

use crate::catalog::CategoryCatalog;
use crate::errors::AnalyzerError;
use crate::models::CategoryMatch;
use crate::services::llm_service::ModelGateway;
use crate::services::prompts::{self, ProductContext};
use crate::services::recovery::recover_object;
use crate::services::retry::RetryPolicy;
use crate::text::{DEFAULT_SIMILARITY_CUTOFF, best_match, compress_whitespace, normalize_label};

/// The fixed set of top-level marketplace groups.
pub const TOP_LEVEL_GROUPS: [&str; 22] = [
    "キッチン・日用品・その他",
    "ゲーム・おもちゃ・グッズ",
    "スポーツ",
    "ファッション",
    "車・バイク・自転車",
    "ホビー・楽器・アート",
    "アウトドア・釣り・旅行用品",
    "ハンドメイド・手芸",
    "DIY・工具",
    "ベビー・キッズ",
    "家具・インテリア",
    "ペット用品",
    "ダイエット・健康",
    "コスメ・美容",
    "スマホ・タブレット・パソコン",
    "テレビ・オーディオ・カメラ",
    "フラワー・ガーデニング",
    "生活家電・空調",
    "チケット",
    "本・雑誌・漫画",
    "CD・DVD・ブルーレイ",
    "食品・飲料・酒",
];

pub const MAX_CATEGORY_LIMIT: usize = 3;

pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_CATEGORY_LIMIT)
}

pub fn resolve_group(raw: &str) -> Option<&'static str> {
    resolve_group_with(raw, DEFAULT_SIMILARITY_CUTOFF)
}

/// Maps a free-text label onto [`TOP_LEVEL_GROUPS`]: exact normalized match,
/// then the most similar group at or above `cutoff`.
pub fn resolve_group_with(raw: &str, cutoff: f64) -> Option<&'static str> {
    let normalized = normalize_label(strip_enumerator(raw));
    if normalized.is_empty() {
        return None;
    }
    let keys: Vec<String> = TOP_LEVEL_GROUPS.iter().map(|g| normalize_label(g)).collect();
    if let Some(idx) = keys.iter().position(|k| *k == normalized) {
        return Some(TOP_LEVEL_GROUPS[idx]);
    }
    best_match(&normalized, keys.iter().map(String::as_str), cutoff)
        .map(|(idx, _)| TOP_LEVEL_GROUPS[idx])
}

/// Drops a list marker such as "4. " that models copy from numbered prompts.
fn strip_enumerator(raw: &str) -> &str {
    let trimmed = raw.trim();
    let rest = trimmed.trim_start_matches(|c: char| c.is_ascii_digit());
    if rest.len() == trimmed.len() {
        return trimmed;
    }
    match rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
        Some(rest) => rest.trim_start(),
        None => trimmed,
    }
}

/// Outcome of one path resolution.
#[derive(Debug, Clone, Default)]
pub struct PathResolution {
    pub matches: Vec<CategoryMatch>,
    /// Parsed model payload, when a call was made.
    pub raw: Option<Value>,
}

pub struct CategoryResolver {
    gateway: Arc<dyn ModelGateway>,
    retry: RetryPolicy,
    log_raw: bool,
}

impl CategoryResolver {
    pub fn new(gateway: Arc<dyn ModelGateway>, retry: RetryPolicy, log_raw: bool) -> Self {
        Self {
            gateway,
            retry,
            log_raw,
        }
    }

    /// Asks the model to pick paths from the group's candidates, retrying per
    /// the policy. Only catalog paths survive.
    pub async fn resolve_paths(
        &self,
        catalog: &CategoryCatalog,
        model: &str,
        context: &ProductContext<'_>,
        limit: usize,
    ) -> Result<PathResolution, AnalyzerError> {
        let candidates = catalog.by_group(context.group_name);
        if candidates.is_empty() {
            debug!("no catalog candidates for group {}", context.group_name);
            return Ok(PathResolution::default());
        }
        let paths: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
        let messages = prompts::category_messages(context, &paths);

        let messages = &messages;
        let gateway = self.gateway.as_ref();
        let log_raw = self.log_raw;
        let payload = self
            .retry
            .run("category path", move |attempt| async move {
                let reply = gateway.chat(model, messages, 0.1, 600).await?;
                if log_raw {
                    debug!("category reply (attempt {}): {}", attempt, reply.text);
                }
                recover_object(&reply.text)
            })
            .await?;

        let matches = select_paths(catalog, context.group_name, &payload, limit);
        Ok(PathResolution {
            matches,
            raw: Some(Value::Object(payload)),
        })
    }

    /// Lightweight group-only classification from a listing title.
    pub async fn classify_group(
        &self,
        model: &str,
        title: &str,
    ) -> Result<(Option<&'static str>, Value), AnalyzerError> {
        let reply = self
            .gateway
            .chat(model, &prompts::group_messages(title), 0.0, 200)
            .await?;
        if self.log_raw {
            debug!("group reply: {}", reply.text);
        }
        let payload = recover_object(&reply.text)?;
        let group = payload
            .get("top_level_category")
            .and_then(Value::as_str)
            .and_then(resolve_group);
        Ok((group, Value::Object(payload)))
    }
}

/// Best path first, then alternatives in model order; deduplicated, limited,
/// and restricted to paths the catalog holds for `group`.
pub fn select_paths(
    catalog: &CategoryCatalog,
    group: &str,
    payload: &Map<String, Value>,
    limit: usize,
) -> Vec<CategoryMatch> {
    let mut ordered: Vec<&str> = Vec::new();
    if let Some(best) = payload.get("best_target_path").and_then(Value::as_str) {
        ordered.push(best);
    }
    if let Some(Value::Array(alternatives)) = payload.get("alternatives") {
        for alt in alternatives {
            let path = match alt {
                Value::Object(obj) => obj.get("target_path").and_then(Value::as_str),
                Value::String(path) => Some(path.as_str()),
                _ => None,
            };
            ordered.extend(path);
        }
    }

    let limit = clamp_limit(limit);
    let group_key = normalize_label(group);
    let mut seen = HashSet::new();
    let mut results = Vec::new();
    for path in ordered {
        let clean = compress_whitespace(path);
        if clean.is_empty() || !seen.insert((group_key.clone(), normalize_label(&clean))) {
            continue;
        }
        match catalog.find(group, &clean) {
            Some(entry) => results.push(CategoryMatch {
                id: entry.id.clone(),
                name: entry.name.clone(),
            }),
            None => debug!("discarding path outside catalog group {}", group),
        }
        if results.len() >= limit {
            break;
        }
    }
    results
}
