// src/handlers.rs
use std::collections::HashMap;

use actix_multipart::Multipart;
use actix_web::{HttpResponse, web};
use futures_util::TryStreamExt;
use log::info;
use serde::Deserialize;

use crate::services::category_resolver::{MAX_CATEGORY_LIMIT, clamp_limit};
use crate::{AppState, config::parse_bool, errors::AnalyzerError, models::*};

const MAX_TEXT_FIELD_BYTES: usize = 4096;
const DEFAULT_CATEGORY_COUNT: usize = 1;

/// Uploaded file plus the plain text fields of the form.
#[derive(Default)]
struct AnalyzeForm {
    image: Option<ImageInput>,
    fields: HashMap<String, String>,
}

impl AnalyzeForm {
    fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

async fn read_form(mut payload: Multipart, max_image_bytes: usize) -> Result<AnalyzeForm, AnalyzerError> {
    let mut form = AnalyzeForm::default();

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| AnalyzerError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().to_string();
        let limit = if name == "image" {
            max_image_bytes
        } else {
            MAX_TEXT_FIELD_BYTES
        };
        let content_type = field
            .content_type()
            .map(|ct| ct.essence_str().to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let mut data = Vec::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| AnalyzerError::Validation(format!("Failed to read field {}: {}", name, e)))?
        {
            data.extend_from_slice(&chunk);
            if data.len() > limit {
                return Err(AnalyzerError::Validation(format!("Field {} is too large", name)));
            }
        }

        if name == "image" {
            form.image = Some(ImageInput {
                data,
                mime_type: content_type,
            });
        } else {
            let value = String::from_utf8(data)
                .map_err(|_| AnalyzerError::Validation(format!("Field {} is not UTF-8", name)))?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

/// Out-of-range counts are clamped, not rejected.
fn clamp_count(count: i64) -> usize {
    clamp_limit(usize::try_from(count.max(1)).unwrap_or(MAX_CATEGORY_LIMIT))
}

fn parse_count(raw: Option<&str>) -> Result<usize, AnalyzerError> {
    match raw {
        None => Ok(DEFAULT_CATEGORY_COUNT),
        Some(raw) => raw
            .parse::<i64>()
            .map(clamp_count)
            .map_err(|_| AnalyzerError::Validation(format!("Invalid category_count: {}", raw))),
    }
}

pub async fn analyze_image(
    payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, AnalyzerError> {
    let settings = &data.settings;
    let mut form = read_form(payload, settings.max_image_bytes).await?;

    let image = form
        .image
        .take()
        .ok_or_else(|| AnalyzerError::Validation("Image file is required".to_string()))?;
    data.images.validate_upload(&image.data, &image.mime_type)?;

    let language = Language::parse(form.text("language"))?;
    let strategy = match form.text("price_strategy") {
        Some(raw) => PriceStrategy::parse(Some(raw))?,
        None => settings.price_strategy,
    };
    let debug = settings.enable_debug_param && form.text("debug").is_some_and(parse_bool);

    let request = AnalysisRequest {
        image,
        language,
        strategy,
        category_limit: parse_count(form.text("category_count"))?,
        overrides: ModelOverrides {
            vision: form.text("vision_model").map(str::to_string),
            category: form.text("category_model").map(str::to_string),
            price: form.text("price_model").map(str::to_string),
        },
        debug,
    };

    let result = data.analyzer.analyze(request).await?;
    info!(
        "image analysis {} finished in {}ms",
        result.id, result.metadata.processing_time_ms
    );
    Ok(HttpResponse::Ok().json(&result))
}

#[derive(Debug, Deserialize)]
pub struct TitleAnalyzeBody {
    pub title: String,
    pub language: Option<String>,
    pub image_url: Option<String>,
    pub category_count: Option<i64>,
    pub category_model: Option<String>,
}

pub async fn analyze_title(
    body: web::Json<TitleAnalyzeBody>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, AnalyzerError> {
    let body = body.into_inner();
    let request = TitleAnalysisRequest {
        language: Language::parse(body.language.as_deref())?,
        title: body.title,
        image_url: body.image_url,
        category_limit: body
            .category_count
            .map(clamp_count)
            .unwrap_or(DEFAULT_CATEGORY_COUNT),
        category_model: body.category_model,
    };

    let result = data.analyzer.analyze_title(request).await?;
    info!(
        "title analysis {} resolved via {:?} in {}ms",
        result.id, result.source, result.processing_time_ms
    );
    Ok(HttpResponse::Ok().json(&result))
}

pub async fn health(data: web::Data<AppState>) -> HttpResponse {
    let config = data.analyzer.config();
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "listing-analyzer",
        "version": env!("CARGO_PKG_VERSION"),
        "models": {
            "vision_model": config.vision_model,
            "vision_model_online": config.vision_model_online,
            "category_model": config.category_model,
            "price_model": config.price_model,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_count_defaults_clamps_and_rejects_garbage() {
        assert_eq!(parse_count(None).unwrap(), 1);
        assert_eq!(parse_count(Some("3")).unwrap(), 3);
        assert_eq!(parse_count(Some("-1")).unwrap(), 1);
        assert_eq!(parse_count(Some("0")).unwrap(), 1);
        assert_eq!(parse_count(Some("10")).unwrap(), 3);
        assert!(matches!(
            parse_count(Some("three")),
            Err(AnalyzerError::Validation(_))
        ));
    }

    #[test]
    fn title_body_count_is_clamped() {
        let body: TitleAnalyzeBody =
            serde_json::from_str(r#"{"title": "x", "category_count": -1}"#).unwrap();
        assert_eq!(body.category_count.map(clamp_count), Some(1));
        assert_eq!(clamp_count(i64::MAX), 3);
    }

    #[test]
    fn blank_form_fields_read_as_absent() {
        let mut form = AnalyzeForm::default();
        form.fields.insert("language".into(), "  ".into());
        form.fields.insert("vision_model".into(), " m/x ".into());
        assert_eq!(form.text("language"), None);
        assert_eq!(form.text("vision_model"), Some("m/x"));
        assert_eq!(form.text("missing"), None);
    }
}
