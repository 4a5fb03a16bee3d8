// src/main.rs
use actix_web::{App, HttpServer, middleware, web};
use anyhow::Context;
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;

mod catalog;
mod config;
mod errors;
mod handlers;
mod models;
mod services;
mod text;

use crate::catalog::CatalogSnapshot;
use crate::config::Settings;
use crate::handlers::{analyze_image, analyze_title, health};
use crate::services::{
    AnalyzerConfig, GatewayConfig, ImageProcessor, ListingAnalyzer, ModelGateway,
    OpenRouterGateway,
};

#[derive(Clone)]
pub struct AppState {
    settings: Arc<Settings>,
    analyzer: Arc<ListingAnalyzer>,
    images: Arc<ImageProcessor>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting listing analyzer...");

    let settings = Arc::new(Settings::from_env());
    if settings.api_key.is_empty() {
        warn!("OPENROUTER_API_KEY is not set; model calls will fail");
    }

    // Catalogs are loaded once and shared read-only.
    let catalogs = Arc::new(
        CatalogSnapshot::load(
            Path::new(&settings.brand_csv_path),
            Path::new(&settings.category_csv_path),
        )
        .context("failed to load catalogs")?,
    );

    let gateway: Arc<dyn ModelGateway> = Arc::new(
        OpenRouterGateway::new(GatewayConfig {
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.clone(),
            timeout: settings.request_timeout,
            referer: settings.referer.clone(),
            app_name: settings.app_name.clone(),
        })
        .context("failed to build model gateway")?,
    );
    let images = Arc::new(
        ImageProcessor::new(
            settings.max_image_bytes,
            settings.allowed_mime_types.clone(),
            settings.request_timeout,
        )
        .context("failed to build image fetcher")?,
    );
    let analyzer = Arc::new(ListingAnalyzer::new(
        catalogs,
        gateway,
        images.clone(),
        AnalyzerConfig::from_settings(&settings),
        settings.category_retry_policy(),
    ));

    let app_state = AppState {
        settings: settings.clone(),
        analyzer,
        images,
    };

    info!("Starting HTTP server on {}", settings.bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .service(
                web::scope("/api/v1/mercari")
                    .route("/image/analyze", web::post().to(analyze_image))
                    .route("/title/analyze", web::post().to(analyze_title)),
            )
            .route("/health", web::get().to(health))
    })
    .bind(settings.bind_addr.as_str())?
    .run()
    .await?;

    Ok(())
}
