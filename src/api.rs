// src/api.rs
//! Public HTTP surface: the search endpoint, the image proxy and a feed
//! debug route. The contract everywhere is "always answer 200 with a valid
//! body" — failures degrade to empty result sets or a placeholder image,
//! never to a transport-level error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tracing::{debug, error};

use crate::aggregate::{SearchEngine, SearchOutcome};
use crate::textnorm::parse_locale_number;

const IMAGE_PROXY_UA: &str = "VinbotImageProxy/1.0 (+https://vinbot.dk)";
const IMAGE_PROXY_REFERER: &str = "https://vinbot.dk/";
const CACHE_LONG: &str = "public, max-age=86400";
const CACHE_SHORT: &str = "public, max-age=600";

/// Neutral bottle silhouette served whenever the proxied image cannot be
/// produced, so clients never render a broken-image state.
const PLACEHOLDER_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="120" height="160" viewBox="0 0 120 160"><rect width="120" height="160" fill="#f4f1ec"/><path d="M54 18h12v26c0 8 10 12 10 24v66a8 8 0 0 1-8 8H52a8 8 0 0 1-8-8V68c0-12 10-16 10-24z" fill="#d8d2c7"/></svg>"##;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    img_client: reqwest::Client,
}

impl AppState {
    pub fn new(engine: Arc<SearchEngine>) -> Self {
        let img_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(8))
            .build()
            .expect("reqwest client");
        Self { engine, img_client }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/search", get(search))
        .route("/img", get(img))
        // Same handlers under the /api prefix the site frontend uses.
        .route("/api/search", get(search))
        .route("/api/img", get(img))
        .route("/debug/feed", get(debug_feed))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

/// `GET /search?q=<text>&max=<number>&mock=1`
///
/// Parameters are read leniently from the raw query map; a malformed `max`
/// is ignored rather than rejected.
async fn search(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<SearchOutcome> {
    let q = params
        .get("q")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    let mock = params.get("mock").map(|v| v == "1").unwrap_or(false);

    if mock {
        return Json(state.engine.sample_outcome());
    }
    if q.is_empty() {
        // No query and no mock flag: answer immediately, no feed fan-out.
        return Json(SearchOutcome::empty());
    }

    let max = params.get("max").and_then(|v| parse_locale_number(v));

    // Request-boundary guard: a panicking pipeline must still produce JSON.
    let engine = state.engine.clone();
    let query = q.clone();
    match tokio::spawn(async move { engine.search(&query, max).await }).await {
        Ok(outcome) => Json(outcome),
        Err(e) => {
            error!(error = ?e, query = %q, "search pipeline aborted");
            Json(SearchOutcome::error())
        }
    }
}

/// `GET /img?src=<url-encoded absolute URL>`
///
/// Server-side image fetch with a fixed identity, streamed back with a long
/// cache lifetime. Every failure path returns the placeholder with 200.
async fn img(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let src = params.get("src").map(String::as_str).unwrap_or_default();
    if !(src.starts_with("http://") || src.starts_with("https://")) {
        return placeholder_image();
    }

    match fetch_image(&state.img_client, src).await {
        Ok((content_type, bytes)) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type),
                (header::CACHE_CONTROL, CACHE_LONG.to_string()),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            debug!(error = ?e, src = %src, "image proxy fetch failed");
            placeholder_image()
        }
    }
}

async fn fetch_image(client: &reqwest::Client, src: &str) -> anyhow::Result<(String, Vec<u8>)> {
    let resp = client
        .get(src)
        .header(header::USER_AGENT, IMAGE_PROXY_UA)
        .header(header::REFERER, IMAGE_PROXY_REFERER)
        .send()
        .await?;
    if !resp.status().is_success() {
        anyhow::bail!("upstream image status {}", resp.status());
    }
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .filter(|ct| ct.chars().all(|c| c.is_ascii_graphic() || c == ' '))
        .unwrap_or("image/jpeg")
        .to_string();
    let bytes = resp.bytes().await?.to_vec();
    Ok((content_type, bytes))
}

fn placeholder_image() -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/svg+xml".to_string()),
            (header::CACHE_CONTROL, CACHE_SHORT.to_string()),
        ],
        PLACEHOLDER_SVG.as_bytes().to_vec(),
    )
        .into_response()
}

/// `GET /debug/feed?index=N` — fetch one configured feed and report how it
/// decodes. Mirrors the shape the frontend debug page expects.
async fn debug_feed(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let index = params
        .get("index")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    Json(state.engine.debug_feed(index).await)
}
