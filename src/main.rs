//! Wine Feed Search — Binary Entrypoint
//! Boots the Axum HTTP server, wiring the search engine, routes and metrics.
//!
//! See `README.md` for quickstart and `config/search.toml` for the editorial
//! tables (feeds, synonyms, classifier terms).

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vinbot_search::aggregate::SearchEngine;
use vinbot_search::api::{self, AppState};
use vinbot_search::config::SearchConfig;
use vinbot_search::fetch::HttpFeedFetcher;
use vinbot_search::merchants::MerchantDirectory;
use vinbot_search::metrics::Metrics;

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - SEARCH_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("SEARCH_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("vinbot_search=info,warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    // Initialize dev tracing early (no-op in production).
    enable_dev_tracing();

    let cfg = SearchConfig::load().expect("failed to load search config");
    let feed_count = cfg.feeds.len();

    let fetcher = Arc::new(HttpFeedFetcher::new(cfg.search.fetch_timeout_secs));
    let directory = MerchantDirectory::load_default();
    let engine =
        SearchEngine::new(cfg, fetcher, directory).expect("failed to build search engine");

    let metrics = Metrics::init(feed_count);
    let state = AppState::new(Arc::new(engine));
    let router = api::router(state).merge(metrics.router());

    Ok(router.into())
}
