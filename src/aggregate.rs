// src/aggregate.rs
//! # Feed aggregation
//!
//! The orchestrator behind `/search`: plans the query, fans out to every
//! configured feed concurrently, runs the per-source decode → extract →
//! normalize → classify → price/term-filter pipeline, then merges, dedups,
//! ranks and truncates. When nothing matches, the merchant directory provides
//! search links instead. Any per-source failure contributes zero products;
//! nothing in here may take the whole request down.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::{FeedSource, SearchConfig};
use crate::enrich;
use crate::feed::classify::WineClassifier;
use crate::feed::decode::extract_records;
use crate::feed::product::{build_product, Product};
use crate::fetch::{FeedFetch, FeedPayload};
use crate::merchants::MerchantDirectory;
use crate::query::{QueryPlan, QueryPlanner};
use crate::ranking::rank;
use crate::textnorm::decode_payload_text;

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("search_requests_total", "Search requests served.");
        describe_counter!("search_feed_errors_total", "Feed fetch/timeout errors.");
        describe_counter!("search_fallback_total", "Responses served from merchant fallback links.");
        describe_histogram!("search_feed_parse_ms", "Per-feed decode+normalize time in milliseconds.");
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Feed,
    Fallback,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchMeta {
    pub terms: Vec<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub feeds_ok: usize,
    pub feeds_failed: usize,
    pub elapsed_ms: u64,
}

/// The search endpoint's whole response body. `products` holds feed products
/// or fallback merchant links, serialized to the same outward shape.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub source: ResponseSource,
    pub products: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<SearchMeta>,
}

impl SearchOutcome {
    pub fn empty() -> Self {
        Self {
            source: ResponseSource::Feed,
            products: Vec::new(),
            meta: None,
        }
    }

    pub fn error() -> Self {
        Self {
            source: ResponseSource::Error,
            products: Vec::new(),
            meta: None,
        }
    }
}

fn to_values<T: Serialize>(items: &[T]) -> Vec<serde_json::Value> {
    items
        .iter()
        .filter_map(|i| serde_json::to_value(i).ok())
        .collect()
}

pub struct SearchEngine {
    cfg: Arc<SearchConfig>,
    planner: QueryPlanner,
    classifier: Arc<WineClassifier>,
    directory: MerchantDirectory,
    fetcher: Arc<dyn FeedFetch>,
    page_client: reqwest::Client,
}

impl SearchEngine {
    pub fn new(
        cfg: SearchConfig,
        fetcher: Arc<dyn FeedFetch>,
        directory: MerchantDirectory,
    ) -> anyhow::Result<Self> {
        ensure_metrics_described();
        let planner = QueryPlanner::from_config(&cfg.query)?;
        let classifier = Arc::new(WineClassifier::from_config(&cfg.classifier));
        let page_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("reqwest client");
        Ok(Self {
            cfg: Arc::new(cfg),
            planner,
            classifier,
            directory,
            fetcher,
            page_client,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.cfg
    }

    /// Serve one search request. Infallible by design: every error path
    /// degrades to fewer products, fallback links, or an empty error shape.
    pub async fn search(&self, raw_query: &str, external_max: Option<f64>) -> SearchOutcome {
        let started = Instant::now();
        counter!("search_requests_total").increment(1);

        let plan = self.planner.plan(raw_query, external_max);

        let mut tasks: JoinSet<Option<Vec<Product>>> = JoinSet::new();
        for feed in self.cfg.feeds.iter().cloned() {
            let fetcher = self.fetcher.clone();
            let cfg = self.cfg.clone();
            let classifier = self.classifier.clone();
            let plan = plan.clone();
            let timeout = Duration::from_secs(cfg.search.fetch_timeout_secs);
            tasks.spawn(async move {
                let payload = match tokio::time::timeout(timeout, fetcher.fetch(&feed.url)).await {
                    Ok(Ok(payload)) => payload,
                    Ok(Err(e)) => {
                        warn!(error = ?e, merchant = %feed.merchant, "feed fetch failed");
                        counter!("search_feed_errors_total").increment(1);
                        return None;
                    }
                    Err(_) => {
                        warn!(merchant = %feed.merchant, "feed fetch timed out");
                        counter!("search_feed_errors_total").increment(1);
                        return None;
                    }
                };
                let t0 = Instant::now();
                let products = process_feed(&cfg, &classifier, &feed, &payload, &plan);
                histogram!("search_feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
                Some(products)
            });
        }

        let mut merged: Vec<Product> = Vec::new();
        let mut feeds_ok = 0usize;
        let mut feeds_failed = 0usize;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(products)) => {
                    feeds_ok += 1;
                    merged.extend(products);
                }
                Ok(None) => feeds_failed += 1,
                Err(e) => {
                    warn!(error = ?e, "feed task failed to join");
                    feeds_failed += 1;
                }
            }
        }

        dedup_by_url(&mut merged);
        let ranked = rank(merged, &plan);
        let mut top: Vec<Product> = ranked
            .into_iter()
            .take(self.cfg.search.result_limit)
            .collect();

        let make_meta = || SearchMeta {
            terms: plan.terms.clone(),
            price_min: plan.price_min,
            price_max: plan.price_max,
            feeds_ok,
            feeds_failed,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        if !top.is_empty() {
            enrich::backfill_images(&self.page_client, &mut top, self.cfg.search.enrich_limit)
                .await;
            info!(
                query = %raw_query,
                products = top.len(),
                feeds_ok,
                feeds_failed,
                "search served from feeds"
            );
            return SearchOutcome {
                source: ResponseSource::Feed,
                products: to_values(&top),
                meta: Some(make_meta()),
            };
        }

        counter!("search_fallback_total").increment(1);
        let links = self
            .directory
            .links_for_query(raw_query, self.cfg.search.fallback_limit);
        info!(query = %raw_query, links = links.len(), "search fell back to merchant links");
        SearchOutcome {
            source: ResponseSource::Fallback,
            products: to_values(&links),
            meta: Some(make_meta()),
        }
    }

    /// Deterministic sample products for the UI mock flag; no network.
    pub fn sample_outcome(&self) -> SearchOutcome {
        let samples = [
            ("Barolo DOCG 2019", 249.0, "https://img.example/barolo.jpg"),
            ("Rioja Reserva", 149.0, "https://img.example/rioja.jpg"),
            ("Chablis Premier Cru", 189.0, "https://img.example/chablis.jpg"),
        ];
        let products: Vec<Product> = samples
            .into_iter()
            .map(|(title, price, image)| {
                let mut p = Product {
                    merchant: "Demo".to_string(),
                    title: title.to_string(),
                    url: format!(
                        "https://vinbot.dk/demo/{}",
                        title.to_lowercase().replace(' ', "-")
                    ),
                    image: Some(crate::feed::product::proxy_image_url(image)),
                    price: Some(price),
                    currency: self.cfg.search.default_currency.clone(),
                    brand: String::new(),
                    category: String::new(),
                    description: String::new(),
                    search_text: String::new(),
                };
                p.recompute_search_text();
                p
            })
            .collect();
        SearchOutcome {
            source: ResponseSource::Feed,
            products: to_values(&products),
            meta: None,
        }
    }

    /// Debug helper mirroring the feed-test endpoint: fetch one configured
    /// feed and report how it decodes. Always returns a JSON value.
    pub async fn debug_feed(&self, index: usize) -> serde_json::Value {
        let Some(feed) = self.cfg.feeds.get(index) else {
            return serde_json::json!({ "ok": false, "error": "no such feed index" });
        };
        let timeout = Duration::from_secs(self.cfg.search.fetch_timeout_secs);
        let payload = match tokio::time::timeout(timeout, self.fetcher.fetch(&feed.url)).await {
            Ok(Ok(p)) => p,
            Ok(Err(e)) => {
                return serde_json::json!({ "ok": false, "merchant": feed.merchant, "error": e.to_string() })
            }
            Err(_) => {
                return serde_json::json!({ "ok": false, "merchant": feed.merchant, "error": "timeout" })
            }
        };
        let text = decode_payload_text(&payload.bytes, payload.charset.as_deref());
        let records = extract_records(&text, &self.cfg.decoder);
        let sample: Vec<serde_json::Value> = records
            .iter()
            .take(5)
            .map(|r| {
                serde_json::json!({
                    "title": crate::feed::fields::resolve_field(r, &self.cfg.fields.title),
                    "url": crate::feed::fields::resolve_field(r, &self.cfg.fields.url),
                    "image": crate::feed::fields::resolve_field(r, &self.cfg.fields.image),
                })
            })
            .collect();
        serde_json::json!({
            "ok": true,
            "merchant": feed.merchant,
            "count": records.len(),
            "sample": sample,
        })
    }
}

/// Per-source pipeline: decode text, extract records, normalize, classify,
/// then filter on price bounds and term match. Pure apart from the payload,
/// so tests can drive it directly.
pub fn process_feed(
    cfg: &SearchConfig,
    classifier: &WineClassifier,
    feed: &FeedSource,
    payload: &FeedPayload,
    plan: &QueryPlan,
) -> Vec<Product> {
    let text = decode_payload_text(&payload.bytes, payload.charset.as_deref());
    let records = extract_records(&text, &cfg.decoder);

    let mut out = Vec::with_capacity(records.len());
    for record in &records {
        let Some(product) = build_product(record, &feed.merchant, cfg) else {
            continue;
        };
        if !classifier.is_wine_like(&product) {
            continue;
        }
        if !plan.price_allows(product.price) {
            continue;
        }
        if !plan.matches_text(&product.search_text) {
            continue;
        }
        out.push(product);
    }
    out
}

/// Identical products reappearing across feeds collapse onto their first
/// occurrence.
fn dedup_by_url(products: &mut Vec<Product>) {
    let mut seen: HashSet<String> = HashSet::with_capacity(products.len());
    products.retain(|p| seen.insert(p.url.clone()));
}
