// src/feed/product.rs
//! Canonical product construction from raw feed records: required-field
//! gating, locale price parsing, currency inference, and image URL
//! resolution behind the local image proxy.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use url::Url;

use crate::config::SearchConfig;
use crate::feed::decode::RawRecord;
use crate::feed::fields::resolve_field;
use crate::textnorm::{normalize, parse_locale_number};

/// Canonical output entity. Either fully valid (title and url present) or
/// never constructed; `price` is a parsed decimal or `None`, never NaN.
#[derive(Debug, Clone, Serialize)]
pub struct Product {
    pub merchant: String,
    pub title: String,
    pub url: String,
    pub image: Option<String>,
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub currency: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub brand: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub category: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Normalized match text derived from title+description+category+brand.
    #[serde(skip)]
    pub search_text: String,
}

impl Product {
    /// Rebuild `search_text` from the contributing fields. Must be called
    /// after any of them changes.
    pub fn recompute_search_text(&mut self) {
        self.search_text = normalize(&format!(
            "{} {} {} {}",
            self.title, self.description, self.category, self.brand
        ));
    }
}

/// Structural image fallbacks tried after the configured candidate list:
/// nested container tags and single-field variants some networks use.
const IMAGE_FALLBACK_CANDIDATES: &[&str] = &["images", "billede", "foto", "image_link", "imagelink"];

static RE_CURRENCY_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(dkk|sek|nok|eur|usd|gbp|chf)\b").unwrap());

fn infer_currency(explicit: &str, raw_price: &str, default_currency: &str) -> String {
    if !explicit.is_empty() {
        return explicit.to_uppercase();
    }
    if let Some(caps) = RE_CURRENCY_CODE.captures(raw_price) {
        return caps[1].to_uppercase();
    }
    if raw_price.to_lowercase().contains("kr") {
        return "DKK".to_string();
    }
    default_currency.to_string()
}

/// Resolve an image reference to an absolute URL. Accepts protocol-relative,
/// absolute and page-relative forms; anything unresolvable is `None`.
pub fn normalize_image_url(raw: &str, page_url: Option<&str>) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(rest) = trimmed.strip_prefix("//") {
        return Some(format!("https://{rest}"));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return Some(trimmed.to_string());
    }
    let base = Url::parse(page_url?).ok()?;
    base.join(trimmed).ok().map(|u| u.to_string())
}

/// Externally-sourced image URLs are never handed to the client directly;
/// they go through the local proxy endpoint.
pub fn proxy_image_url(absolute: &str) -> String {
    format!("/api/img?src={}", urlencoding::encode(absolute))
}

/// Build a canonical `Product` from one raw record. Records without a title
/// or URL are dropped silently; an unparseable price or a missing image are
/// not errors.
pub fn build_product(record: &RawRecord, merchant: &str, cfg: &SearchConfig) -> Option<Product> {
    let fields = &cfg.fields;

    let title = resolve_field(record, &fields.title);
    let url = resolve_field(record, &fields.url);
    if title.is_empty() || url.is_empty() {
        return None;
    }

    let raw_price = resolve_field(record, &fields.price);
    let price = parse_locale_number(&raw_price);
    let currency = infer_currency(
        &resolve_field(record, &fields.currency),
        &raw_price,
        &cfg.search.default_currency,
    );

    let mut raw_image = resolve_field(record, &fields.image);
    if raw_image.is_empty() {
        for candidate in IMAGE_FALLBACK_CANDIDATES {
            raw_image = resolve_field(record, &[candidate.to_string()]);
            if !raw_image.is_empty() {
                break;
            }
        }
    }
    let image = normalize_image_url(&raw_image, Some(&url)).map(|abs| proxy_image_url(&abs));

    let mut product = Product {
        merchant: merchant.to_string(),
        title,
        url,
        image,
        price,
        currency,
        brand: resolve_field(record, &fields.brand),
        category: resolve_field(record, &fields.category),
        description: resolve_field(record, &fields.description),
        search_text: String::new(),
    };
    product.recompute_search_text();
    Some(product)
}
