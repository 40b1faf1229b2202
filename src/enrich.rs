// src/enrich.rs
//! OpenGraph image backfill: fetches a product page and pulls
//! `og:image`/`twitter:image` out of the meta tags. Only runs for a small
//! bounded prefix of results that came out of the feed without an image;
//! every failure is silent, enrichment is never required for correctness.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::feed::product::{normalize_image_url, proxy_image_url, Product};

const PAGE_FETCH_TIMEOUT: Duration = Duration::from_secs(3);
const PAGE_BYTE_CAP: usize = 512 * 1024;

static RE_META_PROPERTY_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<meta[^>]+(?:property|name)\s*=\s*["'](?:og:image|twitter:image)(?::src)?["'][^>]*content\s*=\s*["']([^"']+)["']"#,
    )
    .unwrap()
});
static RE_META_CONTENT_FIRST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)<meta[^>]+content\s*=\s*["']([^"']+)["'][^>]*(?:property|name)\s*=\s*["'](?:og:image|twitter:image)(?::src)?["']"#,
    )
    .unwrap()
});

/// Extract an image URL from page HTML; attribute order varies by shop.
pub fn extract_og_image(html: &str) -> Option<String> {
    RE_META_PROPERTY_FIRST
        .captures(html)
        .or_else(|| RE_META_CONTENT_FIRST.captures(html))
        .map(|caps| caps[1].trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Backfill missing images for at most `limit` products, in ranked order.
pub async fn backfill_images(client: &reqwest::Client, products: &mut [Product], limit: usize) {
    if limit == 0 {
        return;
    }
    let mut budget = limit;
    for product in products.iter_mut() {
        if budget == 0 {
            break;
        }
        if product.image.is_some() {
            continue;
        }
        budget -= 1;
        match fetch_page(client, &product.url).await {
            Ok(html) => {
                if let Some(raw) = extract_og_image(&html) {
                    product.image = normalize_image_url(&raw, Some(&product.url))
                        .map(|abs| proxy_image_url(&abs));
                }
            }
            Err(e) => {
                tracing::debug!(error = ?e, url = %product.url, "og enrichment fetch failed");
            }
        }
    }
}

async fn fetch_page(client: &reqwest::Client, url: &str) -> anyhow::Result<String> {
    let resp = tokio::time::timeout(PAGE_FETCH_TIMEOUT, client.get(url).send())
        .await
        .map_err(|_| anyhow::anyhow!("page fetch timed out"))??;
    let bytes = tokio::time::timeout(PAGE_FETCH_TIMEOUT, resp.bytes())
        .await
        .map_err(|_| anyhow::anyhow!("page body timed out"))??;
    let slice = &bytes[..bytes.len().min(PAGE_BYTE_CAP)];
    Ok(String::from_utf8_lossy(slice).into_owned())
}
