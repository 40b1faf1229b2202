// src/fetch.rs
//! Outbound HTTP collaborators behind a narrow trait, so the aggregation
//! pipeline can be exercised with fixture payloads in tests.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE, USER_AGENT};
use std::time::Duration;

/// Raw feed bytes plus the transport's charset declaration, if any.
#[derive(Debug, Clone)]
pub struct FeedPayload {
    pub bytes: Vec<u8>,
    pub charset: Option<String>,
}

#[async_trait]
pub trait FeedFetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FeedPayload>;
}

/// Production fetcher. Third-party feed hosts are picky about headers, so
/// requests go out browser-like with an explicit accept list.
pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new(timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .expect("reqwest client");
        Self { client }
    }
}

fn charset_from_content_type(content_type: &str) -> Option<String> {
    let lower = content_type.to_ascii_lowercase();
    let idx = lower.find("charset=")?;
    let rest = &lower[idx + "charset=".len()..];
    let value = rest
        .split(|c: char| c == ';' || c.is_whitespace())
        .next()?
        .trim_matches('"');
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[async_trait]
impl FeedFetch for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<FeedPayload> {
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, "Mozilla/5.0 Chrome/124")
            .header(ACCEPT, "text/xml,application/xml,text/plain,*/*")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .context("feed http get")?;

        if !resp.status().is_success() {
            bail!("feed responded with status {}", resp.status());
        }

        let charset = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_from_content_type);

        let bytes = resp.bytes().await.context("feed http body")?.to_vec();
        Ok(FeedPayload { bytes, charset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charset_is_extracted_from_content_type() {
        assert_eq!(
            charset_from_content_type("text/xml; charset=ISO-8859-1"),
            Some("iso-8859-1".to_string())
        );
        assert_eq!(
            charset_from_content_type("text/csv;charset=\"utf-8\";foo=bar"),
            Some("utf-8".to_string())
        );
        assert_eq!(charset_from_content_type("text/xml"), None);
    }
}
