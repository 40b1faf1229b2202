// src/config/mod.rs
//! Configuration schema for the search service.
//!
//! All editorial tables (feed list, field-name candidates, synonym/intent
//! maps, classifier term lists) live in `config/search.toml` and are loaded
//! into immutable structs at startup. The same TOML is embedded in the binary
//! as a fallback so the service and its tests run with no files on disk.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "config/search.toml";
pub const ENV_CONFIG_PATH: &str = "SEARCH_CONFIG_PATH";

/// Shipped defaults, compiled in. Kept in sync with the on-disk file by
/// embedding that file directly.
const EMBEDDED_CONFIG: &str = include_str!("../../config/search.toml");

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub search: SearchSection,
    #[serde(default)]
    pub feeds: Vec<FeedSource>,
    pub decoder: DecoderConfig,
    pub fields: FieldCandidates,
    pub query: QueryConfig,
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSection {
    #[serde(default = "default_result_limit")]
    pub result_limit: usize,
    #[serde(default = "default_fallback_limit")]
    pub fallback_limit: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_currency")]
    pub default_currency: String,
    /// How many top results may get an OpenGraph image backfill. 0 disables.
    #[serde(default)]
    pub enrich_limit: usize,
}

fn default_result_limit() -> usize {
    36
}
fn default_fallback_limit() -> usize {
    12
}
fn default_fetch_timeout_secs() -> u64 {
    8
}
fn default_currency() -> String {
    "DKK".to_string()
}

/// One configured affiliate feed: merchant identity plus its export URL.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedSource {
    pub merchant: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecoderConfig {
    /// Container tags tried in order for XML record extraction.
    pub containers: Vec<String>,
    /// Generic containers scanned when none of the primaries yield records.
    #[serde(default)]
    pub fallback_containers: Vec<String>,
    /// URL-like fields; a fallback container only counts as a record when one
    /// of these is present in its body.
    #[serde(default)]
    pub anchor_fields: Vec<String>,
}

/// Ordered field-name aliases per logical product attribute.
/// A `tag@attr` entry addresses an element attribute instead of its text.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldCandidates {
    pub title: Vec<String>,
    pub url: Vec<String>,
    pub image: Vec<String>,
    pub price: Vec<String>,
    pub currency: Vec<String>,
    #[serde(default)]
    pub brand: Vec<String>,
    #[serde(default)]
    pub category: Vec<String>,
    #[serde(default)]
    pub description: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    pub default_term: String,
    #[serde(default = "default_cheap_max")]
    pub cheap_max: f64,
    #[serde(default)]
    pub stopwords: Vec<String>,
    #[serde(default)]
    pub synonyms: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub intents: Vec<IntentRule>,
}

fn default_cheap_max() -> f64 {
    100.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntentRule {
    /// Regex matched against the whole normalized query.
    pub pattern: String,
    pub terms: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default)]
    pub hard_negative: Vec<String>,
    #[serde(default)]
    pub negative: Vec<String>,
    #[serde(default)]
    pub positive: Vec<String>,
    #[serde(default)]
    pub generic: Vec<String>,
}

impl SearchConfig {
    /// Load configuration: `$SEARCH_CONFIG_PATH`, then `config/search.toml`,
    /// then the embedded copy.
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(&p);
            let content = fs::read_to_string(&pb)
                .with_context(|| format!("reading search config from {}", pb.display()))?;
            return Self::from_toml_str(&content);
        }
        let default_path = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            let content = fs::read_to_string(&default_path)
                .with_context(|| format!("reading search config from {}", default_path.display()))?;
            return Self::from_toml_str(&content);
        }
        Ok(Self::builtin())
    }

    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let cfg: SearchConfig = toml::from_str(toml_str).context("parsing search config TOML")?;
        Ok(cfg)
    }

    /// The compiled-in default configuration.
    pub fn builtin() -> Self {
        Self::from_toml_str(EMBEDDED_CONFIG).expect("embedded search config must parse")
    }
}
