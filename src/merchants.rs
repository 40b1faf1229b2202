// src/merchants.rs
//! # Merchant directory
//!
//! Fallback catalogue used when no feed products match a query: each entry
//! carries a search-URL template with a `{Q}` placeholder that gets the
//! URL-encoded query substituted in.
//!
//! - Loads from JSON (`config/merchants.json`, `MERCHANT_DIRECTORY_PATH`
//!   override).
//! - Falls back to a small built-in seed when no resource is available, so
//!   the search endpoint always has somewhere to send the user.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

pub const DEFAULT_DIRECTORY_PATH: &str = "config/merchants.json";
pub const ENV_DIRECTORY_PATH: &str = "MERCHANT_DIRECTORY_PATH";

#[derive(Debug, Clone, Deserialize)]
pub struct MerchantEntry {
    pub name: String,
    #[allow(dead_code)] // informational, kept for config docs
    pub host: String,
    pub search_url_template: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MerchantDirectory {
    pub merchants: Vec<MerchantEntry>,
}

/// Fallback link shown instead of a product: same outward shape, but image
/// and price are always absent.
#[derive(Debug, Clone, Serialize)]
pub struct MerchantLink {
    pub merchant: String,
    pub title: String,
    pub url: String,
    pub image: Option<String>,
    pub price: Option<f64>,
}

impl MerchantDirectory {
    /// Load from an explicit JSON file; built-in seed on any error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|_| Self::default_seed()),
            Err(_) => Self::default_seed(),
        }
    }

    /// Load using `$MERCHANT_DIRECTORY_PATH`, then the default path, then the
    /// built-in seed.
    pub fn load_default() -> Self {
        if let Ok(p) = std::env::var(ENV_DIRECTORY_PATH) {
            return Self::load_from_file(p);
        }
        Self::load_from_file(DEFAULT_DIRECTORY_PATH)
    }

    /// Substitute the query into each merchant's search template.
    pub fn links_for_query(&self, query: &str, limit: usize) -> Vec<MerchantLink> {
        let encoded = urlencoding::encode(query);
        self.merchants
            .iter()
            .take(limit)
            .map(|m| MerchantLink {
                merchant: m.name.clone(),
                title: format!("Søg efter \"{}\" hos {}", query, m.name),
                url: m.search_url_template.replace("{Q}", &encoded),
                image: None,
                price: None,
            })
            .collect()
    }

    pub(crate) fn default_seed() -> Self {
        let seed = [
            ("Mere om Vin", "www.mereomvin.dk", "https://www.mereomvin.dk/search?q={Q}"),
            (
                "Winther Vin",
                "www.winthervin.dk",
                "https://www.winthervin.dk/shop/search.html?keywords={Q}",
            ),
            ("Vinea", "www.vinea.dk", "https://www.vinea.dk/soeg?query={Q}"),
        ];
        Self {
            merchants: seed
                .into_iter()
                .map(|(name, host, template)| MerchantEntry {
                    name: name.to_string(),
                    host: host.to_string(),
                    search_url_template: template.to_string(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_templates_substitute_encoded_query() {
        let dir = MerchantDirectory::default_seed();
        let links = dir.links_for_query("rød bourgogne", 10);
        assert_eq!(links.len(), 3);
        assert!(links[0].url.contains("q=r%C3%B8d%20bourgogne"));
        assert!(links.iter().all(|l| l.image.is_none() && l.price.is_none()));
        assert!(links.iter().all(|l| !l.url.contains("{Q}")));
    }

    #[test]
    fn limit_caps_link_count() {
        let dir = MerchantDirectory::default_seed();
        assert_eq!(dir.links_for_query("vin", 2).len(), 2);
    }

    #[test]
    fn missing_file_falls_back_to_seed() {
        let dir = MerchantDirectory::load_from_file("does/not/exist.json");
        assert!(!dir.merchants.is_empty());
    }
}
