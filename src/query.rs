// src/query.rs
//! Query planning: free-text queries become an expanded term set plus an
//! optional price range, computed once per request.
//!
//! Expansion unions per-token and whole-query synonym mappings (regions ↔
//! grapes, bidirectional) with occasion/dish intent rules (a regex over the
//! whole normalized query mapping to wine-style terms). Price phrasing is
//! scanned in a fixed priority order so "fra 100 til 150" never degrades
//! into a lone minimum.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::QueryConfig;
use crate::textnorm::{normalize, parse_locale_number};

/// Immutable per-request plan. `terms` is deduplicated; the first entry is
/// the primary term (the first surviving query token).
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub terms: Vec<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
}

impl QueryPlan {
    pub fn primary_term(&self) -> Option<&str> {
        self.terms.first().map(String::as_str)
    }

    pub fn has_price_bounds(&self) -> bool {
        self.price_min.is_some() || self.price_max.is_some()
    }

    /// At least one expanded term must appear in the product's search text
    /// for the product to count as a match.
    pub fn matches_text(&self, search_text: &str) -> bool {
        self.terms.iter().any(|t| search_text.contains(t.as_str()))
    }

    /// Price filter used by the aggregator: products without a parsed price
    /// are excluded once the user expressed a bound.
    pub fn price_allows(&self, price: Option<f64>) -> bool {
        if !self.has_price_bounds() {
            return true;
        }
        let Some(p) = price else { return false };
        if let Some(min) = self.price_min {
            if p < min {
                return false;
            }
        }
        if let Some(max) = self.price_max {
            if p > max {
                return false;
            }
        }
        true
    }
}

/// Compiled planner: stopwords, bidirectional synonyms, intent regexes.
pub struct QueryPlanner {
    stopwords: HashSet<String>,
    synonyms: HashMap<String, Vec<String>>,
    intents: Vec<(Regex, Vec<String>)>,
    default_term: String,
    cheap_max: f64,
}

fn push_term(terms: &mut Vec<String>, term: &str) {
    let term = normalize(term);
    if !term.is_empty() && !terms.iter().any(|t| t == &term) {
        terms.push(term);
    }
}

/// Tokens that are really price fragments ("150", "100-150") never become
/// match terms.
fn is_numeric_token(tok: &str) -> bool {
    tok.chars().any(|c| c.is_ascii_digit())
        && tok.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
}

impl QueryPlanner {
    pub fn from_config(cfg: &QueryConfig) -> anyhow::Result<Self> {
        let stopwords = cfg.stopwords.iter().map(|s| normalize(s)).collect();

        // Synonyms are declared one-way in config and expanded to a
        // bidirectional map here.
        let mut synonyms: HashMap<String, Vec<String>> = HashMap::new();
        let mut add = |k: String, v: String| {
            let entry = synonyms.entry(k).or_default();
            if !entry.contains(&v) {
                entry.push(v);
            }
        };
        for (key, expansions) in &cfg.synonyms {
            let key = normalize(key);
            for exp in expansions {
                let exp = normalize(exp);
                add(key.clone(), exp.clone());
                add(exp, key.clone());
            }
        }

        let mut intents = Vec::with_capacity(cfg.intents.len());
        for rule in &cfg.intents {
            let re = Regex::new(&format!("(?i){}", rule.pattern))
                .map_err(|e| anyhow::anyhow!("intent pattern `{}`: {e}", rule.pattern))?;
            intents.push((re, rule.terms.iter().map(|t| normalize(t)).collect()));
        }

        Ok(Self {
            stopwords,
            synonyms,
            intents,
            default_term: normalize(&cfg.default_term),
            cheap_max: cfg.cheap_max,
        })
    }

    /// Build the plan for one raw query. `external_max` is a UI-supplied cap
    /// that wins over a query-derived maximum when it is smaller.
    pub fn plan(&self, raw_query: &str, external_max: Option<f64>) -> QueryPlan {
        let normalized = normalize(raw_query);
        let mut terms: Vec<String> = Vec::new();

        for token in normalized.split_whitespace() {
            if self.stopwords.contains(token) || is_numeric_token(token) {
                continue;
            }
            push_term(&mut terms, token);
            if let Some(expansions) = self.synonyms.get(token) {
                for exp in expansions {
                    push_term(&mut terms, exp);
                }
            }
        }

        // Multi-word synonym keys ("ribera del duero") match the whole query.
        let mut phrase_keys: Vec<&String> = self
            .synonyms
            .keys()
            .filter(|k| k.contains(' ') && normalized.contains(k.as_str()))
            .collect();
        phrase_keys.sort();
        for key in phrase_keys {
            push_term(&mut terms, key);
            for exp in &self.synonyms[key] {
                push_term(&mut terms, exp);
            }
        }

        for (re, intent_terms) in &self.intents {
            if re.is_match(&normalized) {
                for term in intent_terms {
                    push_term(&mut terms, term);
                }
            }
        }

        if terms.is_empty() {
            terms.push(self.default_term.clone());
        }

        let (mut price_min, mut price_max) =
            extract_price_range(&raw_query.to_lowercase(), self.cheap_max);
        if let Some(external) = external_max {
            price_max = Some(match price_max {
                Some(derived) => derived.min(external),
                None => external,
            });
        }
        if let (Some(lo), Some(hi)) = (price_min, price_max) {
            if lo > hi {
                price_min = Some(hi);
                price_max = Some(lo);
            }
        }

        QueryPlan {
            terms,
            price_min,
            price_max,
        }
    }
}

const NUM: &str = r"(\d+(?:[.,]\d+)?)";

static RE_RANGE_WORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?:fra|from|mellem|between)\s+{NUM}\s*(?:til|to|og|and)\s+{NUM}"
    ))
    .unwrap()
});
static RE_RANGE_DASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"{NUM}\s*-\s*{NUM}\s*(?:kr|dkk|eur|€|,-)")).unwrap());
static RE_MAX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b(?:under|max|maks|højst|hoejst|op til|billigere end)\s*:?\s*{NUM}"
    ))
    .unwrap()
});
static RE_MIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b(?:over|mindst|minimum|fra|at least)\s*:?\s*{NUM}"
    ))
    .unwrap()
});
static RE_CHEAP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(billig\w*|budget|cheap)\b").unwrap());

/// Price-range extraction over the raw lowercased query, in priority order:
/// explicit from/to phrasing, dash range with a currency unit, max-only,
/// min-only, then a generic cheap keyword mapping to a fixed low ceiling.
pub fn extract_price_range(lower_query: &str, cheap_max: f64) -> (Option<f64>, Option<f64>) {
    if let Some(caps) = RE_RANGE_WORDS.captures(lower_query) {
        return (
            parse_locale_number(&caps[1]),
            parse_locale_number(&caps[2]),
        );
    }
    if let Some(caps) = RE_RANGE_DASH.captures(lower_query) {
        return (
            parse_locale_number(&caps[1]),
            parse_locale_number(&caps[2]),
        );
    }

    let mut min = None;
    let mut max = None;
    if let Some(caps) = RE_MAX.captures(lower_query) {
        max = parse_locale_number(&caps[1]);
    }
    if let Some(caps) = RE_MIN.captures(lower_query) {
        min = parse_locale_number(&caps[1]);
    }
    if max.is_none() && RE_CHEAP.is_match(lower_query) {
        max = Some(cheap_max);
    }
    (min, max)
}
