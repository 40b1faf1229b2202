// src/feed/classify.rs
//! Wine/non-wine precision filter over product text.
//!
//! Affiliate feeds mix bottles with glassware, openers and other beverages.
//! Three term lists (plus a generic wine-word list) decide inclusion:
//! hard negatives always exclude; negatives exclude unless a positive wine
//! signal co-occurs; otherwise a positive term or at least a generic wine
//! word is required. The lists are editorial configuration, not code.

use crate::config::ClassifierConfig;
use crate::feed::product::Product;
use crate::textnorm::normalize;

pub struct WineClassifier {
    hard_negative: Vec<String>,
    negative: Vec<String>,
    positive: Vec<String>,
    generic: Vec<String>,
}

/// Fold a configured term the same way product text is folded, preserving
/// deliberate leading/trailing spaces so word-boundary-sensitive entries
/// (" øl", " rom ") keep their boundaries.
fn fold_term(term: &str) -> String {
    let mut folded = normalize(term);
    if folded.is_empty() {
        return folded;
    }
    if term.starts_with(' ') {
        folded.insert(0, ' ');
    }
    if term.ends_with(' ') {
        folded.push(' ');
    }
    folded
}

fn fold_list(terms: &[String]) -> Vec<String> {
    terms.iter().map(|t| fold_term(t)).filter(|t| !t.is_empty()).collect()
}

impl WineClassifier {
    pub fn from_config(cfg: &ClassifierConfig) -> Self {
        Self {
            hard_negative: fold_list(&cfg.hard_negative),
            negative: fold_list(&cfg.negative),
            positive: fold_list(&cfg.positive),
            generic: fold_list(&cfg.generic),
        }
    }

    pub fn is_wine_like(&self, product: &Product) -> bool {
        // Space-padded so boundary-anchored terms match at text edges too.
        let text = format!(
            " {} ",
            normalize(&format!(
                "{} {} {}",
                product.title, product.description, product.category
            ))
        );

        let hit = |terms: &[String]| terms.iter().any(|t| text.contains(t.as_str()));

        if hit(&self.hard_negative) {
            return false;
        }
        let positive = hit(&self.positive);
        if hit(&self.negative) && !positive {
            return false;
        }
        if !positive && !hit(&self.generic) {
            return false;
        }
        true
    }
}
