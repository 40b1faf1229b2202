// src/ranking.rs
//! Relevance scoring and deterministic ordering of normalized products
//! against an expanded query plan.

use std::cmp::Ordering;

use crate::feed::product::Product;
use crate::query::QueryPlan;
use crate::textnorm::normalize;

/// Term containment in the search text dominates; a primary-term hit in the
/// title adds a smaller bonus; image and price presence add flat bonuses.
pub fn score(product: &Product, plan: &QueryPlan) -> i64 {
    let mut total = 0;
    for term in &plan.terms {
        if product.search_text.contains(term.as_str()) {
            total += 10;
        }
    }
    if let Some(primary) = plan.primary_term() {
        if normalize(&product.title).contains(primary) {
            total += 3;
        }
    }
    if product.image.is_some() {
        total += 1;
    }
    if product.price.is_some() {
        total += 1;
    }
    total
}

/// Stable descending sort by score; ties resolve has-image first, then
/// ascending price with unpriced products last. The chain is total for the
/// fields it names, so equal inputs always order the same way.
pub fn rank(products: Vec<Product>, plan: &QueryPlan) -> Vec<Product> {
    let mut keyed: Vec<(i64, Product)> = products
        .into_iter()
        .map(|p| (score(&p, plan), p))
        .collect();
    keyed.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| b.1.image.is_some().cmp(&a.1.image.is_some()))
            .then_with(|| cmp_price(a.1.price, b.1.price))
    });
    keyed.into_iter().map(|(_, p)| p).collect()
}

fn cmp_price(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
