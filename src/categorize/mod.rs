//! Market categorizer and volume filter (C8).

use std::collections::HashMap;

use crate::models::Market;

const CRYPTO_TERMS: [&str; 7] = ["bitcoin", "btc", "ethereum", "eth", "crypto", "cryptocurrency", "coin"];
const PRICE_PREDICTION_TERMS: [&str; 6] = ["price", "reach", "hit", "$", "above", "below"];
const EVENT_CATALYST_TERMS: [&str; 8] = ["etf", "approval", "launch", "mainnet", "fork", "halving", "listing", "sec"];

const BLACKLIST_PHRASES: [&str; 4] = ["test market", "do not trade", "admin only", "placeholder"];

pub struct Category {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
}

pub fn categories() -> Vec<Category> {
    vec![
        Category {
            name: "politics",
            keywords: &["election", "president", "senate", "congress", "governor", "vote", "poll"],
        },
        Category {
            name: "sports",
            keywords: &["championship", "super bowl", "world cup", "finals", "playoffs", "match"],
        },
        Category {
            name: "economics",
            keywords: &["fed", "inflation", "gdp", "interest rate", "recession", "jobs report"],
        },
        Category {
            name: "crypto",
            keywords: &CRYPTO_TERMS,
        },
        Category {
            name: "entertainment",
            keywords: &["oscar", "grammy", "box office", "award", "premiere"],
        },
    ]
}

pub struct MarketCategorizer {
    categories: Vec<Category>,
}

impl MarketCategorizer {
    pub fn new() -> Self {
        Self { categories: categories() }
    }

    pub fn is_blacklisted(&self, market: &Market) -> bool {
        let blob = market.text_blob().to_lowercase();

        if BLACKLIST_PHRASES.iter().any(|phrase| blob.contains(phrase)) {
            return true;
        }

        let is_crypto = CRYPTO_TERMS.iter().any(|t| blob.contains(t));
        if !is_crypto {
            return false;
        }
        let has_price_pattern = PRICE_PREDICTION_TERMS.iter().any(|t| blob.contains(t));
        let has_catalyst = EVENT_CATALYST_TERMS.iter().any(|t| blob.contains(t));
        has_price_pattern && !has_catalyst
    }

    /// Highest-scoring category with `score >= 1`, or `None`.
    pub fn categorize(&self, market: &Market) -> Option<(&'static str, u32)> {
        let blob = market.text_blob().to_lowercase();
        let mut best: Option<(&'static str, u32)> = None;

        for category in &self.categories {
            let score: u32 = category.keywords.iter().map(|kw| blob.matches(kw).count() as u32).sum();
            if score >= 1 {
                match best {
                    Some((_, best_score)) if best_score >= score => {}
                    _ => best = Some((category.name, score)),
                }
            }
        }
        best
    }

    /// Mutates `market` in place: blacklist flag, category, category score.
    pub fn apply(&self, market: &mut Market) {
        market.is_blacklisted = self.is_blacklisted(market);
        if market.is_blacklisted {
            market.category = None;
            market.category_score = 0;
            return;
        }
        match self.categorize(market) {
            Some((name, score)) => {
                market.category = Some(name.to_string());
                market.category_score = score;
            }
            None => {
                market.category = None;
                market.category_score = 0;
            }
        }
    }
}

impl Default for MarketCategorizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-category minimum volume thresholds. Hot-reloadable: callers replace
/// the whole table via `ConfigManager`-style swap, never mutate individual
/// entries under a held reference.
#[derive(Debug, Clone)]
pub struct VolumeThresholds {
    pub default_threshold: f64,
    pub per_category: HashMap<String, f64>,
}

impl Default for VolumeThresholds {
    fn default() -> Self {
        let mut per_category = HashMap::new();
        per_category.insert("politics".to_string(), 10_000.0);
        per_category.insert("crypto".to_string(), 25_000.0);
        per_category.insert("economics".to_string(), 15_000.0);
        Self {
            default_threshold: 5_000.0,
            per_category,
        }
    }
}

impl VolumeThresholds {
    pub fn threshold_for(&self, category: Option<&str>) -> f64 {
        category
            .and_then(|c| self.per_category.get(c))
            .copied()
            .unwrap_or(self.default_threshold)
    }
}

/// Passes a market iff not blacklisted and volume >= its category's
/// threshold.
pub fn filter_markets_by_volume<'a>(markets: &'a [Market], thresholds: &VolumeThresholds) -> Vec<&'a Market> {
    markets
        .iter()
        .filter(|m| !m.is_blacklisted && m.volume >= thresholds.threshold_for(m.category.as_deref()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(question: &str, volume: f64) -> Market {
        Market::new("m1", question, "", vec!["Yes".into(), "No".into()], vec![0.5, 0.5], volume)
    }

    #[test]
    fn crypto_price_prediction_without_catalyst_is_blacklisted() {
        let cat = MarketCategorizer::new();
        let m = market("Will bitcoin reach $100k by friday?", 1000.0);
        assert!(cat.is_blacklisted(&m));
    }

    #[test]
    fn crypto_with_catalyst_is_not_blacklisted() {
        let cat = MarketCategorizer::new();
        let m = market("Will the bitcoin ETF get SEC approval?", 1000.0);
        assert!(!cat.is_blacklisted(&m));
    }

    #[test]
    fn categorize_assigns_highest_scoring_category() {
        let cat = MarketCategorizer::new();
        let m = market("Will the president win the election?", 1000.0);
        let (name, score) = cat.categorize(&m).unwrap();
        assert_eq!(name, "politics");
        assert!(score >= 1);
    }

    #[test]
    fn volume_filter_rejects_blacklisted_regardless_of_volume() {
        let cat = MarketCategorizer::new();
        let mut m = market("Will bitcoin reach $1 above today?", 1_000_000.0);
        cat.apply(&mut m);
        let thresholds = VolumeThresholds::default();
        let filtered = filter_markets_by_volume(&[m], &thresholds);
        assert!(filtered.is_empty());
    }

    #[test]
    fn per_category_threshold_overrides_default() {
        let thresholds = VolumeThresholds::default();
        assert!(thresholds.threshold_for(Some("crypto")) > thresholds.threshold_for(Some("unknown-category")));
    }
}
