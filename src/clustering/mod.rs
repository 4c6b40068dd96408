//! Topic clusterer (C6): keyword-based market clustering and coordinated
//! cross-market movement detection.

use std::collections::{HashMap, HashSet};

use crate::models::{Market, Signal, SignalPayload};

#[derive(Debug, Clone)]
pub struct Cluster {
    pub id: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CoordinatedMovement {
    pub cluster_id: String,
    pub members: Vec<String>,
    pub avg_change_pct: f64,
    pub correlation_score: f64,
}

pub struct TopicClusterer {
    clusters: Vec<Cluster>,
    /// market_id -> cluster ids it belongs to.
    membership: HashMap<String, Vec<String>>,
    /// cluster id -> member market ids.
    members: HashMap<String, HashSet<String>>,
}

impl TopicClusterer {
    pub fn new(clusters: Vec<Cluster>) -> Self {
        Self {
            clusters,
            membership: HashMap::new(),
            members: HashMap::new(),
        }
    }

    /// Recompute cluster assignment for the current market list. A market's
    /// score in a cluster is `substring_hits + 2*word_boundary_hits_in_question`;
    /// it joins the cluster iff `hits >= 1 AND score > 1`, and may join more
    /// than one cluster.
    pub fn assign(&mut self, markets: &[Market]) {
        self.membership.clear();
        self.members.clear();

        for market in markets {
            let blob = market.text_blob().to_lowercase();
            let question = market.question.to_lowercase();

            let mut joined = Vec::new();
            for cluster in &self.clusters {
                let mut hits = 0u32;
                let mut score = 0.0_f64;
                for kw in &cluster.keywords {
                    let kw = kw.to_lowercase();
                    let substring_hits = blob.matches(kw.as_str()).count() as u32;
                    let word_hits = count_word_boundary_hits(&question, &kw) as u32;
                    if substring_hits > 0 {
                        hits += substring_hits;
                    }
                    if word_hits > 0 {
                        hits += word_hits;
                    }
                    score += substring_hits as f64 + 2.0 * word_hits as f64;
                }

                if hits >= 1 && score > 1.0 {
                    joined.push(cluster.id.clone());
                    self.members.entry(cluster.id.clone()).or_default().insert(market.market_id.clone());
                }
            }
            self.membership.insert(market.market_id.clone(), joined);
        }
    }

    /// Union of every cluster a market belongs to, excluding itself.
    pub fn correlated_markets(&self, market_id: &str) -> Vec<String> {
        let Some(cluster_ids) = self.membership.get(market_id) else {
            return Vec::new();
        };
        let mut out = HashSet::new();
        for cid in cluster_ids {
            if let Some(members) = self.members.get(cid) {
                out.extend(members.iter().cloned());
            }
        }
        out.remove(market_id);
        out.into_iter().collect()
    }

    /// For each cluster, check whether qualifying members (|change| > theta)
    /// share a sign and report a coordinated-movement signal if at least
    /// two do.
    pub fn detect_coordinated_movement(&self, price_changes: &HashMap<String, f64>, theta: f64) -> Vec<(CoordinatedMovement, Signal)> {
        let mut out = Vec::new();
        for cluster in &self.clusters {
            let Some(all_members) = self.members.get(&cluster.id) else {
                continue;
            };
            if all_members.is_empty() {
                continue;
            }

            let qualifying: Vec<(&String, f64)> = all_members
                .iter()
                .filter_map(|m| price_changes.get(m).map(|c| (m, *c)))
                .filter(|(_, c)| c.abs() > theta)
                .collect();

            if qualifying.len() < 2 {
                continue;
            }

            let positive = qualifying.iter().filter(|(_, c)| *c > 0.0).count();
            let negative = qualifying.len() - positive;
            let same_sign_count = positive.max(negative);
            if same_sign_count < 2 {
                continue;
            }

            let same_sign: Vec<(&String, f64)> = if positive >= negative {
                qualifying.iter().filter(|(_, c)| *c > 0.0).cloned().collect()
            } else {
                qualifying.iter().filter(|(_, c)| *c < 0.0).cloned().collect()
            };

            let avg_change_pct = same_sign.iter().map(|(_, c)| c).sum::<f64>() / same_sign.len() as f64;
            let correlation_score = same_sign.len() as f64 / all_members.len() as f64;

            let movement = CoordinatedMovement {
                cluster_id: cluster.id.clone(),
                members: same_sign.iter().map(|(m, _)| (*m).clone()).collect(),
                avg_change_pct,
                correlation_score,
            };

            let signal = Signal::new(
                movement.members.first().cloned().unwrap_or_default(),
                format!("coordinated movement in cluster {}", cluster.id),
                correlation_score.clamp(0.0, 1.0),
                SignalPayload::CoordinatedCrossMarket {
                    cluster_id: movement.cluster_id.clone(),
                    members: movement.members.clone(),
                    avg_change_pct: movement.avg_change_pct,
                    correlation_score: movement.correlation_score,
                },
            );

            out.push((movement, signal));
        }
        out
    }
}

fn count_word_boundary_hits(text: &str, keyword: &str) -> usize {
    if keyword.is_empty() {
        return 0;
    }
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| *word == keyword)
        .count()
}

pub fn default_clusters() -> Vec<Cluster> {
    vec![
        Cluster {
            id: "elections".into(),
            keywords: vec!["election".into(), "president".into(), "senate".into(), "governor".into(), "vote".into()],
        },
        Cluster {
            id: "crypto".into(),
            keywords: vec!["bitcoin".into(), "btc".into(), "ethereum".into(), "eth".into(), "crypto".into()],
        },
        Cluster {
            id: "fed-rates".into(),
            keywords: vec!["fed".into(), "interest rate".into(), "fomc".into(), "rate cut".into(), "rate hike".into()],
        },
        Cluster {
            id: "sports".into(),
            keywords: vec!["championship".into(), "super bowl".into(), "world cup".into(), "finals".into()],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(id: &str, question: &str) -> Market {
        Market::new(id, question, "", vec!["Yes".into(), "No".into()], vec![0.5, 0.5], 1000.0)
    }

    #[test]
    fn assigns_to_cluster_on_word_boundary_hit() {
        let mut clusterer = TopicClusterer::new(default_clusters());
        let markets = vec![market("m1", "Will bitcoin reach $100k?")];
        clusterer.assign(&markets);
        assert!(clusterer.correlated_markets("m1").is_empty());
        assert!(clusterer.members.get("crypto").unwrap().contains("m1"));
    }

    #[test]
    fn market_can_join_multiple_clusters() {
        let mut clusterer = TopicClusterer::new(default_clusters());
        let markets = vec![market("m1", "Will the Fed cut rates before the election?")];
        clusterer.assign(&markets);
        let joined = clusterer.membership.get("m1").unwrap();
        assert!(joined.contains(&"fed-rates".to_string()));
        assert!(joined.contains(&"elections".to_string()));
    }

    #[test]
    fn coordinated_movement_needs_two_same_sign_qualifiers() {
        let mut clusterer = TopicClusterer::new(default_clusters());
        let markets = vec![
            market("m1", "Will bitcoin reach $100k?"),
            market("m2", "Will ethereum reach $10k?"),
            market("m3", "Will crypto crash?"),
        ];
        clusterer.assign(&markets);

        let mut changes = HashMap::new();
        changes.insert("m1".to_string(), 5.0);
        changes.insert("m2".to_string(), 4.0);
        changes.insert("m3".to_string(), 0.1);

        let reports = clusterer.detect_coordinated_movement(&changes, 2.0);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0.members.len(), 2);
    }
}
