//! Isolation forest: 100 trees over a 256-point subsample, max depth
//! `ceil(log2(256)) = 8`. Rebuilt from the market's rolling history on each
//! call — history windows are capped at 200 points (see `mod.rs`), so this
//! stays cheap.

use parking_lot::Mutex;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

const TREE_COUNT: usize = 100;
const SUBSAMPLE: usize = 256;
const MAX_DEPTH: u32 = 8; // ceil(log2(256))

enum Node {
    Leaf { size: usize },
    Split { feature: usize, value: f64, left: Box<Node>, right: Box<Node> },
}

pub struct IsolationForest {
    trees: usize,
    subsample: usize,
    rng: Mutex<ChaCha8Rng>,
}

impl IsolationForest {
    pub fn new(trees: usize, subsample: usize, rng: ChaCha8Rng) -> Self {
        Self {
            trees: if trees == 0 { TREE_COUNT } else { trees },
            subsample: if subsample == 0 { SUBSAMPLE } else { subsample },
            rng: Mutex::new(rng),
        }
    }

    /// `history` must contain feature vectors of fixed dimension; `point`
    /// is scored against a forest rebuilt from `history` for this call.
    pub fn anomaly_score(&self, history: &[[f64; 6]], point: &[f64; 6]) -> f64 {
        if history.len() < 2 {
            return 0.0;
        }
        let subsample_size = self.subsample.min(history.len());
        let mut rng = self.rng.lock();

        let mut total_path = 0.0;
        for _ in 0..self.trees {
            let sample = draw_subsample(history, subsample_size, &mut rng);
            let root = build_tree(&sample, 0, MAX_DEPTH, &mut rng);
            total_path += path_length(&root, point, 0);
        }
        let avg_path = total_path / self.trees as f64;
        let c = c_factor(subsample_size as f64);
        if c <= 0.0 {
            return 0.0;
        }
        2f64.powf(-avg_path / c)
    }
}

fn draw_subsample(history: &[[f64; 6]], size: usize, rng: &mut ChaCha8Rng) -> Vec<[f64; 6]> {
    let mut out = Vec::with_capacity(size);
    for _ in 0..size {
        let idx = rng.gen_range(0..history.len());
        out.push(history[idx]);
    }
    out
}

fn build_tree(sample: &[[f64; 6]], depth: u32, max_depth: u32, rng: &mut ChaCha8Rng) -> Node {
    if depth >= max_depth || sample.len() <= 1 {
        return Node::Leaf { size: sample.len() };
    }

    let feature = rng.gen_range(0..6);
    let (min, max) = sample.iter().fold((f64::MAX, f64::MIN), |(mn, mx), row| {
        (mn.min(row[feature]), mx.max(row[feature]))
    });
    if min == max {
        return Node::Leaf { size: sample.len() };
    }
    let split = rng.gen_range(min..max);

    let (left, right): (Vec<_>, Vec<_>) = sample.iter().partition(|row| row[feature] < split);
    if left.is_empty() || right.is_empty() {
        return Node::Leaf { size: sample.len() };
    }

    Node::Split {
        feature,
        value: split,
        left: Box::new(build_tree(&left, depth + 1, max_depth, rng)),
        right: Box::new(build_tree(&right, depth + 1, max_depth, rng)),
    }
}

fn path_length(node: &Node, point: &[f64; 6], depth: u32) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + c_factor(*size as f64),
        Node::Split { feature, value, left, right } => {
            if point[*feature] < *value {
                path_length(left, point, depth + 1)
            } else {
                path_length(right, point, depth + 1)
            }
        }
    }
}

const EULER_MASCHERONI: f64 = 0.5772156649015329;

/// Average path length of an unsuccessful search in a BST of `n` items.
fn c_factor(n: f64) -> f64 {
    if n <= 1.0 {
        return 0.0;
    }
    2.0 * (harmonic(n - 1.0)) - (2.0 * (n - 1.0) / n)
}

fn harmonic(n: f64) -> f64 {
    if n <= 0.0 {
        0.0
    } else {
        n.ln() + EULER_MASCHERONI
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn outlier_scores_higher_than_inlier() {
        let rng = ChaCha8Rng::seed_from_u64(7);
        let forest = IsolationForest::new(50, 64, rng);
        let history: Vec<[f64; 6]> = (0..80)
            .map(|i| {
                let j = (i % 7) as f64;
                [100.0 + j, 50.0 + j, 10.0, 0.0, 0.5, 0.1]
            })
            .collect();

        let inlier = [101.0, 51.0, 10.0, 0.0, 0.5, 0.1];
        let outlier = [5_000.0, -200.0, 300.0, 10.0, 50.0, 20.0];

        let inlier_score = forest.anomaly_score(&history, &inlier);
        let outlier_score = forest.anomaly_score(&history, &outlier);
        assert!(outlier_score > inlier_score, "{outlier_score} <= {inlier_score}");
    }

    #[test]
    fn c_factor_matches_known_values() {
        assert!((c_factor(1.0) - 0.0).abs() < 1e-9);
        assert!(c_factor(256.0) > 0.0);
    }
}
