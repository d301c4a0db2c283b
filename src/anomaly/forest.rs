//! Isolation forest over fixed-width feature vectors.
//!
//! Anomalies are isolated by fewer random splits than normal points, so a short
//! average path length across the trees means a high anomaly score.

use rand::{rngs::StdRng, Rng, SeedableRng};

use super::features::{FeatureVector, FEATURE_COUNT};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, PartialEq)]
pub struct ForestParams {
    pub trees: usize,
    pub sample_size: usize,
    /// Expected share of anomalies, in `(0, 0.5]`.
    pub contamination: f64,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            trees: 100,
            sample_size: 256,
            contamination: 0.1,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<Node>,
    /// Average path length of an unsuccessful search in a tree of `sample_size` points.
    normalizer: f64,
    /// Scores strictly below this are anomalies.
    threshold: f64,
}

impl IsolationForest {
    /// Returns `None` when `data` is empty.
    pub fn fit(data: &[FeatureVector], params: &ForestParams) -> Option<Self> {
        if data.is_empty() {
            return None;
        }

        let mut rng = StdRng::seed_from_u64(params.seed);
        let sample_size = params.sample_size.clamp(1, data.len());
        let height_limit = (sample_size as f64).log2().ceil() as usize;

        let trees = (0..params.trees.max(1))
            .map(|_| {
                let sample: Vec<FeatureVector> =
                    rand::seq::index::sample(&mut rng, data.len(), sample_size)
                        .iter()
                        .map(|i| data[i])
                        .collect();
                build(&sample, 0, height_limit, &mut rng)
            })
            .collect();

        let normalizer = match average_path_length(sample_size) {
            c if c > 0.0 => c,
            _ => 1.0,
        };

        let mut forest = Self {
            trees,
            normalizer,
            threshold: f64::NEG_INFINITY,
        };

        let mut scores: Vec<f64> = data.iter().map(|x| forest.score(x)).collect();
        scores.sort_by(|a, b| a.total_cmp(b));
        forest.threshold = percentile(&scores, params.contamination);

        Some(forest)
    }

    /// Negated anomaly score in `[-1, 0)`; lower means more anomalous.
    pub fn score(&self, x: &FeatureVector) -> f64 {
        let mean_depth =
            self.trees.iter().map(|t| path_length(t, x, 0)).sum::<f64>() / self.trees.len() as f64;
        -(2f64).powf(-mean_depth / self.normalizer)
    }

    pub fn is_anomaly(&self, x: &FeatureVector) -> bool {
        self.score(x) < self.threshold
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

fn build(sample: &[FeatureVector], depth: usize, height_limit: usize, rng: &mut StdRng) -> Node {
    if depth >= height_limit || sample.len() <= 1 {
        return Node::Leaf { size: sample.len() };
    }

    let mut splittable = Vec::with_capacity(FEATURE_COUNT);
    for feature in 0..FEATURE_COUNT {
        let (min, max) = column_range(sample, feature);
        if max > min {
            splittable.push((feature, min, max));
        }
    }
    if splittable.is_empty() {
        return Node::Leaf { size: sample.len() };
    }

    let (feature, min, max) = splittable[rng.gen_range(0..splittable.len())];
    let threshold = rng.gen_range(min..max);

    let (left, right): (Vec<FeatureVector>, Vec<FeatureVector>) =
        sample.iter().partition(|x| x[feature] < threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build(&left, depth + 1, height_limit, rng)),
        right: Box::new(build(&right, depth + 1, height_limit, rng)),
    }
}

fn column_range(sample: &[FeatureVector], feature: usize) -> (f64, f64) {
    sample
        .iter()
        .map(|x| x[feature])
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        })
}

fn path_length(node: &Node, x: &FeatureVector, depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            let next = if x[*feature] < *threshold { left } else { right };
            path_length(next, x, depth + 1)
        }
    }
}

/// `c(n)`: expected path length of an unsuccessful BST search among `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        n => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated percentile of sorted `values`, `q` in `[0, 1]`.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}
