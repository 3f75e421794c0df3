//! One-dimensional isolation forest.
//!
//! Values that sit far from the bulk of the training data are separated from
//! it after fewer partitioning steps, so a short average root-to-leaf path
//! means a high anomaly score.
//!
//! By default every tree is grown from the same deterministic stride sample
//! with midpoint splits, which makes fitting reproducible bit for bit. The
//! seeded random variants are kept reproducible as well: tree `i` draws from
//! a generator seeded with `seed + i`.

use crate::{Detector, IsolationForestConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use traffic_core::{reason, AnomalyResult, DetectionMethod, ResultBuilder};

const EULER_MASCHERONI: f64 = 0.5772156649;

/// How each tree's training sample is drawn from the fit data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// Every `k`-th value with `k = len / sample_size + 1`.
    #[default]
    Stride,
    /// `sample_size` distinct positions, without replacement.
    UniformRandom,
    /// `sample_size` positions, with replacement.
    Bootstrap,
}

/// Where an internal node splits the range `[min, max]` of its values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitPolicy {
    #[default]
    Midpoint,
    UniformRandom,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IsolationNode {
    Leaf {
        size: usize,
    },
    Internal {
        split_value: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
}

impl IsolationNode {
    /// Edges from this node to the leaf `value` falls into, plus the expected
    /// remaining depth `c(size)` of that leaf.
    pub fn path_length(&self, value: f64) -> f64 {
        let mut node = self;
        let mut depth = 0usize;
        loop {
            match node {
                IsolationNode::Leaf { size } => {
                    return depth as f64 + average_path_length(*size);
                }
                IsolationNode::Internal {
                    split_value,
                    left,
                    right,
                } => {
                    node = if value < *split_value { left } else { right };
                    depth += 1;
                }
            }
        }
    }

    /// Height of the subtree rooted here; a lone leaf has height 0.
    pub fn height(&self) -> usize {
        match self {
            IsolationNode::Leaf { .. } => 0,
            IsolationNode::Internal { left, right, .. } => 1 + left.height().max(right.height()),
        }
    }

    /// Number of training values stored under this node.
    pub fn size(&self) -> usize {
        match self {
            IsolationNode::Leaf { size } => *size,
            IsolationNode::Internal { left, right, .. } => left.size() + right.size(),
        }
    }
}

/// `c(n)`: average path length of an unsuccessful search in a binary search
/// tree of `n` items.
pub fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + EULER_MASCHERONI) - 2.0 * (n - 1.0) / n
}

#[derive(Debug, Clone)]
pub struct IsolationForest {
    config: IsolationForestConfig,
    trees: Vec<IsolationNode>,
}

impl IsolationForest {
    pub fn new(n_trees: usize, sample_size: usize) -> Self {
        Self::from_config(IsolationForestConfig {
            n_trees,
            sample_size,
            ..IsolationForestConfig::default()
        })
    }

    pub fn from_config(config: IsolationForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
        }
    }

    pub fn with_sampling(mut self, sampling: SamplingStrategy) -> Self {
        self.config.sampling = sampling;
        self
    }

    pub fn with_split(mut self, split: SplitPolicy) -> Self {
        self.config.split = split;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn config(&self) -> &IsolationForestConfig {
        &self.config
    }

    pub fn trees(&self) -> &[IsolationNode] {
        &self.trees
    }

    pub fn is_trained(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Grow `n_trees` trees from `data`, replacing any previous model.
    pub fn fit(&mut self, data: &[f64]) {
        self.trees.clear();

        if data.is_empty() {
            warn!("isolation forest fit called with no data; model left untrained");
            return;
        }

        let effective = data.len().min(self.config.sample_size);
        if effective == 0 {
            warn!("isolation forest sample_size is 0; model left untrained");
            return;
        }
        let max_depth = (effective as f64).log2().ceil() as usize;

        self.trees = (0..self.config.n_trees)
            .map(|index| {
                let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(index as u64));
                let sample = self.draw_sample(data, effective, &mut rng);
                build_tree(&sample, 0, max_depth, self.config.split, &mut rng)
            })
            .collect();

        debug!(
            n_trees = self.trees.len(),
            data_len = data.len(),
            effective_sample_size = effective,
            max_depth,
            sampling = ?self.config.sampling,
            split = ?self.config.split,
            "isolation forest fitted"
        );
    }

    fn draw_sample(&self, data: &[f64], effective: usize, rng: &mut StdRng) -> Vec<f64> {
        match self.config.sampling {
            SamplingStrategy::Stride => {
                let stride = data.len() / effective + 1;
                data.iter().step_by(stride).copied().collect()
            }
            SamplingStrategy::UniformRandom => rand::seq::index::sample(rng, data.len(), effective)
                .into_iter()
                .map(|index| data[index])
                .collect(),
            SamplingStrategy::Bootstrap => (0..effective)
                .map(|_| data[rng.random_range(0..data.len())])
                .collect(),
        }
    }

    pub fn path_length(&self, value: f64, tree: &IsolationNode) -> f64 {
        tree.path_length(value)
    }

    pub fn predict(&self, value: f64, threshold: f64) -> AnomalyResult {
        let method = DetectionMethod::IsolationForest.as_str();

        if !self.is_trained() {
            return AnomalyResult::unavailable(method, threshold, reason::NOT_TRAINED);
        }

        let avg_path = self
            .trees
            .iter()
            .map(|tree| tree.path_length(value))
            .sum::<f64>()
            / self.trees.len() as f64;

        let c = average_path_length(self.config.sample_size);
        let score = if c > 0.0 {
            2f64.powf(-avg_path / c)
        } else {
            0.0
        };
        debug!(value, avg_path, score, "isolation forest evaluated");

        ResultBuilder::new(method)
            .anomaly(score > threshold)
            .score(score)
            .threshold(threshold)
            .detail("avg_path_length", avg_path)
            .detail("anomaly_score", score)
            .build()
    }
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::from_config(IsolationForestConfig::default())
    }
}

impl Detector for IsolationForest {
    fn name(&self) -> &'static str {
        "isolation_forest"
    }

    fn reset(&mut self) {
        self.trees.clear();
    }
}

fn build_tree(
    data: &[f64],
    depth: usize,
    max_depth: usize,
    split: SplitPolicy,
    rng: &mut StdRng,
) -> IsolationNode {
    if depth >= max_depth || data.len() <= 1 {
        return IsolationNode::Leaf { size: data.len() };
    }

    let (min, max) = data
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), &x| {
            (min.min(x), max.max(x))
        });

    if min == max {
        return IsolationNode::Leaf { size: data.len() };
    }

    let split_value = match split {
        SplitPolicy::Midpoint => min + (max - min) * 0.5,
        SplitPolicy::UniformRandom => min + rng.random::<f64>() * (max - min),
    };

    let (left, right): (Vec<f64>, Vec<f64>) = data.iter().partition(|&&x| x < split_value);

    IsolationNode::Internal {
        split_value,
        left: Box::new(build_tree(&left, depth + 1, max_depth, split, rng)),
        right: Box::new(build_tree(&right, depth + 1, max_depth, split, rng)),
    }
}
