//! Unsupervised outlier scoring of transaction amounts with an ensemble of
//! random partition trees (isolation forest).
//!
//! Points that can be separated from the rest with few random splits sit on
//! short paths and receive scores close to 1. Typical points score around 0.5
//! or below. The flagging threshold is derived from the expected
//! contamination rather than a fixed score cutoff.

use crate::error::Result;
use crate::records::{AnomalyScore, Transaction};
use crate::schema::AnomalyParams;
use crate::utils::{decimal_to_f64, par_map};
use log::{debug, info, warn};
use rand::distributions::Open01;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Score assigned to every point when the population cannot be partitioned.
pub const NEUTRAL_SCORE: f64 = 0.5;

/// Expected path length of an unsuccessful search in a binary search tree
/// built from `n` points. Normalizes path lengths and corrects leaves that
/// still hold several points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Split { value: f64, left: usize, right: usize },
    Leaf { size: usize },
}

/// One random partition tree stored as an arena; the root is node 0.
#[derive(Debug, Clone)]
pub struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn fit(population: &[f64], sample_size: usize, height_limit: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let sample = draw_sample(population, sample_size, &mut rng);

        let mut nodes = Vec::new();
        grow(sample, 0, height_limit, &mut rng, &mut nodes);
        Self { nodes }
    }

    /// Edges from the root to the leaf that would hold `value`, plus the
    /// expected remaining depth of that leaf.
    pub fn path_length(&self, value: f64) -> f64 {
        let mut idx = 0;
        let mut depth = 0usize;

        loop {
            match self.nodes[idx] {
                Node::Split {
                    value: split,
                    left,
                    right,
                } => {
                    depth += 1;
                    idx = if value < split { left } else { right };
                }
                Node::Leaf { size } => return depth as f64 + average_path_length(size),
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

fn draw_sample(population: &[f64], sample_size: usize, rng: &mut StdRng) -> Vec<f64> {
    if population.len() >= sample_size {
        rand::seq::index::sample(rng, population.len(), sample_size)
            .into_iter()
            .map(|i| population[i])
            .collect()
    } else {
        (0..sample_size)
            .map(|_| population[rng.gen_range(0..population.len())])
            .collect()
    }
}

fn grow(
    points: Vec<f64>,
    depth: usize,
    height_limit: usize,
    rng: &mut StdRng,
    nodes: &mut Vec<Node>,
) -> usize {
    let idx = nodes.len();
    nodes.push(Node::Leaf { size: points.len() });

    if points.len() <= 1 || depth >= height_limit {
        return idx;
    }

    let (min, max) = points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if min >= max {
        return idx;
    }

    let split = split_between(min, max, rng);
    let (left_points, right_points): (Vec<f64>, Vec<f64>) =
        points.into_iter().partition(|&v| v < split);

    let left = grow(left_points, depth + 1, height_limit, rng, nodes);
    let right = grow(right_points, depth + 1, height_limit, rng, nodes);
    nodes[idx] = Node::Split {
        value: split,
        left,
        right,
    };
    idx
}

/// Uniform draw strictly inside `(min, max)`. Falls back to the midpoint, then
/// to `max`, when the interval is too narrow to represent the draw.
fn split_between(min: f64, max: f64, rng: &mut StdRng) -> f64 {
    let u: f64 = rng.sample(Open01);
    let mut split = min + (max - min) * u;
    if split <= min || split >= max {
        split = min + (max - min) / 2.0;
    }
    if split <= min {
        split = max;
    }
    split
}

#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    sample_size: usize,
}

impl IsolationForest {
    /// Builds `tree_count` trees over `population`. Per-tree seeds are drawn
    /// in order from the master seed, so the forest does not depend on how
    /// many threads built it.
    pub fn fit(population: &[f64], params: &AnomalyParams) -> Self {
        let height_limit = (params.sample_size as f64).log2().ceil() as usize;
        let mut master = StdRng::seed_from_u64(params.seed);
        let seeds: Vec<u64> = (0..params.tree_count).map(|_| master.gen()).collect();

        let trees = if population.is_empty() {
            Vec::new()
        } else {
            par_map(&seeds, |&seed| {
                IsolationTree::fit(population, params.sample_size, height_limit, seed)
            })
        };

        debug!(
            "Built {} isolation trees (sample size {}, height limit {})",
            trees.len(),
            params.sample_size,
            height_limit
        );

        Self {
            trees,
            sample_size: params.sample_size,
        }
    }

    pub fn average_path_length(&self, value: f64) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: f64 = self.trees.iter().map(|t| t.path_length(value)).sum();
        total / self.trees.len() as f64
    }

    /// Normalized anomaly score in `[0, 1]`.
    pub fn score(&self, value: f64) -> f64 {
        if self.trees.is_empty() {
            return NEUTRAL_SCORE;
        }
        let normalizer = average_path_length(self.sample_size);
        2f64.powf(-self.average_path_length(value) / normalizer)
    }

    pub fn score_all(&self, values: &[f64]) -> Vec<f64> {
        par_map(values, |&v| self.score(v))
    }
}

/// Score at or above which a point is flagged, chosen so that roughly
/// `contamination * n` points are flagged. `None` when nothing should be.
///
/// Equal amounts always score equally, so the k-th highest score may sit
/// inside a group of ties. The cut is then moved to whichever edge of that
/// group lands closer to k; on equal distance the group stays unflagged.
pub fn contamination_threshold(scores: &[f64], contamination: f64) -> Option<f64> {
    let expected = ((contamination * scores.len() as f64).round() as usize).min(scores.len());
    if expected == 0 {
        return None;
    }

    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let boundary = sorted[expected - 1];
    let above = sorted.iter().take_while(|&&s| s > boundary).count();
    let at_or_above = sorted.iter().take_while(|&&s| s >= boundary).count();
    if at_or_above == expected {
        return Some(boundary);
    }

    if expected - above <= at_or_above - expected {
        above.checked_sub(1).map(|last| sorted[last])
    } else {
        Some(boundary)
    }
}

pub struct AnomalyScorer {
    params: AnomalyParams,
}

impl AnomalyScorer {
    pub fn new(params: AnomalyParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &AnomalyParams {
        &self.params
    }

    /// Scores every transaction with a valid amount. Transactions without
    /// one are left out entirely rather than scored as zero.
    pub fn score(&self, transactions: &[Transaction]) -> Vec<AnomalyScore> {
        let scoreable: Vec<(&str, f64)> = transactions
            .iter()
            .filter_map(|tx| {
                tx.amount
                    .and_then(decimal_to_f64)
                    .map(|amount| (tx.id.as_str(), amount))
            })
            .collect();

        let excluded = transactions.len() - scoreable.len();
        if excluded > 0 {
            warn!(
                "Excluded {} transactions without a numeric amount from anomaly scoring",
                excluded
            );
        }

        if scoreable.is_empty() {
            return Vec::new();
        }

        let values: Vec<f64> = scoreable.iter().map(|(_, v)| *v).collect();
        let first = values[0];
        if values.iter().all(|&v| v == first) {
            info!(
                "All {} scoreable amounts are identical; anomaly scores are neutral",
                values.len()
            );
            return scoreable
                .into_iter()
                .map(|(id, _)| AnomalyScore {
                    transaction_id: id.to_string(),
                    score: NEUTRAL_SCORE,
                    is_outlier: false,
                })
                .collect();
        }

        let forest = IsolationForest::fit(&values, &self.params);
        let scores = forest.score_all(&values);
        let threshold = contamination_threshold(&scores, self.params.contamination);

        let results: Vec<AnomalyScore> = scoreable
            .into_iter()
            .zip(scores)
            .map(|((id, _), score)| AnomalyScore {
                transaction_id: id.to_string(),
                score,
                is_outlier: threshold.is_some_and(|t| score >= t),
            })
            .collect();

        info!(
            "Scored {} transactions; {} flagged as outliers (threshold {:?})",
            results.len(),
            results.iter().filter(|r| r.is_outlier).count(),
            threshold
        );

        results
    }
}
