//! Gradient-boosted regression trees over sparse one-hot rows.
//!
//! Squared-error objective, so each round fits a tree to the current
//! residuals. Every split tests one encoded column: rows with the column
//! active go to `present`, the rest to `absent`.
//!
//! Split gain and leaf weights use L2 regularisation on the leaf sums:
//!   `gain = S_l^2/(n_l+λ) + S_r^2/(n_r+λ) - S^2/(n+λ)`
//!   `leaf = learning_rate * S/(n+λ)`
//! where `S` is the residual sum and `n` the row count in the node.

use super::dataset::EncodedRow;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// L2 regularisation on leaf weights.
const LAMBDA: f64 = 1.0;

/// Splits gaining less than this become leaves.
const MIN_GAIN: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub subsample: f64,
    pub colsample_bytree: f64,
}

impl Default for BoostParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            subsample: 1.0,
            colsample_bytree: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Leaf {
        value: f64,
    },
    Split {
        column: u32,
        present: Box<Node>,
        absent: Box<Node>,
    },
}

impl Node {
    pub fn predict(&self, row: &[u32]) -> f64 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { value } => return *value,
                Node::Split { column, present, absent } => {
                    node = if row.binary_search(column).is_ok() { present } else { absent };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 0,
            Node::Split { present, absent, .. } => 1 + present.depth().max(absent.depth()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booster {
    pub params: BoostParams,
    pub base_score: f64,
    pub trees: Vec<Node>,
}

/// Draw `fraction` of `0..n` without replacement, at least one, sorted.
fn sample_fraction(rng: &mut StdRng, n: usize, fraction: f64) -> Vec<usize> {
    if fraction >= 1.0 || n == 0 {
        return (0..n).collect();
    }
    let amount = ((n as f64 * fraction).round() as usize).clamp(1, n);
    let mut picked = rand::seq::index::sample(rng, n, amount).into_vec();
    picked.sort_unstable();
    picked
}

struct TreeBuilder<'a> {
    x: &'a [EncodedRow],
    residual: &'a [f64],
    allowed: &'a [bool],
    max_depth: usize,
    learning_rate: f64,
    /// Per-column (residual sum, row count) scratch, reset after each node.
    acc: Vec<(f64, usize)>,
}

impl<'a> TreeBuilder<'a> {
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> Node {
        let count = rows.len();
        let sum: f64 = rows.iter().map(|&i| self.residual[i]).sum();
        let leaf = Node::Leaf {
            value: self.learning_rate * sum / (count as f64 + LAMBDA),
        };
        if depth >= self.max_depth || count < 2 {
            return leaf;
        }

        let mut touched: Vec<u32> = Vec::new();
        for &i in &rows {
            for &c in &self.x[i] {
                if !self.allowed[c as usize] {
                    continue;
                }
                let slot = &mut self.acc[c as usize];
                if slot.1 == 0 {
                    touched.push(c);
                }
                slot.0 += self.residual[i];
                slot.1 += 1;
            }
        }
        touched.sort_unstable();

        let parent = sum * sum / (count as f64 + LAMBDA);
        let mut best: Option<(u32, f64)> = None;
        for &c in &touched {
            let (sum_l, n_l) = self.acc[c as usize];
            self.acc[c as usize] = (0.0, 0);
            let n_r = count - n_l;
            if n_l == 0 || n_r == 0 {
                continue;
            }
            let sum_r = sum - sum_l;
            let gain = sum_l * sum_l / (n_l as f64 + LAMBDA)
                + sum_r * sum_r / (n_r as f64 + LAMBDA)
                - parent;
            if gain > MIN_GAIN && best.is_none_or(|(_, g)| gain > g) {
                best = Some((c, gain));
            }
        }

        let Some((column, _)) = best else {
            return leaf;
        };
        let (present, absent): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&i| self.x[i].binary_search(&column).is_ok());
        Node::Split {
            column,
            present: Box::new(self.grow(present, depth + 1)),
            absent: Box::new(self.grow(absent, depth + 1)),
        }
    }
}

impl Booster {
    /// Fit `params.n_estimators` trees. Row and column subsampling draw from
    /// an RNG seeded with `seed`, so a fit is reproducible.
    pub fn fit(
        x: &[EncodedRow],
        y: &[f64],
        n_columns: usize,
        params: &BoostParams,
        seed: u64,
    ) -> Self {
        let n = y.len();
        let base_score = if n == 0 { 0.0 } else { y.iter().sum::<f64>() / n as f64 };
        let mut predictions = vec![base_score; n];
        let mut residual = vec![0.0; n];
        let mut rng = StdRng::seed_from_u64(seed);
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut acc = vec![(0.0, 0usize); n_columns];

        for _ in 0..params.n_estimators {
            for i in 0..n {
                residual[i] = y[i] - predictions[i];
            }
            let rows = sample_fraction(&mut rng, n, params.subsample);
            let mut allowed = vec![false; n_columns];
            for c in sample_fraction(&mut rng, n_columns, params.colsample_bytree) {
                allowed[c] = true;
            }

            let mut builder = TreeBuilder {
                x,
                residual: &residual,
                allowed: &allowed,
                max_depth: params.max_depth,
                learning_rate: params.learning_rate,
                acc: std::mem::take(&mut acc),
            };
            let tree = builder.grow(rows, 0);
            acc = builder.acc;

            for (pred, row) in predictions.iter_mut().zip(x) {
                *pred += tree.predict(row);
            }
            trees.push(tree);
        }

        Self {
            params: *params,
            base_score,
            trees,
        }
    }

    pub fn predict_row(&self, row: &[u32]) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }

    pub fn predict(&self, x: &[EncodedRow]) -> Vec<f64> {
        x.iter().map(|row| self.predict_row(row)).collect()
    }
}
