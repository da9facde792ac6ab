//! Train/test splitting, k-fold cross-validation and exhaustive grid search.

use super::dataset::EncodedRow;
use super::gbm::{BoostParams, Booster};
use super::metrics::mean_squared_error;
use crate::config::GridConfig;
use anyhow::Result;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Shuffle `0..n` and cut off `ceil(test_size * n)` indexes for testing.
/// Returns `(train, test)`.
pub fn train_test_split(n: usize, test_size: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(0.0..1.0).contains(&test_size) || test_size == 0.0 {
        anyhow::bail!("test_size must be in (0, 1), got {}", test_size);
    }
    let n_test = (test_size * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        anyhow::bail!("not enough rows ({}) for a {} test split", n, test_size);
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut StdRng::seed_from_u64(seed));
    let train = order.split_off(n_test);
    Ok((train, order))
}

/// Contiguous k-fold split of `0..n`. The first `n % k` folds hold one
/// extra index. Returns `(train, validation)` per fold.
pub fn k_fold(n: usize, k: usize) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
    if k < 2 {
        anyhow::bail!("cross-validation needs at least 2 folds, got {}", k);
    }
    if n < k {
        anyhow::bail!("cannot split {} training rows into {} folds", n, k);
    }
    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for fold in 0..k {
        let size = n / k + usize::from(fold < n % k);
        let end = start + size;
        let validation: Vec<usize> = (start..end).collect();
        let train: Vec<usize> = (0..start).chain(end..n).collect();
        folds.push((train, validation));
        start = end;
    }
    Ok(folds)
}

/// Every combination of the grid, parameters in alphabetical order with the
/// last one varying fastest.
pub fn param_grid(grid: &GridConfig) -> Vec<BoostParams> {
    let mut out = Vec::new();
    for &colsample_bytree in &grid.colsample_bytree {
        for &learning_rate in &grid.learning_rate {
            for &max_depth in &grid.max_depth {
                for &n_estimators in &grid.n_estimators {
                    for &subsample in &grid.subsample {
                        out.push(BoostParams {
                            n_estimators,
                            learning_rate,
                            max_depth,
                            subsample,
                            colsample_bytree,
                        });
                    }
                }
            }
        }
    }
    out
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub best_params: BoostParams,
    /// Mean negative MSE across folds for the best combination.
    pub best_score: f64,
    /// Every candidate with its mean negative MSE, in grid order.
    pub scores: Vec<(BoostParams, f64)>,
}

fn pick<T: Clone>(items: &[T], idx: &[usize]) -> Vec<T> {
    idx.iter().map(|&i| items[i].clone()).collect()
}

/// Mean negative MSE of `params` across `folds`.
pub fn cross_val_score(
    x: &[EncodedRow],
    y: &[f64],
    n_columns: usize,
    params: &BoostParams,
    folds: &[(Vec<usize>, Vec<usize>)],
    seed: u64,
) -> f64 {
    let total: f64 = folds
        .iter()
        .map(|(train, validation)| {
            let model = Booster::fit(&pick(x, train), &pick(y, train), n_columns, params, seed);
            let predicted = model.predict(&pick(x, validation));
            mean_squared_error(&pick(y, validation), &predicted)
        })
        .sum();
    -(total / folds.len() as f64)
}

/// Score every candidate by k-fold CV. Ties keep the earliest candidate.
pub fn grid_search(
    x: &[EncodedRow],
    y: &[f64],
    n_columns: usize,
    candidates: &[BoostParams],
    cv_folds: usize,
    seed: u64,
) -> Result<SearchResult> {
    if candidates.is_empty() {
        anyhow::bail!("hyperparameter grid is empty");
    }
    let folds = k_fold(y.len(), cv_folds)?;

    let mut scores = Vec::with_capacity(candidates.len());
    let mut best: Option<(BoostParams, f64)> = None;
    for (i, params) in candidates.iter().enumerate() {
        let score = cross_val_score(x, y, n_columns, params, &folds, seed);
        tracing::debug!(
            candidate = i + 1,
            of = candidates.len(),
            ?params,
            score,
            "grid candidate scored"
        );
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((*params, score));
        }
        scores.push((*params, score));
    }

    let (best_params, best_score) = best.ok_or_else(|| anyhow::anyhow!("no candidate scored"))?;
    Ok(SearchResult {
        best_params,
        best_score,
        scores,
    })
}
