//! Regression error metrics. All take equal-length, non-empty slices.

use serde::{Deserialize, Serialize};

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    debug_assert_eq!(actual.len(), predicted.len());
    let total: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).abs()).sum();
    total / actual.len() as f64
}

pub fn mean_squared_error(actual: &[f64], predicted: &[f64]) -> f64 {
    debug_assert_eq!(actual.len(), predicted.len());
    let total: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2)).sum();
    total / actual.len() as f64
}

/// Coefficient of determination. With a constant target this is 1.0 for a
/// perfect prediction and 0.0 otherwise.
pub fn r2_score(actual: &[f64], predicted: &[f64]) -> f64 {
    debug_assert_eq!(actual.len(), predicted.len());
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_res: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2)).sum();
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Held-out evaluation of a fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub mae: f64,
    pub mse: f64,
    pub r2: f64,
}

impl Evaluation {
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Self {
        Self {
            mae: mean_absolute_error(actual, predicted),
            mse: mean_squared_error(actual, predicted),
            r2: r2_score(actual, predicted),
        }
    }
}
