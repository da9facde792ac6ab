//! Review-duration model: predicts days from receipt to decision from the
//! categorical columns of the enriched sheet.

pub mod dataset;
pub mod gbm;
pub mod metrics;
pub mod search;

use crate::config::TrainingConfig;
use crate::storage::{Location, ObjectStore};
use crate::table::Table;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use dataset::{build_dataset, OneHotEncoder, UNKNOWN};
use gbm::{BoostParams, Booster};
use metrics::Evaluation;
use serde::{Deserialize, Serialize};

/// Everything needed to score new rows, plus how the model was chosen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub encoder: OneHotEncoder,
    pub booster: Booster,
    pub best_params: BoostParams,
    /// Mean negative MSE across CV folds for `best_params`.
    pub best_cv_score: f64,
    pub evaluation: Evaluation,
    pub train_rows: usize,
    pub test_rows: usize,
    pub trained_at: DateTime<Utc>,
}

impl TrainedModel {
    /// Predicted days to decision for one row of feature values, in the
    /// order of `encoder.features()`. Blank values count as `Unknown`.
    pub fn predict(&self, values: &[&str]) -> f64 {
        let filled: Vec<&str> = values
            .iter()
            .map(|v| if v.trim().is_empty() { UNKNOWN } else { v.trim() })
            .collect();
        self.booster.predict_row(&self.encoder.transform_row(filled.as_slice()))
    }
}

/// Fit on an in-memory sheet: split, grid-search, refit, evaluate.
pub fn fit(table: &Table, cfg: &TrainingConfig) -> Result<TrainedModel> {
    let data = build_dataset(table, cfg)?;
    tracing::info!(rows = data.len(), dropped = data.dropped, features = ?data.features, "training dataset ready");

    let (train_idx, test_idx) = search::train_test_split(data.len(), cfg.test_size, cfg.seed)?;

    // Categories come from the training split only; unseen test values encode to nothing
    let train_rows: Vec<Vec<String>> = train_idx.iter().map(|&i| data.rows[i].clone()).collect();
    let encoder = OneHotEncoder::fit(&data.features, &train_rows);
    tracing::debug!(columns = ?encoder.column_names(), "one-hot columns");
    let x_train = encoder.transform(&train_rows);
    let y_train: Vec<f64> = train_idx.iter().map(|&i| data.target[i]).collect();
    let x_test: Vec<_> = test_idx.iter().map(|&i| encoder.transform_row(data.rows[i].as_slice())).collect();
    let y_test: Vec<f64> = test_idx.iter().map(|&i| data.target[i]).collect();

    let candidates = search::param_grid(&cfg.grid);
    tracing::info!(
        candidates = candidates.len(),
        folds = cfg.cv_folds,
        columns = encoder.n_columns(),
        "starting grid search"
    );
    let result = search::grid_search(
        &x_train,
        &y_train,
        encoder.n_columns(),
        &candidates,
        cfg.cv_folds,
        cfg.seed,
    )?;
    tracing::info!(params = ?result.best_params, score = result.best_score, "grid search done");

    let booster = Booster::fit(&x_train, &y_train, encoder.n_columns(), &result.best_params, cfg.seed);
    let evaluation = Evaluation::compute(&y_test, &booster.predict(&x_test));
    tracing::info!(mae = evaluation.mae, mse = evaluation.mse, r2 = evaluation.r2, "held-out evaluation");

    Ok(TrainedModel {
        encoder,
        booster,
        best_params: result.best_params,
        best_cv_score: result.best_score,
        evaluation,
        train_rows: y_train.len(),
        test_rows: y_test.len(),
        trained_at: Utc::now(),
    })
}

/// Read the enriched sheet, fit on a blocking worker, persist the model as JSON.
pub async fn train_model(cfg: &TrainingConfig, store: &dyn ObjectStore) -> Result<TrainedModel> {
    let source = Location::parse(&cfg.data)?;
    let bytes = store.get(&source).await?;
    let text = String::from_utf8(bytes)
        .with_context(|| format!("training data {} is not UTF-8", source))?;
    let table = Table::parse(&text).with_context(|| format!("failed to parse {}", source))?;

    let job_cfg = cfg.clone();
    let model = tokio::task::spawn_blocking(move || fit(&table, &job_cfg))
        .await
        .context("training worker panicked")??;

    let destination = Location::parse(&cfg.model_output)?;
    let json = serde_json::to_vec_pretty(&model).context("failed to serialize model")?;
    store.put(&destination, json).await?;
    tracing::info!(output = %destination, "model saved");

    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridConfig;

    fn sheet() -> Table {
        let mut csv = String::from("Panel (lead),Primary Product Code,state,decision_code,date_received,decision_date\n");
        let panels = [("Radiology", "LLZ", 60), ("Cardiovascular", "DQY", 150), ("Neurology", "GZB", 240)];
        for i in 0..45 {
            let (panel, code, days) = panels[i % 3];
            let received = chrono::NaiveDate::from_ymd_opt(2023, 1, 1).unwrap() + chrono::Days::new(i as u64);
            let decided = received + chrono::Days::new(days);
            csv.push_str(&format!("{},{},CA,SESE,{},{}\n", panel, code, received, decided));
        }
        Table::parse(&csv).unwrap()
    }

    fn small_cfg() -> TrainingConfig {
        TrainingConfig {
            grid: GridConfig {
                n_estimators: vec![5, 60],
                learning_rate: vec![0.2],
                max_depth: vec![3],
                subsample: vec![1.0],
                colsample_bytree: vec![1.0],
            },
            cv_folds: 3,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_fit_learns_panel_durations() {
        let model = fit(&sheet(), &small_cfg()).unwrap();
        assert_eq!(model.best_params.n_estimators, 60);
        assert_eq!(model.train_rows, 36);
        assert_eq!(model.test_rows, 9);
        assert!(model.evaluation.r2 > 0.95, "r2 = {}", model.evaluation.r2);
        let days = model.predict(&["Cardiovascular", "DQY", "CA", "SESE"]);
        assert!((days - 150.0).abs() < 5.0, "predicted {}", days);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let a = fit(&sheet(), &small_cfg()).unwrap();
        let b = fit(&sheet(), &small_cfg()).unwrap();
        assert_eq!(a.booster, b.booster);
        assert_eq!(a.evaluation, b.evaluation);
    }

    #[test]
    fn test_too_few_rows_for_folds() {
        let table = Table::parse(
            "Panel (lead),Primary Product Code,state,decision_code,date_received,decision_date\n\
             RA,LLZ,CA,SESE,2024-01-01,2024-02-01\n\
             RA,LLZ,CA,SESE,2024-01-01,2024-03-01\n",
        )
        .unwrap();
        assert!(fit(&table, &small_cfg()).is_err());
    }
}
