//! Turn the enriched sheet into categorical features and a review-duration target.

use crate::config::TrainingConfig;
use crate::table::Table;
use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Placeholder for blank categorical values.
pub const UNKNOWN: &str = "Unknown";

/// Parse the date formats seen in openFDA exports and hand-kept sheets.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    // Accept "2024-05-03T00:00:00" style timestamps by their date part
    let date_part = raw.split(['T', ' ']).next().unwrap_or(raw);
    ["%Y-%m-%d", "%Y%m%d", "%m/%d/%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// Rows ready for encoding: one categorical value per feature, one target each.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub features: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Days from receipt to decision.
    pub target: Vec<f64>,
    /// Rows dropped for a missing or unparsable date.
    pub dropped: usize,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }
}

fn column(table: &Table, name: &str) -> Result<usize> {
    match table.column(name) {
        Some(idx) => Ok(idx),
        None => anyhow::bail!("training column '{}' not found in the CSV file", name),
    }
}

pub fn build_dataset(table: &Table, cfg: &TrainingConfig) -> Result<Dataset> {
    let received = column(table, &cfg.received_column)?;
    let decided = column(table, &cfg.decision_column)?;
    let feature_cols = cfg
        .features
        .iter()
        .map(|f| column(table, f))
        .collect::<Result<Vec<_>>>()?;

    let mut rows = Vec::new();
    let mut target = Vec::new();
    let mut dropped = 0;

    for row in &table.rows {
        let dates = parse_date(&row[received]).zip(parse_date(&row[decided]));
        let Some((received_on, decided_on)) = dates else {
            dropped += 1;
            continue;
        };
        let days = (decided_on - received_on).num_days();
        let values = feature_cols
            .iter()
            .map(|&c| {
                let v = row[c].trim();
                if v.is_empty() { UNKNOWN.to_string() } else { v.to_string() }
            })
            .collect();
        rows.push(values);
        target.push(days as f64);
    }

    if dropped > 0 {
        tracing::info!(dropped, kept = target.len(), "dropped rows without both dates");
    }

    Ok(Dataset {
        features: cfg.features.clone(),
        rows,
        target,
        dropped,
    })
}

/// Sparse one-hot row: sorted indexes of the active columns.
pub type EncodedRow = Vec<u32>;

/// One-hot encoder over categorical features. Categories unseen at fit time
/// encode to no active column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    features: Vec<String>,
    /// Sorted categories per feature.
    categories: Vec<Vec<String>>,
    /// First column index of each feature.
    offsets: Vec<u32>,
    n_columns: usize,
}

impl OneHotEncoder {
    pub fn fit(features: &[String], rows: &[Vec<String>]) -> Self {
        let mut categories: Vec<Vec<String>> = vec![Vec::new(); features.len()];
        for row in rows {
            for (f, value) in row.iter().enumerate() {
                categories[f].push(value.clone());
            }
        }
        let mut offsets = Vec::with_capacity(features.len());
        let mut next = 0u32;
        for cats in &mut categories {
            cats.sort();
            cats.dedup();
            offsets.push(next);
            next += cats.len() as u32;
        }
        Self {
            features: features.to_vec(),
            categories,
            offsets,
            n_columns: next as usize,
        }
    }

    pub fn n_columns(&self) -> usize {
        self.n_columns
    }

    pub fn features(&self) -> &[String] {
        &self.features
    }

    pub fn transform_row<S: AsRef<str>>(&self, row: &[S]) -> EncodedRow {
        row.iter()
            .zip(&self.categories)
            .zip(&self.offsets)
            .filter_map(|((value, cats), &offset)| {
                cats.binary_search_by(|c| c.as_str().cmp(value.as_ref()))
                    .ok()
                    .map(|pos| offset + pos as u32)
            })
            .collect()
    }

    pub fn transform(&self, rows: &[Vec<String>]) -> Vec<EncodedRow> {
        rows.iter().map(|r| self.transform_row(r.as_slice())).collect()
    }

    /// `feature_category` name for every output column.
    pub fn column_names(&self) -> Vec<String> {
        self.features
            .iter()
            .zip(&self.categories)
            .flat_map(|(f, cats)| cats.iter().map(move |c| format!("{}_{}", f, c)))
            .collect()
    }
}
