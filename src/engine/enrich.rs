//! Join device records onto tracking-sheet rows by submission number.

use super::index::Record;
use super::router::{Collection, IndexSet, Router};
use crate::table::Table;
use anyhow::Result;
use serde_json::Value;
use std::time::Instant;

/// Dotted path into a record, e.g. `openfda.device_class`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(path: &str) -> Self {
        Self {
            segments: path.split('.').map(|s| s.trim().to_string()).collect(),
        }
    }

    /// Output column name: the last path segment.
    pub fn column(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    pub fn resolve<'a>(&self, record: &'a Record) -> Option<&'a Value> {
        let (first, rest) = self.segments.split_first()?;
        let mut value = record.get(first)?;
        for segment in rest {
            value = value.as_object()?.get(segment)?;
        }
        Some(value)
    }
}

/// Render a JSON value as a spreadsheet cell. Null renders as an empty cell.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Result of looking up one submission number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub collection: Collection,
    /// One cell per configured field; `None` when no record was found.
    pub values: Option<Vec<String>>,
}

impl Lookup {
    pub fn is_match(&self) -> bool {
        self.values.is_some()
    }
}

pub struct Enricher<'a> {
    indexes: &'a IndexSet,
    router: &'a Router,
    fields: &'a [FieldPath],
}

impl<'a> Enricher<'a> {
    pub fn new(indexes: &'a IndexSet, router: &'a Router, fields: &'a [FieldPath]) -> Self {
        Self { indexes, router, fields }
    }

    pub fn columns(&self) -> impl Iterator<Item = &'a str> + 'a {
        self.fields.iter().map(FieldPath::column)
    }

    pub fn lookup(&self, submission: &str) -> Lookup {
        let collection = self.router.route(submission);
        let values = self.indexes.get(collection, submission).map(|record| {
            self.fields
                .iter()
                .map(|f| f.resolve(record).map(render_value).unwrap_or_default())
                .collect()
        });
        Lookup { collection, values }
    }
}

/// Per-run join counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichReport {
    pub rows: usize,
    pub matched_premarket: usize,
    pub matched_pma: usize,
    pub blank_ids: usize,
    /// Submission numbers found in neither index, in row order.
    pub unmatched: Vec<String>,
}

impl EnrichReport {
    pub fn matched(&self) -> usize {
        self.matched_premarket + self.matched_pma
    }
}

/// Position of the id column, or the run's single validation failure.
pub fn require_column(table: &Table, id_column: &str) -> Result<usize> {
    match table.column(id_column) {
        Some(idx) => Ok(idx),
        None => anyhow::bail!("'{}' column not found in the CSV file", id_column),
    }
}

/// Append the enrichment columns to every row of `table`.
///
/// Original cells are kept in order. Rows whose submission number is blank
/// or unknown get empty enrichment cells.
pub fn enrich_table(
    table: &Table,
    id_column: &str,
    enricher: &Enricher<'_>,
) -> Result<(Table, EnrichReport)> {
    let id_idx = require_column(table, id_column)?;
    let width = enricher.fields.len();

    let mut headers = table.headers.clone();
    headers.extend(enricher.columns().map(str::to_string));

    let mut report = EnrichReport {
        rows: table.len(),
        ..Default::default()
    };
    let mut rows = Vec::with_capacity(table.len());

    for row in &table.rows {
        let submission = row.get(id_idx).map(|s| s.trim()).unwrap_or("");
        let mut out = row.clone();

        if submission.is_empty() {
            report.blank_ids += 1;
            tracing::warn!(data_row = rows.len() + 1, "blank submission number");
            out.extend(std::iter::repeat(String::new()).take(width));
            rows.push(out);
            continue;
        }

        let started = Instant::now();
        let lookup = enricher.lookup(submission);
        tracing::debug!(
            submission,
            collection = lookup.collection.label(),
            matched = lookup.is_match(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "lookup"
        );

        match lookup.values {
            Some(values) => {
                match lookup.collection {
                    Collection::Premarket => report.matched_premarket += 1,
                    Collection::Pma => report.matched_pma += 1,
                }
                out.extend(values);
            }
            None => {
                tracing::debug!(submission, "no data found");
                report.unmatched.push(submission.to_string());
                out.extend(std::iter::repeat(String::new()).take(width));
            }
        }
        rows.push(out);
    }

    Ok((Table { headers, rows }, report))
}
