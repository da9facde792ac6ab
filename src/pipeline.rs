//! The `enrich` run: tracking sheet in, enriched sheet out.

use crate::config::Config;
use crate::engine::enrich::{enrich_table, require_column, EnrichReport, Enricher, FieldPath};
use crate::engine::index::{build_index, IndexStats, RecordIndex};
use crate::engine::router::{IndexSet, Router};
use crate::storage::{Location, ObjectStore};
use crate::table::Table;
use anyhow::{Context, Result};
use std::io::BufReader;
use std::time::Instant;

/// What one `enrich` run produced.
#[derive(Debug, Clone)]
pub struct EnrichOutcome {
    pub output: Location,
    pub report: EnrichReport,
    pub premarket_stats: IndexStats,
    pub pma_stats: IndexStats,
}

/// Stream one openFDA export into an index on a blocking worker.
pub async fn load_index(
    store: &dyn ObjectStore,
    location: &Location,
    results_field: &str,
    key_field: &str,
) -> Result<(RecordIndex, IndexStats)> {
    let started = Instant::now();
    let reader = store.open(location).await?;
    let results_field = results_field.to_string();
    let key_field = key_field.to_string();

    let (index, stats) = tokio::task::spawn_blocking(move || {
        build_index(BufReader::new(reader), &results_field, &key_field)
    })
    .await
    .context("index worker panicked")?
    .with_context(|| format!("failed to parse device export {}", location))?;

    tracing::info!(
        source = %location,
        records = stats.records,
        indexed = stats.indexed,
        skipped = stats.skipped,
        duplicates = stats.duplicates,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "index built"
    );
    Ok((index, stats))
}

/// Load the 510(k) and PMA indexes, one after the other.
pub async fn load_indexes(config: &Config, store: &dyn ObjectStore) -> Result<IndexSet> {
    let enrich = &config.enrich;

    tracing::info!("indexing 510(k) export");
    let premarket_loc = Location::parse(&config.paths.premarket_index)?;
    let (premarket, premarket_stats) =
        load_index(store, &premarket_loc, &enrich.results_field, &enrich.premarket_key).await?;

    tracing::info!("indexing PMA export");
    let pma_loc = Location::parse(&config.paths.pma_index)?;
    let (pma, pma_stats) =
        load_index(store, &pma_loc, &enrich.results_field, &enrich.pma_key).await?;

    Ok(IndexSet {
        premarket,
        pma,
        premarket_stats,
        pma_stats,
    })
}

/// Read the tracking sheet, join both indexes onto it, write the result.
pub async fn combine_info(config: &Config, store: &dyn ObjectStore) -> Result<EnrichOutcome> {
    let input = Location::parse(&config.paths.input)?;
    let output = Location::parse(&config.paths.output_dir)?.join(&config.paths.output_file);

    let bytes = store.get(&input).await?;
    let table = Table::from_latin1(&bytes)
        .with_context(|| format!("failed to parse tracking sheet {}", input))?;
    tracing::info!(source = %input, rows = table.len(), columns = ?table.headers, "loaded tracking sheet");

    require_column(&table, &config.enrich.id_column)?;

    let indexes = if table.is_empty() {
        tracing::warn!("tracking sheet has no rows, skipping index build");
        IndexSet::default()
    } else {
        load_indexes(config, store).await?
    };

    let router = Router::new(config.enrich.premarket_prefixes.clone());
    let fields: Vec<FieldPath> = config.enrich.fields.iter().map(|f| FieldPath::parse(f)).collect();
    let enricher = Enricher::new(&indexes, &router, &fields);

    let (combined, report) = enrich_table(&table, &config.enrich.id_column, &enricher)?;
    store.put(&output, combined.to_csv()?).await?;

    if !report.unmatched.is_empty() {
        tracing::warn!(
            count = report.unmatched.len(),
            first = %report.unmatched[0],
            "submissions with no data found"
        );
    }
    tracing::info!(
        output = %output,
        rows = report.rows,
        matched_510k = report.matched_premarket,
        matched_pma = report.matched_pma,
        blank = report.blank_ids,
        "enriched sheet written"
    );

    Ok(EnrichOutcome {
        output,
        report,
        premarket_stats: indexes.premarket_stats,
        pma_stats: indexes.pma_stats,
    })
}
