use anyhow::{Context, Result};
use device_enrich::config::Config;
use device_enrich::scrape::{summary_pdf_url, PdfScraper};
use device_enrich::storage::{Location, Store};
use device_enrich::{pipeline, training};
use std::path::Path;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config.toml";

const USAGE: &str = "\
usage: device-enrich [enrich|train|scrape] [--config <path>]
                     scrape: [--url <pdf url> | --submission <K-number>]";

/// Value following `flag` on the command line, if any.
fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env first so RUST_LOG and path overrides can live there
    Config::load_env_file();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("device_enrich=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args
        .first()
        .filter(|a| !a.starts_with("--"))
        .map(String::as_str)
        .unwrap_or("enrich");

    let config_path = flag_value(&args, "--config").unwrap_or(DEFAULT_CONFIG);
    let mut config = Config::load_or_default(Path::new(config_path))?;
    config.apply_env_overrides();
    let store = Store::new();

    match command {
        "enrich" => {
            let outcome = pipeline::combine_info(&config, &store).await?;
            let report = &outcome.report;
            println!("  Rows:            {}", report.rows);
            println!("  Matched (510k):  {}", report.matched_premarket);
            println!("  Matched (PMA):   {}", report.matched_pma);
            println!("  Matched (total): {}", report.matched());
            println!("  No data found:   {}", report.unmatched.len());
            println!("  Blank numbers:   {}", report.blank_ids);
            println!("  Written to:      {}", outcome.output);
        }
        "train" => {
            let model = training::train_model(&config.training, &store).await?;
            let p = &model.best_params;
            println!(
                "Best Parameters: n_estimators={} learning_rate={} max_depth={} subsample={} colsample_bytree={}",
                p.n_estimators, p.learning_rate, p.max_depth, p.subsample, p.colsample_bytree
            );
            println!("Best Score (Negative MSE): {}", model.best_cv_score);
            println!("Mean Absolute Error (MAE): {}", model.evaluation.mae);
            println!("Mean Squared Error (MSE): {}", model.evaluation.mse);
            println!("R-squared (R²): {}", model.evaluation.r2);
        }
        "scrape" => {
            let url = match (flag_value(&args, "--url"), flag_value(&args, "--submission")) {
                (Some(url), _) => url.to_string(),
                (None, Some(k)) => summary_pdf_url(k)
                    .with_context(|| format!("cannot derive a summary URL from '{}'", k))?,
                (None, None) => config.scrape.url.clone(),
            };
            let scraper = PdfScraper::new(&config.scrape)?;
            let save_to = Location::parse(&config.scrape.download_path)?;
            let outcome = scraper.scrape(&url, &save_to, &store).await?;
            println!("PDF downloaded successfully ({} bytes, saved to {}).", outcome.bytes, outcome.saved_to);
            if outcome.k_numbers.is_empty() {
                println!("No K-numbers found in the document.");
            } else {
                println!("Extracted K-numbers: {:?}", outcome.k_numbers);
            }
        }
        "help" => println!("{}", USAGE),
        other => anyhow::bail!("unknown command '{}'\n{}", other, USAGE),
    }

    Ok(())
}
