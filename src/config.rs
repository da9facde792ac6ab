use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

const ENV_FILE: &str = ".env";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub enrich: EnrichConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,
}

/// File locations. Each value is a local path or an `s3://bucket/key` URI.
#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_input")]
    pub input: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    #[serde(default = "default_output_file")]
    pub output_file: String,
    #[serde(default = "default_premarket_index")]
    pub premarket_index: String,
    #[serde(default = "default_pma_index")]
    pub pma_index: String,
}

fn default_input() -> String { "data/input/ml_devices.csv".to_string() }
fn default_output_dir() -> String { "data/output".to_string() }
fn default_output_file() -> String { "aiml_info.csv".to_string() }
fn default_premarket_index() -> String { "data/input/device-510k.json".to_string() }
fn default_pma_index() -> String { "data/input/device-pma.json".to_string() }

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input: default_input(),
            output_dir: default_output_dir(),
            output_file: default_output_file(),
            premarket_index: default_premarket_index(),
            pma_index: default_pma_index(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichConfig {
    #[serde(default = "default_id_column")]
    pub id_column: String,
    /// Top-level member of the openFDA export holding the record array.
    #[serde(default = "default_results_field")]
    pub results_field: String,
    #[serde(default = "default_premarket_key")]
    pub premarket_key: String,
    #[serde(default = "default_pma_key")]
    pub pma_key: String,
    /// Submission numbers with one of these prefixes are looked up in the 510(k) index.
    #[serde(default = "default_premarket_prefixes")]
    pub premarket_prefixes: Vec<String>,
    /// Dotted paths into each record; the output column is the last segment.
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,
}

fn default_id_column() -> String { "Submission Number".to_string() }
fn default_results_field() -> String { "results".to_string() }
fn default_premarket_key() -> String { "k_number".to_string() }
fn default_pma_key() -> String { "pma_number".to_string() }

fn default_premarket_prefixes() -> Vec<String> {
    vec!["K".to_string(), "DEN".to_string()]
}

fn default_fields() -> Vec<String> {
    [
        "city",
        "state",
        "date_received",
        "decision_date",
        "decision_code",
        "expedited_review_flag",
        "openfda.device_class",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            id_column: default_id_column(),
            results_field: default_results_field(),
            premarket_key: default_premarket_key(),
            pma_key: default_pma_key(),
            premarket_prefixes: default_premarket_prefixes(),
            fields: default_fields(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrainingConfig {
    #[serde(default = "default_training_data")]
    pub data: String,
    #[serde(default = "default_model_output")]
    pub model_output: String,
    #[serde(default = "default_features")]
    pub features: Vec<String>,
    #[serde(default = "default_received_column")]
    pub received_column: String,
    #[serde(default = "default_decision_column")]
    pub decision_column: String,
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub grid: GridConfig,
}

fn default_training_data() -> String { "data/output/aiml_info.csv".to_string() }
fn default_model_output() -> String { "models/trained_model.json".to_string() }
fn default_received_column() -> String { "date_received".to_string() }
fn default_decision_column() -> String { "decision_date".to_string() }
fn default_test_size() -> f64 { 0.2 }
fn default_cv_folds() -> usize { 5 }
fn default_seed() -> u64 { 42 }

fn default_features() -> Vec<String> {
    ["Panel (lead)", "Primary Product Code", "state", "decision_code"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data: default_training_data(),
            model_output: default_model_output(),
            features: default_features(),
            received_column: default_received_column(),
            decision_column: default_decision_column(),
            test_size: default_test_size(),
            cv_folds: default_cv_folds(),
            seed: default_seed(),
            grid: GridConfig::default(),
        }
    }
}

/// Hyperparameter values searched exhaustively during training.
#[derive(Debug, Deserialize, Clone)]
pub struct GridConfig {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: Vec<usize>,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: Vec<f64>,
    #[serde(default = "default_max_depth")]
    pub max_depth: Vec<usize>,
    #[serde(default = "default_fractions")]
    pub subsample: Vec<f64>,
    #[serde(default = "default_fractions")]
    pub colsample_bytree: Vec<f64>,
}

fn default_n_estimators() -> Vec<usize> { vec![50, 100, 200] }
fn default_learning_rate() -> Vec<f64> { vec![0.01, 0.1, 0.2] }
fn default_max_depth() -> Vec<usize> { vec![3, 5, 7] }
fn default_fractions() -> Vec<f64> { vec![0.8, 1.0] }

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            learning_rate: default_learning_rate(),
            max_depth: default_max_depth(),
            subsample: default_fractions(),
            colsample_bytree: default_fractions(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScrapeConfig {
    #[serde(default = "default_scrape_url")]
    pub url: String,
    #[serde(default = "default_download_path")]
    pub download_path: String,
    #[serde(default = "default_pattern")]
    pub pattern: String,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_scrape_url() -> String {
    "https://www.accessdata.fda.gov/cdrh_docs/pdf24/K240369.pdf".to_string()
}
fn default_download_path() -> String { "document.pdf".to_string() }
fn default_pattern() -> String { r"K\d{6}".to_string() }
fn default_max_redirects() -> usize { 100 }
fn default_request_timeout() -> u64 { 30_000 }

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            url: default_scrape_url(),
            download_path: default_download_path(),
            pattern: default_pattern(),
            max_redirects: default_max_redirects(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Like [`Config::load`], but a missing file yields the built-in defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse config TOML")
    }

    /// Container deployments set locations through the environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let targets: [(&str, &mut String); 5] = [
            ("INPUT_DIR", &mut self.paths.input),
            ("OUTPUT_DIR", &mut self.paths.output_dir),
            ("PREMARKET_INDEX", &mut self.paths.premarket_index),
            ("PMA_INDEX", &mut self.paths.pma_index),
            ("MODEL_OUTPUT", &mut self.training.model_output),
        ];
        for (key, slot) in targets {
            if let Some(value) = lookup(key).map(|v| sanitize_value(&v)) {
                if !value.is_empty() {
                    tracing::debug!(key, value = %value, "config override from environment");
                    *slot = value;
                }
            }
        }
    }

    /// Load .env file into process environment. Real env vars take precedence.
    pub fn load_env_file() {
        let path = Path::new(ENV_FILE);
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return,
        };
        for (key, value) in env_file_entries(&content, |key| std::env::var(key).is_ok()) {
            std::env::set_var(key, value);
        }
    }
}

/// `KEY=value` pairs from .env content, minus keys for which `is_set` holds.
fn env_file_entries(content: &str, is_set: impl Fn(&str) -> bool) -> Vec<(String, String)> {
    // Strip BOM if present (common on Windows-created files)
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let mut entries = Vec::new();
    for line in content.lines() {
        let line = line.trim().trim_matches('\r');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if !is_set(key) {
                entries.push((key.to_string(), value.to_string()));
            }
        }
    }
    entries
}

/// Strip carriage returns, BOM, and other invisible chars from a path value.
fn sanitize_value(raw: &str) -> String {
    raw.replace(['\r', '\u{feff}', '\u{200b}'], "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_parses() {
        let config = Config::load(Path::new("config.toml")).unwrap();
        assert_eq!(config.enrich.id_column, "Submission Number");
        assert_eq!(config.enrich.premarket_prefixes, vec!["K", "DEN"]);
        assert_eq!(config.training.grid.n_estimators, vec![50, 100, 200]);
        assert_eq!(config.training.cv_folds, 5);
        assert_eq!(config.scrape.pattern, r"K\d{6}");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.paths.input, "data/input/ml_devices.csv");
        assert_eq!(config.paths.output_file, "aiml_info.csv");
        assert_eq!(config.enrich.fields.len(), 7);
        assert_eq!(config.enrich.fields[6], "openfda.device_class");
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.training.grid.subsample, vec![0.8, 1.0]);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config = Config::parse("[paths]\noutput_dir = \"out\"\n").unwrap();
        assert_eq!(config.paths.output_dir, "out");
        assert_eq!(config.paths.pma_index, "data/input/device-pma.json");
    }

    #[test]
    fn test_env_overrides_replace_paths() {
        let env: HashMap<&str, &str> = [
            ("INPUT_DIR", "s3://bucket/in/devices.csv\r"),
            ("OUTPUT_DIR", "/tmp/out"),
            ("PMA_INDEX", ""),
            ("PREMARKET_INDEX", "s3://bucket/in/device-510k.json"),
            ("MODEL_OUTPUT", " s3://bucket/models/model.json "),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.paths.input, "s3://bucket/in/devices.csv");
        assert_eq!(config.paths.output_dir, "/tmp/out");
        assert_eq!(config.paths.premarket_index, "s3://bucket/in/device-510k.json");
        assert_eq!(config.training.model_output, "s3://bucket/models/model.json");
        // Empty values are ignored
        assert_eq!(config.paths.pma_index, "data/input/device-pma.json");
    }

    #[test]
    fn test_env_file_does_not_override_existing_vars() {
        let content = "\u{feff}# paths\nINPUT_DIR=\"data/other.csv\"\nOUTPUT_DIR='out'\n\nRUST_LOG = debug\nnot a pair\n";
        let entries = env_file_entries(content, |key| key == "OUTPUT_DIR");
        assert_eq!(
            entries,
            vec![
                ("INPUT_DIR".to_string(), "data/other.csv".to_string()),
                ("RUST_LOG".to_string(), "debug".to_string()),
            ]
        );
    }
}
