//! Pull a 510(k) summary PDF and list the K-numbers it cites.

use crate::config::ScrapeConfig;
use crate::storage::{Location, ObjectStore};
use anyhow::{Context, Result};
use regex::Regex;
use reqwest::Client;
use std::time::Duration;

const SUMMARY_PDF_BASE: &str = "https://www.accessdata.fda.gov/cdrh_docs";

/// Summary PDF URL for a K-number: `K240369` lives under `pdf24/`.
pub fn summary_pdf_url(k_number: &str) -> Option<String> {
    let k_number = k_number.trim();
    let digits = k_number.strip_prefix('K')?;
    if digits.len() < 2 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("{}/pdf{}/{}.pdf", SUMMARY_PDF_BASE, &digits[..2], k_number))
}

/// Every match of `pattern` in `text`, in order, duplicates kept.
pub fn extract_submission_numbers(text: &str, pattern: &Regex) -> Vec<String> {
    pattern
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Text of every page, joined with newlines. Pages without text are skipped.
pub fn pdf_text(pdf_bytes: &[u8]) -> Result<String> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
        .map_err(|e| anyhow::anyhow!("failed to extract PDF text: {}", e))?;
    let mut full_text = String::new();
    for page in pages.iter().filter(|p| !p.trim().is_empty()) {
        full_text.push_str(page);
        full_text.push('\n');
    }
    Ok(full_text)
}

pub struct PdfScraper {
    client: Client,
    pattern: Regex,
}

#[derive(Debug, Clone)]
pub struct ScrapeOutcome {
    pub url: String,
    pub saved_to: Location,
    pub bytes: usize,
    pub k_numbers: Vec<String>,
}

impl PdfScraper {
    pub fn new(cfg: &ScrapeConfig) -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(cfg.max_redirects))
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .context("failed to build HTTP client")?;
        let pattern = Regex::new(&cfg.pattern)
            .with_context(|| format!("invalid submission pattern: {}", cfg.pattern))?;
        Ok(Self { client, pattern })
    }

    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("GET {} failed ({}): {}", url, status, body);
        }
        let bytes = resp
            .bytes()
            .await
            .with_context(|| format!("failed to read body of {}", url))?;
        Ok(bytes.to_vec())
    }

    /// Download `url`, keep a copy at `save_to`, and scan its text.
    pub async fn scrape(
        &self,
        url: &str,
        save_to: &Location,
        store: &dyn ObjectStore,
    ) -> Result<ScrapeOutcome> {
        let pdf = self.download(url).await?;
        let size = pdf.len();
        tracing::info!(url, bytes = size, "PDF downloaded");
        store.put(save_to, pdf.clone()).await?;

        let text = tokio::task::spawn_blocking(move || pdf_text(&pdf))
            .await
            .context("PDF text worker panicked")??;
        let k_numbers = extract_submission_numbers(&text, &self.pattern);
        tracing::info!(url, found = k_numbers.len(), "PDF scanned");

        Ok(ScrapeOutcome {
            url: url.to_string(),
            saved_to: save_to.clone(),
            bytes: size,
            k_numbers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Single-page PDF with one line of Helvetica text.
    fn make_test_pdf(text: &str) -> Vec<u8> {
        use lopdf::dictionary;
        use lopdf::{Document, Object, Stream};

        let mut doc = Document::with_version("1.4");
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let content = format!("BT /F1 12 Tf 100 700 Td ({text}) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        });
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        });
        if let Ok(Object::Dictionary(dict)) = doc.get_object_mut(page_id) {
            dict.set("Parent", pages_id);
        }
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    fn k_pattern() -> Regex {
        Regex::new(r"K\d{6}").unwrap()
    }

    #[test]
    fn test_extract_keeps_order_and_duplicates() {
        let text = "Predicate devices: K192345 and K201111.\nSee also K192345, K12345 (short), DEN200045.";
        assert_eq!(
            extract_submission_numbers(text, &k_pattern()),
            vec!["K192345", "K201111", "K192345"]
        );
        assert!(extract_submission_numbers("no numbers here", &k_pattern()).is_empty());
    }

    #[test]
    fn test_summary_pdf_url() {
        assert_eq!(
            summary_pdf_url("K240369").as_deref(),
            Some("https://www.accessdata.fda.gov/cdrh_docs/pdf24/K240369.pdf")
        );
        assert_eq!(summary_pdf_url("P170019"), None);
        assert_eq!(summary_pdf_url("K2"), None);
        assert_eq!(summary_pdf_url("K24A369"), None);
    }

    #[test]
    fn test_pdf_text_finds_k_numbers() {
        let pdf = make_test_pdf("Substantially equivalent to K192345");
        let text = pdf_text(&pdf).unwrap();
        assert_eq!(extract_submission_numbers(&text, &k_pattern()), vec!["K192345"]);
    }

    #[test]
    fn test_pdf_text_rejects_garbage() {
        assert!(pdf_text(b"not a pdf").is_err());
    }

    #[test]
    fn test_invalid_pattern_is_error() {
        let cfg = ScrapeConfig {
            pattern: "K(\\d{6}".to_string(),
            ..ScrapeConfig::default()
        };
        assert!(PdfScraper::new(&cfg).is_err());
    }
}
