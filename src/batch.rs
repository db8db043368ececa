use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{info, warn};

use crate::driver::SessionLauncher;
use crate::extractor::{ExtractionResult, Extractor};

pub const BATCH_RESULTS_FILE: &str = "batch_results.json";

/// Aggregate of one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    #[serde(rename = "total_books")]
    pub total: usize,
    #[serde(rename = "successful_extractions")]
    pub successful: Vec<ExtractionResult>,
    #[serde(rename = "failed_extractions")]
    pub failed: Vec<ExtractionResult>,
    /// Percentage, one decimal.
    pub success_rate: f64,
    pub start_time: DateTime<Local>,
    pub end_time: DateTime<Local>,
    /// Set when an interrupt stopped the run before every URL was tried.
    pub interrupted: bool,
}

impl BatchSummary {
    pub fn processed(&self) -> usize {
        self.successful.len() + self.failed.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty() || self.interrupted
    }

    /// Write `batch_results.json` at the root of `output_dir`.
    pub fn write(&self, output_dir: &Path) -> Result<PathBuf> {
        let path = output_dir.join(BATCH_RESULTS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

/// Observer for batch progress. The binary renders it; tests ignore it.
pub trait BatchProgress {
    fn started(&mut self, _total: usize) {}
    fn item_started(&mut self, _position: usize, _total: usize, _url: &str) {}
    fn item_finished(&mut self, _position: usize, _total: usize, _result: &ExtractionResult) {}
    fn finished(&mut self, _summary: &BatchSummary) {}
}

/// Progress observer that does nothing.
pub struct Silent;

impl BatchProgress for Silent {}

pub fn success_rate(successful: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = successful as f64 / total as f64 * 100.0;
    (pct * 10.0).round() / 10.0
}

/// Extract each URL in order, one at a time. A failed item never stops the batch;
/// only an interrupt on the extractor's cancellation token does.
pub async fn run_batch<L: SessionLauncher>(
    extractor: &Extractor<L>,
    urls: &[String],
    progress: &mut dyn BatchProgress,
) -> BatchSummary {
    let total = urls.len();
    let start_time = Local::now();
    let mut successful = Vec::new();
    let mut failed = Vec::new();
    let mut interrupted = false;

    info!("Starting batch extraction of {} books...", total);
    progress.started(total);

    for (i, url) in urls.iter().enumerate() {
        if extractor.cancellation().is_cancelled() {
            warn!("Batch interrupted, skipping {} remaining URL(s)", total - i);
            interrupted = true;
            break;
        }

        let position = i + 1;
        info!("Processing book {}/{}: {}", position, total, url);
        progress.item_started(position, total, url);

        let result = extractor.extract(url).await;
        progress.item_finished(position, total, &result);
        if result.success {
            successful.push(result);
        } else {
            failed.push(result);
        }
    }

    let summary = BatchSummary {
        total,
        success_rate: success_rate(successful.len(), total),
        successful,
        failed,
        start_time,
        end_time: Local::now(),
        interrupted,
    };

    info!(
        "Batch complete: {}/{} successful, {} failed ({:.1}%)",
        summary.successful.len(),
        total,
        summary.failed.len(),
        summary.success_rate
    );
    progress.finished(&summary);
    summary
}

/// Read a URL list: one per line, blank lines and `#` comments skipped.
pub fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read URL list {}", path.display()))?;
    Ok(parse_url_list(&raw))
}

pub fn parse_url_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

// ── Tests ──
