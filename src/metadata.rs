use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::info;

use crate::error::MetadataError;
use crate::extractor::ExtractionResult;

pub const METADATA_DIR: &str = "metadata";

/// JSON document stored next to each extracted book.
#[derive(Debug, Serialize)]
pub struct MetadataRecord<'a> {
    pub extraction_date: DateTime<Local>,
    pub extractor_version: &'static str,
    #[serde(flatten)]
    pub result: &'a ExtractionResult,
}

impl<'a> MetadataRecord<'a> {
    pub fn new(result: &'a ExtractionResult) -> Self {
        Self {
            extraction_date: Local::now(),
            extractor_version: env!("CARGO_PKG_VERSION"),
            result,
        }
    }
}

pub fn metadata_path(output_dir: &Path, item_id: &str) -> PathBuf {
    output_dir
        .join(METADATA_DIR)
        .join(format!("{}_metadata.json", item_id))
}

/// Write `{output_dir}/metadata/{item_id}_metadata.json` as pretty UTF-8 JSON.
pub fn write_metadata(
    output_dir: &Path,
    item_id: &str,
    result: &ExtractionResult,
) -> Result<PathBuf, MetadataError> {
    let path = metadata_path(output_dir, item_id);
    let json = serde_json::to_string_pretty(&MetadataRecord::new(result))?;

    let write_err = |source| MetadataError::Write {
        path: path.clone(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    std::fs::write(&path, json).map_err(write_err)?;

    info!("Metadata saved: {}", path.display());
    Ok(path)
}
