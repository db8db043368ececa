use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{debug, info};

use crate::error::CodecError;

pub const PDF_DIR: &str = "pdfs";

/// A PDF written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPdf {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Deterministic artifact location for an item.
pub fn pdf_path(output_dir: &Path, item_id: &str) -> PathBuf {
    output_dir.join(PDF_DIR).join(format!("{}.pdf", item_id))
}

/// Decode standard base64. Line breaks and other ASCII whitespace are ignored.
pub fn decode_payload(payload_b64: &str) -> Result<Vec<u8>, CodecError> {
    let compact: String = payload_b64
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    Ok(STANDARD.decode(compact)?)
}

/// Decode `payload_b64` and write it to `{output_dir}/pdfs/{item_id}.pdf`,
/// replacing any earlier artifact for the same id.
pub fn decode_and_store(
    payload_b64: &str,
    item_id: &str,
    output_dir: &Path,
) -> Result<StoredPdf, CodecError> {
    info!("Decoding PDF data ({} characters)...", payload_b64.len());
    let bytes = decode_payload(payload_b64)?;

    let path = pdf_path(output_dir, item_id);
    let write_failure = |source| CodecError::WriteFailure {
        path: path.clone(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_failure)?;
    }
    std::fs::write(&path, &bytes).map_err(write_failure)?;

    debug!(path = %path.display(), "PDF artifact written");
    info!("PDF saved: {} ({} bytes)", path.display(), bytes.len());
    Ok(StoredPdf {
        path,
        size_bytes: bytes.len() as u64,
    })
}

// ── Tests ──
