use std::path::PathBuf;

use thiserror::Error;

/// Rejections raised before any browser work starts.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid URL format: {0}")]
    Malformed(#[from] url::ParseError),
    #[error("unsupported URL scheme '{0}' (expected http or https)")]
    UnsupportedScheme(String),
    #[error("URL must be from the {expected} domain (got '{found}')")]
    WrongHost { expected: String, found: String },
    #[error("URL must contain '{0}' path")]
    MissingBookPath(String),
    #[error("book id '{0}' cannot be used as a file name")]
    UnsafeBookId(String),
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("browser launch failed: {0}")]
    LaunchFailure(String),
    #[error("navigation timed out after {0:.0?}")]
    NavigationTimeout(std::time::Duration),
    #[error("navigation failed: {0}")]
    NavigationError(String),
    #[error("no iframe found on the page")]
    NoFrames,
    #[error("no valid iframe content found ({frames} iframe(s) checked)")]
    NoQualifyingFrame { frames: usize },
    #[error("browser protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("no PDF data found in content")]
    NotFound,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed base64 payload: {0}")]
    MalformedPayload(#[from] base64::DecodeError),
    #[error("failed to write {path}: {source}")]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to serialize metadata: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write metadata {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Everything a single extraction can fail with.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("extraction cancelled by user")]
    Interrupted,
}
