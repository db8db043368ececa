use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_HOST: &str = "library.alkafeel.net";
pub const DEFAULT_BOOK_PATH: &str = "/dic/book/";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Extractor settings. Every field can be set from the environment with the
/// `ALKAFEEL_` prefix, e.g. `ALKAFEEL_NAVIGATION_TIMEOUT_SECS=90`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub output_dir: PathBuf,
    pub verbose: bool,
    pub library_host: String,
    pub book_path: String,
    pub navigation_timeout_secs: u64,
    /// Upper bound for each grace wait (after navigation, per frame).
    pub grace_wait_ms: u64,
    pub min_frame_text_len: usize,
    pub screenshots: bool,
    /// Persist a metadata record for failed extractions too.
    pub metadata_on_failure: bool,
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            verbose: false,
            library_host: DEFAULT_HOST.to_string(),
            book_path: DEFAULT_BOOK_PATH.to_string(),
            navigation_timeout_secs: 60,
            grace_wait_ms: 3000,
            min_frame_text_len: 100,
            screenshots: true,
            metadata_on_failure: false,
            headless: true,
            chrome_executable: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            viewport_width: 1280,
            viewport_height: 720,
        }
    }
}

impl ExtractorConfig {
    /// Defaults overlaid with `ALKAFEEL_*` environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::with_prefix("ALKAFEEL").try_parsing(true))
            .build()?
            .try_deserialize()
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn grace_wait(&self) -> Duration {
        Duration::from_millis(self.grace_wait_ms)
    }
}
