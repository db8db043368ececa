//! One end-to-end extraction: URL → browser → payload → PDF + metadata.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::codec::{self, StoredPdf, PDF_DIR};
use crate::config::ExtractorConfig;
use crate::driver::{self, FrameContent, PageSession, ScreenshotTarget, SessionLauncher, WaitPolicy};
use crate::error::ExtractError;
use crate::item::{derive_item_id, validate_url, ItemId};
use crate::matcher;
use crate::metadata::{self, METADATA_DIR};

pub const SCREENSHOT_DIR: &str = "screenshots";
pub const LOG_DIR: &str = "logs";

/// Which frame the payload came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameSummary {
    pub iframe_index: usize,
    pub iframe_src: Option<String>,
    pub content_length: usize,
}

impl From<&FrameContent> for FrameSummary {
    fn from(frame: &FrameContent) -> Self {
        Self {
            iframe_index: frame.frame_index,
            iframe_src: frame.frame_source_url.clone(),
            content_length: frame.text_length,
        }
    }
}

/// Outcome of one extraction. Either `pdf_path` or `error` is set, never both.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_id: Option<String>,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_size_bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iframe_data: Option<FrameSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_path: Option<PathBuf>,
    #[serde(rename = "extraction_duration_secs", serialize_with = "as_secs")]
    pub duration: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl ExtractionResult {
    pub fn succeeded(
        book_id: String,
        url: String,
        pdf_path: PathBuf,
        pdf_size_bytes: u64,
        frame: FrameSummary,
        duration: Duration,
    ) -> Self {
        Self {
            success: true,
            book_id: Some(book_id),
            url,
            pdf_path: Some(pdf_path),
            pdf_size_bytes: Some(pdf_size_bytes),
            iframe_data: Some(frame),
            metadata_path: None,
            duration,
            error: None,
        }
    }

    pub fn failed(book_id: Option<String>, url: String, error: String, duration: Duration) -> Self {
        Self {
            success: false,
            book_id,
            url,
            pdf_path: None,
            pdf_size_bytes: None,
            iframe_data: None,
            metadata_path: None,
            duration,
            error: Some(error),
        }
    }
}

struct Extracted {
    id: ItemId,
    frame: FrameSummary,
    pdf: StoredPdf,
}

/// Runs extractions against one output directory with one browser launcher.
pub struct Extractor<L> {
    config: ExtractorConfig,
    launcher: L,
    cancel: CancellationToken,
}

impl<L: SessionLauncher> Extractor<L> {
    pub fn new(config: ExtractorConfig, launcher: L) -> Self {
        Self {
            config,
            launcher,
            cancel: CancellationToken::new(),
        }
    }

    /// Share an interrupt signal with the caller. A cancelled token closes the
    /// open browser session and fails the current item.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Create the output directory tree.
    pub fn ensure_layout(&self) -> std::io::Result<()> {
        ensure_layout(&self.config.output_dir)
    }

    fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            navigation_timeout: self.config.navigation_timeout(),
            grace: self.config.grace_wait(),
        }
    }

    /// Extract one book. Never panics or returns an error; failures are reported
    /// in the returned [`ExtractionResult`].
    pub async fn extract(&self, url: &str) -> ExtractionResult {
        let started = Instant::now();
        let mut id = None;
        let outcome = self.run(url, &mut id).await;
        let book_id = id.map(|i| i.to_string());

        match outcome {
            Ok(done) => {
                let mut result = ExtractionResult::succeeded(
                    done.id.to_string(),
                    url.to_string(),
                    done.pdf.path,
                    done.pdf.size_bytes,
                    done.frame,
                    started.elapsed(),
                );
                match metadata::write_metadata(&self.config.output_dir, done.id.as_str(), &result) {
                    Ok(path) => result.metadata_path = Some(path),
                    Err(e) => {
                        let e = ExtractError::from(e);
                        return self.report_failure(book_id, url, &e, started);
                    }
                }
                result.duration = started.elapsed();

                info!("{}", "=".repeat(60));
                info!("EXTRACTION SUCCESSFUL!");
                info!("Book ID: {}", done.id);
                if let Some(path) = &result.pdf_path {
                    info!("PDF Path: {}", path.display());
                }
                info!("Duration: {:.2?}", result.duration);
                info!("{}", "=".repeat(60));
                result
            }
            Err(e) => self.report_failure(book_id, url, &e, started),
        }
    }

    fn report_failure(
        &self,
        book_id: Option<String>,
        url: &str,
        e: &ExtractError,
        started: Instant,
    ) -> ExtractionResult {
        let mut result =
            ExtractionResult::failed(book_id, url.to_string(), e.to_string(), started.elapsed());

        if self.config.metadata_on_failure {
            if let Some(id) = result.book_id.clone() {
                match metadata::write_metadata(&self.config.output_dir, &id, &result) {
                    Ok(path) => result.metadata_path = Some(path),
                    Err(me) => warn!("Could not record failure metadata: {}", me),
                }
            }
        }

        error!("{}", "=".repeat(60));
        error!("EXTRACTION FAILED!");
        error!("Error: {}", e);
        error!("{}", "=".repeat(60));
        result
    }

    async fn run(&self, url: &str, id_slot: &mut Option<ItemId>) -> Result<Extracted, ExtractError> {
        let cfg = &self.config;
        let parsed = validate_url(url, &cfg.library_host, &cfg.book_path)?;
        let id = derive_item_id(&parsed)?;
        *id_slot = Some(id.clone());

        info!("{}", "=".repeat(60));
        info!("Starting extraction for book ID: {}", id);
        info!("{}", "=".repeat(60));

        let frame = self.fetch_frame(url, &id).await?;

        info!("Searching for PDF data in content...");
        let found = matcher::find_payload(&frame.text)?;
        info!(
            "Found PDF data via {} pattern ({} characters)",
            found.tag,
            found.payload.len()
        );

        let pdf = codec::decode_and_store(found.payload, id.as_str(), &cfg.output_dir)?;
        Ok(Extracted {
            id,
            frame: FrameSummary::from(&frame),
            pdf,
        })
    }

    /// Browser phase. The session is closed exactly once on every path out.
    async fn fetch_frame(&self, url: &str, id: &ItemId) -> Result<FrameContent, ExtractError> {
        if self.cancel.is_cancelled() {
            return Err(ExtractError::Interrupted);
        }
        let mut session = self.launcher.open_session().await?;

        let outcome = tokio::select! {
            r = self.drive(&mut session, url, id) => r,
            _ = self.cancel.cancelled() => {
                warn!("Interrupt received, tearing down browser session");
                Err(ExtractError::Interrupted)
            }
        };

        if let Err(e) = session.close().await {
            warn!("Failed to close browser cleanly: {}", e);
        }
        outcome
    }

    async fn drive(
        &self,
        session: &mut L::Session,
        url: &str,
        id: &ItemId,
    ) -> Result<FrameContent, ExtractError> {
        let policy = self.wait_policy();
        driver::navigate(session, url, &policy).await?;

        let shots = self.config.screenshots.then(|| ScreenshotTarget {
            dir: self.config.output_dir.join(SCREENSHOT_DIR),
            item_id: id.to_string(),
        });
        let frame = driver::extract_frame_content(
            session,
            &policy,
            self.config.min_frame_text_len,
            shots.as_ref(),
        )
        .await?;
        Ok(frame)
    }
}

/// Create `pdfs/`, `metadata/`, `screenshots/` and `logs/` under `output_dir`.
pub fn ensure_layout(output_dir: &Path) -> std::io::Result<()> {
    for dir in [PDF_DIR, METADATA_DIR, SCREENSHOT_DIR, LOG_DIR] {
        std::fs::create_dir_all(output_dir.join(dir))?;
    }
    Ok(())
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::testing::*;

    const BOOK_URL: &str =
        "https://library.alkafeel.net/dic/book/?e=38c15-44c77-06464-07b96-de2b7-82795-3b";
    const BOOK_ID: &str = "38c15-44c77-06464-07b96-de2b7-82795-3b";

    fn reader_text() -> String {
        std::fs::read_to_string("tests/fixtures/reader_frame.txt").unwrap()
    }

    fn test_config(dir: &Path) -> ExtractorConfig {
        ExtractorConfig {
            output_dir: dir.to_path_buf(),
            grace_wait_ms: 0,
            navigation_timeout_secs: 5,
            ..Default::default()
        }
    }

    fn extractor(dir: &Path, script: Script) -> Extractor<MockLauncher> {
        Extractor::new(test_config(dir), MockLauncher::new(script))
    }

    #[tokio::test]
    async fn full_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let ex = extractor(
            dir.path(),
            Script::serving(vec![Some("menu".into()), Some(reader_text())]),
        );

        let result = ex.extract(BOOK_URL).await;
        assert!(result.success, "{:?}", result.error);
        assert!(result.error.is_none());
        assert_eq!(result.book_id.as_deref(), Some(BOOK_ID));

        let pdf_path = result.pdf_path.clone().unwrap();
        assert_eq!(pdf_path, dir.path().join("pdfs").join(format!("{}.pdf", BOOK_ID)));
        let bytes = std::fs::read(&pdf_path).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        assert_eq!(result.pdf_size_bytes, Some(bytes.len() as u64));

        let frame = result.iframe_data.clone().unwrap();
        assert_eq!(frame.iframe_index, 2);

        let meta = result.metadata_path.clone().unwrap();
        assert!(meta.ends_with(format!("metadata/{}_metadata.json", BOOK_ID)));
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(meta).unwrap()).unwrap();
        assert_eq!(json["url"], BOOK_URL);
        assert_eq!(json["success"], true);

        assert!(dir
            .path()
            .join(format!("screenshots/{}_iframe_1.png", BOOK_ID))
            .exists());
        assert_eq!(ex.launcher().calls.opened(), 1);
        assert_eq!(ex.launcher().calls.closed(), 1);
    }

    #[tokio::test]
    async fn rerun_overwrites_identically() {
        let dir = tempfile::tempdir().unwrap();
        let ex = extractor(dir.path(), Script::serving(vec![Some(reader_text())]));

        let first = ex.extract(BOOK_URL).await;
        let first_bytes = std::fs::read(first.pdf_path.as_ref().unwrap()).unwrap();
        let second = ex.extract(BOOK_URL).await;
        let second_bytes = std::fs::read(second.pdf_path.as_ref().unwrap()).unwrap();

        assert_eq!(first.pdf_path, second.pdf_path);
        assert_eq!(first_bytes, second_bytes);
        assert_eq!(std::fs::read_dir(dir.path().join("pdfs")).unwrap().count(), 1);
    }

    #[tokio::test]
    async fn invalid_url_never_touches_browser() {
        let dir = tempfile::tempdir().unwrap();
        for url in [
            "https://google.com",
            "https://library.alkafeel.net/other/path",
            "not-a-url",
        ] {
            let ex = extractor(dir.path(), Script::serving(vec![Some(reader_text())]));
            let result = ex.extract(url).await;
            assert!(!result.success);
            assert!(result.pdf_path.is_none());
            assert!(result.error.is_some());
            assert!(result.book_id.is_none());
            assert_eq!(ex.launcher().calls.opened(), 0);
            assert!(ex.launcher().calls.navigated.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn path_like_book_id_writes_nothing_outside_output() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("out");
        for url in [
            "https://library.alkafeel.net/dic/book/?e=..%2F..%2Fescaped",
            "https://library.alkafeel.net/dic/book/?e=../../escaped",
        ] {
            let mut cfg = test_config(&out);
            cfg.metadata_on_failure = true;
            let script = Script::serving(vec![Some(reader_text())]);
            let ex = Extractor::new(cfg, MockLauncher::new(script));

            let result = ex.extract(url).await;
            assert!(!result.success);
            assert!(result.error.unwrap().contains("cannot be used as a file name"));
            assert!(result.book_id.is_none());
            assert!(result.metadata_path.is_none());
            assert_eq!(ex.launcher().calls.opened(), 0);
        }

        let entries: Vec<_> = std::fs::read_dir(root.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert!(entries.iter().all(|name| name == "out"), "{:?}", entries);
        assert!(!root.path().join("escaped.pdf").exists());
        let stored = std::fs::read_dir(out.join("pdfs")).map_or(0, |d| d.count());
        assert_eq!(stored, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_timeout_still_closes_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut script = Script::serving(vec![]);
        script.navigate = NavigateScript::Hang;
        let ex = extractor(dir.path(), script);

        let result = ex.extract(BOOK_URL).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("timed out"));
        assert_eq!(ex.launcher().calls.closed(), 1);
    }

    #[tokio::test]
    async fn failures_close_session_once() {
        let cases = [
            (Script::serving(vec![]), "no iframe"),
            (Script::serving(vec![Some("x".repeat(10))]), "no valid iframe"),
            (Script::serving(vec![Some("y".repeat(300))]), "no PDF data"),
            (
                Script::serving(vec![Some(format!("var pdfData = \"JVBERi*{}\";", "A".repeat(200)))]),
                "malformed base64",
            ),
        ];
        for (script, expected) in cases {
            let dir = tempfile::tempdir().unwrap();
            let ex = extractor(dir.path(), script);
            let result = ex.extract(BOOK_URL).await;
            assert!(!result.success);
            let err = result.error.unwrap();
            assert!(err.contains(expected), "{:?} should mention {:?}", err, expected);
            assert_eq!(ex.launcher().calls.closed(), 1);
            assert!(!dir.path().join("metadata").exists());
        }
    }

    #[tokio::test]
    async fn launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut script = Script::serving(vec![]);
        script.launch_fails = true;
        let ex = extractor(dir.path(), script);
        let result = ex.extract(BOOK_URL).await;
        assert!(result.error.unwrap().contains("browser launch failed"));
        assert_eq!(ex.launcher().calls.closed(), 0);
    }

    #[tokio::test]
    async fn failure_metadata_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = test_config(dir.path());
        cfg.metadata_on_failure = true;
        let ex = Extractor::new(cfg, MockLauncher::new(Script::serving(vec![])));

        let result = ex.extract(BOOK_URL).await;
        assert!(!result.success);
        let path = result.metadata_path.unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["book_id"], BOOK_ID);
        assert!(json["error"].as_str().unwrap().contains("iframe"));
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let ex = extractor(dir.path(), Script::serving(vec![Some(reader_text())]));
        ex.cancellation().cancel();
        let result = ex.extract(BOOK_URL).await;
        assert!(result.error.unwrap().contains("cancelled"));
        assert_eq!(ex.launcher().calls.opened(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_mid_navigation_closes_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut script = Script::serving(vec![]);
        script.navigate = NavigateScript::Hang;
        let mut cfg = test_config(dir.path());
        cfg.navigation_timeout_secs = 600;
        let token = CancellationToken::new();
        let ex = Extractor::new(cfg, MockLauncher::new(script)).with_cancellation(token.clone());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });
        let result = ex.extract(BOOK_URL).await;
        assert!(result.error.unwrap().contains("cancelled"));
        assert_eq!(ex.launcher().calls.closed(), 1);
    }

    #[test]
    fn layout() {
        let dir = tempfile::tempdir().unwrap();
        ensure_layout(dir.path()).unwrap();
        for sub in ["pdfs", "metadata", "screenshots", "logs"] {
            assert!(dir.path().join(sub).is_dir());
        }
    }
}
