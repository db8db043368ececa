//! Browser session primitives and the navigation / frame-scan logic built on them.
//!
//! [`SessionLauncher`] and [`PageSession`] are the seam to the browser engine.
//! [`navigate`] and [`extract_frame_content`] hold the waiting and selection
//! rules and work with any implementation.

pub mod chrome;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::error::DriverError;

pub use chrome::ChromeLauncher;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// An `<iframe>` element of the loaded page, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRef {
    /// 1-based position among the page's iframes.
    pub index: usize,
    pub src: Option<String>,
}

/// Rendered text of the frame that qualified.
#[derive(Debug, Clone)]
pub struct FrameContent {
    pub frame_index: usize,
    pub frame_source_url: Option<String>,
    pub text: String,
    pub text_length: usize,
}

/// Time budgets for the waits around navigation and frame reads.
#[derive(Debug, Clone, Copy)]
pub struct WaitPolicy {
    pub navigation_timeout: Duration,
    pub grace: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_secs(60),
            grace: Duration::from_secs(3),
        }
    }
}

/// Where per-frame diagnostic screenshots go: `{dir}/{item_id}_iframe_{n}.png`.
#[derive(Debug, Clone)]
pub struct ScreenshotTarget {
    pub dir: PathBuf,
    pub item_id: String,
}

impl ScreenshotTarget {
    pub fn path_for(&self, frame_index: usize) -> PathBuf {
        self.dir
            .join(format!("{}_iframe_{}.png", self.item_id, frame_index))
    }
}

/// Starts browser sessions.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    type Session: PageSession;

    async fn open_session(&self) -> Result<Self::Session, DriverError>;
}

/// One live page in a browser. Dropping a session without [`PageSession::close`]
/// may leak the browser process.
#[async_trait]
pub trait PageSession: Send {
    /// Load `url` and wait until network activity settles.
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError>;

    async fn frames(&mut self) -> Result<Vec<FrameRef>, DriverError>;

    /// Body text of the frame's content document; `None` if it cannot be resolved.
    async fn frame_text(&mut self, frame: &FrameRef) -> Result<Option<String>, DriverError>;

    async fn screenshot(&mut self, path: &std::path::Path) -> Result<(), DriverError>;

    async fn close(self) -> Result<(), DriverError>;
}

/// Navigate under the policy's timeout, then give client-side scripts up to
/// one grace period to attach at least one iframe.
pub async fn navigate<S: PageSession>(
    session: &mut S,
    url: &str,
    policy: &WaitPolicy,
) -> Result<(), DriverError> {
    info!("Navigating to: {}", url);
    match timeout(policy.navigation_timeout, session.navigate(url)).await {
        Ok(result) => result?,
        Err(_) => return Err(DriverError::NavigationTimeout(policy.navigation_timeout)),
    }

    let deadline = Instant::now() + policy.grace;
    loop {
        // A failed probe here is not a navigation failure; the frame scan reports it.
        let found = session.frames().await.map(|f| f.len()).unwrap_or(0);
        if found > 0 {
            debug!("{} iframe(s) attached after navigation", found);
            break;
        }
        if Instant::now() >= deadline {
            break;
        }
        sleep(POLL_INTERVAL.min(policy.grace)).await;
    }

    info!("Successfully navigated to book page");
    Ok(())
}

/// Scan iframes in document order and return the first one whose trimmed text
/// has at least `min_length` characters.
pub async fn extract_frame_content<S: PageSession>(
    session: &mut S,
    policy: &WaitPolicy,
    min_length: usize,
    screenshots: Option<&ScreenshotTarget>,
) -> Result<FrameContent, DriverError> {
    info!("Searching for iframe content...");
    let frames = session.frames().await?;
    if frames.is_empty() {
        return Err(DriverError::NoFrames);
    }
    info!("Found {} iframe(s)", frames.len());

    for frame in &frames {
        info!(
            "Processing iframe {} (src: {})",
            frame.index,
            frame.src.as_deref().unwrap_or("-")
        );

        let text = match wait_for_frame_text(session, frame, policy, min_length).await {
            Ok(Some(text)) => Some(text),
            Ok(None) => {
                warn!("Could not access iframe {} content", frame.index);
                None
            }
            Err(e) => {
                warn!("Error processing iframe {}: {}", frame.index, e);
                None
            }
        };

        if let Some(target) = screenshots {
            capture_screenshot(session, &target.path_for(frame.index)).await;
        }

        let Some(text) = text else { continue };
        let length = text.trim().chars().count();
        if length < min_length {
            warn!(
                "Iframe {} has insufficient content ({} < {} characters)",
                frame.index, length, min_length
            );
            continue;
        }

        let text_length = text.chars().count();
        info!("Extracted {} characters from iframe {}", text_length, frame.index);
        return Ok(FrameContent {
            frame_index: frame.index,
            frame_source_url: frame.src.clone(),
            text,
            text_length,
        });
    }

    Err(DriverError::NoQualifyingFrame {
        frames: frames.len(),
    })
}

/// Poll a frame's text until it is long enough or the grace period runs out.
/// Returns the last text read.
async fn wait_for_frame_text<S: PageSession>(
    session: &mut S,
    frame: &FrameRef,
    policy: &WaitPolicy,
    min_length: usize,
) -> Result<Option<String>, DriverError> {
    let deadline = Instant::now() + policy.grace;
    loop {
        let text = session.frame_text(frame).await?;
        let long_enough = text
            .as_deref()
            .is_some_and(|t| t.trim().chars().count() >= min_length);
        if long_enough || Instant::now() >= deadline {
            return Ok(text);
        }
        sleep(POLL_INTERVAL.min(policy.grace)).await;
    }
}

async fn capture_screenshot<S: PageSession>(session: &mut S, path: &std::path::Path) {
    if let Some(dir) = path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            warn!("Screenshot failed: {}", e);
            return;
        }
    }
    match session.screenshot(path).await {
        Ok(()) => info!("Screenshot saved: {}", path.display()),
        Err(e) => warn!("Screenshot failed: {}", e),
    }
}


// ── Tests ──
