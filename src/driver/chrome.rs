use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::error::CdpError;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::{FrameRef, PageSession, SessionLauncher};
use crate::config::ExtractorConfig;
use crate::error::DriverError;

/// Resource-timing count must hold still this long before the page counts as settled.
const NETWORK_QUIET: Duration = Duration::from_millis(500);
const SETTLE_POLL: Duration = Duration::from_millis(100);

/// Site isolation would hide cross-origin frame documents from page scripts.
const BROWSER_ARGS: &[&str] = &[
    "--disable-dev-shm-usage",
    "--disable-web-security",
    "--disable-features=VizDisplayCompositor,IsolateOrigins,site-per-process",
];

const LIST_FRAMES_JS: &str =
    "Array.from(document.querySelectorAll('iframe'), f => f.getAttribute('src'))";

const SETTLE_PROBE_JS: &str =
    "[document.readyState, performance.getEntriesByType('resource').length]";

fn frame_text_js(zero_based: usize) -> String {
    format!(
        r#"(() => {{
    const f = document.querySelectorAll('iframe')[{zero_based}];
    if (!f) return null;
    try {{
        const doc = f.contentDocument || (f.contentWindow && f.contentWindow.document);
        return doc && doc.body ? doc.body.textContent : null;
    }} catch (e) {{
        return null;
    }}
}})()"#
    )
}

fn protocol(e: impl std::fmt::Display) -> DriverError {
    DriverError::Protocol(e.to_string())
}

/// Launches headless Chromium through the DevTools protocol.
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    headless: bool,
    executable: Option<PathBuf>,
    user_agent: String,
    width: u32,
    height: u32,
    request_timeout: Duration,
}

impl ChromeLauncher {
    pub fn from_config(cfg: &ExtractorConfig) -> Self {
        Self {
            headless: cfg.headless,
            executable: cfg.chrome_executable.clone(),
            user_agent: cfg.user_agent.clone(),
            width: cfg.viewport_width,
            height: cfg.viewport_height,
            request_timeout: cfg.navigation_timeout(),
        }
    }

    fn browser_config(&self) -> Result<BrowserConfig, String> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(self.width, self.height)
            .viewport(Viewport {
                width: self.width,
                height: self.height,
                ..Default::default()
            })
            .request_timeout(self.request_timeout);
        for arg in BROWSER_ARGS {
            builder = builder.arg(*arg);
        }
        if !self.headless {
            builder = builder.with_head();
        }
        if let Some(exe) = &self.executable {
            builder = builder.chrome_executable(exe);
        }
        builder.build()
    }
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    type Session = ChromeSession;

    async fn open_session(&self) -> Result<ChromeSession, DriverError> {
        let config = self.browser_config().map_err(DriverError::LaunchFailure)?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| DriverError::LaunchFailure(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler stopped: {}", e);
                    break;
                }
            }
        });

        let page = match new_page(&browser, &self.user_agent).await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler_task.abort();
                return Err(DriverError::LaunchFailure(e.to_string()));
            }
        };

        info!("Browser launched successfully");
        Ok(ChromeSession {
            browser,
            page,
            handler: handler_task,
            request_timeout: self.request_timeout,
        })
    }
}

async fn new_page(browser: &Browser, user_agent: &str) -> Result<Page, CdpError> {
    let page = browser.new_page("about:blank").await?;
    page.execute(SetUserAgentOverrideParams::new(user_agent)).await?;
    Ok(page)
}

/// A Chromium process with one open tab.
pub struct ChromeSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    request_timeout: Duration,
}

impl ChromeSession {
    /// Wait for `readyState == "complete"` and a resource count that stops growing.
    async fn wait_for_settle(&self) -> Result<(), DriverError> {
        let mut last_count = None;
        let mut quiet_since = Instant::now();
        loop {
            let (state, count): (String, u64) = self
                .page
                .evaluate_expression(SETTLE_PROBE_JS)
                .await
                .map_err(protocol)?
                .into_value()
                .map_err(protocol)?;

            if last_count != Some(count) {
                last_count = Some(count);
                quiet_since = Instant::now();
            } else if state == "complete" && quiet_since.elapsed() >= NETWORK_QUIET {
                debug!(resources = count, "Network settled");
                return Ok(());
            }
            sleep(SETTLE_POLL).await;
        }
    }
}

#[async_trait]
impl PageSession for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), DriverError> {
        match self.page.goto(url).await {
            Ok(_) => {}
            Err(CdpError::Timeout) => return Err(DriverError::NavigationTimeout(self.request_timeout)),
            Err(e) => return Err(DriverError::NavigationError(e.to_string())),
        }
        self.wait_for_settle().await
    }

    async fn frames(&mut self) -> Result<Vec<FrameRef>, DriverError> {
        let sources: Vec<Option<String>> = self
            .page
            .evaluate_expression(LIST_FRAMES_JS)
            .await
            .map_err(protocol)?
            .into_value()
            .map_err(protocol)?;

        Ok(sources
            .into_iter()
            .enumerate()
            .map(|(i, src)| FrameRef { index: i + 1, src })
            .collect())
    }

    async fn frame_text(&mut self, frame: &FrameRef) -> Result<Option<String>, DriverError> {
        self.page
            .evaluate_expression(frame_text_js(frame.index - 1))
            .await
            .map_err(protocol)?
            .into_value()
            .map_err(protocol)
    }

    async fn screenshot(&mut self, path: &Path) -> Result<(), DriverError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let png = self.page.screenshot(params).await.map_err(protocol)?;
        tokio::fs::write(path, png).await.map_err(protocol)
    }

    async fn close(mut self) -> Result<(), DriverError> {
        let result = self.browser.close().await.map(|_| ()).map_err(protocol);
        if let Err(e) = self.browser.wait().await {
            warn!("Browser process did not exit cleanly: {}", e);
        }
        self.handler.abort();
        info!("Browser closed");
        result
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}
