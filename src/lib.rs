//! # alkafeel_extractor
//!
//! Pulls the PDF embedded in an Al-Kafeel digital library book page
//! (`library.alkafeel.net/dic/book/?e=…`).
//!
//! The reader page loads the book into an iframe as a base64 string inside a
//! script. The pipeline:
//!
//! 1. **Validate** the URL and derive the book id from its `e` parameter.
//! 2. **Navigate** a headless Chromium to the page and wait for it to settle.
//! 3. **Scan iframes** in document order for the first with enough text.
//! 4. **Match** the base64 payload with an ordered pattern table.
//! 5. **Decode and store** `pdfs/{id}.pdf` and `metadata/{id}_metadata.json`.
//!
//! ```no_run
//! use alkafeel_extractor::{ChromeLauncher, Extractor, ExtractorConfig};
//!
//! # async fn demo() {
//! let config = ExtractorConfig::default();
//! let extractor = Extractor::new(config.clone(), ChromeLauncher::from_config(&config));
//! let result = extractor
//!     .extract("https://library.alkafeel.net/dic/book/?e=38c15-44c77-06464-07b96-de2b7-82795-3b")
//!     .await;
//! println!("{}", result.success);
//! # }
//! ```

pub mod batch;
pub mod codec;
pub mod config;
pub mod driver;
pub mod error;
pub mod extractor;
pub mod item;
pub mod logging;
pub mod matcher;
pub mod metadata;

pub use batch::{read_url_list, run_batch, BatchProgress, BatchSummary};
pub use config::ExtractorConfig;
pub use driver::{ChromeLauncher, PageSession, SessionLauncher};
pub use error::{CodecError, DriverError, ExtractError, MatchError, ValidationError};
pub use extractor::{ensure_layout, ExtractionResult, Extractor};
