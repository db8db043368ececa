use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use alkafeel_extractor::batch::{self, BatchProgress, BatchSummary};
use alkafeel_extractor::driver::ChromeLauncher;
use alkafeel_extractor::extractor::{ExtractionResult, Extractor};
use alkafeel_extractor::{logging, ExtractorConfig, PageSession, SessionLauncher};

const SAMPLE_URL: &str =
    "https://library.alkafeel.net/dic/book/?e=38c15-44c77-06464-07b96-de2b7-82795-3b";

#[derive(Parser)]
#[command(
    name = "alkafeel-extractor",
    version,
    about = "Extract PDF books from the Al-Kafeel digital library (library.alkafeel.net)"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct OutputArgs {
    /// Output directory for extracted files (default: output)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
    /// Also write a metadata record for failed extractions
    #[arg(long)]
    metadata_on_failure: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a single book
    Extract {
        /// Book URL from library.alkafeel.net
        url: String,
        #[command(flatten)]
        out: OutputArgs,
    },
    /// Extract every book listed in a file (one URL per line, '#' comments)
    BatchExtract {
        urls_file: PathBuf,
        #[command(flatten)]
        out: OutputArgs,
        /// Exit successfully even if some books fail
        #[arg(long)]
        continue_on_error: bool,
    },
    /// Create the output directories and check that Chromium can be launched
    Setup {
        /// Output directory to set up (default: output)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Extract a known sample book into test_output/
    Test,
    /// Show supported URLs and the output layout
    Info,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut config = ExtractorConfig::load().context("Invalid ALKAFEEL_* configuration")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupt received, closing browser...");
            on_interrupt.cancel();
        }
    });

    let code = match cli.command {
        Commands::Extract { url, out } => {
            apply_output_args(&mut config, out);
            run_single(config, cancel, &url).await?
        }
        Commands::BatchExtract {
            urls_file,
            out,
            continue_on_error,
        } => {
            apply_output_args(&mut config, out);
            run_batch(config, cancel, urls_file, continue_on_error).await?
        }
        Commands::Setup { output } => {
            if let Some(dir) = output {
                config.output_dir = dir;
            }
            run_setup(config).await?
        }
        Commands::Test => {
            config.output_dir = PathBuf::from("test_output");
            config.verbose = true;
            println!("Running test extraction...");
            run_single(config, cancel, SAMPLE_URL).await?
        }
        Commands::Info => {
            print_info();
            ExitCode::SUCCESS
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }
    Ok(code)
}

fn apply_output_args(config: &mut ExtractorConfig, args: OutputArgs) {
    if let Some(dir) = args.output {
        config.output_dir = dir;
    }
    config.verbose |= args.verbose;
    config.metadata_on_failure |= args.metadata_on_failure;
}

fn build_extractor(config: ExtractorConfig, cancel: CancellationToken) -> Extractor<ChromeLauncher> {
    let launcher = ChromeLauncher::from_config(&config);
    Extractor::new(config, launcher).with_cancellation(cancel)
}

async fn run_single(
    config: ExtractorConfig,
    cancel: CancellationToken,
    url: &str,
) -> anyhow::Result<ExitCode> {
    let log = logging::start(&config.output_dir, config.verbose)
        .context("Failed to set up logging")?;
    let extractor = build_extractor(config, cancel);
    extractor
        .ensure_layout()
        .context("Failed to create output directories")?;

    println!("Starting extraction...");
    println!("URL:    {}", url);
    println!("Output: {}", extractor.config().output_dir.display());
    println!("Log:    {}", log.path().display());

    let result = extractor.extract(url).await;
    print_result(&result);
    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn run_batch(
    config: ExtractorConfig,
    cancel: CancellationToken,
    urls_file: PathBuf,
    continue_on_error: bool,
) -> anyhow::Result<ExitCode> {
    let urls = batch::read_url_list(&urls_file)?;
    if urls.is_empty() {
        println!("No valid URLs found in {}", urls_file.display());
        return Ok(ExitCode::FAILURE);
    }

    let _log = logging::start(&config.output_dir, config.verbose)
        .context("Failed to set up logging")?;
    let extractor = build_extractor(config, cancel);
    extractor
        .ensure_layout()
        .context("Failed to create output directories")?;

    println!("Found {} URLs to process", urls.len());
    let mut progress = ConsoleProgress::default();
    let summary = batch::run_batch(&extractor, &urls, &mut progress).await;

    println!("\nBATCH EXTRACTION SUMMARY");
    println!("{}", "=".repeat(50));
    println!("Successful:   {}/{}", summary.successful.len(), summary.total);
    println!("Failed:       {}/{}", summary.failed.len(), summary.total);
    println!("Success rate: {:.1}%", summary.success_rate);
    if summary.interrupted {
        println!("Interrupted:  {} URL(s) not attempted", summary.total - summary.processed());
    }

    let path = summary.write(&extractor.config().output_dir)?;
    println!("\nBatch results saved: {}", path.display());

    if summary.interrupted {
        return Ok(ExitCode::FAILURE);
    }
    if summary.has_failures() && !continue_on_error {
        println!("\nSome extractions failed. Use --continue-on-error to ignore failures.");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

async fn run_setup(config: ExtractorConfig) -> anyhow::Result<ExitCode> {
    alkafeel_extractor::ensure_layout(&config.output_dir)
        .context("Failed to create output directories")?;
    for sub in ["pdfs", "metadata", "screenshots", "logs"] {
        println!("Created directory: {}", config.output_dir.join(sub).display());
    }

    println!("\nChecking browser...");
    let launcher = ChromeLauncher::from_config(&config);
    match launcher.open_session().await {
        Ok(session) => {
            session.close().await?;
            println!("Chromium launched and closed successfully");
            println!("\nSetup completed. Try:\n  alkafeel-extractor extract \"YOUR_BOOK_URL\"");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("{}", e);
            println!("Install Chrome/Chromium or set ALKAFEEL_CHROME_EXECUTABLE to its path.");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_result(result: &ExtractionResult) {
    if result.success {
        println!("\nSUCCESS!");
        if let Some(id) = &result.book_id {
            println!("Book ID:   {}", id);
        }
        if let Some(path) = &result.pdf_path {
            println!("PDF saved: {}", path.display());
        }
        if let Some(size) = result.pdf_size_bytes {
            println!("Size:      {} bytes", size);
        }
        println!("Duration:  {}", format_duration(result.duration));
        if let Some(path) = &result.metadata_path {
            println!("Metadata:  {}", path.display());
        }
    } else {
        println!("\nFAILED!");
        println!(
            "Error:    {}",
            result.error.as_deref().unwrap_or("Unknown error")
        );
        println!("Duration: {}", format_duration(result.duration));
    }
}

/// Batch progress bar with one line per finished book.
#[derive(Default)]
struct ConsoleProgress {
    bar: Option<ProgressBar>,
}

impl BatchProgress for ConsoleProgress {
    fn started(&mut self, total: usize) {
        let pb = ProgressBar::new(total as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} (eta {eta})")
        {
            pb.set_style(style.progress_chars("=> "));
        }
        self.bar = Some(pb);
    }

    fn item_started(&mut self, position: usize, total: usize, url: &str) {
        if let Some(pb) = &self.bar {
            pb.println(format!("Processing book {}/{}: {}", position, total, url));
        }
    }

    fn item_finished(&mut self, position: usize, _total: usize, result: &ExtractionResult) {
        let line = if result.success {
            format!("✓ Book {} extracted successfully", position)
        } else {
            format!(
                "✗ Book {} extraction failed: {}",
                position,
                result.error.as_deref().unwrap_or("Unknown error")
            )
        };
        if let Some(pb) = &self.bar {
            pb.println(line);
            pb.inc(1);
        }
    }

    fn finished(&mut self, _summary: &BatchSummary) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
    }
}

fn print_info() {
    println!(
        "\
Al-Kafeel Library Book Extractor {version}

Purpose:
  Extract PDF books from the Al-Kafeel Digital Library (library.alkafeel.net)

Supported URLs:
  https://library.alkafeel.net/dic/book/?e=BOOK_ID
  - must be on the library.alkafeel.net domain
  - must contain the '/dic/book/' path

Output layout:
  output/
  ├── pdfs/            extracted PDF files ({{id}}.pdf)
  ├── metadata/        extraction metadata ({{id}}_metadata.json)
  ├── screenshots/     per-iframe page screenshots
  ├── logs/            one log file per run
  └── batch_results.json

Configuration (environment):
  ALKAFEEL_NAVIGATION_TIMEOUT_SECS, ALKAFEEL_GRACE_WAIT_MS,
  ALKAFEEL_MIN_FRAME_TEXT_LEN, ALKAFEEL_SCREENSHOTS,
  ALKAFEEL_METADATA_ON_FAILURE, ALKAFEEL_CHROME_EXECUTABLE, ALKAFEEL_HEADLESS

Please respect the library's terms of service.",
        version = env!("CARGO_PKG_VERSION")
    );
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
