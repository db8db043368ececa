use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::subscriber::DefaultGuard;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::extractor::LOG_DIR;

/// Logging for one extractor run: stderr plus `logs/extraction_{timestamp}.log`.
///
/// The subscriber is installed as the thread's default for as long as the
/// session lives; dropping it flushes the file and restores the previous one.
pub struct LogSession {
    path: PathBuf,
    _writer: WorkerGuard,
    _default: DefaultGuard,
}

impl LogSession {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn directives(verbose: bool) -> &'static str {
    if verbose {
        "debug,chromiumoxide=info,tungstenite=info"
    } else {
        "info,chromiumoxide=warn"
    }
}

/// `RUST_LOG` wins over the verbosity flag when set.
pub fn start(output_dir: &Path, verbose: bool) -> std::io::Result<LogSession> {
    let dir = output_dir.join(LOG_DIR);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!(
        "extraction_{}.log",
        Local::now().format("%Y%m%d_%H%M%S")
    ));
    let (writer, writer_guard) = tracing_appender::non_blocking(File::create(&path)?);

    let env_filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(verbose)))
    };

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_filter(env_filter());
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter());

    let default = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .set_default();

    Ok(LogSession {
        path,
        _writer: writer_guard,
        _default: default,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_run_log() {
        let dir = tempfile::tempdir().unwrap();
        let session = start(dir.path(), false).unwrap();
        let path = session.path().to_path_buf();
        tracing::warn!("frame 3 had no body");
        drop(session);

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("extraction_") && name.ends_with(".log"));
        assert_eq!(path.parent().unwrap(), dir.path().join("logs"));
        let log = std::fs::read_to_string(&path).unwrap();
        assert!(log.contains("frame 3 had no body"));
        assert!(log.contains("WARN"));
    }
}
