//! Subscriber setup: a plain-text log file truncated on every run plus
//! INFO-level messages on stderr.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter, Layer};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Cannot create log file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Logging already initialised: {0}")]
    Init(#[from] TryInitError),
}

/// Log to stderr only
pub fn init_stderr() -> Result<(), LoggingError> {
    tracing_subscriber::registry()
        .with(stderr_layer())
        .try_init()?;
    Ok(())
}

/// Log DEBUG and above to `logfile` (truncated), INFO and above to stderr.
/// `RUST_LOG` replaces the file filter.
pub fn init_with_logfile(logfile: &Path) -> Result<(), LoggingError> {
    if let Some(parent) = logfile.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| LoggingError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let file = File::create(logfile).map_err(|source| LoggingError::Io {
        path: logfile.to_path_buf(),
        source,
    })?;

    let file_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(file_filter);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer())
        .try_init()?;
    Ok(())
}

fn stderr_layer<S>() -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(LevelFilter::INFO)
}
