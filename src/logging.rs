//! Logging setup and user-facing reports.
//!
//! Every event goes to the log file at debug level. The console only sees
//! tracing output when asked for it (`-v` or `RUST_LOG`); user-facing
//! warnings and fatal errors are printed by the `report_*` helpers, which
//! also emit the matching event so the log file gets a copy.

use std::error::Error as StdError;
use std::fmt::Display;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use colored::*;
use tracing::{error, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::error::{AdminError, Result};

pub const LOG_FILE_NAME: &str = "presto-admin.log";

fn console_filter(verbosity: u8) -> EnvFilter {
    match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new(match verbosity {
            0 => "off",
            1 => "presto_admin=info",
            _ => "presto_admin=debug",
        }),
    }
}

/// Installs the global subscriber: console layer plus a log file layer.
pub fn init_logging(log_file: &Path, verbosity: u8) -> Result<()> {
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(console_filter(verbosity));

    if let Some(parent) = log_file.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(log_file)?;
    let file_layer = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_filter(LevelFilter::DEBUG);

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| AdminError::config(format!("Failed to initialize logging: {}", e)))
}

/// Prints `Warning: [host] message` and logs it.
pub fn report_host_warning(host: &str, message: impl Display) {
    eprintln!("{} [{}] {}", "Warning:".yellow(), host, message);
    warn!(host, "{}", message);
}

/// Prints `Error: [host] message` for a failed host that doesn't stop the
/// rest of the dispatch, and logs it.
pub fn report_host_error(host: &str, message: impl Display) {
    eprintln!("{} [{}] {}", "Error:".red(), host, message);
    error!(host, "{}", message);
}

pub fn report_warning(message: impl Display) {
    eprintln!("{} {}", "Warning:".yellow(), message);
    warn!("{}", message);
}

/// The console line for a fatal error, pointing at the log for details.
pub fn fatal_message(err: &dyn Display, log_file: &Path) -> String {
    format!("{} (see {} for details)", err, log_file.display())
}

/// Prints `Fatal error: ...` and logs the error with its whole source chain.
pub fn report_fatal(err: &(dyn StdError + 'static), log_file: &Path) {
    eprintln!("{} {}", "Fatal error:".red().bold(), fatal_message(&err, log_file));
    error!(chain = %source_chain(err), "Fatal error: {}", err);
}

pub fn report_fatal_message(message: impl Display) {
    eprintln!("{} {}", "Fatal error:".red().bold(), message);
    error!("Fatal error: {}", message);
}

/// Renders an error and every error in its `source()` chain.
pub fn source_chain(err: &(dyn StdError + 'static)) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push_str("\n  caused by: ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}
