use std::{
    fs::{self, File, OpenOptions},
    io,
    path::Path,
    sync::Mutex,
};

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{prelude::*, fmt, EnvFilter};

use crate::config_store::create_dir_recursive;

// Install the global subscriber.
// Events go to stderr and, when a log file is given,
// to that file as plain lines
pub fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let level = if cfg!(debug_assertions) { "trace" } else { "info" };

    let (filter, env_set) = match EnvFilter::try_from_default_env() {
        Ok(f) => (f, true),
        Err(_) => (EnvFilter::new(level), false),
    };

    // Stdout is left to the --dump output
    let fmt_layer = fmt::layer().with_writer(io::stderr);

    let file_layer = match log_file {
        Some(path) => {
            let file = open_log_file(path).with_context(|| {
                format!("Failed to open log file {path:?}")
            })?;

            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(false)
                    .without_time(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(file_layer)
        .with(filter)
        .init();

    if !env_set {
        info!("\"RUST_LOG\" variable not set, defaulting to {level}");
    }

    Ok(())
}

// Start a fresh log file for this run and open it for appending
pub fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(dir) = path.parent() {
        create_dir_recursive(dir)?;
    }

    if path.exists() {
        fs::remove_file(path)?;
    }

    OpenOptions::new().create(true).append(true).open(path)
}
