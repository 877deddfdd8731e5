//! Logging setup.
//!
//! The terminal belongs to the UI, so records go to a file under the user's
//! data directory. `RUST_LOG` overrides the level picked from `--verbose`.

use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

use crate::settings::APPLICATION;

const LOG_FILE: &str = "passview.log";

pub fn log_path() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .ok_or_else(|| anyhow!("Could not determine data directory"))?;
    Ok(base.join(APPLICATION).join(LOG_FILE))
}

pub fn default_level(verbose: bool) -> &'static str {
    if verbose { "debug" } else { "info" }
}

fn env_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

fn open_log_file() -> Result<File> {
    let path = log_path()?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Install the global subscriber; falls back to stderr at `warn`.
pub fn init(verbose: bool) {
    match open_log_file() {
        Ok(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter(default_level(verbose)))
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .try_init();
        }
        Err(e) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(env_filter("warn"))
                .with_writer(std::io::stderr)
                .try_init();
            tracing::warn!("log file unavailable, logging to stderr: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_raises_level() {
        assert_eq!(default_level(true), "debug");
        assert_eq!(default_level(false), "info");
    }

    #[test]
    fn log_file_lives_under_application_dir() {
        if let Ok(path) = log_path() {
            assert!(path.ends_with(format!("{APPLICATION}/{LOG_FILE}")));
        }
    }
}
