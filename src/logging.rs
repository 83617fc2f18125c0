//! Diagnostic logging setup.
//!
//! The TUI owns the terminal, so in that mode tracing output goes to a file. Headless
//! runs log to stderr. Filtering follows `RUST_LOG`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "inference_studio=info";

pub(crate) fn default_log_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("inference-studio").join("studio.log"))
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub(crate) fn init_stderr() {
    // A subscriber may already be installed (tests, embedding); that is fine.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Returns the path actually used.
pub(crate) fn init_file(path: &Path) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))?;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .try_init();
    Ok(path.to_path_buf())
}

/// Routes panic messages to `tracing` while alive. The previous hook is restored on drop.
pub(crate) struct PanicLogGuard {
    restore: Option<Box<dyn FnOnce() + Send>>,
}

impl PanicLogGuard {
    pub(crate) fn install() -> Self {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(|info| {
            let thread = std::thread::current();
            tracing::error!(thread = thread.name().unwrap_or("unnamed"), "{info}");
        }));
        Self {
            restore: Some(Box::new(move || std::panic::set_hook(previous))),
        }
    }
}

impl Drop for PanicLogGuard {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore();
        }
    }
}
