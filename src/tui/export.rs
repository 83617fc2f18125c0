use crate::model::HistoryEntry;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::sync::OnceLock;
use std::time::Duration;

// Global clipboard manager channel - initialized once on first use
static CLIPBOARD_SENDER: OnceLock<std_mpsc::Sender<String>> = OnceLock::new();

fn export_file_name(entry: &HistoryEntry) -> String {
    format!(
        "inference-studio-{}-{}.json",
        entry.task,
        entry.timestamp_utc.replace(':', "-").replace('T', "_")
    )
}

/// Write a history entry as pretty JSON into `dir`.
pub fn export_entry_json_in(dir: &Path, entry: &HistoryEntry) -> Result<PathBuf> {
    let path = dir.join(export_file_name(entry));
    let json = serde_json::to_string_pretty(entry).context("serialise history entry")?;
    std::fs::write(&path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

/// Export into the current directory. Returns the absolute path of the exported file.
pub fn export_entry_json(entry: &HistoryEntry) -> Result<PathBuf> {
    let current_dir = std::env::current_dir().context("get current directory")?;
    export_entry_json_in(&current_dir, entry)
}

/// Initialize the clipboard manager thread if not already initialized.
/// Clipboard contents are owned by the process on Linux, so each write is kept alive
/// for a while on a dedicated thread.
fn init_clipboard_manager() -> Result<&'static std_mpsc::Sender<String>> {
    CLIPBOARD_SENDER.get_or_init(|| {
        let (tx, rx) = std_mpsc::channel::<String>();

        std::thread::spawn(move || {
            use arboard::Clipboard;

            for text in rx {
                match Clipboard::new() {
                    Ok(mut clipboard) => {
                        if clipboard.set_text(&text).is_ok() {
                            // Give clipboard managers time to read the contents
                            std::thread::sleep(Duration::from_secs(2));
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "clipboard unavailable"),
                }
            }
        });

        tx
    });

    CLIPBOARD_SENDER
        .get()
        .ok_or_else(|| anyhow::anyhow!("Failed to initialize clipboard manager"))
}

/// Queue text for the clipboard without blocking the UI thread.
pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let sender = init_clipboard_manager()?;
    sender
        .send(text.to_string())
        .map_err(|_| anyhow::anyhow!("Clipboard manager channel closed"))?;
    Ok(())
}
