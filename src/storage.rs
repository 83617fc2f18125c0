//! On-disk state: saved settings and the model cache folder.
//!
//! The cache folder follows the Hugging Face layout (`HF_HOME`, default
//! `~/.cache/huggingface`). Only entries under a `hub` or `models` directory count
//! towards its size and are removed by a clear. Persisted inference results live in
//! `hub/inference-studio/<model>/` inside it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

const SETTINGS_FILE: &str = "settings.json";

/// User settings persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

pub(crate) fn settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("inference-studio").join(SETTINGS_FILE))
}

impl Settings {
    /// A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read settings {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse settings {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create settings directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("serialise settings")?;
        std::fs::write(path, json).with_context(|| format!("write settings {}", path.display()))
    }

    /// Load from the user config directory. Unreadable settings fall back to the defaults.
    pub fn load() -> Self {
        let Some(path) = settings_path() else {
            return Self::default();
        };
        Self::load_from(&path).unwrap_or_else(|e| {
            tracing::warn!(error = %format!("{e:#}"), "ignoring unreadable settings");
            Self::default()
        })
    }
}

/// `HF_HOME` if set, else `~/.cache/huggingface`.
pub(crate) fn default_cache_dir() -> PathBuf {
    if let Some(home) = std::env::var_os("HF_HOME").filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cache")
        .join("huggingface")
}

fn is_model_entry(name: &str) -> bool {
    name.contains("hub") || name.contains("models")
}

/// Where persisted results for `model` are written.
pub(crate) fn result_cache_dir(root: &Path, model: &str) -> PathBuf {
    root.join("hub")
        .join("inference-studio")
        .join(model.trim_matches('/').replace('/', "--"))
}

/// Total bytes of model files under `root`. Unreadable entries are skipped.
pub(crate) fn cache_size(root: &Path) -> u64 {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .strip_prefix(root)
                .ok()
                .and_then(Path::parent)
                .is_some_and(|dir| {
                    dir.components().any(|c| match c {
                        Component::Normal(s) => s.to_str().is_some_and(is_model_entry),
                        _ => false,
                    })
                })
        })
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Remove the model entries at the top of `root`. Returns how many were removed.
pub(crate) fn clear_cache(root: &Path) -> Result<usize> {
    if !root.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    for entry in std::fs::read_dir(root).with_context(|| format!("list {}", root.display()))? {
        let entry = entry.with_context(|| format!("list {}", root.display()))?;
        if !entry.file_name().to_str().is_some_and(is_model_entry) {
            continue;
        }
        let path = entry.path();
        let res = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        res.with_context(|| format!("remove {}", path.display()))?;
        removed += 1;
    }
    tracing::info!(root = %root.display(), removed, "model cache cleared");
    Ok(removed)
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    let mut size = bytes as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} PB")
}
