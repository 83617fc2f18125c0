//! Capabilities wrap a pretrained model behind a uniform load/process/info interface.
//!
//! A capability is created once at startup, shared as `Arc<dyn Capability>` and read
//! concurrently by any number of worker threads once loaded.

mod caption;
mod hub;
pub(crate) mod preprocess;
mod sentiment;
mod wrappers;

pub(crate) use caption::ImageCaptioner;
pub(crate) use hub::HubClient;
pub(crate) use sentiment::SentimentAnalyzer;
pub(crate) use wrappers::{MemoizingCapability, TimedCapability};

use crate::model::{CapabilityInfo, Prediction, StudioConfig, TaskInput, TaskKind};
use anyhow::Result;
use once_cell::sync::OnceCell;
use std::sync::Arc;

pub(crate) trait Capability: Send + Sync {
    fn id(&self) -> TaskKind;

    /// One-time initialisation. Must be idempotent.
    fn load(&self) -> Result<()>;

    /// Run inference. Implementations load lazily when needed.
    fn process(&self, input: &TaskInput) -> Result<Prediction>;

    fn info(&self) -> CapabilityInfo;
}

/// Exactly-once initialisation for a capability's loaded state.
///
/// Concurrent first loads are serialised, so `init` never runs twice for a successful
/// load. A failed load leaves the cell empty and the next caller retries. `is_loaded`
/// never waits on an initialisation in progress.
pub(crate) struct LoadCell<T> {
    cell: OnceCell<T>,
}

impl<T: Clone> LoadCell<T> {
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    pub fn get_or_try_init(&self, init: impl FnOnce() -> Result<T>) -> Result<T> {
        self.cell.get_or_try_init(init).cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T: Clone> Default for LoadCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The application's capability singletons.
#[derive(Clone)]
pub(crate) struct Capabilities {
    pub caption: Arc<dyn Capability>,
    pub sentiment: Arc<dyn Capability>,
}

impl Capabilities {
    /// Build the default composition: timing around both, memoisation for captions.
    /// Caption results are persisted in the model cache folder.
    pub fn from_config(cfg: &StudioConfig) -> Self {
        let hub = HubClient::new(cfg);
        let caption = ImageCaptioner::new(hub.clone(), cfg.caption_model.clone());
        let sentiment = SentimentAnalyzer::new(hub, cfg.sentiment_model.clone());
        Self {
            caption: Arc::new(TimedCapability::new(
                MemoizingCapability::new(caption, cfg.cache_entries).with_store(
                    crate::storage::result_cache_dir(&cfg.cache_dir, &cfg.caption_model),
                ),
            )),
            sentiment: Arc::new(TimedCapability::new(sentiment)),
        }
    }

    pub fn get(&self, task: TaskKind) -> Arc<dyn Capability> {
        match task {
            TaskKind::ImageCaption => self.caption.clone(),
            TaskKind::Sentiment => self.sentiment.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn load_cell_initialises_once_under_contention() {
        let cell = Arc::new(LoadCell::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cell = cell.clone();
                let calls = calls.clone();
                thread::spawn(move || {
                    cell.get_or_try_init(|| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(std::time::Duration::from_millis(5));
                        Ok(7)
                    })
                    .unwrap()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cell.is_loaded());
    }

    #[test]
    fn is_loaded_does_not_wait_for_a_slow_load() {
        let cell = Arc::new(LoadCell::<u32>::new());
        let loader = {
            let cell = cell.clone();
            thread::spawn(move || {
                cell.get_or_try_init(|| {
                    thread::sleep(std::time::Duration::from_millis(800));
                    Ok(1)
                })
            })
        };
        thread::sleep(std::time::Duration::from_millis(100));

        let start = std::time::Instant::now();
        let loaded = cell.is_loaded();
        let waited = start.elapsed();
        assert!(!loaded);
        assert!(
            waited < std::time::Duration::from_millis(200),
            "is_loaded blocked for {waited:?}"
        );

        assert_eq!(loader.join().unwrap().unwrap(), 1);
        assert!(cell.is_loaded());
    }

    #[test]
    fn failed_load_is_retried() {
        let cell = LoadCell::<u32>::new();
        assert!(cell
            .get_or_try_init(|| Err(anyhow::anyhow!("weights missing")))
            .is_err());
        assert!(!cell.is_loaded());
        assert_eq!(cell.get_or_try_init(|| Ok(3)).unwrap(), 3);
    }
}
