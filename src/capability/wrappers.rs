//! Composable wrappers around any `Capability`.

use super::Capability;
use crate::model::{CapabilityInfo, ImageSource, Prediction, TaskInput, TaskKind};
use anyhow::Result;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Records how long the last `process` call took, successful or not.
pub(crate) struct TimedCapability<C> {
    inner: C,
    last_time: Mutex<Option<Duration>>,
}

impl<C: Capability> TimedCapability<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            last_time: Mutex::new(None),
        }
    }
}

impl<C: Capability> Capability for TimedCapability<C> {
    fn id(&self) -> TaskKind {
        self.inner.id()
    }

    fn load(&self) -> Result<()> {
        self.inner.load()
    }

    fn process(&self, input: &TaskInput) -> Result<Prediction> {
        let start = Instant::now();
        let res = self.inner.process(input);
        let elapsed = start.elapsed();
        *self.last_time.lock().unwrap_or_else(PoisonError::into_inner) = Some(elapsed);
        tracing::debug!(
            capability = %self.inner.id(),
            elapsed_ms = elapsed.as_millis() as u64,
            ok = res.is_ok(),
            "process finished"
        );
        res
    }

    fn info(&self) -> CapabilityInfo {
        CapabilityInfo {
            last_time: *self.last_time.lock().unwrap_or_else(PoisonError::into_inner),
            ..self.inner.info()
        }
    }
}

struct MemoTable {
    entries: HashMap<blake3::Hash, Prediction>,
    // Insertion order, oldest first.
    order: VecDeque<blake3::Hash>,
    capacity: usize,
}

impl MemoTable {
    fn insert(&mut self, key: blake3::Hash, value: Prediction) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key, value).is_none() {
            self.order.push_back(key);
        }
        while self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.entries.remove(&old);
            }
        }
    }
}

/// Caches successful results keyed by a content hash of the input.
///
/// With a store directory, results are also written as `<hash>.json` and survive restarts.
pub(crate) struct MemoizingCapability<C> {
    inner: C,
    table: Mutex<MemoTable>,
    store: Option<PathBuf>,
}

impl<C: Capability> MemoizingCapability<C> {
    pub fn new(inner: C, capacity: usize) -> Self {
        Self {
            inner,
            table: Mutex::new(MemoTable {
                entries: HashMap::new(),
                order: VecDeque::new(),
                capacity,
            }),
            store: None,
        }
    }

    pub fn with_store(mut self, dir: PathBuf) -> Self {
        self.store = Some(dir);
        self
    }

    fn stored_path(&self, key: &blake3::Hash) -> Option<PathBuf> {
        self.store
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", key.to_hex())))
    }

    /// Unreadable or corrupt entries count as a miss.
    fn load_stored(&self, key: &blake3::Hash) -> Option<Prediction> {
        let raw = std::fs::read(self.stored_path(key)?).ok()?;
        serde_json::from_slice(&raw).ok()
    }

    fn write_stored(&self, key: &blake3::Hash, value: &Prediction) {
        let Some(path) = self.stored_path(key) else {
            return;
        };
        let res = path
            .parent()
            .map_or(Ok(()), std::fs::create_dir_all)
            .and_then(|_| {
                let json = serde_json::to_vec(value).map_err(std::io::Error::other)?;
                std::fs::write(&path, json)
            });
        if let Err(e) = res {
            tracing::warn!(path = %path.display(), error = %e, "could not persist result");
        }
    }

    /// `None` when the content cannot be read; the call then bypasses the cache.
    fn key(&self, input: &TaskInput) -> Option<blake3::Hash> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.inner.id().as_str().as_bytes());
        match input {
            TaskInput::Text(t) => {
                hasher.update(b"text:");
                hasher.update(t.as_bytes());
            }
            TaskInput::Image(ImageSource::Bytes(b)) => {
                hasher.update(b"image:");
                hasher.update(b);
            }
            TaskInput::Image(ImageSource::Path(p)) => {
                let raw = std::fs::read(p).ok()?;
                hasher.update(b"image:");
                hasher.update(&raw);
            }
        }
        Some(hasher.finalize())
    }

    #[cfg(test)]
    fn cached_len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }
}

impl<C: Capability> Capability for MemoizingCapability<C> {
    fn id(&self) -> TaskKind {
        self.inner.id()
    }

    fn load(&self) -> Result<()> {
        self.inner.load()
    }

    fn process(&self, input: &TaskInput) -> Result<Prediction> {
        let key = self.key(input);
        if let Some(key) = key {
            let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(hit) = table.entries.get(&key) {
                tracing::debug!(capability = %self.inner.id(), "memo hit");
                return Ok(hit.clone());
            }
            if let Some(hit) = self.load_stored(&key) {
                tracing::debug!(capability = %self.inner.id(), "stored result hit");
                table.insert(key, hit.clone());
                return Ok(hit);
            }
        }

        // Lock is not held across inference; two identical misses may both run.
        let res = self.inner.process(input)?;
        if let Some(key) = key {
            self.table
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key, res.clone());
            self.write_stored(&key, &res);
        }
        Ok(res)
    }

    fn info(&self) -> CapabilityInfo {
        self.inner.info()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Caption;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    impl Counting {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    impl Capability for Counting {
        fn id(&self) -> TaskKind {
            TaskKind::ImageCaption
        }
        fn load(&self) -> Result<()> {
            Ok(())
        }
        fn process(&self, input: &TaskInput) -> Result<Prediction> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("model exploded");
            }
            Ok(Prediction::Captions(vec![Caption {
                generated_text: input.summary(),
            }]))
        }
        fn info(&self) -> CapabilityInfo {
            CapabilityInfo {
                model_name: "counting".into(),
                loaded: true,
                last_time: None,
            }
        }
    }

    fn text(s: &str) -> TaskInput {
        TaskInput::Text(s.into())
    }

    #[test]
    fn repeated_input_hits_the_cache() {
        let memo = MemoizingCapability::new(Counting::new(false), 8);
        let a = memo.process(&text("same")).unwrap();
        let b = memo.process(&text("same")).unwrap();
        assert_eq!(a, b);
        assert_eq!(memo.inner.calls.load(Ordering::SeqCst), 1);
        memo.process(&text("different")).unwrap();
        assert_eq!(memo.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failures_are_not_cached() {
        let memo = MemoizingCapability::new(Counting::new(true), 8);
        assert!(memo.process(&text("x")).is_err());
        assert!(memo.process(&text("x")).is_err());
        assert_eq!(memo.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(memo.cached_len(), 0);
    }

    #[test]
    fn oldest_entry_is_evicted_at_capacity() {
        let memo = MemoizingCapability::new(Counting::new(false), 2);
        memo.process(&text("a")).unwrap();
        memo.process(&text("b")).unwrap();
        memo.process(&text("c")).unwrap();
        assert_eq!(memo.cached_len(), 2);
        // "a" was evicted, so it runs again; "c" is still cached.
        memo.process(&text("c")).unwrap();
        assert_eq!(memo.inner.calls.load(Ordering::SeqCst), 3);
        memo.process(&text("a")).unwrap();
        assert_eq!(memo.inner.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn path_key_follows_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("img.png");
        std::fs::write(&path, b"first").unwrap();
        let memo = MemoizingCapability::new(Counting::new(false), 8);
        let input = TaskInput::Image(ImageSource::Path(path.clone()));

        memo.process(&input).unwrap();
        memo.process(&input).unwrap();
        assert_eq!(memo.inner.calls.load(Ordering::SeqCst), 1);

        std::fs::write(&path, b"second").unwrap();
        memo.process(&input).unwrap();
        assert_eq!(memo.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stored_results_survive_a_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("results");

        let first = MemoizingCapability::new(Counting::new(false), 8).with_store(store.clone());
        let a = first.process(&text("persist me")).unwrap();
        assert_eq!(first.inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read_dir(&store).unwrap().count(), 1);

        let second = MemoizingCapability::new(Counting::new(false), 8).with_store(store.clone());
        assert_eq!(second.process(&text("persist me")).unwrap(), a);
        assert_eq!(second.inner.calls.load(Ordering::SeqCst), 0);

        // A corrupt entry is ignored and rewritten.
        let entry = std::fs::read_dir(&store).unwrap().next().unwrap().unwrap().path();
        std::fs::write(&entry, "garbage").unwrap();
        let third = MemoizingCapability::new(Counting::new(false), 8).with_store(store);
        assert_eq!(third.process(&text("persist me")).unwrap(), a);
        assert_eq!(third.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn timed_records_elapsed_even_on_failure() {
        let timed = TimedCapability::new(Counting::new(true));
        assert!(timed.info().last_time.is_none());
        assert!(timed.process(&text("x")).is_err());
        assert!(timed.info().last_time.is_some());
        assert_eq!(timed.info().model_name, "counting");
    }
}
