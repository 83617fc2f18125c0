use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudioConfig {
    pub endpoint: String,
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    pub caption_model: String,
    pub sentiment_model: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub cache_entries: usize,
    #[serde(default)]
    pub language: Option<String>,
    pub save_history: bool,
    pub user_agent: String,
    /// Model cache folder; persisted results are written below it.
    pub cache_dir: PathBuf,
}

/// The two tasks the studio knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    #[value(name = "caption")]
    ImageCaption,
    Sentiment,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::ImageCaption => "image-caption",
            TaskKind::Sentiment => "sentiment",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            TaskKind::ImageCaption => "Image Captioning",
            TaskKind::Sentiment => "Sentiment Analysis",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    Path(PathBuf),
    /// In-memory image, e.g. the generated sample.
    Bytes(Bytes),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskInput {
    Image(ImageSource),
    Text(String),
}

impl TaskInput {
    /// Short description for history and log lines.
    pub fn summary(&self) -> String {
        match self {
            TaskInput::Image(ImageSource::Path(p)) => p.display().to_string(),
            TaskInput::Image(ImageSource::Bytes(b)) => format!("<in-memory image, {} bytes>", b.len()),
            TaskInput::Text(t) => {
                const MAX: usize = 80;
                if t.chars().count() > MAX {
                    let head: String = t.chars().take(MAX - 1).collect();
                    format!("{head}…")
                } else {
                    t.clone()
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl RequestId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        RequestId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One submission. Immutable once handed to the bridge.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub task: TaskKind,
    pub input: TaskInput,
    pub submitted_at: Instant,
}

impl Request {
    pub fn new(task: TaskKind, input: TaskInput) -> Self {
        Self {
            id: RequestId::next(),
            task,
            input,
            submitted_at: Instant::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Caption {
    pub generated_text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

/// Capability-specific result value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prediction {
    Captions(Vec<Caption>),
    Labels(Vec<LabelScore>),
}

impl Prediction {
    pub fn top_caption(&self) -> Option<&str> {
        match self {
            Prediction::Captions(c) => c.first().map(|c| c.generated_text.as_str()),
            Prediction::Labels(_) => None,
        }
    }

    pub fn top_label(&self) -> Option<&LabelScore> {
        match self {
            Prediction::Labels(l) => l.first(),
            Prediction::Captions(_) => None,
        }
    }
}

/// Produced exactly once per request. Exactly one side is ever populated.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Prediction),
    Failure(String),
}

impl Outcome {
    pub fn error(&self) -> Option<&str> {
        match self {
            Outcome::Failure(e) => Some(e),
            Outcome::Success(_) => None,
        }
    }

    pub fn result(&self) -> Option<&Prediction> {
        match self {
            Outcome::Success(p) => Some(p),
            Outcome::Failure(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// Events posted from worker threads to the interactive loop.
#[derive(Debug, Clone)]
pub enum AppEvent {
    Finished {
        task: TaskKind,
        id: RequestId,
        outcome: Outcome,
    },
    Info(String),
    /// Result of a background size scan of the model cache folder at `root`.
    CacheSize { root: PathBuf, bytes: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityInfo {
    pub model_name: String,
    pub loaded: bool,
    #[serde(default, with = "humantime_serde")]
    pub last_time: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp_utc: String,
    pub task: TaskKind,
    pub input: String,
    pub prediction: Prediction,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_payload_parses_as_labels() {
        let p: Prediction =
            serde_json::from_str(r#"[{"label": "POSITIVE", "score": 0.95}]"#).unwrap();
        assert_eq!(
            p,
            Prediction::Labels(vec![LabelScore {
                label: "POSITIVE".into(),
                score: 0.95
            }])
        );
        assert_eq!(p.top_label().map(|l| l.label.as_str()), Some("POSITIVE"));
    }

    #[test]
    fn caption_payload_parses_as_captions() {
        let p: Prediction =
            serde_json::from_str(r#"[{"generated_text": "a dog on a beach"}]"#).unwrap();
        assert_eq!(p.top_caption(), Some("a dog on a beach"));
    }

    #[test]
    fn outcome_sides_are_exclusive() {
        let ok = Outcome::Success(Prediction::Captions(vec![]));
        let err = Outcome::Failure("boom".into());
        assert!(ok.error().is_none() && ok.result().is_some());
        assert!(err.error().is_some() && err.result().is_none());
    }

    #[test]
    fn request_ids_are_unique() {
        let a = Request::new(TaskKind::Sentiment, TaskInput::Text("x".into()));
        let b = Request::new(TaskKind::Sentiment, TaskInput::Text("x".into()));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn long_text_summary_is_truncated() {
        let input = TaskInput::Text("a".repeat(200));
        assert_eq!(input.summary().chars().count(), 80);
    }
}
