use crate::model::{AppEvent, Prediction, TaskInput, TaskKind};
use crate::orchestrator::{AppContext, Presenter, TaskOrchestrator, MAX_TEXT_CHARS};
use crate::storage::Settings;
use bytes::Bytes;
use ratatui::style::Color;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;

pub const LANGUAGES: [&str; 10] = [
    "Auto-detect",
    "English",
    "Spanish",
    "French",
    "German",
    "Italian",
    "Portuguese",
    "Chinese",
    "Japanese",
    "Arabic",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Caption,
    Sentiment,
    History,
    Log,
    Settings,
    Help,
}

impl Tab {
    pub const ALL: [Tab; 6] = [
        Tab::Caption,
        Tab::Sentiment,
        Tab::History,
        Tab::Log,
        Tab::Settings,
        Tab::Help,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Caption => "Caption",
            Tab::Sentiment => "Sentiment",
            Tab::History => "History",
            Tab::Log => "Log",
            Tab::Settings => "Settings",
            Tab::Help => "Help",
        }
    }

    pub fn index(self) -> usize {
        Tab::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn next(self) -> Tab {
        Tab::ALL[(self.index() + 1) % Tab::ALL.len()]
    }

    pub fn prev(self) -> Tab {
        Tab::ALL[(self.index() + Tab::ALL.len() - 1) % Tab::ALL.len()]
    }

    /// The task page behind this tab, if any.
    pub fn task(self) -> Option<TaskKind> {
        match self {
            Tab::Caption => Some(TaskKind::ImageCaption),
            Tab::Sentiment => Some(TaskKind::Sentiment),
            _ => None,
        }
    }
}

/// What a task page currently shows. Receives presenter notifications.
#[derive(Debug, Default)]
pub struct TaskView {
    pub running: bool,
    pub running_since: Option<Instant>,
    pub result: Option<Prediction>,
    /// Input the shown result belongs to.
    pub result_input: String,
    pub pending_input: String,
    pub error: Option<String>,
    pub status: String,
    pub flash_until: Option<Instant>,
}

impl TaskView {
    pub fn clear(&mut self) {
        self.result = None;
        self.result_input.clear();
        self.error = None;
        self.flash_until = None;
    }

    pub fn show_check(&self) -> bool {
        self.flash_until.is_some_and(|t| Instant::now() < t)
    }
}

impl Presenter for TaskView {
    fn set_running_state(&mut self, running: bool) {
        self.running = running;
        if running {
            self.running_since = Some(Instant::now());
            self.result = None;
            self.error = None;
            self.status = "Running…".into();
        } else {
            self.running_since = None;
            self.status = "Ready".into();
        }
    }

    fn render_result(&mut self, _task: TaskKind, prediction: &Prediction) {
        self.result = Some(prediction.clone());
        self.result_input = std::mem::take(&mut self.pending_input);
        self.error = None;
        self.flash_until = Some(Instant::now() + Duration::from_secs(1));
    }

    fn render_error(&mut self, message: &str) {
        self.error = Some(message.to_string());
        self.pending_input.clear();
    }

    fn append_log(&mut self, line: &str) {
        self.status = line.to_string();
    }
}

pub struct TaskPage {
    pub orchestrator: TaskOrchestrator,
    pub view: TaskView,
}

impl TaskPage {
    pub fn new(orchestrator: TaskOrchestrator) -> Self {
        Self {
            orchestrator,
            view: TaskView {
                status: "Ready".into(),
                ..Default::default()
            },
        }
    }
}

pub struct UiState {
    pub tab: Tab,
    pub info: String,
    pub ctx: AppContext,
    pub caption: TaskPage,
    pub sentiment: TaskPage,

    // Inputs
    pub image_path: String,
    pub sample_image: Option<Bytes>,
    pub text: String,
    pub language_idx: usize,

    pub history_selected: usize,
    pub log_scroll: usize,
    pub last_exported_path: Option<String>,
    pub spinner: usize,

    // Model cache folder
    pub events: UnboundedSender<AppEvent>,
    pub settings: Settings,
    pub settings_path: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub cache_input: String,
    /// `None` until a scan of `cache_dir` reports back.
    pub cache_bytes: Option<u64>,
}

impl UiState {
    pub fn new(
        ctx: AppContext,
        caption: TaskOrchestrator,
        sentiment: TaskOrchestrator,
        events: UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            tab: Tab::Caption,
            info: String::new(),
            ctx,
            caption: TaskPage::new(caption),
            sentiment: TaskPage::new(sentiment),
            image_path: String::new(),
            sample_image: None,
            text: String::new(),
            language_idx: 0,
            history_selected: 0,
            log_scroll: 0,
            last_exported_path: None,
            spinner: 0,
            events,
            settings: Settings::default(),
            settings_path: None,
            cache_dir: PathBuf::new(),
            cache_input: String::new(),
            cache_bytes: None,
        }
    }

    /// Point the cache badge and clear action at `dir`; the size is unknown until rescanned.
    pub fn set_cache_dir(&mut self, dir: PathBuf) {
        self.cache_input = dir.display().to_string();
        self.cache_dir = dir;
        self.cache_bytes = None;
    }

    pub fn page(&self, task: TaskKind) -> &TaskPage {
        match task {
            TaskKind::ImageCaption => &self.caption,
            TaskKind::Sentiment => &self.sentiment,
        }
    }

    pub fn page_mut(&mut self, task: TaskKind) -> &mut TaskPage {
        match task {
            TaskKind::ImageCaption => &mut self.caption,
            TaskKind::Sentiment => &mut self.sentiment,
        }
    }

    pub fn language(&self) -> Option<String> {
        match self.language_idx {
            0 => None,
            i => LANGUAGES.get(i).map(|s| s.to_string()),
        }
    }

    pub fn cycle_language(&mut self) {
        self.language_idx = (self.language_idx + 1) % LANGUAGES.len();
        let lang = self.language();
        self.sentiment.orchestrator.set_language(lang);
    }

    /// Current input for `task`, or `None` when nothing is selected.
    pub fn current_input(&self, task: TaskKind) -> Option<TaskInput> {
        match task {
            TaskKind::ImageCaption => {
                if let Some(b) = &self.sample_image {
                    return Some(TaskInput::Image(crate::model::ImageSource::Bytes(b.clone())));
                }
                let path = self.image_path.trim();
                (!path.is_empty()).then(|| {
                    TaskInput::Image(crate::model::ImageSource::Path(path.into()))
                })
            }
            TaskKind::Sentiment => Some(TaskInput::Text(self.text.clone())),
        }
    }

    /// Human-readable form of the current input, kept with the result.
    pub fn input_label(&self, task: TaskKind) -> String {
        match task {
            TaskKind::ImageCaption if self.sample_image.is_some() => "sample image".into(),
            TaskKind::ImageCaption => self.image_path.trim().to_string(),
            TaskKind::Sentiment => self.text.trim().to_string(),
        }
    }

    pub fn push_text(&mut self, s: &str) {
        let room = MAX_TEXT_CHARS.saturating_sub(self.text.chars().count());
        self.text.extend(s.chars().filter(|c| *c != '\r').take(room));
    }

    pub fn push_path(&mut self, s: &str) {
        self.sample_image = None;
        self.image_path
            .extend(s.chars().filter(|c| !c.is_control()));
    }

    pub fn history_clamp(&mut self) {
        if self.ctx.history.is_empty() {
            self.history_selected = 0;
        } else if self.history_selected >= self.ctx.history.len() {
            self.history_selected = self.ctx.history.len() - 1;
        }
    }
}

/// Badge colour for a sentiment label.
pub fn label_color(label: &str) -> Color {
    let upper = label.to_ascii_uppercase();
    if upper.contains("NEG") {
        Color::Red
    } else if upper.contains("POS") {
        Color::Green
    } else {
        Color::Yellow
    }
}
