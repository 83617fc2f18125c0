use crate::bridge::ExecutionBridge;
use crate::capability::{preprocess, Capabilities, Capability};
use crate::model::{AppEvent, ImageSource, Prediction, StudioConfig, TaskInput, TaskKind};
use crate::orchestrator::{AppContext, Presenter, RunStatus, TaskOrchestrator};
use crate::storage::{default_cache_dir, Settings};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub(crate) const SAMPLE_TEXT: &str =
    "I absolutely love this product. It exceeded my expectations!";

/// Output line routing for stdout/stderr writer.
#[derive(Debug, PartialEq)]
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "inference-studio",
    version,
    about = "Image captioning and sentiment analysis with pretrained models, in a TUI or one-shot"
)]
pub struct Cli {
    /// Base URL of the inference endpoint; the model id is appended
    #[arg(long, default_value = "https://router.huggingface.co/hf-inference/models")]
    pub endpoint: String,

    /// Access token sent as a bearer token
    #[arg(long, env = "HF_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Model used for image captioning
    #[arg(long, default_value = "nlpconnect/vit-gpt2-image-captioning")]
    pub caption_model: String,

    /// Model used for sentiment analysis
    #[arg(long, default_value = "tabularisai/multilingual-sentiment-analysis")]
    pub sentiment_model: String,

    /// Per-request timeout
    #[arg(long, default_value = "60s")]
    pub timeout: humantime::Duration,

    /// Number of caption results kept in memory for repeated images (0 disables)
    #[arg(long, default_value_t = 64)]
    pub cache_entries: usize,

    /// Language hint appended to sentiment input ("auto" to disable)
    #[arg(long)]
    pub language: Option<String>,

    /// Do not record completed runs in the history list
    #[arg(long)]
    pub no_history: bool,

    /// Diagnostic log file for TUI mode (defaults to the user cache directory)
    #[arg(long)]
    pub log_file: Option<std::path::PathBuf>,

    /// Model cache folder (overrides the saved setting; defaults to HF_HOME or ~/.cache/huggingface)
    #[arg(long)]
    pub cache_dir: Option<std::path::PathBuf>,

    /// Run a single task without the TUI and print the result
    #[arg(long, value_enum)]
    pub task: Option<TaskKind>,

    /// Text for --task sentiment
    #[arg(long, conflicts_with = "sample_text")]
    pub text: Option<String>,

    /// Use the built-in sample text for --task sentiment
    #[arg(long)]
    pub sample_text: bool,

    /// Image file for --task caption
    #[arg(long, conflicts_with = "sample_image")]
    pub image: Option<std::path::PathBuf>,

    /// Use a generated sample image for --task caption
    #[arg(long)]
    pub sample_image: bool,

    /// Print the headless result as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: Cli) -> Result<()> {
    if let Some(task) = args.task {
        crate::logging::init_stderr();
        return run_headless(args, task).await;
    }

    if args.json || args.text.is_some() || args.image.is_some() {
        return Err(anyhow::anyhow!(
            "--json, --text and --image need --task. Use e.g. --task sentiment --text \"...\"."
        ));
    }

    #[cfg(feature = "tui")]
    {
        let log_path = args
            .log_file
            .clone()
            .or_else(crate::logging::default_log_path);
        if let Some(path) = log_path {
            // Logging is best-effort in TUI mode; the terminal must stay clean.
            let _ = crate::logging::init_file(&path);
        }
        crate::tui::run(args).await
    }
    #[cfg(not(feature = "tui"))]
    {
        Err(anyhow::anyhow!(
            "built without TUI support; pass --task to run headless"
        ))
    }
}

/// Build a `StudioConfig` from CLI arguments and saved settings. Flags win.
pub fn build_config(args: &Cli, settings: &Settings) -> StudioConfig {
    StudioConfig {
        endpoint: args.endpoint.clone(),
        token: args.token.clone(),
        caption_model: args.caption_model.clone(),
        sentiment_model: args.sentiment_model.clone(),
        timeout: Duration::from(args.timeout),
        cache_entries: args.cache_entries,
        language: args.language.clone(),
        save_history: !args.no_history,
        user_agent: format!("inference-studio/{}", env!("CARGO_PKG_VERSION")),
        cache_dir: args
            .cache_dir
            .clone()
            .or_else(|| settings.cache_dir.clone())
            .unwrap_or_else(default_cache_dir),
    }
}

/// Resolve the headless input; `None` lets the orchestrator report the missing selection.
fn headless_input(args: &Cli, task: TaskKind) -> Result<Option<TaskInput>> {
    Ok(match task {
        TaskKind::Sentiment if args.sample_text => Some(TaskInput::Text(SAMPLE_TEXT.into())),
        TaskKind::Sentiment => args.text.clone().map(TaskInput::Text),
        TaskKind::ImageCaption if args.sample_image => Some(TaskInput::Image(
            ImageSource::Bytes(preprocess::sample_image().context("generate sample image")?),
        )),
        TaskKind::ImageCaption => args
            .image
            .clone()
            .map(|p| TaskInput::Image(ImageSource::Path(p))),
    })
}

/// Collects what the orchestrator hands to presentation in headless mode.
#[derive(Default)]
struct ConsolePresenter {
    result: Option<Prediction>,
    error: Option<String>,
}

impl Presenter for ConsolePresenter {
    fn set_running_state(&mut self, running: bool) {
        tracing::debug!(running, "run state changed");
    }

    fn render_result(&mut self, _task: TaskKind, prediction: &Prediction) {
        self.result = Some(prediction.clone());
    }

    fn render_error(&mut self, message: &str) {
        self.error = Some(message.to_string());
    }

    fn append_log(&mut self, line: &str) {
        tracing::debug!(%line, "activity");
    }
}

async fn run_headless(args: Cli, task: TaskKind) -> Result<()> {
    let cfg = build_config(&args, &Settings::load());
    let input = headless_input(&args, task)?;
    let capabilities = Capabilities::from_config(&cfg);

    let (out_tx, out_handle) = spawn_output_writer();
    let res = execute_headless(task, input, capabilities.get(task), &cfg, args.json, &out_tx).await;
    drop(out_tx);
    let _ = out_handle.await;
    res
}

/// Run one request through an orchestrator and write the result to `out`.
///
/// Returns the validation or execution error message as `Err`.
async fn execute_headless(
    task: TaskKind,
    input: Option<TaskInput>,
    capability: Arc<dyn Capability>,
    cfg: &StudioConfig,
    json: bool,
    out: &mpsc::UnboundedSender<OutputLine>,
) -> Result<()> {
    let input_label = input.as_ref().map(TaskInput::summary).unwrap_or_default();
    let (evt_tx, mut evt_rx) = mpsc::unbounded_channel::<AppEvent>();

    let bridge = ExecutionBridge::new();
    let mut ctx = AppContext::new(cfg.save_history);
    let mut orch = TaskOrchestrator::new(task, capability, evt_tx);
    orch.set_language(cfg.language.clone());
    let mut console = ConsolePresenter::default();

    if let RunStatus::Submitted(_) = orch.run(input, &bridge, &mut ctx, &mut console) {
        let _ = out.send(OutputLine::Stderr(format!("Running {}…", task.title())));
        while let Some(ev) = evt_rx.recv().await {
            match ev {
                AppEvent::Finished { id, outcome, .. } => {
                    if orch.deliver(id, outcome, &mut ctx, &mut console) {
                        break;
                    }
                }
                AppEvent::Info(msg) => {
                    let _ = out.send(OutputLine::Stderr(msg));
                }
                AppEvent::CacheSize { .. } => {}
            }
        }
    }

    let info = orch.capability_info();
    match (console.result, console.error) {
        (Some(prediction), _) => {
            let elapsed_ms = info.last_time.map(|d| d.as_millis() as u64);
            if json {
                let body = serde_json::to_string_pretty(&serde_json::json!({
                    "task": task,
                    "input": input_label,
                    "prediction": prediction,
                    "model": info,
                }))?;
                let _ = out.send(OutputLine::Stdout(body));
            } else {
                let summary = crate::text_summary::build_text_summary(
                    task,
                    &input_label,
                    &prediction,
                    elapsed_ms,
                );
                for line in summary.lines {
                    let _ = out.send(OutputLine::Stdout(line));
                }
            }
            Ok(())
        }
        (None, Some(error)) => Err(anyhow::anyhow!(error)),
        (None, None) => Err(anyhow::anyhow!("{} produced no result", task.title())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::tests::{positive, Behaviour, Stub};
    use std::path::PathBuf;
    use std::sync::atomic::Ordering;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("inference-studio").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn defaults_build_a_sane_config() {
        let cfg = build_config(&parse(&[]), &Settings::default());
        assert_eq!(cfg.timeout, Duration::from_secs(60));
        assert_eq!(cfg.caption_model, "nlpconnect/vit-gpt2-image-captioning");
        assert!(cfg.save_history);
        assert!(cfg.user_agent.starts_with("inference-studio/"));
    }

    #[test]
    fn task_names_parse() {
        assert_eq!(parse(&["--task", "caption"]).task, Some(TaskKind::ImageCaption));
        assert_eq!(parse(&["--task", "sentiment"]).task, Some(TaskKind::Sentiment));
    }

    #[test]
    fn headless_input_resolution() {
        let args = parse(&["--task", "sentiment", "--sample-text"]);
        assert_eq!(
            headless_input(&args, TaskKind::Sentiment).unwrap(),
            Some(TaskInput::Text(SAMPLE_TEXT.into()))
        );

        let args = parse(&["--task", "caption"]);
        assert_eq!(headless_input(&args, TaskKind::ImageCaption).unwrap(), None);

        let args = parse(&["--task", "caption", "--sample-image"]);
        assert!(matches!(
            headless_input(&args, TaskKind::ImageCaption).unwrap(),
            Some(TaskInput::Image(ImageSource::Bytes(_)))
        ));
    }

    #[test]
    fn config_serialises_without_token() {
        let cfg = build_config(&parse(&["--token", "hf_secret"]), &Settings::default());
        assert_eq!(cfg.token.as_deref(), Some("hf_secret"));
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("hf_secret"));
        assert!(json.contains("\"timeout\":\"1m\""));
    }

    #[test]
    fn cache_dir_flag_beats_saved_setting() {
        let saved = Settings {
            cache_dir: Some("/saved/hf".into()),
        };
        assert_eq!(
            build_config(&parse(&[]), &saved).cache_dir,
            PathBuf::from("/saved/hf")
        );
        assert_eq!(
            build_config(&parse(&["--cache-dir", "/flag/hf"]), &saved).cache_dir,
            PathBuf::from("/flag/hf")
        );
    }

    async fn headless(
        task: TaskKind,
        input: Option<TaskInput>,
        stub: Arc<Stub>,
        json: bool,
    ) -> (Result<()>, Vec<OutputLine>) {
        let cfg = build_config(&parse(&[]), &Settings::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let res = execute_headless(task, input, stub, &cfg, json, &tx).await;
        drop(tx);
        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        (res, lines)
    }

    fn text(s: &str) -> Option<TaskInput> {
        Some(TaskInput::Text(s.into()))
    }

    #[tokio::test]
    async fn headless_success_prints_text_summary() {
        let stub = Stub::new(TaskKind::Sentiment, Behaviour::Echo(positive()));
        let (res, lines) = headless(TaskKind::Sentiment, text("I love this!"), stub, false).await;
        res.unwrap();
        assert_eq!(
            lines[..2],
            [
                OutputLine::Stderr("Running Sentiment Analysis…".into()),
                OutputLine::Stderr("Loading stub…".into()),
            ]
        );
        assert!(lines.contains(&OutputLine::Stdout("Input: I love this!".into())));
        assert!(lines.contains(&OutputLine::Stdout("Sentiment: POSITIVE (score 0.95)".into())));
    }

    #[tokio::test]
    async fn headless_json_output() {
        let stub = Stub::new(TaskKind::Sentiment, Behaviour::Echo(positive()));
        let (res, lines) = headless(TaskKind::Sentiment, text("I love this!"), stub, true).await;
        res.unwrap();
        let body = lines
            .iter()
            .find_map(|l| match l {
                OutputLine::Stdout(s) => Some(s.clone()),
                OutputLine::Stderr(_) => None,
            })
            .unwrap();
        let v: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(v["task"], "sentiment");
        assert_eq!(v["input"], "I love this!");
        assert_eq!(v["prediction"][0]["label"], "POSITIVE");
        assert_eq!(v["model"]["model_name"], "stub");
    }

    #[tokio::test]
    async fn headless_validation_failure_is_an_error() {
        let stub = Stub::new(TaskKind::Sentiment, Behaviour::Echo(positive()));
        let (res, lines) = headless(TaskKind::Sentiment, text("   "), stub.clone(), false).await;
        assert_eq!(res.unwrap_err().to_string(), "No text entered");
        assert!(lines.is_empty());
        assert_eq!(stub.processed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn headless_execution_failure_carries_the_message() {
        let stub = Stub::new(TaskKind::Sentiment, Behaviour::Fail("model exploded"));
        let (res, lines) = headless(TaskKind::Sentiment, text("hello"), stub, false).await;
        assert_eq!(res.unwrap_err().to_string(), "model exploded");
        assert!(lines.iter().all(|l| matches!(l, OutputLine::Stderr(_))));
    }
}
