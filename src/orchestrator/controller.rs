//! Task page lifecycle controller.
//!
//! Turns one "Run" action into one bridge submission, keeps at most one request in flight
//! and routes the eventual outcome to a presenter.
//!
//! Idle -> (Run) -> validate -> Running -> (outcome delivered) -> Idle.
//! Invalid input reports an error and stays Idle. Run while Running is ignored.

use super::context::AppContext;
use super::post_process::process_run_completion;
use crate::bridge::ExecutionBridge;
use crate::capability::Capability;
use crate::error::TaskError;
use crate::model::{
    AppEvent, CapabilityInfo, ImageSource, Outcome, Prediction, Request, RequestId, TaskInput,
    TaskKind,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;

pub(crate) const MAX_TEXT_CHARS: usize = 3000;
pub(crate) const MAX_IMAGE_BYTES: u64 = 25 * 1024 * 1024;
pub(crate) const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// One-way notifications from a task page to whatever renders it.
pub(crate) trait Presenter {
    fn set_running_state(&mut self, running: bool);
    fn render_result(&mut self, task: TaskKind, prediction: &Prediction);
    fn render_error(&mut self, message: &str);
    fn append_log(&mut self, line: &str);
}

/// What happened to a Run action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RunStatus {
    Submitted(RequestId),
    /// A request is already in flight; the action was ignored.
    Busy,
    Rejected(TaskError),
}

struct InFlight {
    id: RequestId,
    input: String,
    started: Instant,
}

pub(crate) struct TaskOrchestrator {
    task: TaskKind,
    capability: Arc<dyn Capability>,
    events: UnboundedSender<AppEvent>,
    language: Option<String>,
    in_flight: Option<InFlight>,
}

impl TaskOrchestrator {
    pub fn new(
        task: TaskKind,
        capability: Arc<dyn Capability>,
        events: UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            task,
            capability,
            events,
            language: None,
            in_flight: None,
        }
    }

    pub fn task(&self) -> TaskKind {
        self.task
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn set_language(&mut self, language: Option<String>) {
        self.language = language;
    }

    pub fn capability_info(&self) -> CapabilityInfo {
        self.capability.info()
    }

    /// Handle a Run action. `input` is `None` when nothing has been selected yet.
    pub fn run<P: Presenter + ?Sized>(
        &mut self,
        input: Option<TaskInput>,
        bridge: &ExecutionBridge,
        ctx: &mut AppContext,
        presenter: &mut P,
    ) -> RunStatus {
        if self.is_running() {
            tracing::debug!(task = %self.task, "run ignored, request already in flight");
            return RunStatus::Busy;
        }

        let input = match validate(self.task, input, self.language.as_deref()) {
            Ok(input) => input,
            Err(e) => {
                report_error(&e, ctx, presenter);
                return RunStatus::Rejected(e);
            }
        };

        let request = Request::new(self.task, input);
        let id = request.id;
        self.in_flight = Some(InFlight {
            id,
            input: request.input.summary(),
            started: Instant::now(),
        });
        presenter.set_running_state(true);
        tracing::info!(task = %self.task, request = %id, "submitting request");

        let info = self.capability.info();
        if !info.loaded
            && self
                .events
                .send(AppEvent::Info(format!("Loading {}…", info.model_name)))
                .is_err()
        {
            tracing::debug!(task = %self.task, request = %id, "loading notice dropped, interactive loop gone");
        }

        let events = self.events.clone();
        let task = self.task;
        bridge.submit(request, self.capability.clone(), move |outcome| {
            // Worker thread: only post, rendering happens when the interactive loop drains.
            if events
                .send(AppEvent::Finished { task, id, outcome })
                .is_err()
            {
                tracing::debug!(%task, request = %id, "outcome dropped, interactive loop gone");
            }
        });
        RunStatus::Submitted(id)
    }

    /// Apply an outcome on the interactive thread. Returns false for a stale request id.
    pub fn deliver<P: Presenter + ?Sized>(
        &mut self,
        id: RequestId,
        outcome: Outcome,
        ctx: &mut AppContext,
        presenter: &mut P,
    ) -> bool {
        let flight = match self.in_flight.take() {
            Some(f) if f.id == id => f,
            other => {
                self.in_flight = other;
                tracing::warn!(task = %self.task, request = %id, "discarding outcome for a request that is not in flight");
                return false;
            }
        };

        presenter.set_running_state(false);
        match outcome {
            Outcome::Success(prediction) => {
                presenter.render_result(self.task, &prediction);
                let line = process_run_completion(
                    ctx,
                    self.task,
                    flight.input,
                    &prediction,
                    flight.started.elapsed(),
                );
                presenter.append_log(&line);
            }
            Outcome::Failure(message) => {
                report_error(&TaskError::Execution(message), ctx, presenter);
            }
        }
        true
    }
}

fn report_error<P: Presenter + ?Sized>(err: &TaskError, ctx: &mut AppContext, presenter: &mut P) {
    let message = err.to_string();
    let line = ctx.record_error(&message);
    presenter.append_log(&line);
    presenter.render_error(&message);
}

/// Check input presence and shape for `task`, applying the language hint to text.
pub(crate) fn validate(
    task: TaskKind,
    input: Option<TaskInput>,
    language: Option<&str>,
) -> Result<TaskInput, TaskError> {
    let invalid = |msg: &str| TaskError::Validation(msg.to_string());
    match (task, input) {
        (TaskKind::ImageCaption, None) => Err(invalid("No image selected")),
        (TaskKind::Sentiment, None) => Err(invalid("No text entered")),
        (TaskKind::Sentiment, Some(TaskInput::Text(text))) => {
            let text = text.trim();
            if text.is_empty() {
                return Err(invalid("No text entered"));
            }
            if text.chars().count() > MAX_TEXT_CHARS {
                return Err(invalid("Text exceeds 3000 characters"));
            }
            let text = match language.map(str::trim) {
                Some(lang) if !lang.is_empty() && !lang.eq_ignore_ascii_case("auto") => {
                    format!("{text} (in {lang})")
                }
                _ => text.to_string(),
            };
            Ok(TaskInput::Text(text))
        }
        (TaskKind::ImageCaption, Some(TaskInput::Image(source))) => {
            validate_image(&source)?;
            Ok(TaskInput::Image(source))
        }
        (TaskKind::ImageCaption, Some(TaskInput::Text(_))) => {
            Err(invalid("Image captioning needs an image, not text"))
        }
        (TaskKind::Sentiment, Some(TaskInput::Image(_))) => {
            Err(invalid("Sentiment analysis needs text, not an image"))
        }
    }
}

fn validate_image(source: &ImageSource) -> Result<(), TaskError> {
    match source {
        ImageSource::Bytes(b) if b.is_empty() => {
            Err(TaskError::Validation("No image selected".into()))
        }
        ImageSource::Bytes(_) => Ok(()),
        ImageSource::Path(path) => {
            let ext_ok = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.iter().any(|ok| e.eq_ignore_ascii_case(ok)))
                .unwrap_or(false);
            if !ext_ok {
                return Err(TaskError::Validation(
                    "Invalid file format. Use PNG, JPG, JPEG, or BMP.".into(),
                ));
            }
            let meta = std::fs::metadata(path).map_err(|_| {
                TaskError::Validation(format!("Image not found: {}", path.display()))
            })?;
            if meta.len() > MAX_IMAGE_BYTES {
                return Err(TaskError::Validation(
                    "File too large. Maximum size is 25 MB.".into(),
                ));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::tests::{positive, Behaviour, Stub};
    use std::sync::atomic::Ordering;
    use std::sync::{mpsc, Mutex};
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    #[derive(Default)]
    struct Recorder {
        running: Vec<bool>,
        results: Vec<(TaskKind, Prediction)>,
        errors: Vec<String>,
        logs: Vec<String>,
    }

    impl Presenter for Recorder {
        fn set_running_state(&mut self, running: bool) {
            self.running.push(running);
        }
        fn render_result(&mut self, task: TaskKind, prediction: &Prediction) {
            self.results.push((task, prediction.clone()));
        }
        fn render_error(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }
        fn append_log(&mut self, line: &str) {
            self.logs.push(line.to_string());
        }
    }

    fn page(
        stub: Arc<Stub>,
    ) -> (
        TaskOrchestrator,
        UnboundedReceiver<AppEvent>,
        ExecutionBridge,
        AppContext,
        Recorder,
    ) {
        let (tx, rx) = unbounded_channel();
        (
            TaskOrchestrator::new(stub.task, stub, tx),
            rx,
            ExecutionBridge::new(),
            AppContext::new(true),
            Recorder::default(),
        )
    }

    fn drain_one(
        orch: &mut TaskOrchestrator,
        rx: &mut UnboundedReceiver<AppEvent>,
        ctx: &mut AppContext,
        rec: &mut Recorder,
    ) -> bool {
        loop {
            match rx.blocking_recv() {
                Some(AppEvent::Finished { task, id, outcome }) => {
                    assert_eq!(task, orch.task());
                    return orch.deliver(id, outcome, ctx, rec);
                }
                Some(AppEvent::Info(_)) => continue,
                Some(AppEvent::CacheSize { .. }) => continue,
                None => panic!("event channel closed"),
            }
        }
    }

    #[test]
    fn sentiment_success_runs_and_returns_to_idle() {
        let stub = Stub::new(TaskKind::Sentiment, Behaviour::Echo(positive()));
        let (mut orch, mut rx, bridge, mut ctx, mut rec) = page(stub);

        let status = orch.run(
            Some(TaskInput::Text("I love this!".into())),
            &bridge,
            &mut ctx,
            &mut rec,
        );
        assert!(matches!(status, RunStatus::Submitted(_)));
        assert!(orch.is_running());

        assert!(drain_one(&mut orch, &mut rx, &mut ctx, &mut rec));
        assert!(!orch.is_running());
        assert_eq!(rec.running, vec![true, false]);
        assert_eq!(rec.results, vec![(TaskKind::Sentiment, positive())]);
        assert!(rec.errors.is_empty());
        assert_eq!(ctx.history.len(), 1);
        assert_eq!(ctx.history[0].input, "I love this!");
        assert!(ctx.last_error.is_none());
    }

    #[test]
    fn run_while_running_does_not_submit_again() {
        let (release, gate) = mpsc::channel();
        let stub = Stub::new(
            TaskKind::Sentiment,
            Behaviour::Gate(Mutex::new(gate), positive()),
        );
        let (mut orch, mut rx, bridge, mut ctx, mut rec) = page(stub.clone());

        let first = orch.run(Some(TaskInput::Text("one".into())), &bridge, &mut ctx, &mut rec);
        let second = orch.run(Some(TaskInput::Text("two".into())), &bridge, &mut ctx, &mut rec);
        assert!(matches!(first, RunStatus::Submitted(_)));
        assert_eq!(second, RunStatus::Busy);
        assert_eq!(bridge.spawned(), 1);

        release.send(()).unwrap();
        assert!(drain_one(&mut orch, &mut rx, &mut ctx, &mut rec));
        assert_eq!(stub.processed.load(Ordering::SeqCst), 1);
        assert_eq!(rec.running, vec![true, false]);

        // Idle again, so the next run goes through.
        release.send(()).unwrap();
        let third = orch.run(Some(TaskInput::Text("three".into())), &bridge, &mut ctx, &mut rec);
        assert!(matches!(third, RunStatus::Submitted(_)));
        assert!(drain_one(&mut orch, &mut rx, &mut ctx, &mut rec));
        assert_eq!(stub.processed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn empty_text_never_reaches_the_bridge() {
        let stub = Stub::new(TaskKind::Sentiment, Behaviour::Echo(positive()));
        let (mut orch, mut rx, bridge, mut ctx, mut rec) = page(stub.clone());

        let status = orch.run(Some(TaskInput::Text("   ".into())), &bridge, &mut ctx, &mut rec);
        assert_eq!(
            status,
            RunStatus::Rejected(TaskError::Validation("No text entered".into()))
        );
        assert_eq!(bridge.spawned(), 0);
        assert_eq!(stub.loads.load(Ordering::SeqCst), 0);
        assert!(rx.try_recv().is_err());
        assert!(!orch.is_running());
        assert!(rec.running.is_empty());
        assert_eq!(rec.errors, vec!["No text entered".to_string()]);
        assert_eq!(ctx.last_error.as_deref(), Some("No text entered"));
    }

    #[test]
    fn image_failure_renders_error_and_logs_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        std::fs::write(&path, b"jpeg-ish").unwrap();
        let stub = Stub::new(
            TaskKind::ImageCaption,
            Behaviour::Fail("FileNotFoundError: photo.jpg"),
        );
        let (mut orch, mut rx, bridge, mut ctx, mut rec) = page(stub);

        let status = orch.run(
            Some(TaskInput::Image(ImageSource::Path(path))),
            &bridge,
            &mut ctx,
            &mut rec,
        );
        assert!(matches!(status, RunStatus::Submitted(_)));
        assert!(drain_one(&mut orch, &mut rx, &mut ctx, &mut rec));

        assert!(!orch.is_running());
        assert_eq!(rec.running, vec![true, false]);
        assert_eq!(rec.errors, vec!["FileNotFoundError: photo.jpg".to_string()]);
        assert_eq!(rec.logs.len(), 1);
        assert!(rec.logs[0].ends_with("Error: FileNotFoundError: photo.jpg"));
        assert!(rec.results.is_empty());
        assert_eq!(ctx.last_error.as_deref(), Some("FileNotFoundError: photo.jpg"));
        assert!(ctx.history.is_empty());
    }

    #[test]
    fn panicking_capability_still_returns_to_idle() {
        let stub = Stub::new(TaskKind::Sentiment, Behaviour::Panic);
        let (mut orch, mut rx, bridge, mut ctx, mut rec) = page(stub);
        orch.run(Some(TaskInput::Text("x".into())), &bridge, &mut ctx, &mut rec);
        assert!(drain_one(&mut orch, &mut rx, &mut ctx, &mut rec));
        assert!(!orch.is_running());
        assert_eq!(rec.errors.len(), 1);
    }

    #[test]
    fn stale_outcome_leaves_state_alone() {
        let (release, gate) = mpsc::channel();
        let stub = Stub::new(
            TaskKind::Sentiment,
            Behaviour::Gate(Mutex::new(gate), positive()),
        );
        let (mut orch, mut rx, bridge, mut ctx, mut rec) = page(stub);
        orch.run(Some(TaskInput::Text("x".into())), &bridge, &mut ctx, &mut rec);

        let accepted = orch.deliver(
            RequestId(u64::MAX),
            Outcome::Success(positive()),
            &mut ctx,
            &mut rec,
        );
        assert!(!accepted);
        assert!(orch.is_running());
        assert!(rec.results.is_empty());

        release.send(()).unwrap();
        assert!(drain_one(&mut orch, &mut rx, &mut ctx, &mut rec));
        assert!(!orch.is_running());
    }

    #[test]
    fn run_survives_a_closed_event_channel() {
        let stub = Stub::new(TaskKind::Sentiment, Behaviour::Echo(positive()));
        let (tx, rx) = unbounded_channel();
        drop(rx);
        let mut orch = TaskOrchestrator::new(TaskKind::Sentiment, stub, tx);
        let bridge = ExecutionBridge::new();
        let mut ctx = AppContext::new(true);
        let mut rec = Recorder::default();

        let status = orch.run(Some(TaskInput::Text("x".into())), &bridge, &mut ctx, &mut rec);
        assert!(matches!(status, RunStatus::Submitted(_)));
        assert!(orch.is_running());
        assert_eq!(rec.running, vec![true]);
        assert!(rec.errors.is_empty());
    }

    #[test]
    fn language_hint_is_appended() {
        let out = validate(
            TaskKind::Sentiment,
            Some(TaskInput::Text("  great stuff ".into())),
            Some("German"),
        )
        .unwrap();
        assert_eq!(out, TaskInput::Text("great stuff (in German)".into()));

        let auto = validate(
            TaskKind::Sentiment,
            Some(TaskInput::Text("great".into())),
            Some("auto"),
        )
        .unwrap();
        assert_eq!(auto, TaskInput::Text("great".into()));
    }

    #[test]
    fn overlong_text_is_rejected() {
        let err = validate(
            TaskKind::Sentiment,
            Some(TaskInput::Text("x".repeat(MAX_TEXT_CHARS + 1))),
            None,
        )
        .unwrap_err();
        assert!(err.is_validation());
        assert!(validate(
            TaskKind::Sentiment,
            Some(TaskInput::Text("x".repeat(MAX_TEXT_CHARS))),
            None
        )
        .is_ok());
    }

    #[test]
    fn image_checks_extension_existence_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let check = |p: std::path::PathBuf| {
            validate(
                TaskKind::ImageCaption,
                Some(TaskInput::Image(ImageSource::Path(p))),
                None,
            )
        };

        let gif = dir.path().join("anim.gif");
        std::fs::write(&gif, b"x").unwrap();
        assert_eq!(
            check(gif).unwrap_err().to_string(),
            "Invalid file format. Use PNG, JPG, JPEG, or BMP."
        );

        let missing = dir.path().join("nope.PNG");
        assert!(check(missing)
            .unwrap_err()
            .to_string()
            .starts_with("Image not found"));

        let big = dir.path().join("big.bmp");
        std::fs::File::create(&big)
            .unwrap()
            .set_len(MAX_IMAGE_BYTES + 1)
            .unwrap();
        assert_eq!(
            check(big).unwrap_err().to_string(),
            "File too large. Maximum size is 25 MB."
        );

        let ok = dir.path().join("ok.JPEG");
        std::fs::write(&ok, b"x").unwrap();
        assert!(check(ok).is_ok());
    }

    #[test]
    fn missing_selection_and_wrong_kind_are_validation_errors() {
        assert_eq!(
            validate(TaskKind::ImageCaption, None, None).unwrap_err(),
            TaskError::Validation("No image selected".into())
        );
        assert!(validate(
            TaskKind::ImageCaption,
            Some(TaskInput::Image(ImageSource::Bytes(bytes::Bytes::new()))),
            None
        )
        .is_err());
        assert!(validate(TaskKind::Sentiment, Some(TaskInput::Image(ImageSource::Bytes(
            bytes::Bytes::from_static(b"x")
        ))), None)
        .unwrap_err()
        .is_validation());
    }
}
