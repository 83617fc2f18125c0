//! Execution bridge: runs a capability off the interactive thread.
//!
//! Each `submit` spawns one worker thread that loads the capability (idempotent), runs
//! `process`, and hands exactly one `Outcome` to the completion sink. Errors and panics
//! are converted to `Outcome::Failure` at the worker boundary.
//!
//! The sink runs on the worker thread. It must not touch interactive-thread state; the
//! orchestrator's sink only posts an `AppEvent` to the UI channel, and rendering happens
//! when the interactive loop drains that channel.
//!
//! There is no cancellation and no concurrency cap: every call spawns a new worker that
//! runs to completion. Callers keep at most one request in flight per task page.

use crate::capability::Capability;
use crate::model::{Outcome, Request};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Guarantees the sink fires exactly once.
///
/// Dropping an unfired completion (worker never started, or unwound past `fire`) delivers
/// a failure so the caller is never left waiting in the running state.
struct Completion<F: FnOnce(Outcome)> {
    sink: Option<F>,
}

impl<F: FnOnce(Outcome)> Completion<F> {
    fn new(sink: F) -> Self {
        Self { sink: Some(sink) }
    }

    fn fire(mut self, outcome: Outcome) {
        if let Some(sink) = self.sink.take() {
            sink(outcome);
        }
    }
}

impl<F: FnOnce(Outcome)> Drop for Completion<F> {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink(Outcome::Failure("worker exited without a result".into()));
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ExecutionBridge {
    spawned: AtomicU64,
}

impl ExecutionBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of workers started so far.
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Fire-and-forget. `on_done` receives exactly one outcome, on the worker thread.
    pub fn submit<F>(&self, request: Request, capability: Arc<dyn Capability>, on_done: F)
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        let completion = Completion::new(on_done);
        let id = request.id;
        let task = request.task;

        let spawn = std::thread::Builder::new()
            .name(format!("{}-worker-{}", task.as_str(), id.0))
            .spawn(move || {
                let outcome = execute(capability.as_ref(), &request);
                match &outcome {
                    Outcome::Success(_) => tracing::info!(
                        task = %request.task,
                        request = %request.id,
                        elapsed_ms = request.submitted_at.elapsed().as_millis() as u64,
                        "request completed"
                    ),
                    Outcome::Failure(error) => tracing::warn!(
                        task = %request.task,
                        request = %request.id,
                        %error,
                        "request failed"
                    ),
                }
                completion.fire(outcome);
            });

        match spawn {
            Ok(_) => {
                self.spawned.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%task, request = %id, "worker spawned");
            }
            // The closure, and the completion inside it, was dropped: the failure has
            // already been delivered by the guard.
            Err(e) => tracing::error!(%task, request = %id, error = %e, "failed to spawn worker"),
        }
    }
}

/// Load then process, with every error and panic turned into data.
fn execute(capability: &dyn Capability, request: &Request) -> Outcome {
    let res = panic::catch_unwind(AssertUnwindSafe(|| {
        capability.load()?;
        capability.process(&request.input)
    }));
    match res {
        Ok(Ok(prediction)) => Outcome::Success(prediction),
        Ok(Err(e)) => Outcome::Failure(format!("{e:#}")),
        Err(payload) => Outcome::Failure(format!(
            "{} panicked: {}",
            capability.id(),
            panic_message(payload.as_ref())
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
