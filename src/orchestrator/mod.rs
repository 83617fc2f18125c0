//! Application-level orchestration.
//!
//! Owns the per-task run lifecycle (validate, submit, deliver) and the application context
//! (activity log, last error, history). UI and CLI layers call into this module and only
//! observe outcomes through the `Presenter` boundary.

mod context;
mod controller;
mod post_process;

pub(crate) use context::{AppContext, LOG_CAPACITY};
pub(crate) use controller::{Presenter, RunStatus, TaskOrchestrator, MAX_TEXT_CHARS};
