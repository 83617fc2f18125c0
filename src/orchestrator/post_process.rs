//! Post-run processing.
//!
//! Records history and produces the activity line after a successful outcome.

use super::context::AppContext;
use crate::model::{HistoryEntry, Prediction, TaskKind};
use std::time::Duration;

/// Record a completed run; returns the logged line for presentation.
pub(crate) fn process_run_completion(
    ctx: &mut AppContext,
    task: TaskKind,
    input: String,
    prediction: &Prediction,
    elapsed: Duration,
) -> String {
    let elapsed_ms = elapsed.as_millis() as u64;
    if ctx.save_history {
        ctx.history.push(HistoryEntry {
            timestamp_utc: time::OffsetDateTime::now_utc()
                .format(&time::format_description::well_known::Rfc3339)
                .unwrap_or_else(|_| "now".into()),
            task,
            input,
            prediction: prediction.clone(),
            elapsed_ms,
        });
    }
    ctx.log(&format!("{} finished in {} ms", task.title(), elapsed_ms))
}
