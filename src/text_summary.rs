//! Text rendering of predictions.
//!
//! Used by headless text mode and by clipboard copies from the TUI.

use crate::model::{Prediction, TaskKind};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

pub(crate) fn build_text_summary(
    task: TaskKind,
    input: &str,
    prediction: &Prediction,
    elapsed_ms: Option<u64>,
) -> TextSummary {
    let mut lines = vec![format!("Task: {}", task.title()), format!("Input: {input}")];

    match prediction {
        Prediction::Captions(captions) => {
            for (i, c) in captions.iter().enumerate() {
                if i == 0 {
                    lines.push(format!("Caption: {}", c.generated_text));
                } else {
                    lines.push(format!("Alternative: {}", c.generated_text));
                }
            }
        }
        Prediction::Labels(labels) => {
            if let Some(top) = labels.first() {
                lines.push(format!("Sentiment: {} (score {:.2})", top.label, top.score));
            }
            for l in labels.iter().skip(1) {
                lines.push(format!("  {:<16} {:.3}", l.label, l.score));
            }
        }
    }

    if let Some(ms) = elapsed_ms {
        lines.push(format!("Elapsed: {ms} ms"));
    }
    TextSummary { lines }
}

/// Short form placed on the clipboard.
pub(crate) fn clipboard_text(input: &str, prediction: &Prediction) -> String {
    match prediction {
        Prediction::Captions(_) => prediction.top_caption().unwrap_or_default().to_string(),
        Prediction::Labels(_) => match prediction.top_label() {
            Some(top) => format!("{} (Score: {:.2})\nText: {}", top.label, top.score, input),
            None => String::new(),
        },
    }
}
