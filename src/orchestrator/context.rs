//! Application state owned by the interactive thread.

use crate::model::HistoryEntry;
use std::collections::VecDeque;

pub(crate) const LOG_CAPACITY: usize = 1000;

/// Append-only, size-capped log. Oldest lines are discarded first.
#[derive(Debug, Clone)]
pub(crate) struct ActivityLog {
    lines: VecDeque<String>,
    capacity: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }
}

impl ActivityLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(LOG_CAPACITY)),
            capacity,
        }
    }

    pub fn append(&mut self, line: String) {
        self.lines.push_back(line);
        while self.lines.len() > self.capacity {
            self.lines.pop_front();
        }
    }

    pub fn lines(&self) -> impl DoubleEndedIterator<Item = &str> + ExactSizeIterator {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

/// Log, last error and history shared by every task page.
#[derive(Debug, Clone)]
pub(crate) struct AppContext {
    pub log: ActivityLog,
    pub last_error: Option<String>,
    pub history: Vec<HistoryEntry>,
    pub save_history: bool,
}

impl AppContext {
    pub fn new(save_history: bool) -> Self {
        Self {
            log: ActivityLog::default(),
            last_error: None,
            history: Vec::new(),
            save_history,
        }
    }

    /// Timestamp and append a message; returns the stored line.
    pub fn log(&mut self, message: &str) -> String {
        let line = format!("[{}] {}", clock(), message);
        self.log.append(line.clone());
        line
    }

    pub fn record_error(&mut self, message: &str) -> String {
        self.last_error = Some(message.to_string());
        self.log(&format!("Error: {message}"))
    }
}

fn clock() -> String {
    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    now.format(time::macros::format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| "--:--:--".into())
}
