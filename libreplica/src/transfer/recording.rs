//! A logger that keeps what it is told, for assertions.

use super::Logger;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Level {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Default)]
pub(crate) struct RecordingLogger {
    entries: Mutex<Vec<(Level, String)>>,
}

impl RecordingLogger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn push(&self, level: Level, message: &str) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((level, message.to_string()));
    }

    pub(crate) fn messages(&self, level: Level) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// How many messages at `level` contain `needle`.
    pub(crate) fn count(&self, level: Level, needle: &str) -> usize {
        self.messages(level)
            .iter()
            .filter(|m| m.contains(needle))
            .count()
    }
}

impl Logger for RecordingLogger {
    fn debug(&self, message: &str) {
        self.push(Level::Debug, message);
    }

    fn info(&self, message: &str) {
        self.push(Level::Info, message);
    }

    fn warning(&self, message: &str) {
        self.push(Level::Warning, message);
    }

    fn error(&self, message: &str) {
        self.push(Level::Error, message);
    }
}
