//! Live output observers for running commands.

use std::sync::Mutex;

use tracing::debug;

/// Receives output lines while a command is still running.
///
/// Purely a side channel: the command's result is returned in full
/// regardless of what the observer does with the lines.
pub trait OutputObserver: Send + Sync {
    fn on_stdout(&self, line: &str);
    fn on_stderr(&self, line: &str);
}

/// Logs every line at debug level.
pub struct TracingObserver;

impl OutputObserver for TracingObserver {
    fn on_stdout(&self, line: &str) {
        debug!("[stdout] {line}");
    }

    fn on_stderr(&self, line: &str) {
        debug!("[stderr] {line}");
    }
}

pub struct NullObserver;

impl OutputObserver for NullObserver {
    fn on_stdout(&self, _line: &str) {}
    fn on_stderr(&self, _line: &str) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Keeps every line in arrival order.
#[derive(Default)]
pub struct CollectingObserver {
    lines: Mutex<Vec<(Stream, String)>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(Stream, String)> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    fn push(&self, stream: Stream, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((stream, line.to_string()));
        }
    }
}

impl OutputObserver for CollectingObserver {
    fn on_stdout(&self, line: &str) {
        self.push(Stream::Stdout, line);
    }

    fn on_stderr(&self, line: &str) {
        self.push(Stream::Stderr, line);
    }
}
