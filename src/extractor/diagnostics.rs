// Diagnostic log - human-readable trail of one resolution call
//
// Lines are opaque strings for display only; nothing parses them and no
// control flow depends on them. The handle is shared between the main flow
// and the browser network listener, so it is cheap to clone and thread-safe.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Default number of retained lines
pub const DEFAULT_LOG_CAPACITY: usize = 200;

type Sink = Arc<dyn Fn(&str) + Send + Sync>;

struct Inner {
    lines: Mutex<VecDeque<String>>,
    capacity: usize,
    sink: Option<Sink>,
}

/// Append-only, bounded log with an optional caller sink
#[derive(Clone)]
pub struct DiagnosticLog {
    inner: Arc<Inner>,
}

impl DiagnosticLog {
    pub fn new(capacity: usize) -> Self {
        Self::build(capacity, None)
    }

    /// Create a log that also forwards every line to `sink`
    pub fn with_sink<F>(capacity: usize, sink: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self::build(capacity, Some(Arc::new(sink)))
    }

    fn build(capacity: usize, sink: Option<Sink>) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                lines: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
                capacity,
                sink,
            }),
        }
    }

    /// Append a line, dropping the oldest once capacity is reached
    pub fn log(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::debug!(target: "diagnostics", "{}", line);

        if let Ok(mut lines) = self.inner.lines.lock() {
            if lines.len() == self.inner.capacity {
                lines.pop_front();
            }
            lines.push_back(line.clone());
        }

        // Sink runs outside the lock
        if let Some(sink) = &self.inner.sink {
            sink(&line);
        }
    }

    /// Retained lines, oldest first
    pub fn snapshot(&self) -> Vec<String> {
        self.inner
            .lines
            .lock()
            .map(|lines| lines.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.inner.lines.lock().map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl fmt::Debug for DiagnosticLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticLog")
            .field("len", &self.len())
            .field("capacity", &self.inner.capacity)
            .field("sink", &self.inner.sink.is_some())
            .finish()
    }
}
