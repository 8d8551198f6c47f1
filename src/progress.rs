//! Progress reporting for pipeline stages
//!
//! A single [`StatusTracker`] is shared by every stage. Each stage overwrites
//! the current text as it advances; readers see whatever was written last.

use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

/// Text reported before any stage has run
pub const DEFAULT_STATUS: &str = "nothing new";

/// Stage that wrote the current status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    #[default]
    Idle,
    Scan,
    Import,
    Thumbnail,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Scan => "scan",
            Stage::Import => "import",
            Stage::Thumbnail => "thumbnail",
        }
    }
}

/// Point-in-time copy of the tracker state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// Write counter, increases by one on every update
    pub seq: u64,
    pub stage: Stage,
    pub message: String,
    /// Whether the message is a stage's terminal summary
    pub finished: bool,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            seq: 0,
            stage: Stage::Idle,
            message: DEFAULT_STATUS.to_string(),
            finished: true,
        }
    }
}

/// Shared, last-write-wins progress text
///
/// Cloning yields another handle to the same state.
#[derive(Debug, Clone, Default)]
pub struct StatusTracker {
    inner: Arc<RwLock<StatusSnapshot>>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the current text with an in-progress message
    pub fn set(&self, stage: Stage, message: impl Into<String>) {
        self.write(stage, message.into(), false);
    }

    /// Overwrite the current text with a stage's terminal summary
    pub fn finish(&self, stage: Stage, message: impl Into<String>) {
        self.write(stage, message.into(), true);
    }

    fn write(&self, stage: Stage, message: String, finished: bool) {
        let mut state = self.inner.write().unwrap_or_else(|e| e.into_inner());
        log::trace!("status[{}] {}", stage.as_str(), message);
        state.seq += 1;
        state.stage = stage;
        state.message = message;
        state.finished = finished;
    }

    /// Current human-readable progress text
    pub fn current(&self) -> String {
        self.snapshot().message
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Seconds rounded to two decimals, as shown in terminal summaries
pub fn format_seconds(elapsed: Duration) -> String {
    format!("{:.2}", elapsed.as_secs_f64())
}

/// Stopwatch for one stage run
#[derive(Debug, Clone, Copy)]
pub struct StageTimer {
    start: Instant,
}

impl StageTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    pub fn seconds(&self) -> String {
        format_seconds(self.elapsed())
    }
}
