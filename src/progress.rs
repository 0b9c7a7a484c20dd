//! Named checkpoints of a report run and the sinks that surface them.

use crate::report::model::NarrativeSection;
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
#[cfg(test)]
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

/// A discrete point a run passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Normalizing,
    Aggregating,
    CalculatingTrends,
    Ranking,
    ComparingCounties,
    AssemblingReport,
    GeneratingNarrative(NarrativeSection),
    Exporting(&'static str),
    Completed,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Checkpoint::Normalizing => write!(f, "normalizing"),
            Checkpoint::Aggregating => write!(f, "aggregating"),
            Checkpoint::CalculatingTrends => write!(f, "calculating trends"),
            Checkpoint::Ranking => write!(f, "ranking"),
            Checkpoint::ComparingCounties => write!(f, "comparing counties"),
            Checkpoint::AssemblingReport => write!(f, "assembling report"),
            Checkpoint::GeneratingNarrative(section) => {
                write!(f, "generating narrative: {}", section.key())
            }
            Checkpoint::Exporting(format) => write!(f, "exporting: {}", format),
            Checkpoint::Completed => write!(f, "completed"),
        }
    }
}

/// Receives checkpoints as a run passes them.
///
/// Narrative checkpoints may arrive from concurrent tasks.
pub trait ProgressSink: Send + Sync {
    fn checkpoint(&self, checkpoint: Checkpoint);

    /// Called once when the run ends, successfully or not.
    fn finish(&self) {}
}

/// Logs checkpoints through `tracing`.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn checkpoint(&self, checkpoint: Checkpoint) {
        info!("Checkpoint: {}", checkpoint);
    }
}

/// Terminal spinner showing the latest checkpoint.
pub struct SpinnerProgress {
    bar: ProgressBar,
}

impl SpinnerProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            bar.set_style(style);
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }
}

impl Default for SpinnerProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for SpinnerProgress {
    fn checkpoint(&self, checkpoint: Checkpoint) {
        self.bar.set_message(checkpoint.to_string());
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Records checkpoints in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingProgress {
    seen: Mutex<Vec<Checkpoint>>,
}

#[cfg(test)]
impl RecordingProgress {
    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        match self.seen.lock() {
            Ok(seen) => seen.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
impl ProgressSink for RecordingProgress {
    fn checkpoint(&self, checkpoint: Checkpoint) {
        match self.seen.lock() {
            Ok(mut seen) => seen.push(checkpoint),
            Err(poisoned) => poisoned.into_inner().push(checkpoint),
        }
    }
}
