//! Per-file line-count baselines and AI/human line-delta accumulators.

use std::collections::HashMap;

/// Line deltas attributed to one file since the previous heartbeat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineChanges {
    pub ai: Option<i64>,
    pub human: Option<i64>,
}

#[derive(Debug, Default)]
pub struct LineDeltaTracker {
    baselines: HashMap<String, u32>,
    ai: HashMap<String, i64>,
    human: HashMap<String, i64>,
}

impl LineDeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the current line count of `file`. The first observation of a
    /// file only seeds its baseline.
    pub fn observe(&mut self, file: &str, current: u32, ai_generating: bool) {
        let previous = *self.baselines.entry(file.to_string()).or_insert(current);
        let delta = i64::from(current) - i64::from(previous);

        let bucket = if ai_generating {
            &mut self.ai
        } else {
            &mut self.human
        };
        *bucket.entry(file.to_string()).or_insert(0) += delta;

        self.baselines.insert(file.to_string(), current);
    }

    /// Reads the deltas for `file`, then clears every accumulator.
    ///
    /// Deltas of other files are dropped: only the interval ending with this
    /// heartbeat is attributed.
    pub fn take(&mut self, file: &str) -> LineChanges {
        let changes = LineChanges {
            ai: self.ai.get(file).copied(),
            human: self.human.get(file).copied(),
        };
        self.ai.clear();
        self.human.clear();
        changes
    }

    pub fn baseline(&self, file: &str) -> Option<u32> {
        self.baselines.get(file).copied()
    }
}
