//! Settle-time emission decision and heartbeat assembly.

use chrono::{DateTime, Utc};
use pulse_protocol::DocumentSnapshot;

use super::lines::LineChanges;
use super::surfaces::{is_pull_request, FocusedFile};
use crate::types::{Category, Heartbeat};

pub const HEARTBEAT_INTERVAL_MS: i64 = 120_000;

/// Session modes that select a heartbeat's category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityFlags {
    pub debugging: bool,
    pub compiling: bool,
    pub ai_generating: bool,
}

/// What the previous emit decision looked like.
#[derive(Debug, Default)]
pub struct EmitSnapshot {
    last_file: Option<String>,
    last_at: Option<DateTime<Utc>>,
    last_flags: ActivityFlags,
}

impl EmitSnapshot {
    pub fn should_emit(
        &self,
        file: &str,
        now: DateTime<Utc>,
        flags: ActivityFlags,
        is_write: bool,
    ) -> bool {
        if is_write {
            return true;
        }
        let interval_passed = match self.last_at {
            Some(at) => (now - at).num_milliseconds() >= HEARTBEAT_INTERVAL_MS,
            None => true,
        };
        interval_passed || self.last_file.as_deref() != Some(file) || self.last_flags != flags
    }

    pub fn record(&mut self, file: &str, now: DateTime<Utc>, flags: ActivityFlags) {
        self.last_file = Some(file.to_string());
        self.last_at = Some(now);
        self.last_flags = flags;
    }
}

/// Highest-priority category for the current modes.
pub fn category_for(flags: ActivityFlags, scheme: &str) -> Option<Category> {
    if flags.debugging {
        Some(Category::Debugging)
    } else if flags.compiling {
        Some(Category::Building)
    } else if flags.ai_generating {
        Some(Category::AiCoding)
    } else if is_pull_request(scheme) {
        Some(Category::CodeReviewing)
    } else {
        None
    }
}

/// Epoch seconds with millisecond precision.
pub fn epoch_seconds(now: DateTime<Utc>) -> f64 {
    now.timestamp_millis() as f64 / 1000.0
}

pub fn build_heartbeat(
    doc: &DocumentSnapshot,
    focused: &FocusedFile,
    now: DateTime<Utc>,
    is_write: bool,
    flags: ActivityFlags,
    lines: LineChanges,
) -> Heartbeat {
    let folder = doc.workspace_folder.as_ref();
    Heartbeat {
        entity: focused.entity.clone(),
        time: epoch_seconds(now),
        is_write,
        lineno: doc.selection.line + 1,
        cursorpos: doc.selection.character + 1,
        lines_in_file: doc.line_count,
        category: category_for(flags, &doc.scheme),
        alternate_project: folder.map(|f| f.name.clone()),
        project_folder: folder.map(|f| f.path.clone()),
        ai_line_changes: lines.ai,
        human_line_changes: lines.human,
        is_unsaved_entity: focused.is_unsaved.then_some(true),
    }
}
