//! Synchronous heartbeat state machine.
//!
//! The [`Tracker`] owns every piece of mutable pipeline state and never does
//! I/O. Callers feed it editor events, timer ticks and delivery results with
//! an explicit `now`, then drain the [`Action`]s it queued:
//!
//! ```text
//! event ──► classifier ──► line tracker ──► debouncer ─(50ms)─► settle
//!                                                                │
//!            Action::Flush ◄── buffer ◄── dedup guard ◄── builder ┘
//! ```
//!
//! Timers are plain deadlines; the owner sleeps until [`Tracker::next_deadline`]
//! and then calls [`Tracker::on_timer`].

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use pulse_protocol::{DocumentSnapshot, EditorEvent, HostCommand, HostInfo, SelectionKind};

use crate::activity::surfaces::is_ai_chat_surface;
use crate::activity::{
    build_heartbeat, focused_file, has_ai_capabilities, ActivityFlags, AuthorshipClassifier,
    DedupGuard, EmitSnapshot, FocusedFile, LineDeltaTracker, SettleDebouncer,
};
use crate::config::Settings;
use crate::delivery::{
    DeliveryInterpreter, DeliveryStatus, FlushBatch, HeartbeatBuffer, StatusUpdate,
};
use crate::status::StatusLine;
use crate::transport::{Delivery, TodayResult};

pub const FETCH_TODAY_INTERVAL_SECS: i64 = 60;

/// Work the tracker wants done outside itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Drain the buffer to the transport (needs an api key).
    Flush,
    /// Ask the transport for today's totals.
    FetchToday,
    Host(HostCommand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub disabled: bool,
    pub status_bar_enabled: bool,
    pub coding_activity: bool,
    /// Shown to the user in error statuses.
    pub log_pointer: PathBuf,
}

impl TrackerConfig {
    pub fn from_settings(settings: &Settings, log_pointer: impl Into<PathBuf>) -> Self {
        Self {
            disabled: settings.disabled,
            status_bar_enabled: settings.status_bar_enabled,
            coding_activity: settings.status_bar_coding_activity,
            log_pointer: log_pointer.into(),
        }
    }
}

pub struct Tracker {
    config: TrackerConfig,
    host: HostInfo,
    active: Option<DocumentSnapshot>,
    debugging: bool,
    compiling: bool,
    classifier: AuthorshipClassifier,
    lines: LineDeltaTracker,
    debouncer: SettleDebouncer,
    dedup: DedupGuard,
    snapshot: EmitSnapshot,
    buffer: HeartbeatBuffer,
    interpreter: DeliveryInterpreter,
    status: Option<StatusLine>,
    today_text: Option<String>,
    last_fetch_today: Option<DateTime<Utc>>,
    prompt_pending: bool,
    actions: Vec<Action>,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        let interpreter = DeliveryInterpreter::new(config.log_pointer.clone());
        Self {
            config,
            host: HostInfo::default(),
            active: None,
            debugging: false,
            compiling: false,
            classifier: AuthorshipClassifier::new(false),
            lines: LineDeltaTracker::new(),
            debouncer: SettleDebouncer::default(),
            dedup: DedupGuard::default(),
            snapshot: EmitSnapshot::default(),
            buffer: HeartbeatBuffer::default(),
            interpreter,
            status: None,
            today_text: None,
            last_fetch_today: None,
            prompt_pending: false,
            actions: Vec::new(),
        }
    }

    pub fn host(&self) -> &HostInfo {
        &self.host
    }

    /// `<app>/<version> <plugin>/<version>`.
    pub fn user_agent(&self) -> String {
        format!(
            "{}/{} {}/{}",
            self.host.app_name, self.host.app_version, self.host.plugin_name, self.host.plugin_version
        )
    }

    pub fn flags(&self) -> ActivityFlags {
        ActivityFlags {
            debugging: self.debugging,
            compiling: self.compiling,
            ai_generating: self.classifier.is_generating(),
        }
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn status(&self) -> Option<&StatusLine> {
        self.status.as_ref()
    }

    pub fn take_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.actions)
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        match (self.classifier.deadline(), self.debouncer.deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn handle_event(&mut self, event: EditorEvent, now: DateTime<Utc>) {
        if event.carries_editor() {
            if self.config.disabled {
                return;
            }
            self.active = event.active_editor().cloned();
        }

        match event {
            EditorEvent::Initialize(info) => self.initialize(info, now),
            EditorEvent::SelectionChanged { kind, .. } => {
                if kind == SelectionKind::Command {
                    return;
                }
                self.mark_if_chat_focused();
                self.observe_lines();
                self.signal(false, now);
            }
            EditorEvent::ActiveEditorChanged { .. } => {
                self.mark_if_chat_focused();
                self.observe_lines();
                self.signal(false, now);
            }
            EditorEvent::TabsChanged { .. }
            | EditorEvent::NotebookChanged { .. }
            | EditorEvent::DebugChanged { .. } => {
                self.observe_lines();
                self.signal(false, now);
            }
            EditorEvent::DocumentSaved { .. } | EditorEvent::NotebookSaved { .. } => {
                self.observe_lines();
                self.signal(true, now);
            }
            EditorEvent::TextChanged {
                document, changes, ..
            } => {
                let shape = self.classifier.on_text_change(&document, &changes, now);
                tracing::trace!(shape = ?shape, uri = %document.uri, "Text change");
                self.observe_lines();
                if self.classifier.is_generating() {
                    self.signal(false, now);
                }
            }
            EditorEvent::TaskStarted {
                is_background,
                detail,
                ..
            } => {
                let is_watch = detail.as_deref().is_some_and(|d| d.contains("watch"));
                if is_background || is_watch {
                    return;
                }
                self.compiling = true;
                self.classifier.clear();
                self.observe_lines();
                self.signal(false, now);
            }
            EditorEvent::TaskEnded { .. } => {
                self.compiling = false;
                self.observe_lines();
                self.signal(false, now);
            }
            EditorEvent::DebugStarted { .. } => {
                self.debugging = true;
                self.classifier.clear();
                self.observe_lines();
                self.signal(false, now);
            }
            EditorEvent::DebugTerminated { .. } => {
                self.debugging = false;
                self.observe_lines();
                self.signal(false, now);
            }
            EditorEvent::ApiKeyEntered { .. } => {
                self.prompt_pending = false;
            }
            EditorEvent::FetchToday => {
                if self.config.disabled {
                    return;
                }
                self.actions.push(Action::Flush);
                if self.config.status_bar_enabled {
                    self.last_fetch_today = Some(now);
                    self.actions.push(Action::FetchToday);
                }
            }
            EditorEvent::Shutdown => {}
        }
    }

    fn initialize(&mut self, info: HostInfo, now: DateTime<Utc>) {
        let ai_capable = has_ai_capabilities(&info);
        tracing::info!(
            app = %info.app_name,
            version = %info.app_version,
            ai_capable,
            "Host initialized"
        );
        self.classifier.set_ai_capable(ai_capable);
        self.host = info;
        self.set_status(StatusLine::initializing());
        if !self.config.disabled {
            self.maybe_fetch_today(now);
        }
    }

    /// Startup finished with a usable api key.
    pub fn on_ready(&mut self) {
        if self.status == Some(StatusLine::initializing()) {
            self.set_status(StatusLine::ready());
        }
    }

    /// Advances both timers. The AI timer goes first so a settle firing at
    /// the same instant sees the updated AI state.
    pub fn on_timer(&mut self, now: DateTime<Utc>) {
        self.classifier.poll(now);
        if let Some(is_write) = self.debouncer.poll(now) {
            self.settle(is_write, now);
        }
    }

    fn mark_if_chat_focused(&mut self) {
        let on_chat = self
            .active
            .as_ref()
            .is_some_and(|doc| is_ai_chat_surface(&doc.scheme));
        if on_chat {
            self.classifier.mark_generating();
        }
    }

    fn observe_lines(&mut self) {
        let Some(doc) = &self.active else {
            return;
        };
        let Some(focused) = focused_file(doc) else {
            return;
        };
        self.lines
            .observe(&focused.entity, doc.line_count, self.classifier.is_generating());
    }

    fn signal(&mut self, is_write: bool, now: DateTime<Utc>) {
        self.flush_if_stale(now);
        self.debouncer.request(is_write, now);
    }

    fn flush_if_stale(&mut self, now: DateTime<Utc>) {
        if !self.buffer.is_empty() && self.buffer.is_stale(now) {
            self.actions.push(Action::Flush);
        }
    }

    fn settle(&mut self, is_write: bool, now: DateTime<Utc>) {
        if self.config.disabled {
            return;
        }
        let Some(doc) = self.active.clone() else {
            return;
        };
        let Some(focused) = focused_file(&doc) else {
            return;
        };

        let flags = self.flags();
        if !self.snapshot.should_emit(&focused.entity, now, flags, is_write) {
            return;
        }
        self.append_heartbeat(&doc, &focused, now, is_write, flags);
        self.snapshot.record(&focused.entity, now, flags);
    }

    fn append_heartbeat(
        &mut self,
        doc: &DocumentSnapshot,
        focused: &FocusedFile,
        now: DateTime<Utc>,
        is_write: bool,
        flags: ActivityFlags,
    ) {
        if is_write && self.dedup.is_duplicate(&focused.entity, now, doc.selection) {
            tracing::debug!(entity = %focused.entity, "Skipping duplicate write heartbeat");
            return;
        }

        let lines = self.lines.take(&focused.entity);
        let heartbeat = build_heartbeat(doc, focused, now, is_write, flags, lines);
        tracing::debug!(
            entity = %heartbeat.entity,
            is_write,
            category = ?heartbeat.category,
            "Appending heartbeat to local buffer"
        );
        self.buffer.push(heartbeat);
        self.flush_if_stale(now);
    }

    /// Hands the whole buffer to the caller, stamping the flush time.
    pub fn take_batch(&mut self, now: DateTime<Utc>) -> Option<FlushBatch> {
        self.buffer.take_batch(now)
    }

    /// Queues a credential prompt unless one is already showing.
    pub fn request_api_key(&mut self, initial: bool) {
        if self.prompt_pending {
            return;
        }
        self.prompt_pending = true;
        self.actions
            .push(Action::Host(HostCommand::PromptApiKey { initial }));
    }

    pub fn on_delivery(&mut self, delivery: Delivery, now: DateTime<Utc>) -> DeliveryStatus {
        if !delivery.returned.is_empty() {
            tracing::debug!(count = delivery.returned.len(), "Requeueing extra heartbeats");
            self.buffer.requeue_front(delivery.returned);
        }

        let reaction = self.interpreter.react(&delivery.outcome, now);
        match reaction.update {
            StatusUpdate::Reset => {
                let line = match &self.today_text {
                    Some(text) => StatusLine::today(text, self.config.coding_activity),
                    None => StatusLine::ready(),
                };
                if self.status.as_ref().map_or(true, |s| s.is_error() || *s == StatusLine::initializing()) {
                    self.set_status(line);
                }
            }
            StatusUpdate::Offline => self.set_status(StatusLine::offline(
                self.today_text.as_deref(),
                self.config.coding_activity,
            )),
            StatusUpdate::Error(message) => self.set_status(StatusLine::error(message)),
        }

        if reaction.prompt_api_key {
            self.prompt_pending = true;
            self.actions
                .push(Action::Host(HostCommand::PromptApiKey { initial: false }));
        }
        if reaction.refresh_today {
            self.maybe_fetch_today(now);
        }
        reaction.status
    }

    pub fn on_today(&mut self, result: TodayResult) {
        match result {
            TodayResult::Stats(stats) => {
                self.set_status(StatusLine::today(&stats.text, self.config.coding_activity));
                self.today_text = Some(stats.text).filter(|t| !t.is_empty());
            }
            TodayResult::Offline => {}
            TodayResult::InvalidCredential => {
                self.set_status(StatusLine::error("Invalid Api Key (401); Make sure your Api Key is correct!"));
            }
            TodayResult::Failed(reason) => {
                tracing::debug!(reason = %reason, "Error fetching today coding activity");
            }
        }
    }

    fn maybe_fetch_today(&mut self, now: DateTime<Utc>) {
        if !self.config.status_bar_enabled {
            return;
        }
        let due = self
            .last_fetch_today
            .map_or(true, |at| now - at >= Duration::seconds(FETCH_TODAY_INTERVAL_SECS));
        if due {
            self.last_fetch_today = Some(now);
            self.actions.push(Action::FetchToday);
        }
    }

    fn set_status(&mut self, line: StatusLine) {
        if self.status.as_ref() == Some(&line) {
            return;
        }
        if self.config.status_bar_enabled {
            self.actions.push(Action::Host(line.to_command()));
        }
        self.status = Some(line);
    }
}
