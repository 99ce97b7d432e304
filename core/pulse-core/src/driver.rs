//! Async owner of the [`Tracker`].
//!
//! One task owns all state. Editor events arrive on a channel, timers are
//! slept on in the same `select!`, and I/O (deliveries, today fetches, api
//! key lookups) runs in spawned tasks whose results come back through a
//! `JoinSet` and are applied on the owner's turn.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pulse_protocol::{EditorEvent, HostCommand};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep, timeout};

use crate::clock::{Clock, SystemClock};
use crate::config::{Paths, Settings};
use crate::credentials::{self, Credentials};
use crate::tracker::{Action, Tracker, TrackerConfig};
use crate::transport::{Delivery, RequestContext, TodayResult, Transport};

/// How long shutdown waits for in-flight deliveries.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Result of a spawned task.
#[derive(Debug)]
enum Report {
    Delivered(Delivery),
    Today(TodayResult),
    KeyResolved(Option<String>),
}

/// Work parked until an api key lookup finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyWaiter {
    Startup,
    Flush,
    Today,
}

/// Time handed to the tracker when the timer sleep completes. The sleep runs
/// on the monotonic clock, so the deadline has passed even if the wall clock
/// was stepped backwards meanwhile.
fn timer_now(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    deadline.map_or(now, |deadline| deadline.max(now))
}

pub struct Driver<T: Transport, C: Clock = SystemClock> {
    tracker: Tracker,
    credentials: Credentials,
    settings: Settings,
    paths: Paths,
    transport: Arc<T>,
    clock: C,
    commands: mpsc::UnboundedSender<HostCommand>,
    tasks: JoinSet<Report>,
    key_lookup_running: bool,
    key_waiters: Vec<KeyWaiter>,
}

impl<T: Transport> Driver<T, SystemClock> {
    pub fn new(
        settings: Settings,
        paths: Paths,
        transport: T,
        commands: mpsc::UnboundedSender<HostCommand>,
    ) -> Self {
        Self::with_clock(settings, paths, transport, commands, SystemClock)
    }
}

impl<T: Transport, C: Clock> Driver<T, C> {
    pub fn with_clock(
        settings: Settings,
        paths: Paths,
        transport: T,
        commands: mpsc::UnboundedSender<HostCommand>,
        clock: C,
    ) -> Self {
        let tracker = Tracker::new(TrackerConfig::from_settings(&settings, paths.log_dir()));
        let credentials = Credentials::new(paths.config_file());
        Self {
            tracker,
            credentials,
            settings,
            paths,
            transport: Arc::new(transport),
            clock,
            commands,
            tasks: JoinSet::new(),
            key_lookup_running: false,
            key_waiters: Vec::new(),
        }
    }

    /// Runs until `Shutdown` or the event channel closes, then performs a
    /// final flush.
    pub async fn run(mut self, mut events: mpsc::Receiver<EditorEvent>) {
        loop {
            self.process_actions();

            let deadline = self.tracker.next_deadline();
            let wait = deadline.map(|deadline| {
                (deadline - self.clock.now())
                    .to_std()
                    .unwrap_or(Duration::ZERO)
            });

            tokio::select! {
                event = events.recv() => match event {
                    Some(EditorEvent::Shutdown) | None => break,
                    Some(event) => self.on_event(event),
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    self.on_report(joined);
                }
                _ = sleep(wait.unwrap_or(Duration::ZERO)), if wait.is_some() => {
                    self.tracker.on_timer(timer_now(deadline, self.clock.now()));
                }
            }
        }

        self.shutdown().await;
    }

    fn on_event(&mut self, event: EditorEvent) {
        let now = self.clock.now();
        match &event {
            EditorEvent::Initialize(info) => {
                self.credentials.set_editor_key(info.api_key.clone());
                self.tracker.handle_event(event, now);
                if !self.settings.disabled {
                    self.await_key(KeyWaiter::Startup);
                }
            }
            EditorEvent::ApiKeyEntered { key } => {
                let stored = self.credentials.store(key);
                self.tracker.handle_event(event, now);
                if let Err(e) = stored {
                    tracing::warn!(error = %e, "Rejected api key");
                    self.tracker.request_api_key(false);
                }
            }
            _ => self.tracker.handle_event(event, now),
        }
    }

    fn process_actions(&mut self) {
        for action in self.tracker.take_actions() {
            match action {
                Action::Flush => self.flush(),
                Action::FetchToday => self.fetch_today(),
                Action::Host(command) => self.send_command(command),
            }
        }
    }

    fn send_command(&self, command: HostCommand) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Host command channel closed");
        }
    }

    fn request_context(&self, api_key: String) -> RequestContext {
        RequestContext {
            api_key,
            api_url: self.settings.api_url_override(),
            user_agent: self.tracker.user_agent(),
            metrics: self.settings.metrics,
            machine_name: self.tracker.host().machine_name.clone(),
            config_file: self.paths.config_file(),
            log_file: self.paths.cli_log_file(),
            hide_categories: self.settings.status_bar_hide_categories,
        }
    }

    fn flush(&mut self) {
        if self.tracker.buffered() == 0 {
            return;
        }
        let Some(key) = self.credentials.cached().map(str::to_string) else {
            self.await_key(KeyWaiter::Flush);
            return;
        };
        let Some(batch) = self.tracker.take_batch(self.clock.now()) else {
            return;
        };

        let ctx = self.request_context(key);
        let transport = Arc::clone(&self.transport);
        tracing::debug!(extras = batch.extras.len(), "Flushing heartbeats");
        self.tasks
            .spawn(async move { Report::Delivered(transport.send(ctx, batch).await) });
    }

    fn fetch_today(&mut self) {
        let Some(key) = self.credentials.cached().map(str::to_string) else {
            self.await_key(KeyWaiter::Today);
            return;
        };
        let ctx = self.request_context(key);
        let transport = Arc::clone(&self.transport);
        self.tasks
            .spawn(async move { Report::Today(transport.today(ctx).await) });
    }

    /// Parks `waiter` and starts a key lookup unless one is already running.
    fn await_key(&mut self, waiter: KeyWaiter) {
        if !self.key_waiters.contains(&waiter) {
            self.key_waiters.push(waiter);
        }
        if self.key_lookup_running {
            return;
        }
        self.key_lookup_running = true;
        let sources = self.credentials.sources();
        self.tasks
            .spawn(async move { Report::KeyResolved(credentials::resolve(sources).await) });
    }

    fn on_report(&mut self, joined: Result<Report, JoinError>) {
        let report = match joined {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "Background task failed");
                return;
            }
        };
        let now = self.clock.now();

        match report {
            Report::Delivered(delivery) => {
                let status = self.tracker.on_delivery(delivery, now);
                tracing::debug!(status = ?status, "Delivery finished");
            }
            Report::Today(result) => self.tracker.on_today(result),
            Report::KeyResolved(key) => {
                self.key_lookup_running = false;
                // A key entered while the lookup ran takes precedence.
                if self.credentials.cached().is_none() {
                    self.credentials.accept(key);
                }
                let found = self.credentials.cached().is_some();

                for waiter in std::mem::take(&mut self.key_waiters) {
                    match (waiter, found) {
                        (KeyWaiter::Startup, true) => self.tracker.on_ready(),
                        (KeyWaiter::Flush, true) => self.flush(),
                        (KeyWaiter::Today, true) => self.fetch_today(),
                        (KeyWaiter::Startup | KeyWaiter::Flush, false) => {
                            tracing::info!("No api key found, prompting");
                            self.tracker.request_api_key(true);
                        }
                        (KeyWaiter::Today, false) => {}
                    }
                }
            }
        }
    }

    async fn shutdown(mut self) {
        tracing::info!(buffered = self.tracker.buffered(), "Shutting down");

        if self.tracker.buffered() > 0 {
            if let Some(key) = self.credentials.api_key().await {
                if let Some(batch) = self.tracker.take_batch(self.clock.now()) {
                    let ctx = self.request_context(key);
                    let transport = Arc::clone(&self.transport);
                    self.tasks
                        .spawn(async move { Report::Delivered(transport.send(ctx, batch).await) });
                }
            } else {
                tracing::warn!(
                    dropped = self.tracker.buffered(),
                    "No api key at shutdown, heartbeats not sent"
                );
            }
        }

        let drained = timeout(SHUTDOWN_GRACE, async {
            while let Some(joined) = self.tasks.join_next().await {
                if let Ok(Report::Delivered(delivery)) = joined {
                    tracing::debug!(outcome = ?delivery.outcome, "Final delivery finished");
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!("Deliveries still running at shutdown, abandoning them");
            self.tasks.abort_all();
        }
    }
}
