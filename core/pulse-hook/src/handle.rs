//! Host editor bridge.
//!
//! Reads newline-delimited JSON editor events from stdin, runs them through
//! the heartbeat driver, and writes host commands back as JSON lines.
//!
//! ## Stream lifecycle
//!
//! ```text
//! initialize          → status "Initializing...", api key lookup
//! editor events       → heartbeats, flushes, status updates
//! shutdown | EOF      → final flush, wait ≤ 2s for deliveries, exit
//! ```

use std::io;

use pulse_core::config::{Paths, Settings};
use pulse_core::credentials::Credentials;
use pulse_core::transport::{AnyTransport, RequestContext, TodayResult, Transport};
use pulse_core::Driver;
use pulse_protocol::{encode_command, parse_event_line, EditorEvent, HostCommand};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

const EVENT_QUEUE: usize = 256;
const MAX_LOGGED_LINE: usize = 200;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Failed to read stdin: {0}")]
    Read(#[source] io::Error),

    #[error("Failed to write stdout: {0}")]
    Write(#[source] io::Error),

    #[error("Failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),
}

pub async fn run(paths: Paths, settings: Settings, transport: AnyTransport) -> Result<(), String> {
    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();

    let reader = tokio::spawn(read_events(tokio::io::stdin(), events_tx));
    let writer = tokio::spawn(write_commands(tokio::io::stdout(), commands_rx));

    Driver::new(settings, paths, transport, commands_tx)
        .run(events_rx)
        .await;

    reader.abort();
    writer
        .await
        .map_err(|e| format!("Command writer panicked: {}", e))?
        .map_err(|e| e.to_string())
}

/// Forwards parsed events until the input ends or the receiver goes away.
/// Malformed lines are logged and skipped.
pub async fn read_events<R>(input: R, events: mpsc::Sender<EditorEvent>) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    while let Some(line) = lines.next_line().await.map_err(ProtocolError::Read)? {
        match parse_event_line(&line) {
            Ok(Some(event)) => {
                if events.send(event).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => {
                let preview: String = line.chars().take(MAX_LOGGED_LINE).collect();
                tracing::warn!(error = %e, line = %preview, "Skipping malformed event");
            }
        }
    }
    tracing::debug!("Event stream closed");
    Ok(())
}

pub async fn write_commands<W>(
    mut output: W,
    mut commands: mpsc::UnboundedReceiver<HostCommand>,
) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = commands.recv().await {
        let mut line = encode_command(&command)?;
        line.push('\n');
        output
            .write_all(line.as_bytes())
            .await
            .map_err(ProtocolError::Write)?;
        output.flush().await.map_err(ProtocolError::Write)?;
    }
    Ok(())
}

/// One-shot "today" lookup, printed to stdout.
pub async fn today(paths: Paths, settings: Settings, transport: AnyTransport) -> Result<(), String> {
    let mut credentials = Credentials::new(paths.config_file());
    let api_key = credentials
        .api_key()
        .await
        .ok_or("No api key found; set api_key in your .wakatime.cfg")?;

    let version = env!("CARGO_PKG_VERSION");
    let ctx = RequestContext {
        api_key,
        api_url: settings.api_url_override(),
        user_agent: format!("pulse-hook/{version} pulse/{version}"),
        metrics: settings.metrics,
        machine_name: None,
        config_file: paths.config_file(),
        log_file: paths.cli_log_file(),
        hide_categories: settings.status_bar_hide_categories,
    };

    match transport.today(ctx).await {
        TodayResult::Stats(stats) if stats.text.is_empty() => {
            println!("Calculating time spent today in background...");
            Ok(())
        }
        TodayResult::Stats(stats) => {
            println!("{}", stats.text);
            Ok(())
        }
        TodayResult::Offline => Err("Working offline".to_string()),
        TodayResult::InvalidCredential => {
            Err("Invalid Api Key; Make sure your Api Key is correct!".to_string())
        }
        TodayResult::Failed(reason) => Err(format!("Error fetching today's stats: {}", reason)),
    }
}
