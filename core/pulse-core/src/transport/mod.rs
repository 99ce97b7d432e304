//! Delivery backends: the wakatime CLI as a subprocess, or the HTTP API.

pub mod cli;
pub mod http;

use std::future::Future;
use std::path::PathBuf;

use crate::delivery::{FlushBatch, TransportOutcome};
use crate::types::Heartbeat;

pub use cli::CliTransport;
pub use http::HttpTransport;

/// Per-request values resolved by the caller before handing off to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub api_key: String,
    /// Only set when it differs from the public endpoint.
    pub api_url: Option<String>,
    pub user_agent: String,
    pub metrics: bool,
    pub machine_name: Option<String>,
    pub config_file: PathBuf,
    pub log_file: PathBuf,
    pub hide_categories: bool,
}

/// Result of one flush: the outcome plus any heartbeats to put back.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub outcome: TransportOutcome,
    pub returned: Vec<Heartbeat>,
}

impl Delivery {
    pub fn done(outcome: TransportOutcome) -> Self {
        Self {
            outcome,
            returned: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TodayStats {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodayResult {
    Stats(TodayStats),
    Offline,
    InvalidCredential,
    Failed(String),
}

/// A backend that accepts heartbeat batches and answers "today" queries.
///
/// Implementations never return errors: every failure becomes an outcome.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        ctx: RequestContext,
        batch: FlushBatch,
    ) -> impl Future<Output = Delivery> + Send;

    fn today(&self, ctx: RequestContext) -> impl Future<Output = TodayResult> + Send;
}

/// Backend picked at startup.
#[derive(Debug)]
pub enum AnyTransport {
    Cli(CliTransport),
    Http(HttpTransport),
}

impl Transport for AnyTransport {
    async fn send(&self, ctx: RequestContext, batch: FlushBatch) -> Delivery {
        match self {
            AnyTransport::Cli(t) => t.send(ctx, batch).await,
            AnyTransport::Http(t) => t.send(ctx, batch).await,
        }
    }

    async fn today(&self, ctx: RequestContext) -> TodayResult {
        match self {
            AnyTransport::Cli(t) => t.today(ctx).await,
            AnyTransport::Http(t) => t.today(ctx).await,
        }
    }
}
