//! Editor activity heartbeats: classification, buffering and delivery.
//!
//! The pipeline is a synchronous [`Tracker`] wrapped by an async [`Driver`]
//! that owns timers and talks to a [`transport::Transport`].

pub mod activity;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod delivery;
pub mod driver;
pub mod error;
pub mod status;
pub mod tracker;
pub mod transport;
pub mod types;

pub use clock::{Clock, SystemClock, TokioClock};
pub use config::{Paths, Settings};
pub use credentials::Credentials;
pub use delivery::{DeliveryStatus, FlushBatch, TransportOutcome};
pub use driver::Driver;
pub use error::{ConfigError, TransportError};
pub use status::StatusLine;
pub use tracker::{Action, Tracker, TrackerConfig};
pub use transport::{AnyTransport, CliTransport, HttpTransport, Transport};
pub use types::{Category, Heartbeat};
