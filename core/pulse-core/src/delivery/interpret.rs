//! Maps transport outcomes onto operational states and the reactions they
//! call for.
//!
//! | outcome              | status             |
//! |----------------------|--------------------|
//! | exit 0, HTTP 2xx     | success            |
//! | exit 102 / 112       | offline            |
//! | exit 103             | config error       |
//! | exit 104, HTTP 401   | invalid credential |
//! | anything else        | unknown            |

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};

pub const API_KEY_REPROMPT_HOURS: i64 = 24;

/// Raw result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOutcome {
    Exit(i32),
    Http(u16),
    /// The request never reached the service (connect failure).
    Unreachable(String),
    /// Spawn failure, signal, or anything without a status code.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    Success,
    Offline,
    ConfigError,
    InvalidCredential,
    Unknown(String),
}

pub fn classify(outcome: &TransportOutcome) -> DeliveryStatus {
    match outcome {
        TransportOutcome::Exit(0) => DeliveryStatus::Success,
        TransportOutcome::Exit(102 | 112) => DeliveryStatus::Offline,
        TransportOutcome::Exit(103) => DeliveryStatus::ConfigError,
        TransportOutcome::Exit(104) => DeliveryStatus::InvalidCredential,
        TransportOutcome::Exit(code) => DeliveryStatus::Unknown(code.to_string()),
        TransportOutcome::Http(200..=202) => DeliveryStatus::Success,
        TransportOutcome::Http(401) => DeliveryStatus::InvalidCredential,
        TransportOutcome::Http(code) => DeliveryStatus::Unknown(code.to_string()),
        TransportOutcome::Unreachable(reason) | TransportOutcome::Failed(reason) => {
            DeliveryStatus::Unknown(reason.clone())
        }
    }
}

/// Allows one credential re-prompt per window.
#[derive(Debug)]
pub struct PromptThrottle {
    window: Duration,
    last_prompt: Option<DateTime<Utc>>,
}

impl Default for PromptThrottle {
    fn default() -> Self {
        Self::new(Duration::hours(API_KEY_REPROMPT_HOURS))
    }
}

impl PromptThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_prompt: None,
        }
    }

    /// Returns true (and records the prompt) when a prompt is allowed now.
    pub fn try_prompt(&mut self, now: DateTime<Utc>) -> bool {
        let allowed = match self.last_prompt {
            Some(at) => at < now - self.window,
            None => true,
        };
        if allowed {
            self.last_prompt = Some(now);
        }
        allowed
    }
}

/// Status-line change requested by a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Clear any error shown.
    Reset,
    Offline,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub status: DeliveryStatus,
    pub update: StatusUpdate,
    pub prompt_api_key: bool,
    pub refresh_today: bool,
}

#[derive(Debug)]
pub struct DeliveryInterpreter {
    throttle: PromptThrottle,
    log_pointer: PathBuf,
}

impl DeliveryInterpreter {
    pub fn new(log_pointer: impl Into<PathBuf>) -> Self {
        Self {
            throttle: PromptThrottle::default(),
            log_pointer: log_pointer.into(),
        }
    }

    pub fn react(&mut self, outcome: &TransportOutcome, now: DateTime<Utc>) -> Reaction {
        let status = classify(outcome);
        let (update, prompt_api_key, refresh_today) = match &status {
            DeliveryStatus::Success => (StatusUpdate::Reset, false, true),
            DeliveryStatus::Offline => {
                tracing::warn!(
                    outcome = ?outcome,
                    log = %self.log_pointer.display(),
                    "Working offline"
                );
                (StatusUpdate::Offline, false, false)
            }
            DeliveryStatus::ConfigError => {
                let message = format!(
                    "Config parsing error (103); Check your {} file for more details",
                    self.log_pointer.display()
                );
                tracing::error!("{}", message);
                (StatusUpdate::Error(message), false, false)
            }
            DeliveryStatus::InvalidCredential => {
                let message = match outcome {
                    TransportOutcome::Http(code) => {
                        format!("Invalid Api Key ({code}); Make sure your Api Key is correct!")
                    }
                    _ => "Invalid Api Key (104); Make sure your Api Key is correct!".to_string(),
                };
                tracing::error!("{}", message);
                let prompt = self.throttle.try_prompt(now);
                (StatusUpdate::Error(message), prompt, false)
            }
            DeliveryStatus::Unknown(detail) => {
                let message = format!(
                    "Unknown Error ({detail}); Check your {} file for more details",
                    self.log_pointer.display()
                );
                tracing::error!("{}", message);
                (StatusUpdate::Error(message), false, false)
            }
        };

        Reaction {
            status,
            update,
            prompt_api_key,
            refresh_today,
        }
    }
}
