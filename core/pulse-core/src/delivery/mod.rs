//! Buffering heartbeats and reacting to delivery results.

pub mod buffer;
pub mod interpret;

pub use buffer::{FlushBatch, HeartbeatBuffer};
pub use interpret::{
    classify, DeliveryInterpreter, DeliveryStatus, PromptThrottle, Reaction, StatusUpdate,
    TransportOutcome,
};
