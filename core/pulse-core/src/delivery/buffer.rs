//! In-memory FIFO of heartbeats awaiting delivery.
//!
//! Nothing here touches disk: heartbeats that were never flushed are lost if
//! the process dies.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

use crate::types::Heartbeat;

pub const SEND_BUFFER_SECS: i64 = 30;

/// One delivery: the oldest heartbeat plus everything queued behind it.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushBatch {
    pub primary: Heartbeat,
    pub extras: Vec<Heartbeat>,
}

impl FlushBatch {
    /// Primary first, then extras in queue order.
    pub fn into_vec(self) -> Vec<Heartbeat> {
        let mut all = Vec::with_capacity(1 + self.extras.len());
        all.push(self.primary);
        all.extend(self.extras);
        all
    }
}

#[derive(Debug)]
pub struct HeartbeatBuffer {
    queue: VecDeque<Heartbeat>,
    last_flush: Option<DateTime<Utc>>,
    window: Duration,
}

impl Default for HeartbeatBuffer {
    fn default() -> Self {
        Self::new(Duration::seconds(SEND_BUFFER_SECS))
    }
}

impl HeartbeatBuffer {
    pub fn new(window: Duration) -> Self {
        Self {
            queue: VecDeque::new(),
            last_flush: None,
            window,
        }
    }

    pub fn push(&mut self, heartbeat: Heartbeat) {
        self.queue.push_back(heartbeat);
    }

    /// True once the send window has elapsed since the last flush attempt,
    /// or when nothing has been flushed yet.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.last_flush {
            Some(at) => at + self.window < now,
            None => true,
        }
    }

    /// Drains the queue into a batch and stamps the flush time. The stamp is
    /// taken at flush start, before the transport has answered.
    pub fn take_batch(&mut self, now: DateTime<Utc>) -> Option<FlushBatch> {
        let primary = self.queue.pop_front()?;
        let extras = self.queue.drain(..).collect();
        self.last_flush = Some(now);
        Some(FlushBatch { primary, extras })
    }

    /// Puts heartbeats the transport did not accept back at the head of the
    /// queue, keeping their relative order.
    pub fn requeue_front(&mut self, returned: Vec<Heartbeat>) {
        for heartbeat in returned.into_iter().rev() {
            self.queue.push_front(heartbeat);
        }
    }

    pub fn last_flush(&self) -> Option<DateTime<Utc>> {
        self.last_flush
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
