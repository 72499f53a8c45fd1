//! Game Event Log
//!
//! Bounded, newest-first feed of what happened in the game. Backed by a
//! fixed-size ring buffer; the oldest entry is overwritten when full.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use tokio::sync::Mutex;

/// Kind of log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogKind {
    /// Player joined.
    Join,
    /// Player left.
    Leave,
    /// Player moved (or stayed after an overshoot).
    Move,
    /// Player took a portal.
    Teleported,
    /// Player reached the finish.
    Completed,
}

impl LogKind {
    /// Wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            LogKind::Join => "JOIN",
            LogKind::Leave => "LEAVE",
            LogKind::Move => "MOVE",
            LogKind::Teleported => "TELEPORTED",
            LogKind::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One log entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamLog {
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    /// Human-readable text.
    pub message: String,
    /// Entry kind.
    pub kind: LogKind,
}

impl StreamLog {
    /// Create an entry stamped now.
    pub fn now(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            kind,
        }
    }
}

// =============================================================================
// RING BUFFER
// =============================================================================

/// Fixed-capacity ring buffer.
///
/// `head` is the oldest slot, `tail` the next write. `full` tells the
/// empty and full states apart when the cursors meet.
#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
    data: Vec<Option<T>>,
    head: usize,
    tail: usize,
    full: bool,
}

impl<T: Clone> RingBuffer<T> {
    /// Create an empty buffer. A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![None; capacity.max(1)],
            head: 0,
            tail: 0,
            full: false,
        }
    }

    /// Insert at the tail, overwriting the oldest entry when full.
    pub fn push(&mut self, item: T) {
        let capacity = self.data.len();
        self.data[self.tail] = Some(item);
        self.tail = (self.tail + 1) % capacity;
        if self.full {
            self.head = (self.head + 1) % capacity;
        } else if self.tail == self.head {
            self.full = true;
        }
    }

    /// Entries newest first.
    pub fn latest(&self) -> Vec<T> {
        let capacity = self.data.len();
        (1..=self.len())
            .filter_map(|back| self.data[(self.tail + capacity - back) % capacity].clone())
            .collect()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        if self.full {
            self.data.len()
        } else {
            (self.tail + self.data.len() - self.head) % self.data.len()
        }
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        !self.full && self.head == self.tail
    }

    /// Maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }
}

// =============================================================================
// EVENT LOG
// =============================================================================

/// Ring buffer of [`StreamLog`] behind its own lock.
#[derive(Debug)]
pub struct EventLog {
    logs: Mutex<RingBuffer<StreamLog>>,
}

impl EventLog {
    /// Create a log holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            logs: Mutex::new(RingBuffer::new(capacity)),
        }
    }

    /// Append an entry.
    pub async fn push(&self, log: StreamLog) {
        self.logs.lock().await.push(log);
    }

    /// Entries newest first.
    pub async fn latest(&self) -> Vec<StreamLog> {
        self.logs.lock().await.latest()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.logs.lock().await.len()
    }

    /// Check if empty.
    pub async fn is_empty(&self) -> bool {
        self.logs.lock().await.is_empty()
    }

    /// Maximum number of entries.
    pub async fn capacity(&self) -> usize {
        self.logs.lock().await.capacity()
    }
}
