//! Bounded operation log.
//!
//! A ring buffer of timestamped trace lines collected during one transfer
//! run.  The batch engine appends while the host may read a snapshot at any
//! time, so the buffer sits behind a read/write lock and every handle cloned
//! from the same log shares it.  When the buffer is full the oldest entry is
//! evicted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

pub const DEFAULT_LOG_CAPACITY: usize = 5000;

// ─── Types ──────────────────────────────────────────────────────────────────

/// One trace line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl LogEntry {
    /// `"2024-05-01T12:00:00.000Z message"`
    pub fn format_line(&self) -> String {
        format!(
            "{} {}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.message
        )
    }
}

#[derive(Debug, Clone)]
pub struct OperationLog {
    entries: Arc<RwLock<VecDeque<LogEntry>>>,
    capacity: usize,
    enabled: bool,
}

impl Default for OperationLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl OperationLog {
    /// Create an enabled log holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.min(256)))),
            capacity,
            enabled: true,
        }
    }

    /// A log that silently drops everything pushed into it.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::new(1)
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Append a message, evicting the oldest entry when full.
    pub fn push(&self, message: impl Into<String>) {
        if !self.enabled {
            return;
        }
        let entry = LogEntry {
            timestamp: Utc::now(),
            message: message.into(),
        };
        if let Ok(mut entries) = self.entries.write() {
            while entries.len() >= self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current contents, oldest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries
            .read()
            .map(|e| e.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Current contents rendered with [`LogEntry::format_line`].
    pub fn lines(&self) -> Vec<String> {
        self.snapshot().iter().map(LogEntry::format_line).collect()
    }
}
