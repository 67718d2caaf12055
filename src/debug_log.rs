//! Bounded, newest-first event log shown in the debug console
//!
//! Entries are pushed to the attached observer (if any) as they are appended.
//! An observer that attaches late reads the history once via `snapshot()`.

use crate::console::{Liveness, Singleton};
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

pub const DEBUG_LOG_CAPACITY: usize = 500;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Warn,
    Error,
    Trigger,
    Tick,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Info => "info",
            LogKind::Warn => "warn",
            LogKind::Error => "error",
            LogKind::Trigger => "trigger",
            LogKind::Tick => "tick",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DebugLogEntry {
    pub timestamp: Timestamp,
    pub kind: LogKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Push side of a debug console subscription
pub struct DebugObserver {
    tx: UnboundedSender<DebugLogEntry>,
}

impl Liveness for DebugObserver {
    fn is_alive(&mut self) -> bool {
        !self.tx.is_closed()
    }
}

pub struct DebugLog {
    entries: VecDeque<DebugLogEntry>,
    capacity: usize,
    observer: Singleton<DebugObserver>,
}

impl DebugLog {
    pub fn new() -> Self {
        Self::with_capacity(DEBUG_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            observer: Singleton::new(),
        }
    }

    pub fn append(
        &mut self,
        kind: LogKind,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) {
        let entry = DebugLogEntry {
            timestamp: Timestamp::now(),
            kind,
            message: message.into(),
            data,
        };

        if let Some(observer) = self.observer.get_mut()
            && observer.tx.send(entry.clone()).is_err()
        {
            self.observer.clear();
        }

        self.entries.push_front(entry);
        self.entries.truncate(self.capacity);
    }

    /// Current buffer contents, newest first
    pub fn snapshot(&self) -> Vec<DebugLogEntry> {
        self.entries.iter().cloned().collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Attach a new observer, replacing any previous one
    pub fn attach(&mut self) -> UnboundedReceiver<DebugLogEntry> {
        let (tx, rx) = unbounded_channel();
        // Dropping the old sender ends the previous subscriber's stream.
        self.observer.replace(DebugObserver { tx });
        rx
    }

    #[cfg(test)]
    pub fn has_observer(&mut self) -> bool {
        self.observer.get_mut().is_some()
    }
}

impl Default for DebugLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newest_first() {
        let mut log = DebugLog::new();
        log.append(LogKind::Info, "first", None);
        log.append(LogKind::Warn, "second", None);

        let entries = log.snapshot();
        assert_eq!(entries[0].message, "second");
        assert_eq!(entries[1].message, "first");
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut log = DebugLog::new();
        for i in 0..=DEBUG_LOG_CAPACITY {
            log.append(LogKind::Tick, format!("entry {}", i), None);
        }

        let entries = log.snapshot();
        assert_eq!(entries.len(), DEBUG_LOG_CAPACITY);
        assert!(entries.iter().all(|e| e.message != "entry 0"));
        assert_eq!(entries[0].message, format!("entry {}", DEBUG_LOG_CAPACITY));
        assert_eq!(entries[DEBUG_LOG_CAPACITY - 1].message, "entry 1");
    }

    #[test]
    fn test_observer_receives_pushes() {
        let mut log = DebugLog::new();
        log.append(LogKind::Info, "before attach", None);

        let mut rx = log.attach();
        log.append(LogKind::Trigger, "after attach", Some(serde_json::json!({"surfaces": 2})));

        let pushed = rx.try_recv().unwrap();
        assert_eq!(pushed.message, "after attach");
        assert_eq!(pushed.kind, LogKind::Trigger);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_second_observer_replaces_first() {
        let mut log = DebugLog::new();
        let mut first = log.attach();
        let mut second = log.attach();

        log.append(LogKind::Info, "hello", None);

        assert!(first.try_recv().is_err());
        assert_eq!(second.try_recv().unwrap().message, "hello");
    }

    #[test]
    fn test_dropped_observer_is_detached() {
        let mut log = DebugLog::new();
        let rx = log.attach();
        assert!(log.has_observer());

        drop(rx);
        log.append(LogKind::Info, "nobody listening", None);
        assert!(!log.has_observer());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_entry_wire_format() {
        let mut log = DebugLog::new();
        log.append(LogKind::Error, "boom", None);
        let json = serde_json::to_value(&log.snapshot()[0]).unwrap();
        assert_eq!(json["kind"], "error");
        assert_eq!(json["message"], "boom");
        assert!(json.get("data").is_none());
        assert!(json["timestamp"].is_string());
    }
}
