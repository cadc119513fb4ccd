// SPDX-License-Identifier: Apache-2.0
// Copyright 2024-2026 Qbitel Inc.

//! Logging for the NWK stack
//!
//! Each engine owns a ring of log entries. Entries are stamped with the
//! engine clock and tagged with the component that wrote them ("nwk.form",
//! "nwk.route", ...), so a debug link can dump the last few state-machine
//! transitions after a failed join or a dropped frame.
//!
//! Network keys and decrypted payloads must never be logged.

use core::fmt::{self, Write};
use heapless::String;

/// Maximum log message length
pub const MAX_LOG_MESSAGE_LEN: usize = 96;

/// Log buffer size (number of entries)
pub const LOG_BUFFER_SIZE: usize = 48;

/// Log level; lower is more severe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogLevel {
    /// Something was dropped or refused
    Warn = 0,
    /// State changes
    Info = 1,
    /// Per-frame detail
    Debug = 2,
}

/// One recorded message
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log level
    pub level: LogLevel,
    /// Engine clock in milliseconds
    pub timestamp: u32,
    /// Component tag
    pub module: &'static str,
    /// Message, truncated to `MAX_LOG_MESSAGE_LEN`
    pub message: String<MAX_LOG_MESSAGE_LEN>,
}

/// Ring of the most recent log entries
pub struct LogBuffer {
    entries: [Option<LogEntry>; LOG_BUFFER_SIZE],
    next: usize,
    count: usize,
    min_level: LogLevel,
}

impl LogBuffer {
    /// Empty buffer recording `Info` and above
    #[must_use]
    pub const fn new() -> Self {
        const NONE: Option<LogEntry> = None;
        Self {
            entries: [NONE; LOG_BUFFER_SIZE],
            next: 0,
            count: 0,
            min_level: LogLevel::Info,
        }
    }

    /// Record `level` and everything more severe
    pub fn set_min_level(&mut self, level: LogLevel) {
        self.min_level = level;
    }

    /// Format and record a message, overwriting the oldest entry when full
    pub fn log(&mut self, level: LogLevel, timestamp: u32, module: &'static str, args: fmt::Arguments<'_>) {
        if (level as u8) > (self.min_level as u8) {
            return;
        }
        let mut message = String::<MAX_LOG_MESSAGE_LEN>::new();
        if Truncating(&mut message).write_fmt(args).is_err() {
            return;
        }
        self.entries[self.next] = Some(LogEntry {
            level,
            timestamp,
            module,
            message,
        });
        self.next = (self.next + 1) % LOG_BUFFER_SIZE;
        self.count = (self.count + 1).min(LOG_BUFFER_SIZE);
    }

    /// Number of entries held
    #[must_use]
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Nothing recorded yet
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether any entry from `module` contains `needle`
    #[must_use]
    pub fn contains(&self, module: &str, needle: &str) -> bool {
        self.iter()
            .any(|e| e.module == module && e.message.as_str().contains(needle))
    }

    /// Entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        let start = if self.count < LOG_BUFFER_SIZE { 0 } else { self.next };
        (0..self.count).filter_map(move |i| self.entries[(start + i) % LOG_BUFFER_SIZE].as_ref())
    }
}

/// Writer that keeps what fits and silently drops the rest
struct Truncating<'a>(&'a mut String<MAX_LOG_MESSAGE_LEN>);

impl Write for Truncating<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for ch in s.chars() {
            if self.0.push(ch).is_err() {
                break;
            }
        }
        Ok(())
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($buffer:expr, $ts:expr, $module:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Warn, $ts, $module, format_args!($($arg)*))
    };
}

/// Log an informational message
#[macro_export]
macro_rules! log_info {
    ($buffer:expr, $ts:expr, $module:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Info, $ts, $module, format_args!($($arg)*))
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($buffer:expr, $ts:expr, $module:expr, $($arg:tt)*) => {
        $buffer.log($crate::log::LogLevel::Debug, $ts, $module, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_filter() {
        let mut buf = LogBuffer::new();
        buf.set_min_level(LogLevel::Warn);
        crate::log_info!(buf, 10, "nwk.test", "dropped {}", 1);
        crate::log_warn!(buf, 11, "nwk.test", "kept {}", 2);
        assert_eq!(buf.len(), 1);
        assert!(buf.contains("nwk.test", "kept 2"));
        assert!(!buf.contains("nwk.test", "dropped"));
    }

    #[test]
    fn test_debug_hidden_by_default() {
        let mut buf = LogBuffer::new();
        crate::log_debug!(buf, 1, "nwk.test", "frame {}", 7);
        assert!(buf.is_empty());
        buf.set_min_level(LogLevel::Debug);
        crate::log_debug!(buf, 2, "nwk.test", "frame {}", 8);
        assert!(buf.contains("nwk.test", "frame 8"));
    }

    #[test]
    fn test_wraps_oldest_first() {
        let mut buf = LogBuffer::new();
        for i in 0..(LOG_BUFFER_SIZE as u32 + 3) {
            crate::log_warn!(buf, i, "nwk.test", "entry {}", i);
        }
        assert_eq!(buf.len(), LOG_BUFFER_SIZE);
        let mut stamps = buf.iter().map(|e| e.timestamp);
        assert_eq!(stamps.next(), Some(3));
        assert_eq!(stamps.next(), Some(4));
        assert_eq!(buf.iter().count(), LOG_BUFFER_SIZE);
    }

    #[test]
    fn test_long_message_truncated() {
        let mut buf = LogBuffer::new();
        let long = [b'x'; MAX_LOG_MESSAGE_LEN + 30];
        let text = core::str::from_utf8(&long).unwrap();
        crate::log_info!(buf, 0, "nwk.test", "{}", text);
        let entry = buf.iter().next().unwrap();
        assert_eq!(entry.message.len(), MAX_LOG_MESSAGE_LEN);
    }
}
