//! Structured kernel log service
//!
//! A fixed-size, heap-free circular buffer of structured log entries. Each
//! entry carries a monotonic sequence number, severity level, subsystem
//! tag, and a fixed-length message, so the service works before a real
//! timer or heap exists. Backs the [`crate::logger::Logger`] `log::Log`
//! front-end; can also be drained directly for diagnostics.

use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

const LOG_BUFFER_CAPACITY: usize = 256;
const LOG_MESSAGE_MAX_LEN: usize = 128;
const LOG_SUBSYSTEM_MAX_LEN: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

/// A single structured log entry, stored inline so the buffer never
/// allocates.
#[derive(Clone, Copy)]
pub struct LogEntry {
    pub sequence: u64,
    pub level: LogLevel,
    subsystem_buf: [u8; LOG_SUBSYSTEM_MAX_LEN],
    subsystem_len: u8,
    message_buf: [u8; LOG_MESSAGE_MAX_LEN],
    message_len: u8,
}

impl LogEntry {
    const fn empty() -> Self {
        Self {
            sequence: 0,
            level: LogLevel::Trace,
            subsystem_buf: [0u8; LOG_SUBSYSTEM_MAX_LEN],
            subsystem_len: 0,
            message_buf: [0u8; LOG_MESSAGE_MAX_LEN],
            message_len: 0,
        }
    }

    pub fn subsystem(&self) -> &str {
        core::str::from_utf8(&self.subsystem_buf[..self.subsystem_len as usize]).unwrap_or("")
    }

    pub fn message(&self) -> &str {
        core::str::from_utf8(&self.message_buf[..self.message_len as usize]).unwrap_or("")
    }
}

struct LogBuffer {
    entries: [LogEntry; LOG_BUFFER_CAPACITY],
    head: usize,
    count: usize,
}

impl LogBuffer {
    const fn new() -> Self {
        Self {
            entries: [LogEntry::empty(); LOG_BUFFER_CAPACITY],
            head: 0,
            count: 0,
        }
    }

    fn push(&mut self, entry: LogEntry) {
        self.entries[self.head] = entry;
        self.head = (self.head + 1) % LOG_BUFFER_CAPACITY;
        if self.count < LOG_BUFFER_CAPACITY {
            self.count += 1;
        }
    }

    fn tail(&self) -> usize {
        if self.count < LOG_BUFFER_CAPACITY {
            0
        } else {
            self.head
        }
    }

    fn get(&self, i: usize) -> Option<&LogEntry> {
        if i >= self.count {
            return None;
        }
        Some(&self.entries[(self.tail() + i) % LOG_BUFFER_CAPACITY])
    }
}

static SEQUENCE: AtomicU64 = AtomicU64::new(0);
static LOG_BUFFER: Mutex<LogBuffer> = Mutex::new(LogBuffer::new());

/// Record a structured log entry. Truncates subsystem/message to their
/// fixed capacities rather than failing.
pub fn klog(level: LogLevel, subsystem: &str, message: &str) {
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);

    let mut subsystem_buf = [0u8; LOG_SUBSYSTEM_MAX_LEN];
    let sub_len = subsystem.len().min(LOG_SUBSYSTEM_MAX_LEN);
    subsystem_buf[..sub_len].copy_from_slice(&subsystem.as_bytes()[..sub_len]);

    let mut message_buf = [0u8; LOG_MESSAGE_MAX_LEN];
    let msg_len = message.len().min(LOG_MESSAGE_MAX_LEN);
    message_buf[..msg_len].copy_from_slice(&message.as_bytes()[..msg_len]);

    LOG_BUFFER.lock().push(LogEntry {
        sequence,
        level,
        subsystem_buf,
        subsystem_len: sub_len as u8,
        message_buf,
        message_len: msg_len as u8,
    });
}

/// A fixed-capacity [`core::fmt::Write`] sink used to render a
/// [`core::fmt::Arguments`] into a stack buffer without touching the heap,
/// so [`klog_fmt`] can be called from contexts where the allocator itself
/// might be the thing under test.
struct FixedBuf<const N: usize> {
    bytes: [u8; N],
    len: usize,
}

impl<const N: usize> FixedBuf<N> {
    const fn new() -> Self {
        Self {
            bytes: [0u8; N],
            len: 0,
        }
    }

    fn as_str(&self) -> &str {
        core::str::from_utf8(&self.bytes[..self.len]).unwrap_or("")
    }
}

impl<const N: usize> core::fmt::Write for FixedBuf<N> {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        let remaining = N - self.len;
        let take = s.len().min(remaining);
        self.bytes[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

/// Record a structured log entry built from a [`core::fmt::Arguments`],
/// truncating the rendered message to [`LOG_MESSAGE_MAX_LEN`] bytes.
pub fn klog_fmt(level: LogLevel, subsystem: &str, args: core::fmt::Arguments) {
    use core::fmt::Write;
    let mut buf = FixedBuf::<LOG_MESSAGE_MAX_LEN>::new();
    let _ = buf.write_fmt(args);
    klog(level, subsystem, buf.as_str());
}

/// Number of entries currently buffered.
pub fn log_count() -> usize {
    LOG_BUFFER.lock().count
}

/// Visit every buffered entry, oldest first.
pub fn log_drain<F: FnMut(&LogEntry)>(mut f: F) -> usize {
    let buffer = LOG_BUFFER.lock();
    for i in 0..buffer.count {
        if let Some(entry) = buffer.get(i) {
            f(entry);
        }
    }
    buffer.count
}

pub fn log_clear() {
    let mut buffer = LOG_BUFFER.lock();
    buffer.head = 0;
    buffer.count = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn klog_then_drain_preserves_order() {
        log_clear();
        klog(LogLevel::Info, "vm", "first");
        klog(LogLevel::Warn, "vm", "second");
        let mut seen = alloc::vec::Vec::new();
        log_drain(|entry| seen.push(alloc::string::String::from(entry.message())));
        assert_eq!(seen, alloc::vec!["first", "second"]);
    }

    #[test]
    fn buffer_wraps_after_capacity() {
        log_clear();
        for i in 0..(LOG_BUFFER_CAPACITY + 10) {
            klog(LogLevel::Debug, "vm", if i % 2 == 0 { "even" } else { "odd" });
        }
        assert_eq!(log_count(), LOG_BUFFER_CAPACITY);
    }
}
