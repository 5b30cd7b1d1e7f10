//! Event output.
//!
//! The consumer reads stdout line by line and only parses lines starting
//! with [`EVENT_LINE_PREFIX`]; everything else on stdout is ignored by it.

use std::io::{self, Write};

use parking_lot::Mutex;

use crate::events::LiveEvent;

/// Literal tag in front of every event line.
pub const EVENT_LINE_PREFIX: &str = "DY_DATA::";

/// Destination for normalised events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &LiveEvent);
}

/// Formats an event as a single output line, without the trailing newline.
pub fn format_event_line(event: &LiveEvent) -> serde_json::Result<String> {
    Ok(format!("{}{}", EVENT_LINE_PREFIX, serde_json::to_string(event)?))
}

/// Writes `DY_DATA::<json>` lines to a writer, flushing after each one.
pub struct LineSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> LineSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Returns the wrapped writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut writer = self.writer.lock();
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()
    }
}

impl LineSink<io::Stdout> {
    /// A sink writing to the process's standard output.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> std::fmt::Debug for LineSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineSink").finish_non_exhaustive()
    }
}

impl<W: Write + Send> EventSink for LineSink<W> {
    fn emit(&self, event: &LiveEvent) {
        let line = match format_event_line(event) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("Failed to serialize {} event: {}", event.kind(), e);
                return;
            }
        };

        if let Err(e) = self.write_line(&line) {
            tracing::warn!("Failed to write {} event: {}", event.kind(), e);
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &LiveEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ChatEvent, DiscoveryEvent};

    #[test]
    fn line_format() {
        let line = format_event_line(&DiscoveryEvent::new("99").into()).unwrap();
        assert!(line.starts_with("DY_DATA::{"));
        assert!(!line.contains('\n'));
        // Non-ASCII is written as-is, not \u-escaped.
        assert!(line.contains("获取中..."));
    }

    #[test]
    fn line_sink_writes_one_line_per_event() {
        let sink = LineSink::new(Vec::new());
        sink.emit(&DiscoveryEvent::new("1").into());
        sink.emit(
            &ChatEvent {
                room_id: "1".into(),
                user: "U".into(),
                content: "multi\nline".into(),
                timestamp: String::new(),
            }
            .into(),
        );

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.starts_with(EVENT_LINE_PREFIX)));

        let chat: serde_json::Value =
            serde_json::from_str(lines[1].strip_prefix(EVENT_LINE_PREFIX).unwrap()).unwrap();
        assert_eq!(chat["type"], "chat");
        assert_eq!(chat["content"], "multi\nline");
    }

    #[test]
    fn write_errors_are_swallowed() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let sink = LineSink::new(Broken);
        sink.emit(&DiscoveryEvent::new("1").into());
    }
}
