//! Line framing for the daemon's push-event stream.
//!
//! The stream follows text/event-stream conventions:
//! - `:` is a keep-alive
//! - `event:receive` arms the next `data:` line
//! - `data:<json>` carries one event payload
//!
//! Everything else is ignored.

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

/// One line of the push-event protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamLine<'a> {
    /// Connection keep-alive (`:`).
    KeepAlive,
    /// `event:<name>` marker.
    Event(&'a str),
    /// `data:` payload with the prefix (and one optional space) stripped.
    Data(&'a str),
    /// Empty line ending an event block.
    Blank,
    /// Anything else (`id:`, `retry:`, comments with text).
    Other,
}

impl<'a> StreamLine<'a> {
    /// Classify a single line (without its terminator).
    pub fn classify(line: &'a str) -> Self {
        if line.is_empty() {
            return Self::Blank;
        }
        if line == ":" {
            return Self::KeepAlive;
        }
        if let Some(name) = strip_field(line, "event:") {
            return Self::Event(name.trim());
        }
        if let Some(data) = strip_field(line, "data:") {
            return Self::Data(data.strip_prefix(' ').unwrap_or(data));
        }
        Self::Other
    }
}

fn strip_field<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let head = line.get(..field.len())?;
    head.eq_ignore_ascii_case(field)
        .then(|| &line[field.len()..])
}

/// Tracks whether the next `data:` line belongs to a `receive` event.
#[derive(Clone, Debug, Default)]
pub struct EventFramer {
    armed: bool,
}

impl EventFramer {
    /// Name of the only event whose payload is parsed.
    pub const RECEIVE: &'static str = "receive";

    /// Create a disarmed framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line; returns the payload when it is an armed `data:` line.
    ///
    /// The framer disarms after yielding a payload, on a blank line, and on
    /// any other event name.
    pub fn feed<'a>(&mut self, line: &'a str) -> Option<&'a str> {
        match StreamLine::classify(line) {
            StreamLine::Event(name) => {
                self.armed = name.eq_ignore_ascii_case(Self::RECEIVE);
                None
            }
            StreamLine::Data(payload) if self.armed => {
                self.armed = false;
                Some(payload)
            }
            StreamLine::Blank => {
                self.armed = false;
                None
            }
            StreamLine::KeepAlive | StreamLine::Data(_) | StreamLine::Other => None,
        }
    }

    /// Whether the next `data:` line will be yielded.
    pub fn is_armed(&self) -> bool {
        self.armed
    }
}

/// Split a chunked byte stream into lines.
///
/// Yields each line without its `\n` / `\r\n` terminator. Lines that are not
/// valid UTF-8 are skipped. A read error is yielded once and ends the
/// stream; a trailing partial line at end of stream is yielded last.
pub fn split_lines<S, E>(byte_stream: S) -> impl Stream<Item = Result<String, E>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: Send + 'static,
{
    futures::stream::unfold(
        (byte_stream, BytesMut::with_capacity(8192), false),
        |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line_bytes = buffer.split_to(newline_pos + 1);
                    line_bytes.truncate(line_bytes.len() - 1);
                    if line_bytes.last() == Some(&b'\r') {
                        line_bytes.truncate(line_bytes.len() - 1);
                    }

                    let Ok(line) = std::str::from_utf8(&line_bytes) else {
                        tracing::debug!(len = line_bytes.len(), "skipping non-UTF-8 stream line");
                        continue;
                    };
                    return Some((Ok(line.to_string()), (stream, buffer, false)));
                }

                match stream.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => return Some((Err(e), (stream, buffer, true))),
                    None => {
                        if buffer.is_empty() {
                            return None;
                        }
                        let rest = buffer.split();
                        return match std::str::from_utf8(&rest) {
                            Ok(line) => {
                                let line = line.trim_end_matches('\r').to_string();
                                Some((Ok(line), (stream, buffer, true)))
                            }
                            Err(_) => None,
                        };
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, String>> + Send + Unpin {
        futures::stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn classify_lines() {
        assert_eq!(StreamLine::classify(":"), StreamLine::KeepAlive);
        assert_eq!(StreamLine::classify("event:receive"), StreamLine::Event("receive"));
        assert_eq!(StreamLine::classify("EVENT: receive"), StreamLine::Event("receive"));
        assert_eq!(StreamLine::classify("data:{\"a\":1}"), StreamLine::Data("{\"a\":1}"));
        assert_eq!(StreamLine::classify("data: {}"), StreamLine::Data("{}"));
        assert_eq!(StreamLine::classify(""), StreamLine::Blank);
        assert_eq!(StreamLine::classify("id:42"), StreamLine::Other);
        assert_eq!(StreamLine::classify(": comment"), StreamLine::Other);
    }

    #[test]
    fn framer_only_yields_armed_data() {
        let mut framer = EventFramer::new();
        assert_eq!(framer.feed("data:{\"early\":true}"), None);
        assert_eq!(framer.feed(":"), None);
        assert_eq!(framer.feed("event:receive"), None);
        assert!(framer.is_armed());
        assert_eq!(framer.feed("data:{\"x\":1}"), Some("{\"x\":1}"));
        assert!(!framer.is_armed());
        assert_eq!(framer.feed("data:{\"x\":2}"), None);
    }

    #[test]
    fn framer_disarms_on_blank_and_other_events() {
        let mut framer = EventFramer::new();
        let _ = framer.feed("event:receive");
        let _ = framer.feed("");
        assert!(!framer.is_armed());

        let _ = framer.feed("event:receive");
        let _ = framer.feed("event:status");
        assert_eq!(framer.feed("data:{}"), None);
    }

    #[test]
    fn keep_alive_does_not_disarm() {
        let mut framer = EventFramer::new();
        let _ = framer.feed("event:receive");
        let _ = framer.feed(":");
        assert_eq!(framer.feed("data:{}"), Some("{}"));
    }

    #[tokio::test]
    async fn splits_across_chunks() {
        let lines: Vec<_> = split_lines(chunks(&["event:rec", "eive\r\ndata:{\"a\"", ":1}\n\n"]))
            .collect()
            .await;
        let lines: Vec<String> = lines.into_iter().map(Result::unwrap).collect();
        assert_eq!(lines, vec!["event:receive", "data:{\"a\":1}", ""]);
    }

    #[tokio::test]
    async fn trailing_partial_line_is_flushed() {
        let lines: Vec<_> = split_lines(chunks(&[":\n", "data:{}"])).collect().await;
        let lines: Vec<String> = lines.into_iter().map(Result::unwrap).collect();
        assert_eq!(lines, vec![":", "data:{}"]);
    }

    #[tokio::test]
    async fn read_error_ends_stream() {
        let source = futures::stream::iter(vec![
            Ok(Bytes::from_static(b":\n")),
            Err("connection reset".to_string()),
            Ok(Bytes::from_static(b"data:{}\n")),
        ]);
        let items: Vec<_> = split_lines(source).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref(), Ok(":"));
        assert_eq!(items[1], Err("connection reset".to_string()));
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_skipped() {
        let source = futures::stream::iter(vec![Ok::<_, String>(Bytes::from_static(
            b"\xff\xfe\n:\n",
        ))]);
        let items: Vec<_> = split_lines(source).collect().await;
        assert_eq!(items, vec![Ok(":".to_string())]);
    }
}
