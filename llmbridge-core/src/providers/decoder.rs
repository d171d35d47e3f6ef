//! Stream decoder for chunked HTTP bodies
//!
//! Turns an unbounded sequence of byte chunks, whose boundaries have nothing
//! to do with record boundaries, into complete JSON records:
//!
//! - [`Framing::Ndjson`]: one JSON object per line.
//! - [`Framing::Sse`]: `data:`-framed events separated by blank lines, ending
//!   with the literal `[DONE]` sentinel.
//!
//! The decoder owns a single growable byte buffer. Records are split on the
//! `\n` byte, which never occurs inside a multi-byte UTF-8 sequence, so a
//! character split across two chunks is simply completed by the next chunk.
//! Consumed bytes are released from the front of the buffer as each record is
//! extracted.

use crate::protocol::StreamDelta;
use crate::providers::error::ProviderError;
use crate::providers::DeltaStream;
use bytes::{Buf, Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;
use tracing::{debug, warn};

/// Literal end-of-stream sentinel used by SSE-chunk backends
pub const SSE_DONE: &str = "[DONE]";

/// Record framing of a streaming response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Newline-delimited JSON
    Ndjson,
    /// Server-sent events carrying JSON payloads
    Sse,
}

/// A complete logical record extracted from the body
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    /// A parsed JSON payload
    Json(Value),
    /// The SSE terminator sentinel
    Terminal,
}

/// Stateful line/event reassembler
#[derive(Debug)]
pub struct StreamDecoder {
    framing: Framing,
    buffer: BytesMut,
    /// Offset up to which `buffer` is known to contain no newline
    scanned: usize,
    /// `data:` payloads of the SSE event currently being assembled
    event_data: Vec<String>,
    ready: VecDeque<Record>,
    terminated: bool,
}

impl StreamDecoder {
    /// Create an empty decoder for the given framing
    pub fn new(framing: Framing) -> Self {
        Self {
            framing,
            buffer: BytesMut::with_capacity(4096),
            scanned: 0,
            event_data: Vec::new(),
            ready: VecDeque::new(),
            terminated: false,
        }
    }

    /// Framing this decoder was created with
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Whether the terminal sentinel has been seen
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Bytes held back as an incomplete record
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Append a raw chunk and extract every record it completes
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.terminated {
            return;
        }
        self.buffer.extend_from_slice(chunk);
        self.drain_lines();
    }

    /// Next complete record, if one is ready
    pub fn next_record(&mut self) -> Option<Record> {
        self.ready.pop_front()
    }

    /// Flush the trailing remainder at end of stream
    ///
    /// A remainder that does not parse is incomplete data and is discarded
    /// without a warning.
    pub fn finish(&mut self) {
        if self.terminated {
            return;
        }

        if !self.buffer.is_empty() {
            let rest = self.buffer.split().freeze();
            self.scanned = 0;
            let line = decode_line(&rest);
            self.handle_line(&line, true);
        }

        if self.framing == Framing::Sse && !self.terminated {
            self.dispatch_event(true);
        }
    }

    fn drain_lines(&mut self) {
        while !self.terminated {
            let newline = self.buffer[self.scanned..]
                .iter()
                .position(|&b| b == b'\n')
                .map(|i| self.scanned + i);

            let Some(end) = newline else {
                self.scanned = self.buffer.len();
                return;
            };

            let mut line = self.buffer.split_to(end + 1);
            self.scanned = 0;
            line.truncate(end);
            if line.last() == Some(&b'\r') {
                line.truncate(end - 1);
            }

            let text = decode_line(&line.freeze());
            self.handle_line(&text, false);
        }

        // Nothing after the terminator is ever read.
        if self.terminated {
            self.buffer.clear();
            self.scanned = 0;
        }
    }

    fn handle_line(&mut self, line: &str, at_eof: bool) {
        match self.framing {
            Framing::Ndjson => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    return;
                }
                if let Some(value) = parse_record(trimmed, at_eof) {
                    self.ready.push_back(Record::Json(value));
                }
            }
            Framing::Sse => self.handle_sse_line(line, at_eof),
        }
    }

    fn handle_sse_line(&mut self, line: &str, at_eof: bool) {
        if line.trim().is_empty() {
            self.dispatch_event(at_eof);
            return;
        }

        // Comment / keep-alive
        if line.starts_with(':') {
            return;
        }

        let payload = match line.strip_prefix("data:") {
            Some(data) => data.strip_prefix(' ').unwrap_or(data),
            None => {
                if is_sse_field(line) {
                    return;
                }
                // Unframed line: treat it as a complete record of its own.
                self.dispatch_event(at_eof);
                line
            }
        };

        if payload.trim() == SSE_DONE {
            self.dispatch_event(at_eof);
            self.ready.push_back(Record::Terminal);
            self.terminated = true;
            return;
        }

        if line.starts_with("data:") {
            // A self-contained payload is a record now; only a payload that
            // needs continuation lines waits for the end of its event
            if self.event_data.is_empty() {
                if let Ok(value) = serde_json::from_str::<Value>(payload.trim()) {
                    self.ready.push_back(Record::Json(value));
                    return;
                }
            }
            self.event_data.push(payload.to_string());
        } else if let Some(value) = parse_record(payload.trim(), at_eof) {
            self.ready.push_back(Record::Json(value));
        }
    }

    fn dispatch_event(&mut self, at_eof: bool) {
        if self.event_data.is_empty() {
            return;
        }
        let lines = std::mem::take(&mut self.event_data);
        let joined = lines.join("\n");
        let trimmed = joined.trim();
        if trimmed.is_empty() {
            return;
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => self.ready.push_back(Record::Json(value)),
            Err(e) if lines.len() > 1 => {
                // Some servers omit the blank line between events; fall back
                // to one record per data line.
                debug!("Multi-line SSE event did not parse as one record: {}", e);
                for line in &lines {
                    if let Some(value) = parse_record(line.trim(), at_eof) {
                        self.ready.push_back(Record::Json(value));
                    }
                }
            }
            Err(e) => {
                if at_eof {
                    debug!("Discarding incomplete trailing event: {}", e);
                } else {
                    warn!("Skipping malformed stream record: {}", e);
                }
            }
        }
    }
}

fn is_sse_field(line: &str) -> bool {
    ["event:", "id:", "retry:"]
        .iter()
        .any(|field| line.starts_with(field))
        || matches!(line, "event" | "id" | "retry" | "data")
}

fn decode_line(bytes: &Bytes) -> String {
    match std::str::from_utf8(bytes.chunk()) {
        Ok(text) => text.to_string(),
        Err(e) => {
            warn!("Stream record is not valid UTF-8: {}", e);
            String::from_utf8_lossy(bytes.chunk()).into_owned()
        }
    }
}

fn parse_record(text: &str, at_eof: bool) -> Option<Value> {
    if text.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(value) => Some(value),
        Err(e) => {
            if at_eof {
                debug!("Discarding incomplete trailing record: {}", e);
            } else {
                warn!("Skipping malformed stream record: {}", e);
            }
            None
        }
    }
}

/// What a backend makes of one decoded JSON record
#[derive(Debug, Clone, PartialEq)]
pub enum RecordAction {
    /// Emit a text fragment and keep reading
    Emit(String),
    /// The backend signalled completion; emit any trailing text, then stop
    Finish(Option<String>),
    /// The backend reported an in-band error
    Fail(String),
    /// Nothing to emit for this record
    Skip,
}

struct DecodeState<S, F> {
    bytes: Option<Pin<Box<S>>>,
    decoder: StreamDecoder,
    interpret: F,
}

/// Build a lazy delta sequence over a raw byte stream
///
/// The sequence is single-pass and finite. It ends when the backend signals
/// completion, when the SSE sentinel is seen, or when the body closes. The
/// byte stream, and with it the HTTP connection, is dropped as soon as the
/// sequence ends or the caller drops the returned stream.
pub fn decode_deltas<S, E, F>(bytes: S, framing: Framing, interpret: F) -> DeltaStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
    F: FnMut(&Value) -> RecordAction + Send + 'static,
{
    let state = DecodeState {
        bytes: Some(Box::pin(bytes)),
        decoder: StreamDecoder::new(framing),
        interpret,
    };

    Box::pin(stream::unfold(state, move |mut state| async move {
        loop {
            if let Some(record) = state.decoder.next_record() {
                let value = match record {
                    Record::Terminal => {
                        debug!("Stream terminator received");
                        return None;
                    }
                    Record::Json(value) => value,
                };

                match (state.interpret)(&value) {
                    RecordAction::Emit(text) => {
                        if text.is_empty() {
                            continue;
                        }
                        return Some((Ok(StreamDelta::new(text)), state));
                    }
                    RecordAction::Finish(text) => {
                        debug!("Backend signalled end of stream");
                        state.bytes = None;
                        state.decoder = StreamDecoder::new(framing);
                        match text {
                            Some(text) if !text.is_empty() => {
                                return Some((Ok(StreamDelta::new(text)), state));
                            }
                            _ => return None,
                        }
                    }
                    RecordAction::Fail(message) => {
                        warn!("Backend reported a stream error: {}", message);
                        state.bytes = None;
                        state.decoder = StreamDecoder::new(framing);
                        return Some((Err(ProviderError::BackendProtocol(message)), state));
                    }
                    RecordAction::Skip => continue,
                }
            }

            let bytes = state.bytes.as_mut()?;
            match bytes.next().await {
                Some(Ok(chunk)) => state.decoder.feed(&chunk),
                Some(Err(e)) => {
                    state.bytes = None;
                    state.decoder = StreamDecoder::new(framing);
                    return Some((
                        Err(ProviderError::BackendUnreachable(format!(
                            "stream read error: {}",
                            e
                        ))),
                        state,
                    ));
                }
                None => {
                    state.bytes = None;
                    state.decoder.finish();
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderResult;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn decode(framing: Framing, chunks: &[&[u8]]) -> Vec<Record> {
        let mut decoder = StreamDecoder::new(framing);
        let mut out = Vec::new();
        for chunk in chunks {
            decoder.feed(chunk);
            while let Some(record) = decoder.next_record() {
                out.push(record);
            }
        }
        decoder.finish();
        while let Some(record) = decoder.next_record() {
            out.push(record);
        }
        out
    }

    #[test]
    fn test_ndjson_lines_across_chunks() {
        let records = decode(
            Framing::Ndjson,
            &[b"{\"a\":", b"1}\n{\"a\"", b":2}\n"],
        );
        assert_eq!(
            records,
            vec![Record::Json(json!({"a": 1})), Record::Json(json!({"a": 2}))]
        );
    }

    #[test]
    fn test_ndjson_skips_blank_and_malformed_lines() {
        let records = decode(Framing::Ndjson, &[b"{\"a\":1}\n\n  \n{oops\n{\"a\":2}\n"]);
        assert_eq!(
            records,
            vec![Record::Json(json!({"a": 1})), Record::Json(json!({"a": 2}))]
        );
    }

    #[test]
    fn test_ndjson_trailing_record_without_newline() {
        let records = decode(Framing::Ndjson, &[b"{\"a\":1}\n{\"a\":2}"]);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_incomplete_trailing_record_is_discarded() {
        let records = decode(Framing::Ndjson, &[b"{\"a\":1}\n{\"a\":"]);
        assert_eq!(records, vec![Record::Json(json!({"a": 1}))]);
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let line = "{\"t\":\"héllo 🌊\"}\n".as_bytes();
        // split inside the 4-byte emoji
        let split = line.len() - 5;
        let records = decode(Framing::Ndjson, &[&line[..split], &line[split..]]);
        assert_eq!(records, vec![Record::Json(json!({"t": "héllo 🌊"}))]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let records = decode(Framing::Ndjson, &[b"{\"a\":1}\r\n{\"a\":2}\r\n"]);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_sse_done_is_not_parsed() {
        let records = decode(
            Framing::Sse,
            &[b"data: {\"x\":1}\n\ndata: [DONE]\n\n"],
        );
        assert_eq!(records, vec![Record::Json(json!({"x": 1})), Record::Terminal]);
    }

    #[test]
    fn test_sse_stops_after_terminal() {
        let mut decoder = StreamDecoder::new(Framing::Sse);
        decoder.feed(b"data: [DONE]\n\ndata: {\"x\":1}\n\n");
        assert!(decoder.is_terminated());
        assert_eq!(decoder.next_record(), Some(Record::Terminal));
        assert_eq!(decoder.next_record(), None);
        assert_eq!(decoder.pending_len(), 0);

        decoder.feed(b"data: {\"x\":2}\n\n");
        assert_eq!(decoder.next_record(), None);
    }

    #[test]
    fn test_sse_done_without_blank_line() {
        let records = decode(Framing::Sse, &[b"data: {\"x\":1}\ndata: [DONE]\n"]);
        assert_eq!(records, vec![Record::Json(json!({"x": 1})), Record::Terminal]);
    }

    #[test]
    fn test_sse_ignores_comments_and_fields() {
        let records = decode(
            Framing::Sse,
            &[b": keep-alive\n\nevent: message\nid: 7\ndata:{\"x\":1}\n\n"],
        );
        assert_eq!(records, vec![Record::Json(json!({"x": 1}))]);
    }

    #[test]
    fn test_sse_data_line_is_ready_without_blank_line() {
        let mut decoder = StreamDecoder::new(Framing::Sse);
        decoder.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n");
        assert_eq!(
            decoder.next_record(),
            Some(Record::Json(json!({"choices": [{"delta": {"content": "a"}}]})))
        );

        decoder.feed(b"data: {\"x\":2}\n");
        assert_eq!(decoder.next_record(), Some(Record::Json(json!({"x": 2}))));
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn test_sse_multiline_data_event() {
        let records = decode(Framing::Sse, &[b"data: {\"x\":\ndata: 1}\n\n"]);
        assert_eq!(records, vec![Record::Json(json!({"x": 1}))]);
    }

    #[test]
    fn test_sse_events_without_blank_separator() {
        let records = decode(Framing::Sse, &[b"data: {\"x\":1}\ndata: {\"x\":2}\n\n"]);
        assert_eq!(
            records,
            vec![Record::Json(json!({"x": 1})), Record::Json(json!({"x": 2}))]
        );
    }

    #[test]
    fn test_sse_unframed_json_line() {
        let records = decode(Framing::Sse, &[b"{\"x\":1}\n"]);
        assert_eq!(records, vec![Record::Json(json!({"x": 1}))]);
    }

    #[test]
    fn test_sse_malformed_event_skipped() {
        let records = decode(
            Framing::Sse,
            &[b"data: {\"x\":1}\n\ndata: {broken\n\ndata: {\"x\":2}\n\n"],
        );
        assert_eq!(
            records,
            vec![Record::Json(json!({"x": 1})), Record::Json(json!({"x": 2}))]
        );
    }

    #[test]
    fn test_sse_trailing_event_at_eof() {
        let records = decode(Framing::Sse, &[b"data: {\"x\":1}"]);
        assert_eq!(records, vec![Record::Json(json!({"x": 1}))]);
    }

    fn text_of(value: &Value) -> RecordAction {
        if value.get("done").and_then(Value::as_bool) == Some(true) {
            return RecordAction::Finish(None);
        }
        match value.get("t").and_then(Value::as_str) {
            Some(t) => RecordAction::Emit(t.to_string()),
            None => RecordAction::Skip,
        }
    }

    fn byte_stream(
        chunks: Vec<&'static str>,
    ) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
        stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok(Bytes::from_static(c.as_bytes()))),
        )
    }

    /// Sets its flag when the byte source is dropped
    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// `chunks` followed by a body that never ends
    fn open_source(
        chunks: Vec<&'static str>,
    ) -> (
        impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
        Arc<AtomicBool>,
    ) {
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(dropped.clone());
        let source = byte_stream(chunks)
            .chain(stream::pending())
            .map(move |chunk| {
                let _held = &flag;
                chunk
            });
        (source, dropped)
    }

    async fn next_within(stream: &mut DeltaStream) -> Option<ProviderResult<StreamDelta>> {
        tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .expect("stream should not wait for more body")
    }

    #[tokio::test]
    async fn test_ndjson_done_releases_body() {
        let (source, dropped) = open_source(vec![
            "{\"t\":\"a\"}\n{\"done\":true}\n",
            "{\"t\":\"late\"}\n",
        ]);
        let mut stream = decode_deltas(source, Framing::Ndjson, text_of);

        assert_eq!(next_within(&mut stream).await.unwrap().unwrap().content, "a");
        assert!(!dropped.load(Ordering::SeqCst));
        assert!(next_within(&mut stream).await.is_none());
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_sse_sentinel_releases_body() {
        let (source, dropped) = open_source(vec![
            "data: {\"t\":\"a\"}\n\ndata: [DONE]\n\n",
            "data: {\"t\":\"late\"}\n\n",
        ]);
        let mut stream = decode_deltas(source, Framing::Sse, text_of);

        assert_eq!(next_within(&mut stream).await.unwrap().unwrap().content, "a");
        assert!(next_within(&mut stream).await.is_none());
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_sse_delta_arrives_while_body_open() {
        let (source, _dropped) = open_source(vec!["data: {\"t\":\"a\"}\n"]);
        let mut stream = decode_deltas(source, Framing::Sse, text_of);
        assert_eq!(next_within(&mut stream).await.unwrap().unwrap().content, "a");
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_body() {
        let (source, dropped) = open_source(vec!["{\"t\":\"a\"}\n"]);
        let mut stream = decode_deltas(source, Framing::Ndjson, text_of);

        assert_eq!(next_within(&mut stream).await.unwrap().unwrap().content, "a");
        assert!(!dropped.load(Ordering::SeqCst));
        drop(stream);
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_decode_deltas_stops_at_done() {
        let stream = decode_deltas(
            byte_stream(vec!["{\"t\":\"a\"}\n{\"t\":\"b\"}\n{\"done\":true}\n{\"t\":\"c\"}\n"]),
            Framing::Ndjson,
            text_of,
        );
        let texts: Vec<String> = stream
            .map(|d| d.unwrap().content)
            .collect::<Vec<_>>()
            .await;
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_decode_deltas_reports_read_error() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"{\"t\":\"a\"}\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ];
        let mut stream = decode_deltas(stream::iter(chunks), Framing::Ndjson, text_of);

        assert_eq!(stream.next().await.unwrap().unwrap().content, "a");
        assert!(matches!(
            stream.next().await,
            Some(Err(ProviderError::BackendUnreachable(_)))
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_decode_deltas_in_band_error() {
        let stream = decode_deltas(
            byte_stream(vec!["{\"t\":\"a\"}\n{\"error\":\"oom\"}\n{\"t\":\"b\"}\n"]),
            Framing::Ndjson,
            |v: &Value| match v.get("error").and_then(Value::as_str) {
                Some(e) => RecordAction::Fail(e.to_string()),
                None => text_of(v),
            },
        );
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(ProviderError::BackendProtocol(ref m)) if m == "oom"));
    }
}
