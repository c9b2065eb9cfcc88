//! Buffered event cursor over a [`FrameSource`].
//!
//! Contract:
//! - Ping frames (empty or whitespace-only payload) are skipped and never surface.
//! - A frame equal to the done sentinel ends the stream; later frames are never read.
//! - Decode failures, server error frames and source failures are sticky. Once the
//!   cursor is exhausted or errored it never touches the source again.
//! - `peek`/`peek_n` decode ahead into a FIFO buffer that `advance` drains first,
//!   so lookahead never changes the order or content of what `advance` yields.

use std::collections::VecDeque;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, field, trace, warn};

use crate::error::StreamError;
use crate::frame::FrameSource;
use crate::telemetry::{self, StreamOutcome, StreamTrace, keys};
use crate::union::Polymorphic;

pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone)]
pub struct CursorOptions {
    /// Payload that marks the end of the stream.
    pub done_sentinel: String,
}

impl Default for CursorOptions {
    fn default() -> Self {
        Self {
            done_sentinel: DONE_SENTINEL.to_string(),
        }
    }
}

/// Turns one parsed, non-error payload into a value.
type DecodeFn<T> = fn(Value) -> Result<T, StreamError>;

pub struct EventCursor<T, S: FrameSource> {
    source: S,
    sentinel: String,
    decode: DecodeFn<T>,
    buffer: VecDeque<T>,
    current: T,
    err: Option<StreamError>,
    exhausted: bool,
    closed: bool,
    frames: u64,
    pings: u64,
    values: u64,
    lookahead_peak: usize,
    span: tracing::Span,
}

impl<T: DeserializeOwned + Default, S: FrameSource> EventCursor<T, S> {
    /// Cursor decoding payloads with plain serde. Every payload failure is `Decode`.
    pub fn new(source: S) -> Self {
        Self::with_options(source, CursorOptions::default())
    }

    pub fn with_options(source: S, opts: CursorOptions) -> Self {
        Self::build(source, opts, decode_serde::<T>)
    }

    /// A cursor that starts out errored, for when opening the stream already failed.
    /// The source is never read but is still closed.
    pub fn failed(source: S, err: StreamError) -> Self {
        let mut cursor = Self::new(source);
        cursor.fail(err);
        cursor
    }
}

impl<T: Polymorphic, S: FrameSource> EventCursor<T, S> {
    /// Cursor over a union type. A payload no variant accepts fails the cursor
    /// with [`StreamError::Union`], keeping it apart from malformed JSON.
    pub fn union(source: S) -> Self {
        Self::union_with_options(source, CursorOptions::default())
    }

    pub fn union_with_options(source: S, opts: CursorOptions) -> Self {
        Self::build(source, opts, decode_union::<T>)
    }
}

impl<T: Default, S: FrameSource> EventCursor<T, S> {
    fn build(source: S, opts: CursorOptions, decode: DecodeFn<T>) -> Self {
        let span = tracing::debug_span!(
            "event_cursor",
            stream.frames = field::Empty,
            stream.pings = field::Empty,
            stream.values = field::Empty,
            stream.lookahead_peak = field::Empty,
            stream.outcome = field::Empty,
            error.kind = field::Empty,
            error.message = field::Empty,
        );
        Self {
            source,
            sentinel: opts.done_sentinel,
            decode,
            buffer: VecDeque::new(),
            current: T::default(),
            err: None,
            exhausted: false,
            closed: false,
            frames: 0,
            pings: 0,
            values: 0,
            lookahead_peak: 0,
            span,
        }
    }
}

impl<T, S: FrameSource> EventCursor<T, S> {
    /// Move to the next value. Buffered lookahead is consumed first.
    pub fn advance(&mut self) -> bool {
        if let Some(value) = self.buffer.pop_front() {
            self.current = value;
            return true;
        }
        match self.read_value() {
            Some(value) => {
                self.current = value;
                true
            }
            None => false,
        }
    }

    /// The value produced by the last successful `advance`, or `T::default()`.
    pub fn current(&self) -> &T {
        &self.current
    }

    /// The value the next `advance` would yield, without consuming it.
    pub fn peek(&mut self) -> Option<&T> {
        if self.buffer.is_empty() {
            let value = self.read_value()?;
            self.buffer.push_back(value);
            self.note_lookahead();
        }
        self.buffer.front()
    }

    /// Up to `n` upcoming values in arrival order. Fewer are returned if the
    /// stream ends or fails first.
    pub fn peek_n(&mut self, n: usize) -> Vec<&T> {
        if n == 0 {
            return Vec::new();
        }
        while self.buffer.len() < n {
            match self.read_value() {
                Some(value) => self.buffer.push_back(value),
                None => break,
            }
        }
        self.note_lookahead();
        self.buffer.iter().take(n).collect()
    }

    /// Number of decoded values waiting in the lookahead buffer.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn read_value(&mut self) -> Option<T> {
        if self.err.is_some() || self.exhausted {
            return None;
        }
        let _enter = self.span.clone().entered();
        loop {
            if !self.source.advance() {
                match self.source.err() {
                    Some(e) => {
                        let msg = match e {
                            StreamError::Transport(msg) => msg.clone(),
                            other => other.to_string(),
                        };
                        self.fail(StreamError::Transport(msg));
                    }
                    None => self.finish("source ended"),
                }
                return None;
            }
            self.frames += 1;

            let frame = self.source.current_frame();
            if frame.is_ping() {
                self.pings += 1;
                trace!(frame = self.frames, "skipping ping frame");
                continue;
            }
            let data: Bytes = frame.data.clone();
            let payload = data.trim_ascii();
            if payload == self.sentinel.as_bytes() {
                self.finish("done sentinel");
                return None;
            }
            match parse_payload(payload).and_then(self.decode) {
                Ok(value) => {
                    self.values += 1;
                    return Some(value);
                }
                Err(e) => {
                    self.fail(e);
                    return None;
                }
            }
        }
    }

    pub fn err(&self) -> Option<&StreamError> {
        self.err.as_ref()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn get_ref(&self) -> &S {
        &self.source
    }

    /// Release the source. Safe to call any number of times; the source is
    /// closed and the stream trace emitted only once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.source.close();

        let outcome = if self.err.is_some() {
            StreamOutcome::Errored
        } else if self.exhausted {
            StreamOutcome::Exhausted
        } else {
            StreamOutcome::Abandoned
        };
        self.span.record(keys::KEY_FRAMES, self.frames);
        self.span.record(keys::KEY_PINGS, self.pings);
        self.span.record(keys::KEY_VALUES, self.values);
        self.span
            .record(keys::KEY_LOOKAHEAD_PEAK, self.lookahead_peak as u64);
        self.span.record(keys::KEY_OUTCOME, outcome.as_str());

        let mut trace = StreamTrace::new()
            .counts(self.frames, self.pings, self.values)
            .lookahead_peak(self.lookahead_peak as u64)
            .outcome(outcome);
        if let Some(err) = &self.err {
            trace = trace.error_kind(err.kind()).error_message(&err.to_string());
        }
        telemetry::emit(trace);
    }

    fn fail(&mut self, err: StreamError) {
        warn!(
            error.kind = err.kind(),
            error.message = %err,
            "event cursor failed"
        );
        self.span.record(keys::KEY_ERROR_KIND, err.kind());
        self.span
            .record(keys::KEY_ERROR_MESSAGE, err.to_string().as_str());
        self.err = Some(err);
    }

    fn finish(&mut self, why: &str) {
        debug!(reason = why, values = self.values, "event stream finished");
        self.exhausted = true;
    }

    fn note_lookahead(&mut self) {
        self.lookahead_peak = self.lookahead_peak.max(self.buffer.len());
    }
}

impl<T, S: FrameSource> Drop for EventCursor<T, S> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T: Clone, S: FrameSource> Iterator for EventCursor<T, S> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.advance() {
            Some(self.current.clone())
        } else {
            None
        }
    }
}

/// Parse one non-ping payload. A top-level `error` member means the server
/// aborted the stream and is reported instead of decoding.
fn parse_payload(payload: &[u8]) -> Result<Value, StreamError> {
    let value: Value = serde_json::from_slice(payload)?;
    if let Some(err) = value.get("error")
        && !err.is_null()
    {
        return Err(StreamError::Server(server_message(err)));
    }
    Ok(value)
}

fn decode_serde<T: DeserializeOwned>(value: Value) -> Result<T, StreamError> {
    Ok(serde_json::from_value(value)?)
}

fn decode_union<T: Polymorphic>(value: Value) -> Result<T, StreamError> {
    Ok(T::union_spec().decode(&value)?)
}

fn server_message(err: &Value) -> String {
    match err {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("message").and_then(Value::as_str) {
            Some(msg) => msg.to_string(),
            None => err.to_string(),
        },
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{RawFrame, VecSource};
    use crate::responses::{InputItem, ResponseStreamEvent};
    use crate::union::UnionError;
    use once_cell::sync::Lazy;
    use serde::Deserialize;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Default, PartialEq, Deserialize)]
    struct Item {
        id: String,
        #[serde(default)]
        data: String,
    }

    fn item(id: &str) -> String {
        format!(r#"{{"id":"{id}","data":"payload {id}"}}"#)
    }

    fn cursor(payloads: &[&str]) -> EventCursor<Item, VecSource> {
        EventCursor::new(VecSource::from_payloads(
            payloads.iter().map(|p| p.to_string()).collect::<Vec<_>>(),
        ))
    }

    fn ids(c: &mut EventCursor<Item, VecSource>) -> Vec<String> {
        let mut out = Vec::new();
        while c.advance() {
            out.push(c.current().id.clone());
        }
        out
    }

    #[test]
    fn pings_are_transparent() {
        let a = item("1");
        let b = item("2");
        let mut noisy = cursor(&["", &a, "   ", "\n\t", "", &b, " "]);
        let mut clean = cursor(&[&a, &b]);
        assert_eq!(ids(&mut noisy), ids(&mut clean));
        assert!(noisy.err().is_none());
        assert!(noisy.is_exhausted());
    }

    #[test]
    fn only_pings_ends_cleanly() {
        let mut c = cursor(&["", " ", "\r\n"]);
        assert!(!c.advance());
        assert!(c.err().is_none());
        assert_eq!(c.current(), &Item::default());
    }

    #[test]
    fn sentinel_truncates_stream() {
        let a = item("1");
        let b = item("2");
        let mut c = cursor(&[&a, "[DONE]", &b]);
        assert_eq!(ids(&mut c), vec!["1"]);
        assert!(c.err().is_none());
        // the frame after the sentinel was never read
        assert_eq!(c.get_ref().position(), 2);
        assert!(!c.advance());
        assert_eq!(c.get_ref().position(), 2);
    }

    #[test]
    fn sentinel_is_configurable() {
        let a = item("1");
        let mut c: EventCursor<Item, _> = EventCursor::with_options(
            VecSource::from_payloads([a.clone(), "<eof>".to_string(), a]),
            CursorOptions {
                done_sentinel: "<eof>".into(),
            },
        );
        assert_eq!(ids(&mut c), vec!["1"]);
    }

    #[test]
    fn malformed_payload_is_sticky() {
        let a = item("1");
        let b = item("2");
        let mut c = cursor(&[&a, "{invalid json}", &b]);
        assert!(c.advance());
        assert!(!c.advance());
        assert!(matches!(c.err(), Some(StreamError::Decode(_))));
        assert!(!c.advance());
        assert!(c.peek().is_none());
        assert_eq!(c.get_ref().position(), 2);
        // current keeps the last good value
        assert_eq!(c.current().id, "1");
    }

    #[test]
    fn error_field_becomes_server_error() {
        let a = item("1");
        let mut c = cursor(&[&a, r#"{"error":"something went wrong"}"#]);
        assert!(c.advance());
        assert!(!c.advance());
        match c.err() {
            Some(StreamError::Server(msg)) => assert_eq!(msg, "something went wrong"),
            other => panic!("expected server error, got {other:?}"),
        }

        let mut c = cursor(&[r#"{"error":{"message":"overloaded","type":"server_error"}}"#]);
        assert!(!c.advance());
        assert_eq!(
            c.err().map(|e| e.to_string()).as_deref(),
            Some("received error while streaming: overloaded")
        );
    }

    #[test]
    fn null_error_field_is_not_an_error() {
        let mut c = cursor(&[r#"{"id":"1","error":null}"#]);
        assert!(c.advance());
        assert_eq!(c.current().id, "1");
    }

    #[test]
    fn source_error_is_surfaced() {
        let src = VecSource::from_payloads([item("1"), item("2")]).fail_at(1, "decoder error");
        let mut c: EventCursor<Item, _> = EventCursor::new(src);
        assert!(c.advance());
        assert!(!c.advance());
        match c.err() {
            Some(StreamError::Transport(msg)) => assert!(msg.contains("decoder error")),
            other => panic!("expected transport error, got {other:?}"),
        }
    }

    #[test]
    fn initial_error_prevents_reading() {
        let mut c: EventCursor<Item, _> = EventCursor::failed(
            VecSource::from_payloads([item("1")]),
            StreamError::Transport("initial error".into()),
        );
        assert!(!c.advance());
        assert!(c.peek().is_none());
        assert!(c.peek_n(3).is_empty());
        assert!(c.err().is_some());
        assert_eq!(c.get_ref().position(), 0);
        assert_eq!(c.current(), &Item::default());
    }

    #[test]
    fn peek_is_idempotent() {
        let a = item("1");
        let b = item("2");
        let mut c = cursor(&[&a, &b]);
        assert_eq!(c.peek().map(|i| i.id.clone()).as_deref(), Some("1"));
        assert_eq!(c.peek().map(|i| i.id.clone()).as_deref(), Some("1"));
        assert_eq!(c.buffered(), 1);

        assert!(c.advance());
        assert_eq!(c.current().id, "1");
        assert_eq!(c.peek().map(|i| i.id.clone()).as_deref(), Some("2"));
        assert!(c.advance());
        assert_eq!(c.current().id, "2");
        assert!(c.peek().is_none());
        assert!(c.err().is_none());
    }

    #[test]
    fn peek_on_empty_stream() {
        let mut c = cursor(&[]);
        assert!(c.peek().is_none());
        assert!(c.err().is_none());
    }

    #[test]
    fn peek_skips_pings_and_stops_at_sentinel() {
        let a = item("1");
        let b = item("2");
        let mut c = cursor(&["", &a, "[DONE]", &b]);
        assert_eq!(c.peek().map(|i| i.id.clone()).as_deref(), Some("1"));
        assert!(c.err().is_none());
        assert!(c.advance());
        assert!(c.peek().is_none());
        assert!(c.err().is_none());
    }

    #[test]
    fn peek_n_preserves_order() {
        let frames: Vec<String> = (1..=4).map(|i| item(&i.to_string())).collect();
        let refs: Vec<&str> = frames.iter().map(String::as_str).collect();
        let mut c = cursor(&refs);

        let first: Vec<String> = c.peek_n(3).into_iter().map(|i| i.id.clone()).collect();
        assert_eq!(first, vec!["1", "2", "3"]);

        assert!(c.advance());
        assert_eq!(c.current().id, "1");
        assert!(c.advance());
        assert_eq!(c.current().id, "2");

        let next: Vec<String> = c.peek_n(2).into_iter().map(|i| i.id.clone()).collect();
        assert_eq!(next, vec!["3", "4"]);
        assert_eq!(ids(&mut c), vec!["3", "4"]);
        assert!(c.err().is_none());
    }

    #[test]
    fn peek_n_with_insufficient_values() {
        let a = item("1");
        let b = item("2");
        let mut c = cursor(&[&a, &b]);
        assert_eq!(c.peek_n(5).len(), 2);
        assert_eq!(c.peek_n(0).len(), 0);
        assert_eq!(c.buffered(), 2);
        assert_eq!(ids(&mut c), vec!["1", "2"]);
    }

    #[test]
    fn buffer_drains_to_empty() {
        let a = item("1");
        let b = item("2");
        let mut c = cursor(&[&a, &b]);
        c.peek_n(2);
        assert!(c.advance());
        assert!(c.advance());
        assert_eq!(c.buffered(), 0);
        assert!(c.peek_n(3).is_empty());
        assert!(!c.advance());
    }

    #[test]
    fn mixed_peek_and_advance() {
        let frames: Vec<String> = (1..=5).map(|i| item(&i.to_string())).collect();
        let mut with_peeks = cursor(&frames.iter().map(String::as_str).collect::<Vec<_>>());
        let mut seen = Vec::new();
        with_peeks.peek();
        while with_peeks.advance() {
            seen.push(with_peeks.current().id.clone());
            with_peeks.peek_n(2);
            with_peeks.peek();
        }
        let mut plain = cursor(&frames.iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(seen, ids(&mut plain));
    }

    #[test]
    fn values_peeked_before_failure_are_still_delivered() {
        let a = item("1");
        let mut c = cursor(&[&a, "not json"]);
        assert_eq!(c.peek_n(3).len(), 1);
        assert!(c.err().is_some());
        assert!(c.advance());
        assert_eq!(c.current().id, "1");
        assert!(!c.advance());
    }

    #[test]
    fn close_is_idempotent() {
        let a = item("1");
        let mut c = cursor(&[&a]);
        c.close();
        c.close();
        assert_eq!(c.get_ref().close_count(), 1);
        drop(c);
    }

    #[test]
    fn iterator_yields_values() {
        let frames: Vec<String> = (1..=3).map(|i| item(&i.to_string())).collect();
        let c = cursor(&frames.iter().map(String::as_str).collect::<Vec<_>>());
        let got: Vec<String> = c.map(|i| i.id).collect();
        assert_eq!(got, vec!["1", "2", "3"]);
    }

    #[test]
    fn decodes_response_stream_events() {
        let src = VecSource::new(vec![
            RawFrame::data(r#"{"type":"response.output_text.delta","item_id":"msg_1","output_index":0,"content_index":0,"delta":"Hi"}"#)
                .with_event("response.output_text.delta"),
            RawFrame::data(""),
            RawFrame::data(r#"{"type":"response.brand_new","sequence_number":3}"#),
            RawFrame::data("[DONE]"),
        ]);
        let mut c: EventCursor<ResponseStreamEvent, _> = EventCursor::union(src);
        assert!(c.advance());
        match c.current() {
            ResponseStreamEvent::OutputTextDelta(ev) => assert_eq!(ev.delta, "Hi"),
            other => panic!("unexpected {other:?}"),
        }
        assert!(c.advance());
        assert_eq!(c.current().kind(), "response.brand_new");
        assert!(!c.advance());
        assert!(c.err().is_none());
    }

    #[test]
    fn unmatched_union_payload_is_a_union_error() {
        let (store, _guard) = telemetry::test_span::install_capture();
        let mut c: EventCursor<InputItem, _> = EventCursor::union(VecSource::from_payloads([
            r#"{"role":"user","content":"hi"}"#,
            r#"{"type":"mystery","role":"user"}"#,
            r#"{"role":"user","content":"never read"}"#,
        ]));
        assert!(c.advance());
        assert!(!c.advance());
        match c.err() {
            Some(StreamError::Union(UnionError::UnknownDiscriminator { value, .. })) => {
                assert_eq!(value, "\"mystery\"")
            }
            other => panic!("expected union error, got {other:?}"),
        }
        assert_eq!(c.err().map(StreamError::kind), Some("union"));
        assert!(!c.advance());
        assert_eq!(c.get_ref().position(), 2);
        c.close();
        let span = store.span("event_cursor").expect("cursor span");
        assert_eq!(span.field(keys::KEY_ERROR_KIND).as_deref(), Some("union"));
    }

    #[test]
    fn union_cursor_keeps_json_and_union_failures_apart() {
        let mut no_variant: EventCursor<InputItem, _> =
            EventCursor::union(VecSource::from_payloads([r#"{"role":"user"}"#]));
        assert!(!no_variant.advance());
        assert!(matches!(
            no_variant.err(),
            Some(StreamError::Union(UnionError::NoMatchingVariant { .. }))
        ));

        let mut malformed: EventCursor<InputItem, _> =
            EventCursor::union(VecSource::from_payloads(["{not json"]));
        assert!(!malformed.advance());
        assert!(matches!(malformed.err(), Some(StreamError::Decode(_))));

        let mut not_object: EventCursor<InputItem, _> =
            EventCursor::union(VecSource::from_payloads(["[1,2]"]));
        assert!(!not_object.advance());
        assert!(matches!(
            not_object.err(),
            Some(StreamError::Union(UnionError::NotAnObject { .. }))
        ));
    }

    #[test]
    fn union_cursor_decodes_empty_object_to_default() {
        let mut c: EventCursor<InputItem, _> =
            EventCursor::union(VecSource::from_payloads(["{}"]));
        assert!(c.advance());
        assert_eq!(c.current(), &InputItem::default());
        assert!(c.err().is_none());
    }

    #[test]
    fn span_records_counters_on_close() {
        let (store, _guard) = telemetry::test_span::install_capture();
        let a = item("1");
        let mut c = cursor(&["", &a, "[DONE]"]);
        assert_eq!(ids(&mut c), vec!["1"]);
        c.close();

        let span = store.span("event_cursor").expect("cursor span");
        assert_eq!(span.field(keys::KEY_FRAMES).as_deref(), Some("3"));
        assert_eq!(span.field(keys::KEY_PINGS).as_deref(), Some("1"));
        assert_eq!(span.field(keys::KEY_VALUES).as_deref(), Some("1"));
        assert_eq!(span.field(keys::KEY_OUTCOME).as_deref(), Some("exhausted"));
        assert!(store.saw_event("event stream finished"));
    }

    static TRACES: Lazy<Mutex<Vec<StreamTrace>>> = Lazy::new(|| Mutex::new(Vec::new()));

    struct TraceSink;
    impl telemetry::TelemetrySink for TraceSink {
        fn record(&self, trace: StreamTrace) {
            TRACES.lock().unwrap().push(trace);
        }
    }

    #[test]
    fn close_emits_one_trace() {
        let _ = telemetry::set_telemetry_sink(Arc::new(TraceSink));
        telemetry::test_set_capture_enabled(true);
        TRACES.lock().unwrap().clear();

        let a = item("1");
        let b = item("2");
        let mut c = cursor(&[&a, &b, "{bad"]);
        c.peek_n(2);
        while c.advance() {}
        c.close();
        drop(c);
        telemetry::test_set_capture_enabled(false);

        let traces = TRACES.lock().unwrap().clone();
        assert_eq!(traces.len(), 1, "got {traces:?}");
        let t = &traces[0];
        assert_eq!(t.outcome, StreamOutcome::Errored);
        assert_eq!(t.values, 2);
        assert_eq!(t.lookahead_peak, 2);
        assert_eq!(t.error_kind.as_deref(), Some("decode"));
    }
}
