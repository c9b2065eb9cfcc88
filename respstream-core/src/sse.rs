//! Server-Sent Events wire decoder.
//!
//! Wire format:
//! - `data: <payload>` lines accumulate into the frame payload, joined by `\n`
//! - `event: <name>` and `id: <id>` set frame metadata
//! - lines starting with `:` are comments
//! - a blank line dispatches the pending frame
//!
//! A block made only of comments dispatches an empty frame, so keep-alive
//! comments reach the cursor as pings. Payload bytes are passed through as-is;
//! only `event` and `id` values are read as (lossy) UTF-8.

use std::io::BufRead;

use bytes::Bytes;

use crate::error::StreamError;
use crate::frame::{FrameSource, RawFrame};

#[derive(Debug)]
pub struct SseDecoder<R> {
    reader: Option<R>,
    line: Vec<u8>,
    current: RawFrame,
    err: Option<StreamError>,
}

impl<R: BufRead> SseDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            line: Vec::new(),
            current: RawFrame::default(),
            err: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }
}

#[derive(Default)]
struct Pending {
    data: Vec<u8>,
    has_data: bool,
    event: Option<String>,
    id: Option<String>,
    touched: bool,
}

impl Pending {
    fn field(&mut self, name: &[u8], value: &[u8]) {
        match name {
            b"data" => {
                if self.has_data {
                    self.data.push(b'\n');
                }
                self.data.extend_from_slice(value);
                self.has_data = true;
            }
            b"event" => self.event = Some(String::from_utf8_lossy(value).into_owned()),
            b"id" => self.id = Some(String::from_utf8_lossy(value).into_owned()),
            // `retry` and unknown fields carry nothing for us
            _ => {}
        }
    }

    fn into_frame(self) -> RawFrame {
        RawFrame {
            data: Bytes::from(self.data),
            event: self.event,
            id: self.id,
        }
    }
}

impl<R: BufRead> FrameSource for SseDecoder<R> {
    fn advance(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }
        let Some(reader) = self.reader.as_mut() else {
            return false;
        };

        let mut pending = Pending::default();
        loop {
            self.line.clear();
            match reader.read_until(b'\n', &mut self.line) {
                Ok(0) => {
                    if pending.touched {
                        self.current = pending.into_frame();
                        return true;
                    }
                    return false;
                }
                Ok(_) => {}
                Err(e) => {
                    self.err = Some(StreamError::Io(e));
                    return false;
                }
            }

            let mut line = self.line.as_slice();
            line = line.strip_suffix(b"\n").unwrap_or(line);
            line = line.strip_suffix(b"\r").unwrap_or(line);

            if line.is_empty() {
                if pending.touched {
                    self.current = pending.into_frame();
                    return true;
                }
                continue;
            }
            pending.touched = true;
            if line[0] == b':' {
                continue;
            }
            match line.iter().position(|&b| b == b':') {
                Some(at) => {
                    let value = &line[at + 1..];
                    pending.field(&line[..at], value.strip_prefix(b" ").unwrap_or(value))
                }
                None => pending.field(line, b""),
            }
        }
    }

    fn current_frame(&self) -> &RawFrame {
        &self.current
    }

    fn err(&self) -> Option<&StreamError> {
        self.err.as_ref()
    }

    fn close(&mut self) {
        self.reader = None;
    }
}
