//! Frame source boundary.
//!
//! A frame source yields raw frames one at a time, blocking in `advance` until
//! the next frame arrives or the underlying transport ends. The cursor in
//! [`crate::cursor`] is the only consumer; it never reads a source concurrently.

use bytes::Bytes;

use crate::error::StreamError;

/// One control unit from the transport: an opaque payload plus optional metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFrame {
    pub data: Bytes,
    pub event: Option<String>,
    pub id: Option<String>,
}

impl RawFrame {
    pub fn data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// A frame whose payload is empty or whitespace only is a keep-alive.
    pub fn is_ping(&self) -> bool {
        self.data.iter().all(|b| b.is_ascii_whitespace())
    }
}

pub trait FrameSource {
    /// Block until the next frame is available. Returns `false` at end of input
    /// or when the source has failed; check [`FrameSource::err`] to tell which.
    fn advance(&mut self) -> bool;

    /// The frame produced by the last successful `advance`.
    fn current_frame(&self) -> &RawFrame;

    fn err(&self) -> Option<&StreamError>;

    /// Release the underlying transport. Must be safe to call more than once.
    fn close(&mut self);
}

/// In-memory frame source, used for replays and tests.
#[derive(Debug, Default)]
pub struct VecSource {
    frames: Vec<RawFrame>,
    pos: usize,
    current: RawFrame,
    fail_at: Option<(usize, String)>,
    err: Option<StreamError>,
    closes: usize,
}

impl VecSource {
    pub fn new(frames: Vec<RawFrame>) -> Self {
        Self {
            frames,
            ..Default::default()
        }
    }

    /// Convenience constructor from payload strings.
    pub fn from_payloads<I, P>(payloads: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Bytes>,
    {
        Self::new(payloads.into_iter().map(RawFrame::data).collect())
    }

    /// Fail with a transport error once `index` frames have been handed out.
    pub fn fail_at(mut self, index: usize, message: impl Into<String>) -> Self {
        self.fail_at = Some((index, message.into()));
        self
    }

    /// Number of frames handed out so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn close_count(&self) -> usize {
        self.closes
    }
}

impl FrameSource for VecSource {
    fn advance(&mut self) -> bool {
        if self.err.is_some() || self.closes > 0 {
            return false;
        }
        if let Some((at, msg)) = &self.fail_at
            && *at == self.pos
        {
            self.err = Some(StreamError::Transport(msg.clone()));
            return false;
        }
        match self.frames.get(self.pos) {
            Some(frame) => {
                self.current = frame.clone();
                self.pos += 1;
                true
            }
            None => false,
        }
    }

    fn current_frame(&self) -> &RawFrame {
        &self.current
    }

    fn err(&self) -> Option<&StreamError> {
        self.err.as_ref()
    }

    fn close(&mut self) {
        self.closes += 1;
    }
}
