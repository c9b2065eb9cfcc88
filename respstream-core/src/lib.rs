pub mod accumulator;
pub mod config;
pub mod cursor;
pub mod error;
pub mod frame;
pub mod http_client;
pub mod responses;
pub mod sse;
pub mod telemetry;
pub mod union;

pub use accumulator::{Edge, ResponseAccumulator};
pub use cursor::{CursorOptions, EventCursor};
pub use error::{CoreResult, StreamError};
pub use frame::{FrameSource, RawFrame, VecSource};
pub use responses::ResponseStreamEvent;
pub use sse::SseDecoder;
