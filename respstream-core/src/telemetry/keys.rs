/// Span/log attribute keys for stream consumption.
/// Keep these stable; changing them is a breaking change for dashboards.
pub const KEY_FRAMES: &str = "stream.frames";
pub const KEY_PINGS: &str = "stream.pings";
pub const KEY_VALUES: &str = "stream.values";
pub const KEY_LOOKAHEAD_PEAK: &str = "stream.lookahead_peak";
pub const KEY_OUTCOME: &str = "stream.outcome";

/// Error-related (if applicable)
pub const KEY_ERROR_KIND: &str = "error.kind";
pub const KEY_ERROR_MESSAGE: &str = "error.message";
