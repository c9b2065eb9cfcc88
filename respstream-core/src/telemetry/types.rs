use serde::{Deserialize, Serialize};

/// How a cursor stopped reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StreamOutcome {
    /// Source ended or the done sentinel was seen.
    Exhausted,
    Errored,
    /// Closed while frames may still have been pending.
    #[default]
    Abandoned,
}

impl StreamOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exhausted => "exhausted",
            Self::Errored => "errored",
            Self::Abandoned => "abandoned",
        }
    }
}

/// Per-cursor consumption record, emitted once when the cursor is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StreamTrace {
    /// Frames pulled from the source, pings and sentinel included.
    pub frames: u64,
    pub pings: u64,
    /// Values successfully decoded.
    pub values: u64,
    /// Largest number of values buffered by lookahead at once.
    pub lookahead_peak: u64,
    pub outcome: StreamOutcome,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

impl StreamTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcome(mut self, outcome: StreamOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn counts(mut self, frames: u64, pings: u64, values: u64) -> Self {
        self.frames = frames;
        self.pings = pings;
        self.values = values;
        self
    }

    pub fn lookahead_peak(mut self, peak: u64) -> Self {
        self.lookahead_peak = peak;
        self
    }

    pub fn error_kind(mut self, kind: &str) -> Self {
        self.error_kind = Some(kind.to_string());
        self
    }

    pub fn error_message(mut self, msg: &str) -> Self {
        self.error_message = Some(msg.to_string());
        self
    }
}
