//! Wire records for the Responses API: the response snapshot, its output
//! items, request inputs, and the streamed event union.

use once_cell::sync::Lazy;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::union::{deserialize_union, Polymorphic, UnionSpec};

pub mod item_type {
    pub const MESSAGE: &str = "message";
    pub const FUNCTION_CALL: &str = "function_call";
    pub const FILE_SEARCH_CALL: &str = "file_search_call";
    pub const WEB_SEARCH_CALL: &str = "web_search_call";
    pub const CODE_INTERPRETER_CALL: &str = "code_interpreter_call";
    pub const REASONING: &str = "reasoning";
}

pub mod content_type {
    pub const OUTPUT_TEXT: &str = "output_text";
    pub const REFUSAL: &str = "refusal";
}

/// Values of the `type` field on streamed events.
pub mod event_type {
    pub const CREATED: &str = "response.created";
    pub const QUEUED: &str = "response.queued";
    pub const IN_PROGRESS: &str = "response.in_progress";
    pub const COMPLETED: &str = "response.completed";
    pub const FAILED: &str = "response.failed";
    pub const INCOMPLETE: &str = "response.incomplete";
    pub const OUTPUT_ITEM_ADDED: &str = "response.output_item.added";
    pub const OUTPUT_ITEM_DONE: &str = "response.output_item.done";
    pub const OUTPUT_TEXT_DELTA: &str = "response.output_text.delta";
    pub const OUTPUT_TEXT_DONE: &str = "response.output_text.done";
    pub const REFUSAL_DELTA: &str = "response.refusal.delta";
    pub const REFUSAL_DONE: &str = "response.refusal.done";
    pub const FUNCTION_CALL_ARGUMENTS_DELTA: &str = "response.function_call_arguments.delta";
    pub const FUNCTION_CALL_ARGUMENTS_DONE: &str = "response.function_call_arguments.done";
    pub const REASONING_TEXT_DONE: &str = "response.reasoning_text.done";
    pub const AUDIO_TRANSCRIPT_DONE: &str = "response.audio.transcript.done";
    pub const FILE_SEARCH_CALL_COMPLETED: &str = "response.file_search_call.completed";
    pub const WEB_SEARCH_CALL_COMPLETED: &str = "response.web_search_call.completed";
    pub const CODE_INTERPRETER_CALL_COMPLETED: &str = "response.code_interpreter_call.completed";
    pub const ERROR: &str = "error";
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Incomplete,
    Cancelled,
    #[serde(other)]
    Other,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ResponseError {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

/// One content block of a message output item. An empty `kind` marks a
/// placeholder block created while folding deltas.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub refusal: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<Value>,
}

/// One entry of `Response::output`. Fields not used by a given item kind stay empty.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct OutputItem {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub role: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentPart>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub call_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub arguments: String,
}

impl OutputItem {
    pub fn is_function_call(&self) -> bool {
        self.kind == item_type::FUNCTION_CALL
    }

    /// Concatenated text of this item's `output_text` blocks.
    pub fn output_text(&self) -> String {
        self.content
            .iter()
            .filter(|c| c.kind == content_type::OUTPUT_TEXT)
            .map(|c| c.text.as_str())
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Response {
    pub id: String,
    pub model: String,
    pub created_at: Option<f64>,
    pub status: Option<ResponseStatus>,
    pub error: Option<ResponseError>,
    pub output: Vec<OutputItem>,
    pub usage: Option<Usage>,
}

impl Response {
    /// Message of the persisted error, or `""`.
    pub fn error_message(&self) -> &str {
        self.error.as_ref().map(|e| e.message.as_str()).unwrap_or_default()
    }
}

// ---- request side ----

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Developer,
    #[default]
    User,
    Assistant,
}

/// Shorthand input message without a `type` field.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct EasyInputMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct InputMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum InputItem {
    Easy(EasyInputMessage),
    Message(InputMessage),
}

impl Default for InputItem {
    fn default() -> Self {
        Self::Easy(EasyInputMessage::default())
    }
}

impl Polymorphic for InputItem {
    fn union_spec() -> &'static UnionSpec<Self> {
        static SPEC: Lazy<UnionSpec<InputItem>> = Lazy::new(|| {
            UnionSpec::tagged("InputItem", "type")
                .shape(InputItem::Easy)
                .variant(item_type::MESSAGE, InputItem::Message)
                .build()
        });
        &SPEC
    }
}

impl<'de> Deserialize<'de> for InputItem {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_union(deserializer)
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Input {
    Text(String),
    Items(Vec<InputItem>),
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CreateResponseRequest {
    pub model: String,
    pub input: Input,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    pub stream: bool,
}

impl CreateResponseRequest {
    pub fn streaming(model: impl Into<String>, input: Input) -> Self {
        Self {
            model: model.into(),
            input,
            instructions: None,
            temperature: None,
            max_output_tokens: None,
            stream: true,
        }
    }
}

// ---- streamed events ----

/// Carries a full response snapshot (`response.created`, `.completed`, ...).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct LifecycleEvent {
    pub response: Response,
    pub sequence_number: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct OutputItemEvent {
    pub output_index: usize,
    pub item: OutputItem,
    pub sequence_number: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct TextDeltaEvent {
    pub item_id: String,
    pub output_index: usize,
    pub content_index: usize,
    pub delta: String,
    pub sequence_number: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct TextDoneEvent {
    pub item_id: String,
    pub output_index: usize,
    pub content_index: usize,
    pub text: String,
    pub sequence_number: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct RefusalDoneEvent {
    pub item_id: String,
    pub output_index: usize,
    pub content_index: usize,
    pub refusal: String,
    pub sequence_number: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct ArgumentsDoneEvent {
    pub item_id: String,
    pub output_index: usize,
    pub arguments: String,
    pub name: String,
    pub sequence_number: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct AudioTranscriptDoneEvent {
    pub sequence_number: u64,
}

/// Completion of a built-in tool call.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct ToolCallEvent {
    pub item_id: String,
    pub output_index: usize,
    pub sequence_number: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct ErrorEvent {
    pub code: Option<String>,
    pub message: String,
    pub param: Option<String>,
    pub sequence_number: u64,
}

/// Every event a streamed response can carry. Kinds this crate does not know
/// decode to `Unknown` so newer servers never break the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseStreamEvent {
    Created(LifecycleEvent),
    Queued(LifecycleEvent),
    InProgress(LifecycleEvent),
    Completed(LifecycleEvent),
    Failed(LifecycleEvent),
    Incomplete(LifecycleEvent),
    OutputItemAdded(OutputItemEvent),
    OutputItemDone(OutputItemEvent),
    OutputTextDelta(TextDeltaEvent),
    OutputTextDone(TextDoneEvent),
    RefusalDelta(TextDeltaEvent),
    RefusalDone(RefusalDoneEvent),
    FunctionCallArgumentsDelta(TextDeltaEvent),
    FunctionCallArgumentsDone(ArgumentsDoneEvent),
    ReasoningTextDone(TextDoneEvent),
    AudioTranscriptDone(AudioTranscriptDoneEvent),
    FileSearchCallCompleted(ToolCallEvent),
    WebSearchCallCompleted(ToolCallEvent),
    CodeInterpreterCallCompleted(ToolCallEvent),
    Error(ErrorEvent),
    Unknown { kind: String, raw: Value },
}

impl Default for ResponseStreamEvent {
    fn default() -> Self {
        Self::Unknown {
            kind: String::new(),
            raw: Value::Null,
        }
    }
}

impl ResponseStreamEvent {
    fn unknown(raw: Value) -> Self {
        let kind = raw
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self::Unknown { kind, raw }
    }

    /// The wire `type` of this event.
    pub fn kind(&self) -> &str {
        use event_type::*;
        match self {
            Self::Created(_) => CREATED,
            Self::Queued(_) => QUEUED,
            Self::InProgress(_) => IN_PROGRESS,
            Self::Completed(_) => COMPLETED,
            Self::Failed(_) => FAILED,
            Self::Incomplete(_) => INCOMPLETE,
            Self::OutputItemAdded(_) => OUTPUT_ITEM_ADDED,
            Self::OutputItemDone(_) => OUTPUT_ITEM_DONE,
            Self::OutputTextDelta(_) => OUTPUT_TEXT_DELTA,
            Self::OutputTextDone(_) => OUTPUT_TEXT_DONE,
            Self::RefusalDelta(_) => REFUSAL_DELTA,
            Self::RefusalDone(_) => REFUSAL_DONE,
            Self::FunctionCallArgumentsDelta(_) => FUNCTION_CALL_ARGUMENTS_DELTA,
            Self::FunctionCallArgumentsDone(_) => FUNCTION_CALL_ARGUMENTS_DONE,
            Self::ReasoningTextDone(_) => REASONING_TEXT_DONE,
            Self::AudioTranscriptDone(_) => AUDIO_TRANSCRIPT_DONE,
            Self::FileSearchCallCompleted(_) => FILE_SEARCH_CALL_COMPLETED,
            Self::WebSearchCallCompleted(_) => WEB_SEARCH_CALL_COMPLETED,
            Self::CodeInterpreterCallCompleted(_) => CODE_INTERPRETER_CALL_COMPLETED,
            Self::Error(_) => ERROR,
            Self::Unknown { kind, .. } => kind.as_str(),
        }
    }
}

impl Polymorphic for ResponseStreamEvent {
    // Known kinds are tag-only: several event records have no required
    // fields and would structurally accept any payload.
    fn union_spec() -> &'static UnionSpec<Self> {
        use event_type::*;
        use ResponseStreamEvent as E;
        static SPEC: Lazy<UnionSpec<ResponseStreamEvent>> = Lazy::new(|| {
            UnionSpec::tagged("ResponseStreamEvent", "type")
                .exact(CREATED, E::Created)
                .exact(QUEUED, E::Queued)
                .exact(IN_PROGRESS, E::InProgress)
                .exact(COMPLETED, E::Completed)
                .exact(FAILED, E::Failed)
                .exact(INCOMPLETE, E::Incomplete)
                .exact(OUTPUT_ITEM_ADDED, E::OutputItemAdded)
                .exact(OUTPUT_ITEM_DONE, E::OutputItemDone)
                .exact(OUTPUT_TEXT_DELTA, E::OutputTextDelta)
                .exact(OUTPUT_TEXT_DONE, E::OutputTextDone)
                .exact(REFUSAL_DELTA, E::RefusalDelta)
                .exact(REFUSAL_DONE, E::RefusalDone)
                .exact(FUNCTION_CALL_ARGUMENTS_DELTA, E::FunctionCallArgumentsDelta)
                .exact(FUNCTION_CALL_ARGUMENTS_DONE, E::FunctionCallArgumentsDone)
                .exact(REASONING_TEXT_DONE, E::ReasoningTextDone)
                .exact(AUDIO_TRANSCRIPT_DONE, E::AudioTranscriptDone)
                .exact(FILE_SEARCH_CALL_COMPLETED, E::FileSearchCallCompleted)
                .exact(WEB_SEARCH_CALL_COMPLETED, E::WebSearchCallCompleted)
                .exact(CODE_INTERPRETER_CALL_COMPLETED, E::CodeInterpreterCallCompleted)
                .exact(ERROR, E::Error)
                .catch_all(E::unknown)
                .build()
        });
        &SPEC
    }
}

impl<'de> Deserialize<'de> for ResponseStreamEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserialize_union(deserializer)
    }
}
