//! Folds streamed response events into one growing [`Response`].
//!
//! Every call to [`ResponseAccumulator::fold`] replaces the transient [`Edge`]
//! wholesale, so the `just_*` queries only ever describe the most recent event.
//! The output list grows in place to fit whatever position an event names and
//! never shrinks; call indices are handed out in first-seen order and never reused.

use std::collections::HashMap;

use tracing::debug;

use crate::responses::{
    ContentPart, OutputItem, Response, ResponseStatus, ResponseStreamEvent, content_type,
};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FinishedText {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FinishedToolCall {
    pub item_id: String,
    /// Call id recorded when the item was added, or the item id if it never was.
    pub call_id: String,
    pub index: usize,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FinishedRefusal {
    pub refusal: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FinishedReasoning {
    pub text: String,
}

/// The transcript-done event carries no text, so `transcript` is currently always empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FinishedAudioTranscript {
    pub transcript: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FinishedFileSearch {
    pub call_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FinishedWebSearch {
    pub call_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FinishedCodeInterpreter {
    pub item_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FinishedError {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddedFunctionCall {
    pub item_id: String,
    pub call_id: String,
    pub index: usize,
    pub name: String,
    pub output_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FunctionCallDelta {
    pub index: usize,
    pub delta: String,
    pub output_index: usize,
}

/// What was recorded about a function call when its output item was added.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FunctionCallMeta {
    pub call_id: String,
    pub name: String,
    pub index: usize,
    pub output_index: usize,
}

/// What the most recent fold produced, if anything worth reacting to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Edge {
    #[default]
    None,
    TextDone(FinishedText),
    /// Running refusal fragment. Not persisted on the response.
    RefusalDelta(String),
    RefusalDone(FinishedRefusal),
    FunctionCallAdded(AddedFunctionCall),
    FunctionCallDelta(FunctionCallDelta),
    FunctionCallArgsDone(FinishedToolCall),
    ReasoningDone(FinishedReasoning),
    AudioTranscriptDone(FinishedAudioTranscript),
    FileSearchCompleted(FinishedFileSearch),
    WebSearchCompleted(FinishedWebSearch),
    CodeInterpreterCompleted(FinishedCodeInterpreter),
    OutputItemDone,
    Error(FinishedError),
}

#[derive(Debug, Clone, Default)]
pub struct ResponseAccumulator {
    response: Response,
    call_indices: HashMap<String, usize>,
    call_meta: HashMap<String, FunctionCallMeta>,
    next_index: usize,
    edge: Edge,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Incorporate one event. Unknown event kinds are accepted as no-ops.
    ///
    /// Returns `false` only on an internal mismatch; no current event kind
    /// produces one.
    pub fn fold(&mut self, event: &ResponseStreamEvent) -> bool {
        use ResponseStreamEvent as E;

        self.edge = Edge::None;
        match event {
            E::Created(ev)
            | E::Queued(ev)
            | E::InProgress(ev)
            | E::Completed(ev)
            | E::Incomplete(ev) => {
                self.response = ev.response.clone();
            }
            E::Failed(ev) => {
                self.response = ev.response.clone();
                self.edge = Edge::Error(FinishedError {
                    message: self.response.error_message().to_string(),
                });
            }
            E::OutputItemAdded(ev) => {
                let item = &ev.item;
                if item.is_function_call() {
                    let index = self.assign_index(&item.id);
                    self.call_meta.insert(
                        item.id.clone(),
                        FunctionCallMeta {
                            call_id: item.call_id.clone(),
                            name: item.name.clone(),
                            index,
                            output_index: ev.output_index,
                        },
                    );
                    self.edge = Edge::FunctionCallAdded(AddedFunctionCall {
                        item_id: item.id.clone(),
                        call_id: item.call_id.clone(),
                        index,
                        name: item.name.clone(),
                        output_index: ev.output_index,
                    });
                }
                self.response.output.push(item.clone());
            }
            E::OutputItemDone(_) => self.edge = Edge::OutputItemDone,
            E::OutputTextDelta(ev) => {
                self.text_block(ev.output_index).text.push_str(&ev.delta);
            }
            E::OutputTextDone(ev) => {
                let block = self.text_block(ev.output_index);
                block.kind = content_type::OUTPUT_TEXT.to_string();
                block.text = ev.text.clone();
                self.edge = Edge::TextDone(FinishedText {
                    text: ev.text.clone(),
                });
            }
            E::RefusalDelta(ev) => self.edge = Edge::RefusalDelta(ev.delta.clone()),
            E::RefusalDone(ev) => {
                self.edge = Edge::RefusalDone(FinishedRefusal {
                    refusal: ev.refusal.clone(),
                })
            }
            E::FunctionCallArgumentsDelta(ev) => {
                // a delta ahead of its item-added event has nothing to attach to
                if let Some(meta) = self.call_meta.get(&ev.item_id) {
                    self.edge = Edge::FunctionCallDelta(FunctionCallDelta {
                        index: meta.index,
                        delta: ev.delta.clone(),
                        output_index: meta.output_index,
                    });
                } else if let Some(&index) = self.call_indices.get(&ev.item_id) {
                    self.edge = Edge::FunctionCallDelta(FunctionCallDelta {
                        index,
                        delta: ev.delta.clone(),
                        output_index: ev.output_index,
                    });
                }
            }
            E::FunctionCallArgumentsDone(ev) => {
                let index = self.assign_index(&ev.item_id);
                let (call_id, mut name) = match self.call_meta.get(&ev.item_id) {
                    Some(meta) => (meta.call_id.clone(), meta.name.clone()),
                    None => (ev.item_id.clone(), String::new()),
                };
                if !ev.name.is_empty() {
                    name = ev.name.clone();
                }
                if let Some(item) = self.response.output.get_mut(ev.output_index)
                    && item.id == ev.item_id
                    && item.is_function_call()
                {
                    item.arguments = ev.arguments.clone();
                }
                self.edge = Edge::FunctionCallArgsDone(FinishedToolCall {
                    item_id: ev.item_id.clone(),
                    call_id,
                    index,
                    name,
                    arguments: ev.arguments.clone(),
                });
            }
            E::ReasoningTextDone(ev) => {
                self.edge = Edge::ReasoningDone(FinishedReasoning {
                    text: ev.text.clone(),
                })
            }
            E::AudioTranscriptDone(_) => {
                self.edge = Edge::AudioTranscriptDone(FinishedAudioTranscript::default())
            }
            E::FileSearchCallCompleted(ev) => {
                self.edge = Edge::FileSearchCompleted(FinishedFileSearch {
                    call_id: ev.item_id.clone(),
                })
            }
            E::WebSearchCallCompleted(ev) => {
                self.edge = Edge::WebSearchCompleted(FinishedWebSearch {
                    call_id: ev.item_id.clone(),
                })
            }
            E::CodeInterpreterCallCompleted(ev) => {
                self.edge = Edge::CodeInterpreterCompleted(FinishedCodeInterpreter {
                    item_id: ev.item_id.clone(),
                })
            }
            E::Error(ev) => {
                self.edge = Edge::Error(FinishedError {
                    message: ev.message.clone(),
                })
            }
            E::Unknown { kind, .. } => {
                debug!(event.kind = kind.as_str(), "ignoring unknown stream event");
            }
        }
        true
    }

    /// The edge set by the most recent fold.
    pub fn edge(&self) -> &Edge {
        &self.edge
    }

    pub fn just_finished_text(&self) -> Option<FinishedText> {
        match &self.edge {
            Edge::TextDone(t) => Some(t.clone()),
            _ => None,
        }
    }

    pub fn just_finished_tool_call(&self) -> Option<FinishedToolCall> {
        match &self.edge {
            Edge::FunctionCallArgsDone(t) => Some(t.clone()),
            _ => None,
        }
    }

    pub fn just_finished_refusal(&self) -> Option<FinishedRefusal> {
        match &self.edge {
            Edge::RefusalDone(r) => Some(r.clone()),
            _ => None,
        }
    }

    /// Fragment carried by a refusal delta folded just now.
    pub fn just_refusal_delta(&self) -> Option<&str> {
        match &self.edge {
            Edge::RefusalDelta(fragment) => Some(fragment),
            _ => None,
        }
    }

    pub fn just_finished_reasoning(&self) -> Option<FinishedReasoning> {
        match &self.edge {
            Edge::ReasoningDone(r) => Some(r.clone()),
            _ => None,
        }
    }

    pub fn just_finished_audio_transcript(&self) -> Option<FinishedAudioTranscript> {
        match &self.edge {
            Edge::AudioTranscriptDone(a) => Some(a.clone()),
            _ => None,
        }
    }

    pub fn just_finished_file_search(&self) -> Option<FinishedFileSearch> {
        match &self.edge {
            Edge::FileSearchCompleted(f) => Some(f.clone()),
            _ => None,
        }
    }

    pub fn just_finished_web_search(&self) -> Option<FinishedWebSearch> {
        match &self.edge {
            Edge::WebSearchCompleted(w) => Some(w.clone()),
            _ => None,
        }
    }

    pub fn just_finished_code_interpreter(&self) -> Option<FinishedCodeInterpreter> {
        match &self.edge {
            Edge::CodeInterpreterCompleted(c) => Some(c.clone()),
            _ => None,
        }
    }

    /// An error folded just now, or else the error persisted on the response.
    /// The fallback keeps a failed snapshot observable after its edge has passed.
    pub fn just_finished_error(&self) -> Option<FinishedError> {
        if let Edge::Error(e) = &self.edge
            && !e.message.is_empty()
        {
            return Some(e.clone());
        }
        let persisted = self.response.error_message();
        if persisted.is_empty() {
            return None;
        }
        Some(FinishedError {
            message: persisted.to_string(),
        })
    }

    pub fn just_added_function_call(&self) -> Option<AddedFunctionCall> {
        match &self.edge {
            Edge::FunctionCallAdded(a) => Some(a.clone()),
            _ => None,
        }
    }

    pub fn just_delta_function_call(&self) -> Option<FunctionCallDelta> {
        match &self.edge {
            Edge::FunctionCallDelta(d) => Some(d.clone()),
            _ => None,
        }
    }

    /// Index assigned to a call's item id, or `None` if it was never seen.
    pub fn get_tool_call_index(&self, item_id: &str) -> Option<usize> {
        self.call_indices.get(item_id).copied()
    }

    pub fn get_function_call_meta(&self, item_id: &str) -> Option<&FunctionCallMeta> {
        self.call_meta.get(item_id)
    }

    pub fn is_complete(&self) -> bool {
        self.response.status == Some(ResponseStatus::Completed)
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn into_response(self) -> Response {
        self.response
    }

    /// Text of every `output_text` block across all output items.
    pub fn output_text(&self) -> String {
        self.response
            .output
            .iter()
            .map(OutputItem::output_text)
            .collect()
    }

    fn assign_index(&mut self, item_id: &str) -> usize {
        if let Some(&index) = self.call_indices.get(item_id) {
            return index;
        }
        let index = self.next_index;
        self.next_index += 1;
        self.call_indices.insert(item_id.to_string(), index);
        index
    }

    /// The block text deltas land in for the item at `position`: the first
    /// `output_text` or untyped block, created if the item has none.
    fn text_block(&mut self, position: usize) -> &mut ContentPart {
        let output = &mut self.response.output;
        expand_to_fit(output, position);
        let content = &mut output[position].content;
        let found = content
            .iter()
            .position(|c| c.kind.is_empty() || c.kind == content_type::OUTPUT_TEXT);
        let at = match found {
            Some(at) => at,
            None => {
                content.push(ContentPart::default());
                content.len() - 1
            }
        };
        &mut content[at]
    }
}

/// Grow `items` with empty placeholders until `index` is addressable.
/// Existing entries are never moved or replaced.
fn expand_to_fit<T: Default>(items: &mut Vec<T>, index: usize) {
    if index >= items.len() {
        items.resize_with(index + 1, T::default);
    }
}
