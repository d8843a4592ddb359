//! Core stream data model: roles, parts, chunks, and control markers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::tool::FuncTool;

/// Canonical MIME tags used across the pipeline.
pub mod mime {
    pub const AUDIO_PCM: &str = "audio/pcm";
    pub const AUDIO_MPEG: &str = "audio/mpeg";
    pub const AUDIO_MP3: &str = "audio/mp3";
    pub const AUDIO_OGG: &str = "audio/ogg";
    pub const AUDIO_WAV: &str = "audio/wav";
    pub const AUDIO_OPUS: &str = "audio/opus";
    pub const TEXT_PLAIN: &str = "text/plain";
}

/// Producer identity of a message or chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// Opaque binary payload with a MIME tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// One content fragment. `Clone` deep-copies blob data; chunks never share
/// byte buffers across consumers.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    Blob(Blob),
}

impl Part {
    pub fn text(s: impl Into<String>) -> Self {
        Part::Text(s.into())
    }

    pub fn blob(mime_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Part::Blob(Blob {
            mime_type: mime_type.into(),
            data: data.into(),
        })
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Part::Text(_))
    }

    pub fn is_blob(&self) -> bool {
        matches!(self, Part::Blob(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_blob(&self) -> Option<&Blob> {
        match self {
            Part::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// The MIME tag of this part; text parts map to `text/plain`.
    pub fn mime_type(&self) -> &str {
        match self {
            Part::Text(_) => mime::TEXT_PLAIN,
            Part::Blob(b) => &b.mime_type,
        }
    }
}

/// Per-chunk control data carried alongside the payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamCtrl {
    /// Correlates chunks of one logical sub-stream.
    pub stream_id: String,
    /// Free-form annotation, e.g. a speaker label (`voice:A3F8`).
    pub label: String,
    /// Marks the first chunk of a sub-stream.
    pub begin_of_stream: bool,
    /// Marks the sub-stream boundary; the chunk carries an empty part of
    /// the sub-stream's MIME.
    pub end_of_stream: bool,
    /// Capture timestamp in milliseconds since the Unix epoch, when known.
    pub timestamp_ms: i64,
}

/// A function invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncCall {
    pub name: String,
    /// JSON-encoded arguments.
    pub arguments: String,
}

impl FuncCall {
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    pub fn parse_args<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.arguments)
    }
}

/// A tool call with its streaming bookkeeping.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    /// Position in a streamed batch of calls.
    pub index: i64,
    pub func_call: FuncCall,
    /// Resolved definition, patched in by the stream builder from the
    /// originating model context. Not part of the wire form.
    pub tool: Option<Arc<FuncTool>>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, func_call: FuncCall) -> Self {
        Self {
            id: id.into(),
            index: 0,
            func_call,
            tool: None,
        }
    }
}

impl PartialEq for ToolCall {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.index == other.index && self.func_call == other.func_call
    }
}

/// The result of executing a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub result: String,
}

impl ToolResult {
    pub fn new(id: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            result: result.into(),
        }
    }
}

/// Message payload for generator input.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Contents(Vec<Part>),
    ToolCall(ToolCall),
    ToolResult(ToolResult),
}

impl Payload {
    pub fn text(s: impl Into<String>) -> Self {
        Payload::Contents(vec![Part::text(s)])
    }

    pub fn blob(mime_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Payload::Contents(vec![Part::blob(mime_type, data)])
    }

    pub fn is_contents(&self) -> bool {
        matches!(self, Payload::Contents(_))
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self, Payload::ToolCall(_))
    }

    pub fn is_tool_result(&self) -> bool {
        matches!(self, Payload::ToolResult(_))
    }

    pub fn as_contents(&self) -> Option<&[Part]> {
        match self {
            Payload::Contents(c) => Some(c),
            _ => None,
        }
    }
}

/// A complete message in a conversation history.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub name: Option<String>,
    pub payload: Payload,
}

impl Message {
    pub fn new(role: Role, payload: Payload) -> Self {
        Self {
            role,
            name: None,
            payload,
        }
    }

    pub fn with_name(role: Role, name: impl Into<String>, payload: Payload) -> Self {
        Self {
            role,
            name: Some(name.into()),
            payload,
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::new(Role::User, Payload::text(text))
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self::new(Role::Model, Payload::text(text))
    }
}

/// The stream atom: one fragment of one message.
///
/// Exactly one of `part` / `tool_call` is populated, except for control
/// markers where `part` is the empty carrier of a MIME type.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageChunk {
    pub role: Role,
    pub name: Option<String>,
    pub part: Option<Part>,
    pub tool_call: Option<ToolCall>,
    pub ctrl: Option<StreamCtrl>,
}

impl MessageChunk {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            name: None,
            part: Some(Part::text(text)),
            tool_call: None,
            ctrl: None,
        }
    }

    pub fn blob(role: Role, mime_type: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            role,
            name: None,
            part: Some(Part::blob(mime_type, data)),
            tool_call: None,
            ctrl: None,
        }
    }

    pub fn tool_call(role: Role, tool_call: ToolCall) -> Self {
        Self {
            role,
            name: None,
            part: None,
            tool_call: Some(tool_call),
            ctrl: None,
        }
    }

    /// A begin-of-stream marker carrying a sub-stream id.
    pub fn new_begin_of_stream(stream_id: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            name: None,
            part: None,
            tool_call: None,
            ctrl: Some(StreamCtrl {
                stream_id: stream_id.into(),
                begin_of_stream: true,
                ..Default::default()
            }),
        }
    }

    /// An end-of-stream marker for the given MIME: an empty part of that
    /// type with `ctrl.end_of_stream` set.
    pub fn new_end_of_stream(mime_type: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        let part = if mime_type == mime::TEXT_PLAIN {
            Part::Text(String::new())
        } else {
            Part::blob(mime_type, Vec::<u8>::new())
        };
        Self {
            role: Role::User,
            name: None,
            part: Some(part),
            tool_call: None,
            ctrl: Some(StreamCtrl {
                end_of_stream: true,
                ..Default::default()
            }),
        }
    }

    /// An end-of-stream marker for `text/plain`.
    pub fn new_text_end_of_stream() -> Self {
        Self::new_end_of_stream(mime::TEXT_PLAIN)
    }

    /// True when `ctrl.begin_of_stream` is set. Null-safe.
    pub fn is_begin_of_stream(&self) -> bool {
        self.ctrl.as_ref().is_some_and(|c| c.begin_of_stream)
    }

    /// True when `ctrl.end_of_stream` is set. Null-safe.
    pub fn is_end_of_stream(&self) -> bool {
        self.ctrl.as_ref().is_some_and(|c| c.end_of_stream)
    }

    /// The stream id carried by this chunk, when any.
    pub fn stream_id(&self) -> Option<&str> {
        self.ctrl
            .as_ref()
            .map(|c| c.stream_id.as_str())
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_display() {
        assert_eq!(Role::User.to_string(), "user");
        assert_eq!(Role::Model.to_string(), "model");
        assert_eq!(Role::Tool.to_string(), "tool");
    }

    #[test]
    fn part_accessors() {
        let text = Part::text("hi");
        assert!(text.is_text());
        assert_eq!(text.as_text(), Some("hi"));
        assert_eq!(text.mime_type(), mime::TEXT_PLAIN);

        let blob = Part::blob(mime::AUDIO_PCM, vec![1, 2]);
        assert!(blob.is_blob());
        assert_eq!(blob.mime_type(), mime::AUDIO_PCM);
    }

    #[test]
    fn clone_deep_copies_blob_data() {
        let chunk = MessageChunk::blob(Role::User, mime::AUDIO_PCM, vec![1, 2, 3]);
        let mut copy = chunk.clone();
        if let Some(Part::Blob(b)) = &mut copy.part {
            b.data[0] = 9;
        }
        assert_eq!(
            chunk.part.as_ref().unwrap().as_blob().unwrap().data,
            vec![1, 2, 3]
        );
    }

    #[test]
    fn control_markers() {
        let bos = MessageChunk::new_begin_of_stream("s1");
        assert!(bos.is_begin_of_stream());
        assert!(!bos.is_end_of_stream());
        assert_eq!(bos.stream_id(), Some("s1"));

        let eos = MessageChunk::new_end_of_stream(mime::AUDIO_OGG);
        assert!(eos.is_end_of_stream());
        let blob = eos.part.as_ref().unwrap().as_blob().unwrap();
        assert_eq!(blob.mime_type, mime::AUDIO_OGG);
        assert!(blob.data.is_empty());

        let text_eos = MessageChunk::new_text_end_of_stream();
        assert_eq!(text_eos.part.as_ref().unwrap().as_text(), Some(""));
        assert!(text_eos.is_end_of_stream());
    }

    #[test]
    fn predicates_are_null_safe() {
        let plain = MessageChunk::text(Role::Model, "x");
        assert!(!plain.is_begin_of_stream());
        assert!(!plain.is_end_of_stream());
        assert_eq!(plain.stream_id(), None);
    }

    #[test]
    fn func_call_parse_args() {
        #[derive(Deserialize)]
        struct Args {
            q: String,
        }
        let fc = FuncCall::new("search", r#"{"q":"rust"}"#);
        let args: Args = fc.parse_args().unwrap();
        assert_eq!(args.q, "rust");
    }
}
