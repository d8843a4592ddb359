//! Real-time multimodal streaming core.
//!
//! This crate shuttles audio, text, and tool-call events between
//! microphones, cloud speech providers, on-device speaker inference, and
//! downstream agents. The pieces:
//!
//! - [`types`]: the stream data model: [`MessageChunk`], parts, roles,
//!   and in-band control markers (BOS/EoS).
//! - [`stream`]: the producer/consumer contract: [`Stream`],
//!   [`StreamBuilder`], and terminal [`State`] reporting.
//! - [`stream_utils`] / [`tee`] / [`stream_iter`]: split, merge,
//!   interleave, composite sequencing, mirroring, and byte-oriented
//!   demultiplexing.
//! - [`input`]: timestamped Opus ingress with jitter buffering, silence
//!   synthesis and resync, OGG demuxing, and raw frame pass-through.
//! - [`transformer`] / [`transformers`]: trie-dispatched stream
//!   converters (TTS, ASR, realtime dialogue, MP3 to OGG transcoding,
//!   speaker annotation) plus TTS/ASR session facades.
//! - [`context`] / [`tool`] / [`modelcontexts`]: the model-context builder
//!   consumed by external generators.
//!
//! Concrete cloud wire protocols live outside this crate; transformers are
//! written against session traits their clients implement.

pub mod context;
pub mod error;
pub mod input;
pub mod modelcontexts;
pub mod stream;
pub mod stream_id;
pub mod stream_iter;
pub mod stream_utils;
pub mod tee;
pub mod tool;
pub mod transformer;
pub mod transformers;
pub mod types;

pub use context::{ModelContext, ModelContextBuilder, ModelParams, MultiModelContext, Prompt};
pub use error::{CoreError, State, Status, Usage};
pub use stream::{BuiltStream, Stream, StreamBuilder, StreamEvent, collect_chunks, collect_text};
pub use stream_id::new_stream_id;
pub use stream_iter::{ByteStream, ByteStreamKey, StreamIter};
pub use stream_utils::{
    Matcher, channel_stream, composite_seq, merge, merge_interleaved, mime_type_matcher, split,
};
pub use tee::{TeeStream, tee};
pub use tool::{AnyTool, FuncTool, Tool};
pub use transformer::Transformer;
pub use transformers::{TransformerMux, default_mux};
pub use types::{
    Blob, FuncCall, Message, MessageChunk, Part, Payload, Role, StreamCtrl, ToolCall, ToolResult,
    mime,
};
