//! Stateful stream transformers and their dispatch mux.
//!
//! Every transformer follows the lifecycle contract documented on
//! [`crate::transformer::Transformer`]; concrete provider clients plug in
//! through the session traits each module defines ([`tts::TtsProvider`],
//! [`asr::AsrBackend`], [`realtime::RealtimeConnector`]).

pub mod asr;
pub mod codec;
pub mod mux;
pub mod realtime;
pub mod tts;
pub mod voiceprint;

pub use asr::{AsrBackend, AsrOptions, AsrResult, AsrSession, AsrTransformer, AsrUtterance};
pub use codec::{Mp3ToOggConfig, Mp3ToOggTransformer};
pub use mux::{AsrStreamSession, TransformerMux, TtsSession, default_mux};
pub use realtime::{
    RealtimeConnector, RealtimeEvent, RealtimeHandle, RealtimeOptions, RealtimeSession,
    RealtimeTransformer,
};
pub use tts::{AudioSink, TtsOptions, TtsProvider, TtsTransformer};
pub use voiceprint::{VoiceprintConfig, VoiceprintTransformer};
