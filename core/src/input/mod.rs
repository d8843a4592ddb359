//! Real-time audio ingress: timestamped Opus replay, OGG demux, raw frame
//! pass-through.

mod jitter;
mod ogg;
mod raw;
mod stamped;
mod wire;

pub use jitter::{JitterBuffer, Timestamped};
pub use ogg::OggOpusStream;
pub use raw::{OpusFrameStream, OpusReader};
pub use stamped::{IngressStats, StampedConfig, StampedOpusStream, StampedReader};
pub use wire::{EpochMillis, StampedFrame, WireError, make_stamped, parse_stamped};

use thiserror::Error;

/// Ingress-layer error conditions.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("ogg decode error: {0}")]
    OggDecode(String),

    #[error("no opus packets found")]
    NoOpusPackets,

    #[error("stream closed")]
    StreamClosed,
}
