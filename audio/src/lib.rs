//! Codec plumbing for talkbox audio streams.
//!
//! - [`opus`]: RFC 6716 TOC parsing and frame duration derivation; the
//!   native encoder behind the `libopus` feature.
//! - [`ogg`]: RFC 3533 container writing and packet-oriented reading with
//!   OpusHead/OpusTags awareness.
//! - [`mp3`]: MP3 decoding to interleaved PCM16 via symphonia.

pub mod mp3;
pub mod ogg;
pub mod opus;

mod error;

pub use error::AudioError;
