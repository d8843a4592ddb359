//! Stamped Opus wire format.
//!
//! `[version(1B) | timestamp(7B big-endian ms) | opus frame (>= 1B)]`
//!
//! The version byte is `0x01`; the timestamp is the low 7 bytes of an 8-byte
//! big-endian `u64` of milliseconds since the Unix epoch.

use talkbox_audio::opus::Frame;
use thiserror::Error;

use super::jitter::Timestamped;

/// Milliseconds since the Unix epoch.
pub type EpochMillis = i64;

/// Current wire format version.
const WIRE_VERSION: u8 = 0x01;

/// Header size: version byte plus 7 timestamp bytes.
const HEADER_SIZE: usize = 8;

/// Why a stamped frame failed to parse. Invalid frames are dropped
/// silently by the ingress; the kinds only feed statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("truncated stamped frame")]
    Truncated,
    #[error("unsupported stamped frame version")]
    BadVersion,
    #[error("empty frame payload")]
    EmptyPayload,
}

/// An Opus frame with its capture timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct StampedFrame {
    pub frame: Frame,
    pub stamp: EpochMillis,
}

impl Timestamped<EpochMillis> for StampedFrame {
    fn timestamp(&self) -> EpochMillis {
        self.stamp
    }
}

/// Parses one stamped frame from wire bytes.
pub fn parse_stamped(data: &[u8]) -> Result<StampedFrame, WireError> {
    if data.len() < HEADER_SIZE {
        return Err(WireError::Truncated);
    }
    if data[0] != WIRE_VERSION {
        return Err(WireError::BadVersion);
    }
    if data.len() == HEADER_SIZE {
        return Err(WireError::EmptyPayload);
    }

    let mut ts = [0u8; 8];
    ts[1..].copy_from_slice(&data[1..8]);
    let stamp = i64::from_be_bytes(ts);

    Ok(StampedFrame {
        frame: Frame::from_slice(&data[HEADER_SIZE..]),
        stamp,
    })
}

/// Encodes a frame and timestamp into wire bytes.
pub fn make_stamped(frame: &Frame, stamp: EpochMillis) -> Vec<u8> {
    let ts = (stamp as u64).to_be_bytes();
    let mut out = Vec::with_capacity(HEADER_SIZE + frame.len());
    out.push(WIRE_VERSION);
    out.extend_from_slice(&ts[1..]);
    out.extend_from_slice(frame.as_bytes());
    out
}
