//! Speaker detection result types.

use std::fmt;

/// Classification of the current speech window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakerStatus {
    /// The hash window is unstable; no speaker can be named.
    Unknown,
    /// One dominant speaker.
    Single,
    /// Two speakers share the window (overlapping speech or a hand-off).
    Overlap,
}

impl fmt::Display for SpeakerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Single => write!(f, "single"),
            Self::Overlap => write!(f, "overlap"),
        }
    }
}

/// One detector verdict over the current sliding window.
#[derive(Debug, Clone)]
pub struct Detection {
    pub status: SpeakerStatus,
    /// Primary voice label (`voice:A3F8`); empty when status is Unknown.
    pub speaker: String,
    /// Labels in contention: one for Single, two for Overlap, none for
    /// Unknown.
    pub candidates: Vec<String>,
    /// Window stability in [0, 1].
    pub confidence: f32,
}

/// Renders a voice hash as a stream label: `voice:<HASH>`.
pub fn voice_label(hash: &str) -> String {
    format!("voice:{hash}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        assert_eq!(SpeakerStatus::Unknown.to_string(), "unknown");
        assert_eq!(SpeakerStatus::Single.to_string(), "single");
        assert_eq!(SpeakerStatus::Overlap.to_string(), "overlap");
    }

    #[test]
    fn label_format() {
        assert_eq!(voice_label("A3F8"), "voice:A3F8");
        assert_eq!(voice_label("A"), "voice:A");
    }
}
