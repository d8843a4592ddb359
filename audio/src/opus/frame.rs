//! Raw Opus frame wrapper.

use std::time::Duration;

use super::toc::{Config, FrameCode, Toc, parse_frame_count_byte};

/// A raw encoded Opus packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(pub Vec<u8>);

impl Frame {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self(data.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// TOC byte of this packet; zero for an empty packet.
    pub fn toc(&self) -> Toc {
        Toc(self.0.first().copied().unwrap_or(0))
    }

    /// Configuration of this packet.
    pub fn config(&self) -> Config {
        self.toc().config()
    }

    /// True when the packet carries stereo audio.
    pub fn is_stereo(&self) -> bool {
        self.toc().is_stereo()
    }

    /// Total audio duration of the packet, derived from the TOC.
    ///
    /// Code-3 packets read the frame count from the byte after the TOC; a
    /// code-3 packet missing that byte has zero duration, as does an empty
    /// packet.
    pub fn duration(&self) -> Duration {
        if self.0.is_empty() {
            return Duration::ZERO;
        }
        let toc = self.toc();
        let per_frame = toc.config().frame_duration().duration();
        match toc.frame_code() {
            FrameCode::One => per_frame,
            FrameCode::TwoEqual | FrameCode::TwoVariable => per_frame * 2,
            FrameCode::Arbitrary => match self.0.get(1) {
                Some(&b) => per_frame * parse_frame_count_byte(b).2 as u32,
                None => Duration::ZERO,
            },
        }
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Frame {
    fn from(data: Vec<u8>) -> Self {
        Self(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opus::SILENCE_20MS;

    #[test]
    fn duration_one_frame() {
        assert_eq!(Frame(vec![0x00, 0x01]).duration(), Duration::from_millis(10));
        assert_eq!(Frame(vec![0x08, 0x01]).duration(), Duration::from_millis(20));
    }

    #[test]
    fn duration_two_frames() {
        assert_eq!(
            Frame(vec![0xf9, 0x00, 0x00]).duration(),
            Duration::from_millis(40)
        );
    }

    #[test]
    fn duration_arbitrary_frames() {
        assert_eq!(
            Frame(vec![0xfb, 0x03, 0x00, 0x00, 0x00]).duration(),
            Duration::from_millis(60)
        );
        // Code 3 without the count byte has no derivable duration.
        assert_eq!(Frame(vec![0xfb]).duration(), Duration::ZERO);
    }

    #[test]
    fn silence_frame_is_20ms_mono() {
        let frame = Frame(SILENCE_20MS.to_vec());
        assert_eq!(frame.duration(), Duration::from_millis(20));
        assert!(!frame.is_stereo());
    }

    #[test]
    fn empty_frame() {
        let frame = Frame(vec![]);
        assert!(frame.is_empty());
        assert_eq!(frame.duration(), Duration::ZERO);
    }
}
