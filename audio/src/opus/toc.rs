//! TOC byte parsing per RFC 6716 §3.1.
//!
//! ```text
//!  0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+
//! | config  |s| c |
//! +-+-+-+-+-+-+-+-+
//! ```

use std::fmt;
use std::time::Duration;

/// The first byte of an Opus packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toc(pub u8);

impl Toc {
    /// Configuration number (bits 3-7, value 0-31).
    pub fn config(self) -> Config {
        Config(self.0 >> 3)
    }

    /// Stereo flag (bit 2).
    pub fn is_stereo(self) -> bool {
        self.0 & 0b0000_0100 != 0
    }

    /// Frame count code (bits 0-1).
    pub fn frame_code(self) -> FrameCode {
        match self.0 & 0b11 {
            0 => FrameCode::One,
            1 => FrameCode::TwoEqual,
            2 => FrameCode::TwoVariable,
            _ => FrameCode::Arbitrary,
        }
    }
}

/// Opus configuration number (0-31).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config(pub u8);

impl Config {
    /// Coding mode for this configuration.
    pub fn mode(self) -> Mode {
        match self.0 {
            0..=11 => Mode::Silk,
            12..=15 => Mode::Hybrid,
            _ => Mode::Celt,
        }
    }

    /// Audio bandwidth for this configuration.
    pub fn bandwidth(self) -> Bandwidth {
        match self.0 {
            0..=3 => Bandwidth::Narrow,
            4..=7 => Bandwidth::Medium,
            8..=11 => Bandwidth::Wide,
            12..=13 => Bandwidth::SuperWide,
            14..=15 => Bandwidth::Full,
            16..=19 => Bandwidth::Narrow,
            20..=23 => Bandwidth::Wide,
            24..=27 => Bandwidth::SuperWide,
            _ => Bandwidth::Full,
        }
    }

    /// Per-frame duration. Derived from the RFC's configuration table: each
    /// mode group cycles through its duration set.
    pub fn frame_duration(self) -> FrameDuration {
        use FrameDuration::*;
        match self.0 {
            0..=11 => match self.0 % 4 {
                0 => Ms10,
                1 => Ms20,
                2 => Ms40,
                _ => Ms60,
            },
            12..=15 => {
                if self.0 % 2 == 0 {
                    Ms10
                } else {
                    Ms20
                }
            }
            _ => match self.0 % 4 {
                0 => Ms2_5,
                1 => Ms5,
                2 => Ms10,
                _ => Ms20,
            },
        }
    }
}

/// Coding mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Silk,
    Celt,
    Hybrid,
}

/// Audio bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bandwidth {
    Narrow,
    Medium,
    Wide,
    SuperWide,
    Full,
}

impl Bandwidth {
    /// Effective sample rate in Hz.
    pub fn sample_rate(self) -> u32 {
        match self {
            Bandwidth::Narrow => 8_000,
            Bandwidth::Medium => 12_000,
            Bandwidth::Wide => 16_000,
            Bandwidth::SuperWide => 24_000,
            Bandwidth::Full => 48_000,
        }
    }
}

/// Frame count code (bits 0-1 of the TOC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameCode {
    /// One frame per packet.
    One,
    /// Two frames of equal compressed size.
    TwoEqual,
    /// Two frames with individual sizes.
    TwoVariable,
    /// N frames; count in the byte after the TOC.
    Arbitrary,
}

/// Duration of a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDuration {
    Ms2_5,
    Ms5,
    Ms10,
    Ms20,
    Ms40,
    Ms60,
}

impl FrameDuration {
    pub fn duration(self) -> Duration {
        match self {
            FrameDuration::Ms2_5 => Duration::from_micros(2_500),
            FrameDuration::Ms5 => Duration::from_millis(5),
            FrameDuration::Ms10 => Duration::from_millis(10),
            FrameDuration::Ms20 => Duration::from_millis(20),
            FrameDuration::Ms40 => Duration::from_millis(40),
            FrameDuration::Ms60 => Duration::from_millis(60),
        }
    }
}

impl fmt::Display for FrameDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameDuration::Ms2_5 => write!(f, "2.5ms"),
            FrameDuration::Ms5 => write!(f, "5ms"),
            FrameDuration::Ms10 => write!(f, "10ms"),
            FrameDuration::Ms20 => write!(f, "20ms"),
            FrameDuration::Ms40 => write!(f, "40ms"),
            FrameDuration::Ms60 => write!(f, "60ms"),
        }
    }
}

/// Splits the frame count byte following a code-3 TOC into
/// `(is_vbr, has_padding, frame_count)`.
pub fn parse_frame_count_byte(byte: u8) -> (bool, bool, u8) {
    (byte & 0x80 != 0, byte & 0x40 != 0, byte & 0x3f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_extraction() {
        // 0x48 = config 9 (SILK WB 20ms), mono, one frame.
        let toc = Toc(0x48);
        assert_eq!(toc.config().0, 9);
        assert!(!toc.is_stereo());
        assert_eq!(toc.frame_code(), FrameCode::One);
        assert_eq!(toc.config().mode(), Mode::Silk);
        assert_eq!(toc.config().bandwidth(), Bandwidth::Wide);
    }

    #[test]
    fn stereo_is_bit_two() {
        assert!(!Toc(0x48).is_stereo());
        assert!(Toc(0x4c).is_stereo());
    }

    #[test]
    fn frame_codes() {
        assert_eq!(Toc(0b00).frame_code(), FrameCode::One);
        assert_eq!(Toc(0b01).frame_code(), FrameCode::TwoEqual);
        assert_eq!(Toc(0b10).frame_code(), FrameCode::TwoVariable);
        assert_eq!(Toc(0b11).frame_code(), FrameCode::Arbitrary);
    }

    #[test]
    fn modes_by_range() {
        for c in 0..=11 {
            assert_eq!(Config(c).mode(), Mode::Silk);
        }
        for c in 12..=15 {
            assert_eq!(Config(c).mode(), Mode::Hybrid);
        }
        for c in 16..=31 {
            assert_eq!(Config(c).mode(), Mode::Celt);
        }
    }

    #[test]
    fn durations_match_rfc_table() {
        // SILK groups cycle 10/20/40/60.
        assert_eq!(Config(0).frame_duration(), FrameDuration::Ms10);
        assert_eq!(Config(1).frame_duration(), FrameDuration::Ms20);
        assert_eq!(Config(2).frame_duration(), FrameDuration::Ms40);
        assert_eq!(Config(3).frame_duration(), FrameDuration::Ms60);
        assert_eq!(Config(9).frame_duration(), FrameDuration::Ms20);
        // Hybrid alternates 10/20.
        assert_eq!(Config(12).frame_duration(), FrameDuration::Ms10);
        assert_eq!(Config(15).frame_duration(), FrameDuration::Ms20);
        // CELT groups cycle 2.5/5/10/20.
        assert_eq!(Config(16).frame_duration(), FrameDuration::Ms2_5);
        assert_eq!(Config(17).frame_duration(), FrameDuration::Ms5);
        assert_eq!(Config(18).frame_duration(), FrameDuration::Ms10);
        assert_eq!(Config(31).frame_duration(), FrameDuration::Ms20);
    }

    #[test]
    fn bandwidth_sample_rates() {
        assert_eq!(Bandwidth::Narrow.sample_rate(), 8_000);
        assert_eq!(Bandwidth::Full.sample_rate(), 48_000);
        assert_eq!(Config(4).bandwidth(), Bandwidth::Medium);
        assert_eq!(Config(20).bandwidth(), Bandwidth::Wide);
        assert_eq!(Config(28).bandwidth(), Bandwidth::Full);
    }

    #[test]
    fn frame_count_byte() {
        let (vbr, padding, count) = parse_frame_count_byte(0b1100_0011);
        assert!(vbr);
        assert!(padding);
        assert_eq!(count, 3);

        let (vbr, padding, count) = parse_frame_count_byte(0b0000_0101);
        assert!(!vbr);
        assert!(!padding);
        assert_eq!(count, 5);
    }
}
