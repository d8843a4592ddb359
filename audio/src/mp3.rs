//! MP3 decoding to interleaved PCM16.
//!
//! Decoding is pure Rust via symphonia; the sample rate and channel count
//! are probed from the first decoded frames.

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::AudioError;

/// Fully decoded PCM audio.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPcm {
    /// Sample rate in Hz, probed from the stream.
    pub sample_rate: u32,
    /// Channel count, probed from the stream.
    pub channels: u16,
    /// Interleaved signed 16-bit samples.
    pub samples: Vec<i16>,
}

impl DecodedPcm {
    /// Duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }
        let frames = self.samples.len() as u64 / self.channels as u64;
        frames * 1000 / self.sample_rate as u64
    }
}

/// Decodes a complete MP3 byte buffer into interleaved PCM16.
pub fn decode_mp3(data: &[u8]) -> Result<DecodedPcm, AudioError> {
    if data.is_empty() {
        return Err(AudioError::Mp3("empty input".into()));
    }

    let source = Box::new(std::io::Cursor::new(data.to_vec()));
    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::Mp3(format!("probe failed: {e}")))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| AudioError::Mp3("no audio track".into()))?;
    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::Mp3(format!("unsupported codec: {e}")))?;

    let mut sample_rate = 0u32;
    let mut channels = 0u16;
    let mut samples: Vec<i16> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(AudioError::Mp3(format!("read packet: {e}"))),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                if sample_rate == 0 {
                    sample_rate = spec.rate;
                    channels = spec.channels.count() as u16;
                }
                let mut buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            // Recoverable frame corruption; keep going.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(AudioError::Mp3(format!("decode: {e}"))),
        }
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(AudioError::Mp3("no decodable frames".into()));
    }
    Ok(DecodedPcm {
        sample_rate,
        channels,
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_is_error() {
        assert!(decode_mp3(&[]).is_err());
    }

    #[test]
    fn garbage_input_is_error() {
        let junk: Vec<u8> = (0..512u32).map(|i| (i * 7 % 256) as u8).collect();
        assert!(decode_mp3(&junk).is_err());
    }

    #[test]
    fn duration_math() {
        let pcm = DecodedPcm {
            sample_rate: 16_000,
            channels: 1,
            samples: vec![0; 16_000],
        };
        assert_eq!(pcm.duration_ms(), 1000);

        let stereo = DecodedPcm {
            sample_rate: 48_000,
            channels: 2,
            samples: vec![0; 96_000],
        };
        assert_eq!(stereo.duration_ms(), 1000);
    }
}
