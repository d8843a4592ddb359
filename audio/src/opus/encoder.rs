//! Safe wrapper around the libopus encoder.

use std::ffi::CStr;
use std::os::raw::c_int;

use crate::error::AudioError;

use super::ffi;

/// Native Opus encoder for interleaved PCM16 input.
pub struct OpusEncoder {
    handle: ffi::OpusEncoderT,
    channels: usize,
}

// The handle is only touched through &mut self.
unsafe impl Send for OpusEncoder {}

impl OpusEncoder {
    /// Creates an encoder. `sample_rate` must be one of the Opus rates
    /// (8/12/16/24/48 kHz), `channels` 1 or 2.
    pub fn new(sample_rate: i32, channels: i32, bitrate: i32) -> Result<Self, AudioError> {
        let mut err: c_int = 0;
        let handle = unsafe {
            ffi::opus_encoder_create(sample_rate, channels, ffi::OPUS_APPLICATION_AUDIO, &mut err)
        };
        if handle.is_null() || err != 0 {
            return Err(AudioError::Opus(opus_err(err)));
        }
        let rc = unsafe { ffi::opus_encoder_ctl(handle, ffi::OPUS_SET_BITRATE_REQUEST, bitrate) };
        if rc != 0 {
            unsafe { ffi::opus_encoder_destroy(handle) };
            return Err(AudioError::Opus(opus_err(rc)));
        }
        Ok(Self {
            handle,
            channels: channels as usize,
        })
    }

    /// Encodes exactly one frame of `frame_size` samples per channel and
    /// returns the packet bytes.
    pub fn encode(&mut self, pcm: &[i16], frame_size: usize) -> Result<Vec<u8>, AudioError> {
        if pcm.len() < frame_size * self.channels {
            return Err(AudioError::Opus(format!(
                "short pcm frame: need {} samples, got {}",
                frame_size * self.channels,
                pcm.len()
            )));
        }
        let mut out = vec![0u8; 4000];
        let n = unsafe {
            ffi::opus_encode(
                self.handle,
                pcm.as_ptr(),
                frame_size as c_int,
                out.as_mut_ptr(),
                out.len() as c_int,
            )
        };
        if n < 0 {
            return Err(AudioError::Opus(opus_err(n)));
        }
        out.truncate(n as usize);
        Ok(out)
    }
}

impl Drop for OpusEncoder {
    fn drop(&mut self) {
        unsafe { ffi::opus_encoder_destroy(self.handle) };
    }
}

fn opus_err(code: c_int) -> String {
    unsafe {
        let msg = ffi::opus_strerror(code);
        if msg.is_null() {
            format!("opus error {code}")
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    }
}
