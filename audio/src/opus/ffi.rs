//! Raw FFI for the libopus encoder API (`opus.h`).
//!
//! Hand-written declarations for the handful of entry points the encoder
//! wrapper needs.

use std::os::raw::{c_int, c_uchar};

/// Opaque encoder handle.
pub type OpusEncoderT = *mut std::ffi::c_void;

pub const OPUS_APPLICATION_AUDIO: c_int = 2049;
pub const OPUS_SET_BITRATE_REQUEST: c_int = 4002;

unsafe extern "C" {
    pub fn opus_encoder_create(
        fs: i32,
        channels: c_int,
        application: c_int,
        error: *mut c_int,
    ) -> OpusEncoderT;
    pub fn opus_encoder_destroy(st: OpusEncoderT);
    pub fn opus_encoder_ctl(st: OpusEncoderT, request: c_int, value: i32) -> c_int;
    pub fn opus_encode(
        st: OpusEncoderT,
        pcm: *const i16,
        frame_size: c_int,
        data: *mut c_uchar,
        max_data_bytes: c_int,
    ) -> c_int;
    pub fn opus_strerror(error: c_int) -> *const std::os::raw::c_char;
}
