//! Raw FFI declarations matching `ncnn/c_api.h`.
//!
//! Hand-written instead of bindgen: the surface is a dozen functions and
//! keeping it explicit avoids a build-time dependency.
//!
//! Without the `link` feature the extern block is replaced by inert stubs
//! (null handles, failing return codes) so dependents build and test on
//! machines without the native library; constructors then fail at runtime.

use std::os::raw::{c_char, c_float, c_int, c_uchar, c_void};

pub type NcnnNetT = *mut c_void;
pub type NcnnExtractorT = *mut c_void;
pub type NcnnMatT = *mut c_void;
pub type NcnnOptionT = *mut c_void;

#[cfg(feature = "link")]
unsafe extern "C" {
    pub fn ncnn_version() -> *const c_char;

    pub fn ncnn_net_create() -> NcnnNetT;
    pub fn ncnn_net_destroy(net: NcnnNetT);
    pub fn ncnn_net_load_param(net: NcnnNetT, path: *const c_char) -> c_int;
    pub fn ncnn_net_load_model(net: NcnnNetT, path: *const c_char) -> c_int;
    pub fn ncnn_net_load_param_memory(net: NcnnNetT, mem: *const c_char) -> c_int;
    pub fn ncnn_net_load_model_memory(net: NcnnNetT, mem: *const c_uchar) -> c_int;
    pub fn ncnn_net_set_option(net: NcnnNetT, opt: NcnnOptionT);

    pub fn ncnn_extractor_create(net: NcnnNetT) -> NcnnExtractorT;
    pub fn ncnn_extractor_destroy(ex: NcnnExtractorT);
    pub fn ncnn_extractor_input(ex: NcnnExtractorT, name: *const c_char, mat: NcnnMatT) -> c_int;
    pub fn ncnn_extractor_extract(
        ex: NcnnExtractorT,
        name: *const c_char,
        mat: *mut NcnnMatT,
    ) -> c_int;

    pub fn ncnn_mat_create_external_2d(
        w: c_int,
        h: c_int,
        data: *mut c_void,
        allocator: *mut c_void,
    ) -> NcnnMatT;
    pub fn ncnn_mat_destroy(mat: NcnnMatT);
    pub fn ncnn_mat_get_w(mat: NcnnMatT) -> c_int;
    pub fn ncnn_mat_get_h(mat: NcnnMatT) -> c_int;
    pub fn ncnn_mat_get_c(mat: NcnnMatT) -> c_int;
    pub fn ncnn_mat_get_data(mat: NcnnMatT) -> *const c_float;

    pub fn ncnn_option_create() -> NcnnOptionT;
    pub fn ncnn_option_destroy(opt: NcnnOptionT);
    pub fn ncnn_option_set_use_fp16_packed(opt: NcnnOptionT, enabled: c_int);
    pub fn ncnn_option_set_use_fp16_storage(opt: NcnnOptionT, enabled: c_int);
    pub fn ncnn_option_set_use_fp16_arithmetic(opt: NcnnOptionT, enabled: c_int);
    pub fn ncnn_option_set_num_threads(opt: NcnnOptionT, n: c_int);
}

#[cfg(not(feature = "link"))]
mod stub {
    #![allow(unused_variables, clippy::missing_safety_doc)]

    use super::*;

    pub unsafe fn ncnn_version() -> *const c_char {
        std::ptr::null()
    }

    pub unsafe fn ncnn_net_create() -> NcnnNetT {
        std::ptr::null_mut()
    }
    pub unsafe fn ncnn_net_destroy(net: NcnnNetT) {}
    pub unsafe fn ncnn_net_load_param(net: NcnnNetT, path: *const c_char) -> c_int {
        -1
    }
    pub unsafe fn ncnn_net_load_model(net: NcnnNetT, path: *const c_char) -> c_int {
        -1
    }
    pub unsafe fn ncnn_net_load_param_memory(net: NcnnNetT, mem: *const c_char) -> c_int {
        -1
    }
    pub unsafe fn ncnn_net_load_model_memory(net: NcnnNetT, mem: *const c_uchar) -> c_int {
        -1
    }
    pub unsafe fn ncnn_net_set_option(net: NcnnNetT, opt: NcnnOptionT) {}

    pub unsafe fn ncnn_extractor_create(net: NcnnNetT) -> NcnnExtractorT {
        std::ptr::null_mut()
    }
    pub unsafe fn ncnn_extractor_destroy(ex: NcnnExtractorT) {}
    pub unsafe fn ncnn_extractor_input(
        ex: NcnnExtractorT,
        name: *const c_char,
        mat: NcnnMatT,
    ) -> c_int {
        -1
    }
    pub unsafe fn ncnn_extractor_extract(
        ex: NcnnExtractorT,
        name: *const c_char,
        mat: *mut NcnnMatT,
    ) -> c_int {
        -1
    }

    pub unsafe fn ncnn_mat_create_external_2d(
        w: c_int,
        h: c_int,
        data: *mut c_void,
        allocator: *mut c_void,
    ) -> NcnnMatT {
        std::ptr::null_mut()
    }
    pub unsafe fn ncnn_mat_destroy(mat: NcnnMatT) {}
    pub unsafe fn ncnn_mat_get_w(mat: NcnnMatT) -> c_int {
        0
    }
    pub unsafe fn ncnn_mat_get_h(mat: NcnnMatT) -> c_int {
        0
    }
    pub unsafe fn ncnn_mat_get_c(mat: NcnnMatT) -> c_int {
        0
    }
    pub unsafe fn ncnn_mat_get_data(mat: NcnnMatT) -> *const c_float {
        std::ptr::null()
    }

    pub unsafe fn ncnn_option_create() -> NcnnOptionT {
        std::ptr::null_mut()
    }
    pub unsafe fn ncnn_option_destroy(opt: NcnnOptionT) {}
    pub unsafe fn ncnn_option_set_use_fp16_packed(opt: NcnnOptionT, enabled: c_int) {}
    pub unsafe fn ncnn_option_set_use_fp16_storage(opt: NcnnOptionT, enabled: c_int) {}
    pub unsafe fn ncnn_option_set_use_fp16_arithmetic(opt: NcnnOptionT, enabled: c_int) {}
    pub unsafe fn ncnn_option_set_num_threads(opt: NcnnOptionT, n: c_int) {}
}

#[cfg(not(feature = "link"))]
pub use stub::*;
