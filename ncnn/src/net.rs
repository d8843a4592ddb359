//! Safe wrappers over the ncnn C API.

use std::ffi::{CStr, CString};

use crate::error::NcnnError;
use crate::ffi;

/// Returns the linked ncnn version string.
pub fn version() -> String {
    unsafe {
        let v = ffi::ncnn_version();
        if v.is_null() {
            String::new()
        } else {
            CStr::from_ptr(v).to_string_lossy().into_owned()
        }
    }
}

/// Load-time options applied to a [`Net`].
pub struct NetOption {
    handle: ffi::NcnnOptionT,
}

unsafe impl Send for NetOption {}
unsafe impl Sync for NetOption {}

impl NetOption {
    pub fn new() -> Result<Self, NcnnError> {
        let handle = unsafe { ffi::ncnn_option_create() };
        if handle.is_null() {
            return Err(NcnnError::Alloc("option"));
        }
        Ok(Self { handle })
    }

    /// Toggles all fp16 paths. Embedding models keep this off for
    /// numerical stability.
    pub fn set_fp16(&mut self, enabled: bool) {
        let v = enabled as i32;
        unsafe {
            ffi::ncnn_option_set_use_fp16_packed(self.handle, v);
            ffi::ncnn_option_set_use_fp16_storage(self.handle, v);
            ffi::ncnn_option_set_use_fp16_arithmetic(self.handle, v);
        }
    }

    pub fn set_num_threads(&mut self, n: i32) {
        unsafe { ffi::ncnn_option_set_num_threads(self.handle, n) };
    }
}

impl Drop for NetOption {
    fn drop(&mut self) {
        unsafe { ffi::ncnn_option_destroy(self.handle) };
    }
}

/// A loaded ncnn model.
///
/// Safe to share across threads: parallel [`Extractor`]s over the same net
/// are supported by ncnn. In-memory model data is kept alive by the `Net`
/// since ncnn references it without copying.
pub struct Net {
    handle: ffi::NcnnNetT,
    // Backing storage for memory-loaded models; ncnn borrows these.
    _param: Option<CString>,
    _bin: Option<Vec<u8>>,
}

unsafe impl Send for Net {}
unsafe impl Sync for Net {}

impl Net {
    /// Loads a model from `.param` and `.bin` files on disk.
    pub fn from_files(
        param_path: &str,
        bin_path: &str,
        opt: Option<&NetOption>,
    ) -> Result<Self, NcnnError> {
        let handle = unsafe { ffi::ncnn_net_create() };
        if handle.is_null() {
            return Err(NcnnError::Alloc("net"));
        }
        if let Some(opt) = opt {
            unsafe { ffi::ncnn_net_set_option(handle, opt.handle) };
        }

        let param = CString::new(param_path)
            .map_err(|_| NcnnError::InvalidArgument("param path contains NUL".into()))?;
        let bin = CString::new(bin_path)
            .map_err(|_| NcnnError::InvalidArgument("bin path contains NUL".into()))?;

        let rc = unsafe { ffi::ncnn_net_load_param(handle, param.as_ptr()) };
        if rc != 0 {
            unsafe { ffi::ncnn_net_destroy(handle) };
            return Err(NcnnError::LoadParam(rc));
        }
        let rc = unsafe { ffi::ncnn_net_load_model(handle, bin.as_ptr()) };
        if rc != 0 {
            unsafe { ffi::ncnn_net_destroy(handle) };
            return Err(NcnnError::LoadModel(rc));
        }

        Ok(Self {
            handle,
            _param: None,
            _bin: None,
        })
    }

    /// Loads a model from in-memory `.param` text and `.bin` weights.
    pub fn from_memory(
        param_data: &[u8],
        bin_data: &[u8],
        opt: Option<&NetOption>,
    ) -> Result<Self, NcnnError> {
        let handle = unsafe { ffi::ncnn_net_create() };
        if handle.is_null() {
            return Err(NcnnError::Alloc("net"));
        }
        if let Some(opt) = opt {
            unsafe { ffi::ncnn_net_set_option(handle, opt.handle) };
        }

        let param = CString::new(param_data.to_vec())
            .map_err(|_| NcnnError::InvalidArgument("param data contains NUL".into()))?;
        let bin = bin_data.to_vec();

        let rc = unsafe { ffi::ncnn_net_load_param_memory(handle, param.as_ptr()) };
        if rc != 0 {
            unsafe { ffi::ncnn_net_destroy(handle) };
            return Err(NcnnError::LoadParam(rc));
        }
        let rc = unsafe { ffi::ncnn_net_load_model_memory(handle, bin.as_ptr()) };
        if rc != 0 {
            unsafe { ffi::ncnn_net_destroy(handle) };
            return Err(NcnnError::LoadModel(rc));
        }

        Ok(Self {
            handle,
            _param: Some(param),
            _bin: Some(bin),
        })
    }

    /// Opens a new inference session.
    pub fn extractor(&self) -> Result<Extractor<'_>, NcnnError> {
        let handle = unsafe { ffi::ncnn_extractor_create(self.handle) };
        if handle.is_null() {
            return Err(NcnnError::Alloc("extractor"));
        }
        Ok(Extractor {
            handle,
            _net: std::marker::PhantomData,
        })
    }
}

impl Drop for Net {
    fn drop(&mut self) {
        unsafe { ffi::ncnn_net_destroy(self.handle) };
    }
}

/// One inference session over a [`Net`]. Not thread-safe; keep on one
/// thread.
pub struct Extractor<'net> {
    handle: ffi::NcnnExtractorT,
    _net: std::marker::PhantomData<&'net Net>,
}

impl Extractor<'_> {
    /// Binds `mat` to the input blob `name`.
    pub fn set_input(&mut self, name: &str, mat: &Mat) -> Result<(), NcnnError> {
        let cname = CString::new(name)
            .map_err(|_| NcnnError::InvalidArgument("blob name contains NUL".into()))?;
        let rc = unsafe { ffi::ncnn_extractor_input(self.handle, cname.as_ptr(), mat.handle) };
        if rc != 0 {
            return Err(NcnnError::SetInput {
                name: name.to_string(),
                code: rc,
            });
        }
        Ok(())
    }

    /// Runs the network up to the output blob `name`.
    pub fn extract(&mut self, name: &str) -> Result<Mat, NcnnError> {
        let cname = CString::new(name)
            .map_err(|_| NcnnError::InvalidArgument("blob name contains NUL".into()))?;
        let mut out: ffi::NcnnMatT = std::ptr::null_mut();
        let rc = unsafe { ffi::ncnn_extractor_extract(self.handle, cname.as_ptr(), &mut out) };
        if rc != 0 || out.is_null() {
            return Err(NcnnError::Extract {
                name: name.to_string(),
                code: rc,
            });
        }
        Ok(Mat {
            handle: out,
            _data: None,
        })
    }
}

impl Drop for Extractor<'_> {
    fn drop(&mut self) {
        unsafe { ffi::ncnn_extractor_destroy(self.handle) };
    }
}

/// An ncnn tensor. Input mats borrow caller data (kept alive here); output
/// mats own ncnn-allocated storage.
pub struct Mat {
    handle: ffi::NcnnMatT,
    // Backing storage for externally-created mats; ncnn borrows it.
    _data: Option<Vec<f32>>,
}

unsafe impl Send for Mat {}

impl Mat {
    /// Creates a `w` x `h` float32 mat referencing a copy of `data`
    /// (row-major, `h` rows of `w` values).
    pub fn new_2d(w: i32, h: i32, data: &[f32]) -> Result<Self, NcnnError> {
        let expect = (w as usize).checked_mul(h as usize).unwrap_or(0);
        if w <= 0 || h <= 0 || data.len() != expect {
            return Err(NcnnError::InvalidArgument(format!(
                "mat shape {w}x{h} does not match {} values",
                data.len()
            )));
        }
        let mut owned = data.to_vec();
        let handle = unsafe {
            ffi::ncnn_mat_create_external_2d(
                w,
                h,
                owned.as_mut_ptr() as *mut std::ffi::c_void,
                std::ptr::null_mut(),
            )
        };
        if handle.is_null() {
            return Err(NcnnError::Alloc("mat"));
        }
        Ok(Self {
            handle,
            _data: Some(owned),
        })
    }

    /// Total element count (`w * h * c`).
    pub fn len(&self) -> usize {
        unsafe {
            let w = ffi::ncnn_mat_get_w(self.handle).max(0) as usize;
            let h = ffi::ncnn_mat_get_h(self.handle).max(0) as usize;
            let c = ffi::ncnn_mat_get_c(self.handle).max(0) as usize;
            w * h * c
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the mat contents out as f32 values.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        let n = self.len();
        unsafe {
            let data = ffi::ncnn_mat_get_data(self.handle);
            if data.is_null() || n == 0 {
                return Vec::new();
            }
            std::slice::from_raw_parts(data, n).to_vec()
        }
    }
}

impl Drop for Mat {
    fn drop(&mut self) {
        unsafe { ffi::ncnn_mat_destroy(self.handle) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Exercising real inference needs the `link` feature and an installed
    // ncnn; shape validation is checked without touching the library.
    #[test]
    fn mat_shape_validation() {
        assert!(matches!(
            Mat::new_2d(0, 10, &[]),
            Err(NcnnError::InvalidArgument(_))
        ));
        assert!(matches!(
            Mat::new_2d(4, 4, &[0.0; 3]),
            Err(NcnnError::InvalidArgument(_))
        ));
    }

    #[cfg(not(feature = "link"))]
    #[test]
    fn constructors_fail_cleanly_without_library() {
        assert!(NetOption::new().is_err());
        assert!(Net::from_memory(b"param", b"bin", None).is_err());
        assert_eq!(version(), "");
    }
}
