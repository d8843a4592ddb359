//! Bindings for the ncnn neural network inference engine.
//!
//! ncnn is a lightweight inference framework for mobile and embedded
//! targets. This crate wraps its C API with safe types:
//!
//! - [`Net`]: a loaded model (from files or in-memory param/bin data)
//! - [`Extractor`]: one inference session over a `Net`
//! - [`Mat`]: an input/output tensor
//! - [`NetOption`]: load-time options (fp16, thread count)
//!
//! A `Net` is safe to share: extractors on the same net may run in
//! parallel, while each `Extractor` stays on one thread.
//!
//! Linking against the system library is opt-in via the `link` feature so
//! downstream crates build and test without ncnn installed.
//!
//! ```no_run
//! use talkbox_ncnn::{Mat, Net, NetOption};
//!
//! # fn run(param: &[u8], bin: &[u8], features: &[f32]) -> Result<(), talkbox_ncnn::NcnnError> {
//! let mut opt = NetOption::new()?;
//! opt.set_fp16(false);
//! let net = Net::from_memory(param, bin, Some(&opt))?;
//!
//! let input = Mat::new_2d(80, 300, features)?;
//! let mut ex = net.extractor()?;
//! ex.set_input("in0", &input)?;
//! let out = ex.extract("out0")?;
//! let embedding = out.to_f32_vec();
//! # Ok(())
//! # }
//! ```

mod error;
mod ffi;
mod net;

pub use error::NcnnError;
pub use net::{Extractor, Mat, Net, NetOption, version};
