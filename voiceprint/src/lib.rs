//! Speaker identification from streaming PCM audio.
//!
//! The pipeline has three stages:
//!
//! 1. [`VoiceprintModel::extract`]: PCM16 16 kHz mono → embedding vector
//!    (fbank features → CMVN → native inference → averaged, L2-normalized
//!    embedding)
//! 2. [`Hasher::hash`]: embedding → short hex voice hash (random hyperplane
//!    LSH; 16 bits → 4 hex chars such as `"A3F8"`)
//! 3. [`Detector::feed`]: sliding window of hashes → [`SpeakerStatus`]
//!
//! Voice hashes support coarser matching by prefix truncation, geohash
//! style:
//!
//! ```text
//! 16 bit: A3F8   exact
//! 12 bit: A3F    fuzzy
//!  8 bit: A3     group
//!  4 bit: A      coarse
//! ```
//!
//! Hashes are rendered into stream labels with [`voice_label`]
//! (`voice:A3F8`). Cross-language determinism matters here: two
//! implementations loading the same hyperplanes must produce identical
//! hashes, and the fbank stage fixes its summation order for the same
//! reason.

pub mod fbank;

mod detector;
mod error;
mod hasher;
mod model;
mod speaker;

#[cfg(feature = "ncnn")]
mod ncnn_model;

pub use detector::{Detector, DetectorConfig};
pub use error::VoiceprintError;
pub use fbank::{FbankConfig, cmvn, compute_fbank, l2_normalize};
pub use hasher::Hasher;
pub use model::VoiceprintModel;
pub use speaker::{Detection, SpeakerStatus, voice_label};

#[cfg(feature = "ncnn")]
pub use ncnn_model::{NcnnModel, NcnnModelConfig};
