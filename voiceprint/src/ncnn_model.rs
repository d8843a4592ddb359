//! ncnn-backed [`VoiceprintModel`].

use std::sync::RwLock;

use talkbox_ncnn::{Mat, Net, NetOption};

use crate::error::VoiceprintError;
use crate::fbank::{FbankConfig, cmvn, compute_fbank, l2_normalize};
use crate::model::VoiceprintModel;

/// Fbank frames per inference segment (3 s at a 10 ms hop).
const SEG_FRAMES: usize = 300;
/// Hop between segments when averaging over long audio.
const HOP_FRAMES: usize = 150;

/// Speaker embedding model running on the ncnn engine.
///
/// `extract` runs the full pipeline: fbank → CMVN → segment inference →
/// per-segment L2 normalize → mean → final L2 normalize. Audio shorter than
/// one segment is inferred as a single window of whatever frames exist.
///
/// The native net sits behind an `RwLock`: `extract` takes the read lock so
/// concurrent extractions proceed in parallel, while [`close`](Self::close)
/// takes the write lock, releases the handle once, and is idempotent. A
/// closed model fails further extracts with [`VoiceprintError::Closed`].
pub struct NcnnModel {
    inner: RwLock<Inner>,
}

struct Inner {
    net: Option<Net>,
    dim: usize,
    fbank: FbankConfig,
    input_name: String,
    output_name: String,
}

/// Construction options for [`NcnnModel`].
pub struct NcnnModelConfig {
    /// Embedding dimension (default 512).
    pub dim: usize,
    /// Filterbank configuration.
    pub fbank: FbankConfig,
    /// Input blob name (default "in0").
    pub input_name: String,
    /// Output blob name (default "out0").
    pub output_name: String,
}

impl Default for NcnnModelConfig {
    fn default() -> Self {
        Self {
            dim: 512,
            fbank: FbankConfig::default(),
            input_name: "in0".to_string(),
            output_name: "out0".to_string(),
        }
    }
}

impl NcnnModel {
    /// Loads the model from `.param` and `.bin` files. FP16 is disabled for
    /// numerical stability of the embeddings.
    pub fn from_files(
        param_path: &str,
        bin_path: &str,
        cfg: NcnnModelConfig,
    ) -> Result<Self, VoiceprintError> {
        let mut opt = NetOption::new().map_err(|e| VoiceprintError::Model(e.to_string()))?;
        opt.set_fp16(false);
        let net = Net::from_files(param_path, bin_path, Some(&opt))
            .map_err(|e| VoiceprintError::Model(e.to_string()))?;
        Ok(Self::from_net(net, cfg))
    }

    /// Loads the model from in-memory `.param` and `.bin` data.
    pub fn from_memory(
        param_data: &[u8],
        bin_data: &[u8],
        cfg: NcnnModelConfig,
    ) -> Result<Self, VoiceprintError> {
        if param_data.is_empty() || bin_data.is_empty() {
            return Err(VoiceprintError::Model("empty model data".into()));
        }
        let mut opt = NetOption::new().map_err(|e| VoiceprintError::Model(e.to_string()))?;
        opt.set_fp16(false);
        let net = Net::from_memory(param_data, bin_data, Some(&opt))
            .map_err(|e| VoiceprintError::Model(e.to_string()))?;
        Ok(Self::from_net(net, cfg))
    }

    /// Wraps an already-loaded net.
    pub fn from_net(net: Net, cfg: NcnnModelConfig) -> Self {
        Self {
            inner: RwLock::new(Inner {
                net: Some(net),
                dim: cfg.dim,
                fbank: cfg.fbank,
                input_name: cfg.input_name,
                output_name: cfg.output_name,
            }),
        }
    }

    /// Releases the native handle. Idempotent; later extracts fail.
    pub fn close(&self) {
        let mut inner = self.inner.write().unwrap();
        inner.net = None;
    }
}

impl VoiceprintModel for NcnnModel {
    fn extract(&self, audio: &[u8]) -> Result<Vec<f32>, VoiceprintError> {
        let inner = self.inner.read().unwrap();
        let net = inner.net.as_ref().ok_or(VoiceprintError::Closed)?;

        let mut features =
            compute_fbank(audio, &inner.fbank).ok_or(VoiceprintError::AudioTooShort {
                min_bytes: inner.fbank.frame_length * 2,
                got_bytes: audio.len(),
            })?;
        cmvn(&mut features);

        let num_frames = features.len();
        if num_frames <= SEG_FRAMES {
            let mut emb = infer_segment(net, &features, &inner)?;
            l2_normalize(&mut emb);
            return Ok(emb);
        }

        let mut embeddings: Vec<Vec<f32>> = Vec::new();
        let mut last_start = 0;
        let mut start = 0;
        while start + SEG_FRAMES <= num_frames {
            if let Ok(mut emb) = infer_segment(net, &features[start..start + SEG_FRAMES], &inner) {
                l2_normalize(&mut emb);
                embeddings.push(emb);
            }
            last_start = start;
            start += HOP_FRAMES;
        }

        // One trailing segment so the end of the audio is covered.
        let tail = num_frames - SEG_FRAMES;
        if tail > last_start
            && let Ok(mut emb) = infer_segment(net, &features[tail..], &inner)
        {
            l2_normalize(&mut emb);
            embeddings.push(emb);
        }

        if embeddings.is_empty() {
            return Err(VoiceprintError::Model("all segments failed".into()));
        }

        let mut avg = vec![0.0f32; inner.dim];
        for emb in &embeddings {
            for (slot, &v) in avg.iter_mut().zip(emb.iter()) {
                *slot += v;
            }
        }
        let n = embeddings.len() as f32;
        for v in &mut avg {
            *v /= n;
        }
        l2_normalize(&mut avg);
        Ok(avg)
    }

    fn dimension(&self) -> usize {
        self.inner.read().unwrap().dim
    }
}

fn infer_segment(net: &Net, features: &[Vec<f32>], inner: &Inner) -> Result<Vec<f32>, VoiceprintError> {
    let num_frames = features.len();
    let num_mels = features[0].len();

    let mut flat = vec![0.0f32; num_frames * num_mels];
    for (t, frame) in features.iter().enumerate() {
        flat[t * num_mels..(t + 1) * num_mels].copy_from_slice(frame);
    }

    let input = Mat::new_2d(num_mels as i32, num_frames as i32, &flat)
        .map_err(|e| VoiceprintError::Model(e.to_string()))?;

    let mut ex = net
        .extractor()
        .map_err(|e| VoiceprintError::Model(e.to_string()))?;
    ex.set_input(&inner.input_name, &input)
        .map_err(|e| VoiceprintError::Model(e.to_string()))?;
    let output = ex
        .extract(&inner.output_name)
        .map_err(|e| VoiceprintError::Model(e.to_string()))?;

    let data = output.to_f32_vec();
    if data.is_empty() {
        return Err(VoiceprintError::Model("empty inference output".into()));
    }

    let mut embedding = vec![0.0f32; inner.dim];
    let n = data.len().min(inner.dim);
    embedding[..n].copy_from_slice(&data[..n]);
    Ok(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Real inference needs talkbox-ncnn's `link` feature plus model data;
    // here the closed-state contract is what can run everywhere.
    #[test]
    fn closed_model_rejects_extract() {
        let model = match Net::from_memory(b"7767517\n", &[0u8; 4], None) {
            Ok(net) => NcnnModel::from_net(net, NcnnModelConfig::default()),
            // Without the native library constructors fail; nothing to test.
            Err(_) => return,
        };
        model.close();
        model.close();
        assert!(matches!(
            model.extract(&[0u8; 32_000]),
            Err(VoiceprintError::Closed)
        ));
    }
}
