//! Speaker annotation transformer.
//!
//! PCM chunks pass through unchanged except that `ctrl.label` is kept up to
//! date with the current speaker (`voice:<HASH>`). Audio accumulates into
//! fixed-duration analysis segments; each complete segment runs the full
//! pipeline (fbank, CMVN, embedding, LSH hash, detector) and updates the
//! label carried by subsequent chunks. The stage is best-effort: extraction
//! or hashing failures keep the previous label and never fail the stream.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use talkbox_voiceprint::{Detector, DetectorConfig, Hasher, SpeakerStatus, VoiceprintModel};

use crate::error::CoreError;
use crate::stream::Stream;
use crate::stream_utils::channel_stream;
use crate::transformer::Transformer;
use crate::types::{MessageChunk, Part};

/// Annotation parameters.
#[derive(Debug, Clone)]
pub struct VoiceprintConfig {
    /// Analysis segment duration (400 ms at 16 kHz mono PCM16 is 12800
    /// bytes).
    pub segment_duration_ms: usize,
    pub sample_rate: usize,
    pub detector_window_size: usize,
    pub detector_min_ratio: f32,
}

impl Default for VoiceprintConfig {
    fn default() -> Self {
        Self {
            segment_duration_ms: 400,
            sample_rate: 16_000,
            detector_window_size: 5,
            detector_min_ratio: 0.6,
        }
    }
}

/// Annotates `audio/pcm` chunks with speaker labels.
pub struct VoiceprintTransformer {
    model: Arc<dyn VoiceprintModel>,
    hasher: Arc<Hasher>,
    config: VoiceprintConfig,
}

impl VoiceprintTransformer {
    pub fn new(
        model: Arc<dyn VoiceprintModel>,
        hasher: Arc<Hasher>,
        config: VoiceprintConfig,
    ) -> Result<Self, CoreError> {
        let segment_bytes = config.sample_rate * 2 * config.segment_duration_ms / 1000;
        if segment_bytes == 0 {
            return Err(CoreError::InvalidConfig(format!(
                "voiceprint segment is zero bytes (sample_rate={}, segment_duration_ms={})",
                config.sample_rate, config.segment_duration_ms
            )));
        }
        Ok(Self {
            model,
            hasher,
            config,
        })
    }

    fn segment_bytes(&self) -> usize {
        self.config.sample_rate * 2 * self.config.segment_duration_ms / 1000
    }

    fn is_pcm_mime(mime_type: &str) -> bool {
        mime_type == "audio/pcm" || mime_type.starts_with("audio/pcm;")
    }
}

#[async_trait]
impl Transformer for VoiceprintTransformer {
    async fn transform(
        &self,
        _pattern: &str,
        mut input: Box<dyn Stream>,
    ) -> Result<Box<dyn Stream>, CoreError> {
        let (tx, rx) = mpsc::channel(128);

        let model = Arc::clone(&self.model);
        let hasher = Arc::clone(&self.hasher);
        let seg_bytes = self.segment_bytes();
        let detector_cfg = DetectorConfig {
            window_size: self.config.detector_window_size,
            min_ratio: self.config.detector_min_ratio,
        };

        tokio::spawn(async move {
            // A fresh detector per invocation; the model and hasher are the
            // shared, read-only parts of the pipeline.
            let mut detector = Detector::with_config(detector_cfg);
            let mut pcm_buf = Vec::<u8>::new();
            let mut label = String::new();

            loop {
                match input.next().await {
                    Ok(Some(mut chunk)) => {
                        let is_pcm = chunk
                            .part
                            .as_ref()
                            .and_then(Part::as_blob)
                            .is_some_and(|b| VoiceprintTransformer::is_pcm_mime(&b.mime_type));

                        if !is_pcm {
                            // Non-PCM content and unrelated markers pass
                            // through untouched.
                            if tx.send(Ok(chunk)).await.is_err() {
                                return;
                            }
                            continue;
                        }

                        if chunk.is_end_of_stream() {
                            // Flush the tail, best effort, so the final
                            // label reflects all audio of the sub-stream.
                            if !pcm_buf.is_empty() {
                                label = analyze(&*model, &hasher, &mut detector, &pcm_buf, label);
                                pcm_buf.clear();
                            }
                            annotate(&mut chunk, &label);
                            if tx.send(Ok(chunk)).await.is_err() {
                                return;
                            }
                            continue;
                        }

                        if let Some(blob) = chunk.part.as_ref().and_then(Part::as_blob) {
                            pcm_buf.extend_from_slice(&blob.data);
                        }
                        let mut consumed = 0;
                        while pcm_buf.len() - consumed >= seg_bytes {
                            label = analyze(
                                &*model,
                                &hasher,
                                &mut detector,
                                &pcm_buf[consumed..consumed + seg_bytes],
                                label,
                            );
                            consumed += seg_bytes;
                        }
                        if consumed > 0 {
                            pcm_buf.drain(..consumed);
                        }

                        annotate(&mut chunk, &label);
                        if tx.send(Ok(chunk)).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => {
                        if !pcm_buf.is_empty() {
                            let _ = analyze(&*model, &hasher, &mut detector, &pcm_buf, label);
                        }
                        return;
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        });

        Ok(channel_stream(rx))
    }
}

/// Runs one analysis segment; returns the label to carry forward.
fn analyze(
    model: &dyn VoiceprintModel,
    hasher: &Hasher,
    detector: &mut Detector,
    pcm: &[u8],
    current: String,
) -> String {
    let embedding = match model.extract(pcm) {
        Ok(v) => v,
        Err(e) => {
            tracing::debug!(error = %e, "voiceprint extract failed, keeping label");
            return current;
        }
    };
    let hash = match hasher.hash(&embedding) {
        Ok(h) => h,
        Err(e) => {
            tracing::debug!(error = %e, "voiceprint hash failed, keeping label");
            return current;
        }
    };
    match detector.feed(&hash) {
        Some(d) if d.status != SpeakerStatus::Unknown => d.speaker,
        _ => current,
    }
}

fn annotate(chunk: &mut MessageChunk, label: &str) {
    if label.is_empty() {
        return;
    }
    chunk.ctrl.get_or_insert_with(Default::default).label = label.to_string();
}
