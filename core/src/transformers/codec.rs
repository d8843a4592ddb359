//! MP3 to OGG/Opus transcoding transformer.
//!
//! MP3 bytes accumulate until an `audio/mp3` end-of-stream marker (or input
//! EOF); the buffer is then decoded to PCM, encoded into 20 ms Opus frames
//! at the configured bitrate, wrapped in an OGG container, and emitted as a
//! single `audio/ogg` blob. The translated `audio/ogg` marker follows only
//! on an explicit EoS.
//!
//! The conversion step is injected so the transformer works without a
//! native Opus encoder; with the `libopus` feature,
//! [`Mp3ToOggTransformer::new`] wires up the real converter.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::stream::Stream;
use crate::stream_utils::channel_stream;
use crate::transformer::Transformer;
use crate::types::{MessageChunk, Part, mime};

/// Transcoding parameters.
#[derive(Debug, Clone)]
pub struct Mp3ToOggConfig {
    /// Opus bitrate in bits per second.
    pub bitrate: i32,
    /// Opus frame duration in milliseconds.
    pub frame_ms: u32,
}

impl Default for Mp3ToOggConfig {
    fn default() -> Self {
        Self {
            bitrate: 64_000,
            frame_ms: 20,
        }
    }
}

/// Converts buffered MP3 bytes into OGG/Opus container bytes.
pub type ConvertFn = dyn Fn(&[u8], &Mp3ToOggConfig) -> Result<Vec<u8>, CoreError> + Send + Sync;

/// MP3 -> OGG transformer.
pub struct Mp3ToOggTransformer {
    config: Mp3ToOggConfig,
    convert: Arc<ConvertFn>,
}

impl Mp3ToOggTransformer {
    /// Transcoder backed by the native Opus encoder.
    #[cfg(feature = "libopus")]
    pub fn new(config: Mp3ToOggConfig) -> Self {
        Self::with_converter(config, Arc::new(convert_mp3_to_ogg))
    }

    /// Transcoder with an injected conversion step.
    pub fn with_converter(config: Mp3ToOggConfig, convert: Arc<ConvertFn>) -> Self {
        Self { config, convert }
    }

    fn is_mp3_mime(mime_type: &str) -> bool {
        mime_type == mime::AUDIO_MP3 || mime_type == mime::AUDIO_MPEG
    }
}

#[async_trait]
impl Transformer for Mp3ToOggTransformer {
    async fn transform(
        &self,
        _pattern: &str,
        mut input: Box<dyn Stream>,
    ) -> Result<Box<dyn Stream>, CoreError> {
        let (tx, rx) = mpsc::channel(128);
        let config = self.config.clone();
        let convert = Arc::clone(&self.convert);

        tokio::spawn(async move {
            let mut mp3_buf = Vec::<u8>::new();
            let mut last_meta: Option<MessageChunk> = None;

            loop {
                match input.next().await {
                    Ok(Some(chunk)) => {
                        if chunk.is_end_of_stream() {
                            let is_mp3_eos = chunk
                                .part
                                .as_ref()
                                .is_some_and(|p| Mp3ToOggTransformer::is_mp3_mime(p.mime_type()));
                            if is_mp3_eos {
                                if !flush(&convert, &config, &mut mp3_buf, &last_meta, &tx).await {
                                    return;
                                }
                                let mut eos = MessageChunk::new_end_of_stream(mime::AUDIO_OGG);
                                let meta = last_meta.as_ref().unwrap_or(&chunk);
                                eos.role = meta.role;
                                eos.name = meta.name.clone();
                                if tx.send(Ok(eos)).await.is_err() {
                                    return;
                                }
                            } else if tx.send(Ok(chunk)).await.is_err() {
                                // Unrelated markers pass through.
                                return;
                            }
                            continue;
                        }

                        let is_mp3 = chunk
                            .part
                            .as_ref()
                            .and_then(Part::as_blob)
                            .is_some_and(|b| Mp3ToOggTransformer::is_mp3_mime(&b.mime_type));
                        if is_mp3 {
                            let blob = chunk.part.as_ref().and_then(Part::as_blob).unwrap();
                            mp3_buf.extend_from_slice(&blob.data);
                            last_meta = Some(chunk);
                        } else if tx.send(Ok(chunk)).await.is_err() {
                            // Non-MP3 content passes through.
                            return;
                        }
                    }
                    Ok(None) => {
                        let _ = flush(&convert, &config, &mut mp3_buf, &last_meta, &tx).await;
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

async fn flush(
    convert: &Arc<ConvertFn>,
    config: &Mp3ToOggConfig,
    mp3_buf: &mut Vec<u8>,
    last_meta: &Option<MessageChunk>,
    tx: &mpsc::Sender<Result<MessageChunk, CoreError>>,
) -> bool {
    if mp3_buf.is_empty() {
        return true;
    }
    let ogg = match (convert.as_ref())(mp3_buf, config) {
        Ok(ogg) => ogg,
        Err(e) => {
            let _ = tx.send(Err(e)).await;
            return false;
        }
    };
    mp3_buf.clear();

    let mut out = MessageChunk::blob(
        last_meta.as_ref().map_or(crate::types::Role::User, |c| c.role),
        mime::AUDIO_OGG,
        ogg,
    );
    if let Some(meta) = last_meta {
        out.name = meta.name.clone();
    }
    tx.send(Ok(out)).await.is_ok()
}

/// Decodes MP3 (probing sample rate and channels from the first frames)
/// and re-encodes as Opus-in-OGG.
#[cfg(feature = "libopus")]
pub fn convert_mp3_to_ogg(mp3: &[u8], config: &Mp3ToOggConfig) -> Result<Vec<u8>, CoreError> {
    use talkbox_audio::mp3::decode_mp3;
    use talkbox_audio::ogg::OpusWriter;
    use talkbox_audio::opus::OpusEncoder;

    let pcm = decode_mp3(mp3).map_err(|e| CoreError::msg(e.to_string()))?;
    let channels = pcm.channels.max(1) as usize;
    let frame_samples = pcm.sample_rate as usize * config.frame_ms as usize / 1000;
    let samples_per_frame = frame_samples * channels;

    let mut encoder = OpusEncoder::new(pcm.sample_rate as i32, channels as i32, config.bitrate)
        .map_err(|e| CoreError::msg(e.to_string()))?;

    let mut ogg = Vec::new();
    {
        let mut writer = OpusWriter::new(&mut ogg, pcm.sample_rate, channels as u8)
            .map_err(|e| CoreError::msg(e.to_string()))?;
        let granule_per_frame = 48 * config.frame_ms as i64;

        for frame in pcm.samples.chunks(samples_per_frame) {
            let packet = if frame.len() == samples_per_frame {
                encoder.encode(frame, frame_samples)
            } else {
                // Zero-pad the trailing partial frame.
                let mut padded = frame.to_vec();
                padded.resize(samples_per_frame, 0);
                encoder.encode(&padded, frame_samples)
            }
            .map_err(|e| CoreError::msg(e.to_string()))?;
            writer
                .write_frame(&packet, granule_per_frame)
                .map_err(|e| CoreError::msg(e.to_string()))?;
        }
        writer.close().map_err(|e| CoreError::msg(e.to_string()))?;
    }
    Ok(ogg)
}
