//! Text-to-speech transformation core.
//!
//! Provider-agnostic: the session contract is [`TtsProvider`], implemented
//! by concrete synthesizer clients elsewhere. The transformer accumulates
//! text across chunks and flushes the whole utterance to the provider on a
//! text end-of-stream marker (or input EOF), bracketing the synthesized
//! audio with BOS/EoS markers that share one stream id.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::stream::Stream;
use crate::stream_id::new_stream_id;
use crate::stream_utils::channel_stream;
use crate::transformer::Transformer;
use crate::types::{MessageChunk, Part, Role, StreamCtrl};

/// A synthesizer session: turns one utterance into streamed audio bytes.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    /// MIME type of the produced audio (`audio/ogg`, `audio/mpeg`,
    /// `audio/pcm`, `audio/wav`, `audio/flac`).
    fn mime_type(&self) -> &str;

    /// Synthesizes `text`, pushing audio fragments into `sink` as they
    /// become available.
    async fn synthesize(
        &self,
        text: &str,
        options: &TtsOptions,
        sink: &mut dyn AudioSink,
    ) -> Result<(), CoreError>;
}

/// Receives synthesized audio fragments.
#[async_trait]
pub trait AudioSink: Send {
    async fn write(&mut self, audio: Vec<u8>) -> Result<(), CoreError>;
}

/// Per-transformer synthesis options.
#[derive(Debug, Clone)]
pub struct TtsOptions {
    /// Speaker / voice id.
    pub speaker: String,
    /// Output container/codec name understood by the provider.
    pub format: String,
    pub sample_rate: i32,
    pub bit_rate: i32,
    /// Speaking rate, 0.2 - 3.0.
    pub speed: f32,
    /// Loudness, 0.1 - 3.0.
    pub volume: f32,
    /// Pitch shift, 0.1 - 3.0.
    pub pitch: f32,
    pub emotion: Option<String>,
    pub language: Option<String>,
}

impl Default for TtsOptions {
    fn default() -> Self {
        Self {
            speaker: String::new(),
            format: "ogg".to_string(),
            sample_rate: 24_000,
            bit_rate: 64_000,
            speed: 1.0,
            volume: 1.0,
            pitch: 1.0,
            emotion: None,
            language: None,
        }
    }
}

impl TtsOptions {
    fn validate(&self) -> Result<(), CoreError> {
        if !(0.2..=3.0).contains(&self.speed) {
            return Err(CoreError::InvalidConfig(format!(
                "tts speed {} out of range 0.2..3.0",
                self.speed
            )));
        }
        if !(0.1..=3.0).contains(&self.volume) {
            return Err(CoreError::InvalidConfig(format!(
                "tts volume {} out of range 0.1..3.0",
                self.volume
            )));
        }
        if !(0.1..=3.0).contains(&self.pitch) {
            return Err(CoreError::InvalidConfig(format!(
                "tts pitch {} out of range 0.1..3.0",
                self.pitch
            )));
        }
        Ok(())
    }
}

/// Text-to-audio transformer over a [`TtsProvider`].
pub struct TtsTransformer {
    provider: Arc<dyn TtsProvider>,
    options: TtsOptions,
}

impl TtsTransformer {
    pub fn new(provider: Arc<dyn TtsProvider>) -> Result<Self, CoreError> {
        Self::with_options(provider, TtsOptions::default())
    }

    pub fn with_options(
        provider: Arc<dyn TtsProvider>,
        options: TtsOptions,
    ) -> Result<Self, CoreError> {
        options.validate()?;
        Ok(Self { provider, options })
    }
}

#[async_trait]
impl Transformer for TtsTransformer {
    async fn transform(
        &self,
        _pattern: &str,
        input: Box<dyn Stream>,
    ) -> Result<Box<dyn Stream>, CoreError> {
        let (tx, rx) = mpsc::channel(128);
        let provider = Arc::clone(&self.provider);
        let options = self.options.clone();
        tokio::spawn(async move {
            run_tts_loop(provider, options, input, tx).await;
        });
        Ok(channel_stream(rx))
    }
}

type OutTx = mpsc::Sender<Result<MessageChunk, CoreError>>;

async fn run_tts_loop(
    provider: Arc<dyn TtsProvider>,
    options: TtsOptions,
    mut input: Box<dyn Stream>,
    tx: OutTx,
) {
    let mut text_buffer = String::new();
    let mut last_meta: Option<MessageChunk> = None;
    let mut stream_id = String::new();

    loop {
        match input.next().await {
            Ok(Some(chunk)) => {
                if let Some(id) = chunk.stream_id() {
                    stream_id = id.to_string();
                }

                if chunk.is_end_of_stream() {
                    match chunk.part.as_ref() {
                        // Our input MIME: flush and translate the marker.
                        Some(Part::Text(_)) => {
                            let meta = last_meta.clone().or_else(|| Some(chunk.clone()));
                            if stream_id.is_empty() {
                                stream_id = new_stream_id();
                            }
                            if !flush(&provider, &options, &mut text_buffer, &meta, &stream_id, &tx)
                                .await
                            {
                                return;
                            }

                            let eos = with_meta(
                                &meta,
                                MessageChunk {
                                    role: chunk.role,
                                    name: chunk.name.clone(),
                                    part: Some(Part::blob(provider.mime_type(), Vec::<u8>::new())),
                                    tool_call: None,
                                    ctrl: Some(StreamCtrl {
                                        stream_id: stream_id.clone(),
                                        end_of_stream: true,
                                        ..Default::default()
                                    }),
                                },
                            );
                            if tx.send(Ok(eos)).await.is_err() {
                                return;
                            }
                            stream_id.clear();
                        }
                        // Unrelated markers pass through.
                        _ => {
                            if tx.send(Ok(chunk)).await.is_err() {
                                return;
                            }
                        }
                    }
                    continue;
                }

                match chunk.part.as_ref() {
                    Some(Part::Text(text)) => {
                        text_buffer.push_str(text);
                        last_meta = Some(chunk.clone());
                    }
                    // Non-text content passes through unchanged.
                    _ => {
                        if tx.send(Ok(chunk)).await.is_err() {
                            return;
                        }
                    }
                }
            }
            Ok(None) => {
                if stream_id.is_empty() {
                    stream_id = new_stream_id();
                }
                let meta = last_meta.clone();
                let _ = flush(&provider, &options, &mut text_buffer, &meta, &stream_id, &tx).await;
                return;
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        }
    }
}

/// Runs one synthesis over the buffered text; true when the loop may
/// continue.
async fn flush(
    provider: &Arc<dyn TtsProvider>,
    options: &TtsOptions,
    text_buffer: &mut String,
    meta: &Option<MessageChunk>,
    stream_id: &str,
    tx: &OutTx,
) -> bool {
    if text_buffer.is_empty() {
        return true;
    }

    let bos = with_meta(
        meta,
        MessageChunk {
            role: Role::Model,
            name: None,
            part: None,
            tool_call: None,
            ctrl: Some(StreamCtrl {
                stream_id: stream_id.to_string(),
                begin_of_stream: true,
                ..Default::default()
            }),
        },
    );
    if tx.send(Ok(bos)).await.is_err() {
        return false;
    }

    let mut sink = TxSink {
        tx,
        meta,
        stream_id,
        mime_type: provider.mime_type(),
    };
    if let Err(e) = provider.synthesize(text_buffer, options, &mut sink).await {
        let _ = tx.send(Err(e)).await;
        return false;
    }

    text_buffer.clear();
    true
}

struct TxSink<'a> {
    tx: &'a OutTx,
    meta: &'a Option<MessageChunk>,
    stream_id: &'a str,
    mime_type: &'a str,
}

#[async_trait]
impl AudioSink for TxSink<'_> {
    async fn write(&mut self, audio: Vec<u8>) -> Result<(), CoreError> {
        if audio.is_empty() {
            return Ok(());
        }
        let chunk = with_meta(
            self.meta,
            MessageChunk {
                role: Role::Model,
                name: None,
                part: Some(Part::blob(self.mime_type, audio)),
                tool_call: None,
                ctrl: Some(StreamCtrl {
                    stream_id: self.stream_id.to_string(),
                    ..Default::default()
                }),
            },
        );
        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| CoreError::msg("tts output closed"))
    }
}

fn with_meta(meta: &Option<MessageChunk>, mut chunk: MessageChunk) -> MessageChunk {
    if let Some(m) = meta {
        chunk.role = m.role;
        chunk.name = m.name.clone();
    }
    chunk
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Usage;
    use crate::stream::StreamBuilder;
    use crate::types::mime;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    struct MockProvider {
        mime: &'static str,
        fragments: Mutex<Vec<Result<Vec<u8>, CoreError>>>,
        calls: AtomicUsize,
    }

    impl MockProvider {
        fn of(fragments: Vec<Result<Vec<u8>, CoreError>>) -> Arc<Self> {
            Arc::new(Self {
                mime: mime::AUDIO_MPEG,
                fragments: Mutex::new(fragments),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TtsProvider for MockProvider {
        fn mime_type(&self) -> &str {
            self.mime
        }

        async fn synthesize(
            &self,
            _text: &str,
            _options: &TtsOptions,
            sink: &mut dyn AudioSink,
        ) -> Result<(), CoreError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let fragments = std::mem::take(&mut *self.fragments.lock().await);
            for f in fragments {
                sink.write(f?).await?;
            }
            Ok(())
        }
    }

    fn input_of(chunks: Vec<MessageChunk>) -> Box<dyn Stream> {
        let builder = StreamBuilder::new(32);
        builder.add(&chunks).unwrap();
        builder.done(Usage::default()).unwrap();
        Box::new(builder.stream())
    }

    async fn run(
        provider: Arc<MockProvider>,
        chunks: Vec<MessageChunk>,
    ) -> Vec<MessageChunk> {
        let t = TtsTransformer::new(provider).unwrap();
        let mut out = t.transform("tts/mock", input_of(chunks)).await.unwrap();
        let mut got = Vec::new();
        loop {
            match out.next().await {
                Ok(Some(c)) => got.push(c),
                Ok(None) => break,
                Err(e) if e.is_done() => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        got
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn text_then_eos_becomes_audio_then_eos() {
        let provider = MockProvider::of(vec![Ok(vec![1, 2, 3]), Ok(vec![4, 5])]);
        let out = run(
            Arc::clone(&provider),
            vec![
                MessageChunk::text(Role::Model, "hello"),
                MessageChunk::new_text_end_of_stream(),
            ],
        )
        .await;

        // BOS, two audio blobs, translated EoS; no text chunks at all.
        assert_eq!(out.len(), 4);
        assert!(out[0].is_begin_of_stream());
        for c in &out[1..3] {
            let blob = c.part.as_ref().unwrap().as_blob().unwrap();
            assert_eq!(blob.mime_type, mime::AUDIO_MPEG);
            assert!(!blob.data.is_empty());
        }
        let eos = &out[3];
        assert!(eos.is_end_of_stream());
        assert_eq!(
            eos.part.as_ref().unwrap().as_blob().unwrap().mime_type,
            mime::AUDIO_MPEG
        );
        assert!(out.iter().all(|c| !c.part.as_ref().is_some_and(Part::is_text)));

        // BOS, audio, and EoS share one stream id.
        let sid = out[0].stream_id().unwrap().to_string();
        assert!(out.iter().all(|c| c.stream_id() == Some(sid.as_str())));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn multiple_text_chunks_accumulate_into_one_synthesis() {
        let provider = MockProvider::of(vec![Ok(vec![9])]);
        let out = run(
            Arc::clone(&provider),
            vec![
                MessageChunk::text(Role::Model, "one "),
                MessageChunk::text(Role::Model, "utterance"),
                MessageChunk::new_text_end_of_stream(),
            ],
        )
        .await;

        assert_eq!(provider.calls.load(Ordering::Relaxed), 1);
        assert_eq!(out.len(), 3); // BOS + blob + EoS
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn empty_text_eos_emits_only_translated_eos() {
        let provider = MockProvider::of(vec![]);
        let out = run(provider, vec![MessageChunk::new_text_end_of_stream()]).await;
        assert_eq!(out.len(), 1);
        assert!(out[0].is_end_of_stream());
        assert!(matches!(out[0].part, Some(Part::Blob(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn eof_flushes_without_marker() {
        let provider = MockProvider::of(vec![Ok(vec![7])]);
        let out = run(provider, vec![MessageChunk::text(Role::Model, "tail")]).await;
        assert_eq!(out.len(), 2); // BOS + blob, no EoS on bare EOF
        assert!(out[0].is_begin_of_stream());
        assert!(!out[1].is_end_of_stream());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn role_and_name_come_from_last_text_chunk() {
        let provider = MockProvider::of(vec![Ok(vec![1])]);
        let mut named = MessageChunk::text(Role::Model, "hi");
        named.name = Some("bot".into());
        let out = run(provider, vec![named, MessageChunk::new_text_end_of_stream()]).await;
        for c in &out {
            assert_eq!(c.role, Role::Model);
            assert_eq!(c.name.as_deref(), Some("bot"));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn provider_failure_closes_output_with_error() {
        let provider = MockProvider::of(vec![
            Ok(vec![1]),
            Err(CoreError::msg("synthesizer fell over")),
        ]);
        let t = TtsTransformer::new(provider).unwrap();
        let mut out = t
            .transform(
                "tts/mock",
                input_of(vec![
                    MessageChunk::text(Role::Model, "hello"),
                    MessageChunk::new_text_end_of_stream(),
                ]),
            )
            .await
            .unwrap();

        let _bos = out.next().await.unwrap().unwrap();
        let _audio = out.next().await.unwrap().unwrap();
        let err = out.next().await.unwrap_err();
        assert!(err.to_string().contains("synthesizer fell over"));
    }

    #[tokio::test]
    async fn options_are_validated() {
        let provider = MockProvider::of(vec![]);
        let options = TtsOptions {
            speed: 5.0,
            ..TtsOptions::default()
        };
        assert!(TtsTransformer::with_options(provider, options).is_err());
    }
}
