//! Speech-to-text transformation core.
//!
//! Provider-agnostic: concrete recognizer clients implement
//! [`AsrBackend`] / [`AsrSession`]. A session opens lazily on the first
//! audio blob; a receiver task drains recognition events and emits each
//! newly finished utterance as a text chunk. An audio end-of-stream marker
//! flushes the session and translates into a `text/plain` marker, after
//! which a fresh sub-stream may begin.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::CoreError;
use crate::stream::Stream;
use crate::stream_utils::channel_stream;
use crate::transformer::Transformer;
use crate::types::{MessageChunk, Part, Role};

/// Recognizer session options.
#[derive(Debug, Clone)]
pub struct AsrOptions {
    /// Audio container/codec name understood by the provider.
    pub format: String,
    pub sample_rate: i32,
    pub channels: i32,
    pub bits: i32,
    pub language: Option<String>,
    /// Inverse text normalization.
    pub enable_itn: bool,
    /// Punctuation restoration.
    pub enable_punc: bool,
    pub hotwords: Vec<String>,
    /// Provider-specific result granularity selector.
    pub result_type: Option<String>,
}

impl Default for AsrOptions {
    fn default() -> Self {
        Self {
            format: "ogg".to_string(),
            sample_rate: 16_000,
            channels: 1,
            bits: 16,
            language: None,
            enable_itn: true,
            enable_punc: true,
            hotwords: Vec::new(),
            result_type: None,
        }
    }
}

/// One recognized utterance.
#[derive(Debug, Clone, Default)]
pub struct AsrUtterance {
    pub text: String,
    /// End position of the utterance in the audio, in milliseconds.
    pub end_time_ms: i64,
    /// True once the recognizer will not revise this utterance.
    pub definite: bool,
}

/// One recognition event from the session.
#[derive(Debug, Clone, Default)]
pub struct AsrResult {
    pub text: String,
    pub utterances: Vec<AsrUtterance>,
    pub is_final: bool,
}

/// Opens recognizer sessions.
#[async_trait]
pub trait AsrBackend: Send + Sync {
    async fn open_session(&self, options: &AsrOptions) -> Result<Box<dyn AsrSession>, CoreError>;
}

/// One streaming recognition session. `recv` returning `Ok(None)` means
/// the session has drained after the final audio was sent.
#[async_trait]
pub trait AsrSession: Send + Sync {
    async fn send_audio(&self, audio: Vec<u8>, is_last: bool) -> Result<(), CoreError>;

    async fn recv(&self) -> Result<Option<AsrResult>, CoreError>;

    async fn close(&self) -> Result<(), CoreError>;
}

/// Audio-to-text transformer over an [`AsrBackend`].
pub struct AsrTransformer {
    backend: Arc<dyn AsrBackend>,
    options: AsrOptions,
}

impl AsrTransformer {
    pub fn new(backend: Arc<dyn AsrBackend>) -> Self {
        Self::with_options(backend, AsrOptions::default())
    }

    pub fn with_options(backend: Arc<dyn AsrBackend>, options: AsrOptions) -> Self {
        Self { backend, options }
    }
}

#[async_trait]
impl Transformer for AsrTransformer {
    async fn transform(
        &self,
        _pattern: &str,
        input: Box<dyn Stream>,
    ) -> Result<Box<dyn Stream>, CoreError> {
        let (tx, rx) = mpsc::channel(128);
        let backend = Arc::clone(&self.backend);
        let options = self.options.clone();
        tokio::spawn(async move {
            run_asr_loop(backend, options, input, tx).await;
        });
        Ok(channel_stream(rx))
    }
}

type OutTx = mpsc::Sender<Result<MessageChunk, CoreError>>;
type SharedMeta = Arc<StdMutex<(Role, Option<String>)>>;

struct ActiveSession {
    session: Arc<dyn AsrSession>,
    receiver: JoinHandle<()>,
}

async fn run_asr_loop(
    backend: Arc<dyn AsrBackend>,
    options: AsrOptions,
    mut input: Box<dyn Stream>,
    tx: OutTx,
) {
    let meta: SharedMeta = Arc::new(StdMutex::new((Role::User, None)));
    let mut active: Option<ActiveSession> = None;

    loop {
        match input.next().await {
            Ok(Some(chunk)) => {
                if chunk.is_end_of_stream() {
                    let is_audio_eos = chunk
                        .part
                        .as_ref()
                        .is_some_and(|p| p.mime_type().starts_with("audio/"));
                    if is_audio_eos {
                        if let Some(session) = active.take()
                            && !finish_session(session, &tx).await
                        {
                            return;
                        }
                        let (role, name) = meta.lock().unwrap().clone();
                        let mut eos = MessageChunk::new_text_end_of_stream();
                        eos.role = role;
                        eos.name = name;
                        if tx.send(Ok(eos)).await.is_err() {
                            return;
                        }
                    } else if tx.send(Ok(chunk)).await.is_err() {
                        // Unrelated markers pass through.
                        return;
                    }
                    continue;
                }

                let Some(blob) = chunk.part.as_ref().and_then(Part::as_blob) else {
                    // Non-audio content passes through unchanged.
                    if tx.send(Ok(chunk)).await.is_err() {
                        return;
                    }
                    continue;
                };
                if !blob.mime_type.starts_with("audio/") {
                    if tx.send(Ok(chunk)).await.is_err() {
                        return;
                    }
                    continue;
                }

                *meta.lock().unwrap() = (chunk.role, chunk.name.clone());

                if active.is_none() {
                    match open_session(&backend, &options, &meta, &tx).await {
                        Ok(session) => active = Some(session),
                        Err(e) => {
                            let _ = tx.send(Err(e)).await;
                            return;
                        }
                    }
                }

                let session = &active.as_ref().expect("session opened above").session;
                if let Err(e) = session.send_audio(blob.data.clone(), false).await {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
            Ok(None) => {
                // EOF behaves like an audio end-of-stream marker.
                if let Some(session) = active.take() {
                    if !finish_session(session, &tx).await {
                        return;
                    }
                    let (role, name) = meta.lock().unwrap().clone();
                    let mut eos = MessageChunk::new_text_end_of_stream();
                    eos.role = role;
                    eos.name = name;
                    let _ = tx.send(Ok(eos)).await;
                }
                return;
            }
            Err(e) => {
                if let Some(session) = active.take() {
                    session.receiver.abort();
                    let _ = session.session.close().await;
                }
                let _ = tx.send(Err(e)).await;
                return;
            }
        }
    }
}

async fn open_session(
    backend: &Arc<dyn AsrBackend>,
    options: &AsrOptions,
    meta: &SharedMeta,
    tx: &OutTx,
) -> Result<ActiveSession, CoreError> {
    let session: Arc<dyn AsrSession> = Arc::from(backend.open_session(options).await?);

    let receiver = {
        let session = Arc::clone(&session);
        let meta = Arc::clone(meta);
        let tx = tx.clone();
        tokio::spawn(async move {
            // Only utterances ending past this watermark are emitted.
            let mut emitted_end_ms = 0i64;
            loop {
                match session.recv().await {
                    Ok(Some(result)) => {
                        for utt in &result.utterances {
                            if !utt.definite || utt.end_time_ms <= emitted_end_ms {
                                continue;
                            }
                            emitted_end_ms = utt.end_time_ms;
                            if utt.text.is_empty() {
                                continue;
                            }
                            let (role, name) = meta.lock().unwrap().clone();
                            let mut chunk = MessageChunk::text(role, utt.text.clone());
                            chunk.name = name;
                            if tx.send(Ok(chunk)).await.is_err() {
                                return;
                            }
                        }
                        if result.is_final {
                            return;
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        })
    };

    Ok(ActiveSession { session, receiver })
}

/// Sends the final-audio marker, waits for the receiver to drain, and
/// closes the session. Returns false when the output is gone.
async fn finish_session(active: ActiveSession, tx: &OutTx) -> bool {
    if let Err(e) = active.session.send_audio(Vec::new(), true).await {
        active.receiver.abort();
        let _ = active.session.close().await;
        return tx.send(Err(e)).await.is_ok();
    }
    let _ = active.receiver.await;
    let _ = active.session.close().await;
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Usage;
    use crate::stream::StreamBuilder;
    use crate::types::mime;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    struct MockBackend {
        sessions_opened: AtomicUsize,
        script: Mutex<Vec<Vec<AsrResult>>>,
    }

    struct MockSession {
        results: Mutex<Vec<AsrResult>>,
        saw_last: AtomicUsize,
        audio_bytes: AtomicUsize,
    }

    #[async_trait]
    impl AsrBackend for MockBackend {
        async fn open_session(
            &self,
            _options: &AsrOptions,
        ) -> Result<Box<dyn AsrSession>, CoreError> {
            self.sessions_opened.fetch_add(1, Ordering::Relaxed);
            let results = self.script.lock().await.remove(0);
            Ok(Box::new(MockSession {
                results: Mutex::new(results),
                saw_last: AtomicUsize::new(0),
                audio_bytes: AtomicUsize::new(0),
            }))
        }
    }

    #[async_trait]
    impl AsrSession for MockSession {
        async fn send_audio(&self, audio: Vec<u8>, is_last: bool) -> Result<(), CoreError> {
            self.audio_bytes.fetch_add(audio.len(), Ordering::Relaxed);
            if is_last {
                self.saw_last.fetch_add(1, Ordering::Relaxed);
            }
            Ok(())
        }

        async fn recv(&self) -> Result<Option<AsrResult>, CoreError> {
            // Block until the final marker arrives, then replay results.
            loop {
                if self.saw_last.load(Ordering::Relaxed) > 0 {
                    let mut results = self.results.lock().await;
                    if results.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(results.remove(0)));
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        }

        async fn close(&self) -> Result<(), CoreError> {
            Ok(())
        }
    }

    fn utterance(text: &str, end_ms: i64, definite: bool) -> AsrUtterance {
        AsrUtterance {
            text: text.into(),
            end_time_ms: end_ms,
            definite,
        }
    }

    fn input_of(chunks: Vec<MessageChunk>) -> Box<dyn Stream> {
        let builder = StreamBuilder::new(32);
        builder.add(&chunks).unwrap();
        builder.done(Usage::default()).unwrap();
        Box::new(builder.stream())
    }

    async fn collect(out: &mut Box<dyn Stream>) -> Vec<MessageChunk> {
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
    async fn audio_eos_yields_text_and_translated_marker() {
        let backend = Arc::new(MockBackend {
            sessions_opened: AtomicUsize::new(0),
            script: Mutex::new(vec![vec![AsrResult {
                text: "hello world".into(),
                utterances: vec![
                    utterance("hello", 500, true),
                    utterance("world", 900, true),
                ],
                is_final: true,
            }]]),
        });

        let t = AsrTransformer::new(Arc::clone(&backend) as Arc<dyn AsrBackend>);
        let mut audio = MessageChunk::blob(Role::User, mime::AUDIO_OPUS, vec![1; 64]);
        audio.name = Some("mic".into());
        let mut out = t
            .transform(
                "asr/mock",
                input_of(vec![audio, MessageChunk::new_end_of_stream(mime::AUDIO_OPUS)]),
            )
            .await
            .unwrap();

        let got = collect(&mut out).await;
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].part.as_ref().unwrap().as_text(), Some("hello"));
        assert_eq!(got[0].role, Role::User);
        assert_eq!(got[0].name.as_deref(), Some("mic"));
        assert_eq!(got[1].part.as_ref().unwrap().as_text(), Some("world"));
        assert!(got[2].is_end_of_stream());
        assert_eq!(got[2].part.as_ref().unwrap().as_text(), Some(""));
        assert_eq!(backend.sessions_opened.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn watermark_skips_already_emitted_utterances() {
        let backend = Arc::new(MockBackend {
            sessions_opened: AtomicUsize::new(0),
            script: Mutex::new(vec![vec![
                AsrResult {
                    utterances: vec![utterance("one", 400, true)],
                    ..Default::default()
                },
                AsrResult {
                    utterances: vec![
                        utterance("one", 400, true),
                        utterance("stale", 300, true),
                        utterance("two", 800, true),
                        utterance("tentative", 1200, false),
                    ],
                    is_final: true,
                    ..Default::default()
                },
            ]]),
        });

        let t = AsrTransformer::new(backend as Arc<dyn AsrBackend>);
        let mut out = t
            .transform(
                "asr/mock",
                input_of(vec![
                    MessageChunk::blob(Role::User, mime::AUDIO_OPUS, vec![0; 32]),
                    MessageChunk::new_end_of_stream(mime::AUDIO_OPUS),
                ]),
            )
            .await
            .unwrap();

        let got = collect(&mut out).await;
        let texts: Vec<_> = got
            .iter()
            .filter(|c| !c.is_end_of_stream())
            .map(|c| c.part.as_ref().unwrap().as_text().unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn session_opens_lazily_per_substream() {
        let backend = Arc::new(MockBackend {
            sessions_opened: AtomicUsize::new(0),
            script: Mutex::new(vec![
                vec![AsrResult {
                    utterances: vec![utterance("first", 100, true)],
                    is_final: true,
                    ..Default::default()
                }],
                vec![AsrResult {
                    utterances: vec![utterance("second", 100, true)],
                    is_final: true,
                    ..Default::default()
                }],
            ]),
        });

        let t = AsrTransformer::new(Arc::clone(&backend) as Arc<dyn AsrBackend>);
        let mut out = t
            .transform(
                "asr/mock",
                input_of(vec![
                    MessageChunk::blob(Role::User, mime::AUDIO_OPUS, vec![0; 8]),
                    MessageChunk::new_end_of_stream(mime::AUDIO_OPUS),
                    MessageChunk::blob(Role::User, mime::AUDIO_OPUS, vec![0; 8]),
                    MessageChunk::new_end_of_stream(mime::AUDIO_OPUS),
                ]),
            )
            .await
            .unwrap();

        let got = collect(&mut out).await;
        let texts: Vec<_> = got
            .iter()
            .filter(|c| !c.is_end_of_stream())
            .map(|c| c.part.as_ref().unwrap().as_text().unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
        assert_eq!(got.iter().filter(|c| c.is_end_of_stream()).count(), 2);
        assert_eq!(backend.sessions_opened.load(Ordering::Relaxed), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn non_audio_content_passes_through() {
        let backend = Arc::new(MockBackend {
            sessions_opened: AtomicUsize::new(0),
            script: Mutex::new(vec![]),
        });
        let t = AsrTransformer::new(backend as Arc<dyn AsrBackend>);
        let mut out = t
            .transform(
                "asr/mock",
                input_of(vec![MessageChunk::text(Role::User, "typed instead")]),
            )
            .await
            .unwrap();

        let got = collect(&mut out).await;
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].part.as_ref().unwrap().as_text(), Some("typed instead"));
    }
}
