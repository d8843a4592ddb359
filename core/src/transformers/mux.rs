//! Pattern-routed transformer dispatch and session facades.

use std::sync::{Arc, OnceLock, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;

use talkbox_trie::{Trie, TrieError};

use crate::error::CoreError;
use crate::stream::Stream;
use crate::stream_utils::channel_stream;
use crate::transformer::Transformer;
use crate::types::{MessageChunk, Role, mime};

/// Routes `transform` calls to registered transformers by pattern.
///
/// Patterns are `/`-separated strings resolved through a trie; lookups used
/// by the mux are exact (no wildcards). Registering a pattern twice is an
/// error. TTS and ASR transformers live in parallel tables so callers can
/// open typed sessions over them.
pub struct TransformerMux {
    routes: Trie<Arc<dyn Transformer>>,
    tts_routes: Trie<Arc<dyn Transformer>>,
    asr_routes: Trie<Arc<dyn Transformer>>,
}

impl Default for TransformerMux {
    fn default() -> Self {
        Self::new()
    }
}

impl TransformerMux {
    pub fn new() -> Self {
        Self {
            routes: Trie::new(),
            tts_routes: Trie::new(),
            asr_routes: Trie::new(),
        }
    }

    /// Registers a generic transformer.
    pub fn handle(
        &mut self,
        pattern: impl Into<String>,
        t: Arc<dyn Transformer>,
    ) -> Result<(), CoreError> {
        let pattern = pattern.into();
        self.routes
            .insert(&pattern, t)
            .map_err(|e| register_err(&pattern, e))
    }

    /// Registers a TTS transformer under both the TTS table and the
    /// generic table.
    pub fn handle_tts(
        &mut self,
        pattern: impl Into<String>,
        t: Arc<dyn Transformer>,
    ) -> Result<(), CoreError> {
        let pattern = pattern.into();
        self.tts_routes
            .insert(&pattern, Arc::clone(&t))
            .map_err(|e| register_err(&pattern, e))?;
        if !self.routes.contains_pattern(&pattern) {
            self.routes
                .insert(&pattern, t)
                .map_err(|e| register_err(&pattern, e))?;
        }
        Ok(())
    }

    /// Registers an ASR transformer under both the ASR table and the
    /// generic table.
    pub fn handle_asr(
        &mut self,
        pattern: impl Into<String>,
        t: Arc<dyn Transformer>,
    ) -> Result<(), CoreError> {
        let pattern = pattern.into();
        self.asr_routes
            .insert(&pattern, Arc::clone(&t))
            .map_err(|e| register_err(&pattern, e))?;
        if !self.routes.contains_pattern(&pattern) {
            self.routes
                .insert(&pattern, t)
                .map_err(|e| register_err(&pattern, e))?;
        }
        Ok(())
    }

    /// Resolves a generic transformer.
    pub fn get(&self, pattern: &str) -> Result<Arc<dyn Transformer>, CoreError> {
        self.routes
            .get(pattern)
            .cloned()
            .ok_or_else(|| lookup_err(pattern))
    }

    /// Resolves a TTS transformer.
    pub fn get_tts(&self, pattern: &str) -> Result<Arc<dyn Transformer>, CoreError> {
        self.tts_routes
            .get(pattern)
            .cloned()
            .ok_or_else(|| lookup_err(pattern))
    }

    /// Resolves an ASR transformer.
    pub fn get_asr(&self, pattern: &str) -> Result<Arc<dyn Transformer>, CoreError> {
        self.asr_routes
            .get(pattern)
            .cloned()
            .ok_or_else(|| lookup_err(pattern))
    }

    /// Opens a text-in / audio-out session over the TTS transformer
    /// registered at `pattern`.
    pub async fn open_tts(&self, pattern: &str) -> Result<TtsSession, CoreError> {
        let t = self.get_tts(pattern)?;
        let (tx, rx) = mpsc::channel(64);
        let output = t.transform(pattern, channel_stream(rx)).await?;
        Ok(TtsSession {
            input: Some(tx),
            output,
        })
    }

    /// Opens an audio-in / text-out session over the ASR transformer
    /// registered at `pattern`.
    pub async fn open_asr(&self, pattern: &str) -> Result<AsrStreamSession, CoreError> {
        let t = self.get_asr(pattern)?;
        let (tx, rx) = mpsc::channel(64);
        let output = t.transform(pattern, channel_stream(rx)).await?;
        Ok(AsrStreamSession {
            input: Some(tx),
            output,
        })
    }
}

fn register_err(pattern: &str, e: TrieError) -> CoreError {
    match e {
        TrieError::Duplicate(_) => {
            CoreError::msg(format!("transformer already registered for {pattern}"))
        }
        TrieError::InvalidPattern(_) => {
            CoreError::InvalidConfig(format!("invalid transformer pattern: {pattern}"))
        }
    }
}

fn lookup_err(pattern: &str) -> CoreError {
    CoreError::msg(format!("transformer not found for {pattern}"))
}

#[async_trait]
impl Transformer for TransformerMux {
    async fn transform(
        &self,
        pattern: &str,
        input: Box<dyn Stream>,
    ) -> Result<Box<dyn Stream>, CoreError> {
        let t = self.get(pattern)?;
        t.transform(pattern, input).await
    }
}

/// Caller-facing TTS session: push text, read synthesized audio.
pub struct TtsSession {
    input: Option<mpsc::Sender<Result<MessageChunk, CoreError>>>,
    output: Box<dyn Stream>,
}

impl TtsSession {
    /// Sends a text fragment to synthesize.
    pub async fn send(&self, text: impl Into<String>) -> Result<(), CoreError> {
        let tx = self
            .input
            .as_ref()
            .ok_or_else(|| CoreError::msg("tts session already closed"))?;
        tx.send(Ok(MessageChunk::text(Role::Model, text)))
            .await
            .map_err(|_| CoreError::msg("tts session input closed"))
    }

    /// Flushes the session: pushes a `text/plain` end-of-stream marker and
    /// closes the input.
    pub async fn close(&mut self) -> Result<(), CoreError> {
        if let Some(tx) = self.input.take() {
            let _ = tx.send(Ok(MessageChunk::new_text_end_of_stream())).await;
        }
        Ok(())
    }

    /// The synthesized audio stream.
    pub fn output(&mut self) -> &mut Box<dyn Stream> {
        &mut self.output
    }

    /// Closes input and output.
    pub async fn close_all(&mut self) -> Result<(), CoreError> {
        self.close().await?;
        self.output.close().await
    }
}

/// Caller-facing streaming ASR session: push audio, read transcripts.
pub struct AsrStreamSession {
    input: Option<mpsc::Sender<Result<MessageChunk, CoreError>>>,
    output: Box<dyn Stream>,
}

impl AsrStreamSession {
    /// Sends audio with the default `audio/opus` MIME.
    pub async fn send(&self, data: Vec<u8>) -> Result<(), CoreError> {
        self.send_audio(mime::AUDIO_OPUS, data).await
    }

    /// Sends audio with an explicit MIME type.
    pub async fn send_audio(
        &self,
        mime_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Result<(), CoreError> {
        let tx = self
            .input
            .as_ref()
            .ok_or_else(|| CoreError::msg("asr session already closed"))?;
        tx.send(Ok(MessageChunk::blob(Role::User, mime_type, data)))
            .await
            .map_err(|_| CoreError::msg("asr session input closed"))
    }

    /// Flushes the session: pushes an `audio/opus` end-of-stream marker and
    /// closes the input.
    pub async fn close(&mut self) -> Result<(), CoreError> {
        if let Some(tx) = self.input.take() {
            let _ = tx
                .send(Ok(MessageChunk::new_end_of_stream(mime::AUDIO_OPUS)))
                .await;
        }
        Ok(())
    }

    /// The transcript stream.
    pub fn output(&mut self) -> &mut Box<dyn Stream> {
        &mut self.output
    }

    /// Closes input and output.
    pub async fn close_all(&mut self) -> Result<(), CoreError> {
        self.close().await?;
        self.output.close().await
    }
}

static DEFAULT_MUX: OnceLock<RwLock<TransformerMux>> = OnceLock::new();

/// The process-wide transformer mux, constructed lazily.
pub fn default_mux() -> &'static RwLock<TransformerMux> {
    DEFAULT_MUX.get_or_init(|| RwLock::new(TransformerMux::new()))
}

/// Registers a transformer on the process-wide mux.
pub fn handle(pattern: impl Into<String>, t: Arc<dyn Transformer>) -> Result<(), CoreError> {
    default_mux()
        .write()
        .map_err(|_| CoreError::msg("default mux poisoned"))?
        .handle(pattern, t)
}

/// Transforms through the process-wide mux.
pub async fn transform(
    pattern: &str,
    input: Box<dyn Stream>,
) -> Result<Box<dyn Stream>, CoreError> {
    let t = {
        let mux = default_mux()
            .read()
            .map_err(|_| CoreError::msg("default mux poisoned"))?;
        mux.get(pattern)?
    };
    t.transform(pattern, input).await
}
