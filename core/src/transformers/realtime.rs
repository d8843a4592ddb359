//! Bidirectional realtime dialogue transformation.
//!
//! Provider-agnostic: concrete realtime clients implement
//! [`RealtimeConnector`] / [`RealtimeSession`]. User audio (and optional
//! text) flows in; model audio and text flow out, bracketed by BOS/EoS
//! markers correlated to the user turn that triggered them.
//!
//! Turn correlation uses a stream-id queue: input BOS markers push their
//! id, and the provider's user-turn-ended event pops the id that the next
//! model response is attributed to. When the queue is empty a fresh id is
//! synthesized, which also covers providers that emit responses without an
//! explicit turn boundary.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;
use crate::stream::Stream;
use crate::stream_id::new_stream_id;
use crate::stream_utils::channel_stream;
use crate::transformer::Transformer;
use crate::types::{MessageChunk, Part, Role, StreamCtrl};

/// Events a realtime provider session can emit.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    /// Incremental transcript of the user's speech.
    UserText { text: String },
    /// The provider decided the user's turn is over.
    UserTurnEnded,
    /// The model started a response turn, possibly announcing its text.
    BotTurnStarted { text: String },
    /// Model response text.
    BotText { text: String },
    /// Model response audio.
    BotAudio { data: Vec<u8> },
    /// The model finished its response turn.
    BotTurnFinished,
    /// A response cancel arrived with nothing in flight. Logged, ignored.
    NoActiveResponse,
    /// The provider closed the session.
    SessionEnded,
    /// The provider reported a fatal error.
    SessionFailed { message: String },
}

/// One live provider session.
#[async_trait]
pub trait RealtimeSession: Send + Sync {
    async fn send_audio(&self, audio: &[u8]) -> Result<(), CoreError>;

    async fn send_text(&self, text: &str) -> Result<(), CoreError>;

    /// The next server event; `None` once the session is closed.
    async fn recv(&self) -> Option<Result<RealtimeEvent, CoreError>>;

    /// Cancels the in-flight model response (barge-in).
    async fn cancel_response(&self) -> Result<(), CoreError>;

    /// Clears audio buffered on the provider side.
    async fn clear_audio_buffer(&self) -> Result<(), CoreError>;

    /// Commits buffered input audio and asks for a response (manual mode).
    async fn commit_and_respond(&self) -> Result<(), CoreError>;

    /// Applies a session configuration patch.
    async fn update_session(&self, patch: serde_json::Value) -> Result<(), CoreError>;

    async fn close(&self) -> Result<(), CoreError>;
}

/// Dials new provider sessions.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn connect(&self, options: &RealtimeOptions)
    -> Result<Box<dyn RealtimeSession>, CoreError>;
}

/// Session configuration.
#[derive(Debug, Clone)]
pub struct RealtimeOptions {
    pub voice: String,
    pub input_format: String,
    pub output_format: String,
    pub sample_rate: i32,
    pub bot_name: String,
    pub system_role: Option<String>,
    pub speaking_style: Option<String>,
    /// Provider-specific character/persona manifest.
    pub character: Option<serde_json::Value>,
    pub vad_window_ms: Option<u32>,
    /// Overrides the provider's turn detection mode.
    pub turn_detection: Option<String>,
    pub modalities: Vec<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub asr_enabled: bool,
    pub asr_model: Option<String>,
    /// Trailing silence appended after an input EoS so server-side VAD can
    /// commit the turn.
    pub trailing_silence: Duration,
}

impl Default for RealtimeOptions {
    fn default() -> Self {
        Self {
            voice: String::new(),
            input_format: "pcm16".to_string(),
            output_format: "pcm16".to_string(),
            sample_rate: 16_000,
            bot_name: String::new(),
            system_role: None,
            speaking_style: None,
            character: None,
            vad_window_ms: None,
            turn_detection: None,
            modalities: vec!["audio".to_string(), "text".to_string()],
            temperature: None,
            max_output_tokens: None,
            asr_enabled: true,
            asr_model: None,
            trailing_silence: Duration::from_millis(300),
        }
    }
}

/// Runtime controls over a running transform.
#[derive(Clone)]
pub struct RealtimeHandle {
    cmd_tx: mpsc::Sender<Command>,
}

enum Command {
    UpdateSession(serde_json::Value),
    CancelResponse,
    ClearAudioBuffer,
    TriggerResponse,
}

impl RealtimeHandle {
    pub async fn update_session(&self, patch: serde_json::Value) -> Result<(), CoreError> {
        self.send(Command::UpdateSession(patch)).await
    }

    pub async fn cancel_response(&self) -> Result<(), CoreError> {
        self.send(Command::CancelResponse).await
    }

    pub async fn clear_audio_buffer(&self) -> Result<(), CoreError> {
        self.send(Command::ClearAudioBuffer).await
    }

    /// Manual-mode commit plus response creation.
    pub async fn trigger_response(&self) -> Result<(), CoreError> {
        self.send(Command::TriggerResponse).await
    }

    async fn send(&self, cmd: Command) -> Result<(), CoreError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| CoreError::msg("realtime session is gone"))
    }
}

/// Bidirectional transformer over a [`RealtimeConnector`].
pub struct RealtimeTransformer {
    connector: Arc<dyn RealtimeConnector>,
    options: RealtimeOptions,
}

impl RealtimeTransformer {
    pub fn new(connector: Arc<dyn RealtimeConnector>) -> Self {
        Self::with_options(connector, RealtimeOptions::default())
    }

    pub fn with_options(connector: Arc<dyn RealtimeConnector>, options: RealtimeOptions) -> Self {
        Self { connector, options }
    }

    /// Connects and starts the transform, returning the output stream and
    /// a [`RealtimeHandle`] for runtime control.
    pub async fn transform_with_handle(
        &self,
        _pattern: &str,
        input: Box<dyn Stream>,
    ) -> Result<(Box<dyn Stream>, RealtimeHandle), CoreError> {
        let session: Arc<dyn RealtimeSession> =
            Arc::from(self.connector.connect(&self.options).await?);

        let (out_tx, out_rx) = mpsc::channel(128);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let options = self.options.clone();

        tokio::spawn(run_realtime(session, options, input, out_tx, cmd_rx));

        Ok((channel_stream(out_rx), RealtimeHandle { cmd_tx }))
    }
}

#[async_trait]
impl Transformer for RealtimeTransformer {
    async fn transform(
        &self,
        pattern: &str,
        input: Box<dyn Stream>,
    ) -> Result<Box<dyn Stream>, CoreError> {
        let (stream, _handle) = self.transform_with_handle(pattern, input).await?;
        Ok(stream)
    }
}

type OutTx = mpsc::Sender<Result<MessageChunk, CoreError>>;

#[derive(Default)]
struct TurnState {
    queued_ids: VecDeque<String>,
    response_id: String,
}

impl TurnState {
    fn push(&mut self, id: &str) {
        if !id.is_empty() {
            self.queued_ids.push_back(id.to_string());
        }
    }

    fn pop_for_response(&mut self) {
        self.response_id = self.queued_ids.pop_front().unwrap_or_else(new_stream_id);
    }

    fn response_id(&mut self) -> String {
        if self.response_id.is_empty() {
            self.response_id = new_stream_id();
        }
        self.response_id.clone()
    }
}

async fn run_realtime(
    session: Arc<dyn RealtimeSession>,
    options: RealtimeOptions,
    mut input: Box<dyn Stream>,
    out: OutTx,
    mut cmd_rx: mpsc::Receiver<Command>,
) {
    let turns = Arc::new(Mutex::new(TurnState::default()));
    let cancel = CancellationToken::new();

    let receiver = {
        let session = Arc::clone(&session);
        let out = out.clone();
        let turns = Arc::clone(&turns);
        let output_mime = output_mime(&options);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => return,
                    evt = session.recv() => evt,
                };
                match event {
                    Some(Ok(event)) => {
                        if !handle_event(&out, &output_mime, &turns, event).await {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        let _ = out.send(Err(e)).await;
                        return;
                    }
                    None => return,
                }
            }
        })
    };

    let mut failed = false;
    let mut cmd_open = true;
    loop {
        tokio::select! {
            chunk = input.next() => match chunk {
                Ok(Some(chunk)) => {
                    if let Err(e) = forward_input(&*session, &options, &turns, chunk).await {
                        let _ = out.send(Err(e)).await;
                        failed = true;
                        break;
                    }
                }
                Ok(None) => {
                    let _ = session.close().await;
                    break;
                }
                Err(e) => {
                    let _ = out.send(Err(e)).await;
                    let _ = session.close().await;
                    failed = true;
                    break;
                }
            },
            cmd = cmd_rx.recv(), if cmd_open => match cmd {
                Some(cmd) => {
                    if let Err(e) = apply_command(&*session, cmd).await {
                        tracing::warn!(error = %e, "realtime control command failed");
                    }
                }
                // All handles dropped; keep streaming.
                None => cmd_open = false,
            },
        }
    }

    if failed {
        // The session may not deliver a clean end after a hard failure;
        // tear the receiver down instead of waiting on it.
        cancel.cancel();
    }
    let _ = receiver.await;
}

fn output_mime(options: &RealtimeOptions) -> String {
    match options.output_format.as_str() {
        "pcm16" | "pcm" => "audio/pcm".to_string(),
        "ogg" | "ogg_opus" => "audio/ogg".to_string(),
        "mp3" => "audio/mpeg".to_string(),
        other => format!("audio/{other}"),
    }
}

async fn apply_command(session: &dyn RealtimeSession, cmd: Command) -> Result<(), CoreError> {
    match cmd {
        Command::UpdateSession(patch) => session.update_session(patch).await,
        Command::CancelResponse => session.cancel_response().await,
        Command::ClearAudioBuffer => session.clear_audio_buffer().await,
        Command::TriggerResponse => session.commit_and_respond().await,
    }
}

async fn forward_input(
    session: &dyn RealtimeSession,
    options: &RealtimeOptions,
    turns: &Arc<Mutex<TurnState>>,
    chunk: MessageChunk,
) -> Result<(), CoreError> {
    if chunk.is_begin_of_stream() {
        if let Some(id) = chunk.stream_id() {
            turns.lock().await.push(id);
        }
        // A new user turn interrupts whatever the model is saying.
        session.cancel_response().await?;
        return Ok(());
    }

    if chunk.is_end_of_stream() {
        // Feed enough silence for server-side VAD to see the turn end,
        // then commit explicitly.
        let silence = silence_bytes(options);
        if !silence.is_empty() {
            session.send_audio(&silence).await?;
        }
        session.commit_and_respond().await?;
        return Ok(());
    }

    match chunk.part {
        Some(Part::Blob(blob)) => {
            if blob.data.is_empty() || !blob.mime_type.starts_with("audio/") {
                return Ok(());
            }
            let pace = send_pace(options, blob.data.len());
            session.send_audio(&blob.data).await?;
            if !pace.is_zero() {
                tokio::time::sleep(pace).await;
            }
        }
        Some(Part::Text(text)) => {
            if !text.is_empty() {
                session.send_text(&text).await?;
            }
        }
        // Tool calls and other payloads are dropped.
        None => {}
    }
    Ok(())
}

/// PCM16 silence covering the configured trailing window.
fn silence_bytes(options: &RealtimeOptions) -> Vec<u8> {
    let ms = options.trailing_silence.as_millis() as usize;
    vec![0u8; options.sample_rate as usize * 2 * ms / 1000]
}

/// Sends are paced at roughly 3x real time so providers without
/// backpressure are not flooded.
fn send_pace(options: &RealtimeOptions, bytes: usize) -> Duration {
    let bytes_per_ms = options.sample_rate as usize * 2 / 1000;
    if bytes_per_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis((bytes / bytes_per_ms / 3) as u64)
}

/// Emits output chunks for one provider event; false ends the receive
/// loop.
async fn handle_event(
    out: &OutTx,
    output_mime: &str,
    turns: &Arc<Mutex<TurnState>>,
    event: RealtimeEvent,
) -> bool {
    match event {
        RealtimeEvent::UserText { text } => {
            if text.is_empty() {
                return true;
            }
            let stream_id = turns.lock().await.response_id();
            send(out, text_chunk(Role::User, text, stream_id)).await
        }
        RealtimeEvent::UserTurnEnded => {
            turns.lock().await.pop_for_response();
            true
        }
        RealtimeEvent::BotTurnStarted { text } => {
            let stream_id = turns.lock().await.response_id();
            let bos = MessageChunk {
                role: Role::Model,
                name: None,
                part: Some(Part::blob(output_mime, Vec::<u8>::new())),
                tool_call: None,
                ctrl: Some(StreamCtrl {
                    stream_id: stream_id.clone(),
                    begin_of_stream: true,
                    ..Default::default()
                }),
            };
            if !send(out, bos).await {
                return false;
            }
            if text.is_empty() {
                true
            } else {
                send(out, text_chunk(Role::Model, text, stream_id)).await
            }
        }
        RealtimeEvent::BotText { text } => {
            if text.is_empty() {
                return true;
            }
            let stream_id = turns.lock().await.response_id();
            send(out, text_chunk(Role::Model, text, stream_id)).await
        }
        RealtimeEvent::BotAudio { data } => {
            if data.is_empty() {
                return true;
            }
            let stream_id = turns.lock().await.response_id();
            let chunk = MessageChunk {
                role: Role::Model,
                name: None,
                part: Some(Part::blob(output_mime, data)),
                tool_call: None,
                ctrl: Some(StreamCtrl {
                    stream_id,
                    ..Default::default()
                }),
            };
            send(out, chunk).await
        }
        RealtimeEvent::BotTurnFinished => {
            let stream_id = turns.lock().await.response_id();
            let eos = MessageChunk {
                role: Role::Model,
                name: None,
                part: Some(Part::blob(output_mime, Vec::<u8>::new())),
                tool_call: None,
                ctrl: Some(StreamCtrl {
                    stream_id,
                    end_of_stream: true,
                    ..Default::default()
                }),
            };
            send(out, eos).await
        }
        RealtimeEvent::NoActiveResponse => {
            tracing::debug!("cancel with no active response, ignoring");
            true
        }
        RealtimeEvent::SessionEnded => false,
        RealtimeEvent::SessionFailed { message } => {
            let _ = out.send(Err(CoreError::msg(message))).await;
            false
        }
    }
}

fn text_chunk(role: Role, text: String, stream_id: String) -> MessageChunk {
    MessageChunk {
        role,
        name: None,
        part: Some(Part::Text(text)),
        tool_call: None,
        ctrl: Some(StreamCtrl {
            stream_id,
            ..Default::default()
        }),
    }
}

async fn send(out: &OutTx, chunk: MessageChunk) -> bool {
    out.send(Ok(chunk)).await.is_ok()
}
