//! Real-time replay of stamped Opus frames.
//!
//! Two tasks sit between a [`StampedReader`] and the output stream:
//!
//! 1. The reader task parses stamped frames and pushes them into a bounded
//!    channel; when the channel is full the frame is dropped with a log.
//! 2. The paced emitter drains the channel into a [`JitterBuffer`] and
//!    replays frames on the wall clock. Gaps up to `max_loss` are filled
//!    with 20 ms silence frames (`ceil(gap / 20ms)` copies); larger gaps
//!    resync the clock and continue without silence.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use talkbox_audio::opus::{Frame, SILENCE_20MS};

use crate::error::CoreError;
use crate::stream::Stream;
use crate::stream_utils::channel_stream;
use crate::types::{MessageChunk, Part, Role, StreamCtrl, mime};

use super::jitter::JitterBuffer;
use super::wire::{EpochMillis, StampedFrame, WireError, parse_stamped};

/// Blocking source of stamped wire frames. End of input is signaled with
/// `io::ErrorKind::UnexpectedEof`.
pub trait StampedReader: Send + 'static {
    fn read_stamped(&mut self) -> io::Result<Vec<u8>>;
}

/// Configuration for [`StampedOpusStream`].
#[derive(Debug, Clone)]
pub struct StampedConfig {
    pub role: Role,
    pub name: String,
    /// Gaps above this threshold resync instead of inserting silence.
    pub max_loss: Duration,
    /// Jitter buffer capacity in frames.
    pub jitter_capacity: usize,
    /// Reader-to-emitter channel capacity; overflow drops frames.
    pub channel_capacity: usize,
    /// Accumulation window before the first emission, giving late frames a
    /// chance to reorder.
    pub prebuffer: Duration,
}

impl Default for StampedConfig {
    fn default() -> Self {
        Self {
            role: Role::User,
            name: String::new(),
            max_loss: Duration::from_secs(5),
            jitter_capacity: 100,
            channel_capacity: 64,
            prebuffer: Duration::from_millis(60),
        }
    }
}

/// Counters for dropped and synthesized frames.
#[derive(Debug, Default)]
pub struct IngressStats {
    pub invalid_frames: AtomicU64,
    pub truncated_frames: AtomicU64,
    pub bad_version_frames: AtomicU64,
    pub overflow_dropped_frames: AtomicU64,
    pub silence_frames: AtomicU64,
}

impl IngressStats {
    pub fn invalid(&self) -> u64 {
        self.invalid_frames.load(Ordering::Relaxed)
    }

    pub fn truncated(&self) -> u64 {
        self.truncated_frames.load(Ordering::Relaxed)
    }

    pub fn bad_version(&self) -> u64 {
        self.bad_version_frames.load(Ordering::Relaxed)
    }

    pub fn overflow_dropped(&self) -> u64 {
        self.overflow_dropped_frames.load(Ordering::Relaxed)
    }

    pub fn silence(&self) -> u64 {
        self.silence_frames.load(Ordering::Relaxed)
    }
}

/// Paced `audio/opus` stream over a stamped reader.
pub struct StampedOpusStream {
    inner: Box<dyn Stream>,
    stats: Arc<IngressStats>,
}

impl StampedOpusStream {
    /// Launches the reader and emitter tasks over `reader`.
    pub fn new<R: StampedReader>(reader: R, cfg: StampedConfig) -> Self {
        let cfg = normalize(cfg);
        let stats = Arc::new(IngressStats::default());

        let (frame_tx, frame_rx) = mpsc::channel::<StampedFrame>(cfg.channel_capacity);
        spawn_reader(reader, frame_tx, Arc::clone(&stats));

        let (out_tx, out_rx) = mpsc::channel(128);
        tokio::spawn(emitter_loop(cfg, frame_rx, out_tx, Arc::clone(&stats)));

        Self {
            inner: channel_stream(out_rx),
            stats,
        }
    }

    pub fn stats(&self) -> &IngressStats {
        &self.stats
    }
}

#[async_trait::async_trait]
impl Stream for StampedOpusStream {
    async fn next(&mut self) -> Result<Option<MessageChunk>, CoreError> {
        self.inner.next().await
    }

    async fn close(&mut self) -> Result<(), CoreError> {
        self.inner.close().await
    }

    async fn close_with_error(&mut self, error: CoreError) -> Result<(), CoreError> {
        self.inner.close_with_error(error).await
    }
}

fn normalize(mut cfg: StampedConfig) -> StampedConfig {
    if cfg.max_loss.is_zero() {
        cfg.max_loss = Duration::from_secs(5);
    }
    if cfg.jitter_capacity == 0 {
        cfg.jitter_capacity = 100;
    }
    if cfg.channel_capacity == 0 {
        cfg.channel_capacity = 64;
    }
    cfg
}

fn spawn_reader<R: StampedReader>(
    mut reader: R,
    tx: mpsc::Sender<StampedFrame>,
    stats: Arc<IngressStats>,
) {
    tokio::task::spawn_blocking(move || {
        loop {
            let data = match reader.read_stamped() {
                Ok(data) => data,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return,
                Err(e) => {
                    tracing::warn!(error = %e, "stamped reader failed");
                    return;
                }
            };
            match parse_stamped(&data) {
                Ok(frame) => {
                    if tx.try_send(frame).is_err() {
                        if tx.is_closed() {
                            return;
                        }
                        stats.overflow_dropped_frames.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!("stamped frame channel full, dropping frame");
                    }
                }
                Err(kind) => {
                    stats.invalid_frames.fetch_add(1, Ordering::Relaxed);
                    match kind {
                        WireError::Truncated => {
                            stats.truncated_frames.fetch_add(1, Ordering::Relaxed);
                        }
                        WireError::BadVersion => {
                            stats.bad_version_frames.fetch_add(1, Ordering::Relaxed);
                        }
                        WireError::EmptyPayload => {}
                    }
                }
            }
        }
    });
}

const SILENCE_STEP: Duration = Duration::from_millis(20);

async fn emitter_loop(
    cfg: StampedConfig,
    mut rx: mpsc::Receiver<StampedFrame>,
    out: mpsc::Sender<Result<MessageChunk, CoreError>>,
    stats: Arc<IngressStats>,
) {
    let mut jitter: JitterBuffer<EpochMillis, StampedFrame> =
        JitterBuffer::new(cfg.jitter_capacity);
    let max_loss_ms = cfg.max_loss.as_millis() as i64;

    let mut next_tick: Option<Instant> = None;
    // Timestamp where the previously emitted frame's audio ends.
    let mut last_end: Option<EpochMillis> = None;
    let mut started = false;

    loop {
        // Pull everything already waiting so late frames can still reorder.
        loop {
            match rx.try_recv() {
                Ok(frame) => jitter.push(frame),
                Err(_) => break,
            }
        }
        if jitter.is_empty() {
            match rx.recv().await {
                Some(frame) => {
                    jitter.push(frame);
                    continue;
                }
                // Reader finished and the buffer is drained.
                None => return,
            }
        }
        if !started {
            // Hold the first emission briefly so late-arriving earlier
            // frames still land in front.
            tokio::time::sleep(cfg.prebuffer).await;
            while let Ok(frame) = rx.try_recv() {
                jitter.push(frame);
            }
            started = true;
        }

        let sf = jitter.pop().expect("non-empty jitter buffer");
        let duration = sf.frame.duration();

        let gap = match last_end {
            None => {
                next_tick = Some(Instant::now());
                0
            }
            Some(end) => sf.stamp - end,
        };

        if gap > max_loss_ms {
            // Too much loss: re-anchor the clock, no silence.
            next_tick = Some(Instant::now());
        } else if gap > 0 {
            let copies = (gap as u64).div_ceil(SILENCE_STEP.as_millis() as u64);
            for _ in 0..copies {
                let tick = next_tick.expect("tick anchored before gap fill");
                tokio::time::sleep_until(tick).await;
                stats.silence_frames.fetch_add(1, Ordering::Relaxed);
                let silence = frame_chunk(&cfg, Frame(SILENCE_20MS.to_vec()), None);
                if out.send(Ok(silence)).await.is_err() {
                    return;
                }
                next_tick = Some(tick + SILENCE_STEP);
            }
        }

        let tick = next_tick.expect("tick anchored before emit");
        tokio::time::sleep_until(tick).await;
        let chunk = frame_chunk(&cfg, sf.frame, Some(sf.stamp));
        if out.send(Ok(chunk)).await.is_err() {
            return;
        }
        next_tick = Some(tick + duration);
        last_end = Some(sf.stamp + duration.as_millis() as i64);
    }
}

fn frame_chunk(cfg: &StampedConfig, frame: Frame, stamp: Option<EpochMillis>) -> MessageChunk {
    MessageChunk {
        role: cfg.role,
        name: if cfg.name.is_empty() {
            None
        } else {
            Some(cfg.name.clone())
        },
        part: Some(Part::blob(mime::AUDIO_OPUS, frame.0)),
        tool_call: None,
        ctrl: stamp.map(|ts| StreamCtrl {
            timestamp_ms: ts,
            ..Default::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::wire::make_stamped;
    use std::collections::VecDeque;

    struct MockReader {
        items: VecDeque<Vec<u8>>,
    }

    impl MockReader {
        fn new(items: Vec<Vec<u8>>) -> Self {
            Self {
                items: items.into(),
            }
        }
    }

    impl StampedReader for MockReader {
        fn read_stamped(&mut self) -> io::Result<Vec<u8>> {
            self.items
                .pop_front()
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "eof"))
        }
    }

    async fn collect_payloads(stream: &mut StampedOpusStream) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.next().await.unwrap() {
            out.push(chunk.part.unwrap().as_blob().unwrap().data.clone());
        }
        out
    }

    const BASE: i64 = 1_700_000_000_000;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn replays_in_timestamp_order() {
        let frames = vec![
            make_stamped(&Frame(vec![0xf8, 0x33]), BASE + 40),
            make_stamped(&Frame(vec![0xf8, 0x11]), BASE),
            make_stamped(&Frame(vec![0xf8, 0x22]), BASE + 20),
        ];
        let mut s = StampedOpusStream::new(MockReader::new(frames), StampedConfig::default());
        let got = collect_payloads(&mut s).await;
        assert_eq!(
            got,
            vec![vec![0xf8, 0x11], vec![0xf8, 0x22], vec![0xf8, 0x33]]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fills_small_gaps_with_silence() {
        // 20ms frames at BASE and BASE+80: gap of 60ms -> 3 silence frames.
        let frame = Frame(SILENCE_20MS.to_vec());
        let frames = vec![
            make_stamped(&frame, BASE),
            make_stamped(&frame, BASE + 80),
        ];
        let mut s = StampedOpusStream::new(MockReader::new(frames), StampedConfig::default());
        let got = collect_payloads(&mut s).await;
        assert_eq!(got.len(), 5);
        assert_eq!(s.stats().silence(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn partial_gap_rounds_up() {
        // Gap of 30ms -> ceil(30/20) = 2 silence frames.
        let frame = Frame(SILENCE_20MS.to_vec());
        let frames = vec![
            make_stamped(&frame, BASE),
            make_stamped(&frame, BASE + 50),
        ];
        let mut s = StampedOpusStream::new(MockReader::new(frames), StampedConfig::default());
        let got = collect_payloads(&mut s).await;
        assert_eq!(got.len(), 4);
        assert_eq!(s.stats().silence(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn large_gaps_resync_without_silence() {
        let frame = Frame(SILENCE_20MS.to_vec());
        let frames = vec![
            make_stamped(&frame, BASE),
            make_stamped(&frame, BASE + 400),
        ];
        let cfg = StampedConfig {
            max_loss: Duration::from_millis(100),
            ..StampedConfig::default()
        };
        let mut s = StampedOpusStream::new(MockReader::new(frames), cfg);
        let got = collect_payloads(&mut s).await;
        assert_eq!(got.len(), 2);
        assert_eq!(s.stats().silence(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn invalid_frames_are_dropped_silently() {
        let frame = Frame(SILENCE_20MS.to_vec());
        let mut bad_version = make_stamped(&frame, BASE + 20);
        bad_version[0] = 0x7f;
        let frames = vec![
            make_stamped(&frame, BASE),
            vec![0x01, 0x02],
            bad_version,
            make_stamped(&frame, BASE + 40),
        ];
        let mut s = StampedOpusStream::new(MockReader::new(frames), StampedConfig::default());
        let got = collect_payloads(&mut s).await;
        assert_eq!(got.len(), 3);
        assert_eq!(s.stats().invalid(), 2);
        assert_eq!(s.stats().truncated(), 1);
        assert_eq!(s.stats().bad_version(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn chunks_carry_role_and_timestamp() {
        let frames = vec![make_stamped(&Frame(vec![0xf8, 0x01]), BASE)];
        let cfg = StampedConfig {
            name: "mic".into(),
            ..StampedConfig::default()
        };
        let mut s = StampedOpusStream::new(MockReader::new(frames), cfg);
        let chunk = s.next().await.unwrap().unwrap();
        assert_eq!(chunk.role, Role::User);
        assert_eq!(chunk.name.as_deref(), Some("mic"));
        assert_eq!(chunk.ctrl.unwrap().timestamp_ms, BASE);
        assert!(s.next().await.unwrap().is_none());
    }

    #[test]
    fn default_config_values() {
        let cfg = StampedConfig::default();
        assert_eq!(cfg.role, Role::User);
        assert_eq!(cfg.max_loss, Duration::from_secs(5));
        assert_eq!(cfg.jitter_capacity, 100);
    }
}
