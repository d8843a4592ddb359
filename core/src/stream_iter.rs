//! Byte-oriented demultiplexing of a chunk stream.
//!
//! [`StreamIter`] pumps a stream in the background and opens one byte
//! sub-stream per distinct `(role, name, mime)` key it encounters. Text
//! parts land under `text/plain` as UTF-8 bytes. Each sub-stream is backed
//! by a blocking byte buffer, so an unread sub-stream eventually exerts
//! backpressure on the pump; dropping a [`ByteStream`] discards the rest of
//! its data instead.
//!
//! When the source finishes cleanly all sub-streams are write-closed; when
//! it fails they are closed with the error.

use std::collections::HashMap;
use std::io::Write;

use tokio::sync::mpsc;

use talkbox_buffer::{BlockBuffer, BufferError};

use crate::error::CoreError;
use crate::stream::Stream;
use crate::types::{Part, Role};

const SUBSTREAM_CAPACITY: usize = 64 * 1024;

/// Identity of one byte sub-stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ByteStreamKey {
    pub role: Role,
    pub name: Option<String>,
    pub mime: String,
}

/// A lazy byte reader over the fragments of one `(role, name, mime)` key.
pub struct ByteStream {
    key: ByteStreamKey,
    buf: BlockBuffer<u8>,
    detached: bool,
}

impl ByteStream {
    pub fn key(&self) -> &ByteStreamKey {
        &self.key
    }

    pub fn role(&self) -> Role {
        self.key.role
    }

    pub fn name(&self) -> Option<&str> {
        self.key.name.as_deref()
    }

    pub fn mime(&self) -> &str {
        &self.key.mime
    }

    /// Blocking read of up to `out.len()` bytes; `Ok(0)` at end of the
    /// sub-stream.
    pub fn read(&self, out: &mut [u8]) -> Result<usize, BufferError> {
        self.buf.read(out)
    }

    /// Drains the whole sub-stream into memory.
    pub fn read_to_end(&self) -> Result<Vec<u8>, CoreError> {
        let mut out = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match self.buf.read(&mut chunk)? {
                0 => return Ok(out),
                n => out.extend_from_slice(&chunk[..n]),
            }
        }
    }

    /// Copies the whole sub-stream into `writer`, returning the byte count.
    pub fn copy_to<W: Write>(&self, writer: &mut W) -> Result<u64, CoreError> {
        let mut total = 0u64;
        let mut chunk = [0u8; 4096];
        loop {
            match self.buf.read(&mut chunk)? {
                0 => return Ok(total),
                n => {
                    writer
                        .write_all(&chunk[..n])
                        .map_err(|e| CoreError::msg(format!("write sub-stream: {e}")))?;
                    total += n as u64;
                }
            }
        }
    }

    /// Stops consuming; the pump discards the rest of this sub-stream.
    pub fn discard(mut self) {
        self.detached = true;
        let _ = self.buf.close_with_error(Discarded);
    }
}

impl Drop for ByteStream {
    fn drop(&mut self) {
        if !self.detached {
            let _ = self.buf.close_with_error(Discarded);
        }
    }
}

#[derive(Debug)]
struct Discarded;

impl std::fmt::Display for Discarded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-stream discarded by consumer")
    }
}

impl std::error::Error for Discarded {}

/// Demultiplexes a stream into byte sub-streams keyed by
/// `(role, name, mime)`.
pub struct StreamIter {
    rx: mpsc::Receiver<ByteStream>,
}

impl StreamIter {
    /// Starts pumping `input`. Sub-streams are announced through
    /// [`next`](Self::next) in the order their keys first appear.
    pub fn new(mut input: Box<dyn Stream>) -> Self {
        let (tx, rx) = mpsc::channel(32);

        tokio::spawn(async move {
            let mut writers: HashMap<ByteStreamKey, SubWriter> = HashMap::new();

            loop {
                match input.next().await {
                    Ok(Some(chunk)) => {
                        // Control markers and tool calls carry no bytes.
                        if chunk.is_end_of_stream() || chunk.is_begin_of_stream() {
                            continue;
                        }
                        let Some(part) = &chunk.part else { continue };
                        let (mime, data): (&str, &[u8]) = match part {
                            Part::Text(t) => ("text/plain", t.as_bytes()),
                            Part::Blob(b) => (b.mime_type.as_str(), &b.data),
                        };
                        if data.is_empty() {
                            continue;
                        }
                        let key = ByteStreamKey {
                            role: chunk.role,
                            name: chunk.name.clone(),
                            mime: mime.to_string(),
                        };

                        if !writers.contains_key(&key) {
                            let buf = BlockBuffer::new(SUBSTREAM_CAPACITY);
                            let handle = ByteStream {
                                key: key.clone(),
                                buf: buf.clone(),
                                detached: false,
                            };
                            // A send failure means nobody listens for new
                            // sub-streams; route this key to the void.
                            let discarded = tx.send(handle).await.is_err();
                            writers.insert(key.clone(), SubWriter { buf, discarded });
                        }
                        let writer = writers.get_mut(&key).unwrap();
                        if !writer.discarded && writer.buf.write(data).is_err() {
                            writer.discarded = true;
                        }
                    }
                    Ok(None) => {
                        for w in writers.values() {
                            let _ = w.buf.close_write();
                        }
                        return;
                    }
                    Err(e) => {
                        let msg = e.to_string();
                        let clean = e.is_done();
                        for w in writers.values() {
                            if clean {
                                let _ = w.buf.close_write();
                            } else {
                                let _ = w.buf.close_with_error(SourceError(msg.clone()));
                            }
                        }
                        return;
                    }
                }
            }
        });

        Self { rx }
    }

    /// The next newly-opened sub-stream, or `None` once the source ended.
    pub async fn next(&mut self) -> Option<ByteStream> {
        self.rx.recv().await
    }

    /// The first sub-stream matching `predicate`. Later matches (and
    /// non-matches) are discarded in the background.
    pub async fn first_where<F>(mut self, predicate: F) -> Option<ByteStream>
    where
        F: Fn(&ByteStreamKey) -> bool + Send + 'static,
    {
        while let Some(sub) = self.rx.recv().await {
            if predicate(sub.key()) {
                // Keep the pump unblocked by discarding everything else.
                tokio::spawn(async move {
                    while let Some(other) = self.rx.recv().await {
                        other.discard();
                    }
                });
                return Some(sub);
            }
            sub.discard();
        }
        None
    }

    /// Copies the first sub-stream with the given MIME into `writer`.
    /// Returns the byte count, or `None` when no such sub-stream appeared.
    pub async fn write_to<W: Write + Send>(
        self,
        mime: &str,
        writer: &mut W,
    ) -> Result<Option<u64>, CoreError> {
        let mime = mime.to_string();
        match self.first_where(move |k| k.mime == mime).await {
            Some(sub) => Ok(Some(sub.copy_to(writer)?)),
            None => Ok(None),
        }
    }
}

struct SubWriter {
    buf: BlockBuffer<u8>,
    discarded: bool,
}

#[derive(Debug)]
struct SourceError(String);

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SourceError {}
