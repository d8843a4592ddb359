//! Raw Opus frame pass-through ingress.

use std::io;

use async_trait::async_trait;

use talkbox_audio::opus::Frame;

use crate::error::CoreError;
use crate::stream::Stream;
use crate::types::{MessageChunk, Part, Role, mime};

use super::InputError;

/// Blocking source of sequential Opus frames. End of input is signaled
/// with `io::ErrorKind::UnexpectedEof`.
pub trait OpusReader: Send + Sync {
    fn read_frame(&mut self) -> io::Result<Frame>;
}

/// Emits each frame from an [`OpusReader`] as one `audio/opus` chunk.
pub struct OpusFrameStream<R: OpusReader> {
    reader: R,
    role: Role,
    name: String,
    done: bool,
    closed: bool,
    close_error: Option<String>,
}

impl<R: OpusReader> OpusFrameStream<R> {
    pub fn new(reader: R, role: Role, name: impl Into<String>) -> Self {
        Self {
            reader,
            role,
            name: name.into(),
            done: false,
            closed: false,
            close_error: None,
        }
    }
}

#[async_trait]
impl<R: OpusReader> Stream for OpusFrameStream<R> {
    async fn next(&mut self) -> Result<Option<MessageChunk>, CoreError> {
        if let Some(msg) = &self.close_error {
            return Err(CoreError::msg(msg));
        }
        if self.closed {
            return Err(CoreError::msg(InputError::StreamClosed));
        }
        if self.done {
            return Ok(None);
        }

        match self.reader.read_frame() {
            Ok(frame) => Ok(Some(MessageChunk {
                role: self.role,
                name: if self.name.is_empty() {
                    None
                } else {
                    Some(self.name.clone())
                },
                part: Some(Part::blob(mime::AUDIO_OPUS, frame.0)),
                tool_call: None,
                ctrl: None,
            })),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                self.done = true;
                Ok(None)
            }
            Err(e) => Err(CoreError::msg(e)),
        }
    }

    async fn close(&mut self) -> Result<(), CoreError> {
        self.closed = true;
        Ok(())
    }

    async fn close_with_error(&mut self, error: CoreError) -> Result<(), CoreError> {
        self.closed = true;
        self.close_error = Some(error.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct MockReader {
        frames: VecDeque<Frame>,
    }

    impl OpusReader for MockReader {
        fn read_frame(&mut self) -> io::Result<Frame> {
            self.frames
                .pop_front()
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "eof"))
        }
    }

    #[tokio::test]
    async fn passes_frames_through_in_order() {
        let reader = MockReader {
            frames: VecDeque::from(vec![
                Frame(vec![0xf8, 0xff, 0xfe]),
                Frame(vec![0xf8, 0x01]),
            ]),
        };
        let mut stream = OpusFrameStream::new(reader, Role::User, "mic");

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.role, Role::User);
        assert_eq!(first.name.as_deref(), Some("mic"));
        let blob = first.part.unwrap();
        assert_eq!(blob.as_blob().unwrap().mime_type, mime::AUDIO_OPUS);

        assert!(stream.next().await.unwrap().is_some());
        assert!(stream.next().await.unwrap().is_none());
        // EOF is sticky.
        assert!(stream.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn closed_stream_errors() {
        let reader = MockReader {
            frames: VecDeque::new(),
        };
        let mut stream = OpusFrameStream::new(reader, Role::User, "");
        stream.close().await.unwrap();
        assert!(stream.next().await.is_err());

        let reader = MockReader {
            frames: VecDeque::new(),
        };
        let mut stream = OpusFrameStream::new(reader, Role::User, "");
        stream
            .close_with_error(CoreError::msg("custom"))
            .await
            .unwrap();
        let err = stream.next().await.unwrap_err();
        assert!(err.to_string().contains("custom"));
    }
}
