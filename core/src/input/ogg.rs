//! Streaming OGG/Opus ingress.

use std::io::Read;

use async_trait::async_trait;

use talkbox_audio::ogg::{PacketReader, is_opus_header};

use crate::error::CoreError;
use crate::stream::Stream;
use crate::types::{MessageChunk, Part, Role, mime};

use super::InputError;

/// Demuxes an OGG container, emitting each audio packet as one
/// `audio/opus` chunk.
///
/// `OpusHead` and `OpusTags` packets are recognized by their 8-byte ASCII
/// prefixes and skipped; chained streams pass through transparently, and
/// packets straddling pages arrive reassembled.
pub struct OggOpusStream<R: Read + Send + Sync> {
    packets: PacketReader<R>,
    role: Role,
    name: String,
    seen_audio: bool,
    done: bool,
    closed: bool,
    close_error: Option<String>,
}

impl<R: Read + Send + Sync> OggOpusStream<R> {
    pub fn new(reader: R, role: Role, name: impl Into<String>) -> Self {
        Self {
            packets: PacketReader::new(reader),
            role,
            name: name.into(),
            seen_audio: false,
            done: false,
            closed: false,
            close_error: None,
        }
    }

    fn ensure_open(&self) -> Result<(), CoreError> {
        if let Some(msg) = &self.close_error {
            return Err(CoreError::msg(msg));
        }
        if self.closed {
            return Err(CoreError::msg(InputError::StreamClosed));
        }
        Ok(())
    }
}

#[async_trait]
impl<R: Read + Send + Sync> Stream for OggOpusStream<R> {
    async fn next(&mut self) -> Result<Option<MessageChunk>, CoreError> {
        self.ensure_open()?;
        if self.done {
            return Ok(None);
        }

        loop {
            match self.packets.read_packet() {
                Ok(Some(packet)) => {
                    if is_opus_header(&packet.data) {
                        continue;
                    }
                    self.seen_audio = true;
                    return Ok(Some(MessageChunk {
                        role: self.role,
                        name: if self.name.is_empty() {
                            None
                        } else {
                            Some(self.name.clone())
                        },
                        part: Some(Part::blob(mime::AUDIO_OPUS, packet.data)),
                        tool_call: None,
                        ctrl: None,
                    }));
                }
                Ok(None) => {
                    self.done = true;
                    if !self.seen_audio {
                        return Err(CoreError::msg(InputError::NoOpusPackets));
                    }
                    return Ok(None);
                }
                Err(e) => {
                    self.done = true;
                    return Err(CoreError::msg(InputError::OggDecode(e.to_string())));
                }
            }
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
    use std::io::Cursor;
    use talkbox_audio::ogg::OpusWriter;

    fn valid_ogg(frames: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut w = OpusWriter::new(&mut out, 48_000, 1).unwrap();
        for f in frames {
            w.write_frame(f, 960).unwrap();
        }
        w.close().unwrap();
        out
    }

    #[tokio::test]
    async fn yields_audio_packets_only() {
        let data = valid_ogg(&[&[0xf8, 0x01], &[0xf8, 0x02], &[0xf8, 0x03]]);
        let mut stream = OggOpusStream::new(Cursor::new(data), Role::Model, "file");

        let mut payloads = Vec::new();
        while let Some(chunk) = stream.next().await.unwrap() {
            let blob = chunk.part.as_ref().unwrap().as_blob().unwrap();
            assert_eq!(blob.mime_type, mime::AUDIO_OPUS);
            assert_eq!(chunk.role, Role::Model);
            payloads.push(blob.data.clone());
        }
        assert_eq!(
            payloads,
            vec![vec![0xf8, 0x01], vec![0xf8, 0x02], vec![0xf8, 0x03]]
        );
    }

    #[tokio::test]
    async fn chained_streams_concatenate() {
        let mut data = valid_ogg(&[&[0xf8, 0x01]]);
        data.extend_from_slice(&valid_ogg(&[&[0xf8, 0x02]]));

        let mut stream = OggOpusStream::new(Cursor::new(data), Role::User, "");
        let mut count = 0;
        while stream.next().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn invalid_and_empty_input_error() {
        let mut invalid = OggOpusStream::new(Cursor::new(b"junk".to_vec()), Role::User, "");
        assert!(invalid.next().await.is_err());

        let mut empty = OggOpusStream::new(Cursor::new(Vec::<u8>::new()), Role::User, "");
        assert!(empty.next().await.is_err());
    }

    #[tokio::test]
    async fn close_makes_next_fail() {
        let data = valid_ogg(&[&[0xf8, 0x01]]);
        let mut stream = OggOpusStream::new(Cursor::new(data), Role::User, "");
        stream.close().await.unwrap();
        assert!(stream.next().await.is_err());
    }
}
