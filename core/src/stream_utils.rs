//! Stream combinators: split, merge, interleave, composite.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CoreError;
use crate::stream::Stream;
use crate::types::{MessageChunk, Part, mime};

/// Predicate over chunks used by [`split`].
pub type Matcher = Box<dyn Fn(&MessageChunk) -> bool + Send + Sync>;

/// Matches blob chunks whose MIME type starts with `prefix`.
pub fn mime_type_matcher(prefix: impl Into<String>) -> Matcher {
    let prefix = prefix.into();
    Box::new(move |chunk: &MessageChunk| {
        chunk
            .part
            .as_ref()
            .and_then(|p| p.as_blob())
            .is_some_and(|b| b.mime_type.starts_with(&prefix))
    })
}

/// Wraps a channel receiver as a [`Stream`].
pub fn channel_stream(rx: mpsc::Receiver<Result<MessageChunk, CoreError>>) -> Box<dyn Stream> {
    Box::new(ChannelStream { rx })
}

pub(crate) struct ChannelStream {
    pub(crate) rx: mpsc::Receiver<Result<MessageChunk, CoreError>>,
}

#[async_trait]
impl Stream for ChannelStream {
    async fn next(&mut self) -> Result<Option<MessageChunk>, CoreError> {
        match self.rx.recv().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> Result<(), CoreError> {
        self.rx.close();
        Ok(())
    }

    async fn close_with_error(&mut self, _error: CoreError) -> Result<(), CoreError> {
        self.rx.close();
        Ok(())
    }
}

struct EmptyStream;

#[async_trait]
impl Stream for EmptyStream {
    async fn next(&mut self) -> Result<Option<MessageChunk>, CoreError> {
        Ok(None)
    }

    async fn close(&mut self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn close_with_error(&mut self, _error: CoreError) -> Result<(), CoreError> {
        Ok(())
    }
}

/// Splits `input` into (matched, rest) by `matcher`.
///
/// One background task pumps the input; EOF closes both outputs, an error
/// closes both with the error. Consumers must drain or close both sides to
/// keep the pump moving.
pub fn split(mut input: Box<dyn Stream>, matcher: Matcher) -> (Box<dyn Stream>, Box<dyn Stream>) {
    let (matched_tx, matched_rx) = mpsc::channel(100);
    let (rest_tx, rest_rx) = mpsc::channel(100);

    tokio::spawn(async move {
        let mut matched_tx = Some(matched_tx);
        let mut rest_tx = Some(rest_tx);

        loop {
            if matched_tx.is_none() && rest_tx.is_none() {
                break;
            }
            match input.next().await {
                Ok(Some(chunk)) => {
                    let side = if matcher(&chunk) {
                        &mut matched_tx
                    } else {
                        &mut rest_tx
                    };
                    let send_failed = match side.as_ref() {
                        Some(tx) => tx.send(Ok(chunk)).await.is_err(),
                        None => false,
                    };
                    if send_failed {
                        *side = None;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let msg = e.to_string();
                    if let Some(tx) = &matched_tx {
                        let _ = tx.send(Err(CoreError::msg(&msg))).await;
                    }
                    if let Some(tx) = &rest_tx {
                        let _ = tx.send(Err(CoreError::msg(&msg))).await;
                    }
                    break;
                }
            }
        }
    });

    (
        channel_stream(matched_rx),
        channel_stream(rest_rx),
    )
}

/// Concatenates streams: all chunks of the first, then the second, and so
/// on. Errors propagate as-is.
pub fn merge(streams: Vec<Box<dyn Stream>>) -> Box<dyn Stream> {
    match streams.len() {
        0 => Box::new(EmptyStream),
        1 => streams.into_iter().next().unwrap(),
        _ => Box::new(MergeStream { streams, idx: 0 }),
    }
}

struct MergeStream {
    streams: Vec<Box<dyn Stream>>,
    idx: usize,
}

#[async_trait]
impl Stream for MergeStream {
    async fn next(&mut self) -> Result<Option<MessageChunk>, CoreError> {
        while self.idx < self.streams.len() {
            match self.streams[self.idx].next().await? {
                Some(chunk) => return Ok(Some(chunk)),
                None => self.idx += 1,
            }
        }
        Ok(None)
    }

    async fn close(&mut self) -> Result<(), CoreError> {
        for s in &mut self.streams {
            let _ = s.close().await;
        }
        Ok(())
    }

    async fn close_with_error(&mut self, error: CoreError) -> Result<(), CoreError> {
        let msg = error.to_string();
        for s in &mut self.streams {
            let _ = s.close_with_error(CoreError::msg(&msg)).await;
        }
        Ok(())
    }
}

/// Interleaves streams round-robin, one chunk per still-active stream per
/// round, until every stream reaches EOF. Any error aborts the merge.
pub fn merge_interleaved(streams: Vec<Box<dyn Stream>>) -> Box<dyn Stream> {
    match streams.len() {
        0 => return Box::new(EmptyStream),
        1 => return streams.into_iter().next().unwrap(),
        _ => {}
    }

    let (tx, rx) = mpsc::channel(100);
    tokio::spawn(async move {
        let mut streams = streams;
        let mut active = vec![true; streams.len()];
        let mut remaining = streams.len();

        while remaining > 0 {
            for i in 0..streams.len() {
                if !active[i] {
                    continue;
                }
                match streams[i].next().await {
                    Ok(Some(chunk)) => {
                        if tx.send(Ok(chunk)).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => {
                        active[i] = false;
                        remaining -= 1;
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        }
    });

    channel_stream(rx)
}

/// Concatenates streams, inserting a synthesized end-of-stream marker after
/// every stream except the last. The marker's MIME is the last one observed
/// in the preceding stream (text maps to `text/plain`).
pub fn composite_seq(streams: Vec<Box<dyn Stream>>) -> Box<dyn Stream> {
    match streams.len() {
        0 => return Box::new(EmptyStream),
        1 => return streams.into_iter().next().unwrap(),
        _ => {}
    }

    let (tx, rx) = mpsc::channel(100);
    tokio::spawn(async move {
        let count = streams.len();
        for (i, mut stream) in streams.into_iter().enumerate() {
            let mut last_mime = String::new();
            loop {
                match stream.next().await {
                    Ok(Some(chunk)) => {
                        if let Some(part) = &chunk.part {
                            last_mime = part.mime_type().to_string();
                        }
                        if tx.send(Ok(chunk)).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
            if i < count - 1 && !last_mime.is_empty() {
                let eos = MessageChunk::new_end_of_stream(&last_mime);
                if tx.send(Ok(eos)).await.is_err() {
                    return;
                }
            }
        }
    });

    channel_stream(rx)
}

/// True when `mime_str` names text content.
pub fn is_text_mime(mime_str: &str) -> bool {
    mime_str == mime::TEXT_PLAIN || mime_str.starts_with("text/")
}

/// Extracts the blob MIME type of a chunk, treating text as `text/plain`.
pub fn chunk_mime(chunk: &MessageChunk) -> Option<&str> {
    chunk.part.as_ref().map(Part::mime_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Usage;
    use crate::stream::{StreamBuilder, collect_text};
    use crate::types::Role;

    fn text_stream(texts: &[&str]) -> Box<dyn Stream> {
        let builder = StreamBuilder::new(64);
        let chunks: Vec<MessageChunk> = texts
            .iter()
            .map(|t| MessageChunk::text(Role::Model, *t))
            .collect();
        builder.add(&chunks).unwrap();
        builder.done(Usage::default()).unwrap();
        Box::new(builder.stream())
    }

    fn mixed_stream() -> Box<dyn Stream> {
        let builder = StreamBuilder::new(64);
        builder
            .add(&[
                MessageChunk::text(Role::Model, "t1"),
                MessageChunk::blob(Role::Model, mime::AUDIO_PCM, vec![1, 2]),
                MessageChunk::text(Role::Model, "t2"),
                MessageChunk::blob(Role::Model, mime::AUDIO_OGG, vec![3, 4]),
                MessageChunk::text(Role::Model, "t3"),
            ])
            .unwrap();
        builder.done(Usage::default()).unwrap();
        Box::new(builder.stream())
    }

    async fn count_chunks(stream: &mut Box<dyn Stream>) -> usize {
        let mut n = 0;
        loop {
            match stream.next().await {
                Ok(Some(_)) => n += 1,
                Ok(None) => break,
                Err(e) if e.is_done() => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        n
    }

    #[tokio::test]
    async fn split_routes_audio_and_rest() {
        let (mut matched, mut rest) = split(mixed_stream(), mime_type_matcher("audio/"));
        assert_eq!(count_chunks(&mut matched).await, 2);
        assert_eq!(count_chunks(&mut rest).await, 3);
    }

    #[tokio::test]
    async fn split_with_no_matches() {
        let (mut matched, mut rest) = split(text_stream(&["a", "b"]), mime_type_matcher("audio/"));
        assert_eq!(count_chunks(&mut matched).await, 0);
        assert_eq!(count_chunks(&mut rest).await, 2);
    }

    #[tokio::test]
    async fn merge_concatenates() {
        let merged = merge(vec![text_stream(&["a", "b"]), text_stream(&["c"])]);
        let mut merged = merged;
        assert_eq!(collect_text(&mut *merged).await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn merge_interleaved_round_robin() {
        let merged = merge_interleaved(vec![
            text_stream(&["a1", "a2"]),
            text_stream(&["b1", "b2", "b3"]),
        ]);
        let mut merged = merged;
        assert_eq!(collect_text(&mut *merged).await.unwrap(), "a1b1a2b2b3");
    }

    #[tokio::test]
    async fn composite_seq_inserts_eos_markers() {
        let mut combined = composite_seq(vec![
            text_stream(&["a", "b"]),
            text_stream(&["c"]),
            text_stream(&["d"]),
        ]);

        let mut texts = Vec::new();
        let mut eos = 0;
        while let Ok(Some(chunk)) = combined.next().await {
            if chunk.is_end_of_stream() {
                eos += 1;
                assert_eq!(chunk.part.as_ref().unwrap().as_text(), Some(""));
            } else if let Some(t) = chunk.part.as_ref().and_then(|p| p.as_text()) {
                texts.push(t.to_string());
            }
        }
        assert_eq!(texts, vec!["a", "b", "c", "d"]);
        // One marker between each pair of streams; none after the last.
        assert_eq!(eos, 2);
    }

    #[tokio::test]
    async fn composite_seq_eos_takes_last_mime() {
        let audio = {
            let builder = StreamBuilder::new(8);
            builder
                .add(&[MessageChunk::blob(Role::Model, mime::AUDIO_OGG, vec![1])])
                .unwrap();
            builder.done(Usage::default()).unwrap();
            Box::new(builder.stream()) as Box<dyn Stream>
        };
        let mut combined = composite_seq(vec![audio, text_stream(&["x"])]);

        let _first = combined.next().await.unwrap().unwrap();
        let eos = combined.next().await.unwrap().unwrap();
        assert!(eos.is_end_of_stream());
        assert_eq!(
            eos.part.as_ref().unwrap().as_blob().unwrap().mime_type,
            mime::AUDIO_OGG
        );
    }

    #[tokio::test]
    async fn matcher_on_text_is_false() {
        let m = mime_type_matcher("audio/");
        assert!(m(&MessageChunk::blob(Role::User, mime::AUDIO_PCM, vec![1])));
        assert!(!m(&MessageChunk::text(Role::User, "hi")));
    }
}
