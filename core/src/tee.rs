//! Stream tee: mirror a stream into a [`StreamBuilder`].

use async_trait::async_trait;

use crate::error::{CoreError, Usage};
use crate::stream::{Stream, StreamBuilder};
use crate::types::MessageChunk;

/// Reads from `src`, copying every chunk into `builder` while forwarding it
/// to the caller. EOF finishes the builder cleanly; errors abort it.
pub fn tee(src: Box<dyn Stream>, builder: StreamBuilder) -> TeeStream {
    TeeStream { src, builder }
}

pub struct TeeStream {
    src: Box<dyn Stream>,
    builder: StreamBuilder,
}

#[async_trait]
impl Stream for TeeStream {
    async fn next(&mut self) -> Result<Option<MessageChunk>, CoreError> {
        match self.src.next().await {
            Ok(Some(chunk)) => {
                let _ = self.builder.add(std::slice::from_ref(&chunk));
                Ok(Some(chunk))
            }
            Ok(None) => {
                let _ = self.builder.done(Usage::default());
                Ok(None)
            }
            Err(e) => {
                if let Some(state) = e.state() {
                    // Terminal states are mirrored as clean completion of
                    // the copy with the observed usage.
                    let _ = self.builder.done(state.usage().clone());
                } else {
                    let _ = self.builder.abort_with_message(e.to_string());
                }
                Err(e)
            }
        }
    }

    async fn close(&mut self) -> Result<(), CoreError> {
        let _ = self.builder.done(Usage::default());
        self.src.close().await
    }

    async fn close_with_error(&mut self, error: CoreError) -> Result<(), CoreError> {
        let _ = self.builder.abort_with_message(error.to_string());
        self.src.close_with_error(error).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::collect_text;
    use crate::types::Role;

    #[tokio::test]
    async fn copies_every_chunk() {
        let src = StreamBuilder::new(64);
        src.add(&[
            MessageChunk::text(Role::Model, "a"),
            MessageChunk::text(Role::Model, "b"),
            MessageChunk::text(Role::Model, "c"),
        ])
        .unwrap();
        src.done(Usage::new(0, 0, 3)).unwrap();

        let copy = StreamBuilder::new(64);
        let mut copy_stream = copy.stream();

        let mut teed = tee(Box::new(src.stream()), copy);
        assert_eq!(collect_text(&mut teed).await.unwrap(), "abc");
        assert_eq!(collect_text(&mut copy_stream).await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn unread_copy_does_not_block_main() {
        let src = StreamBuilder::new(64);
        src.add(&[
            MessageChunk::text(Role::Model, "x"),
            MessageChunk::text(Role::Model, "y"),
        ])
        .unwrap();
        src.done(Usage::default()).unwrap();

        let copy = StreamBuilder::new(64);
        let _unread = copy.stream();

        let mut teed = tee(Box::new(src.stream()), copy);
        assert_eq!(collect_text(&mut teed).await.unwrap(), "xy");
    }

    #[tokio::test]
    async fn source_abort_propagates_to_copy() {
        let src = StreamBuilder::new(64);
        src.abort_with_message("source failed").unwrap();

        let copy = StreamBuilder::new(64);
        let mut copy_stream = copy.stream();

        let mut teed = tee(Box::new(src.stream()), copy);
        assert!(teed.next().await.is_err());
        assert!(copy_stream.next().await.is_err());
    }
}
