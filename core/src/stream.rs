//! Stream consumption and construction.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use talkbox_buffer::{BlockBuffer, Done};

use crate::error::{CoreError, State, Status, Usage};
use crate::tool::FuncTool;
use crate::types::MessageChunk;

/// The universal consumer interface over a lazy, finite chunk sequence.
///
/// `next()` yields a chunk, `Ok(None)` at clean EOF, or an error; a
/// terminal [`State`] arrives as `Err(CoreError::State(_))`. A stream is
/// not restartable. `close()` is idempotent; `close_with_error` propagates
/// the error to all pending readers.
#[async_trait]
pub trait Stream: Send + Sync {
    async fn next(&mut self) -> Result<Option<MessageChunk>, CoreError>;

    async fn close(&mut self) -> Result<(), CoreError>;

    async fn close_with_error(&mut self, error: CoreError) -> Result<(), CoreError>;
}

/// One event on the builder's wire: a chunk or a terminal transition.
#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub chunk: Option<MessageChunk>,
    pub status: Status,
    pub usage: Usage,
    pub refusal: Option<String>,
    pub error: Option<String>,
}

impl StreamEvent {
    pub fn chunk(chunk: MessageChunk) -> Self {
        Self {
            chunk: Some(chunk),
            status: Status::Ok,
            usage: Usage::default(),
            refusal: None,
            error: None,
        }
    }

    fn terminal(status: Status, usage: Usage) -> Self {
        Self {
            chunk: None,
            status,
            usage,
            refusal: None,
            error: None,
        }
    }
}

/// Producer-side builder for a stream.
///
/// Generators and transformers push chunks with [`add`](Self::add) and end
/// the stream with exactly one terminal transition ([`done`](Self::done),
/// [`truncated`](Self::truncated), [`blocked`](Self::blocked),
/// [`unexpected`](Self::unexpected)) or abort it with
/// [`abort`](Self::abort). [`stream`](Self::stream) hands out the consumer
/// view.
pub struct StreamBuilder {
    buffer: BlockBuffer<StreamEvent>,
    func_tools: HashMap<String, Arc<FuncTool>>,
}

impl StreamBuilder {
    /// A builder with a bounded event buffer and no tool table.
    pub fn new(size: usize) -> Self {
        Self::with_tools(size, Vec::new())
    }

    /// A builder whose tool table resolves tool-call chunks by name.
    pub fn with_tools(size: usize, tools: impl IntoIterator<Item = FuncTool>) -> Self {
        let func_tools = tools
            .into_iter()
            .map(|t| (t.name.clone(), Arc::new(t)))
            .collect();
        Self {
            buffer: BlockBuffer::new(size),
            func_tools,
        }
    }

    /// Appends chunks. A chunk carrying a tool call is patched with the
    /// matching [`FuncTool`] looked up by name; calls to unknown tools are
    /// logged and dropped.
    pub fn add(&self, chunks: &[MessageChunk]) -> Result<(), CoreError> {
        for chunk in chunks {
            let mut chunk = chunk.clone();
            if let Some(call) = &mut chunk.tool_call {
                match self.func_tools.get(&call.func_call.name) {
                    Some(tool) => call.tool = Some(Arc::clone(tool)),
                    None => {
                        tracing::warn!(tool = %call.func_call.name, "dropping call to unknown tool");
                        continue;
                    }
                }
            }
            self.buffer.write(&[StreamEvent::chunk(chunk)])?;
        }
        Ok(())
    }

    /// Ends the stream cleanly.
    pub fn done(&self, usage: Usage) -> Result<(), CoreError> {
        self.finish(StreamEvent::terminal(Status::Done, usage))
    }

    /// Ends the stream as truncated.
    pub fn truncated(&self, usage: Usage) -> Result<(), CoreError> {
        self.finish(StreamEvent::terminal(Status::Truncated, usage))
    }

    /// Ends the stream as blocked with a refusal.
    pub fn blocked(&self, usage: Usage, refusal: impl Into<String>) -> Result<(), CoreError> {
        let mut evt = StreamEvent::terminal(Status::Blocked, usage);
        evt.refusal = Some(refusal.into());
        self.finish(evt)
    }

    /// Ends the stream with an unexpected generation error.
    pub fn unexpected(&self, usage: Usage, error: impl Into<String>) -> Result<(), CoreError> {
        let mut evt = StreamEvent::terminal(Status::Error, usage);
        evt.error = Some(error.into());
        self.finish(evt)
    }

    /// Aborts: readers observe the error directly, no terminal event.
    pub fn abort(&self, error: impl std::error::Error + Send + Sync + 'static) -> Result<(), CoreError> {
        self.buffer.close_with_error(error)?;
        Ok(())
    }

    /// Aborts with a plain message.
    pub fn abort_with_message(&self, message: impl Into<String>) -> Result<(), CoreError> {
        self.abort(AbortError(message.into()))
    }

    /// The consumer view of this builder.
    pub fn stream(&self) -> BuiltStream {
        BuiltStream {
            buffer: self.buffer.clone(),
            terminal: None,
        }
    }

    fn finish(&self, event: StreamEvent) -> Result<(), CoreError> {
        self.buffer.write(&[event])?;
        self.buffer.close_write()?;
        Ok(())
    }
}

#[derive(Debug)]
struct AbortError(String);

impl std::fmt::Display for AbortError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for AbortError {}

/// Consumer view of a [`StreamBuilder`].
///
/// Terminal events are translated into a typed [`State`] error; once seen,
/// every further read returns the same state.
pub struct BuiltStream {
    buffer: BlockBuffer<StreamEvent>,
    terminal: Option<State>,
}

impl Clone for BuiltStream {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
            terminal: self.terminal.clone(),
        }
    }
}

#[async_trait]
impl Stream for BuiltStream {
    async fn next(&mut self) -> Result<Option<MessageChunk>, CoreError> {
        if let Some(state) = &self.terminal {
            return Err(CoreError::State(state.clone()));
        }

        match self.buffer.next() {
            Ok(evt) => match evt.status {
                Status::Ok => Ok(evt.chunk),
                Status::Done => self.terminate(State::done(evt.usage)),
                Status::Truncated => self.terminate(State::truncated(evt.usage)),
                Status::Blocked => {
                    self.terminate(State::blocked(evt.usage, evt.refusal.unwrap_or_default()))
                }
                Status::Error => {
                    self.terminate(State::failed(evt.usage, evt.error.unwrap_or_default()))
                }
            },
            Err(Done) => match self.buffer.error() {
                Some(e) => Err(CoreError::msg(e)),
                None => Ok(None),
            },
        }
    }

    async fn close(&mut self) -> Result<(), CoreError> {
        self.buffer.close()?;
        Ok(())
    }

    async fn close_with_error(&mut self, error: CoreError) -> Result<(), CoreError> {
        self.buffer.close_with_error(error)?;
        Ok(())
    }
}

impl BuiltStream {
    fn terminate(&mut self, state: State) -> Result<Option<MessageChunk>, CoreError> {
        self.terminal = Some(state.clone());
        Err(CoreError::State(state))
    }
}

/// Drains a stream, concatenating all text fragments. A terminal `done`
/// state counts as clean completion.
pub async fn collect_text(stream: &mut dyn Stream) -> Result<String, CoreError> {
    let mut text = String::new();
    loop {
        match stream.next().await {
            Ok(Some(chunk)) => {
                if let Some(t) = chunk.part.as_ref().and_then(|p| p.as_text()) {
                    text.push_str(t);
                }
            }
            Ok(None) => break,
            Err(e) if e.is_done() => break,
            Err(e) => return Err(e),
        }
    }
    Ok(text)
}

/// Drains a stream, collecting every chunk. A terminal `done` state counts
/// as clean completion.
pub async fn collect_chunks(stream: &mut dyn Stream) -> Result<Vec<MessageChunk>, CoreError> {
    let mut chunks = Vec::new();
    loop {
        match stream.next().await {
            Ok(Some(chunk)) => chunks.push(chunk),
            Ok(None) => break,
            Err(e) if e.is_done() => break,
            Err(e) => return Err(e),
        }
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FuncCall, Role, ToolCall};

    #[tokio::test]
    async fn chunks_then_done() {
        let builder = StreamBuilder::new(16);
        builder
            .add(&[
                MessageChunk::text(Role::Model, "Hello"),
                MessageChunk::text(Role::Model, " World"),
            ])
            .unwrap();
        builder.done(Usage::new(10, 0, 2)).unwrap();

        let mut stream = builder.stream();
        let mut text = String::new();
        loop {
            match stream.next().await {
                Ok(Some(chunk)) => text.push_str(chunk.part.unwrap().as_text().unwrap()),
                Ok(None) => panic!("expected terminal state, not bare EOF"),
                Err(CoreError::State(state)) => {
                    assert_eq!(state.status(), Status::Done);
                    assert_eq!(state.usage().prompt_tokens, 10);
                    break;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(text, "Hello World");
    }

    #[tokio::test]
    async fn terminal_state_repeats() {
        let builder = StreamBuilder::new(4);
        builder.done(Usage::new(1, 2, 3)).unwrap();

        let mut stream = builder.stream();
        for _ in 0..3 {
            match stream.next().await {
                Err(CoreError::State(state)) => {
                    assert_eq!(state.status(), Status::Done);
                    assert_eq!(state.usage(), &Usage::new(1, 2, 3));
                }
                other => panic!("expected done state, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn blocked_carries_refusal() {
        let builder = StreamBuilder::new(4);
        builder.blocked(Usage::default(), "policy").unwrap();

        let mut stream = builder.stream();
        match stream.next().await {
            Err(CoreError::State(state)) => {
                assert_eq!(state.status(), Status::Blocked);
                assert_eq!(state.refusal(), Some("policy"));
            }
            other => panic!("expected blocked state, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn abort_propagates_error_without_state() {
        let builder = StreamBuilder::new(4);
        builder.add(&[MessageChunk::text(Role::Model, "x")]).unwrap();
        builder.abort_with_message("socket reset").unwrap();

        let mut stream = builder.stream();
        match stream.next().await {
            Err(e) => {
                assert!(e.state().is_none());
                assert!(e.to_string().contains("socket reset"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn known_tool_calls_are_resolved() {
        #[derive(schemars::JsonSchema, serde::Deserialize)]
        struct Args {
            #[allow(dead_code)]
            q: String,
        }
        let builder = StreamBuilder::with_tools(
            16,
            vec![FuncTool::new::<Args>("search", "Search the web")],
        );
        builder
            .add(&[MessageChunk::tool_call(
                Role::Model,
                ToolCall::new("call_1", FuncCall::new("search", "{}")),
            )])
            .unwrap();
        builder.done(Usage::default()).unwrap();

        let mut stream = builder.stream();
        let chunk = stream.next().await.unwrap().unwrap();
        let call = chunk.tool_call.unwrap();
        assert_eq!(call.tool.unwrap().name, "search");
    }

    #[tokio::test]
    async fn unknown_tool_calls_are_dropped() {
        let builder = StreamBuilder::new(16);
        builder
            .add(&[
                MessageChunk::tool_call(
                    Role::Model,
                    ToolCall::new("call_1", FuncCall::new("missing", "{}")),
                ),
                MessageChunk::text(Role::Model, "after"),
            ])
            .unwrap();
        builder.done(Usage::default()).unwrap();

        let mut stream = builder.stream();
        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(chunk.part.unwrap().as_text(), Some("after"));
    }

    #[tokio::test]
    async fn collect_text_stops_at_done() {
        let builder = StreamBuilder::new(16);
        builder
            .add(&[
                MessageChunk::text(Role::Model, "a"),
                MessageChunk::text(Role::Model, "b"),
            ])
            .unwrap();
        builder.done(Usage::default()).unwrap();

        let mut stream = builder.stream();
        assert_eq!(collect_text(&mut stream).await.unwrap(), "ab");
    }
}
