//! Stream-to-stream transformer contract.
//!
//! # Lifecycle
//!
//! `transform` completes any handshake or session setup before returning;
//! cancelling setup means dropping the `transform` future. Once it has
//! returned, the background tasks it spawned live exactly as long as the
//! input stream: `input.next()` returning EOF or an error terminates them.
//! Consumers cancel a running transformer by closing the input stream.
//!
//! # EOF vs EoS
//!
//! - **EOF** (`input.next()` yields `Ok(None)`): the stream is physically
//!   over. The transformer flushes pending state and emits buffered
//!   results; no marker is fabricated unless the concrete transformer's
//!   contract says otherwise.
//! - **EoS marker** (`ctrl.end_of_stream`) matching the transformer's input
//!   MIME: a logical sub-stream boundary. The transformer flushes, emits a
//!   translated EoS of its output MIME, and keeps running; a new sub-stream
//!   may follow. Unrelated EoS markers and non-matching parts pass through
//!   unchanged.

use async_trait::async_trait;

use crate::error::CoreError;
use crate::stream::Stream;

/// Converts an input [`Stream`] into an output [`Stream`].
#[async_trait]
pub trait Transformer: Send + Sync {
    /// Starts the transformation. `pattern` names the route the transformer
    /// was resolved under (model, voice, resource); implementations may
    /// ignore it. Initialization errors are returned here, processing
    /// errors through the output stream.
    async fn transform(
        &self,
        pattern: &str,
        input: Box<dyn Stream>,
    ) -> Result<Box<dyn Stream>, CoreError>;
}
