//! Thread-safe buffers for streaming producers and consumers.
//!
//! Every stream in talkbox is backed by one of three containers:
//!
//! - [`Buffer<T>`]: growable, writes never block.
//! - [`BlockBuffer<T>`]: fixed capacity, writes block when full. This is the
//!   backpressure primitive.
//! - [`RingBuffer<T>`]: fixed capacity, writes overwrite the oldest item.
//!   Readers always see the most recent window.
//!
//! All three share the same lifecycle: [`close_write`](Buffer::close_write)
//! lets readers drain what is buffered and then observe a [`Done`] sentinel,
//! while [`close_with_error`](Buffer::close_with_error) wakes every waiter
//! immediately with the error. The first error wins; an errored buffer
//! surfaces the error even when data is still buffered.
//!
//! Buffers are `Clone`; clones share state through an `Arc`, so one side of
//! a producer/consumer pair hands a clone to the other.
//!
//! ```
//! use talkbox_buffer::BlockBuffer;
//! use std::thread;
//!
//! let buf = BlockBuffer::<u8>::new(8);
//! let writer = buf.clone();
//! let t = thread::spawn(move || {
//!     writer.write(&[1, 2, 3]).unwrap();
//!     writer.close_write().unwrap();
//! });
//! let mut out = Vec::new();
//! while let Ok(b) = buf.next() {
//!     out.push(b);
//! }
//! t.join().unwrap();
//! assert_eq!(out, vec![1, 2, 3]);
//! ```

mod block;
mod bytes;
mod error;
mod growable;
mod ring;

pub use block::BlockBuffer;
pub use bytes::*;
pub use error::{BufferError, Done};
pub use growable::Buffer;
pub use ring::RingBuffer;
