//! Fixed-capacity overwriting ring buffer.

use std::collections::VecDeque;
use std::error::Error;
use std::sync::{Arc, Condvar, Mutex};

use crate::error::{BufferError, Done};

/// A thread-safe lossy ring buffer.
///
/// When full, a write evicts the oldest item instead of blocking, so readers
/// always observe the most recent `capacity` items. Reads still block while
/// the buffer is empty.
pub struct RingBuffer<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    readable: Condvar,
}

struct State<T> {
    items: VecDeque<T>,
    capacity: usize,
    write_closed: bool,
    err: Option<Arc<dyn Error + Send + Sync>>,
}

impl<T> Clone for RingBuffer<T> {
    fn clone(&self) -> Self {
        RingBuffer {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> State<T> {
    fn closed_err(&self) -> Option<BufferError> {
        if let Some(e) = &self.err {
            return Some(BufferError::ClosedWithError(Arc::clone(e)));
        }
        if self.write_closed {
            return Some(BufferError::Closed);
        }
        None
    }

    fn push_evicting(&mut self, item: T) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }
}

impl<T> RingBuffer<T> {
    /// Creates a ring holding the last `capacity` items written.
    ///
    /// # Panics
    ///
    /// Panics when `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        RingBuffer {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    items: VecDeque::with_capacity(capacity),
                    capacity,
                    write_closed: false,
                    err: None,
                }),
                readable: Condvar::new(),
            }),
        }
    }

    /// Number of buffered items (at most the capacity).
    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap().items.len()
    }

    /// The fixed capacity.
    pub fn capacity(&self) -> usize {
        self.inner.state.lock().unwrap().capacity
    }

    /// True when no items are buffered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clears buffered items. The closed state is untouched.
    pub fn reset(&self) {
        self.inner.state.lock().unwrap().items.clear();
    }

    /// The error the buffer was closed with, if any.
    pub fn error(&self) -> Option<Arc<dyn Error + Send + Sync>> {
        self.inner.state.lock().unwrap().err.clone()
    }

    /// Closes the write side; readers drain then observe [`Done`].
    pub fn close_write(&self) -> Result<(), BufferError> {
        let mut st = self.inner.state.lock().unwrap();
        st.write_closed = true;
        self.inner.readable.notify_all();
        Ok(())
    }

    /// Closes the buffer with an error, waking all waiters. The first error
    /// wins.
    pub fn close_with_error<E>(&self, err: E) -> Result<(), BufferError>
    where
        E: Error + Send + Sync + 'static,
    {
        let mut st = self.inner.state.lock().unwrap();
        if st.err.is_none() {
            st.err = Some(Arc::new(err));
            st.write_closed = true;
            self.inner.readable.notify_all();
        }
        Ok(())
    }

    /// Same as [`close_write`](Self::close_write).
    pub fn close(&self) -> Result<(), BufferError> {
        self.close_write()
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Writes all of `data`, evicting the oldest items when full. Never
    /// blocks. The final content equals the last `min(len, capacity)` items
    /// of the logical sequence written so far, in order.
    pub fn write(&self, data: &[T]) -> Result<usize, BufferError> {
        let mut st = self.inner.state.lock().unwrap();
        if let Some(e) = st.closed_err() {
            return Err(e);
        }
        // Only the tail of an oversized input can survive.
        let skip = data.len().saturating_sub(st.capacity);
        if skip > 0 {
            st.items.clear();
        }
        for item in &data[skip..] {
            st.push_evicting(item.clone());
        }
        self.inner.readable.notify_one();
        Ok(data.len())
    }

    /// Writes one item, evicting the oldest when full.
    pub fn add(&self, item: T) -> Result<(), BufferError> {
        let mut st = self.inner.state.lock().unwrap();
        if let Some(e) = st.closed_err() {
            return Err(e);
        }
        st.push_evicting(item);
        self.inner.readable.notify_one();
        Ok(())
    }

    /// Pops up to `out.len()` items, blocking while empty. Returns `Ok(0)`
    /// once the write side is closed and drained.
    pub fn read(&self, out: &mut [T]) -> Result<usize, BufferError> {
        let mut st = self.inner.state.lock().unwrap();
        loop {
            if let Some(e) = &st.err {
                return Err(BufferError::ClosedWithError(Arc::clone(e)));
            }
            if !st.items.is_empty() {
                let n = out.len().min(st.items.len());
                for slot in out.iter_mut().take(n) {
                    *slot = st.items.pop_front().unwrap();
                }
                return Ok(n);
            }
            if st.write_closed {
                return Ok(0);
            }
            st = self.inner.readable.wait(st).unwrap();
        }
    }

    /// Pops the next item, blocking while empty. Returns `Err(Done)` once
    /// the buffer is closed and drained.
    pub fn next(&self) -> Result<T, Done> {
        let mut st = self.inner.state.lock().unwrap();
        loop {
            if st.err.is_some() {
                return Err(Done);
            }
            if let Some(item) = st.items.pop_front() {
                return Ok(item);
            }
            if st.write_closed {
                return Err(Done);
            }
            st = self.inner.readable.wait(st).unwrap();
        }
    }

    /// Drops the next `n` items, clamped to the current length.
    pub fn discard(&self, n: usize) -> Result<(), BufferError> {
        let mut st = self.inner.state.lock().unwrap();
        if let Some(e) = &st.err {
            return Err(BufferError::ClosedWithError(Arc::clone(e)));
        }
        let n = n.min(st.items.len());
        st.items.drain(..n);
        Ok(())
    }

    /// Snapshot copy of the buffered items in FIFO order.
    pub fn to_vec(&self) -> Vec<T> {
        let st = self.inner.state.lock().unwrap();
        st.items.iter().cloned().collect()
    }
}
