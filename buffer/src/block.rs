//! Fixed-capacity blocking buffer.

use std::collections::VecDeque;
use std::error::Error;
use std::sync::{Arc, Condvar, Mutex};

use crate::error::{BufferError, Done};

/// A thread-safe fixed-capacity FIFO buffer.
///
/// Writes block while the buffer is full and reads block while it is empty,
/// so a fast producer is throttled to the pace of its consumer.
pub struct BlockBuffer<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    state: Mutex<State<T>>,
    readable: Condvar,
    writable: Condvar,
}

struct State<T> {
    items: VecDeque<T>,
    capacity: usize,
    write_closed: bool,
    err: Option<Arc<dyn Error + Send + Sync>>,
}

impl<T> Clone for BlockBuffer<T> {
    fn clone(&self) -> Self {
        BlockBuffer {
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
}

impl<T> BlockBuffer<T> {
    /// Creates a buffer holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics when `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        BlockBuffer {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    items: VecDeque::with_capacity(capacity),
                    capacity,
                    write_closed: false,
                    err: None,
                }),
                readable: Condvar::new(),
                writable: Condvar::new(),
            }),
        }
    }

    /// Creates a buffer pre-filled with `data`; capacity equals its length.
    pub fn from_vec(data: Vec<T>) -> Self {
        assert!(!data.is_empty(), "capacity must be greater than 0");
        let capacity = data.len();
        BlockBuffer {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    items: VecDeque::from(data),
                    capacity,
                    write_closed: false,
                    err: None,
                }),
                readable: Condvar::new(),
                writable: Condvar::new(),
            }),
        }
    }

    /// Number of buffered items.
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

    /// True when the buffer is at capacity.
    pub fn is_full(&self) -> bool {
        let st = self.inner.state.lock().unwrap();
        st.items.len() == st.capacity
    }

    /// Clears buffered items and wakes blocked writers. The closed state is
    /// untouched.
    pub fn reset(&self) {
        let mut st = self.inner.state.lock().unwrap();
        st.items.clear();
        self.inner.writable.notify_all();
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
        self.inner.writable.notify_all();
        Ok(())
    }

    /// Closes the buffer with an error, waking all waiters immediately.
    /// The first error wins.
    pub fn close_with_error<E>(&self, err: E) -> Result<(), BufferError>
    where
        E: Error + Send + Sync + 'static,
    {
        let mut st = self.inner.state.lock().unwrap();
        if st.err.is_none() {
            st.err = Some(Arc::new(err));
            st.write_closed = true;
            self.inner.readable.notify_all();
            self.inner.writable.notify_all();
        }
        Ok(())
    }

    /// Same as [`close_write`](Self::close_write).
    pub fn close(&self) -> Result<(), BufferError> {
        self.close_write()
    }
}

impl<T: Clone> BlockBuffer<T> {
    /// Appends all of `data`, blocking whenever the buffer is full.
    ///
    /// If the buffer closes mid-write, the count written so far is returned;
    /// a write that moved nothing returns the close error.
    pub fn write(&self, data: &[T]) -> Result<usize, BufferError> {
        if data.is_empty() {
            return Ok(0);
        }
        let mut st = self.inner.state.lock().unwrap();
        let mut written = 0;
        loop {
            if let Some(e) = st.closed_err() {
                return if written > 0 { Ok(written) } else { Err(e) };
            }
            while written < data.len() && st.items.len() < st.capacity {
                st.items.push_back(data[written].clone());
                written += 1;
            }
            if written > 0 {
                self.inner.readable.notify_one();
            }
            if written == data.len() {
                return Ok(written);
            }
            st = self.inner.writable.wait(st).unwrap();
        }
    }

    /// Appends one item, blocking while the buffer is full.
    pub fn add(&self, item: T) -> Result<(), BufferError> {
        let mut st = self.inner.state.lock().unwrap();
        loop {
            if let Some(e) = st.closed_err() {
                return Err(e);
            }
            if st.items.len() < st.capacity {
                st.items.push_back(item);
                self.inner.readable.notify_one();
                return Ok(());
            }
            st = self.inner.writable.wait(st).unwrap();
        }
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
                self.inner.writable.notify_one();
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
                self.inner.writable.notify_one();
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
        self.inner.writable.notify_all();
        Ok(())
    }

    /// Snapshot copy of the buffered items in FIFO order.
    pub fn to_vec(&self) -> Vec<T> {
        let st = self.inner.state.lock().unwrap();
        st.items.iter().cloned().collect()
    }
}
