//! Pre-sized byte buffer constructors.

use crate::{BlockBuffer, Buffer, RingBuffer};

/// 1KB growable byte buffer.
pub fn bytes_1kb() -> Buffer<u8> {
    Buffer::with_capacity(1024)
}

/// 4KB growable byte buffer.
pub fn bytes_4kb() -> Buffer<u8> {
    Buffer::with_capacity(4096)
}

/// 64KB growable byte buffer.
pub fn bytes_64kb() -> Buffer<u8> {
    Buffer::with_capacity(65536)
}

/// Default growable byte buffer (1KB).
pub fn bytes() -> Buffer<u8> {
    bytes_1kb()
}

/// 1KB blocking byte buffer.
pub fn block_bytes_1kb() -> BlockBuffer<u8> {
    BlockBuffer::new(1024)
}

/// 4KB blocking byte buffer.
pub fn block_bytes_4kb() -> BlockBuffer<u8> {
    BlockBuffer::new(4096)
}

/// 64KB blocking byte buffer.
pub fn block_bytes_64kb() -> BlockBuffer<u8> {
    BlockBuffer::new(65536)
}

/// Default blocking byte buffer (1KB).
pub fn block_bytes() -> BlockBuffer<u8> {
    block_bytes_1kb()
}

/// 4KB ring byte buffer.
pub fn ring_bytes_4kb() -> RingBuffer<u8> {
    RingBuffer::new(4096)
}

/// Ring byte buffer of the given capacity.
pub fn ring_bytes(size: usize) -> RingBuffer<u8> {
    RingBuffer::new(size)
}
