//! Fixed-capacity FIFO byte buffer used by the relay engine.
//!
//! Mirrors tinyproxy's `buffer_s`: a single contiguous `Vec<u8>` acting as a
//! queue, capped at `MAXBUFFSIZE` so neither relay direction can grow
//! without bound. Capacity is never exceeded; callers must check
//! `room()`/`len()` before reading more bytes in.

/// A bounded byte queue. `len() <= capacity` always holds.
#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    capacity: usize,
}

impl Buffer {
    pub fn new(capacity: usize) -> Self {
        Buffer {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes of free space before `capacity` is reached.
    pub fn room(&self) -> usize {
        self.capacity - self.data.len()
    }

    /// Readable slice, oldest bytes first.
    pub fn readable(&self) -> &[u8] {
        &self.data
    }

    /// Appends bytes; caller must ensure `bytes.len() <= room()`.
    pub fn push(&mut self, bytes: &[u8]) {
        debug_assert!(bytes.len() <= self.room());
        self.data.extend_from_slice(bytes);
    }

    /// Drops the first `n` bytes after they've been written out.
    pub fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.data.len());
        self.data.drain(..n);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty_with_full_room() {
        let buf = Buffer::new(8192);
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.room(), 8192);
        assert!(buf.is_empty());
    }

    #[test]
    fn push_and_advance_respect_capacity() {
        let mut buf = Buffer::new(8);
        buf.push(b"abcd");
        assert_eq!(buf.len(), 4);
        assert_eq!(buf.room(), 4);
        assert_eq!(buf.readable(), b"abcd");

        buf.advance(2);
        assert_eq!(buf.readable(), b"cd");
        assert_eq!(buf.len(), 2);
        assert_eq!(buf.room(), 6);
    }

    #[test]
    fn never_exceeds_capacity_under_repeated_use() {
        let mut buf = Buffer::new(4);
        for _ in 0..100 {
            let room = buf.room();
            if room > 0 {
                buf.push(&vec![b'x'; room.min(3)]);
            }
            assert!(buf.len() <= buf.capacity());
            let drain = buf.len().min(2);
            buf.advance(drain);
        }
    }
}
