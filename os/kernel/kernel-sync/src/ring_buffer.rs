use alloc::vec;
use alloc::vec::Vec;

/// Fixed-capacity circular byte buffer.
///
/// Reads and writes are short rather than blocking; callers that need to
/// wait layer that on top.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    bytes: Vec<u8>,
    head: usize,
    filled: usize,
}

impl RingBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity],
            head: 0,
            filled: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.filled
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.filled == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.filled == self.capacity()
    }

    /// Appends as much of `src` as fits and returns how much that was.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let cap = self.capacity();
        let n = src.len().min(cap - self.filled);
        let mut tail = (self.head + self.filled) % cap.max(1);
        for &b in &src[..n] {
            self.bytes[tail] = b;
            tail = (tail + 1) % cap;
        }
        self.filled += n;
        n
    }

    /// Moves up to `dst.len()` bytes out and returns how many.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let cap = self.capacity();
        let n = dst.len().min(self.filled);
        for slot in &mut dst[..n] {
            *slot = self.bytes[self.head];
            self.head = (self.head + 1) % cap;
        }
        self.filled -= n;
        n
    }

    /// The buffered bytes in order, split where they wrap.
    #[must_use]
    pub fn as_slices(&self) -> (&[u8], &[u8]) {
        let first = self.filled.min(self.capacity() - self.head);
        (
            &self.bytes[self.head..self.head + first],
            &self.bytes[..self.filled - first],
        )
    }

    pub const fn reset(&mut self) {
        self.head = 0;
        self.filled = 0;
    }
}
