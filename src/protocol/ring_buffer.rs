//! Fixed-capacity byte FIFO used by the bus transport

/// Byte ring buffer with power-of-two capacity.
///
/// Writes to a full buffer are dropped. Reads from an empty buffer return 0.
/// Overflow is a protocol fault and is not reported to the caller.
pub struct RingBuffer<const N: usize> {
    buffer: [u8; N],
    head: usize,
    tail: usize,
    count: usize,
}

impl<const N: usize> RingBuffer<N> {
    const MASK: usize = {
        assert!(N.is_power_of_two(), "ring buffer capacity must be a power of two");
        N - 1
    };

    pub const fn new() -> Self {
        Self {
            buffer: [0; N],
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    /// Appends a byte, silently dropping it when the buffer is full
    #[inline]
    pub fn push(&mut self, byte: u8) {
        if self.count == N {
            tml_log!(warn, "ring buffer overflow");
            return;
        }
        self.buffer[self.head] = byte;
        self.head = (self.head + 1) & Self::MASK;
        self.count += 1;
    }

    /// Removes the oldest byte, or returns 0 when empty
    #[inline]
    pub fn pop(&mut self) -> u8 {
        if self.count == 0 {
            return 0;
        }
        let byte = self.buffer[self.tail];
        self.tail = (self.tail + 1) & Self::MASK;
        self.count -= 1;
        byte
    }

    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.push(byte);
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
