//! Command frames and the additive checksum

use crate::config::FRAME_CAPACITY;

/// Arithmetic sum (mod 256) of `bytes`
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// One remote-to-device frame: opcode, operands and (for data frames) a
/// trailing checksum. Rebuilt by the transport for every read transaction.
pub struct CommandFrame {
    buffer: [u8; FRAME_CAPACITY],
    length: usize,
}

impl CommandFrame {
    pub const fn new() -> Self {
        Self {
            buffer: [0; FRAME_CAPACITY],
            length: 0,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut frame = Self::new();
        for &byte in bytes {
            frame.push(byte);
        }
        frame
    }

    /// Appends a byte; bytes beyond the frame capacity are dropped
    pub fn push(&mut self, byte: u8) {
        if self.length < FRAME_CAPACITY {
            self.buffer[self.length] = byte;
            self.length += 1;
        }
    }

    pub fn clear(&mut self) {
        self.length = 0;
    }

    /// Opcode byte, 0 for an empty frame
    pub fn opcode(&self) -> u8 {
        if self.length == 0 {
            0
        } else {
            self.buffer[0]
        }
    }

    /// Operand byte `index` (0 is the first byte after the opcode)
    pub fn operand(&self, index: usize) -> u8 {
        self.operands().get(index).copied().unwrap_or(0)
    }

    pub fn operands(&self) -> &[u8] {
        if self.length == 0 {
            &[]
        } else {
            &self.buffer[1..self.length]
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.length]
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl Default for CommandFrame {
    fn default() -> Self {
        Self::new()
    }
}
