//! Bit-level output staging for the DEFLATE encoder.

/// Pending output of the compressor.
///
/// Bits are packed LSB first through a 64-bit accumulator (the DEFLATE
/// convention). Whole bytes collect in an internal buffer until the
/// caller drains them with [`PendingBuffer::flush`].
#[derive(Debug)]
pub struct PendingBuffer {
    buffer: Vec<u8>,
    start: usize,
    acc: u64,
    bits_in_acc: u8,
}

impl Default for PendingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingBuffer {
    /// Create an empty buffer with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(1 << 16)
    }

    /// Create an empty buffer with `capacity` bytes reserved.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            start: 0,
            acc: 0,
            bits_in_acc: 0,
        }
    }

    /// Discard all pending bytes and bits.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.start = 0;
        self.acc = 0;
        self.bits_in_acc = 0;
    }

    /// Write the low `num_bits` of `value`, LSB first.
    #[inline]
    pub fn write_bits(&mut self, value: u32, num_bits: u8) {
        debug_assert!(num_bits <= 32);
        let mask = (1u64 << num_bits) - 1;
        self.acc |= (value as u64 & mask) << self.bits_in_acc;
        self.bits_in_acc += num_bits;

        while self.bits_in_acc >= 8 {
            self.buffer.push(self.acc as u8);
            self.acc >>= 8;
            self.bits_in_acc -= 8;
        }
    }

    /// Write one byte. The buffer must be byte aligned.
    #[inline]
    pub fn write_byte(&mut self, byte: u8) {
        debug_assert_eq!(self.bits_in_acc, 0);
        self.buffer.push(byte);
    }

    /// Write a 16-bit value little-endian. The buffer must be byte aligned.
    #[inline]
    pub fn write_short(&mut self, value: u16) {
        debug_assert_eq!(self.bits_in_acc, 0);
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a 16-bit value big-endian. The buffer must be byte aligned.
    #[inline]
    pub fn write_short_msb(&mut self, value: u16) {
        debug_assert_eq!(self.bits_in_acc, 0);
        self.buffer.extend_from_slice(&value.to_be_bytes());
    }

    /// Copy raw bytes. The buffer must be byte aligned.
    pub fn write_block(&mut self, bytes: &[u8]) {
        debug_assert_eq!(self.bits_in_acc, 0);
        self.buffer.extend_from_slice(bytes);
    }

    /// Pad the partial byte with zero bits.
    pub fn align_to_byte(&mut self) {
        if self.bits_in_acc > 0 {
            self.buffer.push(self.acc as u8);
            self.acc = 0;
            self.bits_in_acc = 0;
        }
    }

    /// Bits held in the partial byte.
    #[inline]
    pub fn bit_count(&self) -> u8 {
        self.bits_in_acc
    }

    /// Complete bytes waiting to be drained.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len() - self.start
    }

    /// Whether no complete bytes are waiting.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether every complete byte has been drained.
    #[inline]
    pub fn is_flushed(&self) -> bool {
        self.is_empty()
    }

    /// Move as many complete bytes as fit into `output`; returns the count.
    pub fn flush(&mut self, output: &mut [u8]) -> usize {
        let count = self.len().min(output.len());
        output[..count].copy_from_slice(&self.buffer[self.start..self.start + count]);
        self.start += count;
        if self.start == self.buffer.len() {
            self.buffer.clear();
            self.start = 0;
        }
        count
    }
}
