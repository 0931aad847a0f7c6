//! DEFLATE compression (RFC 1951) as a streaming state machine.
//!
//! [`Deflater`] produces a raw DEFLATE stream. Input is queued with
//! [`Deflater::set_input`] and compressed output is pulled with
//! [`Deflater::deflate`]; [`Deflater::flush`] and [`Deflater::finish`]
//! ask the engine to write out everything it has buffered. The zlib
//! header and Adler-32 trailer are added by [`super::zlib::ZlibEncoder`]
//! or [`deflate_zlib`].

use super::adler32::adler32;
use super::lz77::{DeflateStrategy, DeflaterEngine};
use crate::error::{Error, Result};

/// Default compression level.
pub const DEFAULT_LEVEL: u8 = 6;

const OUTPUT_CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Busy,
    Flushing,
    Finishing,
    Finished,
}

/// Streaming raw DEFLATE compressor.
#[derive(Debug)]
pub struct Deflater {
    level: u8,
    state: State,
    engine: DeflaterEngine,
    total_out: u64,
}

impl Deflater {
    /// Create a deflater for `level` (0 = stored, 9 = best).
    pub fn new(level: u8) -> Result<Self> {
        Self::with_strategy(level, DeflateStrategy::Default)
    }

    /// Create a deflater with an explicit match strategy.
    pub fn with_strategy(level: u8, strategy: DeflateStrategy) -> Result<Self> {
        if level > 9 {
            return Err(Error::InvalidCompressionLevel(level));
        }
        Ok(Self {
            level,
            state: State::Busy,
            engine: DeflaterEngine::new(level, strategy),
            total_out: 0,
        })
    }

    /// Return the compression level configured for this deflater.
    #[inline]
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Change the level mid-stream; buffered data is flushed at the old one.
    pub fn set_level(&mut self, level: u8) -> Result<()> {
        if level > 9 {
            return Err(Error::InvalidCompressionLevel(level));
        }
        if self.level != level {
            self.level = level;
            self.engine.set_level(level);
        }
        Ok(())
    }

    /// Change the match strategy.
    pub fn set_strategy(&mut self, strategy: DeflateStrategy) {
        self.engine.set_strategy(strategy);
    }

    /// Start a new stream, discarding all state.
    pub fn reset(&mut self) {
        self.state = State::Busy;
        self.total_out = 0;
        self.engine.reset();
    }

    /// Queue input. Fails if the previous input has not been consumed or
    /// [`Deflater::finish`] was already called.
    pub fn set_input(&mut self, data: &[u8]) -> Result<()> {
        if matches!(self.state, State::Finishing | State::Finished) {
            return Err(Error::CompressionError("finish() already called".into()));
        }
        if !self.engine.needs_input() {
            return Err(Error::CompressionError(
                "old input was not completely processed".into(),
            ));
        }
        self.engine.set_input(data);
        Ok(())
    }

    /// Whether the queued input has been consumed.
    #[inline]
    pub fn needs_input(&self) -> bool {
        self.engine.needs_input()
    }

    /// Ask for all buffered data to be written at the next
    /// [`Deflater::deflate`] call, ending on a byte boundary.
    pub fn flush(&mut self) {
        if self.state == State::Busy {
            self.state = State::Flushing;
        }
    }

    /// Signal end of input; the final block is written by the following
    /// [`Deflater::deflate`] calls.
    pub fn finish(&mut self) -> Result<()> {
        if matches!(self.state, State::Finishing | State::Finished) {
            return Err(Error::CompressionError("finish() already called".into()));
        }
        self.state = State::Finishing;
        Ok(())
    }

    /// Whether the final block has been written and fully drained.
    #[inline]
    pub fn is_finished(&self) -> bool {
        self.state == State::Finished && self.engine.huffman().pending().is_flushed()
    }

    /// Total bytes consumed.
    #[inline]
    pub fn total_in(&self) -> u64 {
        self.engine.total_in()
    }

    /// Total compressed bytes produced.
    #[inline]
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Compress into `output`, returning the number of bytes written.
    ///
    /// Returns fewer bytes than `output.len()` once the engine needs more
    /// input, or when the stream is finished.
    pub fn deflate(&mut self, output: &mut [u8]) -> usize {
        let mut written = 0;
        loop {
            let count = self
                .engine
                .huffman_mut()
                .pending_mut()
                .flush(&mut output[written..]);
            written += count;
            self.total_out += count as u64;

            if written == output.len() || self.state == State::Finished {
                break;
            }

            let flushing = matches!(self.state, State::Flushing | State::Finishing);
            let finishing = self.state == State::Finishing;
            if self.engine.deflate(flushing, finishing) {
                continue;
            }

            match self.state {
                State::Busy => break,
                State::Flushing => {
                    if self.level != 0 {
                        // Empty static blocks give the inflater the
                        // lookahead it needs to emit every flushed byte.
                        let pending = self.engine.huffman_mut().pending_mut();
                        let mut needed_bits = 8 + ((8 - pending.bit_count() as i32) & 7);
                        while needed_bits > 0 {
                            pending.write_bits(2, 10);
                            needed_bits -= 10;
                        }
                    }
                    self.state = State::Busy;
                }
                State::Finishing => {
                    self.engine.huffman_mut().pending_mut().align_to_byte();
                    self.state = State::Finished;
                }
                State::Finished => break,
            }
        }
        written
    }
}

fn compress_to_end(mut deflater: Deflater, data: &[u8]) -> Vec<u8> {
    deflater.engine.set_input(data);
    deflater.state = State::Finishing;

    let mut output = Vec::with_capacity(data.len() / 2 + 64);
    let mut chunk = vec![0u8; OUTPUT_CHUNK];
    while !deflater.is_finished() {
        let n = deflater.deflate(&mut chunk);
        output.extend_from_slice(&chunk[..n]);
    }
    output
}

/// Compress data to a raw DEFLATE stream. Levels above 9 are clamped.
pub fn deflate(data: &[u8], level: u8) -> Vec<u8> {
    deflate_with_strategy(data, level, DeflateStrategy::Default)
}

/// Compress data to a raw DEFLATE stream with an explicit strategy.
pub fn deflate_with_strategy(data: &[u8], level: u8, strategy: DeflateStrategy) -> Vec<u8> {
    let level = level.min(9);
    let deflater = Deflater {
        level,
        state: State::Busy,
        engine: DeflaterEngine::new(level, strategy),
        total_out: 0,
    };
    compress_to_end(deflater, data)
}

/// Compress data to a zlib stream (RFC 1950).
pub fn deflate_zlib(data: &[u8], level: u8) -> Vec<u8> {
    let level = level.min(9);
    let mut output = zlib_header(level).to_vec();
    output.extend_from_slice(&deflate(data, level));
    output.extend_from_slice(&adler32(data).to_be_bytes());
    output
}

/// Two-byte zlib header for `level`.
///
/// CMF is fixed at 0x78 (DEFLATE, 32 KiB window); FLG carries the
/// informative FLEVEL and an FCHECK making the pair divisible by 31.
pub fn zlib_header(level: u8) -> [u8; 2] {
    let cmf: u8 = 0x78;

    let flevel = match level {
        0..=1 => 0,
        2..=5 => 1,
        6 => 2,
        _ => 3,
    };

    let mut flg: u8 = flevel << 6; // FDICT=0
    let fcheck = (31 - (((cmf as u16) << 8 | flg as u16) % 31)) % 31;
    flg |= fcheck as u8;

    [cmf, flg]
}
