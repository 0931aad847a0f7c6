//! DEFLATE decompression (RFC 1951) and zlib unwrapping (RFC 1950).
//!
//! [`Inflater`] decodes a raw DEFLATE stream incrementally and implements
//! [`Read`], so PNG image data can be pulled scanline by scanline without
//! holding the whole decompressed image in memory. [`ZlibDecoder`] adds
//! header validation and the Adler-32 trailer check.

use std::io::{self, Read};

use super::bit_reader::BitReader;
use crate::compress::adler32::Adler32;
use crate::error::{Error, Result};

/// Length code base values (codes 257-285).
const LENGTH_BASE: [u16; 29] = [
    3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
    163, 195, 227, 258,
];

/// Extra bits for length codes.
const LENGTH_EXTRA: [u8; 29] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

/// Distance code base values (codes 0-29).
const DISTANCE_BASE: [u16; 30] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

/// Extra bits for distance codes.
const DISTANCE_EXTRA: [u8; 30] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// Order of code length codes for dynamic Huffman.
const CODE_LENGTH_ORDER: [usize; 19] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Maximum code length for DEFLATE Huffman codes.
const MAX_BITS: usize = 15;

/// Bits resolved by a single table lookup.
const LOOKUP_BITS: u8 = 9;

/// Back-reference window.
const WINDOW_SIZE: usize = 32 * 1024;

/// Output decoded ahead of the caller per refill.
const DECODE_AHEAD: usize = 32 * 1024;

/// Huffman decoding table with fast lookup.
struct HuffmanTable {
    /// Indexed by the next LOOKUP_BITS bits.
    /// Entry format: low 12 bits = symbol, bits 12-15 = code length.
    /// A zero length sends the decoder down the slow path.
    lookup: Vec<u16>,
    /// Number of codes of each length.
    counts: [u16; MAX_BITS + 1],
    /// Symbols ordered by code (canonical order).
    symbols: Vec<u16>,
    /// Maximum code length in this table.
    max_len: u8,
}

impl HuffmanTable {
    /// Build a Huffman table from code lengths.
    fn from_lengths(lengths: &[u8]) -> Result<Self> {
        let max_len = lengths.iter().copied().max().unwrap_or(0);
        if max_len as usize > MAX_BITS {
            return Err(Error::InvalidDecode("code length too large".into()));
        }

        let mut counts = [0u16; MAX_BITS + 1];
        for &len in lengths {
            counts[len as usize] += 1;
        }
        counts[0] = 0;

        // Incomplete codes are legal, oversubscribed ones are not.
        let mut left: i32 = 1;
        for &count in &counts[1..] {
            left <<= 1;
            left -= count as i32;
            if left < 0 {
                return Err(Error::InvalidDecode("oversubscribed Huffman code".into()));
            }
        }

        let mut offsets = [0u16; MAX_BITS + 2];
        for len in 1..=MAX_BITS {
            offsets[len + 1] = offsets[len] + counts[len];
        }
        let mut symbols = vec![0u16; offsets[MAX_BITS + 1] as usize];
        for (symbol, &len) in lengths.iter().enumerate() {
            if len > 0 {
                symbols[offsets[len as usize] as usize] = symbol as u16;
                offsets[len as usize] += 1;
            }
        }

        let mut next_code = [0u32; MAX_BITS + 1];
        let mut code = 0u32;
        for bits in 1..=MAX_BITS {
            code = (code + counts[bits - 1] as u32) << 1;
            next_code[bits] = code;
        }

        let mut lookup = vec![0u16; 1 << LOOKUP_BITS];
        for (symbol, &len) in lengths.iter().enumerate() {
            if len == 0 {
                continue;
            }
            let code = next_code[len as usize];
            next_code[len as usize] += 1;
            if len > LOOKUP_BITS {
                continue;
            }

            // Reverse the code for LSB-first reading and fill every slot
            // that has it as a prefix.
            let reversed = reverse_bits(code as u16, len) as usize;
            let entry = (symbol as u16) | ((len as u16) << 12);
            for i in 0..1usize << (LOOKUP_BITS - len) {
                lookup[reversed | (i << len)] = entry;
            }
        }

        Ok(Self {
            lookup,
            counts,
            symbols,
            max_len,
        })
    }

    /// Decode a symbol using the Huffman table.
    fn decode<R: Read>(&self, reader: &mut BitReader<R>) -> Result<u16> {
        if self.max_len == 0 {
            return Err(Error::InvalidDecode("empty Huffman table".into()));
        }

        // Near the end of the stream fewer than LOOKUP_BITS may remain;
        // a short code can still resolve from what is there.
        let (peek, available) = reader.try_peek_bits(LOOKUP_BITS)?;
        let entry = self.lookup[peek as usize];
        let len = (entry >> 12) as u8;
        if len > 0 && len <= available {
            reader.consume(len);
            return Ok(entry & 0xFFF);
        }

        self.decode_slow(reader)
    }

    /// Canonical decode one bit at a time, for codes longer than LOOKUP_BITS.
    fn decode_slow<R: Read>(&self, reader: &mut BitReader<R>) -> Result<u16> {
        let mut code: i32 = 0;
        let mut first: i32 = 0;
        let mut index: i32 = 0;
        for len in 1..=self.max_len as usize {
            code |= reader.read_bits(1)? as i32;
            let count = self.counts[len] as i32;
            if code - first < count {
                return Ok(self.symbols[(index + code - first) as usize]);
            }
            index += count;
            first = (first + count) << 1;
            code <<= 1;
        }
        Err(Error::InvalidDecode("invalid Huffman code".into()))
    }
}

/// Reverse bits in a value (for LSB-first code reconstruction).
fn reverse_bits(value: u16, length: u8) -> u16 {
    value.reverse_bits() >> (16 - length as u32)
}

/// Fixed Huffman tables per RFC 1951 section 3.2.6.
fn fixed_tables() -> Result<(HuffmanTable, HuffmanTable)> {
    let mut lengths = [0u8; 288];
    lengths[..144].fill(8);
    lengths[144..256].fill(9);
    lengths[256..280].fill(7);
    lengths[280..].fill(8);
    let literal = HuffmanTable::from_lengths(&lengths)?;
    let distance = HuffmanTable::from_lengths(&[5u8; 30])?;
    Ok((literal, distance))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockState {
    /// Expecting a block header.
    Header,
    /// Inside a stored block with this many bytes left.
    Stored(usize),
    /// Inside a fixed or dynamic Huffman block.
    Huffman { fixed: bool },
    /// The final block has ended.
    Done,
}

/// Streaming raw DEFLATE decoder.
pub struct Inflater<R: Read> {
    reader: BitReader<R>,
    /// History followed by output the caller has not read yet.
    window: Vec<u8>,
    read_pos: usize,
    state: BlockState,
    last_block: bool,
    dynamic: Option<(HuffmanTable, HuffmanTable)>,
    fixed: Option<(HuffmanTable, HuffmanTable)>,
    total_out: u64,
}

impl<R: Read> Inflater<R> {
    /// Decode the raw DEFLATE stream read from `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            reader: BitReader::new(inner),
            window: Vec::with_capacity(2 * WINDOW_SIZE + DECODE_AHEAD),
            read_pos: 0,
            state: BlockState::Header,
            last_block: false,
            dynamic: None,
            fixed: None,
            total_out: 0,
        }
    }

    /// Whether the final block has been decoded and all output read.
    pub fn is_finished(&self) -> bool {
        self.state == BlockState::Done && self.read_pos == self.window.len()
    }

    /// Total decompressed bytes produced so far.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Consume the inflater, returning the source.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }

    fn bits(&mut self) -> &mut BitReader<R> {
        &mut self.reader
    }

    /// Drop history that is no longer reachable by back-references.
    fn compact(&mut self) {
        if self.read_pos >= 2 * WINDOW_SIZE {
            let cut = self.read_pos - WINDOW_SIZE;
            self.window.drain(..cut);
            self.read_pos -= cut;
        }
    }

    /// Decode until at least one unread byte is available or the stream ends.
    fn fill(&mut self) -> Result<()> {
        self.compact();
        let target = self.window.len() + DECODE_AHEAD;

        while self.window.len() < target {
            match self.state {
                BlockState::Done => break,
                BlockState::Header => {
                    if self.last_block {
                        self.state = BlockState::Done;
                        break;
                    }
                    self.read_block_header()?;
                }
                BlockState::Stored(remaining) => {
                    if remaining == 0 {
                        self.state = BlockState::Header;
                        continue;
                    }
                    let start = self.window.len();
                    let want = remaining.min(target - start);
                    self.window.resize(start + want, 0);
                    let n = self.reader.read_aligned(&mut self.window[start..])?;
                    self.window.truncate(start + n);
                    if n == 0 {
                        return Err(Error::InvalidDecode("truncated stored block".into()));
                    }
                    self.total_out += n as u64;
                    self.state = BlockState::Stored(remaining - n);
                }
                BlockState::Huffman { fixed } => {
                    let tables = if fixed {
                        self.fixed.take()
                    } else {
                        self.dynamic.take()
                    };
                    let Some(tables) = tables else {
                        return Err(Error::InvalidDecode("missing Huffman tables".into()));
                    };
                    let result = self.decode_symbols(&tables.0, &tables.1, target);
                    if fixed {
                        self.fixed = Some(tables);
                    } else {
                        self.dynamic = Some(tables);
                    }
                    if result? {
                        self.state = BlockState::Header;
                    }
                }
            }
        }
        Ok(())
    }

    fn read_block_header(&mut self) -> Result<()> {
        self.last_block = self.reader.read_bits(1)? == 1;
        let btype = self.reader.read_bits(2)?;

        self.state = match btype {
            0 => {
                self.reader.align_to_byte();
                let len = self.reader.read_bits(16)? as u16;
                let nlen = self.reader.read_bits(16)? as u16;
                if len != !nlen {
                    return Err(Error::InvalidDecode("stored block LEN/NLEN mismatch".into()));
                }
                BlockState::Stored(len as usize)
            }
            1 => {
                if self.fixed.is_none() {
                    self.fixed = Some(fixed_tables()?);
                }
                BlockState::Huffman { fixed: true }
            }
            2 => {
                self.dynamic = Some(read_dynamic_tables(self.bits())?);
                BlockState::Huffman { fixed: false }
            }
            _ => return Err(Error::InvalidDecode("reserved block type".into())),
        };
        Ok(())
    }

    /// Decode symbols until end of block (returns `true`) or until the
    /// window reaches `target` bytes (returns `false`).
    fn decode_symbols(
        &mut self,
        lit_table: &HuffmanTable,
        dist_table: &HuffmanTable,
        target: usize,
    ) -> Result<bool> {
        while self.window.len() < target {
            let symbol = lit_table.decode(&mut self.reader)?;
            match symbol {
                0..=255 => {
                    self.window.push(symbol as u8);
                    self.total_out += 1;
                }
                256 => return Ok(true),
                257..=285 => {
                    let len_idx = (symbol - 257) as usize;
                    let length = LENGTH_BASE[len_idx] as usize
                        + self.reader.read_bits(LENGTH_EXTRA[len_idx])? as usize;

                    let dist_symbol = dist_table.decode(&mut self.reader)? as usize;
                    if dist_symbol >= 30 {
                        return Err(Error::InvalidDecode("invalid distance code".into()));
                    }
                    let distance = DISTANCE_BASE[dist_symbol] as usize
                        + self.reader.read_bits(DISTANCE_EXTRA[dist_symbol])? as usize;

                    if distance > self.window.len() {
                        return Err(Error::InvalidDecode("distance too far back".into()));
                    }

                    let start = self.window.len() - distance;
                    if distance >= length {
                        self.window.extend_from_within(start..start + length);
                    } else {
                        // Overlapping copy repeats the last `distance` bytes.
                        for i in 0..length {
                            let byte = self.window[start + i];
                            self.window.push(byte);
                        }
                    }
                    self.total_out += length as u64;
                }
                _ => {
                    return Err(Error::InvalidDecode(format!(
                        "invalid literal/length code: {symbol}"
                    )));
                }
            }
        }
        Ok(false)
    }
}

fn read_dynamic_tables<R: Read>(reader: &mut BitReader<R>) -> Result<(HuffmanTable, HuffmanTable)> {
    let hlit = reader.read_bits(5)? as usize + 257;
    let hdist = reader.read_bits(5)? as usize + 1;
    let hclen = reader.read_bits(4)? as usize + 4;
    if hlit > 286 || hdist > 30 {
        return Err(Error::InvalidDecode("too many length or distance codes".into()));
    }

    let mut cl_lengths = [0u8; 19];
    for &index in &CODE_LENGTH_ORDER[..hclen] {
        cl_lengths[index] = reader.read_bits(3)? as u8;
    }
    let cl_table = HuffmanTable::from_lengths(&cl_lengths)?;

    let mut lengths = vec![0u8; hlit + hdist];
    let mut i = 0;
    while i < lengths.len() {
        let symbol = cl_table.decode(reader)?;
        let (value, repeat) = match symbol {
            0..=15 => (symbol as u8, 1),
            16 => {
                if i == 0 {
                    return Err(Error::InvalidDecode("repeat code at start".into()));
                }
                (lengths[i - 1], reader.read_bits(2)? as usize + 3)
            }
            17 => (0, reader.read_bits(3)? as usize + 3),
            18 => (0, reader.read_bits(7)? as usize + 11),
            _ => return Err(Error::InvalidDecode("invalid code length code".into())),
        };
        if i + repeat > lengths.len() {
            return Err(Error::InvalidDecode("too many code lengths".into()));
        }
        lengths[i..i + repeat].fill(value);
        i += repeat;
    }

    if lengths[256] == 0 {
        return Err(Error::InvalidDecode("missing end-of-block code".into()));
    }

    let literal = HuffmanTable::from_lengths(&lengths[..hlit])?;
    let distance = HuffmanTable::from_lengths(&lengths[hlit..])?;
    Ok((literal, distance))
}

impl<R: Read> Read for Inflater<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.read_pos == self.window.len() {
            self.fill()?;
        }
        let available = &self.window[self.read_pos..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.read_pos += n;
        Ok(n)
    }
}

/// Streaming zlib decoder.
///
/// The two-byte header is validated on the first read; the Adler-32 trailer
/// is checked once the DEFLATE stream ends, before end of stream is reported.
pub struct ZlibDecoder<R: Read> {
    inflater: Inflater<R>,
    adler: Adler32,
    header_read: bool,
    trailer_checked: bool,
}

impl<R: Read> ZlibDecoder<R> {
    /// Decode the zlib stream read from `inner`.
    pub fn new(inner: R) -> Self {
        Self {
            inflater: Inflater::new(inner),
            adler: Adler32::new(),
            header_read: false,
            trailer_checked: false,
        }
    }

    /// Total decompressed bytes produced so far.
    pub fn total_out(&self) -> u64 {
        self.inflater.total_out()
    }

    /// Whether the stream ended and its checksum matched.
    pub fn is_finished(&self) -> bool {
        self.trailer_checked
    }

    /// Consume the decoder, returning the source.
    pub fn into_inner(self) -> R {
        self.inflater.into_inner()
    }

    fn read_header(&mut self) -> Result<()> {
        let reader = self.inflater.bits();
        let cmf = reader.read_bits(8).map_err(|_| truncated_header())? as u8;
        let flg = reader.read_bits(8).map_err(|_| truncated_header())? as u8;

        if cmf & 0x0F != 8 {
            return Err(Error::InvalidDecode("invalid zlib compression method".into()));
        }
        if cmf >> 4 > 7 {
            return Err(Error::InvalidDecode("invalid zlib window size".into()));
        }
        if (((cmf as u16) << 8) | (flg as u16)) % 31 != 0 {
            return Err(Error::InvalidDecode("invalid zlib header checksum".into()));
        }
        if flg & 0x20 != 0 {
            return Err(Error::InvalidDecode("preset dictionary not supported".into()));
        }
        self.header_read = true;
        Ok(())
    }

    fn check_trailer(&mut self) -> Result<()> {
        let reader = self.inflater.bits();
        reader.align_to_byte();
        let mut trailer = [0u8; 4];
        reader.read_bytes(&mut trailer)?;
        let stored = u32::from_be_bytes(trailer);
        let computed = self.adler.finalize();
        if stored != computed {
            return Err(Error::InvalidDecode(format!(
                "Adler32 mismatch: expected {stored:08X}, got {computed:08X}"
            )));
        }
        self.trailer_checked = true;
        Ok(())
    }
}

fn truncated_header() -> Error {
    Error::InvalidDecode("zlib stream too short".into())
}

impl<R: Read> Read for ZlibDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.header_read {
            self.read_header()?;
        }
        let n = self.inflater.read(buf)?;
        self.adler.update(&buf[..n]);
        if n == 0 && !buf.is_empty() && !self.trailer_checked {
            self.check_trailer()?;
        }
        Ok(n)
    }
}

/// Inflate a raw DEFLATE stream held in memory.
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(data.len().saturating_mul(4));
    Inflater::new(data).read_to_end(&mut output)?;
    Ok(output)
}

/// Inflate a zlib stream held in memory.
pub fn inflate_zlib(data: &[u8]) -> Result<Vec<u8>> {
    inflate_zlib_with_size(data, None)
}

/// Inflate a zlib stream, checking the output length when it is known.
pub fn inflate_zlib_with_size(data: &[u8], expected_size: Option<usize>) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(expected_size.unwrap_or(data.len().saturating_mul(4)));
    ZlibDecoder::new(data).read_to_end(&mut output)?;

    if let Some(expected) = expected_size {
        if output.len() != expected {
            return Err(Error::InvalidDecode(format!(
                "decompressed size mismatch: expected {expected}, got {}",
                output.len()
            )));
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::deflate::{deflate, deflate_zlib};
    use rand::{Rng, SeedableRng};
    use std::io::Write;

    fn flate2_zlib(data: &[u8], level: u32) -> Vec<u8> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::new(level));
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_reverse_bits() {
        assert_eq!(reverse_bits(0b101, 3), 0b101);
        assert_eq!(reverse_bits(0b100, 3), 0b001);
        assert_eq!(reverse_bits(0b1100, 4), 0b0011);
    }

    #[test]
    fn test_inflate_stored() {
        // BFINAL=1, BTYPE=00, LEN=5, NLEN=!5, "hello"
        let mut data = vec![0b00000001];
        data.extend_from_slice(&[5, 0]);
        data.extend_from_slice(&[0xFA, 0xFF]);
        data.extend_from_slice(b"hello");

        assert_eq!(inflate(&data).unwrap(), b"hello");
    }

    #[test]
    fn test_inflate_empty_fixed_block() {
        assert!(inflate(&[0x03, 0x00]).unwrap().is_empty());
    }

    #[test]
    fn test_inflate_zlib_roundtrip() {
        let original = b"The quick brown fox jumps over the lazy dog. The quick brown fox jumps over the lazy dog.";
        let compressed = deflate_zlib(original, 6);
        assert_eq!(inflate_zlib(&compressed).unwrap(), original.to_vec());
    }

    #[test]
    fn test_inflate_zlib_empty() {
        let compressed = deflate_zlib(&[], 6);
        assert!(inflate_zlib(&compressed).unwrap().is_empty());
    }

    #[test]
    fn test_inflate_flate2_streams() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        for size in [1usize, 10, 1000, 70_000, 200_000] {
            let original: Vec<u8> = (0..size)
                .map(|i| if rng.gen_bool(0.3) { rng.gen() } else { (i % 40) as u8 })
                .collect();
            for level in [0, 1, 6, 9] {
                let compressed = flate2_zlib(&original, level);
                assert_eq!(
                    inflate_zlib(&compressed).unwrap(),
                    original,
                    "size={size} level={level}"
                );
            }
        }
    }

    #[test]
    fn test_inflate_raw_roundtrip_all_levels() {
        let original: Vec<u8> = (0..100_000u32).map(|i| (i * 31 % 199) as u8).collect();
        for level in 0..=9 {
            assert_eq!(inflate(&deflate(&original, level)).unwrap(), original);
        }
    }

    #[test]
    fn test_inflate_bad_checksum() {
        let mut compressed = deflate_zlib(b"test data", 6);
        let len = compressed.len();
        compressed[len - 1] ^= 0xFF;

        let err = inflate_zlib(&compressed).unwrap_err();
        assert!(err.to_string().contains("Adler32"), "{err}");
    }

    #[test]
    fn test_inflate_missing_trailer() {
        let compressed = deflate_zlib(b"test data", 6);
        assert!(inflate_zlib(&compressed[..compressed.len() - 2]).is_err());
    }

    #[test]
    fn test_inflate_zlib_with_wrong_expected_size() {
        let compressed = deflate_zlib(b"hello world", 6);
        let err = inflate_zlib_with_size(&compressed, Some(21)).unwrap_err();
        assert!(err.to_string().contains("size mismatch"), "{err}");
        assert_eq!(inflate_zlib_with_size(&compressed, Some(11)).unwrap(), b"hello world");
    }

    #[test]
    fn test_inflate_bad_headers() {
        assert!(inflate_zlib(&[]).is_err());
        assert!(inflate_zlib(&[0x78]).is_err());
        // Not deflate.
        assert!(inflate_zlib(&[0x00, 0x00, 0x00, 0x00, 0x00]).is_err());
        // FCHECK wrong.
        assert!(inflate_zlib(&[0x78, 0x9D, 0x03, 0x00, 0, 0, 0, 1]).is_err());
        // Preset dictionary.
        assert!(inflate_zlib(&[0x78, 0xBB, 0, 0, 0, 0, 0x03, 0x00, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn test_inflate_invalid_block_type() {
        let data = [0x78, 0x9C, 0x07];
        assert!(inflate_zlib(&data).is_err());
    }

    #[test]
    fn test_inflate_distance_too_far() {
        // Fixed block: length 3 (code 257 = 0000001), distance code 0
        // (distance 1) with nothing decoded yet.
        let mut pending = crate::bits::PendingBuffer::new();
        pending.write_bits(1, 1);
        pending.write_bits(1, 2);
        pending.write_bits(crate::compress::huffman::bit_reverse(0b0000001 << 9) as u32, 7);
        pending.write_bits(0, 5);
        pending.align_to_byte();
        let mut data = vec![0u8; pending.len()];
        pending.flush(&mut data);

        let err = inflate(&data).unwrap_err();
        assert!(err.to_string().contains("distance too far back"), "{err}");
    }

    #[test]
    fn test_huffman_table_rejects_oversubscribed() {
        assert!(HuffmanTable::from_lengths(&[1, 1, 1]).is_err());
    }

    #[test]
    fn test_huffman_table_incomplete_allowed() {
        let table = HuffmanTable::from_lengths(&[0, 1]).unwrap();
        assert_eq!(table.max_len, 1);
        assert_eq!(table.symbols, vec![1]);
    }

    #[test]
    fn test_huffman_long_codes_use_slow_path() {
        // Lengths 1..=14, 15, 15 is a complete code with codes past LOOKUP_BITS.
        let mut lengths: Vec<u8> = (1..=15).collect();
        lengths.push(15);
        let table = HuffmanTable::from_lengths(&lengths).unwrap();

        // Symbol 11 has code 1111_1111_1110 (12 bits), sent MSB first.
        let mut pending = crate::bits::PendingBuffer::new();
        for bit in [1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 1, 0] {
            pending.write_bits(bit, 1);
        }
        pending.align_to_byte();
        let mut data = vec![0u8; pending.len()];
        pending.flush(&mut data);

        let mut reader = BitReader::new(&data[..]);
        assert_eq!(table.decode(&mut reader).unwrap(), 11);
    }

    #[test]
    fn test_streaming_small_reads() {
        let original: Vec<u8> = (0..150_000u32).map(|i| (i % 7 + i / 1000) as u8).collect();
        let compressed = deflate_zlib(&original, 6);
        let mut decoder = ZlibDecoder::new(&compressed[..]);
        let mut out = Vec::new();
        let mut buf = [0u8; 13];
        loop {
            let n = decoder.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert!(decoder.is_finished());
        assert_eq!(decoder.total_out(), original.len() as u64);
        assert_eq!(out, original);
    }

    #[test]
    fn test_inflate_max_distance_match() {
        let mut original = vec![b'x'; 32768 + 10];
        original[0] = b'a';
        original[32768] = b'a';
        let compressed = flate2_zlib(&original, 9);
        assert_eq!(inflate_zlib(&compressed).unwrap(), original);
    }
}
