//! LZ77 matching engine with a sliding window.
//!
//! The engine owns a 64 KiB window (two 32 KiB halves), a hash table of
//! 3-byte prefixes and per-position chain links. Depending on the level it
//! runs one of three strategies:
//! - **Stored**: no matching, raw blocks only
//! - **Fast**: greedy matching; short matches are fully inserted into the hash
//! - **Slow**: lazy matching, deferring each match by one byte to see if the
//!   next position yields a longer one
//!
//! Literals and matches are tallied into [`DeflaterHuffman`], which decides
//! when a block must be written.

use super::huffman::DeflaterHuffman;

/// Window half size; also the maximum back-reference distance.
pub const WSIZE: usize = 1 << 15;
const WMASK: usize = WSIZE - 1;

const HASH_BITS: usize = 15;
const HASH_SIZE: usize = 1 << HASH_BITS;
const HASH_MASK: usize = HASH_SIZE - 1;
const HASH_SHIFT: usize = (HASH_BITS + MIN_MATCH - 1) / MIN_MATCH;

/// Minimum match length worth encoding.
pub const MIN_MATCH: usize = 3;
/// Maximum match length (RFC 1951).
pub const MAX_MATCH: usize = 258;

const MIN_LOOKAHEAD: usize = MAX_MATCH + MIN_MATCH + 1;
/// Furthest distance searched, keeping `MIN_LOOKAHEAD` bytes of headroom.
pub const MAX_DIST: usize = WSIZE - MIN_LOOKAHEAD;

const PENDING_BUF_SIZE: usize = 1 << 16;
/// Largest stored block the engine emits in one go.
pub const MAX_BLOCK_SIZE: usize = if 65535 < PENDING_BUF_SIZE - 5 {
    65535
} else {
    PENDING_BUF_SIZE - 5
};

/// Length-3 matches further back than this are dropped by the lazy matcher.
const TOO_FAR: usize = 4096;

const GOOD_LENGTH: [usize; 10] = [0, 4, 4, 4, 4, 8, 8, 8, 32, 32];
const MAX_LAZY: [usize; 10] = [0, 4, 5, 6, 4, 16, 16, 32, 128, 258];
const NICE_LENGTH: [usize; 10] = [0, 8, 16, 32, 16, 32, 128, 128, 258, 258];
const MAX_CHAIN: [usize; 10] = [0, 4, 8, 32, 16, 32, 128, 256, 1024, 4096];
const COMPR_FUNC: [CompressionFunction; 10] = [
    CompressionFunction::Stored,
    CompressionFunction::Fast,
    CompressionFunction::Fast,
    CompressionFunction::Fast,
    CompressionFunction::Fast,
    CompressionFunction::Slow,
    CompressionFunction::Slow,
    CompressionFunction::Slow,
    CompressionFunction::Slow,
    CompressionFunction::Slow,
];

/// Match selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeflateStrategy {
    /// Normal matching.
    #[default]
    Default,
    /// Drop short matches; suits filtered image data.
    Filtered,
    /// Never search for matches; Huffman-code literals only.
    HuffmanOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompressionFunction {
    Stored,
    Fast,
    Slow,
}

/// Sliding-window matcher feeding a [`DeflaterHuffman`].
#[derive(Debug)]
pub struct DeflaterEngine {
    ins_h: usize,
    head: Vec<u16>,
    prev: Vec<u16>,
    match_start: usize,
    match_len: usize,
    prev_available: bool,
    block_start: isize,
    strstart: usize,
    lookahead: usize,
    window: Vec<u8>,
    strategy: DeflateStrategy,
    max_chain: usize,
    max_lazy: usize,
    nice_length: usize,
    good_length: usize,
    compression_function: CompressionFunction,
    input: Vec<u8>,
    input_off: usize,
    total_in: u64,
    huffman: DeflaterHuffman,
}

impl DeflaterEngine {
    /// Create an engine configured for `level` (clamped to 0-9).
    pub fn new(level: u8, strategy: DeflateStrategy) -> Self {
        let level = level.min(9) as usize;
        let mut engine = Self {
            ins_h: 0,
            head: vec![0; HASH_SIZE],
            prev: vec![0; WSIZE],
            match_start: 0,
            match_len: MIN_MATCH - 1,
            prev_available: false,
            block_start: 1,
            strstart: 1,
            lookahead: 0,
            window: vec![0; 2 * WSIZE],
            strategy,
            max_chain: MAX_CHAIN[level],
            max_lazy: MAX_LAZY[level],
            nice_length: NICE_LENGTH[level],
            good_length: GOOD_LENGTH[level],
            compression_function: COMPR_FUNC[level],
            input: Vec::new(),
            input_off: 0,
            total_in: 0,
            huffman: DeflaterHuffman::new(),
        };
        engine.reset();
        engine
    }

    /// Forget all history and buffered input.
    pub fn reset(&mut self) {
        self.huffman.reset();
        self.huffman.pending_mut().reset();
        self.block_start = 1;
        self.strstart = 1;
        self.lookahead = 0;
        self.total_in = 0;
        self.prev_available = false;
        self.match_len = MIN_MATCH - 1;
        self.match_start = 0;
        self.ins_h = 0;
        self.head.fill(0);
        self.prev.fill(0);
        self.input.clear();
        self.input_off = 0;
    }

    /// Queue `data` behind any input not yet moved into the window.
    pub fn set_input(&mut self, data: &[u8]) {
        self.input.drain(..self.input_off);
        self.input.extend_from_slice(data);
        self.input_off = 0;
    }

    /// Whether all queued input has been moved into the window.
    #[inline]
    pub fn needs_input(&self) -> bool {
        self.input_off == self.input.len()
    }

    /// Total bytes consumed from input.
    #[inline]
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Current match strategy.
    pub fn strategy(&self) -> DeflateStrategy {
        self.strategy
    }

    /// Change the match strategy.
    pub fn set_strategy(&mut self, strategy: DeflateStrategy) {
        self.strategy = strategy;
    }

    /// Block writer and pending output.
    #[inline]
    pub fn huffman(&self) -> &DeflaterHuffman {
        &self.huffman
    }

    /// Mutable block writer and pending output.
    #[inline]
    pub fn huffman_mut(&mut self) -> &mut DeflaterHuffman {
        &mut self.huffman
    }

    /// Switch level, flushing what the old strategy still holds.
    pub fn set_level(&mut self, level: u8) {
        let level = level.min(9) as usize;
        self.good_length = GOOD_LENGTH[level];
        self.max_lazy = MAX_LAZY[level];
        self.nice_length = NICE_LENGTH[level];
        self.max_chain = MAX_CHAIN[level];

        if COMPR_FUNC[level] == self.compression_function {
            return;
        }

        match self.compression_function {
            CompressionFunction::Stored => {
                self.flush_pending_stored();
                self.update_hash();
            }
            CompressionFunction::Fast => {
                if self.strstart as isize > self.block_start {
                    self.flush_block(self.pending_block_len(), false);
                    self.block_start = self.strstart as isize;
                }
            }
            CompressionFunction::Slow => {
                if self.prev_available {
                    self.huffman.tally_lit(self.window[self.strstart - 1]);
                }
                if self.strstart as isize > self.block_start {
                    self.flush_block(self.pending_block_len(), false);
                    self.block_start = self.strstart as isize;
                }
                self.prev_available = false;
                self.match_len = MIN_MATCH - 1;
            }
        }
        self.compression_function = COMPR_FUNC[level];
    }

    /// Compress as much as possible; returns `false` when more input (or a
    /// drained pending buffer) is needed to make progress.
    pub fn deflate(&mut self, flush: bool, finish: bool) -> bool {
        loop {
            self.fill_window();
            let can_flush = flush && self.input_off == self.input.len();
            let progress = match self.compression_function {
                CompressionFunction::Stored => self.deflate_stored(can_flush, finish),
                CompressionFunction::Fast => self.deflate_fast(can_flush, finish),
                CompressionFunction::Slow => self.deflate_slow(can_flush, finish),
            };
            if !(self.huffman.pending().is_flushed() && progress) {
                return progress;
            }
        }
    }

    fn fill_window(&mut self) {
        if self.strstart >= WSIZE + MAX_DIST {
            if self.compression_function == CompressionFunction::Stored
                && self.block_start < WSIZE as isize
            {
                // Stored bytes below WSIZE would be lost by the slide.
                self.flush_pending_stored();
            }
            self.slide_window();
        }

        if self.lookahead < MIN_LOOKAHEAD && self.input_off < self.input.len() {
            let more = (2 * WSIZE - self.lookahead - self.strstart)
                .min(self.input.len() - self.input_off);
            let dst = self.strstart + self.lookahead;
            self.window[dst..dst + more]
                .copy_from_slice(&self.input[self.input_off..self.input_off + more]);
            self.input_off += more;
            self.total_in += more as u64;
            self.lookahead += more;
        }

        if self.lookahead >= MIN_MATCH {
            self.update_hash();
        }
    }

    #[inline]
    fn update_hash(&mut self) {
        self.ins_h =
            ((self.window[self.strstart] as usize) << HASH_SHIFT) ^ self.window[self.strstart + 1] as usize;
    }

    /// Insert the string at `strstart` and return the previous head of its chain.
    #[inline]
    fn insert_string(&mut self) -> usize {
        let hash = ((self.ins_h << HASH_SHIFT) ^ self.window[self.strstart + MIN_MATCH - 1] as usize)
            & HASH_MASK;
        let head = self.head[hash];
        self.prev[self.strstart & WMASK] = head;
        self.head[hash] = self.strstart as u16;
        self.ins_h = hash;
        head as usize
    }

    fn slide_window(&mut self) {
        self.window.copy_within(WSIZE..2 * WSIZE, 0);
        self.match_start = self.match_start.saturating_sub(WSIZE);
        self.strstart -= WSIZE;
        self.block_start -= WSIZE as isize;

        for link in self.head.iter_mut().chain(self.prev.iter_mut()) {
            *link = if *link as usize >= WSIZE {
                *link - WSIZE as u16
            } else {
                0
            };
        }
    }

    /// Search the hash chain from `cur_match` for a match longer than the
    /// current `match_len`. Updates `match_start`/`match_len`.
    fn find_longest_match(&mut self, mut cur_match: usize) -> bool {
        let strstart = self.strstart;
        let scan_max = strstart + MAX_MATCH.min(self.lookahead) - 1;
        let limit = strstart.saturating_sub(MAX_DIST);
        let mut chain_length = self.max_chain;
        let nice_length = self.nice_length.min(self.lookahead);

        self.match_len = self.match_len.max(MIN_MATCH - 1);
        if strstart + self.match_len > scan_max {
            return false;
        }

        let window = &self.window;
        let mut scan_end1 = window[strstart + self.match_len - 1];
        let mut scan_end = window[strstart + self.match_len];

        if self.match_len >= self.good_length {
            chain_length >>= 1;
        }

        loop {
            let candidate = cur_match;
            if window[candidate + self.match_len] == scan_end
                && window[candidate + self.match_len - 1] == scan_end1
                && window[candidate] == window[strstart]
                && window[candidate + 1] == window[strstart + 1]
            {
                let end = match_end(window, strstart + 1, candidate + 1, scan_max);
                let len = end - strstart;
                if len > self.match_len {
                    self.match_start = candidate;
                    self.match_len = len;
                    if len >= nice_length {
                        break;
                    }
                    scan_end1 = window[end - 1];
                    scan_end = window[end];
                }
            }

            cur_match = self.prev[cur_match & WMASK] as usize;
            if cur_match <= limit {
                break;
            }
            chain_length -= 1;
            if chain_length == 0 {
                break;
            }
        }

        self.match_len >= MIN_MATCH
    }

    #[inline]
    fn pending_block_len(&self) -> usize {
        (self.strstart as isize - self.block_start) as usize
    }

    /// Flush `len` tallied bytes starting at `block_start`.
    fn flush_block(&mut self, len: usize, last_block: bool) {
        if self.block_start >= 0 {
            let start = self.block_start as usize;
            self.huffman
                .flush_block(Some(&self.window[start..start + len]), last_block);
        } else {
            self.huffman.flush_block(None, last_block);
        }
    }

    fn flush_pending_stored(&mut self) {
        if self.strstart as isize > self.block_start {
            let start = self.block_start as usize;
            self.huffman
                .flush_stored_block(&self.window[start..self.strstart], false);
            self.block_start = self.strstart as isize;
        }
    }

    fn deflate_stored(&mut self, flush: bool, finish: bool) -> bool {
        if !flush && self.lookahead == 0 {
            return false;
        }

        self.strstart += self.lookahead;
        self.lookahead = 0;

        let mut stored_len = self.pending_block_len();
        if stored_len >= MAX_BLOCK_SIZE
            || (self.block_start < WSIZE as isize && stored_len >= MAX_DIST)
            || flush
        {
            // Only the block that empties the input may be the final one.
            let mut last_block = finish && flush;
            if stored_len > MAX_BLOCK_SIZE {
                stored_len = MAX_BLOCK_SIZE;
                last_block = false;
            }

            let start = self.block_start as usize;
            self.huffman
                .flush_stored_block(&self.window[start..start + stored_len], last_block);
            self.block_start += stored_len as isize;
            return !(last_block || stored_len == 0);
        }

        true
    }

    fn deflate_fast(&mut self, flush: bool, finish: bool) -> bool {
        if self.lookahead < MIN_LOOKAHEAD && !flush {
            return false;
        }

        while self.lookahead >= MIN_LOOKAHEAD || flush {
            if self.lookahead == 0 {
                self.flush_block(self.pending_block_len(), finish);
                self.block_start = self.strstart as isize;
                return false;
            }

            if self.strstart > 2 * WSIZE - MIN_LOOKAHEAD {
                // Only reachable while flushing with an almost full window.
                self.slide_window();
            }

            let found = self.lookahead >= MIN_MATCH && {
                let hash_head = self.insert_string();
                hash_head != 0
                    && self.strategy != DeflateStrategy::HuffmanOnly
                    && self.strstart - hash_head <= MAX_DIST
                    && self.find_longest_match(hash_head)
            };

            if found {
                let full = self
                    .huffman
                    .tally_dist(self.strstart - self.match_start, self.match_len);

                self.lookahead -= self.match_len;
                if self.match_len <= self.max_lazy && self.lookahead >= MIN_MATCH {
                    self.match_len -= 1;
                    while self.match_len > 0 {
                        self.strstart += 1;
                        self.insert_string();
                        self.match_len -= 1;
                    }
                    self.strstart += 1;
                } else {
                    self.strstart += self.match_len;
                    if self.lookahead >= MIN_MATCH - 1 {
                        self.update_hash();
                    }
                }
                self.match_len = MIN_MATCH - 1;
                if !full {
                    continue;
                }
            } else {
                self.huffman.tally_lit(self.window[self.strstart]);
                self.strstart += 1;
                self.lookahead -= 1;
            }

            if self.huffman.is_full() {
                let last_block = finish && self.lookahead == 0;
                self.flush_block(self.pending_block_len(), last_block);
                self.block_start = self.strstart as isize;
                return !last_block;
            }
        }

        true
    }

    fn deflate_slow(&mut self, flush: bool, finish: bool) -> bool {
        if self.lookahead < MIN_LOOKAHEAD && !flush {
            return false;
        }

        while self.lookahead >= MIN_LOOKAHEAD || flush {
            if self.lookahead == 0 {
                if self.prev_available {
                    self.huffman.tally_lit(self.window[self.strstart - 1]);
                }
                self.prev_available = false;

                self.flush_block(self.pending_block_len(), finish);
                self.block_start = self.strstart as isize;
                return false;
            }

            if self.strstart >= 2 * WSIZE - MIN_LOOKAHEAD {
                self.slide_window();
            }

            let prev_match = self.match_start;
            let prev_len = self.match_len;
            if self.lookahead >= MIN_MATCH {
                let hash_head = self.insert_string();
                if self.strategy != DeflateStrategy::HuffmanOnly
                    && hash_head != 0
                    && self.strstart - hash_head <= MAX_DIST
                    && self.find_longest_match(hash_head)
                    && self.match_len <= 5
                    && (self.strategy == DeflateStrategy::Filtered
                        || (self.match_len == MIN_MATCH
                            && self.strstart - self.match_start > TOO_FAR))
                {
                    self.match_len = MIN_MATCH - 1;
                }
            }

            if prev_len >= MIN_MATCH && self.match_len <= prev_len {
                // The previous match was at least as good.
                self.huffman
                    .tally_dist(self.strstart - 1 - prev_match, prev_len);
                let mut remaining = prev_len - 2;
                loop {
                    self.strstart += 1;
                    self.lookahead -= 1;
                    if self.lookahead >= MIN_MATCH {
                        self.insert_string();
                    }
                    remaining -= 1;
                    if remaining == 0 {
                        break;
                    }
                }
                self.strstart += 1;
                self.lookahead -= 1;
                self.prev_available = false;
                self.match_len = MIN_MATCH - 1;
            } else {
                if self.prev_available {
                    self.huffman.tally_lit(self.window[self.strstart - 1]);
                }
                self.prev_available = true;
                self.strstart += 1;
                self.lookahead -= 1;
            }

            if self.huffman.is_full() {
                let mut len = self.pending_block_len();
                if self.prev_available {
                    len -= 1;
                }
                let last_block = finish && self.lookahead == 0 && !self.prev_available;
                self.flush_block(len, last_block);
                self.block_start += len as isize;
                return !last_block;
            }
        }

        true
    }
}

#[inline]
fn load_u64(bytes: &[u8], at: usize) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(word)
}

/// First position after `scan` where the runs at `scan` and `candidate`
/// differ, or `scan_max + 1` if they agree up to `scan_max`.
///
/// The unaligned remainder is compared first so the rest proceeds in
/// 8-byte strides that land exactly on `scan_max`.
fn match_end(window: &[u8], mut scan: usize, mut candidate: usize, scan_max: usize) -> usize {
    for _ in 0..(scan_max - scan) % 8 {
        scan += 1;
        candidate += 1;
        if window[scan] != window[candidate] {
            return scan;
        }
    }

    while scan < scan_max {
        let diff = load_u64(window, scan + 1) ^ load_u64(window, candidate + 1);
        if diff != 0 {
            return scan + 1 + (diff.trailing_zeros() / 8) as usize;
        }
        scan += 8;
        candidate += 8;
    }

    scan_max + 1
}
