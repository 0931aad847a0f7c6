//! Huffman coding for the DEFLATE encoder.
//!
//! Symbols tallied by the LZ77 engine are buffered here until a block is
//! full. At flush time the literal/length, distance and bit-length trees are
//! built, and the block is written as stored, static or dynamic, whichever
//! is cheapest.

use crate::bits::PendingBuffer;

/// Maximum code length for literal/length and distance codes.
pub const MAX_CODE_LENGTH: usize = 15;
/// Maximum code length for the bit-length (code length) alphabet.
pub const MAX_BL_CODE_LENGTH: usize = 7;

/// Size of the literal/length alphabet actually used by the encoder.
pub const LITERAL_NUM: usize = 286;
/// Size of the distance alphabet.
pub const DIST_NUM: usize = 30;
/// Size of the code length alphabet.
pub const BITLEN_NUM: usize = 19;

/// End-of-block symbol.
pub const EOF_SYMBOL: usize = 256;

/// Symbols buffered before a block must be flushed.
const BUFFER_SIZE: usize = 1 << 14;

const STORED_BLOCK: u32 = 0;
const STATIC_TREES: u32 = 1;
const DYN_TREES: u32 = 2;

const REP_3_6: usize = 16;
const REP_3_10: usize = 17;
const REP_11_138: usize = 18;

/// Transmission order of the code length code lengths.
pub const BL_ORDER: [usize; BITLEN_NUM] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

const BIT4_REVERSE: [u16; 16] = [0, 8, 4, 12, 2, 10, 6, 14, 1, 9, 5, 13, 3, 11, 7, 15];

/// Reverse all 16 bits of `value`.
#[inline]
pub const fn bit_reverse(value: u16) -> u16 {
    (BIT4_REVERSE[(value & 0xF) as usize] << 12)
        | (BIT4_REVERSE[((value >> 4) & 0xF) as usize] << 8)
        | (BIT4_REVERSE[((value >> 8) & 0xF) as usize] << 4)
        | BIT4_REVERSE[(value >> 12) as usize]
}

const fn static_literal_table() -> ([u16; LITERAL_NUM], [u8; LITERAL_NUM]) {
    let mut codes = [0u16; LITERAL_NUM];
    let mut lengths = [0u8; LITERAL_NUM];
    let mut i = 0;
    while i < 144 {
        codes[i] = bit_reverse(((0x030 + i) << 8) as u16);
        lengths[i] = 8;
        i += 1;
    }
    while i < 256 {
        codes[i] = bit_reverse(((0x190 - 144 + i) << 7) as u16);
        lengths[i] = 9;
        i += 1;
    }
    while i < 280 {
        codes[i] = bit_reverse(((i - 256) << 9) as u16);
        lengths[i] = 7;
        i += 1;
    }
    while i < LITERAL_NUM {
        codes[i] = bit_reverse(((0x0c0 + i - 280) << 8) as u16);
        lengths[i] = 8;
        i += 1;
    }
    (codes, lengths)
}

const fn static_distance_table() -> ([u16; DIST_NUM], [u8; DIST_NUM]) {
    let mut codes = [0u16; DIST_NUM];
    let mut lengths = [0u8; DIST_NUM];
    let mut i = 0;
    while i < DIST_NUM {
        codes[i] = bit_reverse((i << 11) as u16);
        lengths[i] = 5;
        i += 1;
    }
    (codes, lengths)
}

const STATIC_LITERAL: ([u16; LITERAL_NUM], [u8; LITERAL_NUM]) = static_literal_table();
const STATIC_DISTANCE: ([u16; DIST_NUM], [u8; DIST_NUM]) = static_distance_table();

/// Bit-reversed fixed literal/length codes (RFC 1951 section 3.2.6).
pub static STATIC_LITERAL_CODES: [u16; LITERAL_NUM] = STATIC_LITERAL.0;
/// Fixed literal/length code lengths.
pub static STATIC_LITERAL_LENGTHS: [u8; LITERAL_NUM] = STATIC_LITERAL.1;
/// Bit-reversed fixed distance codes.
pub static STATIC_DISTANCE_CODES: [u16; DIST_NUM] = STATIC_DISTANCE.0;
/// Fixed distance code lengths.
pub static STATIC_DISTANCE_LENGTHS: [u8; DIST_NUM] = STATIC_DISTANCE.1;

/// Literal/length symbol for a match of `length - 3` (0..=255).
#[inline]
pub fn lcode(mut length: usize) -> usize {
    if length == 255 {
        return 285;
    }
    let mut code = 257;
    while length >= 8 {
        code += 4;
        length >>= 1;
    }
    code + length
}

/// Distance symbol for `distance - 1`.
#[inline]
pub fn dcode(mut distance: usize) -> usize {
    let mut code = 0;
    while distance >= 4 {
        code += 2;
        distance >>= 1;
    }
    code + distance
}

/// One Huffman tree: symbol frequencies in, code lengths and codes out.
#[derive(Debug)]
struct Tree {
    freqs: Vec<u32>,
    length: Vec<u8>,
    codes: Vec<u16>,
    min_num_codes: usize,
    num_codes: usize,
    bl_counts: Vec<i32>,
    max_length: usize,
}

impl Tree {
    fn new(elems: usize, min_codes: usize, max_length: usize) -> Self {
        Self {
            freqs: vec![0; elems],
            length: vec![0; elems],
            codes: vec![0; elems],
            min_num_codes: min_codes,
            num_codes: 0,
            bl_counts: vec![0; max_length],
            max_length,
        }
    }

    fn reset(&mut self) {
        self.freqs.fill(0);
        self.length.fill(0);
        self.codes.fill(0);
    }

    #[inline]
    fn write_symbol(&self, pending: &mut PendingBuffer, symbol: usize) {
        pending.write_bits(self.codes[symbol] as u32, self.length[symbol]);
    }

    fn set_static_codes(&mut self, codes: &[u16], lengths: &[u8]) {
        self.codes.copy_from_slice(codes);
        self.length.copy_from_slice(lengths);
    }

    /// Assign canonical codes from the computed lengths.
    fn build_codes(&mut self) {
        let mut next_code = [0u32; MAX_CODE_LENGTH];
        let mut code = 0u32;
        for bits in 0..self.max_length {
            next_code[bits] = code;
            code += (self.bl_counts[bits] as u32) << (15 - bits);
        }

        for i in 0..self.num_codes {
            let bits = self.length[i] as usize;
            if bits > 0 {
                self.codes[i] = bit_reverse(next_code[bits - 1] as u16);
                next_code[bits - 1] += 1 << (16 - bits);
            }
        }
    }

    /// Build the tree with an array-backed min-heap.
    ///
    /// Node values pack `freq << 8 | depth` so equal frequencies favour
    /// shallower subtrees.
    fn build_tree(&mut self) {
        let num_symbols = self.freqs.len();
        let mut heap = vec![0usize; num_symbols];
        let mut heap_len = 0;
        let mut max_code = 0;

        for n in 0..num_symbols {
            let freq = self.freqs[n];
            if freq != 0 {
                let mut pos = heap_len;
                heap_len += 1;
                while pos > 0 {
                    let ppos = (pos - 1) / 2;
                    if self.freqs[heap[ppos]] <= freq {
                        break;
                    }
                    heap[pos] = heap[ppos];
                    pos = ppos;
                }
                heap[pos] = n;
                max_code = n;
            }
        }

        // A valid tree needs at least two leaves.
        while heap_len < 2 {
            let node = if max_code < 2 {
                max_code += 1;
                max_code
            } else {
                0
            };
            heap[heap_len] = node;
            heap_len += 1;
        }

        self.num_codes = (max_code + 1).max(self.min_num_codes);

        let num_leafs = heap_len;
        let mut childs = vec![0i32; 4 * heap_len - 2];
        let mut values = vec![0u32; 2 * heap_len - 1];
        let mut num_nodes = num_leafs;
        for i in 0..heap_len {
            let node = heap[i];
            childs[2 * i] = node as i32;
            childs[2 * i + 1] = -1;
            values[i] = self.freqs[node] << 8;
            heap[i] = i;
        }

        loop {
            let first = heap[0];
            heap_len -= 1;
            let last = heap[heap_len];

            let ppos = sift_hole(&mut heap, heap_len, &values);
            let last_val = values[last];
            sift_up(&mut heap, ppos, last, last_val, &values);

            let second = heap[0];
            let node = num_nodes;
            num_nodes += 1;
            childs[2 * node] = first as i32;
            childs[2 * node + 1] = second as i32;
            let min_depth = (values[first] & 0xff).min(values[second] & 0xff);
            let node_val = values[first] + values[second] - min_depth + 1;
            values[node] = node_val;

            let ppos = sift_hole(&mut heap, heap_len, &values);
            sift_up(&mut heap, ppos, node, node_val, &values);

            if heap_len <= 1 {
                break;
            }
        }

        assert_eq!(
            heap[0],
            childs.len() / 2 - 1,
            "Huffman heap invariant violated"
        );

        self.build_length(&childs);
    }

    /// Derive code lengths from the tree, capping them at `max_length`.
    fn build_length(&mut self, childs: &[i32]) {
        self.length.fill(0);
        let num_nodes = childs.len() / 2;
        let num_leafs = num_nodes.div_ceil(2);
        let mut overflow = 0i32;

        self.bl_counts.fill(0);

        let mut lengths = vec![0usize; num_nodes];
        for i in (0..num_nodes).rev() {
            if childs[2 * i + 1] != -1 {
                let mut bit_length = lengths[i] + 1;
                if bit_length > self.max_length {
                    bit_length = self.max_length;
                    overflow += 1;
                }
                lengths[childs[2 * i] as usize] = bit_length;
                lengths[childs[2 * i + 1] as usize] = bit_length;
            } else {
                let bit_length = lengths[i];
                self.bl_counts[bit_length - 1] += 1;
                self.length[childs[2 * i] as usize] = bit_length as u8;
            }
        }

        if overflow == 0 {
            return;
        }

        let max_length = self.max_length;
        let mut incr_bit_len = max_length - 1;
        loop {
            // First bit length that can grow.
            loop {
                incr_bit_len -= 1;
                if self.bl_counts[incr_bit_len] != 0 {
                    break;
                }
            }
            // Push one node down a level and retire the overflow it covers.
            loop {
                self.bl_counts[incr_bit_len] -= 1;
                incr_bit_len += 1;
                self.bl_counts[incr_bit_len] += 1;
                overflow -= 1 << (max_length - 1 - incr_bit_len);
                if !(overflow > 0 && incr_bit_len < max_length - 1) {
                    break;
                }
            }
            if overflow <= 0 {
                break;
            }
        }

        // Undo any overshoot.
        self.bl_counts[max_length - 1] += overflow;
        self.bl_counts[max_length - 2] -= overflow;

        // Reassign lengths to leaves in increasing frequency order.
        let mut node_ptr = 2 * num_leafs;
        for bits in (1..=max_length).rev() {
            let mut n = self.bl_counts[bits - 1];
            while n > 0 {
                let child_ptr = 2 * childs[node_ptr] as usize;
                node_ptr += 1;
                if childs[child_ptr + 1] == -1 {
                    self.length[childs[child_ptr] as usize] = bits as u8;
                    n -= 1;
                }
            }
        }
    }

    fn encoded_length(&self) -> u32 {
        self.freqs
            .iter()
            .zip(&self.length)
            .map(|(&freq, &len)| freq * len as u32)
            .sum()
    }

    /// Count the bit-length symbols needed to transmit this tree.
    fn calc_bl_freq(&self, bl_tree: &mut Tree) {
        let mut curlen: i32 = -1;
        let mut i = 0;
        while i < self.num_codes {
            let mut count = 1;
            let nextlen = self.length[i] as i32;
            let max_count = if nextlen == 0 { 138 } else { 6 };
            let min_count = 3;
            if nextlen != 0 && curlen != nextlen {
                bl_tree.freqs[nextlen as usize] += 1;
                count = 0;
            }
            curlen = nextlen;
            i += 1;

            while i < self.num_codes && curlen == self.length[i] as i32 {
                i += 1;
                count += 1;
                if count >= max_count {
                    break;
                }
            }

            if count < min_count {
                bl_tree.freqs[curlen as usize] += count;
            } else if curlen != 0 {
                bl_tree.freqs[REP_3_6] += 1;
            } else if count <= 10 {
                bl_tree.freqs[REP_3_10] += 1;
            } else {
                bl_tree.freqs[REP_11_138] += 1;
            }
        }
    }

    /// Emit this tree's code lengths using `bl_tree`.
    fn write_tree(&self, pending: &mut PendingBuffer, bl_tree: &Tree) {
        let mut curlen: i32 = -1;
        let mut i = 0;
        while i < self.num_codes {
            let mut count = 1;
            let nextlen = self.length[i] as i32;
            let max_count = if nextlen == 0 { 138 } else { 6 };
            let min_count = 3;
            if nextlen != 0 && curlen != nextlen {
                bl_tree.write_symbol(pending, nextlen as usize);
                count = 0;
            }
            curlen = nextlen;
            i += 1;

            while i < self.num_codes && curlen == self.length[i] as i32 {
                i += 1;
                count += 1;
                if count >= max_count {
                    break;
                }
            }

            if count < min_count {
                for _ in 0..count {
                    bl_tree.write_symbol(pending, curlen as usize);
                }
            } else if curlen != 0 {
                bl_tree.write_symbol(pending, REP_3_6);
                pending.write_bits(count - 3, 2);
            } else if count <= 10 {
                bl_tree.write_symbol(pending, REP_3_10);
                pending.write_bits(count - 3, 3);
            } else {
                bl_tree.write_symbol(pending, REP_11_138);
                pending.write_bits(count - 11, 7);
            }
        }
    }
}

/// Move the hole at the heap root down to a leaf, always following the
/// smaller child. Returns the final hole position.
fn sift_hole(heap: &mut [usize], heap_len: usize, values: &[u32]) -> usize {
    let mut ppos = 0;
    let mut path = 1;
    while path < heap_len {
        if path + 1 < heap_len && values[heap[path]] > values[heap[path + 1]] {
            path += 1;
        }
        heap[ppos] = heap[path];
        ppos = path;
        path = path * 2 + 1;
    }
    ppos
}

/// Insert `node` at hole `pos`, bubbling it up while its parent is larger.
fn sift_up(heap: &mut [usize], mut pos: usize, node: usize, value: u32, values: &[u32]) {
    while pos > 0 {
        let parent = (pos - 1) / 2;
        if values[heap[parent]] <= value {
            break;
        }
        heap[pos] = heap[parent];
        pos = parent;
    }
    heap[pos] = node;
}

/// Symbol buffer and block writer of the DEFLATE encoder.
#[derive(Debug)]
pub struct DeflaterHuffman {
    pending: PendingBuffer,
    literal_tree: Tree,
    dist_tree: Tree,
    bl_tree: Tree,
    d_buf: Vec<u16>,
    l_buf: Vec<u8>,
    last_lit: usize,
    extra_bits: u32,
}

impl Default for DeflaterHuffman {
    fn default() -> Self {
        Self::new()
    }
}

impl DeflaterHuffman {
    /// Create an empty encoder with its own pending buffer.
    pub fn new() -> Self {
        Self {
            pending: PendingBuffer::new(),
            literal_tree: Tree::new(LITERAL_NUM, 257, MAX_CODE_LENGTH),
            dist_tree: Tree::new(DIST_NUM, 1, MAX_CODE_LENGTH),
            bl_tree: Tree::new(BITLEN_NUM, 4, MAX_BL_CODE_LENGTH),
            d_buf: vec![0; BUFFER_SIZE],
            l_buf: vec![0; BUFFER_SIZE],
            last_lit: 0,
            extra_bits: 0,
        }
    }

    /// Drop buffered symbols and tree statistics.
    pub fn reset(&mut self) {
        self.last_lit = 0;
        self.extra_bits = 0;
        self.literal_tree.reset();
        self.dist_tree.reset();
        self.bl_tree.reset();
    }

    /// Compressed output waiting to be drained.
    #[inline]
    pub fn pending(&self) -> &PendingBuffer {
        &self.pending
    }

    /// Mutable access to the pending output.
    #[inline]
    pub fn pending_mut(&mut self) -> &mut PendingBuffer {
        &mut self.pending
    }

    fn send_all_trees(&mut self, bl_tree_codes: usize) {
        self.bl_tree.build_codes();
        self.literal_tree.build_codes();
        self.dist_tree.build_codes();

        let pending = &mut self.pending;
        pending.write_bits((self.literal_tree.num_codes - 257) as u32, 5);
        pending.write_bits((self.dist_tree.num_codes - 1) as u32, 5);
        pending.write_bits((bl_tree_codes - 4) as u32, 4);
        for &symbol in BL_ORDER.iter().take(bl_tree_codes) {
            pending.write_bits(self.bl_tree.length[symbol] as u32, 3);
        }
        self.literal_tree.write_tree(pending, &self.bl_tree);
        self.dist_tree.write_tree(pending, &self.bl_tree);
    }

    fn compress_block(&mut self) {
        let pending = &mut self.pending;
        for i in 0..self.last_lit {
            let litlen = self.l_buf[i] as usize;
            let dist = self.d_buf[i] as usize;
            if dist != 0 {
                let dist = dist - 1;
                let lc = lcode(litlen);
                self.literal_tree.write_symbol(pending, lc);

                let bits = (lc as i32 - 261) / 4;
                if bits > 0 && bits <= 5 {
                    pending.write_bits((litlen & ((1 << bits) - 1)) as u32, bits as u8);
                }

                let dc = dcode(dist);
                self.dist_tree.write_symbol(pending, dc);

                let bits = dc as i32 / 2 - 1;
                if bits > 0 {
                    pending.write_bits((dist & ((1 << bits) - 1)) as u32, bits as u8);
                }
            } else {
                self.literal_tree.write_symbol(pending, litlen);
            }
        }
        self.literal_tree.write_symbol(pending, EOF_SYMBOL);
    }

    /// Write `stored` as one or more uncompressed blocks.
    pub fn flush_stored_block(&mut self, stored: &[u8], last_block: bool) {
        let mut rest = stored;
        loop {
            let (block, tail) = rest.split_at(rest.len().min(u16::MAX as usize));
            let is_last = last_block && tail.is_empty();
            self.pending
                .write_bits((STORED_BLOCK << 1) | is_last as u32, 3);
            self.pending.align_to_byte();
            self.pending.write_short(block.len() as u16);
            self.pending.write_short(!(block.len() as u16));
            self.pending.write_block(block);
            rest = tail;
            if rest.is_empty() {
                break;
            }
        }
        self.reset();
    }

    /// Write the buffered symbols as a block.
    ///
    /// `stored` holds the raw bytes the symbols cover when they are still in
    /// the window, allowing a stored block if that is smaller.
    pub fn flush_block(&mut self, stored: Option<&[u8]>, last_block: bool) {
        self.literal_tree.freqs[EOF_SYMBOL] += 1;

        self.literal_tree.build_tree();
        self.dist_tree.build_tree();

        self.literal_tree.calc_bl_freq(&mut self.bl_tree);
        self.dist_tree.calc_bl_freq(&mut self.bl_tree);

        self.bl_tree.build_tree();

        let mut bl_tree_codes = 4;
        for i in (bl_tree_codes + 1..BITLEN_NUM).rev() {
            if self.bl_tree.length[BL_ORDER[i]] > 0 {
                bl_tree_codes = i + 1;
                break;
            }
        }

        let mut opt_len = 14
            + bl_tree_codes as u32 * 3
            + self.bl_tree.encoded_length()
            + self.literal_tree.encoded_length()
            + self.dist_tree.encoded_length()
            + self.extra_bits;

        let static_len = self.extra_bits
            + self
                .literal_tree
                .freqs
                .iter()
                .zip(STATIC_LITERAL_LENGTHS.iter())
                .map(|(&freq, &len)| freq * len as u32)
                .sum::<u32>()
            + self
                .dist_tree
                .freqs
                .iter()
                .zip(STATIC_DISTANCE_LENGTHS.iter())
                .map(|(&freq, &len)| freq * len as u32)
                .sum::<u32>();

        if opt_len >= static_len {
            opt_len = static_len;
        }

        match stored {
            Some(raw) if raw.len() as u32 + 4 < opt_len >> 3 => {
                log::debug!("deflate block: stored, {} bytes", raw.len());
                self.flush_stored_block(raw, last_block);
            }
            _ if opt_len == static_len => {
                log::debug!("deflate block: static, {} symbols", self.last_lit);
                self.pending
                    .write_bits((STATIC_TREES << 1) | last_block as u32, 3);
                self.literal_tree
                    .set_static_codes(&STATIC_LITERAL_CODES, &STATIC_LITERAL_LENGTHS);
                self.dist_tree
                    .set_static_codes(&STATIC_DISTANCE_CODES, &STATIC_DISTANCE_LENGTHS);
                self.compress_block();
                self.reset();
            }
            _ => {
                log::debug!(
                    "deflate block: dynamic, {} symbols, {} bits",
                    self.last_lit,
                    opt_len
                );
                self.pending
                    .write_bits((DYN_TREES << 1) | last_block as u32, 3);
                self.send_all_trees(bl_tree_codes);
                self.compress_block();
                self.reset();
            }
        }
    }

    /// Whether the symbol buffer is full.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.last_lit >= BUFFER_SIZE
    }

    /// Record a literal byte; returns `true` when the buffer is full.
    #[inline]
    pub fn tally_lit(&mut self, literal: u8) -> bool {
        self.d_buf[self.last_lit] = 0;
        self.l_buf[self.last_lit] = literal;
        self.last_lit += 1;
        self.literal_tree.freqs[literal as usize] += 1;
        self.is_full()
    }

    /// Record a back-reference; returns `true` when the buffer is full.
    pub fn tally_dist(&mut self, distance: usize, length: usize) -> bool {
        debug_assert!((3..=258).contains(&length));
        debug_assert!((1..=32768).contains(&distance));

        self.d_buf[self.last_lit] = distance as u16;
        self.l_buf[self.last_lit] = (length - 3) as u8;
        self.last_lit += 1;

        let lc = lcode(length - 3);
        self.literal_tree.freqs[lc] += 1;
        if (265..285).contains(&lc) {
            self.extra_bits += (lc as u32 - 261) / 4;
        }

        let dc = dcode(distance - 1);
        self.dist_tree.freqs[dc] += 1;
        if dc >= 4 {
            self.extra_bits += dc as u32 / 2 - 1;
        }

        self.is_full()
    }
}
