//! PNG scanline filtering.
//!
//! PNG uses filtering to improve compression by exploiting correlations
//! between adjacent pixels. Every filter works byte-wise with a look-back
//! distance of `bpp` bytes (at least 1, also for sub-byte depths).

use super::FilterStrategy;
use crate::error::{Error, Result};
use crate::memory::{AllocationOptions, MemoryAllocator, PooledBuffer};

/// Filter type byte that prefixes every scanline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FilterType {
    /// Raw bytes.
    None = 0,
    /// Difference from the byte `bpp` to the left.
    Sub = 1,
    /// Difference from the byte above.
    Up = 2,
    /// Difference from the floor average of left and above.
    Average = 3,
    /// Difference from the Paeth predictor.
    Paeth = 4,
}

impl TryFrom<u8> for FilterType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(FilterType::None),
            1 => Ok(FilterType::Sub),
            2 => Ok(FilterType::Up),
            3 => Ok(FilterType::Average),
            4 => Ok(FilterType::Paeth),
            other => Err(Error::InvalidFilterType(other)),
        }
    }
}

/// Paeth predictor function.
///
/// Selects the value (a, b, or c) closest to p = a + b - c, preferring
/// `a` then `b` on ties.
#[inline]
pub fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
    let a_i = a as i16;
    let b_i = b as i16;
    let c_i = c as i16;

    let p = a_i + b_i - c_i;
    let pa = (p - a_i).abs();
    let pb = (p - b_i).abs();
    let pc = (p - c_i).abs();

    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

#[inline]
fn score(byte: u8) -> u64 {
    (byte as i8).unsigned_abs() as u64
}

/// Score a row using the sum of absolute signed byte values.
///
/// Lower scores typically result in better compression.
#[inline]
pub fn score_filter(filtered: &[u8]) -> u64 {
    filtered.iter().map(|&b| score(b)).sum()
}

/// Sub filter into `out`; returns the row score.
pub fn encode_sub(row: &[u8], bpp: usize, out: &mut [u8]) -> u64 {
    let mut sum = 0;
    for i in 0..row.len() {
        let left = if i >= bpp { row[i - bpp] } else { 0 };
        out[i] = row[i].wrapping_sub(left);
        sum += score(out[i]);
    }
    sum
}

/// Up filter into `out`; returns the row score.
pub fn encode_up(row: &[u8], prev: &[u8], out: &mut [u8]) -> u64 {
    let mut sum = 0;
    for ((o, &byte), &above) in out.iter_mut().zip(row).zip(prev) {
        *o = byte.wrapping_sub(above);
        sum += score(*o);
    }
    sum
}

/// Average filter into `out`; returns the row score.
pub fn encode_average(row: &[u8], prev: &[u8], bpp: usize, out: &mut [u8]) -> u64 {
    let mut sum = 0;
    for i in 0..row.len() {
        let left = if i >= bpp { row[i - bpp] as u16 } else { 0 };
        let avg = ((left + prev[i] as u16) / 2) as u8;
        out[i] = row[i].wrapping_sub(avg);
        sum += score(out[i]);
    }
    sum
}

/// Paeth filter into `out`; returns the row score.
pub fn encode_paeth(row: &[u8], prev: &[u8], bpp: usize, out: &mut [u8]) -> u64 {
    let mut sum = 0;
    for i in 0..row.len() {
        let (left, upper_left) = if i >= bpp {
            (row[i - bpp], prev[i - bpp])
        } else {
            (0, 0)
        };
        out[i] = row[i].wrapping_sub(paeth_predictor(left, prev[i], upper_left));
        sum += score(out[i]);
    }
    sum
}

/// Apply `filter` to `row` into `out`; returns the row score.
pub fn encode_filter(filter: FilterType, row: &[u8], prev: &[u8], bpp: usize, out: &mut [u8]) -> u64 {
    match filter {
        FilterType::None => {
            out[..row.len()].copy_from_slice(row);
            score_filter(row)
        }
        FilterType::Sub => encode_sub(row, bpp, out),
        FilterType::Up => encode_up(row, prev, out),
        FilterType::Average => encode_average(row, prev, bpp, out),
        FilterType::Paeth => encode_paeth(row, prev, bpp, out),
    }
}

/// Reverse the Sub filter in place.
pub fn decode_sub(row: &mut [u8], bpp: usize) {
    for i in bpp..row.len() {
        row[i] = row[i].wrapping_add(row[i - bpp]);
    }
}

/// Reverse the Up filter in place.
pub fn decode_up(row: &mut [u8], prev: &[u8]) {
    for (byte, &above) in row.iter_mut().zip(prev) {
        *byte = byte.wrapping_add(above);
    }
}

/// Reverse the Average filter in place.
pub fn decode_average(row: &mut [u8], prev: &[u8], bpp: usize) {
    for i in 0..row.len() {
        let left = if i >= bpp { row[i - bpp] as u16 } else { 0 };
        row[i] = row[i].wrapping_add(((left + prev[i] as u16) / 2) as u8);
    }
}

/// Reverse the Paeth filter in place.
pub fn decode_paeth(row: &mut [u8], prev: &[u8], bpp: usize) {
    // The first pixel has no left or upper-left neighbour, so Paeth
    // degenerates to Up.
    let head = bpp.min(row.len());
    decode_up(&mut row[..head], &prev[..head]);
    for i in head..row.len() {
        let predicted = paeth_predictor(row[i - bpp], prev[i], prev[i - bpp]);
        row[i] = row[i].wrapping_add(predicted);
    }
}

/// Reconstruct a filtered scanline in place given the previous
/// reconstructed scanline (all zeros for the first row of a pass).
pub fn unfilter_row(filter: FilterType, row: &mut [u8], prev: &[u8], bpp: usize) {
    match filter {
        FilterType::None => {}
        FilterType::Sub => decode_sub(row, bpp),
        FilterType::Up => decode_up(row, prev),
        FilterType::Average => decode_average(row, prev, bpp),
        FilterType::Paeth => decode_paeth(row, prev, bpp),
    }
}

/// Encoder-side scanline filter with pooled result buffers.
pub struct RowFilter {
    strategy: FilterStrategy,
    bpp: usize,
    sub: PooledBuffer,
    up: PooledBuffer,
    avg: PooledBuffer,
    paeth: PooledBuffer,
}

impl RowFilter {
    /// Create a filter for rows of up to `row_len` bytes.
    pub fn new(
        allocator: &MemoryAllocator,
        strategy: FilterStrategy,
        bpp: usize,
        row_len: usize,
    ) -> Self {
        let buffer = || allocator.allocate(row_len, AllocationOptions::None);
        Self {
            strategy,
            bpp: bpp.max(1),
            sub: buffer(),
            up: buffer(),
            avg: buffer(),
            paeth: buffer(),
        }
    }

    /// Filter `row` against `prev`, returning the chosen type and bytes.
    pub fn filter<'a>(&'a mut self, row: &'a [u8], prev: &[u8]) -> (FilterType, &'a [u8]) {
        let len = row.len();
        debug_assert!(len <= self.sub.len() && prev.len() >= len);
        let bpp = self.bpp;

        match self.strategy {
            FilterStrategy::None => (FilterType::None, row),
            FilterStrategy::Sub => {
                encode_sub(row, bpp, &mut self.sub);
                (FilterType::Sub, &self.sub[..len])
            }
            FilterStrategy::Up => {
                encode_up(row, prev, &mut self.up);
                (FilterType::Up, &self.up[..len])
            }
            FilterStrategy::Average => {
                encode_average(row, prev, bpp, &mut self.avg);
                (FilterType::Average, &self.avg[..len])
            }
            FilterStrategy::Paeth => {
                encode_paeth(row, prev, bpp, &mut self.paeth);
                (FilterType::Paeth, &self.paeth[..len])
            }
            FilterStrategy::Adaptive => self.adaptive(row, prev),
        }
    }

    /// Try every filter and keep the lowest score. Candidates are tried in
    /// the order None, Up, Paeth, Sub, Average and a later one must be
    /// strictly better to win.
    fn adaptive<'a>(&'a mut self, row: &'a [u8], prev: &[u8]) -> (FilterType, &'a [u8]) {
        let len = row.len();
        let bpp = self.bpp;

        let mut best = FilterType::None;
        let mut best_score = score_filter(row);
        if best_score == 0 {
            return (FilterType::None, row);
        }

        let candidates = [
            FilterType::Up,
            FilterType::Paeth,
            FilterType::Sub,
            FilterType::Average,
        ];
        for candidate in candidates {
            let out = match candidate {
                FilterType::Up => &mut self.up,
                FilterType::Paeth => &mut self.paeth,
                FilterType::Sub => &mut self.sub,
                _ => &mut self.avg,
            };
            let score = encode_filter(candidate, row, prev, bpp, out);
            if score < best_score {
                best = candidate;
                best_score = score;
            }
        }

        match best {
            FilterType::None => (best, row),
            FilterType::Up => (best, &self.up[..len]),
            FilterType::Paeth => (best, &self.paeth[..len]),
            FilterType::Sub => (best, &self.sub[..len]),
            FilterType::Average => (best, &self.avg[..len]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filtered(filter: FilterType, row: &[u8], prev: &[u8], bpp: usize) -> Vec<u8> {
        let mut out = vec![0u8; row.len()];
        encode_filter(filter, row, prev, bpp, &mut out);
        out
    }

    #[test]
    fn test_paeth_predictor() {
        assert_eq!(paeth_predictor(100, 100, 100), 100);
        assert_eq!(paeth_predictor(0, 0, 0), 0);
        // p = 15, pa = 5, pb = 5, pc = 0
        assert_eq!(paeth_predictor(10, 20, 15), 15);
        // Ties prefer left, then above.
        assert_eq!(paeth_predictor(10, 10, 0), 10);
        assert_eq!(paeth_predictor(0, 15, 5), 15);
        assert_eq!(paeth_predictor(5, 9, 9), 5);
    }

    #[test]
    fn test_filter_type_from_byte() {
        assert_eq!(FilterType::try_from(4).unwrap(), FilterType::Paeth);
        assert!(matches!(
            FilterType::try_from(5),
            Err(Error::InvalidFilterType(5))
        ));
    }

    #[test]
    fn test_filter_sub() {
        let out = filtered(FilterType::Sub, &[10, 20, 30, 40, 50, 60], &[0; 6], 3);
        assert_eq!(out, vec![10, 20, 30, 30, 30, 30]);
    }

    #[test]
    fn test_filter_up() {
        let out = filtered(FilterType::Up, &[50, 60, 70], &[10, 20, 30], 1);
        assert_eq!(out, vec![40, 40, 40]);
    }

    #[test]
    fn test_average_floors() {
        // left = 0, above = 3 -> 1; left = 5, above = 2 -> 3
        let out = filtered(FilterType::Average, &[5, 9], &[3, 2], 1);
        assert_eq!(out, vec![4, 6]);
        let mut row = out.clone();
        decode_average(&mut row, &[3, 2], 1);
        assert_eq!(row, vec![5, 9]);
    }

    #[test]
    fn test_score_is_signed_magnitude() {
        assert_eq!(score_filter(&[0, 1, 255, 128, 127]), 1 + 1 + 128 + 127);
    }

    #[test]
    fn test_unfilter_inverts_every_filter() {
        let prev: Vec<u8> = (0..24).map(|i| (i * 37 % 256) as u8).collect();
        let row: Vec<u8> = (0..24).map(|i| (255 - i * 11 % 256) as u8).collect();
        for bpp in [1, 2, 3, 4, 6, 8] {
            for filter in [
                FilterType::None,
                FilterType::Sub,
                FilterType::Up,
                FilterType::Average,
                FilterType::Paeth,
            ] {
                let mut data = filtered(filter, &row, &prev, bpp);
                unfilter_row(filter, &mut data, &prev, bpp);
                assert_eq!(data, row, "{filter:?} bpp={bpp}");
            }
        }
    }

    #[test]
    fn test_row_filter_fixed_strategy() {
        let allocator = MemoryAllocator::new();
        let mut filter = RowFilter::new(&allocator, FilterStrategy::Up, 3, 6);
        let (kind, bytes) = filter.filter(&[5, 5, 5, 9, 9, 9], &[1, 1, 1, 1, 1, 1]);
        assert_eq!(kind, FilterType::Up);
        assert_eq!(bytes, &[4, 4, 4, 8, 8, 8]);
    }

    #[test]
    fn test_adaptive_prefers_none_on_zero_row() {
        let allocator = MemoryAllocator::new();
        let mut filter = RowFilter::new(&allocator, FilterStrategy::Adaptive, 1, 4);
        let (kind, bytes) = filter.filter(&[0, 0, 0, 0], &[9, 9, 9, 9]);
        assert_eq!(kind, FilterType::None);
        assert_eq!(bytes, &[0, 0, 0, 0]);
    }

    #[test]
    fn test_adaptive_tie_keeps_earlier_candidate() {
        let allocator = MemoryAllocator::new();
        let mut filter = RowFilter::new(&allocator, FilterStrategy::Adaptive, 1, 4);
        // With a zero previous row Up equals None and Paeth equals Sub;
        // a constant row makes Sub strictly best.
        let (kind, bytes) = filter.filter(&[7, 7, 7, 7], &[0, 0, 0, 0]);
        assert_eq!(kind, FilterType::Paeth);
        assert_eq!(bytes, &[7, 0, 0, 0]);
    }

    #[test]
    fn test_adaptive_picks_up_for_repeated_rows() {
        let allocator = MemoryAllocator::new();
        let mut filter = RowFilter::new(&allocator, FilterStrategy::Adaptive, 1, 5);
        let row = [3, 90, 17, 200, 45];
        let (kind, bytes) = filter.filter(&row, &row);
        assert_eq!(kind, FilterType::Up);
        assert_eq!(bytes, &[0, 0, 0, 0, 0]);
    }
}
