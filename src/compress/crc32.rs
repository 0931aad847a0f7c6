//! CRC32 checksum implementation (PNG uses CRC-32/ISO-HDLC).

/// Slicing-by-8 tables for CRC32 polynomial 0xEDB88320 (reflected 0x04C11DB7).
static CRC_TABLES: [[u32; 256]; 8] = build_tables();

const fn build_tables() -> [[u32; 256]; 8] {
    let mut tables = [[0u32; 256]; 8];

    // Table 0: classic byte-at-a-time.
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut k = 0;
        while k < 8 {
            crc = if (crc & 1) != 0 {
                (crc >> 1) ^ 0xEDB88320
            } else {
                crc >> 1
            };
            k += 1;
        }
        tables[0][i] = crc;
        i += 1;
    }

    // Tables 1..7 derived from table 0.
    let mut t = 1;
    while t < 8 {
        let mut i = 0;
        while i < 256 {
            let prev = tables[t - 1][i];
            tables[t][i] = (prev >> 8) ^ tables[0][(prev & 0xFF) as usize];
            i += 1;
        }
        t += 1;
    }

    tables
}

#[inline]
fn update_crc(mut crc: u32, data: &[u8]) -> u32 {
    let tables = &CRC_TABLES;

    let mut chunks = data.chunks_exact(8);
    for chunk in &mut chunks {
        let low = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let high = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);

        crc ^= low;

        crc = tables[7][(crc & 0xFF) as usize]
            ^ tables[6][((crc >> 8) & 0xFF) as usize]
            ^ tables[5][((crc >> 16) & 0xFF) as usize]
            ^ tables[4][((crc >> 24) & 0xFF) as usize]
            ^ tables[3][(high & 0xFF) as usize]
            ^ tables[2][((high >> 8) & 0xFF) as usize]
            ^ tables[1][((high >> 16) & 0xFF) as usize]
            ^ tables[0][((high >> 24) & 0xFF) as usize];
    }

    for &b in chunks.remainder() {
        let idx = ((crc ^ b as u32) & 0xFF) as usize;
        crc = (crc >> 8) ^ tables[0][idx];
    }

    crc
}

/// Calculate CRC32 checksum of data.
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    update_crc(0xFFFF_FFFF, data) ^ 0xFFFF_FFFF
}

/// Calculate CRC32 incrementally, e.g. over a chunk type and then its data.
#[derive(Debug, Clone, Copy)]
pub struct Crc32 {
    crc: u32,
}

impl Crc32 {
    /// Create a new CRC32 calculator.
    pub const fn new() -> Self {
        Self { crc: 0xFFFF_FFFF }
    }

    /// Update the CRC with more data.
    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        self.crc = update_crc(self.crc, data);
    }

    /// Finalize and return the CRC value.
    #[inline]
    pub fn finalize(self) -> u32 {
        self.crc ^ 0xFFFF_FFFF
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc32_empty() {
        assert_eq!(crc32(&[]), 0x00000000);
    }

    #[test]
    fn test_crc32_check_value() {
        assert_eq!(crc32(b"123456789"), 0xCBF43926);
    }

    #[test]
    fn test_crc32_incremental() {
        let data = b"The quick brown fox jumps over the lazy dog";
        let mut crc = Crc32::new();
        crc.update(&data[..5]);
        crc.update(&data[5..19]);
        crc.update(&data[19..]);
        assert_eq!(crc.finalize(), crc32(data));
        assert_eq!(crc32(data), 0x414FA339);
    }

    #[test]
    fn test_crc32_png_iend() {
        // IEND carries no data, so its CRC covers only the type.
        assert_eq!(crc32(b"IEND"), 0xAE426082);
    }
}
