//! Adam7 interlacing geometry.
//!
//! Seven passes visit the image on progressively finer grids. Each pass is
//! a reduced image of its own, filtered and compressed like a normal one.

/// One Adam7 pass: the grid origin and spacing in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adam7Pass {
    /// First column.
    pub x_start: u32,
    /// First row.
    pub y_start: u32,
    /// Column spacing.
    pub x_step: u32,
    /// Row spacing.
    pub y_step: u32,
}

/// The seven passes in transmission order.
pub const ADAM7_PASSES: [Adam7Pass; 7] = [
    Adam7Pass { x_start: 0, y_start: 0, x_step: 8, y_step: 8 },
    Adam7Pass { x_start: 4, y_start: 0, x_step: 8, y_step: 8 },
    Adam7Pass { x_start: 0, y_start: 4, x_step: 4, y_step: 8 },
    Adam7Pass { x_start: 2, y_start: 0, x_step: 4, y_step: 4 },
    Adam7Pass { x_start: 0, y_start: 2, x_step: 2, y_step: 4 },
    Adam7Pass { x_start: 1, y_start: 0, x_step: 2, y_step: 2 },
    Adam7Pass { x_start: 0, y_start: 1, x_step: 1, y_step: 2 },
];

impl Adam7Pass {
    /// Columns this pass covers in an image `width` pixels wide.
    #[inline]
    pub fn width(&self, width: u32) -> u32 {
        if width <= self.x_start {
            0
        } else {
            (width - self.x_start).div_ceil(self.x_step)
        }
    }

    /// Rows this pass covers in an image `height` pixels high.
    #[inline]
    pub fn height(&self, height: u32) -> u32 {
        if height <= self.y_start {
            0
        } else {
            (height - self.y_start).div_ceil(self.y_step)
        }
    }

    /// Whether the pass contributes no pixels (and therefore no scanlines).
    #[inline]
    pub fn is_empty(&self, width: u32, height: u32) -> bool {
        self.width(width) == 0 || self.height(height) == 0
    }

    /// Image row of the pass's `row`-th scanline.
    #[inline]
    pub fn image_y(&self, row: u32) -> u32 {
        self.y_start + row * self.y_step
    }

    /// Image column of the pass's `col`-th pixel.
    #[inline]
    pub fn image_x(&self, col: u32) -> u32 {
        self.x_start + col * self.x_step
    }
}

/// Copy the pixels of one reduced scanline into their places in a full
/// image row. `pixel_bytes` is the unpacked size of one pixel.
pub fn scatter_row(pass: &Adam7Pass, reduced: &[u8], dest_row: &mut [u8], pixel_bytes: usize) {
    for (col, pixel) in reduced.chunks_exact(pixel_bytes).enumerate() {
        let x = pass.image_x(col as u32) as usize * pixel_bytes;
        dest_row[x..x + pixel_bytes].copy_from_slice(pixel);
    }
}

/// Gather the pixels a pass takes from a full image row into `reduced`.
pub fn gather_row(pass: &Adam7Pass, src_row: &[u8], reduced: &mut [u8], pixel_bytes: usize) {
    for (col, pixel) in reduced.chunks_exact_mut(pixel_bytes).enumerate() {
        let x = pass.image_x(col as u32) as usize * pixel_bytes;
        pixel.copy_from_slice(&src_row[x..x + pixel_bytes]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_sizes_8x8() {
        let sizes: Vec<(u32, u32)> = ADAM7_PASSES
            .iter()
            .map(|p| (p.width(8), p.height(8)))
            .collect();
        assert_eq!(
            sizes,
            vec![(1, 1), (1, 1), (2, 1), (2, 2), (4, 2), (4, 4), (8, 4)]
        );
    }

    #[test]
    fn test_tiny_images_have_empty_passes() {
        let nonempty: Vec<usize> = (0..7)
            .filter(|&i| !ADAM7_PASSES[i].is_empty(1, 1))
            .collect();
        assert_eq!(nonempty, vec![0]);

        let nonempty: Vec<usize> = (0..7)
            .filter(|&i| !ADAM7_PASSES[i].is_empty(2, 1))
            .collect();
        assert_eq!(nonempty, vec![0, 5]);
    }

    #[test]
    fn test_every_pixel_visited_once() {
        for (w, h) in [(1, 1), (3, 5), (8, 8), (9, 17), (33, 2)] {
            let mut seen = vec![0u8; (w * h) as usize];
            for pass in &ADAM7_PASSES {
                for row in 0..pass.height(h) {
                    for col in 0..pass.width(w) {
                        let (x, y) = (pass.image_x(col), pass.image_y(row));
                        assert!(x < w && y < h);
                        seen[(y * w + x) as usize] += 1;
                    }
                }
            }
            assert!(seen.iter().all(|&n| n == 1), "{w}x{h}");
        }
    }

    #[test]
    fn test_scatter_gather() {
        let pass = ADAM7_PASSES[5];
        let full = [0u8, 1, 2, 3, 4, 5, 6, 7, 8, 9];
        let mut reduced = vec![0u8; pass.width(5) as usize * 2];
        gather_row(&pass, &full, &mut reduced, 2);
        assert_eq!(reduced, vec![2, 3, 6, 7]);

        let mut dest = [0u8; 10];
        scatter_row(&pass, &reduced, &mut dest, 2);
        assert_eq!(dest, [0, 0, 2, 3, 0, 0, 6, 7, 0, 0]);
    }
}
