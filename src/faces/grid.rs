use image::DynamicImage;

use crate::error::{FinderError, Result};

/// ITU-R BT.601 luma coefficients
const LUMA_R: f32 = 0.299;
const LUMA_G: f32 = 0.587;
const LUMA_B: f32 = 0.114;

/// Single-channel 8-bit luminance buffer, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelGrid {
    rows: u32,
    cols: u32,
    data: Vec<u8>,
}

impl PixelGrid {
    /// Wrap an existing buffer of `rows * cols` bytes.
    pub fn from_raw(rows: u32, cols: u32, data: Vec<u8>) -> Result<Self> {
        if data.len() != rows as usize * cols as usize {
            return Err(FinderError::BufferSize {
                rows,
                cols,
                len: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    /// A grid with every pixel set to `value`.
    pub fn filled(rows: u32, cols: u32, value: u8) -> Self {
        Self {
            rows,
            cols,
            data: vec![value; rows as usize * cols as usize],
        }
    }

    /// Convert a decoded image to luminance.
    ///
    /// Alpha is ignored; each channel is weighted by the standard luma
    /// coefficients and the sum rounded to the nearest integer.
    pub fn from_image(img: &DynamicImage) -> Self {
        let rgba = img.to_rgba8();
        let (cols, rows) = rgba.dimensions();

        let data = rgba
            .pixels()
            .map(|p| luma(p[0], p[1], p[2]))
            .collect();

        Self { rows, cols, data }
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Pixel at (row, col), or `None` outside the grid.
    pub fn get(&self, row: i32, col: i32) -> Option<u8> {
        if row < 0 || col < 0 || row as u32 >= self.rows || col as u32 >= self.cols {
            return None;
        }
        Some(self.data[row as usize * self.cols as usize + col as usize])
    }
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = LUMA_R * r as f32 + LUMA_G * g as f32 + LUMA_B * b as f32;
    y.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    #[test]
    fn test_luma_weights() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 255);
        // 0.299*100 + 0.587*150 + 0.114*200 = 140.75
        assert_eq!(luma(100, 150, 200), 141);
        assert_eq!(luma(255, 0, 0), 76);
        assert_eq!(luma(0, 255, 0), 150);
        assert_eq!(luma(0, 0, 255), 29);
    }

    #[test]
    fn test_from_image_dimensions_and_order() {
        let mut img = RgbImage::new(3, 2);
        img.put_pixel(2, 0, Rgb([255, 255, 255]));
        img.put_pixel(0, 1, Rgb([100, 150, 200]));

        let grid = PixelGrid::from_image(&DynamicImage::ImageRgb8(img));
        assert_eq!(grid.rows(), 2);
        assert_eq!(grid.cols(), 3);
        assert_eq!(grid.as_slice(), &[0, 0, 255, 141, 0, 0]);
        assert_eq!(grid.get(0, 2), Some(255));
        assert_eq!(grid.get(1, 0), Some(141));
    }

    #[test]
    fn test_alpha_is_ignored() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([100, 150, 200, 0]));
        let grid = PixelGrid::from_image(&DynamicImage::ImageRgba8(img));
        assert!(grid.as_slice().iter().all(|&v| v == 141));
    }

    #[test]
    fn test_deterministic() {
        let img = RgbImage::from_fn(16, 9, |x, y| Rgb([(x * 13) as u8, (y * 29) as u8, 77]));
        let img = DynamicImage::ImageRgb8(img);
        assert_eq!(PixelGrid::from_image(&img), PixelGrid::from_image(&img));
    }

    #[test]
    fn test_get_out_of_bounds() {
        let grid = PixelGrid::filled(4, 5, 9);
        assert_eq!(grid.get(-1, 0), None);
        assert_eq!(grid.get(0, -1), None);
        assert_eq!(grid.get(4, 0), None);
        assert_eq!(grid.get(0, 5), None);
        assert_eq!(grid.get(3, 4), Some(9));
    }

    #[test]
    fn test_from_raw_rejects_wrong_length() {
        assert!(PixelGrid::from_raw(2, 2, vec![0; 4]).is_ok());
        assert!(matches!(
            PixelGrid::from_raw(2, 2, vec![0; 3]),
            Err(FinderError::BufferSize { len: 3, .. })
        ));
    }
}
