use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{FinderError, Result};
use super::clustering::ClusteredDetection;

/// How a detection window maps to a crop rectangle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CropMode {
    /// Extends a quarter window further below the center than a centered
    /// crop would. Matches the reference face finder output exactly.
    #[default]
    Reference,
    /// Window-aligned square crop.
    Symmetric,
}

/// Axis-aligned pixel rectangle, right and bottom exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FaceRegion {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl FaceRegion {
    /// Crop rectangle for a detection. Coordinates are truncated to whole
    /// pixels first and halved with integer division.
    pub fn from_detection(det: &ClusteredDetection, mode: CropMode) -> Self {
        let row = det.row as i32;
        let col = det.col as i32;
        let scale = det.scale as i32;

        let bottom = match mode {
            CropMode::Reference => scale + row - scale / 4,
            CropMode::Symmetric => scale + row - scale / 2,
        };

        Self {
            left: col - scale / 2,
            top: row - scale / 2,
            right: scale + col - scale / 2,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        (self.right - self.left).max(0)
    }

    pub fn height(&self) -> i32 {
        (self.bottom - self.top).max(0)
    }

    /// Intersection with a `width` x `height` image, if not empty.
    pub fn clip(&self, width: u32, height: u32) -> Option<Self> {
        let clipped = Self {
            left: self.left.max(0),
            top: self.top.max(0),
            right: self.right.min(width.min(i32::MAX as u32) as i32),
            bottom: self.bottom.min(height.min(i32::MAX as u32) as i32),
        };
        (clipped.width() > 0 && clipped.height() > 0).then_some(clipped)
    }
}

/// Keep detections scoring at least `min_confidence`, preserving order.
pub fn filter_by_confidence(
    detections: Vec<ClusteredDetection>,
    min_confidence: f32,
) -> Vec<ClusteredDetection> {
    detections
        .into_iter()
        .filter(|det| det.score >= min_confidence)
        .collect()
}

/// Cut `region` out of `img`, clipped to the image bounds.
pub fn crop_region(img: &DynamicImage, region: &FaceRegion) -> Result<DynamicImage> {
    let (width, height) = img.dimensions();
    let clipped = region
        .clip(width, height)
        .ok_or(FinderError::EmptyCrop(*region))?;

    Ok(img.crop_imm(
        clipped.left as u32,
        clipped.top as u32,
        clipped.width() as u32,
        clipped.height() as u32,
    ))
}

/// Crop every region, skipping (and logging) those that cannot be cropped.
///
/// Returned pairs keep the input order.
pub fn extract_regions(
    img: &DynamicImage,
    regions: &[FaceRegion],
) -> Vec<(FaceRegion, DynamicImage)> {
    regions
        .iter()
        .filter_map(|region| match crop_region(img, region) {
            Ok(face) => Some((*region, face)),
            Err(e) => {
                tracing::warn!(?region, error = %e, "Skipping face region");
                None
            }
        })
        .collect()
}

/// Output file name for the `index`th face
pub fn face_file_name(index: usize) -> String {
    format!("{}.jpg", index)
}

/// Write faces as `0.jpg`, `1.jpg`, ... into `dir`.
///
/// The first failure aborts the remaining writes.
pub fn write_faces<'a, I>(faces: I, dir: &Path, quality: u8) -> Result<Vec<PathBuf>>
where
    I: IntoIterator<Item = &'a DynamicImage>,
{
    std::fs::create_dir_all(dir).map_err(|e| FinderError::Write {
        path: dir.to_path_buf(),
        source: image::ImageError::IoError(e),
    })?;

    let mut written = Vec::new();
    for (index, face) in faces.into_iter().enumerate() {
        let path = dir.join(face_file_name(index));
        write_jpeg(face, &path, quality)?;
        tracing::debug!(path = ?path, "Face written");
        written.push(path);
    }

    Ok(written)
}

fn write_jpeg(face: &DynamicImage, path: &Path, quality: u8) -> Result<()> {
    let write_error = |source| FinderError::Write {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(|e| write_error(image::ImageError::IoError(e)))?;
    let mut writer = BufWriter::new(file);

    JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100))
        .encode_image(&face.to_rgb8())
        .map_err(write_error)?;

    // Small crops never leave the buffer until this flush
    writer
        .flush()
        .map_err(|e| write_error(image::ImageError::IoError(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn det(row: f32, col: f32, scale: f32, score: f32) -> ClusteredDetection {
        ClusteredDetection {
            row,
            col,
            scale,
            score,
            members: 1,
        }
    }

    #[test]
    fn test_reference_mapping_extends_below_center() {
        let region =
            FaceRegion::from_detection(&det(100.0, 100.0, 200.0, 9.0), CropMode::Reference);
        assert_eq!(
            region,
            FaceRegion { left: 0, top: 0, right: 200, bottom: 250 }
        );
        // Taller below the center than above
        assert!(region.bottom - 100 > 100 - region.top);
    }

    #[test]
    fn test_symmetric_mapping_is_square() {
        let region =
            FaceRegion::from_detection(&det(100.0, 100.0, 200.0, 9.0), CropMode::Symmetric);
        assert_eq!(
            region,
            FaceRegion { left: 0, top: 0, right: 200, bottom: 200 }
        );
    }

    #[test]
    fn test_mapping_uses_integer_halves() {
        let region = FaceRegion::from_detection(&det(60.0, 70.0, 121.0, 9.0), CropMode::Reference);
        // 121 / 2 = 60, 121 / 4 = 30
        assert_eq!(
            region,
            FaceRegion { left: 10, top: 0, right: 131, bottom: 151 }
        );
    }

    #[test]
    fn test_filter_is_subset_at_threshold() {
        let input = vec![
            det(1.0, 1.0, 10.0, 4.99),
            det(2.0, 2.0, 10.0, 5.0),
            det(3.0, 3.0, 10.0, 12.0),
            det(4.0, 4.0, 10.0, 0.0),
        ];
        let output = filter_by_confidence(input.clone(), 5.0);

        assert_eq!(output, vec![input[1], input[2]]);
        for d in &input {
            assert_eq!(output.contains(d), d.score >= 5.0);
        }
    }

    #[test]
    fn test_clip() {
        let region = FaceRegion { left: -10, top: 5, right: 50, bottom: 120 };
        assert_eq!(
            region.clip(40, 100),
            Some(FaceRegion { left: 0, top: 5, right: 40, bottom: 100 })
        );

        let outside = FaceRegion { left: 50, top: 0, right: 60, bottom: 10 };
        assert_eq!(outside.clip(40, 100), None);
    }

    #[test]
    fn test_crop_region_contents() {
        let img = RgbImage::from_fn(8, 8, |x, y| Rgb([x as u8 * 10, y as u8 * 10, 0]));
        let img = DynamicImage::ImageRgb8(img);

        let region = FaceRegion { left: 2, top: 3, right: 6, bottom: 20 };
        let face = crop_region(&img, &region).unwrap();
        assert_eq!(face.dimensions(), (4, 5));
        assert_eq!(face.to_rgb8().get_pixel(0, 0), &Rgb([20, 30, 0]));
    }

    #[test]
    fn test_extract_skips_uncroppable_regions() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(50, 50));
        let regions = [
            FaceRegion { left: 0, top: 0, right: 10, bottom: 10 },
            FaceRegion { left: 60, top: 60, right: 80, bottom: 80 },
            FaceRegion { left: 20, top: 20, right: 40, bottom: 45 },
        ];

        let faces = extract_regions(&img, &regions);
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].0, regions[0]);
        assert_eq!(faces[1].0, regions[2]);
        assert_eq!(faces[1].1.dimensions(), (20, 25));
    }

    #[test]
    fn test_write_faces_named_by_index() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("faces");
        let faces = vec![
            DynamicImage::ImageRgb8(RgbImage::new(10, 12)),
            DynamicImage::ImageRgb8(RgbImage::new(20, 20)),
        ];

        let written = write_faces(&faces, &out, 75).unwrap();
        assert_eq!(written, vec![out.join("0.jpg"), out.join("1.jpg")]);

        let decoded = image::open(&written[0]).unwrap();
        assert_eq!(decoded.dimensions(), (10, 12));
    }

    #[test]
    fn test_write_failure_aborts() {
        let dir = tempdir().unwrap();
        // A directory squatting on the first output name
        std::fs::create_dir(dir.path().join("0.jpg")).unwrap();
        let faces = vec![
            DynamicImage::ImageRgb8(RgbImage::new(4, 4)),
            DynamicImage::ImageRgb8(RgbImage::new(4, 4)),
        ];

        let result = write_faces(&faces, dir.path(), 75);
        assert!(matches!(result, Err(FinderError::Write { .. })));
        assert!(!dir.path().join("1.jpg").exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_full_device_aborts() {
        let dir = tempdir().unwrap();
        std::os::unix::fs::symlink("/dev/full", dir.path().join("0.jpg")).unwrap();
        let faces = vec![
            DynamicImage::ImageRgb8(RgbImage::new(4, 4)),
            DynamicImage::ImageRgb8(RgbImage::new(4, 4)),
        ];

        let result = write_faces(&faces, dir.path(), 75);
        match result {
            Err(FinderError::Write { path, .. }) => assert_eq!(path, dir.path().join("0.jpg")),
            other => panic!("expected write error, got {:?}", other),
        }
        assert!(!dir.path().join("1.jpg").exists());
    }

    #[test]
    fn test_output_dir_failure_names_dir() {
        let dir = tempdir().unwrap();
        // A regular file where the output directory should go
        let blocker = dir.path().join("faces");
        std::fs::write(&blocker, b"").unwrap();
        let out = blocker.join("nested");

        let faces = vec![DynamicImage::ImageRgb8(RgbImage::new(4, 4))];
        match write_faces(&faces, &out, 75) {
            Err(FinderError::Write { path, .. }) => assert_eq!(path, out),
            other => panic!("expected write error, got {:?}", other),
        }
    }
}
