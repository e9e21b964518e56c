use image::{DynamicImage, GenericImageView};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::config::{DetectionConfig, OutputConfig};
use crate::error::{FinderError, Result};
use super::cascade::{Classifier, PicoCascade};
use super::clustering::{cluster_detections, ClusteredDetection};
use super::detector::{RawDetection, Scanner};
use super::grid::PixelGrid;
use super::region::{self, FaceRegion};

/// A clustered detection that passed the confidence threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptedFace {
    pub detection: ClusteredDetection,
    pub region: FaceRegion,
}

/// Output of every pipeline stage for one grid
#[derive(Debug, Clone, Default)]
pub struct DetectionSummary {
    pub raw: Vec<RawDetection>,
    pub clustered: Vec<ClusteredDetection>,
    pub accepted: Vec<AcceptedFace>,
}

/// A face that was cropped out of the source image
#[derive(Debug, Clone)]
pub struct ExtractedFace {
    pub detection: ClusteredDetection,
    pub region: FaceRegion,
    pub image: DynamicImage,
}

/// A face crop saved to disk
#[derive(Debug, Clone)]
pub struct WrittenFace {
    pub index: usize,
    pub path: PathBuf,
    pub detection: ClusteredDetection,
    pub region: FaceRegion,
}

/// Result of processing one image file
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub image_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub raw_count: usize,
    pub cluster_count: usize,
    pub faces: Vec<WrittenFace>,
    pub elapsed: Duration,
}

/// Detect, cluster, filter and crop faces with a trained classifier
pub struct FaceFinder<C: Classifier = PicoCascade> {
    classifier: C,
    config: DetectionConfig,
}

impl FaceFinder<PicoCascade> {
    /// Load the cascade model from disk.
    pub fn from_model_file(path: &Path, config: DetectionConfig) -> Result<Self> {
        let cascade = PicoCascade::from_file(path)?;
        tracing::info!(
            model = ?path,
            trees = cascade.tree_count(),
            depth = cascade.tree_depth(),
            "Face classifier loaded"
        );
        Self::new(cascade, config)
    }
}

impl<C: Classifier> FaceFinder<C> {
    /// Fails if the classifier or scan parameters are unusable.
    pub fn new(classifier: C, config: DetectionConfig) -> Result<Self> {
        config.scan_parameters().validate()?;
        classifier.validate()?;
        Ok(Self { classifier, config })
    }

    /// Run scan, clustering and the confidence filter over a grayscale grid.
    pub fn detect(&self, grid: &PixelGrid) -> Result<DetectionSummary> {
        let raw = Scanner::new(&self.classifier, self.config.scan_parameters())?
            .parallel(self.config.parallel)
            .scan(grid);

        let clustered = cluster_detections(&raw, self.config.iou_threshold);

        let accepted = region::filter_by_confidence(clustered.clone(), self.config.min_confidence)
            .into_iter()
            .map(|detection| AcceptedFace {
                region: FaceRegion::from_detection(&detection, self.config.crop_mode),
                detection,
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            raw = raw.len(),
            clustered = clustered.len(),
            accepted = accepted.len(),
            "Detection finished"
        );

        Ok(DetectionSummary {
            raw,
            clustered,
            accepted,
        })
    }

    /// Detect faces in a decoded image and crop each accepted one.
    pub fn find_faces(&self, img: &DynamicImage) -> Result<(DetectionSummary, Vec<ExtractedFace>)> {
        let grid = PixelGrid::from_image(img);
        let summary = self.detect(&grid)?;

        let regions: Vec<FaceRegion> = summary.accepted.iter().map(|f| f.region).collect();
        let mut remaining = summary.accepted.iter();

        let mut faces = Vec::with_capacity(regions.len());
        for (region, image) in region::extract_regions(img, &regions) {
            // Extraction preserves order, so advance to the matching detection
            if let Some(accepted) = remaining.by_ref().find(|f| f.region == region) {
                faces.push(ExtractedFace {
                    detection: accepted.detection,
                    region,
                    image,
                });
            }
        }

        Ok((summary, faces))
    }

    /// Load an image file, find its faces and write one JPEG per face.
    pub fn process_image(
        &self,
        image_path: &Path,
        output: &OutputConfig,
    ) -> Result<ProcessedImage> {
        let img = load_image(image_path)?;
        let (width, height) = img.dimensions();

        let started = Instant::now();
        let (summary, faces) = self.find_faces(&img)?;

        let paths = region::write_faces(
            faces.iter().map(|f| &f.image),
            &output.directory,
            output.jpeg_quality,
        )?;
        let elapsed = started.elapsed();

        let written = faces
            .into_iter()
            .zip(paths)
            .enumerate()
            .map(|(index, (face, path))| WrittenFace {
                index,
                path,
                detection: face.detection,
                region: face.region,
            })
            .collect::<Vec<_>>();

        tracing::info!(
            image = ?image_path,
            faces = written.len(),
            elapsed = ?elapsed,
            "Image processed"
        );

        Ok(ProcessedImage {
            image_path: image_path.to_path_buf(),
            width,
            height,
            raw_count: summary.raw.len(),
            cluster_count: summary.clustered.len(),
            faces: written,
            elapsed,
        })
    }
}

/// Decode an image file
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|source| FinderError::ImageDecode {
        path: path.to_path_buf(),
        source,
    })
}
