pub mod cascade;
pub mod clustering;
pub mod detector;
pub mod grid;
pub mod processor;
pub mod region;

pub use cascade::{Classifier, PicoCascade};
pub use clustering::{cluster_detections, ClusteredDetection};
pub use detector::{RawDetection, ScanParameters, Scanner};
pub use grid::PixelGrid;
pub use processor::{load_image, DetectionSummary, FaceFinder, ProcessedImage};
pub use region::{CropMode, FaceRegion};
