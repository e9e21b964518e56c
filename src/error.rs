use std::path::PathBuf;
use thiserror::Error;

use crate::faces::FaceRegion;

#[derive(Debug, Error)]
pub enum FinderError {
    #[error("failed to load face finder model {path:?}: {source}")]
    ModelRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to initialize face classifier: {0}")]
    MalformedModel(String),

    #[error("invalid scan parameters: {0}")]
    InvalidParameters(String),

    #[error("failed to decode image {path:?}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("pixel buffer holds {len} bytes, expected {rows}x{cols}")]
    BufferSize { rows: u32, cols: u32, len: usize },

    #[error("region {0:?} does not intersect the image")]
    EmptyCrop(FaceRegion),

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FinderError>;
