//! Cascade face detection for still images.
//!
//! An image is reduced to luminance, swept with windows of growing size
//! that a trained [`faces::Classifier`] accepts or rejects, overlapping hits
//! are merged, weak clusters dropped, and every remaining face cropped out.

pub mod config;
pub mod error;
pub mod export;
pub mod faces;
pub mod logging;

pub use error::{FinderError, Result};
