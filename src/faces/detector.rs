use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::{FinderError, Result};
use super::cascade::Classifier;
use super::grid::PixelGrid;

/// Window sweep configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanParameters {
    /// Smallest window edge in pixels
    pub min_size: u32,
    /// Largest window edge in pixels
    pub max_size: u32,
    /// Fraction of the window edge to advance between evaluations
    pub shift_factor: f32,
    /// Window growth between scales, > 1.0
    pub scale_factor: f32,
}

impl Default for ScanParameters {
    fn default() -> Self {
        Self {
            min_size: 100,
            max_size: 600,
            shift_factor: 0.15,
            scale_factor: 1.1,
        }
    }
}

impl ScanParameters {
    pub fn validate(&self) -> Result<()> {
        if self.min_size == 0 || self.min_size > self.max_size {
            return Err(FinderError::InvalidParameters(format!(
                "need 0 < min_size <= max_size, got {}..{}",
                self.min_size, self.max_size
            )));
        }
        if !(self.shift_factor > 0.0 && self.shift_factor <= 1.0) {
            return Err(FinderError::InvalidParameters(format!(
                "shift_factor must be in (0, 1], got {}",
                self.shift_factor
            )));
        }
        if !(self.scale_factor > 1.0) || !self.scale_factor.is_finite() {
            return Err(FinderError::InvalidParameters(format!(
                "scale_factor must be > 1.0, got {}",
                self.scale_factor
            )));
        }
        Ok(())
    }

    /// Window edges visited, ascending.
    pub fn scales(&self) -> Vec<u32> {
        let mut scales = Vec::new();
        let mut scale = self.min_size;
        while scale <= self.max_size {
            scales.push(scale);
            let next = (scale as f32 * self.scale_factor) as u32;
            // Truncation can stall small windows at factors close to 1
            scale = next.max(scale + 1);
        }
        scales
    }
}

/// A window accepted by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RawDetection {
    /// Window center row
    pub row: f32,
    /// Window center column
    pub col: f32,
    /// Window edge length
    pub scale: f32,
    pub score: f32,
}

impl RawDetection {
    /// Scanner order: ascending scale, then row, then col.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.scale
            .total_cmp(&other.scale)
            .then(self.row.total_cmp(&other.row))
            .then(self.col.total_cmp(&other.col))
    }
}

/// One row of windows at a single scale
#[derive(Debug, Clone, Copy)]
struct ScanLine {
    scale: u32,
    row: u32,
    step: u32,
}

/// Sliding-window sweep over a grayscale grid
pub struct Scanner<'c, C: Classifier + ?Sized> {
    classifier: &'c C,
    params: ScanParameters,
    parallel: bool,
}

impl<'c, C: Classifier + ?Sized> Scanner<'c, C> {
    /// Validates the parameters and the classifier up front.
    pub fn new(classifier: &'c C, params: ScanParameters) -> Result<Self> {
        params.validate()?;
        classifier.validate()?;
        Ok(Self {
            classifier,
            params,
            parallel: true,
        })
    }

    /// Spread scan lines across the rayon pool (default on).
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Evaluate every in-bounds window and collect accepted ones in scanner order.
    pub fn scan(&self, grid: &PixelGrid) -> Vec<RawDetection> {
        let lines = self.scan_lines(grid);

        let mut detections: Vec<RawDetection> = if self.parallel {
            lines
                .par_iter()
                .flat_map_iter(|line| self.scan_line(grid, *line))
                .collect()
        } else {
            lines
                .iter()
                .flat_map(|line| self.scan_line(grid, *line))
                .collect()
        };

        detections.sort_by(RawDetection::canonical_cmp);

        tracing::debug!(
            lines = lines.len(),
            detections = detections.len(),
            parallel = self.parallel,
            "scan complete"
        );

        detections
    }

    fn scan_lines(&self, grid: &PixelGrid) -> Vec<ScanLine> {
        let mut lines = Vec::new();

        for scale in self.params.scales() {
            if scale > grid.rows() || scale > grid.cols() {
                break;
            }
            let step = ((scale as f32 * self.params.shift_factor) as u32).max(1);
            let half = scale / 2;

            // Window spans [row - half, row - half + scale)
            let mut row = half;
            while row - half + scale <= grid.rows() {
                lines.push(ScanLine { scale, row, step });
                row += step;
            }
        }

        lines
    }

    fn scan_line<'g>(
        &'g self,
        grid: &'g PixelGrid,
        line: ScanLine,
    ) -> impl Iterator<Item = RawDetection> + 'g {
        let half = line.scale / 2;
        let last_col = grid.cols() + half - line.scale;

        (half..=last_col)
            .step_by(line.step as usize)
            .filter_map(move |col| {
                self.classifier
                    .evaluate(grid, line.row, col, line.scale)
                    .map(|score| RawDetection {
                        row: line.row as f32,
                        col: col as f32,
                        scale: line.scale as f32,
                        score,
                    })
            })
    }
}
