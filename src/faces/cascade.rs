//! Cascade classifier capability and the pico-format binary cascade.
//!
//! The scanner only ever talks to [`Classifier`]; any trained model can be
//! substituted behind it without touching scanning or clustering.

use std::path::Path;

use crate::error::{FinderError, Result};
use super::grid::PixelGrid;

/// Header bytes preceding the tree data in a cascade file
const HEADER_LEN: usize = 8;

/// Deeper trees than this are not produced by any known trainer
const MAX_TREE_DEPTH: u32 = 16;

/// A pre-trained window classifier.
pub trait Classifier: Send + Sync {
    /// Check the classifier is usable. Called once before scanning.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Score the square window of edge `scale` centered at (row, col).
    ///
    /// `None` means the window was rejected at some stage.
    fn evaluate(&self, grid: &PixelGrid, row: u32, col: u32, scale: u32) -> Option<f32>;
}

/// Cascade of pixel-comparison decision trees.
#[derive(Debug, Clone)]
pub struct PicoCascade {
    tree_depth: u32,
    tree_count: u32,
    /// Four signed codes (r1, c1, r2, c2) per node, `2^depth` nodes per tree
    /// with node 0 unused.
    tree_codes: Vec<i8>,
    tree_preds: Vec<f32>,
    tree_thresholds: Vec<f32>,
}

impl PicoCascade {
    /// Read and unpack a cascade file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let packet = std::fs::read(path).map_err(|source| FinderError::ModelRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::unpack(&packet)
    }

    /// Unpack a cascade from its binary representation.
    pub fn unpack(packet: &[u8]) -> Result<Self> {
        let mut reader = PacketReader::new(packet, HEADER_LEN);

        let tree_depth = reader.read_u32()?;
        let tree_count = reader.read_u32()?;

        if tree_depth == 0 || tree_depth > MAX_TREE_DEPTH {
            return Err(FinderError::MalformedModel(format!(
                "unsupported tree depth {}",
                tree_depth
            )));
        }
        if tree_count == 0 {
            return Err(FinderError::MalformedModel("cascade contains no trees".into()));
        }

        let leaves = 1usize << tree_depth;
        let code_len = 4 * leaves - 4;

        // Reject absurd tree counts before allocating for them
        let tree_bytes = code_len + 4 * leaves + 4;
        if reader.remaining() / tree_bytes < tree_count as usize {
            return Err(FinderError::MalformedModel(format!(
                "{} trees declared, data truncated",
                tree_count
            )));
        }

        let mut tree_codes = Vec::with_capacity(tree_count as usize * 4 * leaves);
        let mut tree_preds = Vec::with_capacity(tree_count as usize * leaves);
        let mut tree_thresholds = Vec::with_capacity(tree_count as usize);

        for _ in 0..tree_count {
            tree_codes.extend_from_slice(&[0, 0, 0, 0]);
            tree_codes.extend(reader.read_bytes(code_len)?.iter().map(|&b| b as i8));

            for _ in 0..leaves {
                tree_preds.push(reader.read_f32()?);
            }
            tree_thresholds.push(reader.read_f32()?);
        }

        tracing::debug!(depth = tree_depth, trees = tree_count, "cascade unpacked");

        Ok(Self {
            tree_depth,
            tree_count,
            tree_codes,
            tree_preds,
            tree_thresholds,
        })
    }

    pub fn tree_depth(&self) -> u32 {
        self.tree_depth
    }

    pub fn tree_count(&self) -> u32 {
        self.tree_count
    }
}

impl Classifier for PicoCascade {
    fn validate(&self) -> Result<()> {
        let leaves = 1usize << self.tree_depth;
        let trees = self.tree_count as usize;

        if trees == 0
            || self.tree_codes.len() != trees * 4 * leaves
            || self.tree_preds.len() != trees * leaves
            || self.tree_thresholds.len() != trees
        {
            return Err(FinderError::MalformedModel(
                "tree tables are inconsistent with the declared shape".into(),
            ));
        }
        Ok(())
    }

    fn evaluate(&self, grid: &PixelGrid, row: u32, col: u32, scale: u32) -> Option<f32> {
        let leaves = 1usize << self.tree_depth;
        let r = row as i32 * 256;
        let c = col as i32 * 256;
        let s = scale as i32;

        let mut root = 0usize;
        let mut out = 0.0f32;

        for tree in 0..self.tree_count as usize {
            let mut idx = 1usize;

            for _ in 0..self.tree_depth {
                let node = &self.tree_codes[root + 4 * idx..root + 4 * idx + 4];

                let p1 = grid.get((r + node[0] as i32 * s) >> 8, (c + node[1] as i32 * s) >> 8)?;
                let p2 = grid.get((r + node[2] as i32 * s) >> 8, (c + node[3] as i32 * s) >> 8)?;

                idx = 2 * idx + usize::from(p1 <= p2);
            }

            out += self.tree_preds[leaves * tree + idx - leaves];
            if out <= self.tree_thresholds[tree] {
                return None;
            }
            root += 4 * leaves;
        }

        Some(out - self.tree_thresholds[self.tree_count as usize - 1])
    }
}

/// Little-endian cursor over a cascade packet
struct PacketReader<'a> {
    packet: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    fn new(packet: &'a [u8], pos: usize) -> Self {
        Self { packet, pos }
    }

    fn remaining(&self) -> usize {
        self.packet.len().saturating_sub(self.pos)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos + len;
        let bytes = self.packet.get(self.pos..end).ok_or_else(|| {
            FinderError::MalformedModel(format!(
                "unexpected end of data at byte {} (need {} more)",
                self.pos, len
            ))
        })?;
        self.pos = end;
        Ok(bytes)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_f32(&mut self) -> Result<f32> {
        self.read_u32().map(f32::from_bits)
    }
}
