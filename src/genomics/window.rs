//! Fixed-size genomic windows with read-length padding.
//!
//! Counter arrays are indexed by `genomic_position - offset`. The window
//! covers the queried region plus `padding` bases on either side so that
//! alignments starting before or ending after the region still land inside
//! the arrays; anything beyond the padding is dropped.

use bitvec::prelude::*;

use crate::genomics::{BaseCode, Strand};

/// Index arithmetic for a padded region window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionWindow {
    region_start: i64,
    region_len: usize,
    left_extension: usize,
    len: usize,
}

impl PositionWindow {
    /// Window around the 0-based region `[region_start, region_start + region_len)`.
    ///
    /// Left padding is `min(region_start, padding)`; total size is
    /// `region_len + 2 * padding`.
    pub fn new(region_start: i64, region_len: usize, padding: usize) -> Self {
        let left_extension = region_start.clamp(0, padding as i64) as usize;
        Self {
            region_start,
            region_len,
            left_extension,
            len: region_len + 2 * padding,
        }
    }

    /// Genomic coordinate of array index 0.
    #[inline]
    pub fn offset(&self) -> i64 {
        self.region_start - self.left_extension as i64
    }

    /// Number of slots before the region start.
    pub fn left_extension(&self) -> usize {
        self.left_extension
    }

    /// Region length in bases.
    pub fn region_len(&self) -> usize {
        self.region_len
    }

    /// Total slots including padding.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-sized window.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Array index of a 0-based genomic position, if it falls in the window.
    #[inline]
    pub fn index_of(&self, position: i64) -> Option<usize> {
        let idx = position - self.offset();
        if idx < 0 || idx as usize >= self.len {
            None
        } else {
            Some(idx as usize)
        }
    }

    /// Array indices covering the nominal region.
    pub fn region_indices(&self) -> std::ops::Range<usize> {
        self.left_extension..self.left_extension + self.region_len
    }

    /// 1-based genomic position of array index `idx`.
    #[inline]
    pub fn one_based(&self, idx: usize) -> i64 {
        idx as i64 + self.offset() + 1
    }
}

/// Positions eligible for counting, one bit per window slot and strand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetMask {
    plus: BitVec,
    minus: BitVec,
}

impl TargetMask {
    /// Empty mask sized for `window`.
    pub fn new(window: &PositionWindow) -> Self {
        Self {
            plus: bitvec![0; window.len()],
            minus: bitvec![0; window.len()],
        }
    }

    /// Mark C of every CpG on `+` and its paired G on `-`.
    pub fn cpg(window: &PositionWindow, reference: &[u8]) -> Self {
        let mut mask = Self::new(window);
        let base = window.left_extension();
        for (i, pair) in reference.windows(2).enumerate() {
            if BaseCode::from_ascii(pair[0]) == BaseCode::C
                && BaseCode::from_ascii(pair[1]) == BaseCode::G
            {
                mask.plus.set(base + i, true);
                mask.minus.set(base + i + 1, true);
            }
        }
        mask
    }

    /// Mark every C on `+` and every G on `-`.
    pub fn all_cytosines(window: &PositionWindow, reference: &[u8]) -> Self {
        let mut mask = Self::new(window);
        let base = window.left_extension();
        for (i, &b) in reference.iter().enumerate() {
            match BaseCode::from_ascii(b) {
                BaseCode::C => mask.plus.set(base + i, true),
                BaseCode::G => mask.minus.set(base + i, true),
                _ => {}
            }
        }
        mask
    }

    /// Whether slot `idx` is marked for `strand`.
    #[inline]
    pub fn is_marked(&self, strand: Strand, idx: usize) -> bool {
        let bits = match strand {
            Strand::Plus => &self.plus,
            Strand::Minus => &self.minus,
        };
        bits.get(idx).map(|bit| *bit).unwrap_or(false)
    }

    /// Number of marked slots on `strand`.
    pub fn count(&self, strand: Strand) -> usize {
        match strand {
            Strand::Plus => self.plus.count_ones(),
            Strand::Minus => self.minus.count_ones(),
        }
    }
}
