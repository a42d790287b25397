//! # Quantitative signals from indexed alignment files
//!
//! This library extracts counts from aligned sequencing reads held in an
//! indexed BAM file:
//!
//! 1. **Spliced junctions**: reference-skip segments keyed by
//!    `chromosome:first_intronic_base:last_intronic_base:strand`
//! 2. **Cytosine methylation**: converted/unconverted cytosine counts per
//!    reference position in bisulfite data, optionally per allele
//! 3. **SNV concordance**: matches on the strand untouched by conversion
//! 4. **Per-cycle nucleotide frequencies**: a cycle × read base × reference
//!    base confusion matrix, fragment lengths and a duplicate estimate
//!
//! All analyses share one core: a CIGAR walk mapping read coordinates to
//! reference coordinates and feeding position- or key-indexed counters.
//!
//! ## Usage Example
//!
//! ```ignore
//! use bamquant::genomics::{count_junctions, JunctionConfig, QueryRegion};
//!
//! let config = JunctionConfig::default().with_include_secondary(false);
//! let counts = count_junctions("sample.bam", &[QueryRegion::new(0, 0, 1_000_000)], &config)?;
//! for (key, count) in counts.unstratified() {
//!     println!("{key}\t{count}");
//! }
//! ```

#![warn(missing_docs, missing_debug_implementations)]
#![allow(clippy::new_without_default)]

pub mod genomics; // Alignment views, CIGAR walking and the counting analyses

use std::path::PathBuf;

use thiserror::Error;

/// Upper bound on read length used to pad per-position counter windows.
pub const DEFAULT_MAX_READ_LENGTH: usize = 500;

/// Errors raised by the quantification routines.
#[derive(Error, Debug)]
pub enum QuantError {
    /// A parameter has an invalid shape or range.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter {
        /// Name of the offending parameter
        name: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// Methylation mode outside 0, 1 or 2.
    #[error("unknown mode '{0}', should be one of 0, 1, or 2")]
    UnknownMode(i64),

    /// The alignment file could not be opened.
    #[error("failed to open BAM file '{}': {source}", path.display())]
    OpenFailed {
        /// Path that failed to open
        path: PathBuf,
        /// Underlying htslib error
        #[source]
        source: rust_htslib::errors::Error,
    },

    /// The alignment file has no targets in its header.
    #[error("BAM header missing or empty in file '{}'", path.display())]
    EmptyHeader {
        /// Path of the file with the empty header
        path: PathBuf,
    },

    /// The alignment index could not be loaded.
    #[error("BAM index for '{}' unavailable: {source}", path.display())]
    IndexUnavailable {
        /// Path whose index is missing
        path: PathBuf,
        /// Underlying htslib error
        #[source]
        source: rust_htslib::errors::Error,
    },

    /// A named target is absent from the header.
    #[error("could not find target '{target}' in BAM header of '{path}'")]
    TargetNotFound {
        /// Requested target name
        target: String,
        /// Source that was searched
        path: String,
    },

    /// A numeric target id exceeds the header's target count.
    #[error("target id {tid} out of range (header has {n_targets} targets)")]
    TargetIdOutOfRange {
        /// Requested target id
        tid: u32,
        /// Number of targets in the header
        n_targets: u32,
    },

    /// Allele-stratified counting requested but a record lacks the tag.
    #[error("XV tag missing on read '{read}' but needed for allele-specific counting")]
    MissingAlleleTag {
        /// Name of the offending read
        read: String,
    },

    /// The allele tag carries an unrecognised value.
    #[error("'{value}' is not a valid XV tag value on read '{read}'; should be one of 'U', 'R' or 'A'")]
    InvalidAlleleTag {
        /// Name of the offending read
        read: String,
        /// Value found in the tag
        value: String,
    },

    /// Error surfaced by htslib while reading records.
    #[error("htslib error: {0}")]
    Htslib(#[from] rust_htslib::errors::Error),

    /// Output could not be written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl QuantError {
    /// Helper for constructing parameter validation errors.
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        QuantError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

/// Inclusive mapping-quality window `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MappingQualityRange {
    min: u8,
    max: u8,
}

impl MappingQualityRange {
    /// Validate and construct a range; both bounds must lie in 0..=255 and
    /// `min` must not exceed `max`.
    pub fn new(min: i64, max: i64) -> Result<Self, QuantError> {
        let min = Self::bound("mapqMin", min)?;
        let max = Self::bound("mapqMax", max)?;
        if min > max {
            return Err(QuantError::invalid(
                "mapqMin",
                "must not be greater than 'mapqMax'",
            ));
        }
        Ok(Self { min, max })
    }

    /// Range accepting every mapping quality.
    pub fn full() -> Self {
        Self { min: 0, max: 255 }
    }

    fn bound(name: &'static str, value: i64) -> Result<u8, QuantError> {
        u8::try_from(value)
            .map_err(|_| QuantError::invalid(name, format!("{value} is not between 0 and 255")))
    }

    /// Lower bound (inclusive).
    pub fn min(&self) -> u8 {
        self.min
    }

    /// Upper bound (inclusive).
    pub fn max(&self) -> u8 {
        self.max
    }

    /// Whether `mapq` lies inside the window.
    #[inline]
    pub fn contains(&self, mapq: u8) -> bool {
        (self.min..=self.max).contains(&mapq)
    }
}

impl Default for MappingQualityRange {
    fn default() -> Self {
        Self::full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mapq_range_rejects_inverted_bounds() {
        let err = MappingQualityRange::new(30, 10).unwrap_err();
        assert!(err.to_string().contains("mapqMin"));
    }

    #[test]
    fn mapq_range_rejects_out_of_range_values() {
        assert!(MappingQualityRange::new(-1, 10).is_err());
        let err = MappingQualityRange::new(0, 256).unwrap_err();
        assert!(err.to_string().contains("mapqMax"));
    }

    #[test]
    fn mapq_range_is_inclusive() {
        let range = MappingQualityRange::new(10, 20).unwrap();
        assert!(range.contains(10));
        assert!(range.contains(20));
        assert!(!range.contains(9));
        assert!(!range.contains(21));
    }
}
