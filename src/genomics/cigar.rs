//! CIGAR traversal shared by every counting analysis.
//!
//! A [`CigarWalker`] turns an operation list plus an alignment start into a
//! stream of [`CigarSegment`]s, each carrying the reference and read
//! coordinates *before* the operation is consumed. Consumers that stop
//! iterating early (for example when the reference window runs out) leave
//! the already emitted segments untouched.

use crate::genomics::{CigarOp, CigarOpKind};

/// One CIGAR operation placed on the reference and read coordinate axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarSegment {
    /// Operation kind.
    pub kind: CigarOpKind,
    /// Reference coordinate (0-based) where the operation begins.
    pub ref_pos: i64,
    /// Read coordinate (0-based) where the operation begins.
    pub read_pos: usize,
    /// Operation length.
    pub len: u32,
}

impl CigarSegment {
    /// Iterate `(reference, read)` coordinate pairs of an aligned segment.
    ///
    /// Yields nothing for operations that do not consume both axes.
    pub fn aligned_pairs(&self) -> impl Iterator<Item = (i64, usize)> + '_ {
        let len = if self.kind == CigarOpKind::Match {
            self.len as usize
        } else {
            0
        };
        (0..len).map(move |offset| (self.ref_pos + offset as i64, self.read_pos + offset))
    }
}

/// Iterator over the segments of a CIGAR.
#[derive(Debug, Clone)]
pub struct CigarWalker<'a> {
    ops: std::slice::Iter<'a, CigarOp>,
    ref_pos: i64,
    read_pos: usize,
}

impl<'a> CigarWalker<'a> {
    /// Start walking `ops` from reference coordinate `start`.
    pub fn new(ops: &'a [CigarOp], start: i64) -> Self {
        Self {
            ops: ops.iter(),
            ref_pos: start,
            read_pos: 0,
        }
    }

    /// Reference coordinate after the segments emitted so far.
    pub fn reference_position(&self) -> i64 {
        self.ref_pos
    }

    /// Read coordinate after the segments emitted so far.
    pub fn read_position(&self) -> usize {
        self.read_pos
    }
}

impl Iterator for CigarWalker<'_> {
    type Item = CigarSegment;

    fn next(&mut self) -> Option<Self::Item> {
        let op = self.ops.next()?;
        let segment = CigarSegment {
            kind: op.kind,
            ref_pos: self.ref_pos,
            read_pos: self.read_pos,
            len: op.len,
        };
        if op.kind.consumes_reference() {
            self.ref_pos += i64::from(op.len);
        }
        if op.kind.consumes_read() {
            self.read_pos += op.len as usize;
        }
        Some(segment)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.ops.size_hint()
    }
}

/// Number of reference bases covered by the alignment.
pub fn reference_span(ops: &[CigarOp]) -> u64 {
    ops.iter()
        .filter(|op| op.kind.consumes_reference())
        .map(|op| u64::from(op.len))
        .sum()
}

/// Number of read bases implied by the CIGAR (soft clips included).
pub fn query_length(ops: &[CigarOp]) -> usize {
    ops.iter()
        .filter(|op| op.kind.consumes_read())
        .map(|op| op.len as usize)
        .sum()
}
