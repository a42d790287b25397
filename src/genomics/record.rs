use std::borrow::Cow;

use rust_htslib::bam::record::{Aux, Cigar};
use rust_htslib::bam::Record;

use crate::genomics::{AlignedRead, AlleleClass, BaseCode, CigarOp, CigarOpKind};
use crate::QuantError;

/// Auxiliary tag holding the allele classification.
pub const ALLELE_TAG: &[u8; 2] = b"XV";

/// Read-only view of one fetched alignment record.
pub trait AlignmentView {
    /// Read name, used in error messages.
    fn read_name(&self) -> Cow<'_, str>;

    /// 0-based leftmost reference coordinate.
    fn reference_start(&self) -> i64;

    /// CIGAR operations in order.
    fn cigar_ops(&self) -> Vec<CigarOp>;

    /// Alignment lies on the reverse strand.
    fn is_reverse(&self) -> bool;

    /// Secondary alignment flag.
    fn is_secondary(&self) -> bool;

    /// First segment of a template.
    fn is_read1(&self) -> bool;

    /// Last segment of a template.
    fn is_read2(&self) -> bool;

    /// Mapping quality.
    fn mapq(&self) -> u8;

    /// Number of stored bases.
    fn sequence_len(&self) -> usize;

    /// Base at read offset `offset`; out-of-range offsets read as `N`.
    fn base(&self, offset: usize) -> BaseCode;

    /// Signed observed template length.
    fn insert_size(&self) -> i64;

    /// Raw allele tag character, `None` when the tag is absent.
    ///
    /// A tag of the wrong type is reported as [`QuantError::InvalidAlleleTag`].
    fn raw_allele_tag(&self) -> Result<Option<u8>, QuantError>;

    /// Allele classification; a missing or unknown tag is an error.
    fn allele_class(&self) -> Result<AlleleClass, QuantError> {
        match self.raw_allele_tag()? {
            None => Err(QuantError::MissingAlleleTag {
                read: self.read_name().into_owned(),
            }),
            Some(value) => AlleleClass::from_tag(value).ok_or_else(|| QuantError::InvalidAlleleTag {
                read: self.read_name().into_owned(),
                value: (value as char).to_string(),
            }),
        }
    }
}

impl AlignmentView for AlignedRead {
    fn read_name(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.name)
    }

    fn reference_start(&self) -> i64 {
        self.pos
    }

    fn cigar_ops(&self) -> Vec<CigarOp> {
        self.cigar.clone()
    }

    fn is_reverse(&self) -> bool {
        self.is_reverse
    }

    fn is_secondary(&self) -> bool {
        self.is_secondary
    }

    fn is_read1(&self) -> bool {
        self.is_read1
    }

    fn is_read2(&self) -> bool {
        self.is_read2
    }

    fn mapq(&self) -> u8 {
        self.mapq
    }

    fn sequence_len(&self) -> usize {
        self.sequence.len()
    }

    fn base(&self, offset: usize) -> BaseCode {
        self.sequence
            .get(offset)
            .map_or(BaseCode::N, |&b| BaseCode::from_ascii(b))
    }

    fn insert_size(&self) -> i64 {
        self.insert_size
    }

    fn raw_allele_tag(&self) -> Result<Option<u8>, QuantError> {
        Ok(self.allele_tag)
    }
}

/// Convert an htslib CIGAR operation.
pub fn cigar_op_from_htslib(op: &Cigar) -> CigarOp {
    match *op {
        Cigar::Match(len) | Cigar::Equal(len) | Cigar::Diff(len) => {
            CigarOp::new(CigarOpKind::Match, len)
        }
        Cigar::Ins(len) => CigarOp::new(CigarOpKind::Insertion, len),
        Cigar::Del(len) => CigarOp::new(CigarOpKind::Deletion, len),
        Cigar::RefSkip(len) => CigarOp::new(CigarOpKind::Skip, len),
        Cigar::SoftClip(len) => CigarOp::new(CigarOpKind::SoftClip, len),
        Cigar::HardClip(len) => CigarOp::new(CigarOpKind::HardClip, len),
        Cigar::Pad(len) => CigarOp::new(CigarOpKind::Padding, len),
    }
}

/// Convert to an htslib CIGAR operation.
pub fn cigar_op_to_htslib(op: &CigarOp) -> Cigar {
    match op.kind {
        CigarOpKind::Match => Cigar::Match(op.len),
        CigarOpKind::Insertion => Cigar::Ins(op.len),
        CigarOpKind::Deletion => Cigar::Del(op.len),
        CigarOpKind::Skip => Cigar::RefSkip(op.len),
        CigarOpKind::SoftClip => Cigar::SoftClip(op.len),
        CigarOpKind::HardClip => Cigar::HardClip(op.len),
        CigarOpKind::Padding => Cigar::Pad(op.len),
    }
}

impl AlignmentView for Record {
    fn read_name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.qname())
    }

    fn reference_start(&self) -> i64 {
        self.pos()
    }

    fn cigar_ops(&self) -> Vec<CigarOp> {
        self.cigar().iter().map(cigar_op_from_htslib).collect()
    }

    fn is_reverse(&self) -> bool {
        Record::is_reverse(self)
    }

    fn is_secondary(&self) -> bool {
        Record::is_secondary(self)
    }

    fn is_read1(&self) -> bool {
        self.is_first_in_template()
    }

    fn is_read2(&self) -> bool {
        self.is_last_in_template()
    }

    fn mapq(&self) -> u8 {
        Record::mapq(self)
    }

    fn sequence_len(&self) -> usize {
        self.seq_len()
    }

    fn base(&self, offset: usize) -> BaseCode {
        if offset >= self.seq_len() {
            return BaseCode::N;
        }
        BaseCode::from_nt16(self.seq().encoded_base(offset))
    }

    fn insert_size(&self) -> i64 {
        Record::insert_size(self)
    }

    fn raw_allele_tag(&self) -> Result<Option<u8>, QuantError> {
        match self.aux(ALLELE_TAG) {
            Ok(Aux::Char(value)) => Ok(Some(value)),
            Ok(Aux::String(value)) if value.len() == 1 => Ok(Some(value.as_bytes()[0])),
            Ok(other) => Err(QuantError::InvalidAlleleTag {
                read: self.read_name().into_owned(),
                value: format!("{other:?}"),
            }),
            Err(_) => Ok(None),
        }
    }
}
