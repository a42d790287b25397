use std::fmt;
use std::sync::Arc;

/// CIGAR operation kinds describing how a read aligns to the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOpKind {
    /// Aligned base, match or mismatch (`M`, `=`, `X`).
    Match,
    /// Insertion relative to the reference.
    Insertion,
    /// Deletion relative to the reference.
    Deletion,
    /// Skipped reference region, i.e. an intron in spliced alignments.
    Skip,
    /// Soft clipping (sequence present in read only).
    SoftClip,
    /// Hard clipping (trimmed sequence not present in read).
    HardClip,
    /// Silent padding.
    Padding,
}

impl CigarOpKind {
    /// Whether the operation advances the reference coordinate.
    #[inline]
    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            CigarOpKind::Match | CigarOpKind::Deletion | CigarOpKind::Skip
        )
    }

    /// Whether the operation advances the read coordinate.
    #[inline]
    pub fn consumes_read(self) -> bool {
        matches!(
            self,
            CigarOpKind::Match | CigarOpKind::Insertion | CigarOpKind::SoftClip
        )
    }

    /// SAM operation letter.
    pub fn symbol(self) -> char {
        match self {
            CigarOpKind::Match => 'M',
            CigarOpKind::Insertion => 'I',
            CigarOpKind::Deletion => 'D',
            CigarOpKind::Skip => 'N',
            CigarOpKind::SoftClip => 'S',
            CigarOpKind::HardClip => 'H',
            CigarOpKind::Padding => 'P',
        }
    }
}

/// CIGAR operation with length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CigarOp {
    /// Operation kind.
    pub kind: CigarOpKind,
    /// Number of bases affected by the operation.
    pub len: u32,
}

impl CigarOp {
    /// Construct a new CIGAR operation.
    pub fn new(kind: CigarOpKind, len: u32) -> Self {
        Self { kind, len }
    }

    /// Parse a SAM CIGAR string such as `5S20M100N30M`.
    ///
    /// Returns `None` on unknown operations or missing lengths; `*` yields an
    /// empty list.
    pub fn parse_all(cigar: &str) -> Option<Vec<CigarOp>> {
        if cigar == "*" {
            return Some(Vec::new());
        }
        let mut ops = Vec::new();
        let mut len: Option<u32> = None;
        for c in cigar.chars() {
            if let Some(digit) = c.to_digit(10) {
                len = Some(len.unwrap_or(0).checked_mul(10)?.checked_add(digit)?);
                continue;
            }
            let kind = match c {
                'M' | '=' | 'X' => CigarOpKind::Match,
                'I' => CigarOpKind::Insertion,
                'D' => CigarOpKind::Deletion,
                'N' => CigarOpKind::Skip,
                'S' => CigarOpKind::SoftClip,
                'H' => CigarOpKind::HardClip,
                'P' => CigarOpKind::Padding,
                _ => return None,
            };
            ops.push(CigarOp::new(kind, len.take()?));
        }
        if len.is_some() {
            return None;
        }
        Some(ops)
    }
}

impl fmt::Display for CigarOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.len, self.kind.symbol())
    }
}

/// Strand of an alignment relative to the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Strand {
    /// Forward strand.
    Plus,
    /// Reverse-complement strand.
    Minus,
}

impl Strand {
    /// Strand of an alignment given its reverse flag.
    pub fn from_reverse(is_reverse: bool) -> Self {
        if is_reverse {
            Strand::Minus
        } else {
            Strand::Plus
        }
    }

    /// `'+'` or `'-'`.
    pub fn symbol(self) -> char {
        match self {
            Strand::Plus => '+',
            Strand::Minus => '-',
        }
    }
}

/// Haplotype classification carried by the `XV` auxiliary tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlleleClass {
    /// Read supports the reference haplotype (`R`).
    Reference,
    /// Read is uninformative (`U`).
    Unknown,
    /// Read supports the alternative haplotype (`A`).
    Alternative,
}

impl AlleleClass {
    /// Number of allele buckets.
    pub const COUNT: usize = 3;

    /// Classes in bucket order (R, U, A).
    pub const ALL: [AlleleClass; Self::COUNT] = [
        AlleleClass::Reference,
        AlleleClass::Unknown,
        AlleleClass::Alternative,
    ];

    /// Parse a tag character.
    pub fn from_tag(value: u8) -> Option<Self> {
        match value {
            b'R' => Some(AlleleClass::Reference),
            b'U' => Some(AlleleClass::Unknown),
            b'A' => Some(AlleleClass::Alternative),
            _ => None,
        }
    }

    /// Bucket index: R = 0, U = 1, A = 2.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            AlleleClass::Reference => 0,
            AlleleClass::Unknown => 1,
            AlleleClass::Alternative => 2,
        }
    }

    /// Tag character.
    pub fn tag(self) -> u8 {
        match self {
            AlleleClass::Reference => b'R',
            AlleleClass::Unknown => b'U',
            AlleleClass::Alternative => b'A',
        }
    }
}

/// Aligned read held in memory.
#[derive(Debug, Clone)]
pub struct AlignedRead {
    /// Read name.
    pub name: Arc<str>,
    /// Reference target id.
    pub tid: u32,
    /// 0-based leftmost reference coordinate.
    pub pos: i64,
    /// Mapping quality (Phred-scaled).
    pub mapq: u8,
    /// CIGAR describing the alignment.
    pub cigar: Vec<CigarOp>,
    /// Read sequence stored as uppercase ASCII.
    pub sequence: Arc<[u8]>,
    /// Whether the read maps to the reverse complement strand.
    pub is_reverse: bool,
    /// Secondary alignment flag.
    pub is_secondary: bool,
    /// First segment of a template.
    pub is_read1: bool,
    /// Last segment of a template.
    pub is_read2: bool,
    /// Observed template length (signed).
    pub insert_size: i64,
    /// Raw `XV` tag value, if present.
    pub allele_tag: Option<u8>,
}

impl AlignedRead {
    /// Construct an unpaired forward-strand primary alignment.
    pub fn new(
        name: impl Into<Arc<str>>,
        tid: u32,
        pos: i64,
        mapq: u8,
        cigar: Vec<CigarOp>,
        sequence: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            name: name.into(),
            tid,
            pos,
            mapq,
            cigar,
            sequence: sequence.into(),
            is_reverse: false,
            is_secondary: false,
            is_read1: false,
            is_read2: false,
            insert_size: 0,
            allele_tag: None,
        }
    }

    /// Set the reverse-strand flag.
    pub fn reverse(mut self, is_reverse: bool) -> Self {
        self.is_reverse = is_reverse;
        self
    }

    /// Set the secondary flag.
    pub fn secondary(mut self, is_secondary: bool) -> Self {
        self.is_secondary = is_secondary;
        self
    }

    /// Mark the read as first (`true`) or second (`false`) of a pair.
    pub fn paired(mut self, first: bool, insert_size: i64) -> Self {
        self.is_read1 = first;
        self.is_read2 = !first;
        self.insert_size = insert_size;
        self
    }

    /// Attach an `XV` allele tag value.
    pub fn with_allele_tag(mut self, tag: u8) -> Self {
        self.allele_tag = Some(tag);
        self
    }

    /// Read length inferred from the sequence.
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    /// True if the read carries no bases.
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    /// End position (half-open) on the reference.
    pub fn end(&self) -> i64 {
        self.pos + crate::genomics::reference_span(&self.cigar) as i64
    }
}
