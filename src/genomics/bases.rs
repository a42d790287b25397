/// Number of nucleotide symbols tracked by the counters (A, C, G, T, N).
pub const ALPHABET_SIZE: usize = 5;

/// Nucleotide codes shared by reads and reference windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseCode {
    /// Adenine.
    A = 0,
    /// Cytosine.
    C = 1,
    /// Guanine.
    G = 2,
    /// Thymine/Uracil.
    T = 3,
    /// Ambiguous or unrecognised base.
    N = 4,
}

impl BaseCode {
    /// All codes in index order.
    pub const ALL: [BaseCode; ALPHABET_SIZE] =
        [BaseCode::A, BaseCode::C, BaseCode::G, BaseCode::T, BaseCode::N];

    /// Decode an ASCII base; anything outside ACGTU collapses to `N`.
    pub fn from_ascii(base: u8) -> Self {
        match base {
            b'A' | b'a' => BaseCode::A,
            b'C' | b'c' => BaseCode::C,
            b'G' | b'g' => BaseCode::G,
            b'T' | b't' | b'U' | b'u' => BaseCode::T,
            _ => BaseCode::N,
        }
    }

    /// Decode the 4-bit BAM nucleotide encoding (`=ACMGRSVTWYHKDBN`).
    ///
    /// Only the unambiguous codes 1, 2, 4 and 8 map to A, C, G and T.
    pub fn from_nt16(code: u8) -> Self {
        match code {
            1 => BaseCode::A,
            2 => BaseCode::C,
            4 => BaseCode::G,
            8 => BaseCode::T,
            _ => BaseCode::N,
        }
    }

    /// Index into counter tables.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Uppercase ASCII symbol.
    pub fn to_ascii(self) -> u8 {
        match self {
            BaseCode::A => b'A',
            BaseCode::C => b'C',
            BaseCode::G => b'G',
            BaseCode::T => b'T',
            BaseCode::N => b'N',
        }
    }

    /// Code for a table index, if in range.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nt16_decoding_matches_bam_alphabet() {
        assert_eq!(BaseCode::from_nt16(1), BaseCode::A);
        assert_eq!(BaseCode::from_nt16(2), BaseCode::C);
        assert_eq!(BaseCode::from_nt16(4), BaseCode::G);
        assert_eq!(BaseCode::from_nt16(8), BaseCode::T);
        assert_eq!(BaseCode::from_nt16(15), BaseCode::N);
        assert_eq!(BaseCode::from_nt16(3), BaseCode::N); // M
    }

    #[test]
    fn ascii_decoding_is_case_insensitive() {
        assert_eq!(BaseCode::from_ascii(b'c'), BaseCode::C);
        assert_eq!(BaseCode::from_ascii(b'G'), BaseCode::G);
        assert_eq!(BaseCode::from_ascii(b'-'), BaseCode::N);
        assert_eq!(BaseCode::from_index(3), Some(BaseCode::T));
        assert_eq!(BaseCode::from_index(5), None);
    }
}
