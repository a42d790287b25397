//! Per-cycle nucleotide alignment frequencies.
//!
//! Only alignments lying entirely inside the reference window contribute, so
//! every counted base can be attributed to a sequencing cycle. Counters live
//! in caller-owned [`FrequencyBuffers`] and accumulate across calls, which
//! lets callers aggregate several regions or files by calling repeatedly.

use std::path::Path;

use tracing::{debug, info, trace};

use crate::genomics::{
    query_length, reference_span, AlignmentSource, AlignmentView, BaseCode, CigarOpKind, CigarWalker,
    IndexedBamSource, RecordHandler, ALPHABET_SIZE,
};
use crate::QuantError;

/// Cells in the read-base × reference-base block of one cycle.
pub const CELLS_PER_CYCLE: usize = ALPHABET_SIZE * ALPHABET_SIZE;

/// Default number of uniqueness keys sampled per call.
pub const DEFAULT_SAMPLING_CAP: usize = 1_000_000;

/// Cycle-major confusion matrix.
///
/// The cell for `(cycle, read base, reference base)` lives at
/// `cycle * 25 + read * 5 + reference`. Storage grows when a longer read is
/// seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FrequencyMatrix {
    counts: Vec<u32>,
}

impl FrequencyMatrix {
    /// Zeroed matrix pre-sized for `cycles` cycles.
    pub fn with_cycles(cycles: usize) -> Self {
        Self {
            counts: vec![0; cycles * CELLS_PER_CYCLE],
        }
    }

    /// Flat index of a cell.
    #[inline]
    pub fn index(cycle: usize, read: BaseCode, reference: BaseCode) -> usize {
        cycle * CELLS_PER_CYCLE + read.index() * ALPHABET_SIZE + reference.index()
    }

    /// Number of cycles currently allocated.
    pub fn cycles(&self) -> usize {
        self.counts.len() / CELLS_PER_CYCLE
    }

    /// Count one observation.
    pub fn increment(&mut self, cycle: usize, read: BaseCode, reference: BaseCode) {
        let idx = Self::index(cycle, read, reference);
        if idx >= self.counts.len() {
            self.counts.resize((cycle + 1) * CELLS_PER_CYCLE, 0);
        }
        self.counts[idx] += 1;
    }

    /// Count stored for a cell; unallocated cycles read as zero.
    pub fn get(&self, cycle: usize, read: BaseCode, reference: BaseCode) -> u32 {
        self.counts
            .get(Self::index(cycle, read, reference))
            .copied()
            .unwrap_or(0)
    }

    /// Flat storage in index order.
    pub fn as_slice(&self) -> &[u32] {
        &self.counts
    }

    /// Sum over all cells.
    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    /// Non-zero cells as `(cycle, read base, reference base, count)` in index order.
    pub fn nonzero(&self) -> impl Iterator<Item = (usize, BaseCode, BaseCode, u32)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(idx, &count)| {
                let cycle = idx / CELLS_PER_CYCLE;
                let cell = idx % CELLS_PER_CYCLE;
                let base = |i: usize| BaseCode::from_index(i).unwrap_or(BaseCode::N);
                (cycle, base(cell / ALPHABET_SIZE), base(cell % ALPHABET_SIZE), count)
            })
    }
}

/// Fragment-length histogram indexed by `|insert size| - 1`.
///
/// Lengths at or beyond the histogram length saturate into the last bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FragmentHistogram {
    buckets: Vec<u32>,
}

impl FragmentHistogram {
    /// Zeroed histogram with `len` buckets.
    pub fn new(len: usize) -> Self {
        Self {
            buckets: vec![0; len],
        }
    }

    /// Record one insert size; zero sizes and empty histograms are ignored.
    pub fn record(&mut self, insert_size: i64) {
        let size = insert_size.unsigned_abs() as usize;
        if size == 0 || self.buckets.is_empty() {
            return;
        }
        let last = self.buckets.len() - 1;
        let bucket = if size < self.buckets.len() { size - 1 } else { last };
        self.buckets[bucket] += 1;
    }

    /// Bucket counts.
    pub fn buckets(&self) -> &[u32] {
        &self.buckets
    }

    /// Number of recorded fragments.
    pub fn total(&self) -> u64 {
        self.buckets.iter().map(|&c| c as u64).sum()
    }
}

/// Duplicate estimate: distinct `(position, insert size)` keys over sampled keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Uniqueness {
    /// Distinct keys.
    pub unique: u64,
    /// Sampled keys.
    pub total: u64,
}

impl Uniqueness {
    /// Fraction of sampled alignments with a distinct key; `None` before sampling.
    pub fn ratio(&self) -> Option<f64> {
        (self.total > 0).then(|| self.unique as f64 / self.total as f64)
    }
}

/// Caller-owned counters filled by the profiler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FrequencyBuffers {
    /// Matrix for first reads and unpaired reads.
    pub read1: FrequencyMatrix,
    /// Matrix for second reads.
    pub read2: FrequencyMatrix,
    /// Fragment-length histogram.
    pub fragments: FragmentHistogram,
    /// Duplicate estimate.
    pub uniqueness: Uniqueness,
}

impl FrequencyBuffers {
    /// Buffers pre-sized for `cycles` cycles and `histogram_len` fragment buckets.
    pub fn new(cycles: usize, histogram_len: usize) -> Self {
        Self {
            read1: FrequencyMatrix::with_cycles(cycles),
            read2: FrequencyMatrix::with_cycles(cycles),
            fragments: FragmentHistogram::new(histogram_len),
            uniqueness: Uniqueness::default(),
        }
    }
}

/// Profiler options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfilerConfig {
    /// Maximum number of uniqueness keys collected per call.
    pub sampling_cap: usize,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            sampling_cap: DEFAULT_SAMPLING_CAP,
        }
    }
}

impl ProfilerConfig {
    /// Set the uniqueness sampling cap.
    pub fn with_sampling_cap(mut self, sampling_cap: usize) -> Self {
        self.sampling_cap = sampling_cap;
        self
    }
}

/// Record handler filling [`FrequencyBuffers`] for one reference window.
#[derive(Debug)]
pub struct FrequencyProfiler<'a> {
    reference: &'a [u8],
    start: i64,
    buffers: &'a mut FrequencyBuffers,
    sampling_cap: usize,
    keys: Vec<(i64, i64)>,
    max_len: usize,
    seen: u64,
    contained: u64,
}

impl<'a> FrequencyProfiler<'a> {
    /// Profiler over `reference`, whose first base sits at 0-based `start`.
    pub fn new(
        reference: &'a [u8],
        start: i64,
        buffers: &'a mut FrequencyBuffers,
        config: &ProfilerConfig,
    ) -> Self {
        Self {
            reference,
            start,
            buffers,
            sampling_cap: config.sampling_cap,
            keys: Vec::new(),
            max_len: 0,
            seen: 0,
            contained: 0,
        }
    }

    /// 0-based exclusive end of the window.
    pub fn end(&self) -> i64 {
        self.start + self.reference.len() as i64
    }

    /// Fold sampled keys into the uniqueness counter and return the longest
    /// query length seen, 0 when no alignment qualified.
    pub fn finish(mut self) -> usize {
        self.keys.sort_unstable();
        let total = self.keys.len() as u64;
        self.keys.dedup();
        self.buffers.uniqueness.unique += self.keys.len() as u64;
        self.buffers.uniqueness.total += total;
        info!(
            records = self.seen,
            contained = self.contained,
            max_len = self.max_len,
            "frequency profiling finished"
        );
        self.max_len
    }
}

/// Reference base at 0-based `position` of a window starting at `start`.
fn reference_base(reference: &[u8], start: i64, position: i64) -> Option<BaseCode> {
    let offset = usize::try_from(position - start).ok()?;
    reference.get(offset).map(|&b| BaseCode::from_ascii(b))
}

impl RecordHandler for FrequencyProfiler<'_> {
    fn handle<R: AlignmentView + ?Sized>(&mut self, record: &R) -> Result<(), QuantError> {
        self.seen += 1;
        let cigar = record.cigar_ops();
        let pos = record.reference_start();
        let end = pos + reference_span(&cigar) as i64;
        if pos < self.start || end > self.end() {
            trace!(read = %record.read_name(), pos, end, "alignment not contained in window");
            return Ok(());
        }
        self.contained += 1;

        if !record.is_read2() && self.keys.len() < self.sampling_cap {
            self.keys.push((pos, record.insert_size()));
        }

        let qlen = query_length(&cigar);
        self.max_len = self.max_len.max(qlen);

        if record.is_read1() && record.insert_size() != 0 {
            self.buffers.fragments.record(record.insert_size());
        }

        let reverse = record.is_reverse();
        let (window, start) = (self.reference, self.start);
        let matrix = if record.is_read2() {
            &mut self.buffers.read2
        } else {
            &mut self.buffers.read1
        };
        'walk: for segment in CigarWalker::new(&cigar, pos) {
            match segment.kind {
                CigarOpKind::Match => {
                    for (ref_pos, read_pos) in segment.aligned_pairs() {
                        let Some(reference) = reference_base(window, start, ref_pos) else {
                            break 'walk;
                        };
                        let cycle = if reverse {
                            qlen.saturating_sub(1 + read_pos)
                        } else {
                            read_pos
                        };
                        matrix.increment(cycle, record.base(read_pos), reference);
                    }
                }
                CigarOpKind::Deletion => {
                    let last = segment.ref_pos + segment.len as i64 - 1;
                    if segment.len > 0 && reference_base(window, start, last).is_none() {
                        break 'walk;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// 0-based window start from a 1-based reference start.
fn window_start(ref_start: i64) -> Result<i64, QuantError> {
    if ref_start < 1 {
        return Err(QuantError::invalid(
            "refStart",
            format!("{ref_start} is not a valid 1-based position"),
        ));
    }
    Ok(ref_start - 1)
}

/// Profile alignments on `tid` within `reference` from an open source.
///
/// `ref_start` is the 1-based position of the first reference base. Returns
/// the longest query length among contained alignments (0 if none).
pub fn nucleotide_alignment_frequencies_in<S: AlignmentSource>(
    source: &mut S,
    reference: &[u8],
    tid: u32,
    ref_start: i64,
    buffers: &mut FrequencyBuffers,
    config: &ProfilerConfig,
) -> Result<usize, QuantError> {
    let start = window_start(ref_start)?;
    let end = start + reference.len() as i64;
    debug!(source = %source.describe(), tid, start, end, "fetching region");
    let mut profiler = FrequencyProfiler::new(reference, start, buffers, config);
    source.fetch(tid, start, end, &mut profiler)?;
    Ok(profiler.finish())
}

/// Profile alignments from an indexed BAM file.
pub fn nucleotide_alignment_frequencies<P: AsRef<Path>>(
    path: P,
    reference: &[u8],
    tid: u32,
    ref_start: i64,
    buffers: &mut FrequencyBuffers,
    config: &ProfilerConfig,
) -> Result<usize, QuantError> {
    window_start(ref_start)?;
    let mut source = IndexedBamSource::open(path)?;
    nucleotide_alignment_frequencies_in(&mut source, reference, tid, ref_start, buffers, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomics::{AlignedRead, CigarOp, InMemorySource};

    fn read(name: &str, pos: i64, cigar: &str, seq: &[u8]) -> AlignedRead {
        AlignedRead::new(name, 0, pos, 60, CigarOp::parse_all(cigar).unwrap(), seq.to_vec())
    }

    fn profile(records: Vec<AlignedRead>, reference: &[u8], ref_start: i64) -> (usize, FrequencyBuffers) {
        let mut source = InMemorySource::new("mem", ["chr1"]).with_records(records);
        let mut buffers = FrequencyBuffers::new(4, 10);
        let max_len = nucleotide_alignment_frequencies_in(
            &mut source,
            reference,
            0,
            ref_start,
            &mut buffers,
            &ProfilerConfig::default(),
        )
        .unwrap();
        (max_len, buffers)
    }

    #[test]
    fn forward_reads_fill_cycle_major_matrix() {
        // window 10..18
        let (max_len, buffers) = profile(vec![read("f", 10, "4M", b"ACTT")], b"ACGTACGT", 11);
        assert_eq!(max_len, 4);
        assert_eq!(buffers.read1.get(0, BaseCode::A, BaseCode::A), 1);
        assert_eq!(buffers.read1.get(1, BaseCode::C, BaseCode::C), 1);
        assert_eq!(buffers.read1.get(2, BaseCode::T, BaseCode::G), 1);
        assert_eq!(buffers.read1.get(3, BaseCode::T, BaseCode::T), 1);
        assert_eq!(buffers.read1.total(), 4);
        assert_eq!(buffers.read2.total(), 0);
        assert_eq!(FrequencyMatrix::index(2, BaseCode::T, BaseCode::G), 2 * 25 + 3 * 5 + 2);
    }

    #[test]
    fn reverse_reads_count_from_the_three_prime_end() {
        let record = read("r", 10, "1S3M", b"NCGT").reverse(true).paired(false, -200);
        let (max_len, buffers) = profile(vec![record], b"ACGTACGT", 11);
        assert_eq!(max_len, 4);
        // read offset 1 aligns to ref 10 (A), cycle 4 - 1 - 1 = 2
        assert_eq!(buffers.read2.get(2, BaseCode::C, BaseCode::A), 1);
        assert_eq!(buffers.read2.get(0, BaseCode::T, BaseCode::G), 1);
        assert_eq!(buffers.read1.total(), 0);
    }

    #[test]
    fn partially_overlapping_reads_are_skipped() {
        let (max_len, buffers) = profile(
            vec![read("left", 8, "4M", b"AAAA"), read("right", 16, "4M", b"AAAA")],
            b"ACGTACGT",
            11,
        );
        assert_eq!(max_len, 0);
        assert_eq!(buffers.read1.total(), 0);
        assert_eq!(buffers.uniqueness, Uniqueness::default());
    }

    #[test]
    fn identical_keys_count_once() {
        let a = read("a", 10, "4M", b"ACGT").paired(true, 150);
        let b = read("b", 10, "4M", b"ACGT").paired(true, 150);
        let (_, buffers) = profile(vec![a, b], b"ACGTACGT", 11);
        assert_eq!(buffers.uniqueness, Uniqueness { unique: 1, total: 2 });
        assert_eq!(buffers.fragments.buckets()[9], 2);
    }

    #[test]
    fn second_reads_skip_uniqueness_and_fragments() {
        let mate = read("m", 12, "4M", b"GTAC").paired(false, -150);
        let (_, buffers) = profile(vec![mate], b"ACGTACGT", 11);
        assert_eq!(buffers.uniqueness.total, 0);
        assert_eq!(buffers.fragments.total(), 0);
        assert_eq!(buffers.read2.total(), 4);
    }

    #[test]
    fn sampling_cap_bounds_keys() {
        let records: Vec<_> = (0..5).map(|i| read(&format!("r{i}"), 10 + i, "2M", b"AC")).collect();
        let mut source = InMemorySource::new("mem", ["chr1"]).with_records(records);
        let mut buffers = FrequencyBuffers::default();
        nucleotide_alignment_frequencies_in(
            &mut source,
            b"ACGTACGT",
            0,
            11,
            &mut buffers,
            &ProfilerConfig::default().with_sampling_cap(3),
        )
        .unwrap();
        assert_eq!(buffers.uniqueness, Uniqueness { unique: 3, total: 3 });
        assert!(buffers.read1.cycles() >= 2);
    }

    #[test]
    fn histogram_saturates() {
        let mut histogram = FragmentHistogram::new(3);
        histogram.record(1);
        histogram.record(-2);
        histogram.record(3);
        histogram.record(500);
        histogram.record(0);
        assert_eq!(histogram.buckets(), &[1, 1, 2]);
    }

    #[test]
    fn matrix_grows_on_demand() {
        let mut matrix = FrequencyMatrix::with_cycles(1);
        matrix.increment(5, BaseCode::G, BaseCode::N);
        assert_eq!(matrix.cycles(), 6);
        assert_eq!(matrix.get(5, BaseCode::G, BaseCode::N), 1);
        assert_eq!(matrix.get(50, BaseCode::G, BaseCode::N), 0);
        let cells: Vec<_> = matrix.nonzero().collect();
        assert_eq!(cells, vec![(5, BaseCode::G, BaseCode::N, 1)]);
    }

    #[test]
    fn buffers_accumulate_across_calls() {
        let mut source =
            InMemorySource::new("mem", ["chr1"]).with_records([read("f", 10, "4M", b"ACGT")]);
        let mut buffers = FrequencyBuffers::new(4, 0);
        for _ in 0..2 {
            nucleotide_alignment_frequencies_in(
                &mut source,
                b"ACGTACGT",
                0,
                11,
                &mut buffers,
                &ProfilerConfig::default(),
            )
            .unwrap();
        }
        assert_eq!(buffers.read1.get(0, BaseCode::A, BaseCode::A), 2);
        assert_eq!(buffers.uniqueness, Uniqueness { unique: 2, total: 2 });
    }

    #[test]
    fn invalid_start_is_rejected() {
        let mut source = InMemorySource::new("mem", ["chr1"]);
        let err = nucleotide_alignment_frequencies_in(
            &mut source,
            b"A",
            0,
            0,
            &mut FrequencyBuffers::default(),
            &ProfilerConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, QuantError::InvalidParameter { name: "refStart", .. }));
    }
}
