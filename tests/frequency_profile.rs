#[path = "common/mod.rs"]
mod common;

use bamquant::genomics::{
    nucleotide_alignment_frequencies, nucleotide_alignment_frequencies_in, BaseCode,
    FrequencyBuffers, InMemorySource, ProfilerConfig, Uniqueness,
};
use bamquant::QuantError;
use common::read;

const REFERENCE: &[u8] = b"ACGTTGCAACGTTGCA";

fn profile(source: &mut InMemorySource, ref_start: i64, buffers: &mut FrequencyBuffers) -> usize {
    let window = &REFERENCE[(ref_start - 1) as usize..];
    nucleotide_alignment_frequencies_in(
        source,
        window,
        0,
        ref_start,
        buffers,
        &ProfilerConfig::default(),
    )
    .expect("profiling succeeds")
}

#[test]
fn duplicate_read_ones_count_once() {
    let mut source = InMemorySource::new("mem", ["chr1"]).with_records([
        read("a", 2, "4M", b"GTTG").paired(true, 180),
        read("b", 2, "4M", b"GTTG").paired(true, 180),
    ]);
    let mut buffers = FrequencyBuffers::new(4, 200);
    profile(&mut source, 1, &mut buffers);
    assert_eq!(buffers.uniqueness, Uniqueness { unique: 1, total: 2 });
    assert_eq!(buffers.fragments.buckets()[179], 2);
    assert_eq!(buffers.uniqueness.ratio(), Some(0.5));
}

#[test]
fn mismatches_land_in_their_cycle() {
    let mut source = InMemorySource::new("mem", ["chr1"]).with_records([
        // mismatch at cycle 2: read A over reference G
        read("fwd", 0, "5M", b"ACATT").paired(true, 100),
        // reverse: 5' end is the last read base
        read("rev", 4, "2M1I2M", b"TGGCA").reverse(true).paired(false, -100),
    ]);
    let mut buffers = FrequencyBuffers::new(0, 10);
    let max_len = profile(&mut source, 1, &mut buffers);
    assert_eq!(max_len, 5);

    assert_eq!(buffers.read1.get(2, BaseCode::A, BaseCode::G), 1);
    assert_eq!(buffers.read1.get(0, BaseCode::A, BaseCode::A), 1);
    assert_eq!(buffers.read1.total(), 5);

    // rev covers reference 4..8 = T G C A, inserted base at read offset 2 is skipped
    assert_eq!(buffers.read2.get(4, BaseCode::T, BaseCode::T), 1);
    assert_eq!(buffers.read2.get(3, BaseCode::G, BaseCode::G), 1);
    assert_eq!(buffers.read2.get(1, BaseCode::C, BaseCode::C), 1);
    assert_eq!(buffers.read2.get(0, BaseCode::A, BaseCode::A), 1);
    assert_eq!(buffers.read2.total(), 4);
}

#[test]
fn repeated_calls_accumulate_across_regions() {
    let mut source = InMemorySource::new("mem", ["chr1"]).with_records([
        read("early", 0, "4M", b"ACGT").paired(true, 50),
        read("late", 9, "4M", b"CGTT").paired(true, 60),
    ]);
    let mut buffers = FrequencyBuffers::new(4, 100);

    // window starting at 1-based 1 contains both reads
    let first = profile(&mut source, 1, &mut buffers);
    // window starting at 1-based 6 contains only the late read
    let second = profile(&mut source, 6, &mut buffers);

    assert_eq!((first, second), (4, 4));
    assert_eq!(buffers.uniqueness, Uniqueness { unique: 3, total: 3 });
    assert_eq!(buffers.fragments.buckets()[49], 1);
    assert_eq!(buffers.fragments.buckets()[59], 2);
    assert_eq!(buffers.read1.total(), 12);
}

#[test]
fn empty_window_reports_zero_length() {
    let mut source = InMemorySource::new("mem", ["chr1"]).with_records([read("x", 0, "4M", b"ACGT")]);
    let mut buffers = FrequencyBuffers::default();
    let max_len = nucleotide_alignment_frequencies_in(
        &mut source,
        b"",
        0,
        1,
        &mut buffers,
        &ProfilerConfig::default(),
    )
    .expect("profiling succeeds");
    assert_eq!(max_len, 0);
    assert_eq!(buffers, FrequencyBuffers::default());
}

fn profile_window(source: &mut InMemorySource, window: &[u8]) -> FrequencyBuffers {
    let mut buffers = FrequencyBuffers::new(0, 10);
    nucleotide_alignment_frequencies_in(
        source,
        window,
        0,
        1,
        &mut buffers,
        &ProfilerConfig::default(),
    )
    .expect("profiling succeeds");
    buffers
}

const BASES: [BaseCode; 5] = [BaseCode::A, BaseCode::C, BaseCode::G, BaseCode::T, BaseCode::N];

fn counted_against(buffers: &FrequencyBuffers, reference: BaseCode) -> u32 {
    (0..buffers.read1.cycles())
        .flat_map(|cycle| BASES.iter().map(move |&read| (cycle, read)))
        .map(|(cycle, read)| buffers.read1.get(cycle, read, reference))
        .sum()
}

#[test]
fn deletions_shift_the_reference_but_not_the_cycle() {
    let mut source =
        InMemorySource::new("mem", ["chr1"]).with_records([read("del", 0, "2M2D2M", b"ACTT")]);
    let buffers = profile_window(&mut source, b"ACGTTA");

    assert_eq!(buffers.read1.get(0, BaseCode::A, BaseCode::A), 1);
    assert_eq!(buffers.read1.get(1, BaseCode::C, BaseCode::C), 1);
    assert_eq!(buffers.read1.get(2, BaseCode::T, BaseCode::T), 1);
    assert_eq!(buffers.read1.get(3, BaseCode::T, BaseCode::A), 1);
    assert_eq!(buffers.read1.total(), 4);
    // reference 2 (G) sits inside the deletion
    assert_eq!(counted_against(&buffers, BaseCode::G), 0);
}

#[test]
fn skipped_intron_on_reverse_strand() {
    let mut source = InMemorySource::new("mem", ["chr1"])
        .with_records([read("skip", 0, "2M3N2M", b"ACGC").reverse(true)]);
    let buffers = profile_window(&mut source, b"ACGTTAC");

    // cycles run from the last read base
    assert_eq!(buffers.read1.get(3, BaseCode::A, BaseCode::A), 1);
    assert_eq!(buffers.read1.get(2, BaseCode::C, BaseCode::C), 1);
    assert_eq!(buffers.read1.get(1, BaseCode::G, BaseCode::A), 1);
    assert_eq!(buffers.read1.get(0, BaseCode::C, BaseCode::C), 1);
    assert_eq!(buffers.read1.total(), 4);
    assert_eq!(buffers.read2.total(), 0);
    // reference 2..5 (G T T) is skipped
    assert_eq!(counted_against(&buffers, BaseCode::G), 0);
    assert_eq!(counted_against(&buffers, BaseCode::T), 0);
}

#[test]
fn invalid_start_is_reported_before_opening_the_file() {
    let mut buffers = FrequencyBuffers::default();
    let err = nucleotide_alignment_frequencies(
        "/nonexistent/reads.bam",
        b"ACGT",
        0,
        0,
        &mut buffers,
        &ProfilerConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, QuantError::InvalidParameter { name: "refStart", .. }));
    assert_eq!(buffers, FrequencyBuffers::default());
}
