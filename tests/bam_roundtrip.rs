#[path = "common/mod.rs"]
mod common;

use bamquant::genomics::{
    count_junctions, count_junctions_in, detect_snvs, detect_snvs_in,
    nucleotide_alignment_frequencies, nucleotide_alignment_frequencies_in,
    quantify_methylation, quantify_methylation_allele, quantify_methylation_allele_in,
    quantify_methylation_in, write_indexed_bam, AlignedRead, AlignmentSource, FrequencyBuffers,
    InMemorySource, IndexedBamSource, JunctionConfig, MethylationConfig, MethylationMode,
    ProfilerConfig, QueryRegion, ReferenceRegion,
};
use bamquant::QuantError;
use common::read;
use rust_htslib::bam;
use tempfile::TempDir;

const TARGETS: [(&str, u64); 2] = [("chr7", 5_000), ("chr8", 5_000)];
const REFERENCE: &[u8] = b"TTCGATCGGACGTCCGA";

fn fixture_reads() -> Vec<AlignedRead> {
    vec![
        read("f2", 1000, "17M", b"TTCGATCGGATGTCCGA")
            .with_allele_tag(b'A')
            .paired(true, 240),
        read("f1", 1000, "8M", b"TTCGATTA")
            .with_allele_tag(b'R')
            .paired(true, 240),
        read("r1", 1001, "8M", b"TCGATCAG")
            .reverse(true)
            .with_allele_tag(b'U')
            .paired(false, -240),
        read("s1", 1002, "2S3M20N4M", b"NNCGAGTCC")
            .with_allele_tag(b'R')
            .secondary(true),
        AlignedRead {
            tid: 1,
            ..read("other", 10, "4M2N4M", b"ACGTACGT").with_allele_tag(b'U')
        },
    ]
}

fn write_fixture(dir: &TempDir) -> std::path::PathBuf {
    let path = dir.path().join("sample.bam");
    write_indexed_bam(&path, &TARGETS, &fixture_reads()).expect("fixture BAM is written");
    path
}

fn memory() -> InMemorySource {
    InMemorySource::new("mem", TARGETS.iter().map(|(name, _)| *name)).with_records(fixture_reads())
}

fn region() -> ReferenceRegion {
    ReferenceRegion::new("chr7", 5_000, 1001, REFERENCE.to_vec()).expect("valid region")
}

#[test]
fn header_and_targets_survive_the_round_trip() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_fixture(&dir);
    let source = IndexedBamSource::open(&path).expect("BAM opens");
    assert_eq!(source.target_count(), 2);
    assert_eq!(source.target_id("chr8").expect("chr8 present"), 1);
    assert!(matches!(
        source.target_id("chrUn"),
        Err(QuantError::TargetNotFound { .. })
    ));
}

#[test]
fn junctions_match_in_memory_counts() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_fixture(&dir);
    let regions = [QueryRegion::new(0, 0, 5_000), QueryRegion::new(1, 0, 5_000)];
    for allelic in [false, true] {
        let config = JunctionConfig::default().with_allelic(allelic);
        let from_bam = count_junctions(&path, &regions, &config).expect("BAM counting");
        let from_memory =
            count_junctions_in(&mut memory(), &regions, &config).expect("memory counting");
        assert_eq!(from_bam.unstratified(), from_memory.unstratified());
        assert_eq!(from_bam.allelic_rows(), from_memory.allelic_rows());
    }
    let flat = count_junctions(&path, &regions, &JunctionConfig::default())
        .expect("BAM counting")
        .unstratified();
    assert_eq!(flat.get("chr7:1006:1025:+"), Some(&1));
    assert_eq!(flat.get("chr8:15:16:+"), Some(&1));
}

#[test]
fn methylation_and_snvs_match_in_memory_counts() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_fixture(&dir);
    let paths = [path.as_path()];
    for mode in [
        MethylationMode::CpgCollapsed,
        MethylationMode::CpgStranded,
        MethylationMode::AllCytosines,
    ] {
        let config = MethylationConfig::new(mode).with_keep_zero(true);
        assert_eq!(
            quantify_methylation(&paths, &region(), &config).expect("BAM methylation"),
            quantify_methylation_in(&mut [memory()], &region(), &config).expect("memory methylation"),
        );
        assert_eq!(
            quantify_methylation_allele(&paths, &region(), &config).expect("BAM allelic"),
            quantify_methylation_allele_in(&mut [memory()], &region(), &config)
                .expect("memory allelic"),
        );
    }
    let config = MethylationConfig::new(MethylationMode::CpgStranded);
    assert_eq!(
        detect_snvs(&paths, &region(), &config).expect("BAM snvs"),
        detect_snvs_in(&mut [memory()], &region(), &config).expect("memory snvs"),
    );
}

#[test]
fn frequencies_match_in_memory_counts() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_fixture(&dir);
    let config = ProfilerConfig::default();

    let mut from_bam = FrequencyBuffers::new(0, 500);
    let bam_len =
        nucleotide_alignment_frequencies(&path, REFERENCE, 0, 1001, &mut from_bam, &config)
            .expect("BAM profiling");
    let mut from_memory = FrequencyBuffers::new(0, 500);
    let memory_len = nucleotide_alignment_frequencies_in(
        &mut memory(),
        REFERENCE,
        0,
        1001,
        &mut from_memory,
        &config,
    )
    .expect("memory profiling");

    assert_eq!(bam_len, 17);
    assert_eq!(bam_len, memory_len);
    assert_eq!(from_bam, from_memory);
    assert_eq!(from_bam.fragments.buckets()[239], 2);
}

#[test]
fn missing_index_is_reported() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_fixture(&dir);
    let index = path.with_extension("bam.bai");
    std::fs::remove_file(&index).expect("index removed");
    let err = IndexedBamSource::open(&path).unwrap_err();
    assert!(matches!(err, QuantError::IndexUnavailable { .. }), "{err}");
}

#[test]
fn empty_header_is_reported() {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("empty.bam");
    {
        let header = bam::Header::new();
        bam::Writer::from_path(&path, &header, bam::Format::Bam).expect("writer opens");
    }
    let err = IndexedBamSource::open(&path).unwrap_err();
    assert!(matches!(err, QuantError::EmptyHeader { .. }), "{err}");
}

#[test]
fn every_listed_file_must_open() {
    let dir = TempDir::new().expect("temp dir");
    let path = write_fixture(&dir);
    let missing = dir.path().join("missing.bam");
    let config = MethylationConfig::new(MethylationMode::CpgStranded);
    let err = quantify_methylation(&[path.as_path(), missing.as_path()], &region(), &config)
        .unwrap_err();
    assert!(matches!(err, QuantError::OpenFailed { .. }), "{err}");
}
