#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use bamquant::genomics::{AlignedRead, CigarOp};

fn snapshot_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("snapshots")
}

pub fn assert_snapshot(name: &str, actual: &str) {
    let path = snapshot_root().join(name);
    if std::env::var("BAMQUANT_UPDATE_SNAPSHOTS").is_ok() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create snapshot directory");
        }
        fs::write(&path, actual).expect("write snapshot");
        return;
    }

    let expected =
        fs::read_to_string(&path).unwrap_or_else(|_| panic!("snapshot {:?} not found", path));
    if normalize(&expected) != normalize(actual) {
        panic!(
            "Snapshot mismatch for {:?}. Set BAMQUANT_UPDATE_SNAPSHOTS=1 to regenerate.\nExpected:\n{}\nActual:\n{}",
            path,
            expected,
            actual
        );
    }
}

fn normalize(input: &str) -> String {
    input.replace("\r\n", "\n")
}

/// Forward-strand read on target 0 with mapq 60.
pub fn read(name: &str, pos: i64, cigar: &str, seq: &[u8]) -> AlignedRead {
    let ops = CigarOp::parse_all(cigar).expect("valid CIGAR");
    AlignedRead::new(name, 0, pos, 60, ops, seq.to_vec())
}

/// Read of `len` copies of `base` for tests that only care about geometry.
pub fn filler(name: &str, pos: i64, cigar: &str) -> AlignedRead {
    let ops = CigarOp::parse_all(cigar).expect("valid CIGAR");
    let len = bamquant::genomics::query_length(&ops);
    AlignedRead::new(name, 0, pos, 60, ops, vec![b'A'; len])
}
