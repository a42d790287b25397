use anyhow::{Context, Result};
use rust_htslib::bam::{self, header::Header, header::HeaderRecord, record::Aux, record::CigarString};
use std::path::Path;

use super::{cigar_op_to_htslib, AlignedRead, ALLELE_TAG};

const FLAG_PAIRED: u16 = 0x1;
const FLAG_REVERSE: u16 = 0x10;
const FLAG_READ1: u16 = 0x40;
const FLAG_READ2: u16 = 0x80;
const FLAG_SECONDARY: u16 = 0x100;

fn build_header(targets: &[(&str, u64)]) -> Header {
    let mut header = Header::new();

    let mut hd = HeaderRecord::new(b"HD");
    hd.push_tag(b"VN", &"1.6");
    hd.push_tag(b"SO", &"coordinate");
    header.push_record(&hd);

    for (name, length) in targets {
        let mut sq = HeaderRecord::new(b"SQ");
        sq.push_tag(b"SN", name);
        sq.push_tag(b"LN", &(*length as i64));
        header.push_record(&sq);
    }
    header
}

fn flags(read: &AlignedRead) -> u16 {
    let mut flags = 0;
    if read.is_read1 || read.is_read2 {
        flags |= FLAG_PAIRED;
    }
    if read.is_read1 {
        flags |= FLAG_READ1;
    }
    if read.is_read2 {
        flags |= FLAG_READ2;
    }
    if read.is_reverse {
        flags |= FLAG_REVERSE;
    }
    if read.is_secondary {
        flags |= FLAG_SECONDARY;
    }
    flags
}

fn to_record(read: &AlignedRead) -> Result<bam::Record> {
    let cigar = CigarString(read.cigar.iter().map(cigar_op_to_htslib).collect());
    let quals = vec![30u8; read.sequence.len()];
    let mut record = bam::Record::new();
    record.set(read.name.as_bytes(), Some(&cigar), &read.sequence, &quals);
    record.set_tid(read.tid as i32);
    record.set_pos(read.pos);
    record.set_mtid(-1);
    record.set_mpos(-1);
    record.set_mapq(read.mapq);
    record.set_flags(flags(read));
    record.set_insert_size(read.insert_size);
    if let Some(tag) = read.allele_tag {
        record
            .push_aux(ALLELE_TAG, Aux::Char(tag))
            .with_context(|| format!("failed to attach allele tag to read '{}'", read.name))?;
    }
    Ok(record)
}

/// Write `reads` into a coordinate-sorted BAM at `output_path` and build its
/// `.bai` index next to it.
///
/// `targets` lists `(name, length)` pairs in header order; each read's `tid`
/// indexes into it.
pub fn write_indexed_bam<P: AsRef<Path>>(
    output_path: P,
    targets: &[(&str, u64)],
    reads: &[AlignedRead],
) -> Result<()> {
    let path = output_path.as_ref();
    let header = build_header(targets);

    let mut sorted: Vec<&AlignedRead> = reads.iter().collect();
    sorted.sort_by_key(|read| (read.tid, read.pos));

    {
        let mut writer = bam::Writer::from_path(path, &header, bam::Format::Bam)
            .with_context(|| format!("failed to create BAM '{}'", path.display()))?;
        for read in sorted {
            writer.write(&to_record(read)?)?;
        }
    }

    bam::index::build(path, None, bam::index::Type::Bai, 1)
        .with_context(|| format!("failed to index BAM '{}'", path.display()))?;
    Ok(())
}
