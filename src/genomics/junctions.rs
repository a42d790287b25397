//! Spliced-junction counting.
//!
//! Every reference-skip (`N`) segment of an alignment becomes a
//! [`JunctionKey`] of its first and last intronic base (1-based, inclusive)
//! and the alignment strand. Counts are kept per allele bucket when
//! allele-stratified counting is enabled.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::genomics::{
    AlignmentSource, AlignmentView, AlleleClass, CigarOpKind, CigarWalker, IndexedBamSource,
    QueryRegion, RecordHandler, Strand,
};
use crate::{MappingQualityRange, QuantError};

/// Identity of a spliced junction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JunctionKey {
    /// Chromosome name.
    pub chrom: Arc<str>,
    /// First intronic base (1-based).
    pub first: i64,
    /// Last intronic base (1-based, inclusive).
    pub last: i64,
    /// Alignment strand.
    pub strand: Strand,
}

impl fmt::Display for JunctionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.chrom,
            self.first,
            self.last,
            self.strand.symbol()
        )
    }
}

/// Options for junction counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JunctionConfig {
    /// Stratify counts by the `XV` allele tag.
    pub allelic: bool,
    /// Count secondary alignments.
    pub include_secondary: bool,
    /// Accepted mapping qualities.
    pub mapq: MappingQualityRange,
}

impl Default for JunctionConfig {
    fn default() -> Self {
        Self {
            allelic: false,
            include_secondary: true,
            mapq: MappingQualityRange::full(),
        }
    }
}

impl JunctionConfig {
    /// Enable or disable allele-stratified counting.
    pub fn with_allelic(mut self, allelic: bool) -> Self {
        self.allelic = allelic;
        self
    }

    /// Include or skip secondary alignments.
    pub fn with_include_secondary(mut self, include: bool) -> Self {
        self.include_secondary = include;
        self
    }

    /// Restrict mapping qualities.
    pub fn with_mapq(mut self, mapq: MappingQualityRange) -> Self {
        self.mapq = mapq;
        self
    }
}

/// Junction occurrence counts, one map per allele bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JunctionCounts {
    allelic: bool,
    buckets: [HashMap<JunctionKey, u32>; AlleleClass::COUNT],
}

/// One row of the allele-stratified junction table.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AllelicJunctionRow {
    /// Junction identifier.
    pub id: String,
    /// Count on the reference allele.
    pub r: u32,
    /// Count on unclassified reads.
    pub u: u32,
    /// Count on the alternative allele.
    pub a: u32,
}

impl JunctionCounts {
    fn new(allelic: bool) -> Self {
        Self {
            allelic,
            buckets: Default::default(),
        }
    }

    /// Whether counts are allele-stratified.
    pub fn is_allelic(&self) -> bool {
        self.allelic
    }

    fn increment(&mut self, allele: AlleleClass, key: JunctionKey) {
        *self.buckets[allele.index()].entry(key).or_insert(0) += 1;
    }

    /// Counts recorded for one allele bucket.
    pub fn bucket(&self, allele: AlleleClass) -> &HashMap<JunctionKey, u32> {
        &self.buckets[allele.index()]
    }

    /// Count for `key` in `allele`'s bucket (zero if absent).
    pub fn count(&self, allele: AlleleClass, key: &JunctionKey) -> u32 {
        self.bucket(allele).get(key).copied().unwrap_or(0)
    }

    /// Count for `key` summed over all buckets.
    pub fn total(&self, key: &JunctionKey) -> u32 {
        AlleleClass::ALL.iter().map(|&a| self.count(a, key)).sum()
    }

    /// Union of keys across buckets.
    pub fn keys(&self) -> BTreeSet<&JunctionKey> {
        self.buckets.iter().flat_map(|b| b.keys()).collect()
    }

    /// Number of distinct junctions.
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    /// True if no junction was observed.
    pub fn is_empty(&self) -> bool {
        self.buckets.iter().all(HashMap::is_empty)
    }

    /// Flat `{junction → count}` mapping, ordered by identifier text.
    ///
    /// For allelic counts this is the sum over buckets.
    pub fn unstratified(&self) -> BTreeMap<String, u32> {
        self.keys()
            .into_iter()
            .map(|key| (key.to_string(), self.total(key)))
            .collect()
    }

    /// Allele-stratified table over the union of keys, zero-filled.
    pub fn allelic_rows(&self) -> Vec<AllelicJunctionRow> {
        let ids: BTreeMap<String, &JunctionKey> = self
            .keys()
            .into_iter()
            .map(|key| (key.to_string(), key))
            .collect();
        ids.into_iter()
            .map(|(id, key)| AllelicJunctionRow {
                id,
                r: self.count(AlleleClass::Reference, key),
                u: self.count(AlleleClass::Unknown, key),
                a: self.count(AlleleClass::Alternative, key),
            })
            .collect()
    }
}

/// Per-record handler accumulating junction counts.
#[derive(Debug)]
pub struct JunctionAccumulator {
    config: JunctionConfig,
    chrom: Arc<str>,
    counts: JunctionCounts,
    seen: u64,
    kept: u64,
}

impl JunctionAccumulator {
    /// Create an empty accumulator.
    pub fn new(config: JunctionConfig) -> Self {
        Self {
            config,
            chrom: Arc::from(""),
            counts: JunctionCounts::new(config.allelic),
            seen: 0,
            kept: 0,
        }
    }

    /// Set the chromosome name used for subsequent keys.
    pub fn set_chromosome(&mut self, chrom: impl Into<Arc<str>>) {
        self.chrom = chrom.into();
    }

    /// Accumulated counts.
    pub fn counts(&self) -> &JunctionCounts {
        &self.counts
    }

    /// Consume the accumulator and return its counts.
    pub fn into_counts(self) -> JunctionCounts {
        self.counts
    }

    fn passes_filters<R: AlignmentView + ?Sized>(&self, record: &R) -> bool {
        if !self.config.mapq.contains(record.mapq()) {
            trace!(read = %record.read_name(), mapq = record.mapq(), "mapq outside range");
            return false;
        }
        if record.is_secondary() && !self.config.include_secondary {
            trace!(read = %record.read_name(), "secondary alignment skipped");
            return false;
        }
        true
    }
}

impl RecordHandler for JunctionAccumulator {
    fn handle<R: AlignmentView + ?Sized>(&mut self, record: &R) -> Result<(), QuantError> {
        self.seen += 1;
        if !self.passes_filters(record) {
            return Ok(());
        }
        self.kept += 1;

        let allele = if self.config.allelic {
            record.allele_class()?
        } else {
            AlleleClass::Unknown
        };
        let strand = Strand::from_reverse(record.is_reverse());

        let cigar = record.cigar_ops();
        for segment in CigarWalker::new(&cigar, record.reference_start()) {
            if segment.kind != CigarOpKind::Skip {
                continue;
            }
            let key = JunctionKey {
                chrom: Arc::clone(&self.chrom),
                first: segment.ref_pos + 1,
                last: segment.ref_pos + i64::from(segment.len),
                strand,
            };
            self.counts.increment(allele, key);
        }
        Ok(())
    }
}

/// Count junctions over `regions` of an already opened source.
pub fn count_junctions_in<S: AlignmentSource>(
    source: &mut S,
    regions: &[QueryRegion],
    config: &JunctionConfig,
) -> Result<JunctionCounts, QuantError> {
    let mut accumulator = JunctionAccumulator::new(*config);
    for region in regions {
        let chrom = source.target_name(region.tid)?;
        debug!(%chrom, start = region.start, end = region.end, "counting junctions");
        accumulator.set_chromosome(chrom);
        source.fetch(region.tid, region.start, region.end, &mut accumulator)?;
    }
    info!(
        records = accumulator.seen,
        kept = accumulator.kept,
        junctions = accumulator.counts.len(),
        "junction counting finished"
    );
    Ok(accumulator.into_counts())
}

/// Count junctions in the indexed BAM at `path`.
pub fn count_junctions<P: AsRef<Path>>(
    path: P,
    regions: &[QueryRegion],
    config: &JunctionConfig,
) -> Result<JunctionCounts, QuantError> {
    let mut source = IndexedBamSource::open(path)?;
    count_junctions_in(&mut source, regions, config)
}
