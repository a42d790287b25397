//! Per-position event counting over a padded reference window.
//!
//! A [`PositionalEventCounter`] walks every alignment overlapping the window
//! and, at each aligned reference position marked in its [`TargetMask`],
//! lets an [`EventPolicy`] decide whether the observed read base counts
//! towards the total only, towards total and event, or not at all.
//!
//! Two policies are provided:
//!
//! - [`MethylationPolicy`]: bisulfite calls. Forward reads at marked C
//!   positions count C as methylated and T as unmethylated; reverse reads at
//!   marked G positions count G as methylated and A as unmethylated. Any
//!   other base is ignored entirely, so it lowers neither total nor event.
//! - [`ConcordancePolicy`]: matches on the strand not altered by conversion.
//!   Forward reads are checked at the G of each CpG, reverse reads at the C;
//!   every observed base counts towards the total.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::genomics::{
    AlignmentSource, AlignmentView, AlleleClass, BaseCode, CigarWalker, IndexedBamSource,
    PositionWindow, RecordHandler, Strand, TargetMask,
};
use crate::{MappingQualityRange, QuantError, DEFAULT_MAX_READ_LENGTH};

/// Which cytosines are counted and how strands are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethylationMode {
    /// CpG cytosines, `+` and `-` strand counts summed into one row.
    CpgCollapsed,
    /// CpG cytosines, strands reported separately.
    CpgStranded,
    /// All cytosines and guanines, strands reported separately.
    AllCytosines,
}

impl TryFrom<i64> for MethylationMode {
    type Error = QuantError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MethylationMode::CpgCollapsed),
            1 => Ok(MethylationMode::CpgStranded),
            2 => Ok(MethylationMode::AllCytosines),
            other => Err(QuantError::UnknownMode(other)),
        }
    }
}

impl MethylationMode {
    /// Numeric code (0, 1 or 2).
    pub fn code(self) -> u8 {
        match self {
            MethylationMode::CpgCollapsed => 0,
            MethylationMode::CpgStranded => 1,
            MethylationMode::AllCytosines => 2,
        }
    }

    fn mask(self, window: &PositionWindow, reference: &[u8]) -> TargetMask {
        match self {
            MethylationMode::CpgCollapsed | MethylationMode::CpgStranded => {
                TargetMask::cpg(window, reference)
            }
            MethylationMode::AllCytosines => TargetMask::all_cytosines(window, reference),
        }
    }
}

/// Options shared by the methylation and SNV analyses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethylationConfig {
    /// Target selection and strand reporting.
    pub mode: MethylationMode,
    /// Emit rows whose total is zero.
    pub keep_zero: bool,
    /// Accepted mapping qualities.
    pub mapq: MappingQualityRange,
    /// Padding on either side of the region, in bases.
    pub max_read_length: usize,
}

impl MethylationConfig {
    /// Configuration for `mode` with default options.
    pub fn new(mode: MethylationMode) -> Self {
        Self {
            mode,
            keep_zero: false,
            mapq: MappingQualityRange::full(),
            max_read_length: DEFAULT_MAX_READ_LENGTH,
        }
    }

    /// Configuration from a numeric mode, rejecting values other than 0, 1, 2.
    pub fn from_mode_code(mode: i64) -> Result<Self, QuantError> {
        Ok(Self::new(MethylationMode::try_from(mode)?))
    }

    /// Keep or suppress zero-coverage rows.
    pub fn with_keep_zero(mut self, keep_zero: bool) -> Self {
        self.keep_zero = keep_zero;
        self
    }

    /// Restrict mapping qualities.
    pub fn with_mapq(mut self, mapq: MappingQualityRange) -> Self {
        self.mapq = mapq;
        self
    }

    /// Override the window padding.
    pub fn with_max_read_length(mut self, max_read_length: usize) -> Self {
        self.max_read_length = max_read_length;
        self
    }
}

/// Reference window queried by the methylation family.
#[derive(Debug, Clone)]
pub struct ReferenceRegion {
    chrom: Arc<str>,
    start: i64,
    sequence: Arc<[u8]>,
}

impl ReferenceRegion {
    /// Validate a region given by its 1-based start and reference sequence.
    ///
    /// The region must start at or after position 1 and end within
    /// `chrom_len`.
    pub fn new(
        chrom: impl Into<Arc<str>>,
        chrom_len: i64,
        start: i64,
        sequence: impl Into<Arc<[u8]>>,
    ) -> Result<Self, QuantError> {
        let chrom = chrom.into();
        let sequence = sequence.into();
        if chrom.is_empty() {
            return Err(QuantError::invalid("regionChr", "must not be empty"));
        }
        if start < 1 {
            return Err(QuantError::invalid(
                "regionStart",
                format!("{start} is not a valid 1-based position"),
            ));
        }
        let end = start - 1 + sequence.len() as i64;
        if chrom_len < 0 || end > chrom_len {
            return Err(QuantError::invalid(
                "regionChrLen",
                format!("region ends at {end} beyond chromosome length {chrom_len}"),
            ));
        }
        Ok(Self {
            chrom,
            start: start - 1,
            sequence,
        })
    }

    /// Chromosome name.
    pub fn chrom(&self) -> &str {
        &self.chrom
    }

    /// 0-based inclusive start.
    pub fn start(&self) -> i64 {
        self.start
    }

    /// 0-based exclusive end.
    pub fn end(&self) -> i64 {
        self.start + self.sequence.len() as i64
    }

    /// Reference bases.
    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }
}

/// How an observed base at a marked position is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Not counted.
    Ignored,
    /// Counted in the total only.
    Total,
    /// Counted in the total and as an event.
    Event,
}

/// Counting rule applied at marked positions.
pub trait EventPolicy {
    /// Mask strand consulted for reads aligned to `read_strand`.
    fn mask_strand(&self, read_strand: Strand) -> Strand;

    /// Classify the observed base of a read aligned to `read_strand`.
    fn classify(&self, read_strand: Strand, observed: BaseCode) -> Observation;
}

/// Bisulfite conversion calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct MethylationPolicy;

impl EventPolicy for MethylationPolicy {
    fn mask_strand(&self, read_strand: Strand) -> Strand {
        read_strand
    }

    fn classify(&self, read_strand: Strand, observed: BaseCode) -> Observation {
        match (read_strand, observed) {
            (Strand::Plus, BaseCode::C) | (Strand::Minus, BaseCode::G) => Observation::Event,
            (Strand::Plus, BaseCode::T) | (Strand::Minus, BaseCode::A) => Observation::Total,
            _ => Observation::Ignored,
        }
    }
}

/// Sequence concordance on the unconverted strand.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConcordancePolicy;

impl EventPolicy for ConcordancePolicy {
    fn mask_strand(&self, read_strand: Strand) -> Strand {
        match read_strand {
            Strand::Plus => Strand::Minus,
            Strand::Minus => Strand::Plus,
        }
    }

    fn classify(&self, read_strand: Strand, observed: BaseCode) -> Observation {
        let expected = match read_strand {
            Strand::Plus => BaseCode::G,
            Strand::Minus => BaseCode::C,
        };
        if observed == expected {
            Observation::Event
        } else {
            Observation::Total
        }
    }
}

#[derive(Debug, Clone)]
struct Track {
    total: Vec<u32>,
    event: Vec<u32>,
}

impl Track {
    fn new(len: usize) -> Self {
        Self {
            total: vec![0; len],
            event: vec![0; len],
        }
    }
}

/// Counts at one window slot and strand, per allele bucket (R, U, A).
///
/// Unstratified counters keep everything in the first bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotCounts {
    /// Totals per bucket.
    pub total: [u32; AlleleClass::COUNT],
    /// Events per bucket.
    pub event: [u32; AlleleClass::COUNT],
}

impl SlotCounts {
    fn add(&self, other: &Self) -> Self {
        let mut sum = *self;
        for i in 0..AlleleClass::COUNT {
            sum.total[i] += other.total[i];
            sum.event[i] += other.event[i];
        }
        sum
    }

    /// Total over buckets.
    pub fn total_sum(&self) -> u32 {
        self.total.iter().sum()
    }

    /// Events over buckets.
    pub fn event_sum(&self) -> u32 {
        self.event.iter().sum()
    }
}

/// Fixed-window counter driven by a target mask and an [`EventPolicy`].
#[derive(Debug, Clone)]
pub struct PositionalEventCounter<P> {
    policy: P,
    window: PositionWindow,
    mask: TargetMask,
    mapq: MappingQualityRange,
    stratified: bool,
    // index: strand * buckets + bucket
    tracks: Vec<Track>,
    seen: u64,
    kept: u64,
}

impl<P: EventPolicy> PositionalEventCounter<P> {
    /// Counter over `window` restricted to `mask`.
    pub fn new(
        policy: P,
        window: PositionWindow,
        mask: TargetMask,
        mapq: MappingQualityRange,
        stratified: bool,
    ) -> Self {
        let buckets = if stratified { AlleleClass::COUNT } else { 1 };
        Self {
            policy,
            window,
            mask,
            mapq,
            stratified,
            tracks: (0..2 * buckets).map(|_| Track::new(window.len())).collect(),
            seen: 0,
            kept: 0,
        }
    }

    /// Window geometry.
    pub fn window(&self) -> &PositionWindow {
        &self.window
    }

    /// Target mask.
    pub fn mask(&self) -> &TargetMask {
        &self.mask
    }

    fn buckets(&self) -> usize {
        if self.stratified {
            AlleleClass::COUNT
        } else {
            1
        }
    }

    fn track_index(&self, strand: Strand, bucket: usize) -> usize {
        let strand_idx = match strand {
            Strand::Plus => 0,
            Strand::Minus => 1,
        };
        strand_idx * self.buckets() + bucket
    }

    /// Counts at window slot `idx` on `strand`.
    pub fn slot(&self, strand: Strand, idx: usize) -> SlotCounts {
        let mut counts = SlotCounts::default();
        for bucket in 0..self.buckets() {
            let track = &self.tracks[self.track_index(strand, bucket)];
            counts.total[bucket] = track.total.get(idx).copied().unwrap_or(0);
            counts.event[bucket] = track.event.get(idx).copied().unwrap_or(0);
        }
        counts
    }

    /// Counts at a 0-based genomic position, if inside the window.
    pub fn at(&self, strand: Strand, position: i64) -> Option<SlotCounts> {
        self.window.index_of(position).map(|idx| self.slot(strand, idx))
    }
}

impl<P: EventPolicy> RecordHandler for PositionalEventCounter<P> {
    fn handle<R: AlignmentView + ?Sized>(&mut self, record: &R) -> Result<(), QuantError> {
        self.seen += 1;
        if !self.mapq.contains(record.mapq()) {
            trace!(read = %record.read_name(), mapq = record.mapq(), "mapq outside range");
            return Ok(());
        }
        self.kept += 1;

        let bucket = if self.stratified {
            record.allele_class()?.index()
        } else {
            0
        };
        let read_strand = Strand::from_reverse(record.is_reverse());
        let mask_strand = self.policy.mask_strand(read_strand);
        let track_idx = self.track_index(mask_strand, bucket);

        let cigar = record.cigar_ops();
        for segment in CigarWalker::new(&cigar, record.reference_start()) {
            for (ref_pos, read_pos) in segment.aligned_pairs() {
                let Some(idx) = self.window.index_of(ref_pos) else {
                    continue;
                };
                if !self.mask.is_marked(mask_strand, idx) {
                    continue;
                }
                let track = &mut self.tracks[track_idx];
                match self.policy.classify(read_strand, record.base(read_pos)) {
                    Observation::Event => {
                        track.total[idx] += 1;
                        track.event[idx] += 1;
                    }
                    Observation::Total => track.total[idx] += 1,
                    Observation::Ignored => {}
                }
            }
        }
        Ok(())
    }
}

/// One row of the methylation table.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MethylationRow {
    /// Chromosome name.
    pub chrom: Arc<str>,
    /// 1-based position.
    pub position: i64,
    /// `'+'`, `'-'` or `'*'` for collapsed strands.
    pub strand: char,
    /// Informative observations.
    pub total: u32,
    /// Methylated observations.
    pub methylated: u32,
}

/// One row of the allele-stratified methylation table.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AllelicMethylationRow {
    /// Chromosome name.
    pub chrom: Arc<str>,
    /// 1-based position.
    pub position: i64,
    /// `'+'`, `'-'` or `'*'` for collapsed strands.
    pub strand: char,
    /// Totals for R, U, A.
    pub total: [u32; AlleleClass::COUNT],
    /// Methylated counts for R, U, A.
    pub methylated: [u32; AlleleClass::COUNT],
}

/// One row of the SNV concordance table.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct SnvRow {
    /// Chromosome name.
    pub chrom: Arc<str>,
    /// 1-based position.
    pub position: i64,
    /// Observations at the position.
    pub total: u32,
    /// Observations matching the reference.
    pub matches: u32,
}

/// Report rows in window order as `(slot, strand symbol, counts)`.
fn stranded_slots<P: EventPolicy>(
    counter: &PositionalEventCounter<P>,
    mode: MethylationMode,
    keep_zero: bool,
) -> Vec<(usize, char, SlotCounts)> {
    let window = counter.window();
    let mask = counter.mask();
    let mut rows = Vec::new();
    match mode {
        MethylationMode::CpgStranded | MethylationMode::AllCytosines => {
            for idx in window.region_indices() {
                for strand in [Strand::Plus, Strand::Minus] {
                    if !mask.is_marked(strand, idx) {
                        continue;
                    }
                    let counts = counter.slot(strand, idx);
                    if keep_zero || counts.total_sum() > 0 {
                        rows.push((idx, strand.symbol(), counts));
                    }
                }
            }
        }
        MethylationMode::CpgCollapsed => {
            for idx in window.region_indices() {
                if !mask.is_marked(Strand::Plus, idx) {
                    continue;
                }
                let counts = counter
                    .slot(Strand::Plus, idx)
                    .add(&counter.slot(Strand::Minus, idx + 1));
                if keep_zero || counts.total_sum() > 0 {
                    rows.push((idx, '*', counts));
                }
            }
        }
    }
    rows
}

fn accumulate<S, P>(
    source: &mut S,
    region: &ReferenceRegion,
    counter: &mut PositionalEventCounter<P>,
) -> Result<(), QuantError>
where
    S: AlignmentSource,
    P: EventPolicy,
{
    let tid = source.target_id(region.chrom())?;
    debug!(
        source = %source.describe(),
        chrom = region.chrom(),
        start = region.start(),
        end = region.end(),
        "fetching region"
    );
    source.fetch(tid, region.start(), region.end(), counter)
}

fn build_counter<P: EventPolicy>(
    policy: P,
    region: &ReferenceRegion,
    mode: MethylationMode,
    config: &MethylationConfig,
    stratified: bool,
) -> PositionalEventCounter<P> {
    let window = PositionWindow::new(
        region.start(),
        region.sequence().len(),
        config.max_read_length,
    );
    let mask = mode.mask(&window, region.sequence());
    PositionalEventCounter::new(policy, window, mask, config.mapq, stratified)
}

fn run_counter<S, P>(
    sources: &mut [S],
    region: &ReferenceRegion,
    counter: &mut PositionalEventCounter<P>,
) -> Result<(), QuantError>
where
    S: AlignmentSource,
    P: EventPolicy,
{
    for source in sources.iter_mut() {
        accumulate(source, region, counter)?;
    }
    info!(
        records = counter.seen,
        kept = counter.kept,
        chrom = region.chrom(),
        "positional counting finished"
    );
    Ok(())
}

fn open_all<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<IndexedBamSource>, QuantError> {
    if paths.is_empty() {
        return Err(QuantError::invalid("infiles", "at least one input file is required"));
    }
    paths.iter().map(IndexedBamSource::open).collect()
}

/// Quantify methylation over `region` from already opened sources.
pub fn quantify_methylation_in<S: AlignmentSource>(
    sources: &mut [S],
    region: &ReferenceRegion,
    config: &MethylationConfig,
) -> Result<Vec<MethylationRow>, QuantError> {
    let mut counter = build_counter(MethylationPolicy, region, config.mode, config, false);
    run_counter(sources, region, &mut counter)?;
    let chrom: Arc<str> = Arc::from(region.chrom());
    Ok(stranded_slots(&counter, config.mode, config.keep_zero)
        .into_iter()
        .map(|(idx, strand, counts)| MethylationRow {
            chrom: Arc::clone(&chrom),
            position: counter.window().one_based(idx),
            strand,
            total: counts.total_sum(),
            methylated: counts.event_sum(),
        })
        .collect())
}

/// Quantify methylation over `region` from indexed BAM files.
///
/// Files are processed one after another into the same counters; the first
/// failing file aborts the call.
pub fn quantify_methylation<P: AsRef<Path>>(
    paths: &[P],
    region: &ReferenceRegion,
    config: &MethylationConfig,
) -> Result<Vec<MethylationRow>, QuantError> {
    let mut sources = open_all(paths)?;
    quantify_methylation_in(&mut sources, region, config)
}

/// Allele-stratified methylation from already opened sources.
pub fn quantify_methylation_allele_in<S: AlignmentSource>(
    sources: &mut [S],
    region: &ReferenceRegion,
    config: &MethylationConfig,
) -> Result<Vec<AllelicMethylationRow>, QuantError> {
    let mut counter = build_counter(MethylationPolicy, region, config.mode, config, true);
    run_counter(sources, region, &mut counter)?;
    let chrom: Arc<str> = Arc::from(region.chrom());
    Ok(stranded_slots(&counter, config.mode, config.keep_zero)
        .into_iter()
        .map(|(idx, strand, counts)| AllelicMethylationRow {
            chrom: Arc::clone(&chrom),
            position: counter.window().one_based(idx),
            strand,
            total: counts.total,
            methylated: counts.event,
        })
        .collect())
}

/// Allele-stratified methylation from indexed BAM files.
pub fn quantify_methylation_allele<P: AsRef<Path>>(
    paths: &[P],
    region: &ReferenceRegion,
    config: &MethylationConfig,
) -> Result<Vec<AllelicMethylationRow>, QuantError> {
    let mut sources = open_all(paths)?;
    quantify_methylation_allele_in(&mut sources, region, config)
}

/// SNV concordance at CpG sites from already opened sources.
///
/// `config.mode` is ignored; targets are always both bases of every CpG.
pub fn detect_snvs_in<S: AlignmentSource>(
    sources: &mut [S],
    region: &ReferenceRegion,
    config: &MethylationConfig,
) -> Result<Vec<SnvRow>, QuantError> {
    let mode = MethylationMode::CpgStranded;
    let mut counter = build_counter(ConcordancePolicy, region, mode, config, false);
    run_counter(sources, region, &mut counter)?;
    let chrom: Arc<str> = Arc::from(region.chrom());
    let window = *counter.window();
    let mask = counter.mask();
    let mut rows = Vec::new();
    for idx in window.region_indices() {
        if !mask.is_marked(Strand::Plus, idx) && !mask.is_marked(Strand::Minus, idx) {
            continue;
        }
        let counts = counter
            .slot(Strand::Plus, idx)
            .add(&counter.slot(Strand::Minus, idx));
        if config.keep_zero || counts.total_sum() > 0 {
            rows.push(SnvRow {
                chrom: Arc::clone(&chrom),
                position: window.one_based(idx),
                total: counts.total_sum(),
                matches: counts.event_sum(),
            });
        }
    }
    Ok(rows)
}

/// SNV concordance at CpG sites from indexed BAM files.
pub fn detect_snvs<P: AsRef<Path>>(
    paths: &[P],
    region: &ReferenceRegion,
    config: &MethylationConfig,
) -> Result<Vec<SnvRow>, QuantError> {
    let mut sources = open_all(paths)?;
    detect_snvs_in(&mut sources, region, config)
}
