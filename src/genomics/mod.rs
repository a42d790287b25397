//! Alignment-record views, CIGAR walking and the counting analyses built on
//! top of them.
//!
//! Every analysis is a [`RecordHandler`] driven by an [`AlignmentSource`]
//! fetch: junction counting, per-position methylation and SNV concordance,
//! and per-cycle nucleotide frequencies.

mod bases;
mod cigar;
mod frequencies;
mod io;
mod junctions;
mod methylation;
mod record;
mod report;
mod source;
mod types;
mod window;

pub use bases::{BaseCode, ALPHABET_SIZE};
pub use cigar::{query_length, reference_span, CigarSegment, CigarWalker};
pub use frequencies::{
    nucleotide_alignment_frequencies, nucleotide_alignment_frequencies_in, FragmentHistogram,
    FrequencyBuffers, FrequencyMatrix, FrequencyProfiler, ProfilerConfig, Uniqueness,
    CELLS_PER_CYCLE, DEFAULT_SAMPLING_CAP,
};
pub use io::write_indexed_bam;
pub use junctions::{
    count_junctions, count_junctions_in, AllelicJunctionRow, JunctionAccumulator, JunctionConfig,
    JunctionCounts, JunctionKey,
};
pub use methylation::{
    detect_snvs, detect_snvs_in, quantify_methylation, quantify_methylation_allele,
    quantify_methylation_allele_in, quantify_methylation_in, AllelicMethylationRow,
    ConcordancePolicy, EventPolicy, MethylationConfig, MethylationMode, MethylationPolicy,
    MethylationRow, Observation, PositionalEventCounter, ReferenceRegion, SlotCounts, SnvRow,
};
pub use record::{cigar_op_from_htslib, cigar_op_to_htslib, AlignmentView, ALLELE_TAG};
pub use report::{
    render_allelic_methylation, render_frequencies, render_junctions, render_methylation,
    render_snvs, write_allelic_methylation, write_frequencies, write_junctions,
    write_methylation, write_snvs,
};
pub use source::{AlignmentSource, InMemorySource, IndexedBamSource, QueryRegion, RecordHandler};
pub use types::{AlignedRead, AlleleClass, CigarOp, CigarOpKind, Strand};
pub use window::{PositionWindow, TargetMask};
