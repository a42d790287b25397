use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use bamquant::genomics::{
    count_junctions_in, detect_snvs, nucleotide_alignment_frequencies_in, quantify_methylation,
    quantify_methylation_allele, write_allelic_methylation, write_frequencies, write_junctions,
    write_methylation, write_snvs, AlignmentSource, FrequencyBuffers, IndexedBamSource,
    JunctionConfig, MethylationConfig, ProfilerConfig, QueryRegion, ReferenceRegion,
};
use bamquant::{MappingQualityRange, DEFAULT_MAX_READ_LENGTH};
use clap::{Args, Parser, Subcommand};
use rust_htslib::faidx;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "bamquant",
    about = "Junction, methylation, SNV and per-cycle frequency counts from indexed BAM files"
)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct MapqArgs {
    /// Minimum mapping quality (inclusive).
    #[arg(long, default_value_t = 0)]
    mapq_min: i64,
    /// Maximum mapping quality (inclusive).
    #[arg(long, default_value_t = 255)]
    mapq_max: i64,
}

impl MapqArgs {
    fn range(&self) -> Result<MappingQualityRange> {
        Ok(MappingQualityRange::new(self.mapq_min, self.mapq_max)?)
    }
}

#[derive(Args, Debug)]
struct PositionalArgs {
    /// Indexed BAM files, processed in order into shared counters.
    #[arg(required = true)]
    bams: Vec<PathBuf>,
    /// Reference FASTA holding the region's chromosome.
    #[arg(long)]
    reference: PathBuf,
    /// Region as `chrom` or `chrom:start-end` (1-based, inclusive).
    #[arg(long)]
    region: String,
    /// Report rows with zero coverage.
    #[arg(long)]
    keep_zero: bool,
    /// Window padding on either side of the region.
    #[arg(long, default_value_t = DEFAULT_MAX_READ_LENGTH)]
    max_read_length: usize,
    #[command(flatten)]
    mapq: MapqArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Count spliced junctions in one or more regions.
    Junctions {
        /// Indexed BAM file.
        bam: PathBuf,
        /// Region as `chrom` or `chrom:start-end` (1-based, inclusive); repeatable.
        #[arg(long = "region", required = true)]
        regions: Vec<String>,
        /// Stratify counts by the XV allele tag.
        #[arg(long)]
        allelic: bool,
        /// Skip secondary alignments.
        #[arg(long)]
        no_secondary: bool,
        #[command(flatten)]
        mapq: MapqArgs,
    },
    /// Count methylated and unmethylated cytosines per position.
    Methylation {
        #[command(flatten)]
        common: PositionalArgs,
        /// 0: CpG, strands collapsed; 1: CpG, stranded; 2: all cytosines, stranded.
        #[arg(long, default_value_t = 0)]
        mode: i64,
        /// Stratify counts by the XV allele tag.
        #[arg(long)]
        allelic: bool,
    },
    /// Count reference concordance at CpG sites on the unconverted strand.
    Snvs {
        #[command(flatten)]
        common: PositionalArgs,
    },
    /// Per-cycle nucleotide frequencies, fragment lengths and duplicate estimate.
    Frequencies {
        /// Indexed BAM file.
        bam: PathBuf,
        /// Reference FASTA holding the region's chromosome.
        #[arg(long)]
        reference: PathBuf,
        /// Region as `chrom` or `chrom:start-end` (1-based, inclusive).
        #[arg(long)]
        region: String,
        /// Maximum number of alignments sampled for the duplicate estimate.
        #[arg(long, default_value_t = bamquant::genomics::DEFAULT_SAMPLING_CAP)]
        sampling_cap: usize,
        /// Number of fragment-length buckets.
        #[arg(long, default_value_t = 1000)]
        histogram_len: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Junctions {
            bam,
            regions,
            allelic,
            no_secondary,
            mapq,
        } => run_junctions(&bam, &regions, allelic, !no_secondary, &mapq)?,
        Commands::Methylation {
            common,
            mode,
            allelic,
        } => run_methylation(&common, mode, allelic)?,
        Commands::Snvs { common } => run_snvs(&common)?,
        Commands::Frequencies {
            bam,
            reference,
            region,
            sampling_cap,
            histogram_len,
        } => run_frequencies(&bam, &reference, &region, sampling_cap, histogram_len)?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// `chrom` or `chrom:start-end`, 1-based inclusive coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RegionArg {
    chrom: String,
    span: Option<(i64, i64)>,
}

fn parse_region(text: &str) -> Result<RegionArg> {
    let Some((chrom, range)) = text.rsplit_once(':') else {
        return Ok(RegionArg {
            chrom: text.to_string(),
            span: None,
        });
    };
    let (start, end) = range
        .split_once('-')
        .ok_or_else(|| anyhow!("region '{text}' should look like chrom:start-end"))?;
    let parse = |value: &str| -> Result<i64> {
        value
            .replace(',', "")
            .parse()
            .with_context(|| format!("invalid coordinate '{value}' in region '{text}'"))
    };
    let (start, end) = (parse(start)?, parse(end)?);
    if start < 1 || end < start {
        bail!("region '{text}' must satisfy 1 <= start <= end");
    }
    Ok(RegionArg {
        chrom: chrom.to_string(),
        span: Some((start, end)),
    })
}

/// Indexed FASTA reader and the length of `chrom` from its `.fai`.
///
/// htslib writes the `.fai` next to an uncompressed FASTA when it is missing.
fn open_reference(path: &Path, chrom: &str) -> Result<(faidx::Reader, i64)> {
    let reader = faidx::Reader::from_path(path)
        .with_context(|| format!("failed to open reference {}", path.display()))?;
    let mut fai = path.as_os_str().to_owned();
    fai.push(".fai");
    let index = std::fs::read_to_string(&fai)
        .with_context(|| format!("failed to read FASTA index for {}", path.display()))?;
    for line in index.lines() {
        let mut fields = line.split('\t');
        if fields.next() == Some(chrom) {
            let length = fields
                .next()
                .unwrap_or_default()
                .parse()
                .with_context(|| format!("malformed FASTA index entry for '{chrom}'"))?;
            return Ok((reader, length));
        }
    }
    bail!("'{chrom}' not found in {}", path.display())
}

fn load_region(reference: &Path, region: &str) -> Result<ReferenceRegion> {
    let region = parse_region(region)?;
    let (reader, chrom_len) = open_reference(reference, &region.chrom)?;
    let (start, end) = region.span.unwrap_or((1, chrom_len));
    if end > chrom_len {
        bail!(
            "region end {end} exceeds length {chrom_len} of '{}'",
            region.chrom
        );
    }
    if end < start {
        bail!("empty region on '{}'", region.chrom);
    }
    let sequence: Vec<u8> = reader
        .fetch_seq(&region.chrom, (start - 1) as usize, (end - 1) as usize)
        .with_context(|| format!("failed to fetch {}:{start}-{end}", region.chrom))?
        .iter()
        .map(u8::to_ascii_uppercase)
        .collect();
    if sequence.len() as i64 != end - start + 1 {
        bail!(
            "fetched {} bases for {}:{start}-{end}",
            sequence.len(),
            region.chrom
        );
    }
    Ok(ReferenceRegion::new(
        region.chrom.as_str(),
        chrom_len,
        start,
        sequence,
    )?)
}

fn run_junctions(
    bam: &Path,
    regions: &[String],
    allelic: bool,
    include_secondary: bool,
    mapq: &MapqArgs,
) -> Result<()> {
    let config = JunctionConfig::default()
        .with_allelic(allelic)
        .with_include_secondary(include_secondary)
        .with_mapq(mapq.range()?);
    let mut source = IndexedBamSource::open(bam)?;

    let mut queries = Vec::with_capacity(regions.len());
    for text in regions {
        let region = parse_region(text)?;
        let tid = source.target_id(&region.chrom)?;
        let (start, end) = match region.span {
            Some((start, end)) => (start - 1, end),
            None => (0, i64::from(i32::MAX)),
        };
        queries.push(QueryRegion::new(tid, start, end));
    }

    let counts = count_junctions_in(&mut source, &queries, &config)
        .with_context(|| format!("junction counting failed for {}", bam.display()))?;
    let mut out = BufWriter::new(io::stdout().lock());
    write_junctions(&mut out, &counts)
}

fn positional_config(common: &PositionalArgs, config: MethylationConfig) -> Result<MethylationConfig> {
    Ok(config
        .with_keep_zero(common.keep_zero)
        .with_mapq(common.mapq.range()?)
        .with_max_read_length(common.max_read_length))
}

fn run_methylation(common: &PositionalArgs, mode: i64, allelic: bool) -> Result<()> {
    let config = positional_config(common, MethylationConfig::from_mode_code(mode)?)?;
    let region = load_region(&common.reference, &common.region)?;
    let mut out = BufWriter::new(io::stdout().lock());
    if allelic {
        let rows = quantify_methylation_allele(&common.bams, &region, &config)
            .context("allele-specific methylation counting failed")?;
        write_allelic_methylation(&mut out, &rows)
    } else {
        let rows = quantify_methylation(&common.bams, &region, &config)
            .context("methylation counting failed")?;
        write_methylation(&mut out, &rows)
    }
}

fn run_snvs(common: &PositionalArgs) -> Result<()> {
    let config = positional_config(common, MethylationConfig::from_mode_code(1)?)?;
    let region = load_region(&common.reference, &common.region)?;
    let rows = detect_snvs(&common.bams, &region, &config).context("SNV detection failed")?;
    let mut out = BufWriter::new(io::stdout().lock());
    write_snvs(&mut out, &rows)
}

fn run_frequencies(
    bam: &Path,
    reference: &Path,
    region: &str,
    sampling_cap: usize,
    histogram_len: usize,
) -> Result<()> {
    let region = load_region(reference, region)?;
    let mut source = IndexedBamSource::open(bam)?;
    let tid = source.target_id(region.chrom())?;
    let mut buffers = FrequencyBuffers::new(0, histogram_len);
    let config = ProfilerConfig::default().with_sampling_cap(sampling_cap);
    let max_len = nucleotide_alignment_frequencies_in(
        &mut source,
        region.sequence(),
        tid,
        region.start() + 1,
        &mut buffers,
        &config,
    )
    .with_context(|| format!("frequency profiling failed for {}", bam.display()))?;
    let mut out = BufWriter::new(io::stdout().lock());
    write_frequencies(&mut out, &buffers, max_len)
}
