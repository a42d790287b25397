use std::path::{Path, PathBuf};

use rust_htslib::bam::{self, Read, Record};
use tracing::debug;

use crate::genomics::{AlignedRead, AlignmentView};
use crate::QuantError;

/// Per-record callback driven by [`AlignmentSource::fetch`].
pub trait RecordHandler {
    /// Process one overlapping alignment record.
    fn handle<R: AlignmentView + ?Sized>(&mut self, record: &R) -> Result<(), QuantError>;
}

/// A query interval on one target: 0-based inclusive start, exclusive end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryRegion {
    /// Target id in the file header.
    pub tid: u32,
    /// 0-based inclusive start.
    pub start: i64,
    /// 0-based exclusive end.
    pub end: i64,
}

impl QueryRegion {
    /// Construct a region.
    pub fn new(tid: u32, start: i64, end: i64) -> Self {
        Self { tid, start, end }
    }
}

/// Random-access provider of alignment records.
pub trait AlignmentSource {
    /// Human-readable identification used in error messages.
    fn describe(&self) -> String;

    /// Number of targets in the header.
    fn target_count(&self) -> u32;

    /// Name of target `tid`.
    fn target_name(&self, tid: u32) -> Result<String, QuantError>;

    /// Target id for `name`.
    fn target_id(&self, name: &str) -> Result<u32, QuantError> {
        for tid in 0..self.target_count() {
            if self.target_name(tid)? == name {
                return Ok(tid);
            }
        }
        Err(QuantError::TargetNotFound {
            target: name.to_string(),
            path: self.describe(),
        })
    }

    /// Invoke `handler` once per record overlapping `[start, end)` on `tid`.
    ///
    /// The first handler error aborts the fetch and is returned.
    fn fetch<H: RecordHandler>(
        &mut self,
        tid: u32,
        start: i64,
        end: i64,
        handler: &mut H,
    ) -> Result<(), QuantError>;
}

/// Indexed BAM file read through htslib.
pub struct IndexedBamSource {
    path: PathBuf,
    reader: bam::IndexedReader,
}

impl std::fmt::Debug for IndexedBamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexedBamSource")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl IndexedBamSource {
    /// Open `path` and load its index.
    ///
    /// Distinguishes an unreadable file, an empty header and a missing index.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, QuantError> {
        let path = path.as_ref().to_path_buf();
        let plain = bam::Reader::from_path(&path).map_err(|source| QuantError::OpenFailed {
            path: path.clone(),
            source,
        })?;
        if plain.header().target_count() == 0 {
            return Err(QuantError::EmptyHeader { path });
        }
        drop(plain);

        let reader =
            bam::IndexedReader::from_path(&path).map_err(|source| QuantError::IndexUnavailable {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), "opened indexed BAM");
        Ok(Self { path, reader })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AlignmentSource for IndexedBamSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn target_count(&self) -> u32 {
        self.reader.header().target_count()
    }

    fn target_name(&self, tid: u32) -> Result<String, QuantError> {
        let n_targets = self.target_count();
        if tid >= n_targets {
            return Err(QuantError::TargetIdOutOfRange { tid, n_targets });
        }
        Ok(String::from_utf8_lossy(self.reader.header().tid2name(tid)).into_owned())
    }

    fn fetch<H: RecordHandler>(
        &mut self,
        tid: u32,
        start: i64,
        end: i64,
        handler: &mut H,
    ) -> Result<(), QuantError> {
        let n_targets = self.target_count();
        if tid >= n_targets {
            return Err(QuantError::TargetIdOutOfRange { tid, n_targets });
        }
        self.reader.fetch((tid, start, end))?;
        let mut record = Record::new();
        while let Some(result) = self.reader.read(&mut record) {
            result?;
            handler.handle(&record)?;
        }
        Ok(())
    }
}

/// Records held in memory, fetched with indexed-reader overlap semantics.
///
/// A record overlaps `[start, end)` when its reference span intersects the
/// interval; zero-span records overlap when their start lies inside it.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    name: String,
    targets: Vec<String>,
    records: Vec<AlignedRead>,
}

impl InMemorySource {
    /// Create a source with the given target names and no records.
    pub fn new<I, S>(name: impl Into<String>, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            targets: targets.into_iter().map(Into::into).collect(),
            records: Vec::new(),
        }
    }

    /// Add records; their relative order is the fetch order.
    pub fn with_records(mut self, records: impl IntoIterator<Item = AlignedRead>) -> Self {
        self.records.extend(records);
        self
    }

    /// Stored records.
    pub fn records(&self) -> &[AlignedRead] {
        &self.records
    }

    /// Target names in header order.
    pub fn targets(&self) -> &[String] {
        &self.targets
    }
}

impl AlignmentSource for InMemorySource {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn target_count(&self) -> u32 {
        self.targets.len() as u32
    }

    fn target_name(&self, tid: u32) -> Result<String, QuantError> {
        self.targets
            .get(tid as usize)
            .cloned()
            .ok_or(QuantError::TargetIdOutOfRange {
                tid,
                n_targets: self.target_count(),
            })
    }

    fn fetch<H: RecordHandler>(
        &mut self,
        tid: u32,
        start: i64,
        end: i64,
        handler: &mut H,
    ) -> Result<(), QuantError> {
        let n_targets = self.target_count();
        if tid >= n_targets {
            return Err(QuantError::TargetIdOutOfRange { tid, n_targets });
        }
        for record in self.records.iter().filter(|r| r.tid == tid) {
            let read_end = record.end().max(record.pos + 1);
            if record.pos < end && read_end > start {
                handler.handle(record)?;
            }
        }
        Ok(())
    }
}
