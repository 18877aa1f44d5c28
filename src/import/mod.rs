//! Bulk import of external feature records into a new track.
//!
//! An import walks a fixed sequence of states:
//!
//! ```text
//! New -> Staging -> Normalized -> Sorted -> Partitioned -> Published
//! ```
//!
//! Any state before `Published` can move to `Canceled`, which discards every
//! block written so far. Nothing becomes visible to readers until the single
//! `publish_track` call at the end.

pub mod overlay;
pub mod partition;
pub mod progress;
pub mod record;

pub use progress::{
    ChannelProgress, LogProgress, NoProgress, ProgressEvent, ProgressFn, ProgressSink,
    ScaledProgress,
};
pub use record::RawRecord;

use crate::attributes::Attributes;
use crate::config::ImportConfig;
use crate::error::{RecordProblem, Result, TrackError};
use crate::index::{BlockIndex, BlockKey};
use crate::sequence::SequenceNameResolver;
use crate::store::{BlockStore, TrackMeta};
use crate::{DatasetId, FeatureKind, SequenceId, Strand, TrackId};
use record::{Interner, Row, StagedRecord};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Borrowed fields of one raw record. Empty strings mean "not given".
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureFields<'a> {
    pub sequence_name: &'a str,
    pub strand: &'a str,
    pub start: &'a str,
    pub end: &'a str,
    pub position: &'a str,
    pub value: &'a str,
    pub name: &'a str,
    pub common_name: &'a str,
    pub gene_type: &'a str,
    /// Matrix row values
    pub values: &'a [f64],
}

/// Receives raw records one at a time
pub trait FeatureProcessor {
    fn process(&mut self, fields: &FeatureFields<'_>) -> Result<()>;
}

/// Pushes raw records into a processor. An error from the processor must
/// stop the source and be returned unchanged.
pub trait FeatureSource {
    fn process_features(&mut self, processor: &mut dyn FeatureProcessor) -> Result<()>;

    /// Expected number of records, if known up front
    fn size_hint(&self) -> Option<u64> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportState {
    New,
    Staging,
    Normalized,
    Sorted,
    Partitioned,
    Published,
    Canceled,
}

impl ImportState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ImportState::Published | ImportState::Canceled)
    }
}

/// Shared flag for canceling an import from another thread
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// Progress checkpoints on the 0..=100 scale
const STAGING_START: u64 = 10;
const STAGING_END: u64 = 70;
const NORMALIZED: u64 = 75;
const SORTED: u64 = 80;
const PARTITION_END: u64 = 95;

/// Builds one track from a feature source
pub struct ImportPipeline {
    store: Arc<dyn BlockStore>,
    dataset: DatasetId,
    name: String,
    kind: FeatureKind,
    attributes: Attributes,
    config: ImportConfig,
    columns: usize,
    state: ImportState,
    track: Option<TrackId>,
    sequence_names: Interner,
    strand_names: Interner,
    staged: Vec<StagedRecord>,
    rows: Vec<Row>,
    index: BlockIndex,
    value_range: Option<(f64, f64)>,
    progress: Box<dyn ProgressSink>,
    cancel: CancelToken,
}

impl ImportPipeline {
    pub fn new(store: Arc<dyn BlockStore>, dataset: DatasetId, name: &str, kind: FeatureKind) -> Self {
        Self {
            store,
            dataset,
            name: name.to_string(),
            kind,
            attributes: Attributes::new(),
            config: ImportConfig::default(),
            columns: 0,
            state: ImportState::New,
            track: None,
            sequence_names: Interner::default(),
            strand_names: Interner::default(),
            staged: Vec::new(),
            rows: Vec::new(),
            index: BlockIndex::new(),
            value_range: None,
            progress: Box::new(NoProgress),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_config(mut self, config: ImportConfig) -> Self {
        self.config = config;
        self
    }

    /// Matrix column count. Left at 0, the first record decides.
    pub fn with_columns(mut self, columns: usize) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_progress(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.progress = Box::new(sink);
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn state(&self) -> ImportState {
        self.state
    }

    /// Id reserved for the new track, once staging has begun
    pub fn track_id(&self) -> Option<TrackId> {
        self.track
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn index(&self) -> &BlockIndex {
        &self.index
    }

    /// Drive every transition in order and return the published track's id
    pub fn run(
        mut self,
        source: &mut dyn FeatureSource,
        resolver: &SequenceNameResolver,
    ) -> Result<TrackId> {
        let started = Instant::now();
        info!(track = %self.name, kind = %self.kind, "import started");
        self.stage(source)?;
        self.normalize(resolver)?;
        self.sort()?;
        self.partition()?;
        let id = self.publish()?;
        info!(
            track = %self.name,
            id = %id,
            features = self.index.feature_count(),
            blocks = self.index.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "import finished"
        );
        Ok(id)
    }

    /// New -> Staging: accept raw records as they come
    pub fn stage(&mut self, source: &mut dyn FeatureSource) -> Result<()> {
        self.step(ImportState::New, ImportState::Staging, |this| {
            this.report(0, "starting import");
            this.track = Some(this.store.begin_track(this.dataset)?);
            this.report(STAGING_START, "reading records");

            let mut stager = Stager {
                kind: this.kind,
                columns: &mut this.columns,
                interval: this.config.progress_interval as u64,
                expected: source.size_hint(),
                count: 0,
                staged: &mut this.staged,
                sequence_names: &mut this.sequence_names,
                strand_names: &mut this.strand_names,
                problems: Vec::new(),
                progress: &mut this.progress,
                cancel: &this.cancel,
            };
            let read = source.process_features(&mut stager);
            let Stager {
                count,
                mut problems,
                ..
            } = stager;
            // problems found by the source join the ones found here
            match read {
                Ok(()) => {}
                Err(TrackError::MalformedRecords(unreadable)) => problems.extend(unreadable),
                Err(TrackError::MalformedRecord(problem)) => problems.push(problem),
                Err(e) => return Err(e),
            }
            if !problems.is_empty() {
                problems.sort_by_key(|problem| problem.record);
                return Err(TrackError::MalformedRecords(problems));
            }
            debug!(records = count, "staged records");
            this.report(STAGING_END, format!("read {count} records"));
            Ok(())
        })
    }

    /// Staging -> Normalized: canonical strands and sequence ids
    pub fn normalize(&mut self, resolver: &SequenceNameResolver) -> Result<()> {
        self.step(ImportState::Staging, ImportState::Normalized, |this| {
            let strands = this.resolve_strands()?;
            let sequences = this.resolve_sequences(resolver)?;
            this.rows = std::mem::take(&mut this.staged)
                .into_iter()
                .map(|record| Row {
                    sequence: sequences[record.sequence as usize],
                    strand: strands[record.strand as usize],
                    start: record.start,
                    end: record.end,
                    payload: record.payload,
                })
                .collect();
            this.report(NORMALIZED, "sequence names resolved");
            Ok(())
        })
    }

    /// Normalized -> Sorted
    pub fn sort(&mut self) -> Result<()> {
        self.step(ImportState::Normalized, ImportState::Sorted, |this| {
            this.rows.sort_by_key(Row::sort_key);
            this.report(SORTED, "records sorted");
            Ok(())
        })
    }

    /// Sorted -> Partitioned: cut each (sequence, strand) run into bounded
    /// blocks and write them to the store
    pub fn partition(&mut self) -> Result<()> {
        self.step(ImportState::Sorted, ImportState::Partitioned, |this| {
            let track = this.track.ok_or_else(|| TrackError::storage("no track reserved"))?;
            let max = this.config.max_block_features.max(1);
            let total = partition::block_count(&this.rows, max).max(1) as u64;
            let mut ordinal = 0u32;
            let mut first_row = 0u64;

            for bucket in partition::buckets(&this.rows) {
                for chunk in bucket.chunks(max) {
                    this.check_canceled()?;
                    let body = partition::build_body(this.kind, this.columns, chunk)?;
                    this.value_range = merge_range(this.value_range, body.value_range());
                    let (min_start, max_end) = partition::chunk_bounds(chunk);
                    let key = BlockKey {
                        track,
                        ordinal,
                        sequence: chunk[0].sequence,
                        strand: chunk[0].strand,
                        min_start,
                        max_end,
                        len: chunk.len() as u32,
                        first_row,
                    };
                    this.store.create_block(&key, &body)?;
                    this.index.add(key);

                    ordinal += 1;
                    first_row += chunk.len() as u64;
                    let current = SORTED + (PARTITION_END - SORTED) * ordinal as u64 / total;
                    this.progress.report(&ProgressEvent::new(
                        current,
                        format!("wrote block {ordinal} of {total}"),
                    ));
                }
            }
            this.rows = Vec::new();
            Ok(())
        })
    }

    /// Partitioned -> Published: the single point where the track becomes visible
    pub fn publish(&mut self) -> Result<TrackId> {
        self.step(ImportState::Partitioned, ImportState::Published, |this| {
            let id = this.track.ok_or_else(|| TrackError::storage("no track reserved"))?;
            let mut attributes = this.attributes.clone();
            if this.kind.is_quantitative() {
                overlay::apply_value_range(&mut attributes, this.value_range);
            }
            let existing = this.store.tracks(this.dataset)?;
            if let Some(source) = overlay::apply_overlay(&mut attributes, &existing) {
                debug!(track = %id, from = %source, "copied overlay attributes");
            }

            this.store.publish_track(TrackMeta {
                id,
                dataset: this.dataset,
                name: this.name.clone(),
                kind: this.kind,
                attributes,
                index: this.index.clone(),
                columns: this.columns,
            })?;
            this.progress
                .report(&ProgressEvent::finished(format!("published track {}", this.name)));
            Ok(id)
        })
    }

    /// Abandon the import and remove everything it wrote
    pub fn cancel(&mut self) -> Result<()> {
        match self.state {
            ImportState::Canceled => Ok(()),
            ImportState::Published => Err(TrackError::InvalidTransition {
                from: ImportState::Published,
                to: ImportState::Canceled,
            }),
            _ => {
                self.rollback();
                Ok(())
            }
        }
    }

    /// Run one transition. Any failure inside it rolls the import back.
    fn step<T>(
        &mut self,
        from: ImportState,
        to: ImportState,
        body: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        if self.state != from {
            return Err(TrackError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        let result = self.check_canceled().and_then(|()| body(self));
        match result {
            Ok(value) => {
                debug!(track = %self.name, state = ?to, "import state");
                self.state = to;
                Ok(value)
            }
            Err(err) => {
                self.rollback();
                Err(err)
            }
        }
    }

    fn check_canceled(&self) -> Result<()> {
        if self.cancel.is_canceled() {
            Err(TrackError::ImportCanceled)
        } else {
            Ok(())
        }
    }

    fn rollback(&mut self) {
        if let Some(id) = self.track {
            warn!(track = %self.name, id = %id, state = ?self.state, "rolling back import");
            if let Err(err) = self.store.discard_track(id) {
                warn!(id = %id, error = %err, "failed to discard staged track");
            }
        }
        self.staged = Vec::new();
        self.rows = Vec::new();
        self.index = BlockIndex::new();
        self.state = ImportState::Canceled;
    }

    fn report(&mut self, current: u64, message: impl Into<String>) {
        self.progress.report(&ProgressEvent::new(current, message));
    }

    /// Canonical strand per interned spelling, or every record with a bad one
    fn resolve_strands(&self) -> Result<Vec<Strand>> {
        let parsed: Vec<Option<Strand>> = self
            .strand_names
            .names()
            .iter()
            .map(|raw| raw.parse::<Strand>().ok().filter(|s| s.is_stored()))
            .collect();
        if parsed.iter().all(Option::is_some) {
            return Ok(parsed.into_iter().flatten().collect());
        }

        let problems: Vec<RecordProblem> = self
            .staged
            .iter()
            .filter(|record| parsed[record.strand as usize].is_none())
            .map(|record| {
                RecordProblem::new(
                    record.record,
                    "strand",
                    &self.strand_names.names()[record.strand as usize],
                    "unrecognized strand",
                )
            })
            .collect();
        Err(TrackError::MalformedRecords(problems))
    }

    /// Sequence id per interned name; each distinct name is resolved once
    fn resolve_sequences(&self, resolver: &SequenceNameResolver) -> Result<Vec<SequenceId>> {
        let mut ids = Vec::with_capacity(self.sequence_names.len());
        let mut unknown = Vec::new();
        for name in self.sequence_names.names() {
            match resolver.map(name) {
                Ok(id) => {
                    debug!(from = %name, to = %id, "resolved sequence name");
                    ids.push(id);
                }
                Err(_) => unknown.push(name.clone()),
            }
        }
        if unknown.is_empty() {
            Ok(ids)
        } else {
            unknown.sort();
            Err(TrackError::UnknownSequenceNames(unknown))
        }
    }
}

impl Drop for ImportPipeline {
    fn drop(&mut self) {
        if !self.state.is_terminal() && self.track.is_some() {
            self.rollback();
        }
    }
}

fn merge_range(a: Option<(f64, f64)>, b: Option<(f64, f64)>) -> Option<(f64, f64)> {
    match (a, b) {
        (Some((a0, a1)), Some((b0, b1))) => Some((a0.min(b0), a1.max(b1))),
        (a, None) => a,
        (None, b) => b,
    }
}

/// Processor that parses and interns records during staging
struct Stager<'a> {
    kind: FeatureKind,
    columns: &'a mut usize,
    interval: u64,
    expected: Option<u64>,
    count: u64,
    staged: &'a mut Vec<StagedRecord>,
    sequence_names: &'a mut Interner,
    strand_names: &'a mut Interner,
    problems: Vec<RecordProblem>,
    progress: &'a mut Box<dyn ProgressSink>,
    cancel: &'a CancelToken,
}

impl FeatureProcessor for Stager<'_> {
    fn process(&mut self, fields: &FeatureFields<'_>) -> Result<()> {
        let record = self.count;
        self.count += 1;

        match record::parse_record(record, fields, self.kind, self.columns) {
            Ok((start, end, payload)) => self.staged.push(StagedRecord {
                record,
                sequence: self.sequence_names.intern(fields.sequence_name.trim()),
                strand: self.strand_names.intern(fields.strand.trim()),
                start,
                end,
                payload,
            }),
            Err(problems) => self.problems.extend(problems),
        }

        if self.count % self.interval.max(1) == 0 {
            if self.cancel.is_canceled() {
                return Err(TrackError::ImportCanceled);
            }
            let current = match self.expected {
                Some(expected) if expected > 0 => {
                    STAGING_START
                        + (STAGING_END - STAGING_START) * self.count.min(expected) / expected
                }
                _ => STAGING_START,
            };
            self.progress
                .report(&ProgressEvent::new(current, format!("read {} records", self.count)));
        }
        Ok(())
    }
}

/// Import `source` as a new track of `dataset`, resolving sequence names
/// against the dataset's registered sequences
pub fn import_track(
    store: Arc<dyn BlockStore>,
    dataset: DatasetId,
    name: &str,
    kind: FeatureKind,
    attributes: Attributes,
    config: &ImportConfig,
    source: &mut dyn FeatureSource,
) -> Result<TrackId> {
    let sequences = store.sequences(dataset)?;
    let resolver = SequenceNameResolver::from_sequences(&sequences);
    ImportPipeline::new(store, dataset, name, kind)
        .with_attributes(attributes)
        .with_config(*config)
        .with_progress(LogProgress::new(name))
        .run(source, &resolver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::SegmentFeature;
    use crate::config::StoreConfig;
    use crate::sequence::Topology;
    use crate::store::MemoryStore;
    use crate::track::{FeatureFilter, GeneTrack, MatrixTrack, PositionalTrack, SegmentTrack};
    use crate::GeneType;
    use std::sync::Mutex;

    struct Fixture {
        store: Arc<MemoryStore>,
        dataset: DatasetId,
        chr: SequenceId,
        plasmid: SequenceId,
        resolver: SequenceNameResolver,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let dataset = store.create_dataset("halo").unwrap();
        let chr = store.add_sequence(dataset, "chr", 2_014_239, Topology::Circular).unwrap();
        let plasmid = store
            .add_sequence(dataset, "pNRC200", 365_425, Topology::Circular)
            .unwrap();
        let resolver = SequenceNameResolver::from_sequences(&store.sequences(dataset).unwrap());
        Fixture {
            store,
            dataset,
            chr,
            plasmid,
            resolver,
        }
    }

    fn pipeline(fx: &Fixture, name: &str, kind: FeatureKind) -> ImportPipeline {
        ImportPipeline::new(fx.store.clone(), fx.dataset, name, kind)
    }

    fn segment(seq: &str, strand: &str, start: i64, end: i64, value: f64) -> RawRecord {
        RawRecord::interval(seq, strand, start, end).with_value(value)
    }

    #[test]
    fn test_round_trip_sorted() {
        let fx = fixture();
        let mut records = vec![
            segment("pNRC200", "-", 50, 60, 6.0),
            segment("Chromosome", "rev", 10, 20, 2.0),
            segment("chr", "+", 30, 40, 3.0),
            segment("chr", "forward", 5, 8, 1.0),
            segment("chr", ".", 1, 2, 4.0),
            segment("chr", "+", 30, 35, 5.0),
        ];
        let id = pipeline(&fx, "signal", FeatureKind::QuantitativeSegment)
            .with_config(ImportConfig::new().with_max_block_features(2))
            .run(&mut records, &fx.resolver)
            .unwrap();

        let track = SegmentTrack::open(fx.store.clone(), id, &StoreConfig::default()).unwrap();
        let features = track.features().collect_owned().unwrap();
        let tuples: Vec<(SequenceId, Strand, i64, i64, f64)> = features
            .iter()
            .map(|f| (f.sequence, f.strand, f.start, f.end, f.value))
            .collect();
        assert_eq!(
            tuples,
            vec![
                (fx.chr, Strand::Forward, 5, 8, 1.0),
                (fx.chr, Strand::Forward, 30, 35, 5.0),
                (fx.chr, Strand::Forward, 30, 40, 3.0),
                (fx.chr, Strand::Reverse, 10, 20, 2.0),
                (fx.chr, Strand::None, 1, 2, 4.0),
                (fx.plasmid, Strand::Reverse, 50, 60, 6.0),
            ]
        );
        assert_eq!(track.feature_count(), 6);
        // forward bucket holds three rows, so two blocks
        assert_eq!(track.index().keys_for(fx.chr, Strand::Forward).count(), 2);
        assert_eq!(track.attribute("min.value"), Some("1"));
        assert_eq!(track.attribute("max.value"), Some("6"));
        assert_eq!(track.sequence_extent(fx.chr), Some((1, 40)));
    }

    #[test]
    fn test_partitioning_bound() {
        let fx = fixture();
        let mut records: Vec<RawRecord> = (0..250_000)
            .map(|i| segment("chr", "+", i * 10, i * 10 + 5, i as f64))
            .collect();
        let id = pipeline(&fx, "dense", FeatureKind::QuantitativeSegment)
            .with_config(ImportConfig::new().with_max_block_features(50_000))
            .run(&mut records, &fx.resolver)
            .unwrap();

        let track = SegmentTrack::open(fx.store.clone(), id, &StoreConfig::default()).unwrap();
        let keys: Vec<&BlockKey> = track.index().keys_for(fx.chr, Strand::Forward).collect();
        assert_eq!(keys.len(), 5);
        assert!(keys.iter().all(|k| k.len() == 50_000));
        assert_eq!(keys[1].first_row, 50_000);
        assert_eq!(keys[4].max_end, 2_499_995);

        let filter = FeatureFilter::new(fx.chr, Strand::Forward, 600_000, 600_031);
        let values: Vec<f64> = track
            .features_in(&filter)
            .collect_owned()
            .unwrap()
            .iter()
            .map(|f| f.value)
            .collect();
        assert_eq!(values, vec![60_000.0, 60_001.0, 60_002.0, 60_003.0]);
        assert_eq!(track.cache_stats().misses, 1);
    }

    #[test]
    fn test_cancel_after_staging_leaves_dataset_untouched() {
        let fx = fixture();
        let mut records = vec![segment("chr", "+", 1, 2, 1.0)];
        let existing = pipeline(&fx, "kept", FeatureKind::QuantitativeSegment)
            .run(&mut records.clone(), &fx.resolver)
            .unwrap();

        let mut import = pipeline(&fx, "dropped", FeatureKind::QuantitativeSegment);
        import.stage(&mut records).unwrap();
        assert_eq!(import.state(), ImportState::Staging);
        assert_eq!(fx.store.staged_count(), 1);

        import.cancel().unwrap();
        assert_eq!(import.state(), ImportState::Canceled);
        assert_eq!(fx.store.staged_count(), 0);
        let tracks: Vec<TrackId> = fx.store.tracks(fx.dataset).unwrap().iter().map(|t| t.id).collect();
        assert_eq!(tracks, vec![existing]);

        assert!(matches!(
            import.normalize(&fx.resolver),
            Err(TrackError::InvalidTransition { from: ImportState::Canceled, .. })
        ));
    }

    #[test]
    fn test_cancel_token_rolls_back_written_blocks() {
        let fx = fixture();
        let mut records: Vec<RawRecord> = (0..100).map(|i| segment("chr", "+", i, i, 0.0)).collect();
        let mut import = pipeline(&fx, "t", FeatureKind::QuantitativeSegment)
            .with_config(ImportConfig::new().with_max_block_features(10));
        let token = import.cancel_token();
        import.stage(&mut records).unwrap();
        import.normalize(&fx.resolver).unwrap();
        import.sort().unwrap();
        token.cancel();
        assert!(matches!(import.partition(), Err(TrackError::ImportCanceled)));
        assert_eq!(import.state(), ImportState::Canceled);
        assert_eq!(fx.store.block_count(), 0);
        assert_eq!(fx.store.staged_count(), 0);
        assert!(fx.store.tracks(fx.dataset).unwrap().is_empty());
    }

    #[test]
    fn test_published_import_cannot_be_canceled() {
        let fx = fixture();
        let mut import = pipeline(&fx, "t", FeatureKind::QuantitativeSegment);
        import.stage(&mut vec![segment("chr", "+", 1, 2, 1.0)]).unwrap();
        import.normalize(&fx.resolver).unwrap();
        import.sort().unwrap();
        import.partition().unwrap();
        let id = import.publish().unwrap();
        assert!(import.cancel().is_err());
        drop(import);
        assert!(fx.store.track(id).is_ok());
    }

    #[test]
    fn test_out_of_order_transition() {
        let fx = fixture();
        let mut import = pipeline(&fx, "t", FeatureKind::Gene);
        assert!(matches!(
            import.sort(),
            Err(TrackError::InvalidTransition {
                from: ImportState::New,
                to: ImportState::Sorted
            })
        ));
        assert_eq!(import.state(), ImportState::New);
    }

    #[test]
    fn test_unknown_names_reported_as_batch() {
        let fx = fixture();
        let mut records = vec![
            segment("chr", "+", 1, 2, 1.0),
            segment("plasmid 7", "+", 1, 2, 1.0),
            segment("chrQ", "+", 1, 2, 1.0),
            segment("plasmid 7", "-", 3, 4, 1.0),
            segment("Chromosome", "+", 1, 2, 1.0),
        ];
        let err = pipeline(&fx, "t", FeatureKind::QuantitativeSegment)
            .run(&mut records, &fx.resolver)
            .unwrap_err();
        match err {
            TrackError::UnknownSequenceNames(names) => {
                assert_eq!(names, vec!["chrQ".to_string(), "plasmid 7".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fx.store.staged_count(), 0);
    }

    #[test]
    fn test_malformed_records_reported_as_batch() {
        let fx = fixture();
        let mut bad_value = segment("chr", "+", 1, 2, 0.0);
        bad_value.value = "NaN?".into();
        let mut records = vec![
            segment("chr", "+", 1, 2, 1.0),
            bad_value,
            RawRecord::interval("chr", "+", 9, 3).with_value(1.0),
        ];
        let err = pipeline(&fx, "t", FeatureKind::QuantitativeSegment)
            .run(&mut records, &fx.resolver)
            .unwrap_err();
        match err {
            TrackError::MalformedRecords(problems) => {
                let seen: Vec<(u64, &str)> = problems.iter().map(|p| (p.record, p.field)).collect();
                assert_eq!(seen, vec![(1, "value"), (2, "end")]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let mut records = vec![segment("chr", "sideways", 1, 2, 1.0), segment("chr", "*", 1, 2, 1.0)];
        let err = pipeline(&fx, "t", FeatureKind::QuantitativeSegment)
            .run(&mut records, &fx.resolver)
            .unwrap_err();
        match err {
            TrackError::MalformedRecords(problems) => {
                assert_eq!(problems.len(), 2);
                assert!(problems.iter().all(|p| p.field == "strand"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_reader_and_record_problems_merged() {
        use std::io::Write;

        let fx = fixture();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"seqid\tstrand\tstart\tend\tt0\tt1\n\
              chr\t+\t1\t10\t0.5\t1.5\n\
              chr\t+\toops\t20\t0.5\t1.5\n\
              chr\t+\t30\t40\thigh\t1.5\n",
        )
        .unwrap();
        file.flush().unwrap();

        let mut source = crate::reader::TabularFeatureSource::open(file.path()).unwrap();
        let mut import = pipeline(&fx, "matrix", FeatureKind::QuantitativeSegmentMatrix);
        let err = import.stage(&mut source).unwrap_err();
        match err {
            TrackError::MalformedRecords(problems) => {
                let seen: Vec<(u64, &str)> = problems.iter().map(|p| (p.record, p.field)).collect();
                assert_eq!(seen, vec![(1, "start"), (2, "values")]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(import.state(), ImportState::Canceled);
        assert!(fx.store.tracks(fx.dataset).unwrap().is_empty());
    }

    #[test]
    fn test_overlay_attributes_from_existing_track() {
        let fx = fixture();
        pipeline(&fx, "first", FeatureKind::QuantitativeSegment)
            .with_attributes(Attributes::parse(
                "overlay=tiling;top=0.2;height=0.3;rangeMin=-1;rangeMax=1",
            ))
            .run(&mut vec![segment("chr", "+", 1, 2, 0.5)], &fx.resolver)
            .unwrap();

        let id = pipeline(&fx, "second", FeatureKind::QuantitativeSegment)
            .with_attributes(Attributes::parse("overlay=tiling;rangeMax=4;top=0.9"))
            .run(&mut vec![segment("chr", "-", 1, 2, 3.0)], &fx.resolver)
            .unwrap();

        let attrs = fx.store.track(id).unwrap().attributes;
        assert_eq!(attrs.get("top"), Some("0.2"));
        assert_eq!(attrs.get("height"), Some("0.3"));
        assert_eq!(attrs.get("rangeMin"), Some("-1"));
        assert_eq!(attrs.get("rangeMax"), Some("4"));
        assert_eq!(attrs.get("max.value"), Some("3"));
    }

    #[test]
    fn test_gene_and_positional_imports() {
        let fx = fixture();
        let mut genes = vec![
            RawRecord::interval("chr", "-", 400, 900)
                .with_name("VNG0002G", "dnaN")
                .with_gene_type("cds"),
            RawRecord::interval("chr", "+", 100, 300).with_name("VNG0001H", ""),
        ];
        let id = pipeline(&fx, "genes", FeatureKind::Gene)
            .run(&mut genes, &fx.resolver)
            .unwrap();
        let track = GeneTrack::open(fx.store.clone(), id, &StoreConfig::default()).unwrap();
        let hit = track.feature_at(fx.chr, Strand::Any, 500).unwrap().unwrap();
        assert_eq!(hit.label(), "dnaN");
        assert_eq!(hit.gene_type, GeneType::Cds);
        assert!(track.attribute("min.value").is_none());

        let mut points = vec![
            RawRecord::point("chr", "+", 20).with_value(2.0),
            RawRecord::point("chr", "+", 10).with_value(1.0),
        ];
        let id = pipeline(&fx, "points", FeatureKind::QuantitativePositional)
            .run(&mut points, &fx.resolver)
            .unwrap();
        let track = PositionalTrack::open(fx.store.clone(), id, &StoreConfig::default()).unwrap();
        let mut positions = Vec::new();
        track
            .features()
            .for_each(|f| positions.push((f.position(), f.start(), f.end())))
            .unwrap();
        assert_eq!(positions, vec![(10, 10, 10), (20, 20, 20)]);
    }

    #[test]
    fn test_matrix_import() {
        let fx = fixture();
        let mut rows = vec![
            RawRecord::interval("chr", "+", 10, 20).with_values(vec![1.0, 2.0]),
            RawRecord::interval("chr", "+", 1, 5).with_values(vec![-3.0, 0.5]),
        ];
        let id = pipeline(&fx, "matrix", FeatureKind::QuantitativeSegmentMatrix)
            .run(&mut rows, &fx.resolver)
            .unwrap();
        let track = MatrixTrack::open(fx.store.clone(), id, &StoreConfig::default()).unwrap();
        assert_eq!(track.meta().columns, 2);
        let mut values = Vec::new();
        track
            .features()
            .for_each(|f| values.push(f.values().to_vec()))
            .unwrap();
        assert_eq!(values, vec![vec![-3.0, 0.5], vec![1.0, 2.0]]);
        assert_eq!(track.attribute("min.value"), Some("-3"));
    }

    #[test]
    fn test_empty_import_publishes_empty_track() {
        let fx = fixture();
        let id = pipeline(&fx, "empty", FeatureKind::QuantitativeSegment)
            .run(&mut Vec::<RawRecord>::new(), &fx.resolver)
            .unwrap();
        let track = SegmentTrack::open(fx.store.clone(), id, &StoreConfig::default()).unwrap();
        assert_eq!(track.features().count().unwrap(), 0);
        assert!(track.attribute("min.value").is_none());
    }

    #[test]
    fn test_progress_events() {
        let fx = fixture();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink_events = events.clone();
        let mut records: Vec<RawRecord> = (0..30).map(|i| segment("chr", "+", i, i, 1.0)).collect();
        pipeline(&fx, "t", FeatureKind::QuantitativeSegment)
            .with_config(
                ImportConfig::new()
                    .with_progress_interval(10)
                    .with_max_block_features(15),
            )
            .with_progress(ProgressFn(move |e: &ProgressEvent| {
                sink_events.lock().unwrap().push((e.current, e.done))
            }))
            .run(&mut records, &fx.resolver)
            .unwrap();

        let events = events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                (0, false),
                (10, false),
                (30, false),
                (50, false),
                (70, false),
                (70, false),
                (75, false),
                (80, false),
                (87, false),
                (95, false),
                (100, true),
            ]
        );
        assert!(events.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[test]
    fn test_dropped_pipeline_rolls_back() {
        let fx = fixture();
        {
            let mut import = pipeline(&fx, "t", FeatureKind::QuantitativeSegment);
            import.stage(&mut vec![segment("chr", "+", 1, 2, 1.0)]).unwrap();
            assert_eq!(fx.store.staged_count(), 1);
        }
        assert_eq!(fx.store.staged_count(), 0);
    }

    #[test]
    fn test_import_track_convenience() {
        let fx = fixture();
        let store: Arc<dyn BlockStore> = fx.store.clone();
        let id = import_track(
            store,
            fx.dataset,
            "signal",
            FeatureKind::QuantitativeSegment,
            Attributes::parse("color=red"),
            &ImportConfig::default(),
            &mut vec![segment("PNRC200", "+", 1, 2, 1.0)],
        )
        .unwrap();
        let meta = fx.store.track(id).unwrap();
        assert_eq!(meta.attributes.get("color"), Some("red"));
        let track = SegmentTrack::new(meta, fx.store.clone(), &StoreConfig::default()).unwrap();
        let features: Vec<SegmentFeature> = track.features().collect_owned().unwrap();
        assert_eq!(features[0].sequence, fx.plasmid);
    }
}
