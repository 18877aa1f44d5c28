//! Query surface over a published track.
//!
//! A query first prunes block keys using their range hints, then loads only
//! the surviving blocks (through a small LRU cache) and scans the rows inside
//! the window.

pub mod cursor;

pub use cursor::FeatureCursor;

use crate::block::{
    Block, Columns, Features, GeneColumns, MatrixColumns, NamedColumns, PeptideColumns,
    PositionalColumns, SegmentColumns,
};
use crate::cache::{CacheStats, LruCache};
use crate::config::StoreConfig;
use crate::error::{Result, TrackError};
use crate::index::{BlockIndex, BlockKey};
use crate::store::{AttributeOwner, BlockStore, TrackMeta};
use crate::{Coord, FeatureKind, SequenceId, Strand, TrackId};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Which features a query wants: one sequence, a strand (or any), and the
/// half-open window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFilter {
    pub sequence: SequenceId,
    pub strand: Strand,
    pub start: Coord,
    pub end: Coord,
}

impl FeatureFilter {
    pub fn new(sequence: SequenceId, strand: Strand, start: Coord, end: Coord) -> Self {
        Self {
            sequence,
            strand,
            start,
            end,
        }
    }

    /// Everything on a sequence of the given length, any strand
    pub fn whole_sequence(sequence: SequenceId, length: Coord) -> Self {
        Self::new(sequence, Strand::Any, 0, length.saturating_add(1))
    }

    pub fn with_strand(self, strand: Strand) -> Self {
        Self { strand, ..self }
    }
}

pub type SegmentTrack = Track<SegmentColumns>;
pub type PositionalTrack = Track<PositionalColumns>;
pub type GeneTrack = Track<GeneColumns>;
pub type PeptideTrack = Track<PeptideColumns>;
pub type MatrixTrack = Track<MatrixColumns>;

/// A published track of one feature kind
pub struct Track<C: Columns> {
    meta: TrackMeta,
    store: Arc<dyn BlockStore>,
    cache: LruCache<u32, Arc<Block<C>>>,
}

impl<C: Columns> Track<C> {
    /// Wrap already-loaded metadata. Fails when the track holds another kind.
    pub fn new(meta: TrackMeta, store: Arc<dyn BlockStore>, config: &StoreConfig) -> Result<Self> {
        if meta.kind != C::KIND {
            return Err(TrackError::KindMismatch {
                expected: C::KIND,
                found: meta.kind,
            });
        }
        Ok(Self {
            meta,
            store,
            cache: LruCache::new(config.cache_blocks),
        })
    }

    pub fn open(store: Arc<dyn BlockStore>, id: TrackId, config: &StoreConfig) -> Result<Self> {
        let meta = store.track(id)?;
        Self::new(meta, store, config)
    }

    pub fn id(&self) -> TrackId {
        self.meta.id
    }

    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn kind(&self) -> FeatureKind {
        self.meta.kind
    }

    pub fn meta(&self) -> &TrackMeta {
        &self.meta
    }

    pub fn index(&self) -> &BlockIndex {
        &self.meta.index
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.meta.attributes.get(key)
    }

    /// Update one attribute, in the store and in this handle
    pub fn set_attribute(&mut self, key: &str, value: &str) -> Result<()> {
        self.store
            .set_attribute(AttributeOwner::Track(self.meta.id), key, value)?;
        self.meta.attributes.set(key, value);
        Ok(())
    }

    /// Logical feature count, from the index alone
    pub fn feature_count(&self) -> u64 {
        self.meta.index.feature_count()
    }

    /// `(min start, max end)` of the features on one sequence, from the index alone
    pub fn sequence_extent(&self, sequence: SequenceId) -> Option<(Coord, Coord)> {
        self.meta.index.extent(sequence)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub(crate) fn load(&self, key: &BlockKey) -> Result<Arc<Block<C>>> {
        if let Some(block) = self.cache.get(&key.ordinal) {
            return Ok(block);
        }
        debug!(track = %self.meta.id, block = key.ordinal, "loading block");
        let body = self.store.load_block(key)?;
        let block = Arc::new(Block::from_body(key.clone(), body)?);
        self.cache.insert(key.ordinal, Arc::clone(&block));
        Ok(block)
    }

    /// Every feature, block by block in index order
    pub fn features(&self) -> FeatureCursor<'_, C> {
        FeatureCursor::new(self, self.meta.index.keys(), None)
    }

    /// Features overlapping the filter's window. Blocks whose range hint
    /// misses the window are never loaded.
    pub fn features_in(&self, filter: &FeatureFilter) -> FeatureCursor<'_, C> {
        let keys = self
            .meta
            .index
            .keys_in(filter.sequence, filter.strand, filter.start, filter.end);
        FeatureCursor::new(self, keys, Some((filter.start, filter.end)))
    }

    /// Like [`Track::features_in`], but hands over one block at a time
    /// together with the filter narrowed to that block's strand. Stops at the
    /// first error from loading or from the callback.
    pub fn for_each_block<F>(&self, filter: &FeatureFilter, mut callback: F) -> Result<()>
    where
        F: FnMut(Features<'_, C>, &FeatureFilter) -> Result<()>,
    {
        let keys = self
            .meta
            .index
            .keys_in(filter.sequence, filter.strand, filter.start, filter.end);
        for key in keys {
            let block = self.load(key)?;
            let narrowed = filter.with_strand(key.strand);
            callback(block.features_in(filter.start, filter.end), &narrowed)?;
        }
        Ok(())
    }

    /// Distinct strands that actually carry features. Scans the whole track.
    pub fn strands(&self) -> Result<BTreeSet<Strand>> {
        let mut strands = BTreeSet::new();
        let mut cursor = self.features();
        while let Some(feature) = cursor.advance()? {
            strands.insert(feature.strand());
        }
        Ok(strands)
    }
}

impl<C: NamedColumns> Track<C> {
    /// First feature covering `coord` (inclusive at both ends)
    pub fn feature_at(
        &self,
        sequence: SequenceId,
        strand: Strand,
        coord: Coord,
    ) -> Result<Option<C::Owned>> {
        for key in self.meta.index.keys_at(sequence, strand, coord) {
            let block = self.load(key)?;
            let hit = block
                .features_in(coord, coord.saturating_add(1))
                .find(|f| f.start() <= coord && coord <= f.end());
            if let Some(feature) = hit {
                return Ok(Some(feature.to_feature()));
            }
        }
        Ok(None)
    }
}

/// A track of whichever kind the store says it is
pub enum AnyTrack {
    Segment(SegmentTrack),
    Positional(PositionalTrack),
    Gene(GeneTrack),
    Peptide(PeptideTrack),
    Matrix(MatrixTrack),
}

impl AnyTrack {
    pub fn open(store: Arc<dyn BlockStore>, id: TrackId, config: &StoreConfig) -> Result<Self> {
        let meta = store.track(id)?;
        Ok(match meta.kind {
            FeatureKind::QuantitativeSegment => AnyTrack::Segment(Track::new(meta, store, config)?),
            FeatureKind::QuantitativePositional => {
                AnyTrack::Positional(Track::new(meta, store, config)?)
            }
            FeatureKind::Gene => AnyTrack::Gene(Track::new(meta, store, config)?),
            FeatureKind::Peptide => AnyTrack::Peptide(Track::new(meta, store, config)?),
            FeatureKind::QuantitativeSegmentMatrix => {
                AnyTrack::Matrix(Track::new(meta, store, config)?)
            }
        })
    }

    pub fn meta(&self) -> &TrackMeta {
        match self {
            AnyTrack::Segment(t) => t.meta(),
            AnyTrack::Positional(t) => t.meta(),
            AnyTrack::Gene(t) => t.meta(),
            AnyTrack::Peptide(t) => t.meta(),
            AnyTrack::Matrix(t) => t.meta(),
        }
    }

    pub fn kind(&self) -> FeatureKind {
        self.meta().kind
    }

    /// Feature lines (`start end payload...`, tab separated) for a window
    pub fn feature_lines(&self, filter: &FeatureFilter) -> Result<Vec<(Strand, String)>> {
        match self {
            AnyTrack::Segment(t) => lines(t, filter),
            AnyTrack::Positional(t) => lines(t, filter),
            AnyTrack::Gene(t) => lines(t, filter),
            AnyTrack::Peptide(t) => lines(t, filter),
            AnyTrack::Matrix(t) => lines(t, filter),
        }
    }

    pub fn strands(&self) -> Result<BTreeSet<Strand>> {
        match self {
            AnyTrack::Segment(t) => t.strands(),
            AnyTrack::Positional(t) => t.strands(),
            AnyTrack::Gene(t) => t.strands(),
            AnyTrack::Peptide(t) => t.strands(),
            AnyTrack::Matrix(t) => t.strands(),
        }
    }
}

fn lines<C: Columns>(track: &Track<C>, filter: &FeatureFilter) -> Result<Vec<(Strand, String)>> {
    let mut out = Vec::new();
    track
        .features_in(filter)
        .for_each(|feature| out.push((feature.strand(), feature.to_feature().to_string())))?;
    Ok(out)
}
