//! Loaded blocks and the zero-allocation views used to scan them.
//!
//! A block stores its features as parallel columns sorted by `(start, end)`.
//! Scanning yields [`FeatureRef`] values: a pointer pair plus a row number,
//! so no allocation happens per feature however many rows are visited.

pub mod columns;

pub use columns::{
    GeneColumns, GeneFeature, MatrixColumns, MatrixFeature, PeptideColumns, PeptideFeature,
    PositionalColumns, PositionalFeature, SegmentColumns, SegmentFeature,
};

use crate::error::{Result, TrackError};
use crate::index::BlockKey;
use crate::{Coord, FeatureKind, SequenceId, Strand};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Column layout of one feature kind
pub trait Columns: Sized + Send + Sync + 'static {
    const KIND: FeatureKind;

    /// Self-contained copy of one feature
    type Owned: Clone + fmt::Debug + fmt::Display + PartialEq + Send;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn start(&self, row: usize) -> Coord;

    fn end(&self, row: usize) -> Coord;

    /// Display label, for kinds that have one
    fn label(&self, _row: usize) -> Option<&str> {
        None
    }

    fn owned_row(&self, key: &BlockKey, row: usize) -> Self::Owned;

    /// Unwrap the matching body variant
    fn from_body(body: BlockBody) -> Option<Self>;

    fn into_body(self) -> BlockBody;
}

/// Kinds whose features carry a name, and so can be looked up by coordinate
pub trait NamedColumns: Columns {}

/// Kind-tagged block payload as handed to and from storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockBody {
    Segment(SegmentColumns),
    Positional(PositionalColumns),
    Gene(GeneColumns),
    Peptide(PeptideColumns),
    Matrix(MatrixColumns),
}

fn bounds_of<C: Columns>(columns: &C) -> Option<(Coord, Coord)> {
    if columns.is_empty() {
        return None;
    }
    let max_end = (0..columns.len()).map(|row| columns.end(row)).max()?;
    Some((columns.start(0), max_end))
}

fn is_sorted_by_position<C: Columns>(columns: &C) -> bool {
    (1..columns.len()).all(|row| {
        (columns.start(row - 1), columns.end(row - 1)) <= (columns.start(row), columns.end(row))
    })
}

fn finite_range(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

impl BlockBody {
    /// An empty body of the given kind. `width` is the matrix column count.
    pub fn empty(kind: FeatureKind, width: usize) -> Self {
        match kind {
            FeatureKind::QuantitativeSegment => BlockBody::Segment(SegmentColumns::default()),
            FeatureKind::QuantitativePositional => {
                BlockBody::Positional(PositionalColumns::default())
            }
            FeatureKind::Gene => BlockBody::Gene(GeneColumns::default()),
            FeatureKind::Peptide => BlockBody::Peptide(PeptideColumns::default()),
            FeatureKind::QuantitativeSegmentMatrix => {
                BlockBody::Matrix(MatrixColumns::with_width(width))
            }
        }
    }

    pub fn kind(&self) -> FeatureKind {
        match self {
            BlockBody::Segment(_) => FeatureKind::QuantitativeSegment,
            BlockBody::Positional(_) => FeatureKind::QuantitativePositional,
            BlockBody::Gene(_) => FeatureKind::Gene,
            BlockBody::Peptide(_) => FeatureKind::Peptide,
            BlockBody::Matrix(_) => FeatureKind::QuantitativeSegmentMatrix,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BlockBody::Segment(c) => c.len(),
            BlockBody::Positional(c) => c.len(),
            BlockBody::Gene(c) => c.len(),
            BlockBody::Peptide(c) => c.len(),
            BlockBody::Matrix(c) => c.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `(min start, max end)` over all rows, `None` when empty
    pub fn bounds(&self) -> Option<(Coord, Coord)> {
        match self {
            BlockBody::Segment(c) => bounds_of(c),
            BlockBody::Positional(c) => bounds_of(c),
            BlockBody::Gene(c) => bounds_of(c),
            BlockBody::Peptide(c) => bounds_of(c),
            BlockBody::Matrix(c) => bounds_of(c),
        }
    }

    /// Rows are in non-decreasing `(start, end)` order
    pub fn is_sorted(&self) -> bool {
        match self {
            BlockBody::Segment(c) => is_sorted_by_position(c),
            BlockBody::Positional(c) => is_sorted_by_position(c),
            BlockBody::Gene(c) => is_sorted_by_position(c),
            BlockBody::Peptide(c) => is_sorted_by_position(c),
            BlockBody::Matrix(c) => is_sorted_by_position(c),
        }
    }

    /// Smallest and largest finite value, for quantitative kinds
    pub fn value_range(&self) -> Option<(f64, f64)> {
        match self {
            BlockBody::Segment(c) => finite_range(&c.values),
            BlockBody::Positional(c) => finite_range(&c.values),
            BlockBody::Matrix(c) => finite_range(&c.values),
            BlockBody::Gene(_) | BlockBody::Peptide(_) => None,
        }
    }
}

/// A loaded, immutable block with typed columns
#[derive(Debug, Clone, PartialEq)]
pub struct Block<C> {
    key: BlockKey,
    columns: C,
}

impl<C: Columns> Block<C> {
    pub fn new(key: BlockKey, columns: C) -> Self {
        Self { key, columns }
    }

    /// Type a body loaded from storage, checking it against its key
    pub fn from_body(key: BlockKey, body: BlockBody) -> Result<Self> {
        let found = body.kind();
        if body.len() != key.len() {
            return Err(TrackError::storage(format!(
                "block {} of track {} holds {} features but its key records {}",
                key.ordinal,
                key.track,
                body.len(),
                key.len
            )));
        }
        match C::from_body(body) {
            Some(columns) => Ok(Self { key, columns }),
            None => Err(TrackError::KindMismatch {
                expected: C::KIND,
                found,
            }),
        }
    }

    pub fn key(&self) -> &BlockKey {
        &self.key
    }

    pub fn columns(&self) -> &C {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn into_parts(self) -> (BlockKey, C) {
        (self.key, self.columns)
    }

    /// View of one row
    pub fn feature(&self, row: usize) -> FeatureRef<'_, C> {
        FeatureRef {
            key: &self.key,
            columns: &self.columns,
            row,
        }
    }

    /// Every row in sort order
    pub fn features(&self) -> Features<'_, C> {
        Features {
            key: &self.key,
            columns: &self.columns,
            row: 0,
            stop: self.len(),
            window_start: None,
        }
    }

    /// Rows overlapping the half-open window `[start, end)`.
    ///
    /// Rows ending before `start` are skipped and the scan stops at the first
    /// row starting at or after `end`.
    pub fn features_in(&self, start: Coord, end: Coord) -> Features<'_, C> {
        let rows = self.window(end);
        Features {
            key: &self.key,
            columns: &self.columns,
            row: rows.start,
            stop: rows.end,
            window_start: Some(start),
        }
    }

    pub fn cursor(&self) -> BlockCursor<'_, C> {
        BlockCursor {
            features: self.features(),
            current: None,
        }
    }

    pub fn cursor_in(&self, start: Coord, end: Coord) -> BlockCursor<'_, C> {
        BlockCursor {
            features: self.features_in(start, end),
            current: None,
        }
    }

    /// Rows that can overlap a window ending at `end`: everything before the
    /// first row whose start is `>= end`
    pub(crate) fn window(&self, end: Coord) -> Range<usize> {
        let (mut lo, mut hi) = (0, self.len());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.columns.start(mid) < end {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        0..lo
    }
}

/// Borrowed view of one feature row.
///
/// Copying a view copies two pointers and an index; read what you need
/// through the accessors, or call [`FeatureRef::to_feature`] to keep it.
pub struct FeatureRef<'a, C> {
    key: &'a BlockKey,
    columns: &'a C,
    row: usize,
}

impl<C> Clone for FeatureRef<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for FeatureRef<'_, C> {}

impl<'a, C: Columns> FeatureRef<'a, C> {
    pub fn sequence(&self) -> SequenceId {
        self.key.sequence
    }

    pub fn strand(&self) -> Strand {
        self.key.strand
    }

    pub fn start(&self) -> Coord {
        self.columns.start(self.row)
    }

    pub fn end(&self) -> Coord {
        self.columns.end(self.row)
    }

    pub fn label(&self) -> Option<&'a str> {
        let columns: &'a C = self.columns;
        columns.label(self.row)
    }

    /// Row within the block
    pub fn row(&self) -> usize {
        self.row
    }

    /// Row within the whole track, in sort order
    pub fn track_row(&self) -> u64 {
        self.key.first_row + self.row as u64
    }

    pub fn key(&self) -> &'a BlockKey {
        self.key
    }

    pub fn overlaps(&self, start: Coord, end: Coord) -> bool {
        self.end() >= start && self.start() < end
    }

    /// Copy this feature out of the block
    pub fn to_feature(&self) -> C::Owned {
        self.columns.owned_row(self.key, self.row)
    }

    pub(crate) fn columns(&self) -> &'a C {
        self.columns
    }
}

impl<C: Columns> fmt::Debug for FeatureRef<'_, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureRef")
            .field("kind", &C::KIND)
            .field("sequence", &self.sequence())
            .field("strand", &self.strand())
            .field("start", &self.start())
            .field("end", &self.end())
            .finish()
    }
}

/// Iterator over the views of one block
pub struct Features<'a, C> {
    key: &'a BlockKey,
    columns: &'a C,
    row: usize,
    stop: usize,
    window_start: Option<Coord>,
}

impl<'a, C: Columns> Iterator for Features<'a, C> {
    type Item = FeatureRef<'a, C>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.row < self.stop {
            let row = self.row;
            self.row += 1;
            if let Some(start) = self.window_start {
                if self.columns.end(row) < start {
                    continue;
                }
            }
            return Some(FeatureRef {
                key: self.key,
                columns: self.columns,
                row,
            });
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.stop - self.row;
        match self.window_start {
            Some(_) => (0, Some(remaining)),
            None => (remaining, Some(remaining)),
        }
    }
}

/// Explicit cursor over one block. The view returned by `advance` is
/// borrowed from the cursor and released by the next call.
pub struct BlockCursor<'a, C> {
    features: Features<'a, C>,
    current: Option<FeatureRef<'a, C>>,
}

impl<'a, C: Columns> BlockCursor<'a, C> {
    pub fn advance(&mut self) -> Option<&FeatureRef<'a, C>> {
        self.current = self.features.next();
        self.current.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TrackId;

    fn key(len: u32) -> BlockKey {
        BlockKey {
            track: TrackId(1),
            ordinal: 0,
            sequence: SequenceId(1),
            strand: Strand::Forward,
            min_start: 0,
            max_end: 0,
            len,
            first_row: 100,
        }
    }

    fn segments(rows: &[(Coord, Coord, f64)]) -> Block<SegmentColumns> {
        let mut columns = SegmentColumns::default();
        for &(start, end, value) in rows {
            columns.push(start, end, value);
        }
        Block::new(key(rows.len() as u32), columns)
    }

    #[test]
    fn test_cursor_yields_distinct_rows() {
        let block = segments(&[(1, 10, 0.5), (5, 8, 1.5), (20, 30, -2.0)]);
        let mut cursor = block.cursor();
        let mut copied = Vec::new();
        while let Some(feature) = cursor.advance() {
            copied.push((feature.start(), feature.end(), feature.value()));
        }
        assert_eq!(copied, vec![(1, 10, 0.5), (5, 8, 1.5), (20, 30, -2.0)]);
        assert!(cursor.advance().is_none());
    }

    #[test]
    fn test_window_skips_and_stops() {
        let block = segments(&[
            (0, 5, 1.0),
            (2, 100, 2.0),
            (10, 12, 3.0),
            (15, 15, 4.0),
            (40, 50, 5.0),
        ]);
        let hits: Vec<f64> = block.features_in(11, 40).map(|f| f.value()).collect();
        assert_eq!(hits, vec![2.0, 3.0, 4.0]);

        // the stop row is found by binary search, not by scanning
        assert_eq!(block.window(40), 0..4);
        assert_eq!(block.window(0), 0..0);
        assert_eq!(block.window(1000), 0..5);

        assert_eq!(block.features_in(100, 200).count(), 1);
        assert_eq!(block.features_in(101, 200).count(), 0);
    }

    #[test]
    fn test_features_restartable() {
        let block = segments(&[(1, 2, 0.0), (3, 4, 0.0)]);
        let first: Vec<_> = block.features().map(|f| f.to_feature()).collect();
        let second: Vec<_> = block.features().map(|f| f.to_feature()).collect();
        assert_eq!(first, second);
        assert_eq!(block.feature(1).track_row(), 101);
    }

    #[test]
    fn test_empty_block() {
        let block = segments(&[]);
        assert!(block.is_empty());
        assert_eq!(block.features().count(), 0);
        assert_eq!(block.features_in(0, 10).count(), 0);
        assert!(block.cursor().advance().is_none());
    }

    #[test]
    fn test_from_body_checks_kind_and_length() {
        let mut genes = GeneColumns::default();
        genes.push(1, 10, "abc", "", crate::GeneType::Gene);
        let body = BlockBody::Gene(genes);

        let err = Block::<SegmentColumns>::from_body(key(1), body.clone()).unwrap_err();
        assert!(matches!(err, TrackError::KindMismatch { .. }));

        let err = Block::<GeneColumns>::from_body(key(2), body.clone()).unwrap_err();
        assert!(err.is_storage_failure());

        let block = Block::<GeneColumns>::from_body(key(1), body).unwrap();
        assert_eq!(block.feature(0).label(), Some("abc"));
    }

    #[test]
    fn test_body_summaries() {
        let mut columns = SegmentColumns::default();
        columns.push(5, 9, 2.0);
        columns.push(5, 20, f64::NAN);
        columns.push(7, 8, -1.0);
        let body = BlockBody::Segment(columns);
        assert_eq!(body.bounds(), Some((5, 20)));
        assert_eq!(body.value_range(), Some((-1.0, 2.0)));
        assert!(body.is_sorted());
        assert_eq!(BlockBody::empty(FeatureKind::Gene, 0).bounds(), None);

        let mut unsorted = PositionalColumns::default();
        unsorted.push(9, 1.0);
        unsorted.push(3, 1.0);
        assert!(!BlockBody::Positional(unsorted).is_sorted());
    }
}
