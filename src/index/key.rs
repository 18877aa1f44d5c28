use crate::{Coord, SequenceId, Strand, TrackId};
use serde::{Deserialize, Serialize};

/// Routing metadata for one stored block.
///
/// A block holds one contiguous slice of the sorted feature run of a single
/// (sequence, strand) bucket. `min_start`/`max_end` bound every feature in it,
/// which lets a query reject the block without loading its body.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockKey {
    pub track: TrackId,
    /// Position of the block within its track, unique per track
    pub ordinal: u32,
    pub sequence: SequenceId,
    pub strand: Strand,
    pub min_start: Coord,
    pub max_end: Coord,
    /// Number of features in the block
    pub len: u32,
    /// Track-wide row number of the first feature
    pub first_row: u64,
}

impl BlockKey {
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Track-wide row number of the last feature (equal to `first_row` when empty)
    pub fn last_row(&self) -> u64 {
        self.first_row + u64::from(self.len.saturating_sub(1))
    }

    /// Could any feature `[s, e]` in this block overlap the half-open window `[start, end)`?
    pub fn overlaps(&self, start: Coord, end: Coord) -> bool {
        !self.is_empty() && self.min_start < end && self.max_end >= start
    }

    /// Could any feature in this block cover `coord`?
    pub fn contains(&self, coord: Coord) -> bool {
        !self.is_empty() && self.min_start <= coord && coord <= self.max_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(min_start: Coord, max_end: Coord, len: u32) -> BlockKey {
        BlockKey {
            track: TrackId(1),
            ordinal: 0,
            sequence: SequenceId(1),
            strand: Strand::Forward,
            min_start,
            max_end,
            len,
            first_row: 10,
        }
    }

    #[test]
    fn test_range_hint() {
        let k = key(100, 200, 5);
        assert!(k.overlaps(150, 160));
        assert!(k.overlaps(0, 101));
        assert!(!k.overlaps(0, 100)); // window end is exclusive
        assert!(k.overlaps(200, 300)); // feature end is inclusive
        assert!(!k.overlaps(201, 300));
        assert!(k.contains(100));
        assert!(k.contains(200));
        assert!(!k.contains(201));
        assert_eq!(k.last_row(), 14);
    }

    #[test]
    fn test_empty_key_never_matches() {
        let k = key(0, 0, 0);
        assert!(!k.overlaps(-10, 10));
        assert!(!k.contains(0));
        assert_eq!(k.last_row(), 10);
    }
}
