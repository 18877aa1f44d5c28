pub mod key;

pub use key::BlockKey;

use crate::{Coord, SequenceId, Strand};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

fn query_strands(strand: Strand) -> &'static [Strand] {
    match strand {
        Strand::Forward => &[Strand::Forward],
        Strand::Reverse => &[Strand::Reverse],
        Strand::None => &[Strand::None],
        Strand::Any => &Strand::STORED,
    }
}

/// Per (sequence, strand) ordered block keys of one track.
///
/// Holds only per-block metadata, so it stays resident however many
/// features the track has.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockIndex {
    buckets: BTreeMap<(SequenceId, Strand), Vec<BlockKey>>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key to the end of its (sequence, strand) bucket
    pub fn add(&mut self, key: BlockKey) {
        debug_assert!(key.strand.is_stored(), "blocks are stored on a concrete strand");
        self.buckets
            .entry((key.sequence, key.strand))
            .or_default()
            .push(key);
    }

    /// Every key in the index. Order across buckets is not part of the contract.
    pub fn keys(&self) -> impl Iterator<Item = &BlockKey> + '_ {
        self.buckets.values().flatten()
    }

    /// Keys of one bucket; `Strand::Any` concatenates forward, reverse and none
    pub fn keys_for(&self, sequence: SequenceId, strand: Strand) -> impl Iterator<Item = &BlockKey> + '_ {
        query_strands(strand)
            .iter()
            .filter_map(move |s| self.buckets.get(&(sequence, *s)))
            .flatten()
    }

    /// Keys whose range hint overlaps the half-open window `[start, end)`
    pub fn keys_in(
        &self,
        sequence: SequenceId,
        strand: Strand,
        start: Coord,
        end: Coord,
    ) -> impl Iterator<Item = &BlockKey> + '_ {
        self.keys_for(sequence, strand)
            .filter(move |key| key.overlaps(start, end))
    }

    /// Keys whose range hint covers a single coordinate
    pub fn keys_at(
        &self,
        sequence: SequenceId,
        strand: Strand,
        coord: Coord,
    ) -> impl Iterator<Item = &BlockKey> + '_ {
        self.keys_for(sequence, strand)
            .filter(move |key| key.contains(coord))
    }

    /// The (sequence, strand) buckets present in the index
    pub fn buckets(&self) -> impl Iterator<Item = (SequenceId, Strand)> + '_ {
        self.buckets.keys().copied()
    }

    /// Smallest start and largest end recorded for a sequence on any strand
    pub fn extent(&self, sequence: SequenceId) -> Option<(Coord, Coord)> {
        self.keys_for(sequence, Strand::Any)
            .filter(|key| !key.is_empty())
            .fold(None, |acc, key| match acc {
                None => Some((key.min_start, key.max_end)),
                Some((lo, hi)) => Some((lo.min(key.min_start), hi.max(key.max_end))),
            })
    }

    /// Number of blocks
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Logical feature count: the sum of block sizes
    pub fn feature_count(&self) -> u64 {
        self.keys().map(|key| u64::from(key.len)).sum()
    }
}
