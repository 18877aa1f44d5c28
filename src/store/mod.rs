//! Persistent storage behind tracks: metadata, attribute bags and block bodies.
//!
//! Writers stage blocks for a track and make the track visible with a single
//! `publish_track` call. Readers only ever see published tracks, and every
//! block named by a published index is already durable.

pub mod catalog;
pub mod codec;
pub mod file;
pub mod format;
pub mod memory;

pub use catalog::Catalog;
pub use file::FileStore;
pub use memory::MemoryStore;

use crate::attributes::Attributes;
use crate::block::BlockBody;
use crate::error::{Result, TrackError};
use crate::index::{BlockIndex, BlockKey};
use crate::sequence::{Sequence, Topology};
use crate::{Coord, DatasetId, FeatureKind, SequenceId, TrackId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::PoisonError;

/// A genome and the tracks imported against it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub name: String,
    pub attributes: Attributes,
}

/// Everything about a published track except its block bodies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMeta {
    pub id: TrackId,
    pub dataset: DatasetId,
    pub name: String,
    pub kind: FeatureKind,
    pub attributes: Attributes,
    pub index: BlockIndex,
    /// Values per feature for matrix tracks, 0 otherwise
    pub columns: usize,
}

impl TrackMeta {
    pub fn feature_count(&self) -> u64 {
        self.index.feature_count()
    }
}

/// Object an attribute bag belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeOwner {
    Dataset(DatasetId),
    Sequence(SequenceId),
    Track(TrackId),
}

impl fmt::Display for AttributeOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeOwner::Dataset(id) => write!(f, "dataset {id}"),
            AttributeOwner::Sequence(id) => write!(f, "sequence {id}"),
            AttributeOwner::Track(id) => write!(f, "track {id}"),
        }
    }
}

/// Typed operations every storage backend provides
pub trait BlockStore: Send + Sync {
    fn create_dataset(&self, name: &str) -> Result<DatasetId>;

    fn datasets(&self) -> Result<Vec<Dataset>>;

    fn add_sequence(
        &self,
        dataset: DatasetId,
        name: &str,
        length: Coord,
        topology: Topology,
    ) -> Result<SequenceId>;

    fn sequences(&self, dataset: DatasetId) -> Result<Vec<Sequence>>;

    /// Published tracks of a dataset, in id order
    fn tracks(&self, dataset: DatasetId) -> Result<Vec<TrackMeta>>;

    fn track(&self, id: TrackId) -> Result<TrackMeta>;

    /// Remove a published track together with its blocks and attributes
    fn delete_track(&self, id: TrackId) -> Result<()>;

    fn attributes(&self, owner: AttributeOwner) -> Result<Attributes>;

    fn set_attribute(&self, owner: AttributeOwner, key: &str, value: &str) -> Result<()>;

    /// Reserve a track id and open a staging area for its blocks
    fn begin_track(&self, dataset: DatasetId) -> Result<TrackId>;

    /// Durably store one block of a staged track. Not visible until published.
    fn create_block(&self, key: &BlockKey, body: &BlockBody) -> Result<()>;

    /// Make a staged track visible. Fails, leaving nothing visible, unless
    /// every block named by `meta.index` was stored.
    fn publish_track(&self, meta: TrackMeta) -> Result<()>;

    /// Drop a staged track and its blocks. Published state is untouched.
    fn discard_track(&self, id: TrackId) -> Result<()>;

    fn load_block(&self, key: &BlockKey) -> Result<BlockBody>;
}

pub(crate) fn lock_poisoned<T>(_: PoisonError<T>) -> TrackError {
    TrackError::storage("store lock poisoned by a panicked writer")
}

pub(crate) fn missing_block(key: &BlockKey) -> TrackError {
    TrackError::storage(format!(
        "block {} of track {} is missing from the store",
        key.ordinal, key.track
    ))
}

pub(crate) fn not_staged(id: TrackId) -> TrackError {
    TrackError::storage(format!("track {id} is not being imported"))
}
