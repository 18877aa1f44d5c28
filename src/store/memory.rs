use super::{
    lock_poisoned, missing_block, not_staged, AttributeOwner, BlockStore, Catalog, Dataset,
    TrackMeta,
};
use crate::attributes::Attributes;
use crate::block::BlockBody;
use crate::error::{Result, TrackError};
use crate::index::BlockKey;
use crate::sequence::{Sequence, Topology};
use crate::{Coord, DatasetId, SequenceId, TrackId};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::{debug, warn};

struct StagedTrack {
    dataset: DatasetId,
    blocks: HashMap<u32, BlockBody>,
}

#[derive(Default)]
struct State {
    catalog: Catalog,
    blocks: HashMap<(TrackId, u32), BlockBody>,
    staged: HashMap<TrackId, StagedTrack>,
}

/// Store that keeps everything in process memory
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of published block bodies held
    pub fn block_count(&self) -> usize {
        self.state
            .read()
            .map(|state| state.blocks.len())
            .unwrap_or(0)
    }

    /// Number of tracks currently being imported
    pub fn staged_count(&self) -> usize {
        self.state
            .read()
            .map(|state| state.staged.len())
            .unwrap_or(0)
    }
}

impl BlockStore for MemoryStore {
    fn create_dataset(&self, name: &str) -> Result<DatasetId> {
        let mut state = self.state.write().map_err(lock_poisoned)?;
        Ok(state.catalog.create_dataset(name))
    }

    fn datasets(&self) -> Result<Vec<Dataset>> {
        let state = self.state.read().map_err(lock_poisoned)?;
        Ok(state.catalog.datasets())
    }

    fn add_sequence(
        &self,
        dataset: DatasetId,
        name: &str,
        length: Coord,
        topology: Topology,
    ) -> Result<SequenceId> {
        let mut state = self.state.write().map_err(lock_poisoned)?;
        state.catalog.add_sequence(dataset, name, length, topology)
    }

    fn sequences(&self, dataset: DatasetId) -> Result<Vec<Sequence>> {
        let state = self.state.read().map_err(lock_poisoned)?;
        state.catalog.sequences(dataset)
    }

    fn tracks(&self, dataset: DatasetId) -> Result<Vec<TrackMeta>> {
        let state = self.state.read().map_err(lock_poisoned)?;
        state.catalog.tracks(dataset)
    }

    fn track(&self, id: TrackId) -> Result<TrackMeta> {
        let state = self.state.read().map_err(lock_poisoned)?;
        state.catalog.track(id)
    }

    fn delete_track(&self, id: TrackId) -> Result<()> {
        let mut state = self.state.write().map_err(lock_poisoned)?;
        state.catalog.remove_track(id)?;
        state.blocks.retain(|(track, _), _| *track != id);
        debug!(track = %id, "deleted track");
        Ok(())
    }

    fn attributes(&self, owner: AttributeOwner) -> Result<Attributes> {
        let state = self.state.read().map_err(lock_poisoned)?;
        state.catalog.attributes(owner)
    }

    fn set_attribute(&self, owner: AttributeOwner, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.write().map_err(lock_poisoned)?;
        state.catalog.set_attribute(owner, key, value)
    }

    fn begin_track(&self, dataset: DatasetId) -> Result<TrackId> {
        let mut state = self.state.write().map_err(lock_poisoned)?;
        let id = state.catalog.allocate_track(dataset)?;
        state.staged.insert(
            id,
            StagedTrack {
                dataset,
                blocks: HashMap::new(),
            },
        );
        Ok(id)
    }

    fn create_block(&self, key: &BlockKey, body: &BlockBody) -> Result<()> {
        if body.len() != key.len() {
            return Err(TrackError::storage(format!(
                "block {} of track {} has {} rows, key says {}",
                key.ordinal,
                key.track,
                body.len(),
                key.len
            )));
        }
        let mut state = self.state.write().map_err(lock_poisoned)?;
        let staged = state
            .staged
            .get_mut(&key.track)
            .ok_or_else(|| not_staged(key.track))?;
        staged.blocks.insert(key.ordinal, body.clone());
        Ok(())
    }

    fn publish_track(&self, meta: TrackMeta) -> Result<()> {
        let mut state = self.state.write().map_err(lock_poisoned)?;
        let staged = state.staged.get(&meta.id).ok_or_else(|| not_staged(meta.id))?;
        if staged.dataset != meta.dataset {
            return Err(TrackError::storage(format!(
                "track {} was started in dataset {}, not {}",
                meta.id, staged.dataset, meta.dataset
            )));
        }
        if let Some(key) = meta
            .index
            .keys()
            .find(|key| !staged.blocks.contains_key(&key.ordinal))
        {
            return Err(missing_block(key));
        }

        let id = meta.id;
        state.catalog.insert_track(meta)?;
        if let Some(staged) = state.staged.remove(&id) {
            for (ordinal, body) in staged.blocks {
                state.blocks.insert((id, ordinal), body);
            }
        }
        debug!(track = %id, "published track");
        Ok(())
    }

    fn discard_track(&self, id: TrackId) -> Result<()> {
        let mut state = self.state.write().map_err(lock_poisoned)?;
        if let Some(staged) = state.staged.remove(&id) {
            warn!(track = %id, blocks = staged.blocks.len(), "discarded staged track");
        }
        Ok(())
    }

    fn load_block(&self, key: &BlockKey) -> Result<BlockBody> {
        let state = self.state.read().map_err(lock_poisoned)?;
        state
            .blocks
            .get(&(key.track, key.ordinal))
            .cloned()
            .ok_or_else(|| missing_block(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::SegmentColumns;
    use crate::index::BlockIndex;
    use crate::{FeatureKind, Strand};

    fn key(track: TrackId, ordinal: u32, seq: SequenceId) -> BlockKey {
        BlockKey {
            track,
            ordinal,
            sequence: seq,
            strand: Strand::Forward,
            min_start: 1,
            max_end: 5,
            len: 1,
            first_row: u64::from(ordinal),
        }
    }

    fn body() -> BlockBody {
        let mut columns = SegmentColumns::default();
        columns.push(1, 5, 0.25);
        BlockBody::Segment(columns)
    }

    fn meta(id: TrackId, dataset: DatasetId, keys: &[BlockKey]) -> TrackMeta {
        let mut index = BlockIndex::new();
        for key in keys {
            index.add(key.clone());
        }
        TrackMeta {
            id,
            dataset,
            name: "t".into(),
            kind: FeatureKind::QuantitativeSegment,
            attributes: Attributes::new(),
            index,
            columns: 0,
        }
    }

    #[test]
    fn test_blocks_invisible_until_published() {
        let store = MemoryStore::new();
        let ds = store.create_dataset("d").unwrap();
        let seq = store.add_sequence(ds, "chr", 100, Topology::Linear).unwrap();
        let id = store.begin_track(ds).unwrap();
        let k = key(id, 0, seq);
        store.create_block(&k, &body()).unwrap();

        assert!(store.load_block(&k).unwrap_err().is_storage_failure());
        assert!(store.tracks(ds).unwrap().is_empty());

        store.publish_track(meta(id, ds, &[k.clone()])).unwrap();
        assert_eq!(store.load_block(&k).unwrap(), body());
        assert_eq!(store.tracks(ds).unwrap().len(), 1);
        assert_eq!(store.staged_count(), 0);
    }

    #[test]
    fn test_publish_requires_every_block() {
        let store = MemoryStore::new();
        let ds = store.create_dataset("d").unwrap();
        let seq = store.add_sequence(ds, "chr", 100, Topology::Linear).unwrap();
        let id = store.begin_track(ds).unwrap();
        let k0 = key(id, 0, seq);
        let k1 = key(id, 1, seq);
        store.create_block(&k0, &body()).unwrap();

        let err = store.publish_track(meta(id, ds, &[k0.clone(), k1])).unwrap_err();
        assert!(err.is_storage_failure());
        assert!(store.tracks(ds).unwrap().is_empty());

        store.discard_track(id).unwrap();
        assert_eq!(store.staged_count(), 0);
        assert!(store.create_block(&k0, &body()).is_err());
    }

    #[test]
    fn test_delete_track_drops_blocks() {
        let store = MemoryStore::new();
        let ds = store.create_dataset("d").unwrap();
        let seq = store.add_sequence(ds, "chr", 100, Topology::Linear).unwrap();
        let id = store.begin_track(ds).unwrap();
        let k = key(id, 0, seq);
        store.create_block(&k, &body()).unwrap();
        store.publish_track(meta(id, ds, &[k])).unwrap();
        assert_eq!(store.block_count(), 1);

        store.delete_track(id).unwrap();
        assert_eq!(store.block_count(), 0);
        assert!(matches!(store.track(id), Err(TrackError::NotFound(_))));
        assert!(matches!(store.delete_track(id), Err(TrackError::NotFound(_))));
    }
}
