use super::{AttributeOwner, Dataset, TrackMeta};
use crate::attributes::Attributes;
use crate::error::{Result, TrackError};
use crate::sequence::{Sequence, Topology};
use crate::{Coord, DatasetId, SequenceId, TrackId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Published metadata of a store: datasets, sequences and tracks.
///
/// Staged (unpublished) tracks never appear here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    last_dataset: u64,
    last_sequence: u32,
    last_track: u64,
    datasets: BTreeMap<DatasetId, Dataset>,
    sequences: BTreeMap<SequenceId, Sequence>,
    tracks: BTreeMap<TrackId, TrackMeta>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_dataset(&mut self, name: &str) -> DatasetId {
        self.last_dataset += 1;
        let id = DatasetId(self.last_dataset);
        self.datasets.insert(
            id,
            Dataset {
                id,
                name: name.to_string(),
                attributes: Attributes::new(),
            },
        );
        id
    }

    pub fn datasets(&self) -> Vec<Dataset> {
        self.datasets.values().cloned().collect()
    }

    fn require_dataset(&self, dataset: DatasetId) -> Result<()> {
        if self.datasets.contains_key(&dataset) {
            Ok(())
        } else {
            Err(TrackError::NotFound(format!("dataset {dataset}")))
        }
    }

    pub fn add_sequence(
        &mut self,
        dataset: DatasetId,
        name: &str,
        length: Coord,
        topology: Topology,
    ) -> Result<SequenceId> {
        self.require_dataset(dataset)?;
        if self
            .sequences
            .values()
            .any(|s| s.dataset == dataset && s.name == name)
        {
            return Err(TrackError::storage(format!(
                "dataset {dataset} already has a sequence named {name:?}"
            )));
        }
        self.last_sequence += 1;
        let id = SequenceId(self.last_sequence);
        self.sequences.insert(
            id,
            Sequence {
                id,
                dataset,
                name: name.to_string(),
                length,
                topology,
                attributes: Attributes::new(),
            },
        );
        Ok(id)
    }

    pub fn sequences(&self, dataset: DatasetId) -> Result<Vec<Sequence>> {
        self.require_dataset(dataset)?;
        Ok(self
            .sequences
            .values()
            .filter(|s| s.dataset == dataset)
            .cloned()
            .collect())
    }

    pub fn tracks(&self, dataset: DatasetId) -> Result<Vec<TrackMeta>> {
        self.require_dataset(dataset)?;
        Ok(self
            .tracks
            .values()
            .filter(|t| t.dataset == dataset)
            .cloned()
            .collect())
    }

    pub fn track(&self, id: TrackId) -> Result<TrackMeta> {
        self.tracks
            .get(&id)
            .cloned()
            .ok_or_else(|| TrackError::NotFound(format!("track {id}")))
    }

    pub fn contains_track(&self, id: TrackId) -> bool {
        self.tracks.contains_key(&id)
    }

    /// Reserve an id for a track that will be published later
    pub fn allocate_track(&mut self, dataset: DatasetId) -> Result<TrackId> {
        self.require_dataset(dataset)?;
        self.last_track += 1;
        Ok(TrackId(self.last_track))
    }

    pub fn insert_track(&mut self, meta: TrackMeta) -> Result<()> {
        self.require_dataset(meta.dataset)?;
        if self.tracks.contains_key(&meta.id) {
            return Err(TrackError::storage(format!(
                "track {} is already published",
                meta.id
            )));
        }
        self.tracks.insert(meta.id, meta);
        Ok(())
    }

    pub fn remove_track(&mut self, id: TrackId) -> Result<TrackMeta> {
        self.tracks
            .remove(&id)
            .ok_or_else(|| TrackError::NotFound(format!("track {id}")))
    }

    pub fn attributes(&self, owner: AttributeOwner) -> Result<Attributes> {
        let attributes = match owner {
            AttributeOwner::Dataset(id) => self.datasets.get(&id).map(|d| &d.attributes),
            AttributeOwner::Sequence(id) => self.sequences.get(&id).map(|s| &s.attributes),
            AttributeOwner::Track(id) => self.tracks.get(&id).map(|t| &t.attributes),
        };
        attributes
            .cloned()
            .ok_or_else(|| TrackError::NotFound(owner.to_string()))
    }

    pub fn set_attribute(&mut self, owner: AttributeOwner, key: &str, value: &str) -> Result<()> {
        let attributes = match owner {
            AttributeOwner::Dataset(id) => self.datasets.get_mut(&id).map(|d| &mut d.attributes),
            AttributeOwner::Sequence(id) => {
                self.sequences.get_mut(&id).map(|s| &mut s.attributes)
            }
            AttributeOwner::Track(id) => self.tracks.get_mut(&id).map(|t| &mut t.attributes),
        };
        match attributes {
            Some(attributes) => {
                attributes.set(key, value);
                Ok(())
            }
            None => Err(TrackError::NotFound(owner.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BlockIndex, FeatureKind};

    fn meta(id: TrackId, dataset: DatasetId) -> TrackMeta {
        TrackMeta {
            id,
            dataset,
            name: "signal".to_string(),
            kind: FeatureKind::QuantitativeSegment,
            attributes: Attributes::new(),
            index: BlockIndex::new(),
            columns: 0,
        }
    }

    #[test]
    fn test_sequences_scoped_to_dataset() {
        let mut catalog = Catalog::new();
        let a = catalog.create_dataset("a");
        let b = catalog.create_dataset("b");
        catalog.add_sequence(a, "chr", 2_000_000, Topology::Circular).unwrap();
        catalog.add_sequence(b, "chr", 1_000, Topology::Linear).unwrap();
        assert!(catalog.add_sequence(a, "chr", 5, Topology::Linear).is_err());
        assert!(matches!(
            catalog.add_sequence(DatasetId(99), "x", 5, Topology::Linear),
            Err(TrackError::NotFound(_))
        ));

        let seqs = catalog.sequences(a).unwrap();
        assert_eq!(seqs.len(), 1);
        assert_eq!(seqs[0].topology, Topology::Circular);
    }

    #[test]
    fn test_track_lifecycle() {
        let mut catalog = Catalog::new();
        let ds = catalog.create_dataset("halo");
        let id = catalog.allocate_track(ds).unwrap();
        assert!(catalog.tracks(ds).unwrap().is_empty());

        catalog.insert_track(meta(id, ds)).unwrap();
        assert!(catalog.insert_track(meta(id, ds)).is_err());
        assert_eq!(catalog.tracks(ds).unwrap().len(), 1);

        catalog
            .set_attribute(AttributeOwner::Track(id), "color", "red")
            .unwrap();
        assert_eq!(
            catalog
                .attributes(AttributeOwner::Track(id))
                .unwrap()
                .get("color"),
            Some("red")
        );

        catalog.remove_track(id).unwrap();
        assert!(matches!(catalog.track(id), Err(TrackError::NotFound(_))));
        assert!(catalog
            .set_attribute(AttributeOwner::Track(id), "color", "blue")
            .is_err());
    }
}
