use super::format::{load_catalog, save_catalog};
use super::{
    codec, lock_poisoned, missing_block, not_staged, AttributeOwner, BlockStore, Catalog, Dataset,
    TrackMeta,
};
use crate::attributes::Attributes;
use crate::block::BlockBody;
use crate::error::{Result, TrackError};
use crate::index::BlockKey;
use crate::sequence::{Sequence, Topology};
use crate::{Coord, DatasetId, SequenceId, TrackId};
use fs2::FileExt;
use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

const CATALOG_FILE: &str = "catalog.bin";
const TRACKS_DIR: &str = "tracks";
const STAGING_DIR: &str = "staging";

/// Directory-backed store.
///
/// ```text
/// <root>/catalog.bin                 datasets, sequences, published track metadata
/// <root>/tracks/<track>/<n>.blk      published block bodies
/// <root>/staging/<track>/<n>.blk     blocks of imports in progress
/// <root>/staging/<track>.lock        held by the writer of that import
/// ```
///
/// Publishing renames the staging directory into `tracks/` and then swaps in
/// a new catalog, so a track's blocks are in place before its index is.
///
/// Each import holds an exclusive lock on its `.lock` file until it is
/// published or discarded. Opening a store only removes staging
/// directories whose lock nobody holds, so readers in other processes never
/// disturb a running import.
pub struct FileStore {
    root: PathBuf,
    catalog: RwLock<Catalog>,
    staged: Mutex<HashMap<TrackId, StagedTrack>>,
}

struct StagedTrack {
    dataset: DatasetId,
    /// Released when dropped
    _lock: File,
}

fn remove_dir_if_present(path: &Path) -> Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn remove_file_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    Ok(File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

/// Remove staging directories left behind by writers that are gone.
/// Returns how many were removed.
fn sweep_staging(staging: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(staging)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let lock_path = path.with_extension("lock");
        let lock = open_lock_file(&lock_path)?;
        if lock.try_lock_exclusive().is_err() {
            debug!(path = %path.display(), "import in progress, leaving staging data");
            continue;
        }
        remove_dir_if_present(&path)?;
        remove_file_if_present(&lock_path)?;
        removed += 1;
    }
    Ok(removed)
}

impl FileStore {
    /// Open the store at `root`, creating it when absent. Staging data left
    /// by an interrupted import is removed; imports still running elsewhere
    /// are left alone.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join(TRACKS_DIR))?;

        let staging = root.join(STAGING_DIR);
        fs::create_dir_all(&staging)?;
        let removed = sweep_staging(&staging)?;
        if removed > 0 {
            warn!(path = %staging.display(), removed, "removed unpublished imports");
        }

        let catalog_path = root.join(CATALOG_FILE);
        let catalog = if catalog_path.exists() {
            let loaded = load_catalog(&catalog_path)?;
            debug!(saved = loaded.saved_timestamp, "loaded catalog");
            loaded.catalog
        } else {
            let catalog = Catalog::new();
            save_catalog(&catalog_path, &catalog)?;
            catalog
        };
        info!(path = %root.display(), "opened track store");

        Ok(Self {
            root,
            catalog: RwLock::new(catalog),
            staged: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn track_dir(&self, id: TrackId) -> PathBuf {
        self.root.join(TRACKS_DIR).join(id.0.to_string())
    }

    fn staging_dir(&self, id: TrackId) -> PathBuf {
        self.root.join(STAGING_DIR).join(id.0.to_string())
    }

    fn lock_file(&self, id: TrackId) -> PathBuf {
        self.root.join(STAGING_DIR).join(format!("{}.lock", id.0))
    }

    fn block_file(dir: &Path, ordinal: u32) -> PathBuf {
        dir.join(format!("{ordinal}.blk"))
    }

    /// Apply a change to a copy of the catalog, persist it, then swap it in
    fn update<R>(&self, change: impl FnOnce(&mut Catalog) -> Result<R>) -> Result<R> {
        let mut catalog = self.catalog.write().map_err(lock_poisoned)?;
        let mut next = catalog.clone();
        let result = change(&mut next)?;
        save_catalog(&self.root.join(CATALOG_FILE), &next)?;
        *catalog = next;
        Ok(result)
    }

    fn staged_dataset(&self, id: TrackId) -> Result<DatasetId> {
        let staged = self.staged.lock().map_err(lock_poisoned)?;
        staged
            .get(&id)
            .map(|track| track.dataset)
            .ok_or_else(|| not_staged(id))
    }
}

impl BlockStore for FileStore {
    fn create_dataset(&self, name: &str) -> Result<DatasetId> {
        self.update(|catalog| Ok(catalog.create_dataset(name)))
    }

    fn datasets(&self) -> Result<Vec<Dataset>> {
        Ok(self.catalog.read().map_err(lock_poisoned)?.datasets())
    }

    fn add_sequence(
        &self,
        dataset: DatasetId,
        name: &str,
        length: Coord,
        topology: Topology,
    ) -> Result<SequenceId> {
        self.update(|catalog| catalog.add_sequence(dataset, name, length, topology))
    }

    fn sequences(&self, dataset: DatasetId) -> Result<Vec<Sequence>> {
        self.catalog.read().map_err(lock_poisoned)?.sequences(dataset)
    }

    fn tracks(&self, dataset: DatasetId) -> Result<Vec<TrackMeta>> {
        self.catalog.read().map_err(lock_poisoned)?.tracks(dataset)
    }

    fn track(&self, id: TrackId) -> Result<TrackMeta> {
        self.catalog.read().map_err(lock_poisoned)?.track(id)
    }

    fn delete_track(&self, id: TrackId) -> Result<()> {
        self.update(|catalog| catalog.remove_track(id).map(|_| ()))?;
        // Blocks of a track no longer in the catalog are unreachable, so a
        // failure here only leaks disk space.
        if let Err(e) = remove_dir_if_present(&self.track_dir(id)) {
            warn!(track = %id, error = %e, "could not remove block files of deleted track");
        }
        Ok(())
    }

    fn attributes(&self, owner: AttributeOwner) -> Result<Attributes> {
        self.catalog.read().map_err(lock_poisoned)?.attributes(owner)
    }

    fn set_attribute(&self, owner: AttributeOwner, key: &str, value: &str) -> Result<()> {
        self.update(|catalog| catalog.set_attribute(owner, key, value))
    }

    fn begin_track(&self, dataset: DatasetId) -> Result<TrackId> {
        let id = self.update(|catalog| catalog.allocate_track(dataset))?;
        // locked before the directory exists, so a sweep never sees it unowned
        let lock = open_lock_file(&self.lock_file(id))?;
        lock.try_lock_exclusive().map_err(|e| {
            TrackError::storage(format!("track {id} is already being imported elsewhere: {e}"))
        })?;
        fs::create_dir_all(self.staging_dir(id))?;
        self.staged
            .lock()
            .map_err(lock_poisoned)?
            .insert(id, StagedTrack { dataset, _lock: lock });
        Ok(id)
    }

    fn create_block(&self, key: &BlockKey, body: &BlockBody) -> Result<()> {
        self.staged_dataset(key.track)?;
        if body.len() != key.len() {
            return Err(TrackError::storage(format!(
                "block {} of track {} has {} rows, key says {}",
                key.ordinal,
                key.track,
                body.len(),
                key.len
            )));
        }

        let bytes = codec::encode_block(body)?;
        let path = Self::block_file(&self.staging_dir(key.track), key.ordinal);
        let mut file = File::create(&path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(())
    }

    fn publish_track(&self, meta: TrackMeta) -> Result<()> {
        let dataset = self.staged_dataset(meta.id)?;
        if dataset != meta.dataset {
            return Err(TrackError::storage(format!(
                "track {} was started in dataset {}, not {}",
                meta.id, dataset, meta.dataset
            )));
        }

        let staging = self.staging_dir(meta.id);
        if let Some(key) = meta
            .index
            .keys()
            .find(|key| !Self::block_file(&staging, key.ordinal).exists())
        {
            return Err(missing_block(key));
        }

        let id = meta.id;
        let published = self.track_dir(id);
        fs::rename(&staging, &published)?;
        if let Err(e) = self.update(|catalog| catalog.insert_track(meta)) {
            // Put the blocks back so the caller can still discard them
            if let Err(undo) = fs::rename(&published, &staging) {
                warn!(track = %id, error = %undo, "could not return blocks to staging");
            }
            return Err(e);
        }

        self.staged.lock().map_err(lock_poisoned)?.remove(&id);
        if let Err(e) = remove_file_if_present(&self.lock_file(id)) {
            warn!(track = %id, error = %e, "could not remove import lock");
        }
        debug!(track = %id, "published track");
        Ok(())
    }

    fn discard_track(&self, id: TrackId) -> Result<()> {
        let staged = self.staged.lock().map_err(lock_poisoned)?.remove(&id);
        if let Some(track) = staged {
            warn!(track = %id, "discarding staged track");
            remove_dir_if_present(&self.staging_dir(id))?;
            remove_file_if_present(&self.lock_file(id))?;
            drop(track);
        }
        Ok(())
    }

    fn load_block(&self, key: &BlockKey) -> Result<BlockBody> {
        let path = Self::block_file(&self.track_dir(key.track), key.ordinal);
        let file = File::open(&path).map_err(|e| {
            TrackError::storage(format!(
                "block {} of track {} could not be opened: {}",
                key.ordinal, key.track, e
            ))
        })?;
        let mmap = unsafe { Mmap::map(&file)? };
        codec::decode_block(&mmap).map_err(|e| {
            TrackError::storage(format!(
                "block {} of track {} is unreadable: {}",
                key.ordinal, key.track, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::PositionalColumns;
    use crate::index::BlockIndex;
    use crate::{FeatureKind, Strand};

    fn positional(rows: &[(Coord, f64)]) -> BlockBody {
        let mut columns = PositionalColumns::default();
        for &(position, value) in rows {
            columns.push(position, value);
        }
        BlockBody::Positional(columns)
    }

    fn stage(store: &FileStore, dataset: DatasetId, seq: SequenceId) -> (TrackMeta, BlockKey) {
        let id = store.begin_track(dataset).unwrap();
        let body = positional(&[(10, 1.0), (20, 2.0)]);
        let key = BlockKey {
            track: id,
            ordinal: 0,
            sequence: seq,
            strand: Strand::None,
            min_start: 10,
            max_end: 20,
            len: 2,
            first_row: 0,
        };
        store.create_block(&key, &body).unwrap();
        let mut index = BlockIndex::new();
        index.add(key.clone());
        let meta = TrackMeta {
            id,
            dataset,
            name: "coverage".into(),
            kind: FeatureKind::QuantitativePositional,
            attributes: Attributes::new(),
            index,
            columns: 0,
        };
        (meta, key)
    }

    #[test]
    fn test_publish_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let (ds, key) = {
            let store = FileStore::open(dir.path()).unwrap();
            let ds = store.create_dataset("halo").unwrap();
            let seq = store.add_sequence(ds, "chr", 1000, Topology::Circular).unwrap();
            let (meta, key) = stage(&store, ds, seq);
            assert!(store.load_block(&key).is_err());
            store.publish_track(meta).unwrap();
            store
                .set_attribute(AttributeOwner::Track(key.track), "top", "0.5")
                .unwrap();
            (ds, key)
        };

        let store = FileStore::open(dir.path()).unwrap();
        let tracks = store.tracks(ds).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].attributes.get("top"), Some("0.5"));
        assert_eq!(tracks[0].feature_count(), 2);
        assert_eq!(store.load_block(&key).unwrap(), positional(&[(10, 1.0), (20, 2.0)]));
    }

    #[test]
    fn test_interrupted_import_is_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let ds = {
            let store = FileStore::open(dir.path()).unwrap();
            let ds = store.create_dataset("halo").unwrap();
            let seq = store.add_sequence(ds, "chr", 1000, Topology::Linear).unwrap();
            stage(&store, ds, seq);
            ds
        };
        assert!(fs::read_dir(dir.path().join(STAGING_DIR)).unwrap().count() > 0);

        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(fs::read_dir(dir.path().join(STAGING_DIR)).unwrap().count(), 0);
        assert!(store.tracks(ds).unwrap().is_empty());
    }

    #[test]
    fn test_second_handle_leaves_running_import_alone() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FileStore::open(dir.path()).unwrap();
        let ds = writer.create_dataset("halo").unwrap();
        let seq = writer.add_sequence(ds, "chr", 1000, Topology::Linear).unwrap();
        let (mut meta, key) = stage(&writer, ds, seq);

        let reader = FileStore::open(dir.path()).unwrap();
        assert!(writer.staging_dir(key.track).exists());

        let second = BlockKey {
            ordinal: 1,
            min_start: 30,
            max_end: 40,
            first_row: 2,
            ..key.clone()
        };
        writer
            .create_block(&second, &positional(&[(30, 3.0), (40, 4.0)]))
            .unwrap();
        meta.index.add(second.clone());
        writer.publish_track(meta).unwrap();
        assert!(!writer.lock_file(key.track).exists());

        // a handle opened after the publish sees the track
        let later = FileStore::open(dir.path()).unwrap();
        assert_eq!(later.tracks(ds).unwrap()[0].feature_count(), 4);
        assert_eq!(later.load_block(&second).unwrap(), positional(&[(30, 3.0), (40, 4.0)]));
        drop(reader);
    }

    #[test]
    fn test_missing_or_corrupt_block_is_storage_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let ds = store.create_dataset("halo").unwrap();
        let seq = store.add_sequence(ds, "chr", 1000, Topology::Linear).unwrap();
        let (meta, key) = stage(&store, ds, seq);
        store.publish_track(meta).unwrap();

        let path = FileStore::block_file(&store.track_dir(key.track), 0);
        fs::write(&path, b"garbage").unwrap();
        assert!(store.load_block(&key).unwrap_err().is_storage_failure());

        fs::remove_file(&path).unwrap();
        assert!(store.load_block(&key).unwrap_err().is_storage_failure());
    }

    #[test]
    fn test_discard_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let ds = store.create_dataset("halo").unwrap();
        let seq = store.add_sequence(ds, "chr", 1000, Topology::Linear).unwrap();

        let (discarded, _) = stage(&store, ds, seq);
        store.discard_track(discarded.id).unwrap();
        assert!(!store.staging_dir(discarded.id).exists());
        assert!(!store.lock_file(discarded.id).exists());
        assert!(store.publish_track(discarded).is_err());

        let (meta, key) = stage(&store, ds, seq);
        store.publish_track(meta).unwrap();
        store.delete_track(key.track).unwrap();
        assert!(!store.track_dir(key.track).exists());
        assert!(store.tracks(ds).unwrap().is_empty());
    }
}
