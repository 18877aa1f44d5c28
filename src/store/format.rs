use super::Catalog;
use crate::error::{Result, TrackError};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Version information for backwards compatibility
const CATALOG_FORMAT_VERSION: u32 = 1;
const CATALOG_MAGIC: &[u8] = b"TRKCAT\x00\x01";

/// Catalog file body as written
#[derive(Serialize)]
struct CatalogFileRef<'a> {
    version: u32,
    saved_timestamp: u64,
    catalog: &'a Catalog,
}

/// Catalog file body as read back
#[derive(Deserialize)]
struct CatalogFile {
    version: u32,
    saved_timestamp: u64,
    catalog: Catalog,
}

/// Catalog plus when it was last written
#[derive(Debug)]
pub struct LoadedCatalog {
    pub catalog: Catalog,
    pub saved_timestamp: u64,
}

/// Write the catalog next to `path` and rename it into place, so a reader
/// sees either the old or the new catalog, never a partial one.
pub fn save_catalog(path: &Path, catalog: &Catalog) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(CATALOG_MAGIC)?;

        let saved_timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let body = CatalogFileRef {
            version: CATALOG_FORMAT_VERSION,
            saved_timestamp,
            catalog,
        };
        bincode::serialize_into(&mut writer, &body)?;

        let file = writer
            .into_inner()
            .map_err(|e| TrackError::Io(e.into_error()))?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

pub fn load_catalog(path: &Path) -> Result<LoadedCatalog> {
    let mut reader = BufReader::new(File::open(path)?);

    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if magic != CATALOG_MAGIC {
        return Err(TrackError::storage(format!(
            "{} is not a track store catalog: wrong magic header",
            path.display()
        )));
    }

    let file: CatalogFile = bincode::deserialize_from(reader)?;
    if file.version > CATALOG_FORMAT_VERSION {
        return Err(TrackError::storage(format!(
            "catalog version {} is newer than supported version {}",
            file.version, CATALOG_FORMAT_VERSION
        )));
    }

    Ok(LoadedCatalog {
        catalog: file.catalog,
        saved_timestamp: file.saved_timestamp,
    })
}
