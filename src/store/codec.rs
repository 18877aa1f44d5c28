//! On-disk encoding of a single block body.
//!
//! Layout: 6-byte magic, u16 format version, u64 uncompressed length (both
//! little endian), then the bincode body compressed as raw DEFLATE.

use crate::block::BlockBody;
use crate::error::{Result, TrackError};
use libdeflater::{CompressionLvl, Compressor, Decompressor};
use std::cell::RefCell;

const BLOCK_MAGIC: &[u8; 6] = b"TRKBLK";
const BLOCK_FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 16;

/// DEFLATE cannot expand data by more than this factor
const MAX_DEFLATE_RATIO: usize = 1032;

thread_local! {
    static COMPRESSOR: RefCell<Compressor> = RefCell::new(Compressor::new(CompressionLvl::default()));
    static DECOMPRESSOR: RefCell<Decompressor> = RefCell::new(Decompressor::new());
}

pub fn encode_block(body: &BlockBody) -> Result<Vec<u8>> {
    let raw = bincode::serialize(body)?;

    COMPRESSOR.with(|compressor| {
        let mut compressor = compressor.borrow_mut();
        let bound = compressor.deflate_compress_bound(raw.len());
        let mut out = vec![0u8; HEADER_LEN + bound];

        out[..6].copy_from_slice(BLOCK_MAGIC);
        out[6..8].copy_from_slice(&BLOCK_FORMAT_VERSION.to_le_bytes());
        out[8..16].copy_from_slice(&(raw.len() as u64).to_le_bytes());

        let compressed = compressor
            .deflate_compress(&raw, &mut out[HEADER_LEN..])
            .map_err(|e| TrackError::storage(format!("block compression failed: {:?}", e)))?;
        out.truncate(HEADER_LEN + compressed);
        Ok(out)
    })
}

pub fn decode_block(bytes: &[u8]) -> Result<BlockBody> {
    if bytes.len() < HEADER_LEN || &bytes[..6] != BLOCK_MAGIC {
        return Err(TrackError::storage("not a block file: wrong magic header"));
    }

    let mut version = [0u8; 2];
    version.copy_from_slice(&bytes[6..8]);
    let version = u16::from_le_bytes(version);
    if version > BLOCK_FORMAT_VERSION {
        return Err(TrackError::storage(format!(
            "block format version {} is newer than supported version {}",
            version, BLOCK_FORMAT_VERSION
        )));
    }

    let mut raw_len = [0u8; 8];
    raw_len.copy_from_slice(&bytes[8..16]);
    let raw_len = usize::try_from(u64::from_le_bytes(raw_len))
        .map_err(|_| TrackError::storage("block length does not fit in memory"))?;
    let payload = &bytes[HEADER_LEN..];
    if raw_len > payload.len().saturating_mul(MAX_DEFLATE_RATIO) {
        return Err(TrackError::storage("block header length is corrupt"));
    }

    DECOMPRESSOR.with(|decompressor| {
        let mut decompressor = decompressor.borrow_mut();
        let mut raw = vec![0u8; raw_len];
        let written = decompressor
            .deflate_decompress(payload, &mut raw)
            .map_err(|e| TrackError::storage(format!("block decompression failed: {:?}", e)))?;
        if written != raw_len {
            return Err(TrackError::storage(format!(
                "block decompressed to {} bytes, header says {}",
                written, raw_len
            )));
        }
        Ok(bincode::deserialize(&raw)?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{GeneColumns, MatrixColumns};
    use crate::GeneType;

    #[test]
    fn test_encode_decode() {
        let mut genes = GeneColumns::default();
        for i in 0..500 {
            genes.push(i * 10, i * 10 + 9, &format!("gene{i}"), "", GeneType::Cds);
        }
        let body = BlockBody::Gene(genes);
        let bytes = encode_block(&body).unwrap();
        assert_eq!(&bytes[..6], BLOCK_MAGIC);
        assert_eq!(decode_block(&bytes).unwrap(), body);

        let empty = BlockBody::Matrix(MatrixColumns::with_width(4));
        assert_eq!(decode_block(&encode_block(&empty).unwrap()).unwrap(), empty);
    }

    #[test]
    fn test_rejects_damage() {
        let body = BlockBody::Matrix(MatrixColumns::with_width(2));
        let mut bytes = encode_block(&body).unwrap();

        assert!(decode_block(&bytes[..10]).unwrap_err().is_storage_failure());

        let mut wrong_magic = bytes.clone();
        wrong_magic[0] = b'X';
        assert!(decode_block(&wrong_magic).is_err());

        let mut newer = bytes.clone();
        newer[6] = 9;
        assert!(decode_block(&newer).is_err());

        bytes.truncate(HEADER_LEN + 1);
        assert!(decode_block(&bytes).unwrap_err().is_storage_failure());
    }
}
