//! Portable on-disk layout for a [`VectorIndex`]
//!
//! ```text
//! magic      4 bytes  "RMIX"
//! version    u32 LE
//! rows       u64 LE
//! dimension  u64 LE
//! header_len u64 LE
//! header     JSON {"metadata": ..., "documents": [...]}
//! matrix     rows * dimension f32 LE, row-major
//! checksum   SHA-256 over everything above
//! ```

use crate::error::{Result, RoamerError};
use crate::index::{Document, IndexMetadata, VectorIndex};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::debug;

pub const MAGIC: &[u8; 4] = b"RMIX";
pub const FORMAT_VERSION: u32 = 1;

const CHECKSUM_LEN: usize = 32;
const FIXED_HEADER_LEN: usize = 4 + 4 + 8 + 8 + 8;

#[derive(Serialize)]
struct HeaderRef<'a> {
    metadata: &'a IndexMetadata,
    documents: &'a [Document],
}

#[derive(Deserialize)]
struct Header {
    metadata: IndexMetadata,
    documents: Vec<Document>,
}

pub fn encode(index: &VectorIndex) -> Result<Vec<u8>> {
    let header = serde_json::to_vec(&HeaderRef {
        metadata: index.metadata(),
        documents: index.documents(),
    })?;

    let matrix = index.matrix();
    let mut bytes = Vec::with_capacity(
        FIXED_HEADER_LEN + header.len() + std::mem::size_of_val(matrix) + CHECKSUM_LEN,
    );
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&(index.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&(index.dimension() as u64).to_le_bytes());
    bytes.extend_from_slice(&(header.len() as u64).to_le_bytes());
    bytes.extend_from_slice(&header);
    for row in index.rows() {
        for &value in row {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
    }

    let checksum = Sha256::digest(&bytes);
    bytes.extend_from_slice(&checksum);
    Ok(bytes)
}

/// Sequential reader over the payload (checksum already stripped).
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize, what: &str) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| RoamerError::CorruptIndex(format!("truncated {}", what)))?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self, what: &str) -> Result<u64> {
        let b = self.take(8, what)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    fn remaining(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

fn to_usize(v: u64, what: &str) -> Result<usize> {
    usize::try_from(v).map_err(|_| RoamerError::CorruptIndex(format!("{} out of range", what)))
}

pub fn decode(bytes: &[u8]) -> Result<VectorIndex> {
    if bytes.len() < FIXED_HEADER_LEN + CHECKSUM_LEN {
        return Err(RoamerError::CorruptIndex("file too short".to_string()));
    }

    let (payload, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    if Sha256::digest(payload).as_slice() != checksum {
        return Err(RoamerError::CorruptIndex("checksum mismatch".to_string()));
    }

    let mut cursor = Cursor {
        buf: payload,
        pos: 0,
    };

    if cursor.take(4, "magic")? != MAGIC {
        return Err(RoamerError::CorruptIndex("not a roamer index file".to_string()));
    }
    let version = cursor.u32("version")?;
    if version != FORMAT_VERSION {
        return Err(RoamerError::CorruptIndex(format!(
            "unsupported format version {}",
            version
        )));
    }

    let rows = to_usize(cursor.u64("row count")?, "row count")?;
    let dimension = to_usize(cursor.u64("dimension")?, "dimension")?;
    let header_len = to_usize(cursor.u64("header length")?, "header length")?;
    let header: Header = serde_json::from_slice(cursor.take(header_len, "header")?)?;

    if header.metadata.embedding_dimension != dimension {
        return Err(RoamerError::DimensionMismatch {
            expected: header.metadata.embedding_dimension,
            actual: dimension,
        });
    }
    if header.metadata.num_documents != rows || header.documents.len() != rows {
        return Err(RoamerError::CorruptIndex(format!(
            "row count {} disagrees with metadata ({}) or documents ({})",
            rows,
            header.metadata.num_documents,
            header.documents.len()
        )));
    }

    let matrix_bytes = cursor.remaining();
    let expected_len = rows
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(std::mem::size_of::<f32>()))
        .ok_or_else(|| RoamerError::CorruptIndex("matrix size overflow".to_string()))?;
    if matrix_bytes.len() != expected_len {
        if rows > 0 && matrix_bytes.len() % (rows * std::mem::size_of::<f32>()) == 0 {
            return Err(RoamerError::DimensionMismatch {
                expected: dimension,
                actual: matrix_bytes.len() / (rows * std::mem::size_of::<f32>()),
            });
        }
        return Err(RoamerError::CorruptIndex(format!(
            "matrix holds {} bytes, expected {}",
            matrix_bytes.len(),
            expected_len
        )));
    }

    let mut matrix = Vec::with_capacity(rows * dimension);
    for chunk in matrix_bytes.chunks_exact(4) {
        let value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        if !value.is_finite() {
            return Err(RoamerError::CorruptIndex(
                "embedding contains non-finite values".to_string(),
            ));
        }
        matrix.push(value);
    }

    VectorIndex::from_matrix(matrix, header.documents, header.metadata)
}

/// Write `index` to `path` via a sibling temp file and rename, so a reader
/// never opens a half-written index.
pub fn save(index: &VectorIndex, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let bytes = encode(index)?;
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;

    debug!(path = %path.display(), bytes = bytes.len(), "Saved vector index");
    Ok(())
}

pub fn load(path: &Path) -> Result<VectorIndex> {
    if !path.exists() {
        return Err(RoamerError::Configuration(format!(
            "Index file not found: {}",
            path.display()
        )));
    }
    let bytes = fs::read(path)?;
    decode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::fixtures::{experiences, metadata, unit_destinations};
    use crate::index::CollectionKind;
    use tempfile::TempDir;

    #[test]
    fn test_file_round_trip_is_lossless() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("indexes").join(CollectionKind::Experience.file_name());

        let original = experiences();
        save(&original, &path).unwrap();
        let loaded = load(&path).unwrap();

        assert_eq!(loaded, original);
        assert_eq!(loaded.dimension(), 3);
        assert_eq!(loaded.metadata().built_at, original.metadata().built_at);
        assert!(!path.with_extension("rmx.tmp").exists());
    }

    #[test]
    fn test_round_trip_preserves_bits() {
        let docs = vec![crate::index::fixtures::doc(serde_json::json!({
            "destination_id": "D1",
            "tags": ["coast", {"nested": true}],
            "cost_index": 3
        }))];
        let row = vec![f32::MIN_POSITIVE, -0.0, 1.0e-30, 0.333_333_34];
        let original =
            VectorIndex::new(vec![row.clone()], docs, metadata(CollectionKind::Destination, 4, 1))
                .unwrap();

        let decoded = decode(&encode(&original).unwrap()).unwrap();
        let bits: Vec<u32> = decoded.row(0).unwrap().iter().map(|f| f.to_bits()).collect();
        let expected: Vec<u32> = row.iter().map(|f| f.to_bits()).collect();
        assert_eq!(bits, expected);
        assert_eq!(decoded.documents(), original.documents());
    }

    #[test]
    fn test_detects_corruption() {
        let mut bytes = encode(&unit_destinations()).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        assert!(matches!(decode(&bytes), Err(RoamerError::CorruptIndex(_))));
    }

    #[test]
    fn test_rejects_wrong_magic() {
        let mut bytes = encode(&unit_destinations()).unwrap();
        bytes[0] = b'X';
        let body_len = bytes.len() - CHECKSUM_LEN;
        let checksum = Sha256::digest(&bytes[..body_len]);
        bytes[body_len..].copy_from_slice(&checksum);
        assert!(matches!(decode(&bytes), Err(RoamerError::CorruptIndex(_))));
    }

    #[test]
    fn test_declared_dimension_must_match_matrix() {
        let index = unit_destinations();
        let mut bytes = encode(&index).unwrap();
        // Rewrite the dimension field (offset 16) from 5 to 4 and re-seal.
        bytes[16..24].copy_from_slice(&4u64.to_le_bytes());
        let body_len = bytes.len() - CHECKSUM_LEN;
        let checksum = Sha256::digest(&bytes[..body_len]);
        bytes[body_len..].copy_from_slice(&checksum);

        assert!(matches!(
            decode(&bytes),
            Err(RoamerError::DimensionMismatch {
                expected: 5,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let dir = TempDir::new().unwrap();
        let result = load(&dir.path().join("destination_index.rmx"));
        assert!(matches!(result, Err(RoamerError::Configuration(_))));
    }
}
