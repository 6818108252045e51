//! File-backed thing persistence.
//!
//! Layout inside the db directory:
//! ```text
//! things.meta.json           - schema version and generation count
//! generations/
//!   000001.things.cbor.zst   - CBOR+zstd compressed thing maps
//! integrity/
//!   manifest.json            - hash chain manifest
//! ```

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thingspace_common::ThingId;
use thingspace_kernel::Thing;

/// Current on-disk schema version.
const THINGS_SCHEMA_VERSION: u32 = 1;

/// Errors from file-backed persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CBOR serialization error: {0}")]
    CborEncode(String),
    #[error("CBOR deserialization error: {0}")]
    CborDecode(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("no saved generations")]
    Empty,
}

/// Metadata stored in things.meta.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbMeta {
    pub schema_version: u32,
    pub generation_count: u32,
}

/// A single entry in the integrity manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub filename: String,
    pub sha256: String,
    pub prev_hash: Option<String>,
}

/// Integrity manifest tracking generation hashes in a chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityManifest {
    pub entries: Vec<ManifestEntry>,
}

/// Durable key-value store for the thing map.
///
/// Each save writes the full map as a new generation; `load_latest` restores
/// the newest one. The hot map stays in memory (`ThingStore`); this layer
/// makes it durable across lifecycle boundaries.
pub struct ThingDb {
    root: PathBuf,
    meta: DbMeta,
    manifest: IntegrityManifest,
}

impl ThingDb {
    /// Open or create a thing db at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join("generations"))?;
        std::fs::create_dir_all(root.join("integrity"))?;

        let meta_path = root.join("things.meta.json");
        let manifest_path = root.join("integrity").join("manifest.json");

        let (meta, manifest) = if meta_path.exists() {
            let meta: DbMeta = serde_json::from_reader(std::fs::File::open(&meta_path)?)?;
            if meta.schema_version != THINGS_SCHEMA_VERSION {
                return Err(DbError::SchemaMismatch {
                    file_version: meta.schema_version,
                    expected_version: THINGS_SCHEMA_VERSION,
                });
            }
            let manifest: IntegrityManifest = if manifest_path.exists() {
                serde_json::from_reader(std::fs::File::open(&manifest_path)?)?
            } else {
                IntegrityManifest::default()
            };
            (meta, manifest)
        } else {
            let meta = DbMeta {
                schema_version: THINGS_SCHEMA_VERSION,
                generation_count: 0,
            };
            let manifest = IntegrityManifest::default();
            serde_json::to_writer_pretty(std::fs::File::create(&meta_path)?, &meta)?;
            serde_json::to_writer_pretty(std::fs::File::create(&manifest_path)?, &manifest)?;
            (meta, manifest)
        };

        Ok(Self {
            root,
            meta,
            manifest,
        })
    }

    /// Save the thing map as a new generation.
    pub fn save(&mut self, things: &HashMap<ThingId, Thing>) -> Result<(), DbError> {
        self.meta.generation_count += 1;
        let filename = format!("{:06}.things.cbor.zst", self.meta.generation_count);
        let path = self.root.join("generations").join(&filename);

        let cbor_bytes = cbor_serialize(things)?;
        let compressed = zstd_compress(&cbor_bytes)?;

        let hash = sha256_hex(&compressed);
        let prev_hash = self.manifest.entries.last().map(|e| e.sha256.clone());

        std::fs::write(&path, &compressed)?;

        self.manifest.entries.push(ManifestEntry {
            filename,
            sha256: hash,
            prev_hash,
        });

        self.save_meta()?;
        self.save_manifest()?;
        tracing::info!(
            generation = self.meta.generation_count,
            things = things.len(),
            "saved thing generation"
        );
        Ok(())
    }

    /// Load the newest saved generation, verifying its hash first.
    pub fn load_latest(&self) -> Result<HashMap<ThingId, Thing>, DbError> {
        if self.meta.generation_count == 0 {
            return Err(DbError::Empty);
        }
        let filename = format!("{:06}.things.cbor.zst", self.meta.generation_count);
        let path = self.root.join("generations").join(&filename);
        let compressed = std::fs::read(&path)?;

        self.verify_file_hash(&filename, &compressed)?;

        let cbor_bytes = zstd_decompress(&compressed)?;
        cbor_deserialize(&cbor_bytes)
    }

    /// Verify all hashes and chain continuity in the manifest.
    pub fn verify_integrity(&self) -> Result<(), DbError> {
        let mut prev_hash: Option<String> = None;
        for entry in &self.manifest.entries {
            if entry.prev_hash != prev_hash {
                return Err(DbError::IntegrityMismatch {
                    expected: prev_hash.unwrap_or_else(|| "None".into()),
                    actual: entry.prev_hash.clone().unwrap_or_else(|| "None".into()),
                });
            }

            let path = self.root.join("generations").join(&entry.filename);
            let data = std::fs::read(&path)?;
            let actual_hash = sha256_hex(&data);
            if actual_hash != entry.sha256 {
                return Err(DbError::IntegrityMismatch {
                    expected: entry.sha256.clone(),
                    actual: actual_hash,
                });
            }

            prev_hash = Some(entry.sha256.clone());
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generation_count(&self) -> u32 {
        self.meta.generation_count
    }

    fn verify_file_hash(&self, filename: &str, data: &[u8]) -> Result<(), DbError> {
        let actual = sha256_hex(data);
        for entry in &self.manifest.entries {
            if entry.filename == filename {
                if entry.sha256 != actual {
                    return Err(DbError::IntegrityMismatch {
                        expected: entry.sha256.clone(),
                        actual,
                    });
                }
                return Ok(());
            }
        }
        // File not in manifest is OK for first-time creation
        Ok(())
    }

    fn save_meta(&self) -> Result<(), DbError> {
        let path = self.root.join("things.meta.json");
        serde_json::to_writer_pretty(std::fs::File::create(path)?, &self.meta)?;
        Ok(())
    }

    fn save_manifest(&self) -> Result<(), DbError> {
        let path = self.root.join("integrity").join("manifest.json");
        serde_json::to_writer_pretty(std::fs::File::create(path)?, &self.manifest)?;
        Ok(())
    }
}

fn cbor_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, DbError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| DbError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn cbor_deserialize<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DbError> {
    ciborium::from_reader(data).map_err(|e| DbError::CborDecode(e.to_string()))
}

fn zstd_compress(data: &[u8]) -> Result<Vec<u8>, DbError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, DbError> {
    let mut decoder = zstd::Decoder::new(data)?;
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use thingspace_common::ClassId;

    fn make_map(count: u64) -> HashMap<ThingId, Thing> {
        let mut map = HashMap::new();
        for i in 1..=count {
            let mut t = Thing::new(ThingId(i), ClassId(1), 1);
            t.initialize();
            t.set_location(Vec3::new(i as f32, 0.0, -(i as f32)));
            map.insert(t.id(), t);
        }
        map
    }

    #[test]
    fn open_creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let db = ThingDb::open(tmp.path().join("things")).unwrap();
        assert_eq!(db.generation_count(), 0);
        assert!(db.root().join("generations").is_dir());
        assert!(db.root().join("integrity").is_dir());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let mut db = ThingDb::open(tmp.path().join("things")).unwrap();

        let map = make_map(3);
        db.save(&map).unwrap();

        // Reopen and load
        let db2 = ThingDb::open(tmp.path().join("things")).unwrap();
        assert_eq!(db2.generation_count(), 1);
        let loaded = db2.load_latest().unwrap();
        assert_eq!(loaded.len(), 3);
        let back = &loaded[&ThingId(2)];
        assert_eq!(back.location(), Vec3::new(2.0, 0.0, -2.0));
        assert_eq!(back.state(), map[&ThingId(2)].state());
    }

    #[test]
    fn load_without_generations_is_empty_error() {
        let tmp = tempfile::tempdir().unwrap();
        let db = ThingDb::open(tmp.path().join("things")).unwrap();
        assert!(matches!(db.load_latest(), Err(DbError::Empty)));
    }

    #[test]
    fn integrity_fail_closed_on_corruption() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("things");
        let mut db = ThingDb::open(&path).unwrap();
        db.save(&make_map(2)).unwrap();

        // Corrupt the generation file
        let gen_path = path.join("generations").join("000001.things.cbor.zst");
        let mut data = std::fs::read(&gen_path).unwrap();
        if let Some(byte) = data.last_mut() {
            *byte ^= 0xff;
        }
        std::fs::write(&gen_path, &data).unwrap();

        let db2 = ThingDb::open(&path).unwrap();
        assert!(db2.verify_integrity().is_err());
        assert!(db2.load_latest().is_err());
    }

    #[test]
    fn hash_chain_links_generations() {
        let tmp = tempfile::tempdir().unwrap();
        let mut db = ThingDb::open(tmp.path().join("things")).unwrap();
        db.save(&make_map(1)).unwrap();
        db.save(&make_map(2)).unwrap();

        assert_eq!(db.generation_count(), 2);
        db.verify_integrity().unwrap();
        let loaded = db.load_latest().unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn schema_mismatch_fail_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("things");
        let _db = ThingDb::open(&path).unwrap();

        // Tamper with the meta file to have a wrong version
        let meta_path = path.join("things.meta.json");
        let mut meta: DbMeta =
            serde_json::from_reader(std::fs::File::open(&meta_path).unwrap()).unwrap();
        meta.schema_version = 999;
        serde_json::to_writer_pretty(std::fs::File::create(&meta_path).unwrap(), &meta).unwrap();

        match ThingDb::open(&path) {
            Err(DbError::SchemaMismatch {
                file_version,
                expected_version,
            }) => {
                assert_eq!(file_version, 999);
                assert_eq!(expected_version, THINGS_SCHEMA_VERSION);
            }
            Err(e) => panic!("expected SchemaMismatch, got: {e}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }
}
