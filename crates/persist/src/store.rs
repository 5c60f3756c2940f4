//! File-backed world persistence.
//!
//! Layout inside the store directory:
//! ```text
//! <world_id>/
//!   world.meta.json  - schema version, id, name, snapshot hash
//!   world.cbor.zst   - CBOR+zstd compressed world record
//! ```

use crate::record::{CreateWorldOptions, WorldMetadata, WorldRecord};
use craftsync_common::WorldId;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Current schema version of the world snapshot.
const WORLD_SCHEMA_VERSION: u32 = 1;

const META_FILE: &str = "world.meta.json";
const SNAPSHOT_FILE: &str = "world.cbor.zst";

/// Errors from persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
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
    #[error("world {0} not found")]
    NotFound(WorldId),
    #[error("invalid world id {0:?}")]
    InvalidWorldId(String),
}

/// Storage contract for worlds.
pub trait PersistenceStore: Send + Sync {
    /// Create, persist and return an empty world.
    fn create_world(&self, options: CreateWorldOptions) -> Result<WorldRecord, StoreError>;

    fn get_world(&self, id: &WorldId) -> Result<Option<WorldRecord>, StoreError>;

    /// Insert or overwrite the world with `world.world_id`.
    fn save_world(&self, world: &WorldRecord) -> Result<(), StoreError>;

    fn list_worlds(&self) -> Result<Vec<WorldMetadata>, StoreError>;

    /// Returns `false` if the world did not exist.
    fn delete_world(&self, id: &WorldId) -> Result<bool, StoreError>;
}

/// Metadata stored in world.meta.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldMeta {
    pub world_schema_version: u32,
    pub world_id: WorldId,
    pub name: String,
    /// SHA-256 of the compressed snapshot file.
    pub sha256: String,
}

/// One directory per world, each holding metadata and a compressed snapshot.
pub struct FileWorldStore {
    root: PathBuf,
}

impl FileWorldStore {
    /// Open or create a store rooted at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn world_dir(&self, id: &WorldId) -> Result<PathBuf, StoreError> {
        let raw = id.as_str();
        let valid = !raw.is_empty()
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StoreError::InvalidWorldId(raw.to_owned()));
        }
        Ok(self.root.join(raw))
    }

    fn read_meta(&self, dir: &Path, id: &WorldId) -> Result<WorldMeta, StoreError> {
        let meta_path = dir.join(META_FILE);
        if !meta_path.exists() {
            return Err(StoreError::NotFound(id.clone()));
        }
        let meta: WorldMeta = serde_json::from_reader(std::fs::File::open(&meta_path)?)?;
        if meta.world_schema_version != WORLD_SCHEMA_VERSION {
            return Err(StoreError::SchemaMismatch {
                file_version: meta.world_schema_version,
                expected_version: WORLD_SCHEMA_VERSION,
            });
        }
        Ok(meta)
    }

    fn load(&self, id: &WorldId) -> Result<WorldRecord, StoreError> {
        let dir = self.world_dir(id)?;
        let meta = self.read_meta(&dir, id)?;
        let compressed = std::fs::read(dir.join(SNAPSHOT_FILE))?;

        let actual = sha256_hex(&compressed);
        if actual != meta.sha256 {
            return Err(StoreError::IntegrityMismatch {
                expected: meta.sha256,
                actual,
            });
        }

        let cbor_bytes = zstd_decompress(&compressed)?;
        cbor_deserialize(&cbor_bytes)
    }
}

impl PersistenceStore for FileWorldStore {
    fn create_world(&self, options: CreateWorldOptions) -> Result<WorldRecord, StoreError> {
        let world = WorldRecord::new(options);
        self.save_world(&world)?;
        tracing::info!(world = %world.world_id, name = %world.name, "world created");
        Ok(world)
    }

    fn get_world(&self, id: &WorldId) -> Result<Option<WorldRecord>, StoreError> {
        match self.load(id) {
            Ok(world) => Ok(Some(world)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save_world(&self, world: &WorldRecord) -> Result<(), StoreError> {
        let dir = self.world_dir(&world.world_id)?;
        std::fs::create_dir_all(&dir)?;

        let cbor_bytes = cbor_serialize(world)?;
        let compressed = zstd_compress(&cbor_bytes)?;
        let meta = WorldMeta {
            world_schema_version: WORLD_SCHEMA_VERSION,
            world_id: world.world_id.clone(),
            name: world.name.clone(),
            sha256: sha256_hex(&compressed),
        };

        // Snapshot first, then the meta that vouches for it.
        write_replace(&dir.join(SNAPSHOT_FILE), &compressed)?;
        write_replace(&dir.join(META_FILE), &serde_json::to_vec_pretty(&meta)?)?;
        tracing::debug!(
            world = %world.world_id,
            entities = world.entities.len(),
            chunks = world.chunks.len(),
            bytes = compressed.len(),
            "world saved"
        );
        Ok(())
    }

    fn list_worlds(&self) -> Result<Vec<WorldMetadata>, StoreError> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let id = WorldId(entry.file_name().to_string_lossy().into_owned());
            match self.read_meta(&entry.path(), &id) {
                Ok(meta) => out.push(WorldMetadata {
                    world_id: meta.world_id,
                    name: meta.name,
                }),
                Err(e) => tracing::warn!(dir = %entry.path().display(), error = %e, "skipping world"),
            }
        }
        out.sort_by(|a, b| a.world_id.cmp(&b.world_id));
        Ok(out)
    }

    fn delete_world(&self, id: &WorldId) -> Result<bool, StoreError> {
        let dir = self.world_dir(id)?;
        if !dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir)?;
        tracing::info!(world = %id, "world deleted");
        Ok(true)
    }
}

/// Write to a sibling temp file and rename over `path`.
fn write_replace(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn cbor_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::CborEncode(e.to_string()))?;
    Ok(buf)
}

fn cbor_deserialize<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, StoreError> {
    ciborium::from_reader(data).map_err(|e| StoreError::CborDecode(e.to_string()))
}

fn zstd_compress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut encoder = zstd::Encoder::new(Vec::new(), 3)?;
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

fn zstd_decompress(data: &[u8]) -> Result<Vec<u8>, StoreError> {
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
    use crate::record::WorldConfig;
    use craftsync_common::{BlockData, BlockType, ChunkPos, EntityUid, InnerChunkPos};
    use craftsync_kernel::{Chunk, Entity};

    fn options(name: &str) -> CreateWorldOptions {
        CreateWorldOptions {
            name: name.into(),
            config: WorldConfig::default(),
        }
    }

    fn populated(store: &FileWorldStore) -> WorldRecord {
        let mut world = store.create_world(options("alpha")).unwrap();
        let mut chunk = Chunk::new(ChunkPos::new(0, 0));
        chunk.set_block(InnerChunkPos::new(1, 1, 1), BlockType::Gold, BlockData::None);
        world.chunks.push(chunk.serialize());
        world
            .entities
            .push(Entity::projectile(EntityUid::from("b"), glam::Vec3::ONE, glam::Vec3::X, 5).to_record());
        store.save_world(&world).unwrap();
        world
    }

    #[test]
    fn create_then_get_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileWorldStore::open(tmp.path().join("worlds")).unwrap();
        let world = populated(&store);

        let reopened = FileWorldStore::open(tmp.path().join("worlds")).unwrap();
        let loaded = reopened.get_world(&world.world_id).unwrap().unwrap();
        assert_eq!(loaded, world);
        assert!(store.root().join(world.world_id.as_str()).join(META_FILE).is_file());
    }

    #[test]
    fn missing_world_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileWorldStore::open(tmp.path()).unwrap();
        assert!(store.get_world(&WorldId::from("nope")).unwrap().is_none());
        assert!(!store.delete_world(&WorldId::from("nope")).unwrap());
    }

    #[test]
    fn list_reports_every_world() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileWorldStore::open(tmp.path()).unwrap();
        let a = store.create_world(options("a")).unwrap();
        let b = store.create_world(options("b")).unwrap();
        std::fs::create_dir(tmp.path().join("stray")).unwrap();

        let listed = store.list_worlds().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.contains(&a.metadata()));
        assert!(listed.contains(&b.metadata()));
    }

    #[test]
    fn delete_removes_the_world() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileWorldStore::open(tmp.path()).unwrap();
        let world = store.create_world(options("gone")).unwrap();
        assert!(store.delete_world(&world.world_id).unwrap());
        assert!(store.get_world(&world.world_id).unwrap().is_none());
        assert!(store.list_worlds().unwrap().is_empty());
    }

    #[test]
    fn integrity_fail_closed_on_corruption() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileWorldStore::open(tmp.path()).unwrap();
        let world = populated(&store);

        let snap_path = tmp.path().join(world.world_id.as_str()).join(SNAPSHOT_FILE);
        let mut data = std::fs::read(&snap_path).unwrap();
        if let Some(byte) = data.last_mut() {
            *byte ^= 0xff;
        }
        std::fs::write(&snap_path, &data).unwrap();

        assert!(matches!(
            store.get_world(&world.world_id),
            Err(StoreError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn schema_mismatch_fail_closed() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileWorldStore::open(tmp.path()).unwrap();
        let world = store.create_world(options("old")).unwrap();

        let meta_path = tmp.path().join(world.world_id.as_str()).join(META_FILE);
        let mut meta: WorldMeta =
            serde_json::from_reader(std::fs::File::open(&meta_path).unwrap()).unwrap();
        meta.world_schema_version = 999;
        serde_json::to_writer_pretty(std::fs::File::create(&meta_path).unwrap(), &meta).unwrap();

        match store.get_world(&world.world_id) {
            Err(StoreError::SchemaMismatch {
                file_version,
                expected_version,
            }) => {
                assert_eq!(file_version, 999);
                assert_eq!(expected_version, WORLD_SCHEMA_VERSION);
            }
            Err(e) => panic!("expected SchemaMismatch, got: {e}"),
            Ok(_) => panic!("expected error, got Ok"),
        }
    }

    #[test]
    fn path_like_ids_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileWorldStore::open(tmp.path()).unwrap();
        assert!(matches!(
            store.get_world(&WorldId::from("../etc")),
            Err(StoreError::InvalidWorldId(_))
        ));
    }
}
