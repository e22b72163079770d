//! Content-addressed object storage backing the embedded VCS.

use crate::error::{CkptError, Result};
use crate::object_id::{canonical_bytes, ObjectId, ObjectKind, HEADER_LEN, MAGIC};
use crate::vcs::{CommitRecord, Tree};
use serde::{de::DeserializeOwned, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Maximum size for a single file blob (512 MB).
const MAX_BLOB_SIZE: usize = 512 * 1024 * 1024;

/// Content-addressed object storage.
///
/// Objects are zstd-compressed canonical envelopes stored at
/// `{root}/{shard}/{hex}`. Reads verify the BLAKE3 id.
pub struct ObjectStore {
    root: PathBuf,
    compression_level: i32,
}

impl ObjectStore {
    /// Creates a store at the given root directory with default compression.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self::with_compression(root, 3)
    }

    /// Creates a store with an explicit zstd level.
    pub fn with_compression(root: impl AsRef<Path>, compression_level: i32) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            compression_level,
        }
    }

    /// Returns the root directory of this object store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stores file contents and returns their id. Existing objects are not rewritten.
    pub fn put_blob(&self, data: &[u8]) -> Result<ObjectId> {
        if data.len() > MAX_BLOB_SIZE {
            return Err(CkptError::VersionControl(format!(
                "blob too large: {} bytes exceeds limit of {} bytes",
                data.len(),
                MAX_BLOB_SIZE
            )));
        }
        self.put_raw(ObjectKind::Blob, data)
    }

    /// Retrieves file contents by id.
    pub fn get_blob(&self, id: ObjectId) -> Result<Vec<u8>> {
        self.read_expecting(id, ObjectKind::Blob)
    }

    /// Stores a directory listing.
    pub fn put_tree(&self, tree: &Tree) -> Result<ObjectId> {
        self.put_typed(ObjectKind::Tree, tree)
    }

    /// Loads a directory listing.
    pub fn get_tree(&self, id: ObjectId) -> Result<Tree> {
        self.get_typed(id, ObjectKind::Tree)
    }

    /// Stores a commit record.
    pub fn put_commit(&self, commit: &CommitRecord) -> Result<ObjectId> {
        self.put_typed(ObjectKind::Commit, commit)
    }

    /// Loads a commit record.
    pub fn get_commit(&self, id: ObjectId) -> Result<CommitRecord> {
        self.get_typed(id, ObjectKind::Commit)
    }

    /// Checks if an object exists in the store.
    pub fn exists(&self, id: ObjectId) -> bool {
        self.object_path(id).exists()
    }

    /// Lists every stored object with its on-disk size and modification time.
    pub fn list_all_objects(&self) -> Result<Vec<(ObjectId, u64, SystemTime)>> {
        let mut objects = Vec::new();

        if !self.root.exists() {
            return Ok(objects);
        }

        for shard_entry in fs::read_dir(&self.root)? {
            let shard_path = shard_entry?.path();
            if !shard_path.is_dir() {
                continue;
            }

            for obj_entry in fs::read_dir(&shard_path)? {
                let obj_path = obj_entry?.path();

                // Skip temp files
                if !obj_path.is_file() || obj_path.extension().is_some() {
                    continue;
                }

                let Some(id) = obj_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .and_then(|n| ObjectId::from_hex(n).ok())
                else {
                    continue;
                };

                let metadata = fs::metadata(&obj_path)?;
                let mtime = metadata.modified().unwrap_or_else(|_| SystemTime::now());
                objects.push((id, metadata.len(), mtime));
            }
        }

        Ok(objects)
    }

    /// Deletes an object. Only garbage collection should call this.
    pub(crate) fn delete(&self, id: ObjectId) -> Result<()> {
        let path = self.object_path(id);
        if !path.exists() {
            return Err(CkptError::ObjectNotFound(id.as_hex()));
        }
        fs::remove_file(&path)?;
        Ok(())
    }

    /// Computes the filesystem path for an object.
    fn object_path(&self, id: ObjectId) -> PathBuf {
        self.root.join(id.shard()).join(id.as_hex())
    }

    fn put_typed<T: Serialize>(&self, kind: ObjectKind, value: &T) -> Result<ObjectId> {
        let serialized =
            postcard::to_allocvec(value).map_err(|e| CkptError::Serialization(e.to_string()))?;
        self.put_raw(kind, &serialized)
    }

    fn get_typed<T: DeserializeOwned>(&self, id: ObjectId, kind: ObjectKind) -> Result<T> {
        let payload = self.read_expecting(id, kind)?;
        postcard::from_bytes(&payload).map_err(|e| CkptError::CorruptedObject {
            path: self.object_path(id),
            reason: format!("undecodable {:?}: {}", kind, e),
        })
    }

    fn put_raw(&self, kind: ObjectKind, payload: &[u8]) -> Result<ObjectId> {
        let id = ObjectId::hash_object(kind, payload);

        // Deduplication
        if self.exists(id) {
            return Ok(id);
        }

        let canonical = canonical_bytes(kind, payload);
        self.write_object(id, &canonical)?;
        Ok(id)
    }

    fn read_expecting(&self, id: ObjectId, expected: ObjectKind) -> Result<Vec<u8>> {
        let (kind, payload) = self.read_object(id)?;
        if kind != expected {
            return Err(CkptError::CorruptedObject {
                path: self.object_path(id),
                reason: format!("expected {:?}, got {:?}", expected, kind),
            });
        }
        Ok(payload)
    }

    /// Writes compressed canonical bytes to disk atomically.
    fn write_object(&self, id: ObjectId, canonical: &[u8]) -> Result<()> {
        let path = self.object_path(id);
        let dir = self.root.join(id.shard());
        fs::create_dir_all(&dir)?;

        let compressed = zstd::encode_all(canonical, self.compression_level)
            .map_err(|e| CkptError::Compression(e.to_string()))?;

        // Unique temp name so concurrent writers of the same object don't collide
        let tmp_path = dir.join(format!("{}.{}.tmp", id.as_hex(), uuid::Uuid::new_v4().simple()));
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&compressed)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &path)?;

        #[cfg(unix)]
        {
            if let Ok(dir_file) = File::open(&dir) {
                let _ = dir_file.sync_all();
            }
        }

        Ok(())
    }

    /// Reads and verifies an object from disk.
    fn read_object(&self, id: ObjectId) -> Result<(ObjectKind, Vec<u8>)> {
        let path = self.object_path(id);

        if !path.exists() {
            return Err(CkptError::ObjectNotFound(id.as_hex()));
        }

        let compressed = fs::read(&path)?;
        let canonical = zstd::decode_all(compressed.as_slice())
            .map_err(|e| CkptError::Compression(e.to_string()))?;

        if canonical.len() < HEADER_LEN {
            return Err(CkptError::CorruptedObject {
                path,
                reason: "object too small".to_string(),
            });
        }

        if &canonical[..5] != MAGIC {
            return Err(CkptError::CorruptedObject {
                path,
                reason: "invalid magic bytes".to_string(),
            });
        }

        let Some(kind) = ObjectKind::from_u8(canonical[5]) else {
            return Err(CkptError::CorruptedObject {
                path,
                reason: format!("unknown kind: {}", canonical[5]),
            });
        };

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&canonical[6..HEADER_LEN]);
        let len = u64::from_le_bytes(len_bytes) as usize;
        let payload = &canonical[HEADER_LEN..];

        if payload.len() != len {
            return Err(CkptError::CorruptedObject {
                path,
                reason: format!(
                    "length mismatch: header says {}, got {}",
                    len,
                    payload.len()
                ),
            });
        }

        let actual = ObjectId::hash_object(kind, payload);
        if actual != id {
            return Err(CkptError::HashMismatch {
                expected: id.as_hex(),
                actual: actual.as_hex(),
            });
        }

        Ok((kind, payload.to_vec()))
    }
}
