use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::store::SpeakerEntry;
use crate::RegistryError;

/// What to do when the snapshot blob fails to decode at load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptPolicy {
    /// Surface [`RegistryError::CorruptSnapshot`] and refuse to open.
    #[default]
    Fail,
    /// Log a warning and start with an empty registry. The corrupt
    /// blob is overwritten by the next save.
    Reset,
    /// Move the corrupt blob aside via [`SnapshotStore::quarantine`],
    /// then start with an empty registry.
    Quarantine,
}

/// Persists the registry's single snapshot blob.
///
/// Implementations must be safe for concurrent use.
/// Use [`MemoryStore`] for in-memory storage (testing/ephemeral).
pub trait SnapshotStore: Send + Sync {
    /// Returns the current blob, or `None` if no snapshot has been
    /// written yet. A missing snapshot is not an error.
    fn read(&self) -> Result<Option<Vec<u8>>, RegistryError>;

    /// Replaces the snapshot with `blob`. No atomicity guarantee: a
    /// crash mid-write can leave a torn blob behind, which the next
    /// load reports as corrupt.
    fn write(&self, blob: &[u8]) -> Result<(), RegistryError>;

    /// Moves the current blob aside so the next write starts fresh.
    /// Returns a label for the quarantined copy (e.g. the backup
    /// path), or `None` if there was nothing to move.
    fn quarantine(&self) -> Result<Option<String>, RegistryError>;
}

/// File-backed [`SnapshotStore`]: one blob at a fixed path.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the snapshot file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for FileStore {
    fn read(&self) -> Result<Option<Vec<u8>>, RegistryError> {
        match fs::read(&self.path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RegistryError::Store(format!(
                "read {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn write(&self, blob: &[u8]) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    RegistryError::Store(format!("create {}: {e}", parent.display()))
                })?;
            }
        }
        fs::write(&self.path, blob)
            .map_err(|e| RegistryError::Store(format!("write {}: {e}", self.path.display())))
    }

    fn quarantine(&self) -> Result<Option<String>, RegistryError> {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let mut dest = self.path.clone().into_os_string();
        dest.push(format!(".corrupt-{ts}"));
        let dest = PathBuf::from(dest);
        match fs::rename(&self.path, &dest) {
            Ok(()) => Ok(Some(dest.display().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RegistryError::Store(format!(
                "quarantine {}: {e}",
                self.path.display()
            ))),
        }
    }
}

/// In-memory [`SnapshotStore`] implementation.
/// Data is lost on restart. Suitable for testing or ephemeral use.
pub struct MemoryStore {
    blob: Mutex<Option<Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            blob: Mutex::new(None),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore for MemoryStore {
    fn read(&self) -> Result<Option<Vec<u8>>, RegistryError> {
        Ok(self.blob.lock().unwrap().clone())
    }

    fn write(&self, blob: &[u8]) -> Result<(), RegistryError> {
        *self.blob.lock().unwrap() = Some(blob.to_vec());
        Ok(())
    }

    fn quarantine(&self) -> Result<Option<String>, RegistryError> {
        Ok(self.blob.lock().unwrap().take().map(|_| "memory".to_string()))
    }
}

/// Snapshot wire record: one speaker and everything enrolled for it.
/// Field names are part of the on-disk format.
#[derive(Serialize)]
struct RecordRef<'a> {
    id: &'a str,
    embeddings: &'a [Vec<f32>],
}

#[derive(Deserialize)]
struct Record {
    id: String,
    embeddings: StoredEmbeddings,
}

/// Accepts both the current shape (a list of embeddings) and the
/// legacy shape (one bare embedding per speaker). Legacy entries
/// normalize to a one-element list on load.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEmbeddings {
    Many(Vec<Vec<f32>>),
    One(Vec<f32>),
}

impl StoredEmbeddings {
    fn into_vec(self) -> Vec<Vec<f32>> {
        match self {
            StoredEmbeddings::Many(v) => v,
            StoredEmbeddings::One(e) => vec![e],
        }
    }
}

/// Encodes the speaker table as a MessagePack record array, preserving
/// registration order.
pub(crate) fn encode(entries: &[SpeakerEntry]) -> Result<Vec<u8>, RegistryError> {
    let records: Vec<RecordRef<'_>> = entries
        .iter()
        .map(|e| RecordRef {
            id: &e.id,
            embeddings: &e.embeddings,
        })
        .collect();
    rmp_serde::to_vec_named(&records).map_err(|e| RegistryError::Serialization(e.to_string()))
}

/// Decodes a snapshot blob back into the speaker table.
///
/// Duplicate speaker ids make the blob corrupt. Entries with no
/// embeddings are dropped: they cannot be produced by normal operation
/// and carry nothing to match against.
pub(crate) fn decode(blob: &[u8]) -> Result<Vec<SpeakerEntry>, RegistryError> {
    let records: Vec<Record> =
        rmp_serde::from_slice(blob).map_err(|e| RegistryError::CorruptSnapshot(e.to_string()))?;

    let mut entries: Vec<SpeakerEntry> = Vec::with_capacity(records.len());
    for rec in records {
        if entries.iter().any(|e| e.id == rec.id) {
            return Err(RegistryError::CorruptSnapshot(format!(
                "duplicate speaker id {:?}",
                rec.id
            )));
        }
        let embeddings = rec.embeddings.into_vec();
        if embeddings.is_empty() {
            tracing::debug!(speaker = %rec.id, "dropping snapshot entry with no embeddings");
            continue;
        }
        entries.push(SpeakerEntry {
            id: rec.id,
            embeddings,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, embeddings: Vec<Vec<f32>>) -> SpeakerEntry {
        SpeakerEntry {
            id: id.to_string(),
            embeddings,
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let entries = vec![
            entry("alice", vec![vec![1.0, 0.0, 0.0], vec![0.9, 0.1, 0.0]]),
            entry("bob", vec![vec![0.0, 1.0, 0.0]]),
        ];
        let blob = encode(&entries).unwrap();
        let back = decode(&blob).unwrap();

        assert_eq!(back.len(), 2);
        assert_eq!(back[0].id, "alice");
        assert_eq!(back[0].embeddings, entries[0].embeddings);
        assert_eq!(back[1].id, "bob");
        assert_eq!(back[1].embeddings, entries[1].embeddings);
    }

    #[test]
    fn decode_preserves_order() {
        let entries: Vec<SpeakerEntry> = (0..10)
            .map(|i| entry(&format!("s{i}"), vec![vec![i as f32]]))
            .collect();
        let blob = encode(&entries).unwrap();
        let back = decode(&blob).unwrap();
        let ids: Vec<&str> = back.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "s8", "s9"]);
    }

    #[test]
    fn legacy_single_embedding_decodes() {
        // Older snapshots stored one bare embedding per speaker.
        #[derive(Serialize)]
        struct LegacyRecord<'a> {
            id: &'a str,
            embeddings: &'a [f32],
        }
        let blob = rmp_serde::to_vec_named(&vec![
            LegacyRecord {
                id: "alice",
                embeddings: &[1.0, 0.0, 0.0],
            },
            LegacyRecord {
                id: "bob",
                embeddings: &[0.0, 1.0, 0.0],
            },
        ])
        .unwrap();

        let back = decode(&blob).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].id, "alice");
        assert_eq!(back[0].embeddings, vec![vec![1.0, 0.0, 0.0]]);
        assert_eq!(back[1].embeddings, vec![vec![0.0, 1.0, 0.0]]);
    }

    #[test]
    fn duplicate_id_is_corrupt() {
        let entries = vec![
            entry("alice", vec![vec![1.0]]),
            entry("alice", vec![vec![2.0]]),
        ];
        let blob = encode(&entries).unwrap();
        assert!(matches!(
            decode(&blob),
            Err(RegistryError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn empty_entry_dropped() {
        let entries = vec![entry("ghost", vec![]), entry("alice", vec![vec![1.0]])];
        let blob = encode(&entries).unwrap();
        let back = decode(&blob).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].id, "alice");
    }

    #[test]
    fn garbage_blob_is_corrupt() {
        assert!(matches!(
            decode(b"definitely not msgpack"),
            Err(RegistryError::CorruptSnapshot(_))
        ));
    }

    #[test]
    fn empty_table_roundtrips() {
        let blob = encode(&[]).unwrap();
        let back = decode(&blob).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn file_store_missing_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent.msgpack"));
        assert!(store.read().unwrap().is_none());
    }

    #[test]
    fn file_store_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("speakers.msgpack"));
        store.write(b"blob-one").unwrap();
        assert_eq!(store.read().unwrap().unwrap(), b"blob-one");
        store.write(b"blob-two").unwrap();
        assert_eq!(store.read().unwrap().unwrap(), b"blob-two");
    }

    #[test]
    fn file_store_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nested/deeper/s.msgpack"));
        store.write(b"x").unwrap();
        assert_eq!(store.read().unwrap().unwrap(), b"x");
    }

    #[test]
    fn file_store_quarantine_moves_blob() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speakers.msgpack");
        let store = FileStore::new(&path);
        store.write(b"torn").unwrap();

        let label = store.quarantine().unwrap();
        assert!(label.is_some());
        assert!(!path.exists());
        assert!(label.unwrap().contains(".corrupt-"));

        // Nothing left to quarantine.
        assert!(store.quarantine().unwrap().is_none());
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.read().unwrap().is_none());
        store.write(b"abc").unwrap();
        assert_eq!(store.read().unwrap().unwrap(), b"abc");
        assert!(store.quarantine().unwrap().is_some());
        assert!(store.read().unwrap().is_none());
    }
}
