use crate::snapshot::{decode, encode, CorruptPolicy, SnapshotStore};
use crate::RegistryError;

/// One registered speaker: id plus every embedding enrolled for it, in
/// enrollment order.
#[derive(Debug, Clone)]
pub(crate) struct SpeakerEntry {
    pub id: String,
    pub embeddings: Vec<Vec<f32>>,
}

/// In-memory speaker table backed by a [`SnapshotStore`].
///
/// Entries keep registration order and lookups are linear; registries
/// live in the tens-to-hundreds of speakers, not millions. The dirty
/// flag tracks mutations that have not reached the snapshot yet.
pub(crate) struct SpeakerStore {
    entries: Vec<SpeakerEntry>,
    store: Box<dyn SnapshotStore>,
    dirty: bool,
}

impl SpeakerStore {
    /// Loads the table from `store`, applying `policy` when the blob
    /// fails to decode. A missing blob is an empty table.
    pub(crate) fn open(
        store: Box<dyn SnapshotStore>,
        policy: CorruptPolicy,
    ) -> Result<Self, RegistryError> {
        let entries = match store.read()? {
            None => Vec::new(),
            Some(blob) => match decode(&blob) {
                Ok(entries) => entries,
                Err(err) => match policy {
                    CorruptPolicy::Fail => return Err(err),
                    CorruptPolicy::Reset => {
                        tracing::warn!(error = %err, "corrupt snapshot, starting empty");
                        Vec::new()
                    }
                    CorruptPolicy::Quarantine => {
                        let moved = store.quarantine()?;
                        tracing::warn!(
                            error = %err,
                            quarantined = moved.as_deref().unwrap_or("nothing"),
                            "corrupt snapshot moved aside, starting empty"
                        );
                        Vec::new()
                    }
                },
            },
        };
        Ok(Self {
            entries,
            store,
            dirty: false,
        })
    }

    /// Creates an empty table over `store` without reading it.
    pub(crate) fn empty(store: Box<dyn SnapshotStore>) -> Self {
        Self {
            entries: Vec::new(),
            store,
            dirty: false,
        }
    }

    /// Appends an embedding, creating the speaker on first enrollment.
    /// With `cap` set, the oldest embeddings are dropped to stay within
    /// the bound.
    pub(crate) fn append(&mut self, id: &str, embedding: Vec<f32>, cap: Option<usize>) {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.embeddings.push(embedding);
                if let Some(cap) = cap {
                    while entry.embeddings.len() > cap {
                        entry.embeddings.remove(0);
                    }
                }
            }
            None => self.entries.push(SpeakerEntry {
                id: id.to_string(),
                embeddings: vec![embedding],
            }),
        }
        self.dirty = true;
    }

    /// Removes a speaker and all of its embeddings.
    pub(crate) fn remove(&mut self, id: &str) -> Result<(), RegistryError> {
        match self.entries.iter().position(|e| e.id == id) {
            Some(idx) => {
                self.entries.remove(idx);
                self.dirty = true;
                Ok(())
            }
            None => Err(RegistryError::SpeakerNotFound(id.to_string())),
        }
    }

    /// Encodes the table and writes the snapshot. The dirty flag clears
    /// only on success, so a failed save can be retried.
    pub(crate) fn save(&mut self) -> Result<(), RegistryError> {
        let blob = encode(&self.entries)?;
        self.store.write(&blob)?;
        self.dirty = false;
        Ok(())
    }

    pub(crate) fn get(&self, id: &str) -> Option<&SpeakerEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub(crate) fn entries(&self) -> &[SpeakerEntry] {
        &self.entries
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn dirty(&self) -> bool {
        self.dirty
    }
}
