use std::path::Path;
use std::sync::Arc;

use voxid_embed::Extractor;

use crate::batch::BatchFailurePolicy;
use crate::matcher::best_match;
use crate::snapshot::{CorruptPolicy, FileStore, MemoryStore, SnapshotStore};
use crate::store::SpeakerStore;
use crate::RegistryError;

/// Controls registry behavior.
#[derive(Debug, Clone, Default)]
pub struct RegistryConfig {
    /// What to do when the snapshot fails to decode at load.
    /// Default: [`CorruptPolicy::Fail`].
    pub corrupt_policy: CorruptPolicy,

    /// How batch registration reacts to a failing item.
    /// Default: [`BatchFailurePolicy::Abort`].
    pub batch_failure: BatchFailurePolicy,

    /// Upper bound on stored embeddings per speaker; `None` keeps every
    /// enrollment. Enforced on registration, oldest dropped first.
    /// Default: `None`.
    pub max_embeddings_per_speaker: Option<usize>,
}

/// Outcome of an identification query.
#[derive(Debug, Clone, PartialEq)]
pub struct Identification {
    /// Matched speaker id, or `None` when the best score fell below the
    /// threshold (or the registry is empty).
    pub speaker: Option<String>,
    /// Best cosine similarity seen. `-1.0` means the registry was
    /// empty: there was nothing to compare against.
    pub score: f32,
}

/// Registered speaker summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerInfo {
    /// Stable caller-chosen identifier.
    pub id: String,
    /// Number of embeddings enrolled for this speaker.
    pub count: usize,
}

/// Speaker registry: enrollment, identification, durable snapshots.
///
/// The registry owns its [`SnapshotStore`] and [`Extractor`], both
/// injected at construction. Mutating operations take `&mut self`;
/// to share a registry across tasks, wrap it in a lock and keep
/// extraction outside the critical section via
/// [`Registry::identify_embedding`] / [`Registry::register_embedding`].
pub struct Registry {
    cfg: RegistryConfig,
    extractor: Arc<dyn Extractor>,
    store: SpeakerStore,
}

impl Registry {
    /// Opens a registry over `store`, loading any existing snapshot.
    /// A missing snapshot starts an empty registry; an unreadable or
    /// corrupt one is handled per [`RegistryConfig::corrupt_policy`].
    ///
    /// Panics if `cfg.max_embeddings_per_speaker` is `Some(0)`.
    pub fn new(
        cfg: RegistryConfig,
        extractor: Arc<dyn Extractor>,
        store: Box<dyn SnapshotStore>,
    ) -> Result<Self, RegistryError> {
        assert!(
            cfg.max_embeddings_per_speaker != Some(0),
            "voxid: max_embeddings_per_speaker must be at least 1"
        );
        let store = SpeakerStore::open(store, cfg.corrupt_policy)?;
        tracing::debug!(speakers = store.len(), "registry loaded");
        Ok(Self {
            cfg,
            extractor,
            store,
        })
    }

    /// Opens a file-backed registry with its snapshot at `path`.
    pub fn open(
        cfg: RegistryConfig,
        extractor: Arc<dyn Extractor>,
        path: impl AsRef<Path>,
    ) -> Result<Self, RegistryError> {
        Self::new(cfg, extractor, Box::new(FileStore::new(path.as_ref())))
    }

    /// Creates a registry with a default in-memory store.
    pub fn with_memory_store(cfg: RegistryConfig, extractor: Arc<dyn Extractor>) -> Self {
        assert!(
            cfg.max_embeddings_per_speaker != Some(0),
            "voxid: max_embeddings_per_speaker must be at least 1"
        );
        Self {
            cfg,
            extractor,
            store: SpeakerStore::empty(Box::new(MemoryStore::new())),
        }
    }

    /// Extracts an embedding from `samples` and enrolls it under
    /// `speaker_id`, creating the speaker on first enrollment. With
    /// `persist_now` the snapshot is written before returning;
    /// otherwise the change stays in memory with pending writes set.
    pub fn register(
        &mut self,
        speaker_id: &str,
        samples: &[f32],
        persist_now: bool,
    ) -> Result<(), RegistryError> {
        let embedding = self.extractor.extract(samples)?;
        self.register_embedding(speaker_id, embedding, persist_now)
    }

    /// Enrolls an already-extracted embedding under `speaker_id`.
    ///
    /// Embeddings always append; earlier enrollments stay untouched.
    pub fn register_embedding(
        &mut self,
        speaker_id: &str,
        embedding: Vec<f32>,
        persist_now: bool,
    ) -> Result<(), RegistryError> {
        self.store
            .append(speaker_id, embedding, self.cfg.max_embeddings_per_speaker);
        tracing::debug!(speaker = speaker_id, "registered embedding");
        if persist_now {
            self.save()?;
        }
        Ok(())
    }

    /// Identifies the speaker whose enrollments best match `samples`.
    pub fn identify(
        &self,
        samples: &[f32],
        threshold: f32,
    ) -> Result<Identification, RegistryError> {
        let embedding = self.extractor.extract(samples)?;
        Ok(self.identify_embedding(&embedding, threshold))
    }

    /// Identifies against an already-extracted embedding.
    ///
    /// The best cosine score across every stored embedding decides the
    /// match: at or above `threshold` returns that speaker, below it
    /// returns `None` together with the score. Embeddings of different
    /// lengths compare over their shared prefix.
    pub fn identify_embedding(&self, query: &[f32], threshold: f32) -> Identification {
        let (best_idx, best_score) = best_match(self.store.entries(), query);
        match best_idx {
            Some(idx) if best_score >= threshold => Identification {
                speaker: Some(self.store.entries()[idx].id.clone()),
                score: best_score,
            },
            _ => Identification {
                speaker: None,
                score: best_score,
            },
        }
    }

    /// Removes a speaker and persists the change immediately.
    ///
    /// On a failed save the speaker is already gone from memory and
    /// pending writes stay set; a later [`Registry::save`] retries.
    pub fn delete(&mut self, speaker_id: &str) -> Result<(), RegistryError> {
        self.store.remove(speaker_id)?;
        tracing::debug!(speaker = speaker_id, "deleted speaker");
        self.save()
    }

    /// Lists registered speakers in registration order.
    pub fn list(&self) -> Vec<SpeakerInfo> {
        self.store
            .entries()
            .iter()
            .map(|e| SpeakerInfo {
                id: e.id.clone(),
                count: e.embeddings.len(),
            })
            .collect()
    }

    /// Looks up one speaker, or `None` if not registered.
    pub fn speaker(&self, speaker_id: &str) -> Option<SpeakerInfo> {
        self.store.get(speaker_id).map(|e| SpeakerInfo {
            id: e.id.clone(),
            count: e.embeddings.len(),
        })
    }

    /// Number of registered speakers.
    pub fn speaker_count(&self) -> usize {
        self.store.len()
    }

    /// True if no speakers are registered.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Writes the snapshot. Pending writes clear only on success.
    pub fn save(&mut self) -> Result<(), RegistryError> {
        self.store.save()
    }

    /// True when in-memory state has changes the snapshot lacks.
    pub fn pending_writes(&self) -> bool {
        self.store.dirty()
    }

    /// The extractor backing [`Registry::register`] and
    /// [`Registry::identify`].
    pub fn extractor(&self) -> &Arc<dyn Extractor> {
        &self.extractor
    }

    /// The active configuration.
    pub fn config(&self) -> &RegistryConfig {
        &self.cfg
    }
}
