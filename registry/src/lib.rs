//! Durable speaker registry.
//!
//! A [`Registry`] keeps every embedding ever enrolled per speaker in
//! memory, persists them as one snapshot blob through a pluggable
//! [`SnapshotStore`], and answers identification queries by the best
//! cosine similarity across all stored embeddings.
//!
//! # Model
//!
//! - Speakers are opaque string ids in registration order. Enrolling a
//!   sample **appends** an embedding; nothing is ever replaced or
//!   deduplicated, so a speaker's recognition improves as samples
//!   accumulate.
//! - Identification scans linearly and returns the best-scoring
//!   speaker at or above the caller's threshold, together with the raw
//!   score. Ties go to the earliest-registered speaker.
//! - Mutations mark pending writes; [`Registry::save`] clears the flag
//!   only when the write succeeds, so a failed save can be retried.
//!
//! Mutating methods take `&mut self`. To share a registry, wrap it in
//! a lock; the embedding math has no interior mutability to fight.

mod batch;
mod error;
mod matcher;
mod registry;
mod snapshot;
mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::{BatchFailure, BatchFailurePolicy, BatchReport, Enrollment};
pub use error::RegistryError;
pub use registry::{Identification, Registry, RegistryConfig, SpeakerInfo};
pub use snapshot::{CorruptPolicy, FileStore, MemoryStore, SnapshotStore};
