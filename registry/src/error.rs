use thiserror::Error;

/// Errors returned by registry operations.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("registry: speaker not found: {0}")]
    SpeakerNotFound(String),

    #[error("registry: extraction error: {0}")]
    Extraction(#[from] voxid_embed::ExtractError),

    #[error("registry: snapshot store error: {0}")]
    Store(String),

    #[error("registry: serialization error: {0}")]
    Serialization(String),

    /// The snapshot blob exists but does not decode to a valid speaker
    /// table. Subject to [`crate::CorruptPolicy`] at load time.
    #[error("registry: corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}
