use thiserror::Error;

/// Errors returned by embedding extraction.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("audio too short: need at least {min_samples} samples, got {got_samples}")]
    AudioTooShort { min_samples: usize, got_samples: usize },

    #[error("invalid audio: {0}")]
    InvalidAudio(String),

    #[error("invalid extractor config: {0}")]
    Config(String),

    /// Faults inside a model-backed extractor (inference failure,
    /// missing weights, backend errors).
    #[error("model error: {0}")]
    Model(String),
}
