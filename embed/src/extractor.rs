use crate::ExtractError;

/// Extracts speaker embedding vectors from audio samples.
///
/// The input is mono audio as f32 samples normalized to [-1, 1]. The
/// output is a dense f32 vector whose dimensionality is returned by
/// [`Extractor::dimension`]. Clips from the same speaker should land
/// close together under cosine similarity.
///
/// # Audio Requirements
///
/// - Samples: f32 mono, normalized to [-1, 1]
/// - Sample rate: implementation-defined (16000 Hz for
///   [`crate::SpectralExtractor`])
/// - Minimum duration: implementation-defined; shorter input fails with
///   [`ExtractError::AudioTooShort`]
///
/// # Thread Safety
///
/// Implementations must be safe for concurrent use.
pub trait Extractor: Send + Sync {
    /// Computes a speaker embedding from mono audio samples.
    fn extract(&self, samples: &[f32]) -> Result<Vec<f32>, ExtractError>;

    /// Returns the dimensionality of the embedding vectors (e.g., 256).
    ///
    /// Different extractor versions may produce different dimensions;
    /// consumers that mix embeddings from several versions must handle
    /// length differences themselves.
    fn dimension(&self) -> usize;
}
