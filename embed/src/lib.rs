//! Speaker embedding extraction.
//!
//! An [`Extractor`] turns a mono audio clip into a dense f32 vector that
//! places same-speaker clips close together under cosine similarity.
//! Registries and servers hold the extractor behind the trait so a
//! model-backed implementation can be swapped in without touching them.
//!
//! The crate ships one implementation, [`SpectralExtractor`]: a
//! deterministic mel-band energy profile with no model weights. It is not
//! a neural voiceprint, but it is stable (same audio, same vector, bit for
//! bit), which makes the surrounding machinery testable end to end.

mod error;
mod extractor;
mod spectral;

pub use error::ExtractError;
pub use extractor::Extractor;
pub use spectral::{SpectralConfig, SpectralExtractor};
