use std::sync::Arc;

use crate::registry::Registry;
use crate::RegistryError;

/// One batch enrollment item: a speaker id and a raw sample clip.
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub speaker_id: String,
    pub samples: Vec<f32>,
}

/// How batch registration reacts to a failing item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchFailurePolicy {
    /// The first failure aborts the batch with an error. Items
    /// enrolled before the failure stay in memory, unsaved, with
    /// pending writes set.
    #[default]
    Abort,
    /// Failures are collected per item and reported in the
    /// [`BatchReport`]; the rest of the batch proceeds.
    Collect,
}

/// One failed batch item.
#[derive(Debug)]
pub struct BatchFailure {
    /// Position in the submitted batch.
    pub index: usize,
    pub speaker_id: String,
    pub error: RegistryError,
}

/// Outcome of a batch registration.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Number of embeddings enrolled.
    pub registered: usize,
    /// Failed items in batch order. Always empty under
    /// [`BatchFailurePolicy::Abort`]: that policy errors out instead.
    pub failures: Vec<BatchFailure>,
}

impl Registry {
    /// Enrolls a sequence of clips with persistence deferred to the
    /// end: however many items the batch carries, at most one snapshot
    /// write happens, and only if there are pending changes when the
    /// sequence finishes.
    ///
    /// Items are processed strictly in order. Failure handling follows
    /// [`crate::RegistryConfig::batch_failure`].
    pub fn register_batch(&mut self, items: Vec<Enrollment>) -> Result<BatchReport, RegistryError> {
        let extractor = Arc::clone(self.extractor());
        let policy = self.config().batch_failure;
        let mut report = BatchReport::default();

        for (index, item) in items.into_iter().enumerate() {
            match extractor.extract(&item.samples) {
                Ok(embedding) => {
                    self.register_embedding(&item.speaker_id, embedding, false)?;
                    report.registered += 1;
                }
                Err(err) => match policy {
                    BatchFailurePolicy::Abort => {
                        tracing::warn!(
                            speaker = %item.speaker_id,
                            index,
                            error = %err,
                            "batch aborted"
                        );
                        return Err(err.into());
                    }
                    BatchFailurePolicy::Collect => {
                        tracing::warn!(
                            speaker = %item.speaker_id,
                            index,
                            error = %err,
                            "batch item failed"
                        );
                        report.failures.push(BatchFailure {
                            index,
                            speaker_id: item.speaker_id,
                            error: err.into(),
                        });
                    }
                },
            }
        }

        if self.pending_writes() {
            self.save()?;
        }
        tracing::debug!(
            registered = report.registered,
            failed = report.failures.len(),
            "batch finished"
        );
        Ok(report)
    }
}
