//! Test doubles shared by the crate's unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use voxid_embed::{ExtractError, Extractor};

use crate::snapshot::SnapshotStore;
use crate::RegistryError;

/// Extractor that returns its input unchanged, so tests feed embedding
/// vectors directly as "samples".
pub(crate) struct IdentityExtractor {
    pub dimension: usize,
}

impl IdentityExtractor {
    pub(crate) fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Extractor for IdentityExtractor {
    fn extract(&self, samples: &[f32]) -> Result<Vec<f32>, ExtractError> {
        Ok(samples.to_vec())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Extractor that rejects inputs shorter than `min_samples`, passing
/// longer ones through unchanged.
pub(crate) struct ShortRejectExtractor {
    pub min_samples: usize,
}

impl Extractor for ShortRejectExtractor {
    fn extract(&self, samples: &[f32]) -> Result<Vec<f32>, ExtractError> {
        if samples.len() < self.min_samples {
            return Err(ExtractError::AudioTooShort {
                min_samples: self.min_samples,
                got_samples: samples.len(),
            });
        }
        Ok(samples.to_vec())
    }

    fn dimension(&self) -> usize {
        self.min_samples
    }
}

/// Snapshot store that counts writes and can be told to fail them.
/// Clones share state, so a test can keep a handle while the registry
/// owns another.
#[derive(Clone)]
pub(crate) struct FlakyStore {
    inner: Arc<FlakyInner>,
}

struct FlakyInner {
    blob: Mutex<Option<Vec<u8>>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(FlakyInner {
                blob: Mutex::new(None),
                writes: AtomicUsize::new(0),
                fail_writes: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    pub(crate) fn seed(&self, blob: Vec<u8>) {
        *self.inner.blob.lock().unwrap() = Some(blob);
    }
}

impl SnapshotStore for FlakyStore {
    fn read(&self) -> Result<Option<Vec<u8>>, RegistryError> {
        Ok(self.inner.blob.lock().unwrap().clone())
    }

    fn write(&self, blob: &[u8]) -> Result<(), RegistryError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(RegistryError::Store("injected write failure".into()));
        }
        *self.inner.blob.lock().unwrap() = Some(blob.to_vec());
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn quarantine(&self) -> Result<Option<String>, RegistryError> {
        Ok(self
            .inner
            .blob
            .lock()
            .unwrap()
            .take()
            .map(|_| "flaky".to_string()))
    }
}
