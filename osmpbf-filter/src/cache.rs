use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Decompressed blob bytes keyed by the blob's file offset.
///
/// Shared by all workers of all passes when `--high-memory` is set, so a
/// blob is only inflated once per run. Two workers racing on the same offset
/// both decompress; the first insert is kept and both copies are identical.
#[derive(Debug, Default)]
pub struct BlobCache {
    blobs: RwLock<HashMap<u64, Arc<[u8]>>>,
}

impl BlobCache {
    pub fn with_capacity(blobs: usize) -> Self {
        Self {
            blobs: RwLock::new(HashMap::with_capacity(blobs)),
        }
    }

    pub fn get(&self, offset: u64) -> Option<Arc<[u8]>> {
        let blobs = self.blobs.read().unwrap_or_else(PoisonError::into_inner);
        blobs.get(&offset).cloned()
    }

    /// Stores `bytes` unless another worker got there first; returns the cached copy.
    pub fn insert(&self, offset: u64, bytes: Arc<[u8]>) -> Arc<[u8]> {
        let mut blobs = self.blobs.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(blobs.entry(offset).or_insert(bytes))
    }

    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
