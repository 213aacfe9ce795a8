//! Batched application of staged patches to the product store.

use catsync_core::{PendingPatch, ProductStore};

pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Result of one write phase.
///
/// `applied` counts the patches written before `error`, if any. Writes
/// already applied are not rolled back.
#[derive(Debug)]
pub struct WriteReport<E> {
    pub applied: usize,
    pub error: Option<E>,
}

impl<E> WriteReport<E> {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Applies patches in fixed-size batches, stopping at the first failed write.
#[derive(Debug, Clone, Copy)]
pub struct PatchWriter {
    batch_size: usize,
}

impl Default for PatchWriter {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl PatchWriter {
    /// A zero batch size is treated as one.
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Writes `patches` in order. The first failure stops all further writes
    /// and is returned alongside the number of patches applied before it.
    pub async fn apply<S>(&self, store: &S, patches: &[PendingPatch]) -> WriteReport<S::Error>
    where
        S: ProductStore,
    {
        let mut applied = 0usize;

        for (batch_index, batch) in patches.chunks(self.batch_size).enumerate() {
            let batch_no = batch_index + 1;
            for patch in batch {
                if let Err(error) = store.apply_patch(patch).await {
                    tracing::error!(
                        batch = batch_no,
                        record_id = patch.record_id,
                        applied,
                        error = %error,
                        "patch write failed; stopping write phase"
                    );
                    return WriteReport {
                        applied,
                        error: Some(error),
                    };
                }
                applied += 1;
            }
            tracing::debug!(batch = batch_no, size = batch.len(), applied, "patch batch applied");
        }

        WriteReport {
            applied,
            error: None,
        }
    }
}
