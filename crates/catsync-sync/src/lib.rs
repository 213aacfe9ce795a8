pub mod error;
pub mod memory;
pub mod pass;
pub mod reconcile;
pub mod writer;

pub use error::SyncError;
pub use memory::{MemoryStore, MemoryStoreError};
pub use pass::{
    Diagnostics, Phase, PhaseReport, SyncEngine, SyncItem, SyncOutcome, SyncRequest,
    SyncSettings, SyncSource,
};
pub use reconcile::{LocalIndex, MatchKey, Reconciler, Resolution, ResolvedVia, TargetKey, TargetTracker};
pub use writer::{PatchWriter, WriteReport, DEFAULT_BATCH_SIZE};
