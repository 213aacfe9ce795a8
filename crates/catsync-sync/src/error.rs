use catsync_core::PendingPatch;
use catsync_marketplace::MarketplaceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// A marketplace call failed mid-pass. `staged` holds every patch
    /// reconciled before the failure so the caller can still flush them.
    #[error("marketplace request failed with {count} patches staged: {source}", count = .staged.len())]
    Marketplace {
        #[source]
        source: MarketplaceError,
        staged: Vec<PendingPatch>,
    },

    #[error("product store error: {0}")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SyncError {
    /// Patches reconciled before the failure. Empty for store errors.
    #[must_use]
    pub fn staged(&self) -> &[PendingPatch] {
        match self {
            Self::Marketplace { staged, .. } => staged,
            Self::Store(_) => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marketplace_error_reports_staged_count() {
        let err = SyncError::Marketplace {
            source: MarketplaceError::Config("no token".to_owned()),
            staged: vec![PendingPatch {
                record_id: 1,
                numeric_id: 2,
                category_label: None,
            }],
        };
        let msg = err.to_string();
        assert!(msg.contains("1 patches staged"), "got: {msg}");
        assert!(msg.contains("no token"), "got: {msg}");
        assert_eq!(err.staged().len(), 1);
    }
}
