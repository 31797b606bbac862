use thiserror::Error;

use crate::collector::CollectError;
use crate::store::StoreError;

/// Per-file failures in the download/upload pass. None of them abort the
/// account; failed files are retried once and then counted.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Could not fetch PDF for invoice {invoice}: {source}")]
    Fetch {
        invoice: String,
        #[source]
        source: CollectError,
    },

    #[error("Upload failed: {0}")]
    Store(#[from] StoreError),
}

impl DownloadError {
    /// Whether the failure came from the portal side rather than storage.
    pub fn is_portal(&self) -> bool {
        matches!(self, DownloadError::Fetch { .. })
    }
}
