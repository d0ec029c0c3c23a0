//! Key set cache and its refresh contract
//!
//! - [`KeySetStore`] holds the current snapshot, starting empty
//! - [`KeySetFetcher`] obtains the remote document ([`HttpKeySetFetcher`] over HTTP)
//! - [`refresh`] fetches, parses and swaps; on failure the previous snapshot stays

mod document;
mod fetcher;
mod key;
mod store;

pub use document::{JwkEntry, KeySetDocument, KeySetReport, RejectReason, RejectedKey, parse_key_set};
pub use fetcher::{HttpKeySetFetcher, KeySetFetcher};
pub use key::{KeyMaterial, KeySet, KeyType, SigningKey};
pub use store::KeySetStore;

use tracing::{error, info, warn};

use crate::error::FilterResult;

/// Fetch the document once and replace the store's snapshot
///
/// Returns the number of keys now in the store.
///
/// # Errors
///
/// Returns `FilterError::KeySetFetch` when fetching or parsing fails. The
/// store keeps its previous snapshot in that case.
pub async fn refresh(fetcher: &dyn KeySetFetcher, store: &KeySetStore) -> FilterResult<usize> {
    let report = match fetcher.fetch().await.and_then(|bytes| parse_key_set(&bytes)) {
        Ok(report) => report,
        Err(e) => {
            error!(
                source = fetcher.source(),
                error = %e,
                retained_keys = store.len(),
                "Key set refresh failed, keeping previous snapshot"
            );
            return Err(e);
        }
    };

    let key_count = report.key_set.len();
    if key_count == 0 {
        warn!(
            source = fetcher.source(),
            rejected = report.rejected.len(),
            "Key set document contains no usable keys"
        );
    }

    store.replace(report.key_set);

    info!(
        source = fetcher.source(),
        key_count,
        rejected = report.rejected.len(),
        generation = store.generation(),
        "Key set refreshed"
    );

    Ok(key_count)
}
