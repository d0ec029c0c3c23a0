//! Shared key set cache
//!
//! Written only by the refresh path, read by every request. Readers load an
//! `Arc<KeySet>` snapshot; a refresh swaps in a whole new set, so a reader
//! sees either the old keys or the new ones and never a mix.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use tracing::debug;

use super::key::{KeySet, SigningKey};
use crate::error::{FilterError, FilterResult};

/// Key set store with atomic snapshot replacement
#[derive(Debug)]
pub struct KeySetStore {
    current: ArcSwap<KeySet>,
    generation: AtomicU64,
}

impl Default for KeySetStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySetStore {
    /// Empty store; every lookup misses until the first refresh
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(KeySet::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// Key for `kid` in the current snapshot
    ///
    /// # Errors
    ///
    /// Returns `FilterError::UnknownKey` when the snapshot has no such key,
    /// including before the first refresh.
    pub fn lookup(&self, kid: &str) -> FilterResult<Arc<SigningKey>> {
        let snapshot = self.current.load();
        match snapshot.get(kid) {
            Some(key) => Ok(Arc::clone(key)),
            None => {
                debug!(
                    kid,
                    key_set_loaded = self.is_loaded(),
                    key_count = snapshot.len(),
                    "Key ID not found in key set"
                );
                Err(FilterError::UnknownKey {
                    kid: kid.to_string(),
                })
            }
        }
    }

    /// Swap in a new key set
    pub fn replace(&self, key_set: KeySet) {
        self.current.store(Arc::new(key_set));
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Current snapshot, for consistent multi-key reads
    pub fn snapshot(&self) -> Arc<KeySet> {
        self.current.load_full()
    }

    /// Number of successful replacements so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether any refresh has completed
    pub fn is_loaded(&self) -> bool {
        self.generation() > 0
    }

    /// Keys in the current snapshot
    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    /// True when the current snapshot has no keys
    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }
}
