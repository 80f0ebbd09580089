use std::ops::Deref;
use stratum_store::{ContentStore, StoreError};
use tracing::{debug, warn};

/// Owns an open store and closes it when dropped.
///
/// Use [`close`](Self::close) on the success path to observe close errors;
/// on early returns the drop handler closes the store and logs any failure.
pub struct StoreGuard<S: ContentStore> {
    store: S,
    closed: bool,
}

impl<S: ContentStore> StoreGuard<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            closed: false,
        }
    }

    pub fn close(mut self) -> Result<(), StoreError> {
        self.closed = true;
        self.store.close()
    }
}

impl<S: ContentStore> Deref for StoreGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.store
    }
}

impl<S: ContentStore> Drop for StoreGuard<S> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        debug!("closing store on early exit");
        if let Err(e) = self.store.close() {
            warn!("failed to close store: {e}");
        }
    }
}
