//! The per-run request cache.

use quarry_api::{RequestId, ResultCell};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Maps request ids to their result cells for the lifetime of one run.
///
/// A key holding a terminal cell stays terminal for the rest of the
/// run; `NotFetched` entries are exactly the requests queued in the
/// current round, and the drain transitions them before the next round
/// evaluates. The map is behind a mutex because async source handlers
/// may complete cells from worker threads while the evaluator inserts
/// on its own thread.
#[derive(Debug, Default)]
pub(crate) struct RequestCache {
    inner: Mutex<HashMap<RequestId, Arc<ResultCell>>>,
}

impl RequestCache {
    pub fn get(&self, id: &RequestId) -> Option<Arc<ResultCell>> {
        self.inner.lock().unwrap().get(id).cloned()
    }

    /// Insert a cell, overwriting any previous entry for the id.
    pub fn put(&self, id: RequestId, cell: Arc<ResultCell>) {
        self.inner.lock().unwrap().insert(id, cell);
    }

    pub fn remove(&self, id: &RequestId) -> Option<Arc<ResultCell>> {
        self.inner.lock().unwrap().remove(id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}
