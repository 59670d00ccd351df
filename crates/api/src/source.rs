//! The data-source contract.

use crate::{BlockedFetch, BoxFut, Request};

/// One scheduled unit of work produced by a source for a batch.
pub enum PerformFetch {
    /// Work executed inline on the evaluator thread, in the order the
    /// source returned it.
    Sync(Box<dyn FnOnce() + Send>),
    /// Work awaited in parallel with every other async task of the same
    /// round.
    Async(BoxFut<'static, ()>),
}

impl std::fmt::Debug for PerformFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PerformFetch::Sync(_) => f.write_str("Sync(..)"),
            PerformFetch::Async(_) => f.write_str("Async(..)"),
        }
    }
}

/// A named carrier of a batch handler for one request type.
///
/// Once per round, a source is handed the non-empty batch of fetches
/// blocked on it and turns the batch into scheduled work. It is free to
/// issue one call per request or one call for the whole batch; the
/// contract is only that every cell in the batch reaches a terminal
/// state by the time the tasks it returned have completed.
///
/// Sources are handed to the engine as `Arc<S>`. The same handle must
/// be used for every fetch that should share a batch: the engine
/// buckets pending requests by source identity, and distinct instances
/// never share a bucket.
pub trait DataSource: 'static + Send + Sync + std::fmt::Debug {
    /// The request type this source answers.
    type Request: Request;

    /// Name of this source, used in diagnostics.
    fn name(&self) -> &str;

    /// Turn one round's batch into scheduled work.
    ///
    /// The order of fetches within the batch is unspecified.
    fn fetch(
        &self,
        batch: Vec<BlockedFetch<Self::Request>>,
    ) -> Vec<PerformFetch>;
}
