//! The per-run environment.

use crate::cache::RequestCache;
use crate::store::RequestStore;
use std::sync::atomic::AtomicUsize;

/// Counters accumulated while a run evaluates and drains.
///
/// Only the evaluator thread bumps these; atomics keep [Env] shareable
/// with the drain futures without a lock.
#[derive(Debug, Default)]
pub(crate) struct RunStats {
    pub rounds: AtomicUsize,
    pub requests_fetched: AtomicUsize,
    pub cache_hits: AtomicUsize,
    pub cache_misses: AtomicUsize,
    pub duplicate_requests: AtomicUsize,
    pub invalidations: AtomicUsize,
}

/// The environment one plan run evaluates against.
///
/// The cache lives for the whole run; the store is drained and left
/// empty between rounds; `trace` is immutable.
#[derive(Debug)]
pub(crate) struct Env {
    pub cache: RequestCache,
    pub store: RequestStore,
    pub trace: bool,
    pub stats: RunStats,
}

impl Env {
    pub fn new(trace: bool) -> Self {
        Self {
            cache: RequestCache::default(),
            store: RequestStore::default(),
            trace,
            stats: RunStats::default(),
        }
    }
}
