//! The single-assignment result cell shared between the evaluator, the
//! cache and data sources.

use crate::{QuarryError, Request};
use std::any::Any;
use std::sync::{Arc, Mutex};

/// Type-erased successful fetch payload stored in a [ResultCell].
///
/// Stored behind an `Arc` so repeated reads of the same cell can clone
/// the payload out without consuming it.
pub type AnyValue = Arc<dyn Any + Send + Sync>;

/// Observable state of a [ResultCell].
#[derive(Clone)]
pub enum FetchState {
    /// The request has been queued but no source has answered yet.
    NotFetched,
    /// The owning source stored a successful result.
    Success(AnyValue),
    /// The owning source stored a failure.
    Error(QuarryError),
}

impl std::fmt::Debug for FetchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchState::NotFetched => f.write_str("NotFetched"),
            FetchState::Success(_) => f.write_str("Success(..)"),
            FetchState::Error(e) => write!(f, "Error({e})"),
        }
    }
}

/// One result cell per in-flight request.
///
/// A cell is created `NotFetched` when its request enters the request
/// store, and is transitioned exactly once, by the source that received
/// the blocked fetch for it, to `Success` or `Error`. The transition is
/// monotonic: writes after the first terminal state are dropped with a
/// warning.
#[derive(Debug, Default)]
pub struct ResultCell {
    state: Mutex<Option<FetchState>>,
}

impl ResultCell {
    /// Construct a fresh `NotFetched` cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current state.
    pub fn state(&self) -> FetchState {
        self.state
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(FetchState::NotFetched)
    }

    /// Store a successful, already type-erased result.
    pub fn put_success_any(&self, value: AnyValue) {
        self.transition(FetchState::Success(value));
    }

    /// Store a failure.
    pub fn put_failure(&self, err: QuarryError) {
        self.transition(FetchState::Error(err));
    }

    fn transition(&self, next: FetchState) {
        let mut state = self.state.lock().unwrap();
        match &*state {
            None => *state = Some(next),
            Some(_) => {
                tracing::warn!(
                    "ignoring write to an already completed result cell"
                );
            }
        }
    }
}

/// A single blocked request as presented to its data source.
///
/// Exposes the request itself and the typed write half of its result
/// cell. The source must drive the cell to a terminal state by the time
/// the task it scheduled for this fetch completes.
#[derive(Debug)]
pub struct BlockedFetch<R: Request> {
    request: R,
    cell: Arc<ResultCell>,
}

impl<R: Request> BlockedFetch<R> {
    /// Pair a request with the cell that will hold its result.
    pub fn new(request: R, cell: Arc<ResultCell>) -> Self {
        Self { request, cell }
    }

    /// The request to answer.
    pub fn request(&self) -> &R {
        &self.request
    }

    /// Store the successful result for this request.
    pub fn put_success(&self, value: R::Value) {
        self.cell.put_success_any(Arc::new(value));
    }

    /// Store a failure for this request.
    pub fn put_failure(&self, err: QuarryError) {
        self.cell.put_failure(err);
    }
}
