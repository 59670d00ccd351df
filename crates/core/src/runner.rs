//! The round evaluator.

use crate::env::Env;
use crate::plan::{downcast_val, Plan, Status};
use crate::store::SourceBatch;
use quarry_api::{PerformFetch, QuarryResult};
use std::sync::atomic::Ordering;

/// Configuration for a [Runner].
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Emit one tracing line per cache hit, cache miss, duplicate
    /// request, invalidation, round start and completion.
    /// Default: false.
    #[serde(default)]
    pub trace: bool,
}

/// Counters accumulated over one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Rounds completed, where a round is one evaluation of the plan
    /// followed by one drain of the request store.
    pub rounds: usize,
    /// Requests handed to sources, over all rounds.
    pub requests_fetched: usize,
    /// Cached fetches resolved from an already terminal cell.
    pub cache_hits: usize,
    /// Cached fetches that allocated a fresh cell and queued a request.
    pub cache_misses: usize,
    /// Cached fetches that piggybacked on a request already queued in
    /// the same round.
    pub duplicate_requests: usize,
    /// Cache entries removed by invalidation plans.
    pub invalidations: usize,
}

/// Executes fetch plans round by round.
///
/// Each round evaluates the plan against the shared environment, drains
/// the request store (sync source tasks inline, all async source tasks
/// of the round awaited in parallel), then continues with the plan's
/// re-optimized continuation, until the plan resolves.
#[derive(Debug, Clone, Default)]
pub struct Runner {
    config: RunnerConfig,
}

impl Runner {
    /// Construct a runner with the given configuration.
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Run `plan` to completion against a fresh environment.
    ///
    /// On failure the original error is returned, source chain intact.
    pub async fn run<T>(&self, plan: Plan<T>) -> QuarryResult<T>
    where
        T: 'static + Send,
    {
        self.run_with_summary(plan).await.0
    }

    /// Run `plan` to completion and also report the run's counters.
    pub async fn run_with_summary<T>(
        &self,
        plan: Plan<T>,
    ) -> (QuarryResult<T>, RunSummary)
    where
        T: 'static + Send,
    {
        let env = Env::new(self.config.trace);
        let mut plan = plan.into_inner();
        loop {
            match plan.step(&env) {
                Status::Done(value) => {
                    let summary = summary_of(&env);
                    if env.trace {
                        tracing::debug!(
                            rounds = summary.rounds,
                            fetched = summary.requests_fetched,
                            "fetch plan complete"
                        );
                    }
                    return (Ok(downcast_val::<T>(value)), summary);
                }
                Status::Failed(err) => {
                    let summary = summary_of(&env);
                    if env.trace {
                        tracing::debug!(
                            rounds = summary.rounds,
                            error = %err,
                            "fetch plan failed"
                        );
                    }
                    return (Err(err), summary);
                }
                Status::Blocked(pending, cont) => {
                    let round =
                        env.stats.rounds.fetch_add(1, Ordering::Relaxed) + 1;
                    if env.trace {
                        for fetch in &pending {
                            tracing::debug!(
                                source = %fetch.source_name,
                                request = %fetch.request_id,
                                "queued"
                            );
                        }
                        tracing::debug!(
                            round,
                            queued = pending.len(),
                            "starting fetch round"
                        );
                    }
                    drain(&env).await;
                    plan = cont.into_plan();
                }
            }
        }
    }
}

/// Run `plan` with the default configuration.
pub async fn run<T>(plan: Plan<T>) -> QuarryResult<T>
where
    T: 'static + Send,
{
    Runner::default().run(plan).await
}

/// Issue every batch queued in the store this round: sync tasks inline
/// in the order the sources returned them, all async tasks of the round
/// gathered into a single parallel wait.
///
/// The `pending` lists carried by blocked plans play no part here; the
/// store already holds each queued request exactly once, so duplicate
/// observations of a request never cause double work.
async fn drain(env: &Env) {
    let mut async_tasks = Vec::new();
    for batch in env.store.take_batches() {
        let SourceBatch { source, fetches } = batch;
        if env.trace {
            tracing::debug!(
                source = source.name(),
                size = fetches.len(),
                "issuing batch"
            );
        }
        for task in source.fetch_erased(fetches) {
            match task {
                PerformFetch::Sync(thunk) => thunk(),
                PerformFetch::Async(fut) => async_tasks.push(fut),
            }
        }
    }
    if !async_tasks.is_empty() {
        futures::future::join_all(async_tasks).await;
    }
}

fn summary_of(env: &Env) -> RunSummary {
    let stats = &env.stats;
    RunSummary {
        rounds: stats.rounds.load(Ordering::Relaxed),
        requests_fetched: stats.requests_fetched.load(Ordering::Relaxed),
        cache_hits: stats.cache_hits.load(Ordering::Relaxed),
        cache_misses: stats.cache_misses.load(Ordering::Relaxed),
        duplicate_requests: stats.duplicate_requests.load(Ordering::Relaxed),
        invalidations: stats.invalidations.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod test;
