//! Request-issuing primitives and the derived combinators.

use crate::env::Env;
use crate::expr::Expr;
use crate::plan::{PendingFetch, Plan, PlanInner, Status};
use quarry_api::{
    AnyValue, BlockedFetch, DataSource, FetchState, QuarryError, Request,
    RequestId, ResultCell,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Fetch `request` from `source`, deduplicated through the run's cache.
///
/// The first occurrence of an identifier in a run allocates the result
/// cell and queues the request for the current round's batch; every
/// later occurrence in the same round shares the queued cell, and
/// occurrences after the fetch completed resolve from the cache without
/// touching the source.
pub fn data_fetch<S>(
    source: &Arc<S>,
    request: S::Request,
) -> Plan<<S::Request as Request>::Value>
where
    S: DataSource,
{
    let source = source.clone();
    Plan::from_inner(PlanInner::new(move |env| {
        let id = request.identifier();
        match env.cache.get(&id) {
            Some(cell) => match cell.state() {
                FetchState::Success(value) => {
                    note_hit(env, &id);
                    done_from_cache::<S::Request>(&id, value)
                }
                FetchState::Error(err) => {
                    note_hit(env, &id);
                    Status::Failed(err)
                }
                FetchState::NotFetched => {
                    // Queued by an earlier branch this round; share the
                    // cell instead of re-adding it to the store.
                    env.stats.duplicate_requests.fetch_add(1, Ordering::Relaxed);
                    if env.trace {
                        tracing::debug!(
                            request = %id,
                            "request already queued in this round"
                        );
                    }
                    Status::Blocked(
                        Vec::new(),
                        readback::<S::Request>(id, cell),
                    )
                }
            },
            None => {
                note_miss(env, &id);
                let cell = Arc::new(ResultCell::new());
                env.cache.put(id.clone(), cell.clone());
                queue(env, &source, request, id, cell)
            }
        }
    }))
}

/// Fetch `request` from `source`, bypassing the cache entirely.
///
/// Every use allocates a fresh cell and queues the request again.
/// Intended for mutating requests whose results must not be memoized.
pub fn uncached_fetch<S>(
    source: &Arc<S>,
    request: S::Request,
) -> Plan<<S::Request as Request>::Value>
where
    S: DataSource,
{
    let source = source.clone();
    Plan::from_inner(PlanInner::new(move |env| {
        let id = request.identifier();
        if env.trace {
            tracing::debug!(request = %id, "uncached fetch");
        }
        let cell = Arc::new(ResultCell::new());
        queue(env, &source, request, id, cell)
    }))
}

/// Remove `request`'s cache entry before evaluating `plan`, and again
/// before every later round of `plan`'s continuation.
///
/// A cached fetch of the same identifier downstream of the removal
/// re-queries its source instead of reusing the memoized result.
pub fn invalidate<R, T>(request: &R, plan: Plan<T>) -> Plan<T>
where
    R: Request,
    T: 'static + Send,
{
    Plan::from_inner(invalidate_inner(request.identifier(), plan.into_inner()))
}

fn invalidate_inner(id: RequestId, plan: PlanInner) -> PlanInner {
    PlanInner::new(move |env| {
        if env.cache.remove(&id).is_some() {
            env.stats.invalidations.fetch_add(1, Ordering::Relaxed);
            if env.trace {
                tracing::debug!(request = %id, "cache entry invalidated");
            }
        }
        match plan.step(env) {
            Status::Blocked(pending, cont) => Status::Blocked(
                pending,
                Expr::pure(invalidate_inner(id, cont.into_plan())),
            ),
            resolved => resolved,
        }
    })
}

fn queue<S: DataSource>(
    env: &Env,
    source: &Arc<S>,
    request: S::Request,
    id: RequestId,
    cell: Arc<ResultCell>,
) -> Status {
    env.store
        .add(source, BlockedFetch::new(request, cell.clone()));
    env.stats.requests_fetched.fetch_add(1, Ordering::Relaxed);
    let pending = PendingFetch {
        source_name: source.name().into(),
        request_id: id.clone(),
    };
    Status::Blocked(vec![pending], readback::<S::Request>(id, cell))
}

/// A continuation that reads the filled cell after the round's drain.
fn readback<R: Request>(id: RequestId, cell: Arc<ResultCell>) -> Expr {
    Expr::pure(PlanInner::new(move |_env| match cell.state() {
        FetchState::Success(value) => done_from_cache::<R>(&id, value),
        FetchState::Error(err) => Status::Failed(err),
        FetchState::NotFetched => Status::Failed(QuarryError::invariant(format!(
            "expected complete fetch for {id}, but its source never \
             completed the cell"
        ))),
    }))
}

fn done_from_cache<R: Request>(id: &RequestId, value: AnyValue) -> Status {
    match value.downcast::<R::Value>() {
        Ok(value) => Status::Done(Box::new((*value).clone())),
        Err(_) => Status::Failed(QuarryError::invariant(format!(
            "cached value for {id} does not have the requested type"
        ))),
    }
}

fn note_hit(env: &Env, id: &RequestId) {
    env.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
    if env.trace {
        tracing::debug!(request = %id, "cache hit");
    }
}

fn note_miss(env: &Env, id: &RequestId) {
    env.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
    if env.trace {
        tracing::debug!(request = %id, "cache miss");
    }
}

/// Evaluate two independent plans in the same batching round.
pub fn zip2<A, B>(pa: Plan<A>, pb: Plan<B>) -> Plan<(A, B)>
where
    A: 'static + Send,
    B: 'static + Send,
{
    pa.map(|a| move |b| (a, b)).apply(pb)
}

/// Evaluate three independent plans in the same batching round.
pub fn zip3<A, B, C>(pa: Plan<A>, pb: Plan<B>, pc: Plan<C>) -> Plan<(A, B, C)>
where
    A: 'static + Send,
    B: 'static + Send,
    C: 'static + Send,
{
    pa.map(|a| move |b| move |c| (a, b, c)).apply(pb).apply(pc)
}

/// Evaluate four independent plans in the same batching round.
pub fn zip4<A, B, C, D>(
    pa: Plan<A>,
    pb: Plan<B>,
    pc: Plan<C>,
    pd: Plan<D>,
) -> Plan<(A, B, C, D)>
where
    A: 'static + Send,
    B: 'static + Send,
    C: 'static + Send,
    D: 'static + Send,
{
    pa.map(|a| move |b| move |c| move |d| (a, b, c, d))
        .apply(pb)
        .apply(pc)
        .apply(pd)
}

/// Resolve every plan in one batching round, preserving order.
pub fn sequence<T>(plans: Vec<Plan<T>>) -> Plan<Vec<T>>
where
    T: 'static + Send,
{
    plans
        .into_iter()
        .fold(Plan::lift(Vec::new()), |acc, plan| {
            zip2(acc, plan).map(|(mut values, value)| {
                values.push(value);
                values
            })
        })
}

/// Map `f` over `items` and resolve all resulting plans in one round.
pub fn map_seq<I, U, F>(items: I, f: F) -> Plan<Vec<U>>
where
    I: IntoIterator,
    U: 'static + Send,
    F: FnMut(I::Item) -> Plan<U>,
{
    sequence(items.into_iter().map(f).collect())
}
