//! The suspended fetch computation and its composition algebra.
//!
//! All combinator semantics live on the type-erased [PlanInner], once;
//! the public [Plan] restores static typing at the boundary with a
//! phantom type and checked downcasts. Values cross the erased core as
//! `Box<dyn Any + Send>`.

use crate::env::Env;
use crate::expr::Expr;
use quarry_api::{QuarryError, QuarryResult, RequestId};
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

/// Type-erased value flowing through the plan core.
pub(crate) type AnyVal = Box<dyn Any + Send>;

/// Type-erased unary function: the shape of `Map` continuations and of
/// the values an `Apply` function branch resolves to.
pub(crate) type AnyFn = Box<dyn FnOnce(AnyVal) -> AnyVal + Send>;

/// Type-erased `bind` continuation.
pub(crate) type AnyBindFn = Box<dyn FnOnce(AnyVal) -> PlanInner + Send>;

/// Downcast an erased plan value back to its static type.
///
/// The typed boundary guarantees the types line up; this can only trip
/// on a plan composed through the erased core directly.
pub(crate) fn downcast_val<T: 'static>(value: AnyVal) -> T {
    *value
        .downcast::<T>()
        .expect("fetch plan value has a foreign type")
}

fn call_any(func: AnyVal, arg: AnyVal) -> AnyVal {
    (downcast_val::<AnyFn>(func))(arg)
}

/// Informational descriptor of one freshly queued request, carried with
/// [Status::Blocked] for tracing. The request store is the
/// authoritative set of work for a round.
#[derive(Debug, Clone)]
pub(crate) struct PendingFetch {
    pub source_name: Arc<str>,
    pub request_id: RequestId,
}

/// Result of evaluating a plan one step against an environment.
pub(crate) enum Status {
    /// The plan is fully resolved.
    Done(AnyVal),
    /// Further progress needs at least one source drain; the
    /// continuation re-evaluates against the filled cells.
    Blocked(Vec<PendingFetch>, Expr),
    /// The plan failed.
    Failed(QuarryError),
}

/// The untyped suspended computation: apply to an environment, produce
/// a [Status].
pub(crate) struct PlanInner {
    run: Box<dyn FnOnce(&Env) -> Status + Send>,
}

impl std::fmt::Debug for PlanInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PlanInner")
    }
}

impl PlanInner {
    pub fn new(run: impl FnOnce(&Env) -> Status + Send + 'static) -> Self {
        Self {
            run: Box::new(run),
        }
    }

    pub fn done(value: AnyVal) -> Self {
        Self::new(move |_| Status::Done(value))
    }

    pub fn failed(err: QuarryError) -> Self {
        Self::new(move |_| Status::Failed(err))
    }

    /// Evaluate one step. Evaluation never suspends; the only yield
    /// point of a run is the drain between rounds.
    pub fn step(self, env: &Env) -> Status {
        (self.run)(env)
    }

    /// Apply `f` to the eventual value. A blocked plan defers `f` into
    /// a `Map` continuation node so it can fuse with neighboring maps
    /// before the next round.
    pub fn map_any(self, f: AnyFn) -> Self {
        Self::new(move |env| match self.step(env) {
            Status::Done(value) => Status::Done(f(value)),
            Status::Blocked(pending, cont) => {
                Status::Blocked(pending, Expr::map(f, cont))
            }
            Status::Failed(err) => Status::Failed(err),
        })
    }

    /// Applicative apply: `self` resolves to a function (an [AnyFn]
    /// boxed as a value), `arg` to its argument.
    ///
    /// Both branches are always evaluated against the same environment
    /// so their blocked requests land in the same round. This must
    /// never be rewritten through [PlanInner::bind_any], which would
    /// run the branches in separate rounds and defeat batching.
    ///
    /// When one branch is blocked and the other failed, the failure is
    /// embedded in the continuation: the blocked branch's requests
    /// still go out with this round's drain, and the failure surfaces
    /// on re-evaluation. When both fail, the function branch wins.
    pub fn apply_any(self, arg: PlanInner) -> Self {
        Self::new(move |env| {
            let func = self.step(env);
            let value = arg.step(env);
            match (func, value) {
                (Status::Done(f), Status::Done(x)) => {
                    Status::Done(call_any(f, x))
                }
                (Status::Done(f), Status::Blocked(p, cx)) => Status::Blocked(
                    p,
                    Expr::map(Box::new(move |x| call_any(f, x)), cx),
                ),
                (Status::Done(_), Status::Failed(e)) => Status::Failed(e),
                (Status::Blocked(p, cf), Status::Done(x)) => Status::Blocked(
                    p,
                    Expr::map(Box::new(move |f| call_any(f, x)), cf),
                ),
                (Status::Blocked(pf, cf), Status::Blocked(px, cx)) => {
                    let mut pending = pf;
                    pending.extend(px);
                    Status::Blocked(pending, Expr::apply(cf, cx))
                }
                (Status::Blocked(pf, cf), Status::Failed(e)) => {
                    Status::Blocked(
                        pf,
                        Expr::apply(cf, Expr::pure(PlanInner::failed(e))),
                    )
                }
                (Status::Failed(e), Status::Blocked(px, cx)) => {
                    Status::Blocked(
                        px,
                        Expr::apply(Expr::pure(PlanInner::failed(e)), cx),
                    )
                }
                (Status::Failed(e), Status::Done(_)) => Status::Failed(e),
                (Status::Failed(ef), Status::Failed(_)) => Status::Failed(ef),
            }
        })
    }

    /// Monadic bind: run `self`; on `Done` evaluate the continuation in
    /// the same round; on `Blocked` defer into a `Bind` node. The
    /// continuation's own requests can only be discovered in a later
    /// round.
    pub fn bind_any(self, f: AnyBindFn) -> Self {
        Self::new(move |env| match self.step(env) {
            Status::Done(value) => f(value).step(env),
            Status::Blocked(pending, cont) => {
                Status::Blocked(pending, Expr::bind(f, cont))
            }
            Status::Failed(err) => Status::Failed(err),
        })
    }
}

/// A suspended fetch computation producing a `T`.
///
/// Plans are pure values built from [Plan::lift],
/// [data_fetch](crate::data_fetch) and the combinators on this type;
/// nothing is issued until the plan is handed to [run](crate::run).
/// Independent branches composed with [Plan::apply] (or the `zip*`
/// helpers) expose their blocked requests in one batching round;
/// [Plan::and_then] sequences rounds.
pub struct Plan<T> {
    inner: PlanInner,
    _ty: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for Plan<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Plan")
    }
}

impl<T: 'static + Send> Plan<T> {
    pub(crate) fn from_inner(inner: PlanInner) -> Self {
        Self {
            inner,
            _ty: PhantomData,
        }
    }

    pub(crate) fn into_inner(self) -> PlanInner {
        self.inner
    }

    /// A plan that is already done, in every environment.
    pub fn lift(value: T) -> Self {
        Self::from_inner(PlanInner::done(Box::new(value)))
    }

    /// A plan that fails, in every environment.
    pub fn fail(err: QuarryError) -> Self {
        Self::from_inner(PlanInner::failed(err))
    }

    /// Apply `f` to the eventual value of this plan. Failure
    /// propagates; `f` is not called on a failed plan.
    pub fn map<U, F>(self, f: F) -> Plan<U>
    where
        U: 'static + Send,
        F: FnOnce(T) -> U + Send + 'static,
    {
        Plan::from_inner(self.inner.map_any(Box::new(move |value| {
            Box::new(f(downcast_val::<T>(value))) as AnyVal
        })))
    }

    /// Apply a fallible `f` to the eventual value of this plan; an
    /// `Err` behaves exactly like [Plan::fail]. Derived from
    /// [Plan::and_then].
    pub fn try_map<U, F>(self, f: F) -> Plan<U>
    where
        U: 'static + Send,
        F: FnOnce(T) -> QuarryResult<U> + Send + 'static,
    {
        self.and_then(move |value| match f(value) {
            Ok(mapped) => Plan::lift(mapped),
            Err(err) => Plan::fail(err),
        })
    }

    /// Applicative apply: this plan resolves to a function, which is
    /// applied to the eventual value of `arg`.
    ///
    /// Both plans are evaluated in the same round, so their blocked
    /// requests are batched together. Prefer the `zip*` helpers unless
    /// the function shape is genuinely needed.
    pub fn apply<A, B>(self, arg: Plan<A>) -> Plan<B>
    where
        T: FnOnce(A) -> B,
        A: 'static + Send,
        B: 'static + Send,
    {
        let func = self.inner.map_any(Box::new(|func| {
            let func = downcast_val::<T>(func);
            let erased: AnyFn = Box::new(move |arg| {
                Box::new(func(downcast_val::<A>(arg))) as AnyVal
            });
            Box::new(erased) as AnyVal
        }));
        Plan::from_inner(func.apply_any(arg.into_inner()))
    }

    /// Sequence the plan produced by `f` after this one.
    ///
    /// The continuation's requests cannot be discovered until this
    /// plan's value is available, so they are issued in a later round.
    /// Use [Plan::apply] or the `zip*` helpers for independent plans.
    pub fn and_then<U, F>(self, f: F) -> Plan<U>
    where
        U: 'static + Send,
        F: FnOnce(T) -> Plan<U> + Send + 'static,
    {
        Plan::from_inner(self.inner.bind_any(Box::new(move |value| {
            f(downcast_val::<T>(value)).into_inner()
        })))
    }
}
