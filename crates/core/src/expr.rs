//! Reified plan continuations.
//!
//! The continuation of a blocked plan is kept as a structured tree
//! rather than an opaque closure so it can be reshaped between rounds:
//! adjacent `Map` nodes and adjacent `Bind` nodes collapse before the
//! next evaluation, which keeps continuations from growing with the
//! number of rounds in long bind chains.

use crate::plan::{AnyBindFn, AnyFn, PlanInner};

/// Continuation tree of a blocked plan.
pub(crate) enum Expr {
    /// A plan carried through unchanged.
    Pure(PlanInner),
    /// Apply a function to the value of the inner continuation.
    Map(AnyFn, Box<Expr>),
    /// Applicative node. Never fused: it is what preserves the
    /// parallel structure of the two branches.
    Apply(Box<Expr>, Box<Expr>),
    /// Monadic node: feed the inner continuation's value to a function
    /// producing the next plan.
    Bind(AnyBindFn, Box<Expr>),
}

impl Expr {
    pub fn pure(plan: PlanInner) -> Self {
        Expr::Pure(plan)
    }

    pub fn map(f: AnyFn, inner: Expr) -> Self {
        Expr::Map(f, Box::new(inner))
    }

    pub fn apply(func: Expr, arg: Expr) -> Self {
        Expr::Apply(Box::new(func), Box::new(arg))
    }

    pub fn bind(f: AnyBindFn, inner: Expr) -> Self {
        Expr::Bind(f, Box::new(inner))
    }

    /// Collapse adjacent `Map` nodes and adjacent `Bind` nodes,
    /// bottom-up:
    ///
    /// - `Map(f, Map(g, e))` becomes `Map(f . g, e)`
    /// - `Bind(f, Bind(g, e))` becomes `Bind(|x| g(x).bind(f), e)`
    pub fn fuse(self) -> Self {
        match self {
            Expr::Pure(plan) => Expr::Pure(plan),
            Expr::Map(f, inner) => match (*inner).fuse() {
                Expr::Map(g, e) => {
                    Expr::Map(Box::new(move |value| f(g(value))), e)
                }
                e => Expr::Map(f, Box::new(e)),
            },
            Expr::Apply(func, arg) => {
                Expr::apply((*func).fuse(), (*arg).fuse())
            }
            Expr::Bind(f, inner) => match (*inner).fuse() {
                Expr::Bind(g, e) => Expr::Bind(
                    Box::new(move |value| g(value).bind_any(f)),
                    e,
                ),
                e => Expr::Bind(f, Box::new(e)),
            },
        }
    }

    /// Materialize the continuation back into a runnable plan, applying
    /// the fusions first.
    pub fn into_plan(self) -> PlanInner {
        self.fuse().materialize()
    }

    fn materialize(self) -> PlanInner {
        match self {
            Expr::Pure(plan) => plan,
            Expr::Map(f, inner) => (*inner).materialize().map_any(f),
            Expr::Apply(func, arg) => {
                (*func).materialize().apply_any((*arg).materialize())
            }
            Expr::Bind(f, inner) => (*inner).materialize().bind_any(f),
        }
    }
}

impl std::fmt::Debug for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Pure(_) => f.write_str("Pure"),
            Expr::Map(_, inner) => write!(f, "Map({inner:?})"),
            Expr::Apply(func, arg) => write!(f, "Apply({func:?}, {arg:?})"),
            Expr::Bind(_, inner) => write!(f, "Bind({inner:?})"),
        }
    }
}
