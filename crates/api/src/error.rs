//! Error types shared by the quarry crates.

use std::sync::Arc;

/// Broad classification of a failed fetch plan.
///
/// The evaluator reports every failure as one of these, so callers can
/// tell a source that answered with an error apart from a broken
/// engine contract or an application-level rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A data source stored a failure for a request it was handed.
    Fetch,
    /// A contract of the engine was broken, such as a result cell left
    /// unfilled after its round's drain.
    Invariant,
    /// Application code rejected a value while transforming a plan.
    App,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Fetch => f.write_str("fetch"),
            FailureKind::Invariant => f.write_str("invariant"),
            FailureKind::App => f.write_str("application"),
        }
    }
}

// std has no Error impl for Arc<dyn Error>, so the attached cause
// needs its own wrapper to participate in the source chain.
#[derive(Clone)]
struct SharedCause(Arc<dyn std::error::Error + 'static + Send + Sync>);

impl std::fmt::Debug for SharedCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for SharedCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for SharedCause {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// The error type used across the quarry apis and inside the
/// evaluator.
///
/// A failed result cell is read by every plan branch that depends on
/// the same request, and each read hands out a copy of the stored
/// error. Both the message and the attached cause therefore live
/// behind `Arc`s: observing a failure many times never duplicates the
/// underlying error value, and the original cause chain survives every
/// clone.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind} failure: {msg}")]
pub struct QuarryError {
    kind: FailureKind,
    msg: Arc<str>,
    #[source]
    cause: Option<SharedCause>,
}

impl QuarryError {
    /// A failure reported by a data source for one of its requests.
    pub fn fetch(msg: impl std::fmt::Display) -> Self {
        Self::build(FailureKind::Fetch, msg)
    }

    /// A broken engine contract.
    pub fn invariant(msg: impl std::fmt::Display) -> Self {
        Self::build(FailureKind::Invariant, msg)
    }

    /// An application-level rejection of a fetched value.
    pub fn app(msg: impl std::fmt::Display) -> Self {
        Self::build(FailureKind::App, msg)
    }

    /// Attach the underlying cause of this failure.
    pub fn with_cause<E>(mut self, cause: E) -> Self
    where
        E: std::error::Error + 'static + Send + Sync,
    {
        self.cause = Some(SharedCause(Arc::new(cause)));
        self
    }

    /// The broad classification of this failure.
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// The failure message, without the kind prefix.
    pub fn message(&self) -> &str {
        &self.msg
    }

    fn build(kind: FailureKind, msg: impl std::fmt::Display) -> Self {
        Self {
            kind,
            msg: msg.to_string().into(),
            cause: None,
        }
    }
}

/// The result type used across the quarry apis.
pub type QuarryResult<T> = Result<T, QuarryError>;
