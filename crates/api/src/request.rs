//! The request contract: what an application fetch must look like to be
//! coordinated by quarry.

use std::sync::Arc;

/// Identity of a request, used as the cache key.
///
/// Two requests are the same request iff their ids are equal, so an id
/// must encode every input that affects the result. That is the
/// client's responsibility; quarry never inspects an id beyond equality.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub Arc<str>);

impl std::ops::Deref for RequestId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId(s.into_boxed_str().into())
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId(s.into())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Debug for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A request that can be coordinated by quarry.
///
/// The successful result type is fixed by the request type. Results are
/// cloned out of the run's shared cache for every plan branch that asks
/// for them, hence the `Clone` bound on [Request::Value].
pub trait Request: 'static + Send + Sync + std::fmt::Debug {
    /// The type a source produces for this request on success.
    type Value: 'static + Send + Sync + Clone + std::fmt::Debug;

    /// Stable identity of this request, used as the cache key.
    fn identifier(&self) -> RequestId;
}
