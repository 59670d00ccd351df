#![deny(missing_docs)]
//! Quarry is an embedded data-fetch coordinator.
//!
//! Application code describes composite data requirements as pure
//! [Plan] values built from [data_fetch] and the combinators; [run]
//! executes a plan round by round so that
//!
//! - independent requests are discovered together and issued as batches
//!   to their data sources,
//! - identical requests within a run are answered once through a
//!   per-run cache, and
//! - all async source work of one round runs concurrently.
//!
//! Composition decides batching: plans combined applicatively
//! ([Plan::apply], [zip2], [sequence]) share one round, while
//! [Plan::and_then] starts a new round once the upstream value is
//! available.
//!
//! ```
//! use quarry_core::{data_fetch, run, zip2};
//! use quarry_core::{BlockedFetch, DataSource, PerformFetch, Request, RequestId};
//! use std::sync::Arc;
//!
//! #[derive(Debug)]
//! struct Upper(char);
//!
//! impl Request for Upper {
//!     type Value = char;
//!
//!     fn identifier(&self) -> RequestId {
//!         format!("upper/{}", self.0).into()
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct UpperSource;
//!
//! impl DataSource for UpperSource {
//!     type Request = Upper;
//!
//!     fn name(&self) -> &str {
//!         "upper"
//!     }
//!
//!     fn fetch(&self, batch: Vec<BlockedFetch<Upper>>) -> Vec<PerformFetch> {
//!         vec![PerformFetch::Sync(Box::new(move || {
//!             for fetch in batch {
//!                 fetch.put_success(fetch.request().0.to_ascii_uppercase());
//!             }
//!         }))]
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let source = Arc::new(UpperSource);
//! let plan = zip2(
//!     data_fetch(&source, Upper('a')),
//!     data_fetch(&source, Upper('b')),
//! )
//! .map(|(a, b)| format!("{a}{b}"));
//!
//! // Both requests reach the source in one batch.
//! assert_eq!("AB", run(plan).await.unwrap());
//! # }
//! ```

mod cache;
mod env;
mod expr;
mod ops;
mod plan;
mod runner;
mod store;

pub use ops::{
    data_fetch, invalidate, map_seq, sequence, uncached_fetch, zip2, zip3,
    zip4,
};
pub use plan::Plan;
pub use runner::{run, RunSummary, Runner, RunnerConfig};

pub use quarry_api::{
    BlockedFetch, BoxFut, DataSource, FailureKind, PerformFetch, QuarryError,
    QuarryResult, Request, RequestId,
};
