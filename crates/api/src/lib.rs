#![deny(missing_docs)]
//! Quarry API contains the trait contracts and basic types required to
//! plug application data sources into the quarry fetch coordinator.
//!
//! If you want to build and run fetch plans, see the quarry_core crate.

/// Boxed future type.
pub type BoxFut<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

mod error;
pub use error::*;

pub mod request;
pub use request::{Request, RequestId};

pub mod cell;
pub use cell::*;

pub mod source;
pub use source::*;
