//! Aggregates per-proxy observe streams into a single client event stream.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod event;
pub mod metrics;
mod observe;
pub mod tap;

pub use self::{
    metrics::TapMetrics,
    tap::{TapEventStream, TapServer},
};
