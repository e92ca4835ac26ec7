#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod error;
mod kind;
mod tap;

pub use self::{
    error::TapError,
    kind::{ResourceKind, UnknownResourceKind},
    tap::{DiscoverTapPods, HydrateIp, TapPod, TapTarget},
};
