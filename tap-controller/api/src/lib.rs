//! The client-facing tap wire protocol.
//!
//! Tap clients speak HTTPS to the extension API server: the request body is
//! a single length-delimited [`tap::TapByResourceRequest`] and the response
//! body is a stream of length-delimited [`tap::TapEvent`] frames, terminated
//! by an [`tap::ApiError`] frame on fatal errors. The message definitions
//! mirror the protobuf contract and are kept wire-compatible by construction
//! (prost-derived with explicit tags).

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod path;
pub mod tap;

pub use self::codec::{decode_frame, encode_frame, CodecError, ERROR_HEADER};
