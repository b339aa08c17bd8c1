//! Well-known message types.

pub mod api;
pub mod protobuf;
