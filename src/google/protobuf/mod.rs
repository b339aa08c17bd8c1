//! Messages of the `google.protobuf` package.

pub mod any;

pub use any::Any;
