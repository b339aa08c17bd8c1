//! Messages of the `google.api` package.

pub mod httpbody;

pub use httpbody::HttpBody;
