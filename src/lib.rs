//! A small arena-backed protobuf runtime.
//!
//! Messages live in an [`arena::Arena`] and borrow it for their whole
//! lifetime, so the arena is released in one go once the last message is
//! gone. Encoding and decoding are driven by static [`tables::MessageLayout`]
//! descriptors; each message type only maps layout indices to its own named
//! fields (see [`base::DynMessage`]).
//!
//! # Example
//!
//! ```
//! use pbarena::arena::Arena;
//! use pbarena::google::api::HttpBody;
//! use pbarena::Message;
//! use allocator_api2::alloc::Global;
//!
//! let arena = Arena::new(&Global);
//! let body = HttpBody::new(&arena).unwrap();
//! body.set_content_type("text/plain");
//! body.set_data(b"hello");
//!
//! let bytes = body.serialize(&arena).unwrap();
//! let decoded = HttpBody::parse(bytes, &arena).unwrap();
//! assert_eq!(decoded.content_type(), "text/plain");
//! assert_eq!(decoded.data(), b"hello");
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

pub mod arena;
pub mod base;
pub mod containers;
pub mod decoding;
pub mod encoding;
pub mod extension_registry;
pub mod google;
pub mod reflection;
pub mod tables;
pub mod wire;

#[cfg(feature = "std")]
pub mod test_utils;

pub use allocator_api2::alloc::Allocator;
pub use arena::AllocError;
pub use base::{DynMessage, Message};
pub use decoding::{DecodeError, DecodeOptions};
pub use encoding::{EncodeError, EncodeOptions};

#[cfg(feature = "std")]
pub use ext::MessageExt;

#[cfg(feature = "std")]
mod ext {
    use std::io::{BufRead, Read};

    use anyhow::Context;

    use crate::arena::Arena;
    use crate::containers::RepeatedField;
    use crate::{DecodeOptions, EncodeError, Message};

    const READ_CHUNK: usize = 8 * 1024;

    /// Convenience entry points that need the standard library.
    pub trait MessageExt<'a>: Message<'a> {
        fn encode_vec(&self) -> Result<Vec<u8>, EncodeError> {
            let arena = Arena::new(&allocator_api2::alloc::Global);
            let bytes = self.serialize(&arena)?;
            Ok(bytes.to_vec())
        }

        /// Reads `reader` to the end straight into arena memory and decodes
        /// the result without a second copy.
        fn decode_from_read(
            reader: &mut impl Read,
            arena: &'a Arena,
        ) -> anyhow::Result<&'a mut Self> {
            let mut buf = RepeatedField::<u8>::new();
            let mut chunk = [0u8; READ_CHUNK];
            loop {
                let n = reader.read(&mut chunk).context("reading message bytes")?;
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n], arena)?;
            }
            let input: &'a [u8] = buf.into_slice();
            let msg = Self::parse_aliased(input, None, DecodeOptions::default(), arena)?;
            Ok(msg)
        }

        fn decode_from_bufread(
            reader: &mut impl BufRead,
            arena: &'a Arena,
        ) -> anyhow::Result<&'a mut Self> {
            let mut buf = RepeatedField::<u8>::new();
            loop {
                let chunk = reader.fill_buf().context("reading message bytes")?;
                let len = chunk.len();
                if len == 0 {
                    break;
                }
                buf.extend_from_slice(chunk, arena)?;
                reader.consume(len);
            }
            let input: &'a [u8] = buf.into_slice();
            let msg = Self::parse_aliased(input, None, DecodeOptions::default(), arena)?;
            Ok(msg)
        }

        fn decode_from_async_read(
            reader: &mut (impl futures::io::AsyncRead + Unpin),
            arena: &'a Arena,
        ) -> impl core::future::Future<Output = anyhow::Result<&'a mut Self>> {
            use futures::io::AsyncReadExt;

            async move {
                let mut buf = RepeatedField::<u8>::new();
                let mut chunk = [0u8; READ_CHUNK];
                loop {
                    let n = reader
                        .read(&mut chunk)
                        .await
                        .context("reading message bytes")?;
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n], arena)?;
                }
                let input: &'a [u8] = buf.into_slice();
                let msg = Self::parse_aliased(input, None, DecodeOptions::default(), arena)?;
                Ok(msg)
            }
        }
    }

    impl<'a, T: Message<'a>> MessageExt<'a> for T {}
}
