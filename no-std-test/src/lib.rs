//! Test that pbarena works in a no_std environment.
//!
//! This crate verifies that the arena, the codec and the typed
//! google.api.HttpBody compile and work without the standard library.
//!
//! Build with: cargo build -p no-std-test --target thumbv7m-none-eabi

#![no_std]

use pbarena::arena::Arena;
use pbarena::google::api::HttpBody;
use pbarena::{Allocator, Message};

/// Test encoding works in no_std
pub fn test_encode(alloc: &'static dyn Allocator) -> bool {
    let arena = Arena::new(alloc);
    let Ok(msg) = HttpBody::new(&arena) else {
        return false;
    };
    msg.set_content_type("text/plain");
    msg.set_data(b"no_std");

    match msg.serialize(&arena) {
        Ok(encoded) => encoded.starts_with(&[0x0A, 0x0A]),
        Err(_) => false,
    }
}

/// Test decoding works in no_std
pub fn test_decode(alloc: &'static dyn Allocator) -> bool {
    let arena = Arena::new(alloc);

    // Field 1 (content_type) = string, tag = 0x0a, length = 10, "text/plain"
    let data: &[u8] = &[
        0x0a, 0x0a, b't', b'e', b'x', b't', b'/', b'p', b'l', b'a', b'i', b'n',
    ];

    match HttpBody::parse(data, &arena) {
        Ok(msg) => msg.content_type() == "text/plain" && msg.data().is_empty(),
        Err(_) => false,
    }
}

/// Test round-trip encode/decode works in no_std
pub fn test_roundtrip(alloc: &'static dyn Allocator) -> bool {
    let arena = Arena::new(alloc);

    let Ok(original) = HttpBody::new(&arena) else {
        return false;
    };
    original.set_content_type("application/octet-stream");
    original.set_data(&[1, 2, 3]);
    match original.add_extensions(&arena) {
        Ok(any) => any.set_type_url("type.googleapis.com/google.rpc.ErrorInfo"),
        Err(_) => return false,
    }

    let Ok(encoded) = original.serialize(&arena) else {
        return false;
    };
    let Ok(decoded) = HttpBody::parse_aliased(encoded, None, Default::default(), &arena) else {
        return false;
    };

    *decoded == *original && decoded.extensions()[0].type_name() == Some("google.rpc.ErrorInfo")
}
