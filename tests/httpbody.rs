use allocator_api2::alloc::Global;
use pbarena::arena::Arena;
use pbarena::google::api::HttpBody;
use pbarena::google::protobuf::Any;
use pbarena::test_utils::assert_roundtrip;
use pbarena::{DecodeError, DecodeOptions, EncodeOptions, Message, MessageExt};

fn build<'a>(arena: &'a Arena, content_type: &str, data: &[u8], urls: &[&str]) -> &'a mut HttpBody<'a> {
    let body = HttpBody::new(arena).unwrap();
    body.set_content_type(arena.alloc_str(content_type).unwrap());
    body.set_data(arena.alloc_slice_copy(data).unwrap());
    for url in urls {
        let ext = body.add_extensions(arena).unwrap();
        ext.set_type_url(arena.alloc_str(url).unwrap());
        ext.set_value(arena.alloc_slice_copy(url.as_bytes()).unwrap());
    }
    body
}

#[test]
fn roundtrip_varied_content() {
    let arena = Arena::new(&Global);
    let big = vec![0x5Au8; 70_000];
    let cases: [(&str, &[u8], &[&str]); 5] = [
        ("", b"", &[]),
        ("text/plain; charset=utf-8", "héllo wörld".as_bytes(), &[]),
        ("", &[0, 0xFF, 0x80, 0x7F], &["a/b"]),
        ("application/octet-stream", &big, &["x/y.Z", "", "type.googleapis.com/z"]),
        ("😀", b"\x00", &["u/v"; 20]),
    ];
    for (content_type, data, urls) in cases {
        let body = build(&arena, content_type, data, urls);
        assert_roundtrip(&*body, &arena);
    }
}

#[test]
fn text_plain_encoding() {
    let arena = Arena::new(&Global);
    let body = build(&arena, "text/plain", b"", &[]);
    let bytes = body.encode_vec().unwrap();
    assert_eq!(bytes[0], 0x0A);
    assert_eq!(bytes[1], 0x0A);
    assert_eq!(&bytes[2..], b"text/plain");
}

#[test]
fn stripping_unknown_fields() {
    let arena = Arena::new(&Global);
    let body = build(&arena, "a/b", b"payload", &["t/one"]);
    let known = body.serialize(&arena).unwrap();

    // Append a fixed64 field 9 and a group field 10.
    let mut extended = known.to_vec();
    extended.extend_from_slice(&[0x49, 1, 2, 3, 4, 5, 6, 7, 8, 0x53, 0x08, 0x01, 0x54]);
    let decoded = HttpBody::parse(&extended, &arena).unwrap();
    assert_eq!(decoded, body);

    let stripped = decoded
        .serialize_ex(EncodeOptions::default().with_skip_unknown(true), &arena)
        .unwrap();
    assert_eq!(stripped, known);
    assert_eq!(decoded.serialize(&arena).unwrap(), &extended[..]);

    let discarded = HttpBody::parse_ex(
        &extended,
        None,
        DecodeOptions::default().with_discard_unknown(true),
        &arena,
    )
    .unwrap();
    assert_eq!(discarded.serialize(&arena).unwrap(), known);
}

#[test]
fn every_truncation_of_an_extension_fails() {
    let arena = Arena::new(&Global);
    let body = build(&arena, "", b"", &["type.googleapis.com/google.rpc.Status"]);
    let bytes = body.serialize(&arena).unwrap();
    // The whole message is one extension field, so no shorter prefix except
    // the empty one is well formed.
    for len in 1..bytes.len() {
        let err = HttpBody::parse(&bytes[..len], &arena).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }), "prefix {len}: {err}");
    }
}

#[test]
fn limited_arena_reports_out_of_memory() {
    let source = Arena::new(&Global);
    let body = build(&source, "text/plain", &[7u8; 2048], &["a/b"; 8]);
    let bytes = body.encode_vec().unwrap();

    let arena = Arena::with_limit(&Global, 1024);
    assert_eq!(HttpBody::parse(&bytes, &arena).err(), Some(DecodeError::OutOfMemory));
    // Aliased decoding doesn't copy the data and fits.
    assert!(HttpBody::parse_aliased(&bytes, None, DecodeOptions::default(), &arena).is_ok());
    assert!(arena.space_allocated() <= 1024);
}

#[test]
fn decoded_messages_are_shared_across_threads() {
    let arena = Arena::new(&Global);
    let body = build(&arena, "text/plain", b"shared", &["t/a", "t/b", "t/c"]);
    let body: &HttpBody<'_> = body;
    std::thread::scope(|s| {
        for i in 0..3 {
            s.spawn(move || {
                assert_eq!(body.content_type(), "text/plain");
                assert_eq!(body.extensions()[i].value().len(), 3);
            });
        }
    });
}

// Builds an extension in a size-limited session arena that is merged into
// `owner`, so the result lives as long as `owner` does.
fn session_extension<'a>(owner: &'a Arena, payload: &[u8]) -> &'a mut Any<'a> {
    let session = owner.fuse(Arena::with_limit(&Global, 4096)).unwrap();
    let any = Any::new(session).unwrap();
    any.set_type_url("type.googleapis.com/google.rpc.DebugInfo");
    any.set_value(session.alloc_slice_copy(payload).unwrap());
    any
}

#[test]
fn messages_from_a_fused_session_join_the_owner() {
    let arena = Arena::new(&Global);
    let body = build(&arena, "text/plain", b"body", &[]);
    let any = session_extension(&arena, b"trace");
    body.extensions_mut().push(any, &arena).unwrap();

    assert_eq!(body.content_type(), "text/plain");
    assert_eq!(body.extensions()[0].type_name(), Some("google.rpc.DebugInfo"));
    assert_eq!(body.extensions()[0].value(), b"trace");
    let bytes = body.serialize(&arena).unwrap();
    assert_eq!(HttpBody::parse(bytes, &arena).unwrap(), body);
}

#[test]
fn messages_may_reference_another_live_arena() {
    let arena = Arena::new(&Global);
    let other = Arena::new(&Global);
    let body = build(&arena, "", b"", &[]);
    let any = Any::new(&other).unwrap();
    any.set_value(other.alloc_slice_copy(b"elsewhere").unwrap());
    body.extensions_mut().push(any, &arena).unwrap();
    assert_eq!(body.extensions()[0].value(), b"elsewhere");
}

#[test]
fn read_helpers() {
    let arena = Arena::new(&Global);
    let body = build(&arena, "image/png", &[0x89, b'P', b'N', b'G'], &["t/meta"]);
    let bytes = body.encode_vec().unwrap();

    let from_read = HttpBody::decode_from_read(&mut bytes.as_slice(), &arena).unwrap();
    assert_eq!(from_read, body);

    let mut cursor = std::io::Cursor::new(bytes.clone());
    let from_bufread = HttpBody::decode_from_bufread(&mut cursor, &arena).unwrap();
    assert_eq!(from_bufread, body);

    let mut async_reader = futures::io::Cursor::new(bytes.clone());
    let from_async =
        futures::executor::block_on(HttpBody::decode_from_async_read(&mut async_reader, &arena))
            .unwrap();
    assert_eq!(from_async, body);

    let err = HttpBody::decode_from_read(&mut &bytes[..bytes.len() - 1], &arena).unwrap_err();
    assert_eq!(err.downcast_ref::<DecodeError>(), Some(&DecodeError::Truncated { offset: bytes.len() - 1 }));
}

#[test]
fn any_elements_parse_standalone() {
    let arena = Arena::new(&Global);
    let any = Any::parse(b"\x0A\x03a/b\x12\x02hi", &arena).unwrap();
    assert_eq!(any.type_name(), Some("b"));
    assert_eq!(any.value(), b"hi");
}
