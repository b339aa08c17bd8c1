#![no_main]

use allocator_api2::alloc::Global;
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use pbarena::google::api::HttpBody;
use pbarena::{Message, MessageExt};

#[derive(Arbitrary, Debug)]
struct ChunkedInput {
    data: Vec<u8>,
    chunk_sizes: Vec<u8>,
}

// Hands out the input in the chunk sizes picked by the fuzzer.
struct ChunkedReader<'i> {
    input: &'i ChunkedInput,
    pos: usize,
    chunk_idx: usize,
}

impl std::io::Read for ChunkedReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pos >= self.input.data.len() {
            return Ok(0);
        }
        let size = self
            .input
            .chunk_sizes
            .get(self.chunk_idx)
            .copied()
            .unwrap_or(16)
            .max(1) as usize;
        let end = (self.pos + size.min(buf.len())).min(self.input.data.len());
        let chunk = &self.input.data[self.pos..end];
        buf[..chunk.len()].copy_from_slice(chunk);
        self.pos = end;
        self.chunk_idx += 1;
        Ok(chunk.len())
    }
}

fuzz_target!(|input: ChunkedInput| {
    let arena = pbarena::arena::Arena::new(&Global);
    let mut reader = ChunkedReader {
        input: &input,
        pos: 0,
        chunk_idx: 0,
    };

    let Ok(msg) = HttpBody::decode_from_read(&mut reader, &arena) else {
        return;
    };
    let direct = HttpBody::parse(&input.data, &arena).expect("chunked decode succeeded");
    assert_eq!(*direct, *msg);

    let encoded = msg.serialize(&arena).expect("decoded message encodes");
    let again = HttpBody::parse(encoded, &arena).expect("re-encoded message decodes");
    assert_eq!(*again, *msg);
});
