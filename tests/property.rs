//! Property-based tests for the frame codec and the upgrade handshake.

use proptest::prelude::*;
use wsession::protocol::frame::Frame;
use wsession::protocol::{
    ClientHandshake, FrameDecoder, FrameEncoder, MessageAssembler, OpCode, apply_mask,
    compute_accept_key,
};
use wsession::{Limits, Message, Target};

fn data_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![
        Just(OpCode::Text),
        Just(OpCode::Binary),
        Just(OpCode::Continuation),
    ]
}

fn message_strategy() -> impl Strategy<Value = Message> {
    prop_oneof![
        "[a-zA-Z0-9 äöü€]{0,300}".prop_map(Message::text),
        prop::collection::vec(any::<u8>(), 0..600).prop_map(Message::binary),
        prop::collection::vec(any::<u8>(), 0..125).prop_map(Message::ping),
    ]
}

fn unbounded_fragments() -> Limits {
    Limits {
        max_fragment_count: usize::MAX,
        ..Limits::default()
    }
}

fn unmasked(frames: &[Frame]) -> Vec<u8> {
    let mut out = Vec::new();
    for frame in frames {
        frame.write_to(&mut out, None);
    }
    out
}

/// Split a message into server frames of at most `size` payload bytes.
fn server_frames(message: &Message, size: usize) -> Vec<Frame> {
    let (opcode, payload) = match message {
        Message::Text(text) => (OpCode::Text, text.as_bytes().to_vec()),
        Message::Binary(data) => (OpCode::Binary, data.clone()),
        Message::Ping(data) => return vec![Frame::ping(data.clone())],
        other => panic!("unexpected message {other:?}"),
    };
    if payload.is_empty() {
        return vec![Frame::new(true, opcode, payload)];
    }
    let chunks: Vec<_> = payload.chunks(size).collect();
    let last = chunks.len() - 1;
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let op = if i == 0 { opcode } else { OpCode::Continuation };
            Frame::new(i == last, op, chunk.to_vec())
        })
        .collect()
}

proptest! {
    #[test]
    fn test_frame_written_then_parsed(
        fin in any::<bool>(),
        opcode in data_opcode_strategy(),
        payload in prop::collection::vec(any::<u8>(), 0..70_000),
        mask in prop::option::of(any::<[u8; 4]>()),
    ) {
        let frame = Frame::new(fin, opcode, payload);
        let mut out = Vec::new();
        frame.write_to(&mut out, mask);
        prop_assert_eq!(out.len(), frame.wire_size(mask.is_some()));

        let (parsed, consumed) = Frame::parse(&out).unwrap();
        prop_assert_eq!(consumed, out.len());
        prop_assert_eq!(parsed, frame);
    }

    #[test]
    fn test_mask_is_an_involution(
        data in prop::collection::vec(any::<u8>(), 0..512),
        key in any::<[u8; 4]>(),
    ) {
        let mut masked = data.clone();
        apply_mask(&mut masked, key);
        apply_mask(&mut masked, key);
        prop_assert_eq!(masked, data);
    }

    #[test]
    fn test_decoder_ignores_chunk_boundaries(
        messages in prop::collection::vec(message_strategy(), 1..8),
        fragment in 1usize..200,
        chunk in 1usize..64,
    ) {
        let frames: Vec<Frame> = messages
            .iter()
            .flat_map(|m| server_frames(m, fragment))
            .collect();
        let bytes = unmasked(&frames);

        let mut decoder = FrameDecoder::new(unbounded_fragments());
        let mut decoded = Vec::new();
        for piece in bytes.chunks(chunk) {
            decoder.push(piece);
            while let Some(message) = decoder.next_message().unwrap() {
                decoded.push(message);
            }
        }
        prop_assert_eq!(decoded, messages);
        prop_assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_encoder_fragments_reassemble(
        payload in prop::collection::vec(any::<u8>(), 0..5000),
        fragment_size in 1usize..1024,
    ) {
        let message = Message::binary(payload);
        let mut encoder = FrameEncoder::new(13, fragment_size).unwrap();
        let bytes = encoder.encode(&message).unwrap();

        let mut assembler = MessageAssembler::new(unbounded_fragments());
        let mut offset = 0;
        let mut result = None;
        let mut frames = 0;
        while offset < bytes.len() {
            let (frame, consumed) = Frame::parse(&bytes[offset..]).unwrap();
            prop_assert!(frame.payload().len() <= fragment_size);
            offset += consumed;
            frames += 1;
            result = assembler.push(frame).unwrap();
        }
        prop_assert!(frames >= 1);
        prop_assert_eq!(result, Some(message));
        prop_assert!(!assembler.is_assembling());
    }

    #[test]
    fn test_handshake_accepts_response_in_any_split(
        split in 1usize..40,
        trailing in prop::collection::vec(any::<u8>(), 0..16),
    ) {
        let target = Target {
            host: "example.com".into(),
            port: 80,
            secure: false,
            path: "/chat".into(),
            query: String::new(),
        };
        let key = "dGhlIHNhbXBsZSBub25jZQ==".to_string();
        let mut handshake = ClientHandshake::with_key(&target, key.clone(), 8192).unwrap();

        let header = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            compute_accept_key(&key)
        );
        let mut response = header.clone().into_bytes();
        response.extend_from_slice(&trailing);

        let mut consumed = 0;
        for piece in response.chunks(split) {
            consumed += handshake.feed(piece);
        }
        prop_assert!(handshake.is_valid());
        prop_assert_eq!(consumed, header.len());
        prop_assert_eq!(handshake.version(), Some(13));
    }
}
