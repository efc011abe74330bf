//! RFC 6455 client protocol: upgrade handshake and frame codec.

pub mod assembler;
pub mod decoder;
pub mod encoder;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod opcode;

pub use assembler::MessageAssembler;
pub use decoder::FrameDecoder;
pub use encoder::FrameEncoder;
pub use frame::Frame;
pub use handshake::{
    ClientHandshake, HandshakeResponse, PROTOCOL_VERSION, WS_GUID, compute_accept_key,
};
pub use mask::{MaskGenerator, apply_mask};
pub use opcode::OpCode;
