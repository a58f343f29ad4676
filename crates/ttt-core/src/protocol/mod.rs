//! Protocol module containing message types and the framed JSON codec.

pub mod codec;
pub mod messages;

pub use codec::{
    decode_request, decode_response, encode_frame, encode_request, encode_response, CodecError,
    Frame, FrameDecoder,
};
pub use messages::*;
