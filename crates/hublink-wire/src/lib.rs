//! Binary codec for the hub protocol.
//!
//! Every packet travels as one frame: a 4-byte big-endian length followed
//! by the payload. A zero-length frame is the heartbeat. A payload starts
//! with the packet name (string encoding) followed by its fields.
//!
//! Field encodings:
//! - string: 4-byte length + raw bytes
//! - int: 4 bytes big-endian, long: 8 bytes big-endian
//! - bool: 1 byte, nonzero = true
//! - double: decimal text, string encoding
//! - optional value: presence byte + value when present
//! - boundary: two flag bytes (equals, direction) + double

pub mod buffer;
pub mod error;
pub mod frame;
pub mod packet;

pub use buffer::{WireReader, WireWriter};
pub use error::{WireError, WireResult};
pub use frame::{
    encode_frame, frame_header, parse_frame_len, read_frame, DEFAULT_MAX_FRAME_LEN,
    FRAME_HEADER_LEN, HEARTBEAT_FRAME, MAX_ENCODABLE_LEN,
};
pub use packet::{InboundPacket, OutboundPacket};
