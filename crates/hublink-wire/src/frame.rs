//! Length-prefixed framing.

use crate::error::{WireError, WireResult};
use std::io::Read;

pub const FRAME_HEADER_LEN: usize = 4;

/// Zero-length frame used as the keepalive in both directions.
pub const HEARTBEAT_FRAME: [u8; FRAME_HEADER_LEN] = [0; FRAME_HEADER_LEN];

/// Largest payload accepted unless configured otherwise (16 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Largest payload a 4-byte header can announce.
pub const MAX_ENCODABLE_LEN: usize = u32::MAX as usize;

/// Header announcing a `len`-byte payload. Fails if `len` does not fit in
/// the length field.
pub fn frame_header(len: usize) -> WireResult<[u8; FRAME_HEADER_LEN]> {
    let len = u32::try_from(len).map_err(|_| WireError::FrameTooLarge {
        len,
        max: MAX_ENCODABLE_LEN,
    })?;
    Ok(len.to_be_bytes())
}

/// Payload length announced by a header, rejected above `max_len`.
pub fn parse_frame_len(header: [u8; FRAME_HEADER_LEN], max_len: usize) -> WireResult<usize> {
    let len = u32::from_be_bytes(header) as usize;
    if len > max_len {
        return Err(WireError::FrameTooLarge { len, max: max_len });
    }
    Ok(len)
}

/// Header + payload in one buffer, ready for a single write.
pub fn encode_frame(payload: &[u8]) -> WireResult<Vec<u8>> {
    let header = frame_header(payload.len())?;
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Blocking read of one frame's payload. Empty for a heartbeat.
pub fn read_frame<R: Read>(reader: &mut R, max_len: usize) -> WireResult<Vec<u8>> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    reader.read_exact(&mut header)?;
    let len = parse_frame_len(header, max_len)?;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_encode_frame() {
        assert_eq!(encode_frame(b"abc").unwrap(), vec![0, 0, 0, 3, b'a', b'b', b'c']);
        assert_eq!(encode_frame(&[]).unwrap(), HEARTBEAT_FRAME.to_vec());
    }

    #[test]
    fn test_read_consecutive_frames() {
        let mut stream = encode_frame(b"first").unwrap();
        stream.extend_from_slice(&HEARTBEAT_FRAME);
        stream.extend_from_slice(&encode_frame(b"second").unwrap());
        let mut cursor = Cursor::new(stream);

        assert_eq!(read_frame(&mut cursor, 64).unwrap(), b"first");
        assert!(read_frame(&mut cursor, 64).unwrap().is_empty());
        assert_eq!(read_frame(&mut cursor, 64).unwrap(), b"second");
        assert!(matches!(
            read_frame(&mut cursor, 64),
            Err(WireError::Io(_))
        ));
    }

    #[test]
    fn test_oversized_frame_rejected_before_allocation() {
        let header = frame_header(1024).unwrap();
        assert!(matches!(
            parse_frame_len(header, 1023),
            Err(WireError::FrameTooLarge {
                len: 1024,
                max: 1023
            })
        ));
        assert_eq!(parse_frame_len(header, 1024).unwrap(), 1024);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_header_rejects_length_beyond_u32() {
        let len = MAX_ENCODABLE_LEN + 1;
        assert!(matches!(
            frame_header(len),
            Err(WireError::FrameTooLarge { len: l, max: MAX_ENCODABLE_LEN }) if l == len
        ));
        assert_eq!(
            frame_header(MAX_ENCODABLE_LEN).unwrap(),
            [0xff, 0xff, 0xff, 0xff]
        );
    }
}
