//! Field-level writer and reader for packet payloads.

use crate::error::{WireError, WireResult};
use hublink_core::Boundary;
use tracing::warn;

/// Builds a packet payload field by field.
#[derive(Debug, Default, Clone)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 4-byte length followed by the UTF-8 bytes.
    pub fn put_string(&mut self, value: &str) -> &mut Self {
        self.put_int(value.len() as i32);
        self.buf.extend_from_slice(value.as_bytes());
        self
    }

    /// 4 bytes, big-endian.
    pub fn put_int(&mut self, value: i32) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// 8 bytes, big-endian.
    pub fn put_long(&mut self, value: u64) -> &mut Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// One byte, 1 for true.
    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.buf.push(u8::from(value));
        self
    }

    /// Doubles travel as text. `Display` for `f64` prints the shortest
    /// decimal that parses back to the same value, never in exponent form.
    pub fn put_double(&mut self, value: f64) -> &mut Self {
        self.put_string(&value.to_string())
    }

    /// Only the "equals" flag combination is ever written.
    pub fn put_boundary(&mut self, boundary: Boundary) -> &mut Self {
        self.put_bool(true);
        self.put_bool(false);
        self.put_double(boundary.value())
    }

    /// Presence byte, then the boundary if there is one.
    pub fn put_optional_boundary(&mut self, boundary: Option<Boundary>) -> &mut Self {
        match boundary {
            Some(boundary) => self.put_bool(true).put_boundary(boundary),
            None => self.put_bool(false),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The finished payload.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Reads fields from a packet payload in order.
#[derive(Debug)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> WireResult<&'a [u8]> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(WireError::Truncated {
                needed: n,
                remaining,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> WireResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn next_int(&mut self) -> WireResult<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn next_long(&mut self) -> WireResult<u64> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    pub fn next_bool(&mut self) -> WireResult<bool> {
        let [byte] = self.take_array::<1>()?;
        Ok(byte != 0)
    }

    pub fn next_string(&mut self) -> WireResult<String> {
        let len = self.next_int()?;
        let len = usize::try_from(len).map_err(|_| WireError::NegativeLength(len))?;
        let bytes = self.take(len)?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    /// Accepts any text `f64::from_str` understands, surrounding
    /// whitespace ignored.
    pub fn next_double(&mut self) -> WireResult<f64> {
        let text = self.next_string()?;
        text.trim()
            .parse::<f64>()
            .map_err(|_| WireError::InvalidDouble(text))
    }

    /// Direction and equality flags are read but not honored; anything
    /// other than "equals" is logged and the value used as is.
    pub fn next_boundary(&mut self) -> WireResult<Boundary> {
        let is_equal = self.next_bool()?;
        let _direction = self.next_bool()?;
        if !is_equal {
            warn!("Boundary without equals flag is not supported, using value as-is");
        }
        Ok(Boundary::new(self.next_double()?))
    }

    pub fn next_optional_boundary(&mut self) -> WireResult<Option<Boundary>> {
        if self.next_bool()? {
            Ok(Some(self.next_boundary()?))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_layout() {
        let mut writer = WireWriter::new();
        writer.put_string("Hi");
        assert_eq!(writer.into_bytes(), vec![0, 0, 0, 2, b'H', b'i']);
    }

    #[test]
    fn test_numbers_are_big_endian() {
        let mut writer = WireWriter::new();
        writer.put_int(1).put_long(0x0102_0304_0506_0708).put_bool(true);
        assert_eq!(
            writer.into_bytes(),
            vec![0, 0, 0, 1, 1, 2, 3, 4, 5, 6, 7, 8, 1]
        );
    }

    #[test]
    fn test_double_is_decimal_text() {
        let mut writer = WireWriter::new();
        writer.put_double(1.5);
        assert_eq!(writer.into_bytes(), vec![0, 0, 0, 3, b'1', b'.', b'5']);
    }

    #[test]
    fn test_double_reads_c_style_text() {
        let mut writer = WireWriter::new();
        writer.put_string("1.234500").put_string(" 7e-3");

        let bytes = writer.into_bytes();
        let mut reader = WireReader::new(&bytes);
        assert_eq!(reader.next_double().unwrap(), 1.2345);
        assert_eq!(reader.next_double().unwrap(), 0.007);
    }

    #[test]
    fn test_double_text_preserves_precision() {
        let values = [0.1, 1.0 / 3.0, 1.0e-9, 123_456_789.987_654_3, -0.0];
        for value in values {
            let mut writer = WireWriter::new();
            writer.put_double(value);
            let bytes = writer.into_bytes();
            let parsed = WireReader::new(&bytes).next_double().unwrap();
            assert_eq!(parsed.to_bits(), value.to_bits(), "value {value}");
        }
    }

    #[test]
    fn test_invalid_double_text() {
        let mut writer = WireWriter::new();
        writer.put_string("1,5");
        let bytes = writer.into_bytes();
        let err = WireReader::new(&bytes).next_double().unwrap_err();
        assert!(matches!(err, WireError::InvalidDouble(text) if text == "1,5"));
    }

    #[test]
    fn test_boundary_layout() {
        let mut writer = WireWriter::new();
        writer.put_boundary(Boundary::new(2.0));
        assert_eq!(writer.into_bytes(), vec![1, 0, 0, 0, 0, 1, b'2']);
    }

    #[test]
    fn test_boundary_without_equals_flag_is_accepted() {
        let mut writer = WireWriter::new();
        writer.put_bool(false).put_bool(true).put_double(1.25);
        let bytes = writer.into_bytes();
        let boundary = WireReader::new(&bytes).next_boundary().unwrap();
        assert_eq!(boundary, Boundary::new(1.25));
    }

    #[test]
    fn test_optional_boundary_absent() {
        let bytes = [0u8];
        let mut reader = WireReader::new(&bytes);
        assert_eq!(reader.next_optional_boundary().unwrap(), None);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_truncated_long() {
        let bytes = [0u8; 5];
        let err = WireReader::new(&bytes).next_long().unwrap_err();
        assert!(matches!(
            err,
            WireError::Truncated {
                needed: 8,
                remaining: 5
            }
        ));
    }

    #[test]
    fn test_string_length_past_end() {
        let bytes = [0, 0, 0, 9, b'a'];
        let err = WireReader::new(&bytes).next_string().unwrap_err();
        assert!(matches!(err, WireError::Truncated { needed: 9, .. }));
    }

    #[test]
    fn test_negative_string_length() {
        let bytes = (-1i32).to_be_bytes();
        let err = WireReader::new(&bytes).next_string().unwrap_err();
        assert!(matches!(err, WireError::NegativeLength(-1)));
    }

    #[test]
    fn test_invalid_utf8() {
        let bytes = [0, 0, 0, 2, 0xff, 0xfe];
        let err = WireReader::new(&bytes).next_string().unwrap_err();
        assert!(matches!(err, WireError::InvalidUtf8(_)));
    }
}
