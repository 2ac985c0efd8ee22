//! CRLF line framing.
//!
//! Inbound bytes are accumulated per connection and split on `\r\n`. A lone
//! `\n` is not a terminator. The accumulator is bounded so a peer that never
//! sends a terminator cannot grow it without limit.

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Line terminator.
pub const CRLF: &[u8] = b"\r\n";

/// Default cap on buffered, not-yet-terminated input (8 KiB).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 8 * 1024;

/// Framing errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A line (or unterminated tail) exceeded the configured maximum.
    #[error("Line of {0} bytes exceeds maximum {1}")]
    LineTooLong(usize, usize),

    /// I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Codec that frames a byte stream into CRLF-terminated text lines.
///
/// Decoded lines have the terminator stripped and invalid UTF-8 replaced.
/// Encoding appends the terminator.
#[derive(Debug, Clone, Copy)]
pub struct LineCodec {
    max_length: usize,
}

impl LineCodec {
    /// Create a codec with the default maximum line length.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a codec with a specific maximum line length.
    #[must_use]
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length: max_length.max(1),
        }
    }

    /// Get the maximum line length.
    #[must_use]
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(CRLF.len()).position(|w| w == CRLF)
}

impl Decoder for LineCodec {
    type Item = String;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match find_crlf(src) {
            Some(pos) if pos > self.max_length => {
                Err(ProtocolError::LineTooLong(pos, self.max_length))
            }
            Some(pos) => {
                let line = src.split_to(pos);
                src.advance(CRLF.len());
                Ok(Some(String::from_utf8_lossy(&line).into_owned()))
            }
            None => {
                // A trailing '\r' may be the first half of a split terminator.
                let pending = src.len() - usize::from(src.last() == Some(&b'\r'));
                if pending > self.max_length {
                    Err(ProtocolError::LineTooLong(pending, self.max_length))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

impl<T: AsRef<str>> Encoder<T> for LineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = item.as_ref().as_bytes();
        dst.reserve(line.len() + CRLF.len());
        dst.put_slice(line);
        dst.put_slice(CRLF);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_multiple_lines() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"NICK bob\r\nUSER a b c :d\r\n"[..]);

        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("NICK bob"));
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("USER a b c :d")
        );
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_line_stays_buffered() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"PASS sec"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(&buf[..], b"PASS sec");

        buf.extend_from_slice(b"ret\r");
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"\n");
        assert_eq!(
            codec.decode(&mut buf).unwrap().as_deref(),
            Some("PASS secret")
        );
    }

    #[test]
    fn test_bare_newline_is_not_a_terminator() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"HELP\n"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_empty_line() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"\r\nQUIT\r\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some(""));
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("QUIT"));
    }

    #[test]
    fn test_unterminated_overflow() {
        let mut codec = LineCodec::with_max_length(16);
        let mut buf = BytesMut::from(&[b'a'; 17][..]);
        match codec.decode(&mut buf) {
            Err(ProtocolError::LineTooLong(17, 16)) => {}
            other => panic!("Expected LineTooLong, got {:?}", other),
        }
    }

    #[test]
    fn test_full_length_line_with_split_terminator() {
        let mut codec = LineCodec::with_max_length(8);
        let mut buf = BytesMut::from(&b"PING abc\r"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"\n");
        assert_eq!(codec.decode(&mut buf).unwrap().as_deref(), Some("PING abc"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_overflow_before_carriage_return() {
        let mut codec = LineCodec::with_max_length(8);
        let mut buf = BytesMut::from(&b"PING abcd\r"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::LineTooLong(9, 8))
        ));
    }

    #[test]
    fn test_terminated_overflow() {
        let mut codec = LineCodec::with_max_length(4);
        let mut buf = BytesMut::from(&b"PRIVMSG\r\n"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::LineTooLong(7, 4))
        ));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"PRIVMSG bob :\xff\r\n"[..]);
        let line = codec.decode(&mut buf).unwrap().unwrap();
        assert!(line.starts_with("PRIVMSG bob :"));
        assert!(line.ends_with('\u{FFFD}'));
    }

    #[test]
    fn test_encode_appends_crlf() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(":parley NOTICE * :hi", &mut buf).unwrap();
        codec.encode(String::from("PING x"), &mut buf).unwrap();
        assert_eq!(&buf[..], b":parley NOTICE * :hi\r\nPING x\r\n");
    }
}
