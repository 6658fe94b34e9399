use bytes::{Buf, BytesMut};
use std::{fmt, io};
use tokio_util::codec::{Decoder, Encoder};

/// Width of the ASCII decimal length header.
pub const HEADER_LENGTH: usize = 4;

/// Largest body a single frame may carry.
pub const MAX_BODY_LENGTH: usize = 512;

/// One frame: a 4 byte right-justified decimal header followed by the body.
///
/// The buffer always has room for the largest frame, so a message is a plain
/// value and is copied whenever it is queued for another connection.
#[derive(Clone)]
pub struct Message {
    body_length: usize,
    buffer: [u8; HEADER_LENGTH + MAX_BODY_LENGTH],
}

impl Message {
    /// Build a message carrying `body`, truncated to [`MAX_BODY_LENGTH`] bytes, with its header encoded.
    pub fn new(body: &[u8]) -> Self {
        let mut message = Self::default();
        message.set_body_length(body.len());
        let length = message.body_length;
        message.body_mut().copy_from_slice(&body[..length]);
        message.encode_header();
        message
    }

    /// The encoded frame: header followed by the body.
    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.length()]
    }

    /// Encoded length, `HEADER_LENGTH + body_length`.
    pub fn length(&self) -> usize {
        HEADER_LENGTH + self.body_length
    }

    /// The 4 header bytes.
    pub fn header(&self) -> &[u8] {
        &self.buffer[..HEADER_LENGTH]
    }

    /// Mutable header bytes, filled in before [`Message::decode_header`].
    pub fn header_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[..HEADER_LENGTH]
    }

    /// The body, `body_length` bytes.
    pub fn body(&self) -> &[u8] {
        &self.buffer[HEADER_LENGTH..self.length()]
    }

    /// Mutable body of the current `body_length`.
    pub fn body_mut(&mut self) -> &mut [u8] {
        let end = self.length();
        &mut self.buffer[HEADER_LENGTH..end]
    }

    /// Current body length.
    pub fn body_length(&self) -> usize {
        self.body_length
    }

    /// Set the body length, silently clamped to [`MAX_BODY_LENGTH`].
    pub fn set_body_length(&mut self, length: usize) {
        self.body_length = length.min(MAX_BODY_LENGTH);
    }

    /// Write `body_length` into the header as `%4d` would.
    pub fn encode_header(&mut self) {
        let header = format!("{:>width$}", self.body_length, width = HEADER_LENGTH);
        self.buffer[..HEADER_LENGTH].copy_from_slice(&header.as_bytes()[..HEADER_LENGTH]);
    }

    /// Parse the header into `body_length`.
    ///
    /// Returns `false` and resets the body length to zero when the header
    /// holds a negative value or one above [`MAX_BODY_LENGTH`].
    pub fn decode_header(&mut self) -> bool {
        match usize::try_from(parse_decimal(self.header())) {
            Ok(length) if length <= MAX_BODY_LENGTH => {
                self.body_length = length;
                true
            }
            _ => {
                self.body_length = 0;
                false
            }
        }
    }
}

impl Default for Message {
    fn default() -> Self {
        Self {
            body_length: 0,
            buffer: [0; HEADER_LENGTH + MAX_BODY_LENGTH],
        }
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.data() == other.data()
    }
}

impl Eq for Message {}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("body_length", &self.body_length)
            .field("body", &String::from_utf8_lossy(self.body()))
            .finish()
    }
}

/// Lenient decimal parse with `atoi` rules: leading whitespace, optional sign,
/// then digits up to the first non-digit. No digits at all yields zero.
fn parse_decimal(text: &[u8]) -> i64 {
    let mut bytes = text
        .iter()
        .copied()
        .skip_while(u8::is_ascii_whitespace)
        .peekable();
    let negative = match bytes.peek() {
        Some(b'-') => {
            bytes.next();
            true
        }
        Some(b'+') => {
            bytes.next();
            false
        }
        _ => false,
    };
    let value = bytes
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, digit| acc * 10 + i64::from(digit - b'0'));
    if negative {
        -value
    } else {
        value
    }
}

/// Frames a byte stream into [`Message`]s, alternating strictly between
/// reading a header and reading the body it announces.
#[derive(Debug, Default)]
pub struct MessageCodec {
    // Header already decoded, waiting for its body.
    pending: Option<Message>,
}

impl MessageCodec {
    /// A codec expecting a header first.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let message = match &mut self.pending {
            Some(message) => message,
            None => {
                if src.len() < HEADER_LENGTH {
                    src.reserve(HEADER_LENGTH - src.len());
                    return Ok(None);
                }
                let mut message = Message::default();
                message.header_mut().copy_from_slice(&src[..HEADER_LENGTH]);
                src.advance(HEADER_LENGTH);
                if !message.decode_header() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "frame header announces an invalid body length",
                    ));
                }
                self.pending.insert(message)
            }
        };

        let length = message.body_length();
        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }
        message.body_mut().copy_from_slice(&src[..length]);
        src.advance(length);
        Ok(self.pending.take())
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.data());
        Ok(())
    }
}
