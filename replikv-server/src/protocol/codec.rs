//! RESP2 encoder/decoder for `tokio_util::codec::Framed`.
//!
//! Supported types:
//! - Simple Strings (+)
//! - Errors (-)
//! - Integers (:)
//! - Bulk Strings ($), including the `$-1` null
//! - Arrays (*)
//! - Inline commands (`SET key value\r\n`) at the top level

use super::{Frame, MAX_BULK_SIZE, MAX_ELEMENTS, MAX_NESTING_DEPTH, ProtocolError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Longest inline command line accepted before a newline is seen
const MAX_INLINE_SIZE: usize = 64 * 1024;

/// Longest type-prefixed header line (`+..`, `-..`, `:..`, `$n`, `*n`) before its CRLF
const MAX_HEADER_SIZE: usize = 64 * 1024;

/// RESP2 codec, used both by the server and by outbound clients
#[derive(Debug, Clone, Copy, Default)]
pub struct RespCodec;

impl RespCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for RespCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        loop {
            if src.is_empty() {
                return Ok(None);
            }

            if is_type_byte(src[0]) {
                return match parse_frame(&src[..], 0)? {
                    Some((frame, consumed)) => {
                        src.advance(consumed);
                        Ok(Some(frame))
                    }
                    None => Ok(None),
                };
            }

            // Inline command
            let Some(pos) = src.iter().position(|b| *b == b'\n') else {
                if src.len() > MAX_INLINE_SIZE {
                    return Err(ProtocolError::FrameTooLarge {
                        size: src.len(),
                        max: MAX_INLINE_SIZE,
                    });
                }
                return Ok(None);
            };

            let line = src.split_to(pos + 1);
            let tokens: Vec<Frame> = line[..pos]
                .split(|b| b.is_ascii_whitespace())
                .filter(|t| !t.is_empty())
                .map(|t| Frame::Bulk(Bytes::copy_from_slice(t)))
                .collect();

            // Blank lines are skipped
            if !tokens.is_empty() {
                return Ok(Some(Frame::Array(tokens)));
            }
        }
    }
}

impl Encoder<Frame> for RespCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        write_frame(&frame, dst);
        Ok(())
    }
}

fn is_type_byte(b: u8) -> bool {
    matches!(b, b'+' | b'-' | b':' | b'$' | b'*')
}

/// Parse one frame from the start of `data`.
///
/// Returns `Ok(None)` when more bytes are needed, otherwise the frame and the
/// number of bytes it occupied.
fn parse_frame(data: &[u8], depth: usize) -> Result<Option<(Frame, usize)>> {
    if data.is_empty() {
        return Ok(None);
    }

    if depth > MAX_NESTING_DEPTH {
        return Err(ProtocolError::Malformed(
            "maximum nesting depth exceeded".to_string(),
        ));
    }

    let Some((line, line_len)) = read_line(&data[1..]) else {
        // No CRLF anywhere: everything buffered belongs to this header line
        if data.len() > MAX_HEADER_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: data.len(),
                max: MAX_HEADER_SIZE,
            });
        }
        return Ok(None);
    };
    let header = 1 + line_len;

    match data[0] {
        b'+' => Ok(Some((
            Frame::Simple(String::from_utf8_lossy(line).into_owned()),
            header,
        ))),
        b'-' => Ok(Some((
            Frame::Error(String::from_utf8_lossy(line).into_owned()),
            header,
        ))),
        b':' => Ok(Some((Frame::Integer(parse_int(line)?), header))),
        b'$' => {
            let len = parse_int(line)?;
            if len == -1 {
                return Ok(Some((Frame::Null, header)));
            }
            if len < 0 {
                return Err(ProtocolError::Malformed(format!(
                    "invalid bulk string length {}",
                    len
                )));
            }

            let len = len as usize;
            if len > MAX_BULK_SIZE {
                return Err(ProtocolError::FrameTooLarge {
                    size: len,
                    max: MAX_BULK_SIZE,
                });
            }

            let end = header + len;
            if data.len() < end + 2 {
                return Ok(None);
            }
            if &data[end..end + 2] != b"\r\n" {
                return Err(ProtocolError::Malformed(
                    "missing CRLF after bulk string".to_string(),
                ));
            }

            Ok(Some((
                Frame::Bulk(Bytes::copy_from_slice(&data[header..end])),
                end + 2,
            )))
        }
        b'*' => {
            let len = parse_int(line)?;
            if len == -1 {
                return Ok(Some((Frame::Null, header)));
            }
            if len < 0 {
                return Err(ProtocolError::Malformed(format!(
                    "invalid array length {}",
                    len
                )));
            }

            let len = len as usize;
            if len > MAX_ELEMENTS {
                return Err(ProtocolError::FrameTooLarge {
                    size: len,
                    max: MAX_ELEMENTS,
                });
            }

            let mut items = Vec::with_capacity(len);
            let mut offset = header;
            for _ in 0..len {
                let rest = &data[offset..];
                if let Some(&b) = rest.first() {
                    if !is_type_byte(b) {
                        return Err(ProtocolError::Malformed(format!(
                            "unexpected type byte {:#04x} in array",
                            b
                        )));
                    }
                }
                match parse_frame(rest, depth + 1)? {
                    Some((frame, consumed)) => {
                        items.push(frame);
                        offset += consumed;
                    }
                    None => return Ok(None),
                }
            }

            Ok(Some((Frame::Array(items), offset)))
        }
        other => Err(ProtocolError::Malformed(format!(
            "unknown type byte {:#04x}",
            other
        ))),
    }
}

/// Returns the line before the next CRLF and the length including the CRLF
fn read_line(data: &[u8]) -> Option<(&[u8], usize)> {
    data.windows(2)
        .position(|w| w == b"\r\n")
        .map(|pos| (&data[..pos], pos + 2))
}

fn parse_int(line: &[u8]) -> Result<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            ProtocolError::Malformed(format!(
                "invalid integer '{}'",
                String::from_utf8_lossy(line)
            ))
        })
}

fn write_frame(frame: &Frame, dst: &mut BytesMut) {
    match frame {
        Frame::Simple(s) => {
            dst.put_u8(b'+');
            dst.put_slice(s.as_bytes());
            dst.put_slice(b"\r\n");
        }
        Frame::Error(e) => {
            dst.put_u8(b'-');
            dst.put_slice(e.as_bytes());
            dst.put_slice(b"\r\n");
        }
        Frame::Integer(n) => {
            dst.put_u8(b':');
            dst.put_slice(n.to_string().as_bytes());
            dst.put_slice(b"\r\n");
        }
        Frame::Bulk(b) => {
            dst.reserve(b.len() + 16);
            dst.put_u8(b'$');
            dst.put_slice(b.len().to_string().as_bytes());
            dst.put_slice(b"\r\n");
            dst.put_slice(b);
            dst.put_slice(b"\r\n");
        }
        Frame::Null => dst.put_slice(b"$-1\r\n"),
        Frame::Array(items) => {
            dst.put_u8(b'*');
            dst.put_slice(items.len().to_string().as_bytes());
            dst.put_slice(b"\r\n");
            for item in items {
                write_frame(item, dst);
            }
        }
    }
}
