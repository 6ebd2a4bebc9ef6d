use super::{ProtocolError, Result};
use bytes::Bytes;
use std::fmt;

/// A single RESP2 value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `+OK\r\n`
    Simple(String),
    /// `-ERR message\r\n`
    Error(String),
    /// `:42\r\n`
    Integer(i64),
    /// `$5\r\nhello\r\n`
    Bulk(Bytes),
    /// `$-1\r\n`
    Null,
    /// `*2\r\n...`
    Array(Vec<Frame>),
}

impl Frame {
    /// Build an array of bulk strings
    pub fn bulk_array<I, B>(items: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Frame::Array(items.into_iter().map(|b| Frame::Bulk(b.into())).collect())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Simple(s) => write!(f, "{}", s),
            Frame::Error(e) => write!(f, "(error) {}", e),
            Frame::Integer(n) => write!(f, "(integer) {}", n),
            Frame::Bulk(b) => write!(f, "\"{}\"", String::from_utf8_lossy(b).escape_debug()),
            Frame::Null => write!(f, "(nil)"),
            Frame::Array(items) if items.is_empty() => write!(f, "(empty array)"),
            Frame::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, item)?;
                }
                Ok(())
            }
        }
    }
}

/// A parsed client command: name plus positional byte-string arguments.
///
/// `args` does not include the command name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub name: String,
    pub args: Vec<Bytes>,
}

impl Request {
    /// Create a new request
    pub fn new<I, B>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Lower-cased command name, used for routing
    pub fn command(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    pub fn arg(&self, index: usize) -> Option<&Bytes> {
        self.args.get(index)
    }

    /// Argument as UTF-8 text (lossy)
    pub fn arg_str(&self, index: usize) -> Option<String> {
        self.args
            .get(index)
            .map(|a| String::from_utf8_lossy(a).into_owned())
    }

    /// Encode as a multi-bulk array, the form clients put on the wire
    pub fn into_frame(self) -> Frame {
        let mut items = Vec::with_capacity(self.args.len() + 1);
        items.push(Frame::Bulk(Bytes::from(self.name)));
        items.extend(self.args.into_iter().map(Frame::Bulk));
        Frame::Array(items)
    }
}

impl TryFrom<Frame> for Request {
    type Error = ProtocolError;

    fn try_from(frame: Frame) -> Result<Self> {
        let items = match frame {
            Frame::Array(items) => items,
            other => {
                return Err(ProtocolError::InvalidRequest(format!(
                    "expected array, got {:?}",
                    other
                )));
            }
        };

        let mut parts = items.into_iter().map(|item| match item {
            Frame::Bulk(b) => Ok(b),
            Frame::Simple(s) => Ok(Bytes::from(s)),
            Frame::Integer(n) => Ok(Bytes::from(n.to_string())),
            other => Err(ProtocolError::InvalidRequest(format!(
                "unexpected element {:?}",
                other
            ))),
        });

        let name = match parts.next() {
            Some(name) => name?,
            None => return Err(ProtocolError::InvalidRequest("empty command".to_string())),
        };
        let name = String::from_utf8(name.to_vec())
            .map_err(|_| ProtocolError::InvalidRequest("command name is not UTF-8".to_string()))?;

        let args = parts.collect::<Result<Vec<_>>>()?;
        Ok(Self { name, args })
    }
}
