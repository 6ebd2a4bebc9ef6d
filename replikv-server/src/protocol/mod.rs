//! Wire protocol: RESP2 frames and the request envelope
//!
//! Clients send commands as arrays of bulk strings (or inline, space
//! separated lines). Replies are status lines, errors, integers, bulk
//! values, nil, or arrays.

pub mod codec;
pub mod frame;

pub use codec::RespCodec;
pub use frame::{Frame, Request};

use thiserror::Error;

/// Maximum size of a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of elements in one array
pub const MAX_ELEMENTS: usize = 1024 * 1024;

/// Maximum array nesting depth
pub const MAX_NESTING_DEPTH: usize = 32;

/// Protocol error types
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed frame: {0}")]
    Malformed(String),

    #[error("Frame too large: {size} > {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
