use std::io;
use thiserror::Error;

/// Coarse error kinds used as `anyhow` context by application code.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("Data parse error")]
    DataParseError,
    #[error("Network error")]
    NetworkError,
    #[error("Invalid packet")]
    InvalidPacketError,
    #[error("Authentication error")]
    AuthError,
    #[error("Operation timed out")]
    TimeoutError,
}

pub type Result<T> = anyhow::Result<T>;

/// Failures of the binary framing layer.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("truncated input: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("insufficient bytes: packet declares {declared} bytes, have {available}")]
    InsufficientBytes { declared: usize, available: usize },
    #[error("invalid packet size: {0}")]
    InvalidPacketSize(i32),
    #[error("invalid request id: {0}")]
    InvalidRequestId(i32),
    #[error("invalid packet type: {0}")]
    InvalidPacketType(i32),
    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),
    #[error("unknown response header: 0x{0:02x}")]
    UnknownResponseHeader(u8),
}

impl DecodeError {
    /// Whether more input may turn this failure into a successful decode.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DecodeError::Truncated { .. } | DecodeError::InsufficientBytes { .. }
        )
    }
}

pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Misuse of a split packet container, or a fragment group that fails validation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ReassemblyError {
    #[error("container already completed, reset it before reuse")]
    AlreadyCompleted,
    #[error("request id mismatch: container holds {expected}, fragment has {found}")]
    RequestIdMismatch { expected: i32, found: i32 },
    #[error("packet count mismatch: container expects {expected}, fragment says {found}")]
    PacketCountMismatch { expected: u8, found: u8 },
    #[error("duplicate packet number {0}")]
    DuplicatePacket(u8),
    #[error("packet number {number} out of range for {count} packets")]
    PacketNumberOutOfRange { number: u8, count: u8 },
    #[error("incomplete: received {received} of {expected} packets")]
    Incomplete { received: usize, expected: usize },
    #[error("oversized response: {size} bytes exceeds {limit}")]
    Oversized { size: usize, limit: usize },
    #[error("checksum mismatch: expected 0x{expected:08x}, computed 0x{actual:08x}")]
    Checksum { expected: u32, actual: u32 },
    #[error("decompression failed: {0}")]
    Decompression(String),
    #[error("decompressed size mismatch: declared {declared}, got {actual}")]
    DecompressedSizeMismatch { declared: usize, actual: usize },
    #[error("declared decompressed size {declared} exceeds limit {limit}")]
    DecompressedSizeLimit { declared: usize, limit: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthFailureReason {
    /// The server rejected the password.
    BadPassword,
    /// A previously authenticated session was revoked.
    Invalidated,
}

#[derive(Debug, Error)]
pub enum RconError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("authentication failed: {0:?}")]
    AuthFailure(AuthFailureReason),
    #[error("not authenticated")]
    NotAuthenticated,
    #[error("request {0} is still awaiting a response")]
    RequestInFlight(i32),
    #[error("body too large: {0} bytes")]
    BodyTooLarge(usize),
    #[error("connection closed")]
    Closed,
    #[error("operation timed out")]
    Timeout,
}

impl RconError {
    /// Coarse kind for application-level reporting.
    pub fn kind(&self) -> Error {
        match self {
            RconError::Decode(_) | RconError::BodyTooLarge(_) => Error::InvalidPacketError,
            RconError::AuthFailure(_) | RconError::NotAuthenticated => Error::AuthError,
            RconError::Timeout => Error::TimeoutError,
            RconError::Io(_) | RconError::RequestInFlight(_) | RconError::Closed => {
                Error::NetworkError
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Reassembly(#[from] ReassemblyError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("operation timed out")]
    Timeout,
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl QueryError {
    /// Coarse kind for application-level reporting.
    pub fn kind(&self) -> Error {
        match self {
            QueryError::Decode(_)
            | QueryError::Reassembly(_)
            | QueryError::UnexpectedResponse(_) => Error::InvalidPacketError,
            QueryError::Io(_) => Error::NetworkError,
            QueryError::Timeout => Error::TimeoutError,
        }
    }
}
