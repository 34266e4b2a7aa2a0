//! Outcome codes shared by every driver entry point.
//!
//! Service-control calls return immediately; anything that is not an
//! immediate success is one of the [`Error`] variants below.  Transient
//! conditions (`Busy`, `RetryRequest`) are ordinary values the caller
//! polls on, never panics.  All variants are `Copy` so they can be passed
//! through callbacks without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Driver outcome codes
// ---------------------------------------------------------------------------

/// Every fallible driver operation funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Caller misuse; retrying the same call will not help.
    InvalidArg,
    /// The device or session has not been opened.
    NotOpen,
    /// The operation needs an active association.
    NotConnected,
    /// A local single-flight resource is occupied.  Retry later.
    Busy,
    /// Accepted, but data must first be fetched.  Poll again later.
    RetryRequest,
    /// The co-processor rejected the request, or it could not be built
    /// or handed to the transport.
    RequestError,
    /// A context structure failed internal validation.
    InvalidContext,
    /// Not available in the current operating role.
    OperationNotSupported,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArg => write!(f, "invalid argument"),
            Self::NotOpen => write!(f, "not open"),
            Self::NotConnected => write!(f, "not connected"),
            Self::Busy => write!(f, "busy"),
            Self::RetryRequest => write!(f, "retry request"),
            Self::RequestError => write!(f, "request error"),
            Self::InvalidContext => write!(f, "invalid context"),
            Self::OperationNotSupported => write!(f, "operation not supported"),
        }
    }
}

impl Error {
    /// `true` for outcomes the caller is expected to poll/retry on.
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Busy | Self::RetryRequest)
    }
}

// ---------------------------------------------------------------------------
// Frame decode errors
// ---------------------------------------------------------------------------

/// Malformations detected while decoding a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    /// Length prefix is zero or larger than the receive buffer.
    BadLength(usize),
    /// Message type byte is not one the host understands.
    UnknownType(u8),
    /// Body is shorter than the fixed header for its type.
    Truncated,
    /// Element list is malformed or declares more than the maximum.
    BadElements,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadLength(len) => write!(f, "bad frame length {len}"),
            Self::UnknownType(t) => write!(f, "unknown message type 0x{t:02x}"),
            Self::Truncated => write!(f, "truncated frame"),
            Self::BadElements => write!(f, "malformed element list"),
        }
    }
}

impl From<FrameError> for Error {
    fn from(_: FrameError) -> Self {
        Self::RequestError
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Driver-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
