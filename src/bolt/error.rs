//! Bolt protocol error types.
//!
//! Every failure the engine can report is one variant of [`BoltError`]. The
//! variant alone decides whether the connection survives ([`BoltError::is_fatal`])
//! and whether a client may retry the same request ([`BoltError::is_retryable`]).

use std::io;

use thiserror::Error;

use super::handshake::ProtocolVersion;
use super::message::FailureMessage;
use super::packstream::PackStreamError;

/// Result type for Bolt operations.
pub type BoltResult<T> = Result<T, BoltError>;

/// Bolt protocol errors.
#[derive(Error, Debug)]
pub enum BoltError {
    /// I/O error on the underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Version negotiation failed
    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Malformed PackStream data
    #[error("PackStream error: {0}")]
    PackStream(#[from] PackStreamError),

    /// Unknown structure or a message the current state cannot accept
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Framed message larger than the configured limit
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Size the message reached
        size: usize,
        /// Configured limit
        max: usize,
    },

    /// Admission control or memory accounting refused the work
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A state reference with no state bound for the negotiated version
    #[error("No state '{state}' is bound for protocol version {version}")]
    StateLookup {
        /// Name of the missing state
        state: &'static str,
        /// Negotiated version
        version: ProtocolVersion,
    },

    /// Credentials or impersonation were rejected
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Well-formed request that makes no sense right now
    #[error("Invalid request: {0}")]
    RequestInvalid(String),

    /// Failure reported by the query or transaction layer
    #[error("{code}: {message}")]
    Job {
        /// Status code reported by the collaborator
        code: String,
        /// Human readable message
        message: String,
    },

    /// Invalid server configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Connection closed
    #[error("Connection closed")]
    ConnectionClosed,
}

impl BoltError {
    /// Create a protocol violation.
    pub fn protocol_violation(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }

    /// Create a resource exhaustion error.
    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    /// Create an authentication error.
    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create an invalid request error.
    pub fn request_invalid(msg: impl Into<String>) -> Self {
        Self::RequestInvalid(msg.into())
    }

    /// Create a downstream job failure.
    pub fn job(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Job {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Whether the connection must be closed after reporting this error.
    ///
    /// Everything below the state machine (transport, framing, decoding) and
    /// every protocol violation is fatal, because the byte stream can no
    /// longer be trusted to resynchronize.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Io(_)
            | Self::Handshake(_)
            | Self::PackStream(_)
            | Self::ProtocolViolation(_)
            | Self::MessageTooLarge { .. }
            | Self::StateLookup { .. }
            | Self::Configuration(_)
            | Self::ConnectionClosed => true,
            Self::ResourceExhausted(_)
            | Self::Authentication(_)
            | Self::RequestInvalid(_)
            | Self::Job { .. } => false,
        }
    }

    /// Whether the client may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ResourceExhausted(_) => true,
            Self::Job { code, .. } => is_retryable_code(code),
            _ => false,
        }
    }

    /// Status code reported to the client.
    pub fn code(&self) -> &str {
        match self {
            Self::ProtocolViolation(_) | Self::RequestInvalid(_) => BoltErrorCode::REQUEST_INVALID,
            Self::PackStream(_) | Self::MessageTooLarge { .. } => BoltErrorCode::INVALID_FORMAT,
            Self::ResourceExhausted(_) => BoltErrorCode::RESOURCE_EXHAUSTED,
            Self::Authentication(_) => BoltErrorCode::AUTHENTICATION_FAILED,
            Self::Job { code, .. } => code.as_str(),
            Self::Io(_)
            | Self::Handshake(_)
            | Self::StateLookup { .. }
            | Self::Configuration(_)
            | Self::ConnectionClosed => BoltErrorCode::GENERAL_ERROR,
        }
    }

    /// Convert error to a FAILURE message.
    pub fn to_failure(&self) -> FailureMessage {
        let message = match self {
            Self::Job { message, .. } => message.clone(),
            other => other.to_string(),
        };
        FailureMessage::new(self.code(), &message)
    }
}

/// Whether a status code marks a condition that may clear on its own.
pub fn is_retryable_code(code: &str) -> bool {
    code.starts_with("Neo.TransientError")
}

/// Handshake-specific errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// Invalid magic number received
    #[error("Invalid magic number: expected {expected:02X?}, received {received:02X?}")]
    InvalidMagic {
        /// Bolt magic preamble
        expected: [u8; 4],
        /// Bytes the peer actually sent
        received: [u8; 4],
    },

    /// No compatible protocol version found
    #[error("No compatible protocol version found")]
    NoCompatibleVersion,

    /// Invalid handshake data (wrong size, etc.)
    #[error("Invalid handshake data: {0}")]
    InvalidData(String),

    /// Connection closed during handshake
    #[error("Connection closed during handshake")]
    ConnectionClosed,
}

/// Bolt status codes
///
/// Sent to the client as the `code` of a FAILURE message.
pub struct BoltErrorCode;

impl BoltErrorCode {
    // Client errors
    pub const AUTHENTICATION_FAILED: &'static str = "Neo.ClientError.Security.AuthenticationFailed";
    pub const REQUEST_INVALID: &'static str = "Neo.ClientError.Request.Invalid";
    pub const INVALID_FORMAT: &'static str = "Neo.ClientError.Request.InvalidFormat";
    pub const SYNTAX_ERROR: &'static str = "Neo.ClientError.Statement.SyntaxError";

    // Database errors
    pub const GENERAL_ERROR: &'static str = "Neo.DatabaseError.General.UnknownError";

    // Transient errors (retry may succeed)
    pub const RESOURCE_EXHAUSTED: &'static str = "Neo.TransientError.Request.ResourceExhaustion";
    pub const TRANSACTION_TERMINATED: &'static str =
        "Neo.TransientError.Transaction.Terminated";
    pub const DEADLOCK_DETECTED: &'static str = "Neo.TransientError.Transaction.DeadlockDetected";
}
