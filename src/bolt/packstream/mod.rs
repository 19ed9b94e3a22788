//! PackStream serialization format.
//!
//! PackStream is the binary format Bolt uses for every message. Values are
//! introduced by a marker byte (see [`marker`]); messages themselves are
//! tagged structures whose fields are ordinary PackStream values.
//!
//! # Supported Types
//!
//! - **Null**, **Boolean**, **Integer** (tiny, 8, 16, 32 and 64 bit), **Float** (64 bit)
//! - **String** (UTF-8) and **Bytes**, each with 8, 16 or 32-bit size prefixes
//! - **List** and **Map** (string keys only)
//! - **Structure**: a tag byte plus up to 65535 fields
//!
//! The decoder never trusts a size prefix further than the bytes that are
//! actually present, and it caps nesting depth.

pub mod decoder;
pub mod encoder;
pub mod marker;
pub mod types;

pub use decoder::{decode, PackStreamDecoder, DEFAULT_MAX_DEPTH};
pub use encoder::{encode, encode_structure, PackStreamEncoder};
pub use types::{PackStreamStructure, PackStreamValue, ValueMap};

use thiserror::Error;

/// PackStream errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PackStreamError {
    /// Unexpected end of input
    #[error("Unexpected end of PackStream data")]
    UnexpectedEof,
    /// Marker byte with no meaning in PackStream
    #[error("Unknown PackStream marker: 0x{0:02X}")]
    UnknownMarker(u8),
    /// String payload was not UTF-8
    #[error("Invalid UTF-8 in string: {0}")]
    InvalidUtf8(String),
    /// Map key that is not a string
    #[error("Map keys must be strings")]
    InvalidMapKey,
    /// Value too large for any size prefix
    #[error("{0} too large: {1} items")]
    ValueTooLarge(&'static str, usize),
    /// Structure with the wrong shape for its tag
    #[error("Invalid structure: {0}")]
    InvalidStructure(String),
    /// Lists, maps and structures nested past the decoder's limit
    #[error("Values nested deeper than {0} levels")]
    NestingTooDeep(usize),
}

impl PackStreamError {
    /// Shorthand for [`PackStreamError::InvalidStructure`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        PackStreamError::InvalidStructure(msg.into())
    }
}
