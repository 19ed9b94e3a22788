//! Bolt protocol handshake implementation.
//!
//! The Bolt handshake consists of:
//! 1. Client sends the 4-byte magic preamble (0x6060B017)
//! 2. Client sends 4 x 4-byte version proposals, most preferred first
//! 3. Server responds with the 4-byte agreed version, or zeros if none matched

mod negotiation;
mod version;

pub use negotiation::{build_client_handshake, Handshake, HandshakeResult};
pub use version::ProtocolVersion;

pub use super::error::HandshakeError;

/// Bolt protocol magic number: 0x6060B017
pub const BOLT_MAGIC: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

/// Number of version slots in the client preamble.
pub const MAX_PROPOSALS: usize = 4;

/// Size of the complete client preamble (magic + proposals)
pub const HANDSHAKE_SIZE: usize = 4 + MAX_PROPOSALS * 4;

/// Size of the server reply
pub const HANDSHAKE_RESPONSE_SIZE: usize = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_sizes() {
        assert_eq!(HANDSHAKE_SIZE, 20);
        assert_eq!(HANDSHAKE_RESPONSE_SIZE, ProtocolVersion::INVALID.to_bytes().len());
    }
}
