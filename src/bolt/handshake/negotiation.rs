//! Bolt handshake negotiation.

use super::{HandshakeError, ProtocolVersion, BOLT_MAGIC, HANDSHAKE_SIZE, MAX_PROPOSALS};

/// Result of a successful handshake.
#[derive(Debug, Clone)]
pub struct HandshakeResult {
    /// Negotiated protocol version (always exact, never a range)
    pub version: ProtocolVersion,
    /// Raw client proposals, kept for logging
    pub proposals: [u32; MAX_PROPOSALS],
}

/// Server side of the Bolt handshake.
///
/// Client proposals are walked in the client's order of preference. The first
/// proposal that any supported version satisfies wins, and within a ranged
/// proposal the highest satisfying server version is taken.
#[derive(Debug, Clone)]
pub struct Handshake {
    /// Versions this server speaks, newest first
    supported: Vec<ProtocolVersion>,
}

impl Handshake {
    /// Handshake accepting every version in [`ProtocolVersion::ALL`].
    pub fn new() -> Self {
        Self::with_versions(ProtocolVersion::ALL.to_vec())
    }

    /// Handshake accepting only `versions`.
    pub fn with_versions(mut versions: Vec<ProtocolVersion>) -> Self {
        versions.iter_mut().for_each(|v| *v = v.exact());
        versions.sort_by(|a, b| b.cmp(a));
        versions.dedup();
        Self {
            supported: versions,
        }
    }

    /// Versions this handshake accepts, newest first.
    pub fn supported(&self) -> &[ProtocolVersion] {
        &self.supported
    }

    /// Validate the 20-byte preamble and pick a version.
    pub fn process(&self, data: &[u8]) -> Result<HandshakeResult, HandshakeError> {
        if data.len() < HANDSHAKE_SIZE {
            return Err(HandshakeError::InvalidData(format!(
                "Expected {} bytes, got {}",
                HANDSHAKE_SIZE,
                data.len()
            )));
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&data[0..4]);
        if magic != BOLT_MAGIC {
            return Err(HandshakeError::InvalidMagic {
                expected: BOLT_MAGIC,
                received: magic,
            });
        }

        let proposals = parse_proposals(&data[4..HANDSHAKE_SIZE]);
        let version = self.select(&proposals)?;

        Ok(HandshakeResult { version, proposals })
    }

    /// Pick the version for a set of raw proposals.
    pub fn select(&self, proposals: &[u32]) -> Result<ProtocolVersion, HandshakeError> {
        // Empty slots and malformed proposals (range > minor, reserved byte set)
        // simply never match.
        proposals
            .iter()
            .filter_map(|&raw| ProtocolVersion::from_u32(raw))
            .filter(|proposal| *proposal != ProtocolVersion::INVALID)
            .find_map(|proposal| {
                self.supported
                    .iter()
                    .find(|supported| proposal.matches(supported))
                    .copied()
            })
            .ok_or(HandshakeError::NoCompatibleVersion)
    }

    /// The 4 reply bytes: the negotiated version, or all zeros on failure.
    pub fn generate_response(result: &Result<HandshakeResult, HandshakeError>) -> [u8; 4] {
        match result {
            Ok(hr) => hr.version.to_bytes(),
            Err(_) => ProtocolVersion::INVALID.to_bytes(),
        }
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_proposals(data: &[u8]) -> [u32; MAX_PROPOSALS] {
    let mut proposals = [0u32; MAX_PROPOSALS];
    for (slot, chunk) in proposals.iter_mut().zip(data.chunks_exact(4)) {
        *slot = u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    proposals
}

/// Build a client handshake preamble.
///
/// Used by tests and by anything that needs to act as a Bolt client.
pub fn build_client_handshake(versions: &[ProtocolVersion]) -> [u8; HANDSHAKE_SIZE] {
    let mut data = [0u8; HANDSHAKE_SIZE];
    data[0..4].copy_from_slice(&BOLT_MAGIC);
    for (i, version) in versions.iter().take(MAX_PROPOSALS).enumerate() {
        let offset = 4 + i * 4;
        data[offset..offset + 4].copy_from_slice(&version.to_bytes());
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(versions: &[ProtocolVersion]) -> Handshake {
        Handshake::with_versions(versions.to_vec())
    }

    #[test]
    fn test_selects_first_client_preference() {
        let handshake = server(&[
            ProtocolVersion::V5_0,
            ProtocolVersion::V4_4,
            ProtocolVersion::V4_3,
        ]);
        let data = build_client_handshake(&[ProtocolVersion::V5_0, ProtocolVersion::V4_4]);

        let result = handshake.process(&data).unwrap();
        assert_eq!(result.version, ProtocolVersion::V5_0);
    }

    #[test]
    fn test_client_order_beats_server_order() {
        let handshake = server(&[ProtocolVersion::V5_0, ProtocolVersion::V4_3]);
        let data = build_client_handshake(&[ProtocolVersion::V4_3, ProtocolVersion::V5_0]);

        let result = handshake.process(&data).unwrap();
        assert_eq!(result.version, ProtocolVersion::V4_3);
    }

    #[test]
    fn test_falls_through_unsupported_proposals() {
        let handshake = server(&[ProtocolVersion::V4_4, ProtocolVersion::V4_3]);
        let data = build_client_handshake(&[ProtocolVersion::V5_0, ProtocolVersion::V4_4]);

        let result = handshake.process(&data).unwrap();
        assert_eq!(result.version, ProtocolVersion::V4_4);
    }

    #[test]
    fn test_range_picks_highest_supported() {
        let handshake = Handshake::new();
        let proposal = ProtocolVersion::with_range(5, 9, 8).unwrap();
        let data = build_client_handshake(&[proposal]);

        let result = handshake.process(&data).unwrap();
        assert_eq!(result.version, ProtocolVersion::V5_4);
        assert_eq!(result.version.range(), 0);
    }

    #[test]
    fn test_range_below_server_set() {
        let handshake = server(&[ProtocolVersion::V5_4, ProtocolVersion::V5_1]);
        let mut data = build_client_handshake(&[]);
        // 5.3 with range 2: accepts 5.1..=5.3
        data[4..8].copy_from_slice(&[0x00, 0x02, 0x03, 0x05]);

        let result = handshake.process(&data).unwrap();
        assert_eq!(result.version, ProtocolVersion::V5_1);
    }

    #[test]
    fn test_unknown_version_yields_invalid_reply() {
        let handshake = server(&[
            ProtocolVersion::V5_0,
            ProtocolVersion::V4_4,
            ProtocolVersion::V4_3,
        ]);
        let data = build_client_handshake(&[ProtocolVersion::new(9, 9)]);

        let result = handshake.process(&data);
        assert_eq!(result.as_ref().unwrap_err(), &HandshakeError::NoCompatibleVersion);
        assert_eq!(Handshake::generate_response(&result), [0, 0, 0, 0]);
    }

    #[test]
    fn test_invalid_magic() {
        let mut data = build_client_handshake(&[ProtocolVersion::V5_0]);
        data[0] = 0xFF;

        let err = Handshake::new().process(&data).unwrap_err();
        assert!(matches!(err, HandshakeError::InvalidMagic { .. }));
    }

    #[test]
    fn test_empty_proposals() {
        let data = build_client_handshake(&[]);
        let err = Handshake::new().process(&data).unwrap_err();
        assert_eq!(err, HandshakeError::NoCompatibleVersion);
    }

    #[test]
    fn test_zero_slot_is_skipped() {
        let handshake = Handshake::new();
        let version = handshake
            .select(&[0, ProtocolVersion::V4_4.encode(), 0, 0])
            .unwrap();
        assert_eq!(version, ProtocolVersion::V4_4);
        assert_eq!(
            handshake.select(&[0, 0, 0, 0]),
            Err(HandshakeError::NoCompatibleVersion)
        );
    }

    #[test]
    fn test_malformed_proposal_is_skipped() {
        let mut data = build_client_handshake(&[]);
        // range 5 on minor 1
        data[4..8].copy_from_slice(&[0x00, 0x05, 0x01, 0x05]);
        data[8..12].copy_from_slice(&ProtocolVersion::V4_4.to_bytes());

        let result = Handshake::new().process(&data).unwrap();
        assert_eq!(result.version, ProtocolVersion::V4_4);
    }

    #[test]
    fn test_too_short_data() {
        let err = Handshake::new().process(&BOLT_MAGIC).unwrap_err();
        assert!(matches!(err, HandshakeError::InvalidData(_)));
    }

    #[test]
    fn test_response_bytes() {
        let data = build_client_handshake(&[ProtocolVersion::V4_3]);
        let result = Handshake::new().process(&data);
        assert_eq!(Handshake::generate_response(&result), [0x00, 0x00, 0x03, 0x04]);
    }

    #[test]
    fn test_build_client_handshake_layout() {
        let data = build_client_handshake(&[ProtocolVersion::V5_0, ProtocolVersion::V4_4]);
        assert_eq!(&data[0..4], &BOLT_MAGIC);
        assert_eq!(&data[4..8], &[0x00, 0x00, 0x00, 0x05]);
        assert_eq!(&data[8..12], &[0x00, 0x00, 0x04, 0x04]);
        assert_eq!(&data[12..20], &[0u8; 8]);
    }

    #[test]
    fn test_result_keeps_raw_proposals() {
        let data = build_client_handshake(&[ProtocolVersion::V5_0, ProtocolVersion::V4_4]);
        let result = Handshake::new().process(&data).unwrap();
        assert_eq!(result.proposals[0], ProtocolVersion::V5_0.encode());
        assert_eq!(result.proposals[1], ProtocolVersion::V4_4.encode());
        assert_eq!(result.proposals[2..], [0, 0]);
    }

    #[test]
    fn test_with_versions_normalizes() {
        let ranged = ProtocolVersion::with_range(4, 4, 1).unwrap();
        let handshake = server(&[ProtocolVersion::V4_3, ranged, ProtocolVersion::V4_3]);
        assert_eq!(
            handshake.supported(),
            &[ProtocolVersion::V4_4, ProtocolVersion::V4_3]
        );
        assert!(handshake.supported().iter().all(|v| v.range() == 0));
    }
}
