//! Bolt protocol version definitions.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A Bolt protocol version, optionally describing a range of minor versions.
///
/// The 32-bit form packs `major` into the lowest byte, `minor` into the next,
/// and `range` into the third; the top byte is reserved and must be zero. On
/// the wire that integer travels big-endian, so a proposal for 5.4 with a
/// range of 2 arrives as `00 02 04 05`.
///
/// A non-zero `range` stands for every minor version in
/// `[minor - range, minor]` of the same major. Equality, hashing and ordering
/// only look at `(major, minor)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProtocolVersion {
    major: u8,
    minor: u8,
    range: u8,
}

impl ProtocolVersion {
    /// The all-zero reply that tells a client no proposal was acceptable.
    pub const INVALID: ProtocolVersion = ProtocolVersion::new(0, 0);

    /// Bolt 4.3 - ROUTE message
    pub const V4_3: ProtocolVersion = ProtocolVersion::new(4, 3);
    /// Bolt 4.4 - impersonation
    pub const V4_4: ProtocolVersion = ProtocolVersion::new(4, 4);
    /// Bolt 5.0
    pub const V5_0: ProtocolVersion = ProtocolVersion::new(5, 0);
    /// Bolt 5.1 - LOGON/LOGOFF split out of HELLO
    pub const V5_1: ProtocolVersion = ProtocolVersion::new(5, 1);
    /// Bolt 5.2 - notification filters
    pub const V5_2: ProtocolVersion = ProtocolVersion::new(5, 2);
    /// Bolt 5.3 - bolt_agent in HELLO
    pub const V5_3: ProtocolVersion = ProtocolVersion::new(5, 3);
    /// Bolt 5.4 - TELEMETRY message
    pub const V5_4: ProtocolVersion = ProtocolVersion::new(5, 4);

    /// Every version this server knows how to speak, newest first.
    pub const ALL: [ProtocolVersion; 7] = [
        Self::V5_4,
        Self::V5_3,
        Self::V5_2,
        Self::V5_1,
        Self::V5_0,
        Self::V4_4,
        Self::V4_3,
    ];

    /// Create an exact version.
    pub const fn new(major: u8, minor: u8) -> Self {
        Self {
            major,
            minor,
            range: 0,
        }
    }

    /// Create a version range covering `[minor - range, minor]`.
    ///
    /// Returns `None` when `range > minor`.
    pub const fn with_range(major: u8, minor: u8, range: u8) -> Option<Self> {
        if range > minor {
            return None;
        }
        Some(Self {
            major,
            minor,
            range,
        })
    }

    /// Decode the packed integer form.
    ///
    /// Returns `None` when the reserved byte is set or the range is wider
    /// than the minor version. The all-zero word decodes to
    /// [`ProtocolVersion::INVALID`]; negotiation skips it.
    pub fn from_u32(value: u32) -> Option<Self> {
        let [major, minor, range, reserved] = value.to_le_bytes();
        if reserved != 0 {
            return None;
        }
        Self::with_range(major, minor, range)
    }

    /// Packed integer form.
    pub const fn encode(self) -> u32 {
        (self.major as u32) | (self.minor as u32) << 8 | (self.range as u32) << 16
    }

    /// Wire bytes (the packed integer, big-endian).
    pub const fn to_bytes(self) -> [u8; 4] {
        self.encode().to_be_bytes()
    }

    /// Parse wire bytes.
    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        Self::from_u32(u32::from_be_bytes(bytes))
    }

    /// Major version number.
    pub const fn major(self) -> u8 {
        self.major
    }

    /// Minor version number (the top of the range).
    pub const fn minor(self) -> u8 {
        self.minor
    }

    /// Number of older minor versions also accepted.
    pub const fn range(self) -> u8 {
        self.range
    }

    /// Whether `other` falls within this version (or range of versions).
    pub fn matches(&self, other: &ProtocolVersion) -> bool {
        if self.range == 0 {
            return self == other;
        }
        self.major == other.major
            && other.minor <= self.minor
            && other.minor >= self.minor - self.range
    }

    /// The exact version, with any range stripped.
    pub const fn exact(self) -> Self {
        Self::new(self.major, self.minor)
    }
}

impl PartialEq for ProtocolVersion {
    fn eq(&self, other: &Self) -> bool {
        self.major == other.major && self.minor == other.minor
    }
}

impl Eq for ProtocolVersion {}

impl Hash for ProtocolVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.major, self.minor).hash(state);
    }
}

impl PartialOrd for ProtocolVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ProtocolVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor).cmp(&(other.major, other.minor))
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ProtocolVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = s
            .trim()
            .split_once('.')
            .ok_or_else(|| format!("expected 'major.minor', got '{}'", s))?;
        let major = major.parse::<u8>().map_err(|e| format!("bad major in '{}': {}", s, e))?;
        let minor = minor.parse::<u8>().map_err(|e| format!("bad minor in '{}': {}", s, e))?;
        Ok(Self::new(major, minor))
    }
}

impl TryFrom<String> for ProtocolVersion {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ProtocolVersion> for String {
    fn from(version: ProtocolVersion) -> Self {
        version.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn version_range() -> impl Strategy<Value = (u8, u8, u8)> {
        (any::<u8>(), any::<u8>()).prop_flat_map(|(major, minor)| {
            (Just(major), Just(minor), 0..=minor)
        })
    }

    proptest! {
        #[test]
        fn prop_encode_roundtrip((major, minor, range) in version_range()) {
            let v = ProtocolVersion::with_range(major, minor, range).unwrap();
            let decoded = ProtocolVersion::from_u32(v.encode()).unwrap();
            prop_assert_eq!(decoded, v);
            prop_assert_eq!(decoded.range(), range);
            prop_assert_eq!(ProtocolVersion::from_bytes(v.to_bytes()).unwrap().range(), range);
        }

        #[test]
        fn prop_matches_definition(
            (major, minor, range) in version_range(),
            other_major in any::<u8>(),
            other_minor in any::<u8>(),
        ) {
            let v = ProtocolVersion::with_range(major, minor, range).unwrap();
            let other = ProtocolVersion::new(other_major, other_minor);
            let expected = other_major == major
                && minor - range <= other_minor
                && other_minor <= minor;
            prop_assert_eq!(v.matches(&other), expected);
        }

        #[test]
        fn prop_exact_matches_itself(major in any::<u8>(), minor in any::<u8>()) {
            let v = ProtocolVersion::new(major, minor);
            prop_assert!(v.matches(&v));
        }
    }

    #[test]
    fn test_packed_layout() {
        let v = ProtocolVersion::with_range(5, 4, 2).unwrap();
        assert_eq!(v.encode(), 0x0002_0405);
        assert_eq!(v.to_bytes(), [0x00, 0x02, 0x04, 0x05]);
        assert_eq!(ProtocolVersion::V4_3.to_bytes(), [0x00, 0x00, 0x03, 0x04]);
        assert_eq!(ProtocolVersion::INVALID.to_bytes(), [0, 0, 0, 0]);
    }

    #[test]
    fn test_from_u32_rejections() {
        // reserved byte set
        assert_eq!(ProtocolVersion::from_u32(0x0100_0005), None);
        // range 3 on minor 2
        assert_eq!(ProtocolVersion::from_u32(0x0003_0205), None);
        assert_eq!(ProtocolVersion::from_u32(0x0000_0104), Some(ProtocolVersion::new(4, 1)));
    }

    #[test]
    fn test_zero_word_is_invalid() {
        assert_eq!(ProtocolVersion::from_u32(0), Some(ProtocolVersion::INVALID));
        assert_eq!(
            ProtocolVersion::from_u32(ProtocolVersion::new(0, 0).encode()),
            Some(ProtocolVersion::new(0, 0))
        );
        assert_eq!(ProtocolVersion::from_bytes([0, 0, 0, 0]), Some(ProtocolVersion::INVALID));
    }

    #[test]
    fn test_with_range_bounds() {
        assert!(ProtocolVersion::with_range(4, 2, 2).is_some());
        assert!(ProtocolVersion::with_range(4, 2, 3).is_none());
    }

    #[test]
    fn test_range_matching() {
        let proposal = ProtocolVersion::with_range(5, 4, 3).unwrap();
        assert!(proposal.matches(&ProtocolVersion::V5_4));
        assert!(proposal.matches(&ProtocolVersion::V5_1));
        assert!(!proposal.matches(&ProtocolVersion::V5_0));
        assert!(!proposal.matches(&ProtocolVersion::V4_4));
    }

    #[test]
    fn test_equality_ignores_range() {
        let ranged = ProtocolVersion::with_range(4, 4, 1).unwrap();
        assert_eq!(ranged, ProtocolVersion::V4_4);
        assert_eq!(ranged.exact().range(), 0);
    }

    #[test]
    fn test_ordering_and_display() {
        assert!(ProtocolVersion::V5_0 > ProtocolVersion::V4_4);
        assert!(ProtocolVersion::V5_4 > ProtocolVersion::V5_1);
        assert_eq!(ProtocolVersion::V4_3.to_string(), "4.3");
        let mut sorted = ProtocolVersion::ALL.to_vec();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(sorted, ProtocolVersion::ALL.to_vec());
    }

    #[test]
    fn test_parse() {
        assert_eq!("5.1".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::V5_1);
        assert!("5".parse::<ProtocolVersion>().is_err());
        assert!("5.x".parse::<ProtocolVersion>().is_err());
    }
}
