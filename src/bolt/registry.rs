//! Per-version struct registries.
//!
//! A [`StructRegistry`] maps request tags to decoders and response kinds to
//! encoders. Registries are composed once per protocol version by taking the
//! previous version's registry and applying that version's deltas, then frozen
//! and shared read-only by every connection that negotiated the version.

use std::collections::HashMap;
use std::fmt;

use bytes::BufMut;

use super::error::BoltError;
use super::handshake::ProtocolVersion;
use super::message::{
    tag, BeginMessage, BoltRequest, BoltResponse, HelloMessage, LogonMessage, RequestKind,
    ResponseKind, ResultRequest, RouteMessage, RunMessage, TelemetryMessage,
};
use super::packstream::{PackStreamDecoder, PackStreamEncoder, PackStreamError, PackStreamValue};

/// Builds a request from the owned fields of its structure.
pub type DecodeFn = fn(Vec<PackStreamValue>) -> Result<BoltRequest, PackStreamError>;

/// Produces the structure fields of a response.
pub type EncodeFn = fn(&BoltResponse) -> Vec<PackStreamValue>;

/// Decoder entry for one request tag.
#[derive(Clone, Copy)]
pub struct StructDecoder {
    /// Wire tag
    pub tag: u8,
    /// Request kind produced
    pub kind: RequestKind,
    /// Exact number of fields the structure must carry
    pub field_count: usize,
    decode: DecodeFn,
}

impl StructDecoder {
    /// Create a decoder entry.
    pub fn new(kind: RequestKind, field_count: usize, decode: DecodeFn) -> Self {
        Self {
            tag: kind.tag(),
            kind,
            field_count,
            decode,
        }
    }
}

impl fmt::Debug for StructDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X}, {} fields)", self.kind, self.tag, self.field_count)
    }
}

#[derive(Clone, Copy)]
struct StructEncoder {
    tag: u8,
    encode: EncodeFn,
}

/// Tag-keyed decoders and kind-keyed encoders for one protocol version.
#[derive(Clone)]
pub struct StructRegistry {
    decoders: HashMap<u8, StructDecoder>,
    encoders: HashMap<ResponseKind, StructEncoder>,
}

impl StructRegistry {
    /// Start an empty registry.
    pub fn builder() -> StructRegistryBuilder {
        StructRegistryBuilder {
            decoders: HashMap::new(),
            encoders: HashMap::new(),
        }
    }

    /// Continue building from this registry.
    pub fn to_builder(&self) -> StructRegistryBuilder {
        StructRegistryBuilder {
            decoders: self.decoders.clone(),
            encoders: self.encoders.clone(),
        }
    }

    /// The registry for `version`, or `None` if the version is unknown.
    pub fn for_version(version: ProtocolVersion) -> Option<Self> {
        builder_for(version).map(StructRegistryBuilder::build)
    }

    /// Decoder registered for `tag`.
    pub fn decoder(&self, tag: u8) -> Option<&StructDecoder> {
        self.decoders.get(&tag)
    }

    /// Whether `kind` can be decoded under this registry.
    pub fn accepts(&self, kind: RequestKind) -> bool {
        self.decoders.get(&kind.tag()).map_or(false, |d| d.kind == kind)
    }

    /// Decode one complete message.
    ///
    /// The structure header is read first and its tag looked up; the field
    /// count is checked before any field is decoded, and the message must
    /// consume every byte.
    pub fn decode(&self, bytes: &[u8], max_depth: usize) -> Result<BoltRequest, BoltError> {
        let mut decoder = PackStreamDecoder::with_max_depth(bytes, max_depth);
        let (count, tag) = decoder.read_struct_header()?;

        let entry = self.decoders.get(&tag).ok_or_else(|| {
            BoltError::protocol_violation(format!("Unexpected structure 0x{:02X}", tag))
        })?;
        if count != entry.field_count {
            return Err(PackStreamError::invalid(format!(
                "{} expects {} fields, got {}",
                entry.kind, entry.field_count, count
            ))
            .into());
        }

        let fields = decoder.decode_fields(count)?;
        if !decoder.is_empty() {
            return Err(BoltError::protocol_violation(format!(
                "{} trailing bytes after {}",
                decoder.remaining(),
                entry.kind
            )));
        }

        Ok((entry.decode)(fields)?)
    }

    /// Encode a response into `dst`.
    pub fn encode<B: BufMut>(&self, response: &BoltResponse, dst: &mut B) -> Result<(), BoltError> {
        let encoder = self.encoders.get(&response.kind()).ok_or_else(|| {
            BoltError::protocol_violation(format!("No encoder registered for {}", response.name()))
        })?;
        let fields = (encoder.encode)(response);
        PackStreamEncoder::new(dst).encode_structure(encoder.tag, &fields)?;
        Ok(())
    }

    /// Registered request kinds, sorted by tag.
    pub fn request_kinds(&self) -> Vec<RequestKind> {
        let mut entries: Vec<&StructDecoder> = self.decoders.values().collect();
        entries.sort_by_key(|d| d.tag);
        entries.into_iter().map(|d| d.kind).collect()
    }
}

impl fmt::Debug for StructRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructRegistry")
            .field("requests", &self.request_kinds())
            .field("responses", &self.encoders.len())
            .finish()
    }
}

/// Mutable form of a [`StructRegistry`], used only while composing.
pub struct StructRegistryBuilder {
    decoders: HashMap<u8, StructDecoder>,
    encoders: HashMap<ResponseKind, StructEncoder>,
}

impl StructRegistryBuilder {
    /// Add or replace the decoder for a tag.
    pub fn register(mut self, decoder: StructDecoder) -> Self {
        self.decoders.insert(decoder.tag, decoder);
        self
    }

    /// Remove the decoder for a tag.
    pub fn unregister(mut self, tag: u8) -> Self {
        self.decoders.remove(&tag);
        self
    }

    /// Add or replace the encoder for a response kind.
    pub fn register_encoder(mut self, kind: ResponseKind, tag: u8, encode: EncodeFn) -> Self {
        self.encoders.insert(kind, StructEncoder { tag, encode });
        self
    }

    /// Freeze.
    pub fn build(self) -> StructRegistry {
        StructRegistry {
            decoders: self.decoders,
            encoders: self.encoders,
        }
    }
}

fn hello_with_auth() -> StructDecoder {
    StructDecoder::new(RequestKind::Hello, 1, |f| {
        HelloMessage::from_fields_with_auth(f).map(BoltRequest::Hello)
    })
}

fn hello() -> StructDecoder {
    StructDecoder::new(RequestKind::Hello, 1, |f| {
        HelloMessage::from_fields(f).map(BoltRequest::Hello)
    })
}

fn route_v43() -> StructDecoder {
    StructDecoder::new(RequestKind::Route, 3, |f| {
        RouteMessage::from_fields_v43(f).map(BoltRequest::Route)
    })
}

fn route_v44() -> StructDecoder {
    StructDecoder::new(RequestKind::Route, 3, |f| {
        RouteMessage::from_fields(f).map(BoltRequest::Route)
    })
}

fn base_v43() -> StructRegistryBuilder {
    StructRegistry::builder()
        .register(hello_with_auth())
        .register(StructDecoder::new(RequestKind::Run, 3, |f| {
            RunMessage::from_fields(f).map(BoltRequest::Run)
        }))
        .register(StructDecoder::new(RequestKind::Begin, 1, |f| {
            BeginMessage::from_fields(f).map(BoltRequest::Begin)
        }))
        .register(StructDecoder::new(RequestKind::Commit, 0, |_| Ok(BoltRequest::Commit)))
        .register(StructDecoder::new(RequestKind::Rollback, 0, |_| Ok(BoltRequest::Rollback)))
        .register(StructDecoder::new(RequestKind::Discard, 1, |f| {
            ResultRequest::discard_from_fields(f).map(BoltRequest::Discard)
        }))
        .register(StructDecoder::new(RequestKind::Pull, 1, |f| {
            ResultRequest::pull_from_fields(f).map(BoltRequest::Pull)
        }))
        .register(StructDecoder::new(RequestKind::Reset, 0, |_| Ok(BoltRequest::Reset)))
        .register(StructDecoder::new(RequestKind::Goodbye, 0, |_| Ok(BoltRequest::Goodbye)))
        .register(route_v43())
        .register_encoder(ResponseKind::Success, tag::SUCCESS, BoltResponse::to_fields)
        .register_encoder(ResponseKind::Record, tag::RECORD, BoltResponse::to_fields)
        .register_encoder(ResponseKind::Ignored, tag::IGNORED, BoltResponse::to_fields)
        .register_encoder(ResponseKind::Failure, tag::FAILURE, BoltResponse::to_fields)
}

fn builder_for(version: ProtocolVersion) -> Option<StructRegistryBuilder> {
    let builder = match (version.major(), version.minor()) {
        (4, 3) => base_v43(),
        (4, 4) => builder_for(ProtocolVersion::V4_3)?
            .unregister(tag::ROUTE)
            .register(route_v44()),
        (5, 0) => builder_for(ProtocolVersion::V4_4)?,
        (5, 1) => builder_for(ProtocolVersion::V5_0)?
            .unregister(tag::HELLO)
            .register(hello())
            .register(StructDecoder::new(RequestKind::Logon, 1, |f| {
                LogonMessage::from_fields(f).map(BoltRequest::Logon)
            }))
            .register(StructDecoder::new(RequestKind::Logoff, 0, |_| Ok(BoltRequest::Logoff))),
        (5, 2) => builder_for(ProtocolVersion::V5_1)?,
        (5, 3) => builder_for(ProtocolVersion::V5_2)?,
        (5, 4) => builder_for(ProtocolVersion::V5_3)?.register(StructDecoder::new(
            RequestKind::Telemetry,
            1,
            |f| TelemetryMessage::from_fields(f).map(BoltRequest::Telemetry),
        )),
        _ => return None,
    };
    Some(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::message::{AuthToken, SuccessMessage};
    use crate::bolt::packstream::{encode_structure, PackStreamStructure, ValueMap, DEFAULT_MAX_DEPTH};

    fn registry(version: ProtocolVersion) -> StructRegistry {
        StructRegistry::for_version(version).unwrap()
    }

    fn wire(request: &BoltRequest) -> Vec<u8> {
        encode_structure(&request.to_structure()).unwrap()
    }

    #[test]
    fn test_every_server_version_has_registry() {
        for version in ProtocolVersion::ALL {
            assert!(StructRegistry::for_version(version).is_some(), "{}", version);
        }
        assert!(StructRegistry::for_version(ProtocolVersion::new(4, 2)).is_none());
        assert!(StructRegistry::for_version(ProtocolVersion::new(6, 0)).is_none());
    }

    #[test]
    fn test_version_deltas() {
        let v43 = registry(ProtocolVersion::V4_3);
        assert!(!v43.accepts(RequestKind::Logon));
        assert!(!v43.accepts(RequestKind::Telemetry));
        assert!(v43.accepts(RequestKind::Route));

        let v51 = registry(ProtocolVersion::V5_1);
        assert!(v51.accepts(RequestKind::Logon));
        assert!(v51.accepts(RequestKind::Logoff));
        assert!(!v51.accepts(RequestKind::Telemetry));

        let v54 = registry(ProtocolVersion::V5_4);
        assert!(v54.accepts(RequestKind::Telemetry));
        assert_eq!(v54.request_kinds().len(), 13);
        assert_eq!(v43.request_kinds().len(), 10);
    }

    #[test]
    fn test_hello_auth_depends_on_version() {
        let hello = BoltRequest::Hello(
            HelloMessage::new("driver/1").with_auth(AuthToken::basic("neo", "pw")),
        );
        let bytes = wire(&hello);

        match registry(ProtocolVersion::V5_0).decode(&bytes, DEFAULT_MAX_DEPTH).unwrap() {
            BoltRequest::Hello(h) => assert_eq!(h.auth.unwrap().principal.as_deref(), Some("neo")),
            other => panic!("unexpected {:?}", other),
        }
        match registry(ProtocolVersion::V5_1).decode(&bytes, DEFAULT_MAX_DEPTH).unwrap() {
            BoltRequest::Hello(h) => assert!(h.auth.is_none()),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_route_shape_depends_on_version() {
        let route = RouteMessage::new().with_database("movies").with_imp_user("bob");

        let v43_bytes = encode_structure(&route.to_structure_v43()).unwrap();
        match registry(ProtocolVersion::V4_3).decode(&v43_bytes, DEFAULT_MAX_DEPTH).unwrap() {
            BoltRequest::Route(r) => {
                assert_eq!(r.database.as_deref(), Some("movies"));
                assert_eq!(r.imp_user, None);
            }
            other => panic!("unexpected {:?}", other),
        }

        let v44_bytes = wire(&BoltRequest::Route(route.clone()));
        let decoded = registry(ProtocolVersion::V4_4).decode(&v44_bytes, DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(decoded, BoltRequest::Route(route));

        // a 4.4 ROUTE on a 4.3 connection has a map where the db string belongs
        assert!(registry(ProtocolVersion::V4_3).decode(&v44_bytes, DEFAULT_MAX_DEPTH).is_err());
    }

    #[test]
    fn test_run_decode_equals_original() {
        let mut params = ValueMap::new();
        params.insert("x".to_string(), 1i64.into());
        let run = BoltRequest::Run(RunMessage::new("RETURN $x").with_parameters(params));
        let decoded = registry(ProtocolVersion::V5_4).decode(&wire(&run), DEFAULT_MAX_DEPTH).unwrap();
        assert_eq!(decoded, run);
    }

    #[test]
    fn test_unknown_tag_is_protocol_violation() {
        let bytes = encode_structure(&PackStreamStructure::new(0x55, vec![])).unwrap();
        let err = registry(ProtocolVersion::V5_0).decode(&bytes, DEFAULT_MAX_DEPTH).unwrap_err();
        assert!(matches!(err, BoltError::ProtocolViolation(_)));
        assert!(err.to_string().contains("Unexpected structure 0x55"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_telemetry_unknown_before_5_4() {
        let bytes = encode_structure(&PackStreamStructure::new(
            tag::TELEMETRY,
            vec![PackStreamValue::Integer(0)],
        ))
        .unwrap();
        assert!(registry(ProtocolVersion::V5_3).decode(&bytes, DEFAULT_MAX_DEPTH).is_err());
        assert!(registry(ProtocolVersion::V5_4).decode(&bytes, DEFAULT_MAX_DEPTH).is_ok());
    }

    #[test]
    fn test_field_count_checked() {
        let bytes = encode_structure(&PackStreamStructure::new(
            tag::RUN,
            vec!["RETURN 1".into(), ValueMap::new().into()],
        ))
        .unwrap();
        let err = registry(ProtocolVersion::V5_0).decode(&bytes, DEFAULT_MAX_DEPTH).unwrap_err();
        assert!(err.to_string().contains("RUN expects 3 fields, got 2"));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = wire(&BoltRequest::Reset);
        bytes.push(0xC0);
        let err = registry(ProtocolVersion::V5_0).decode(&bytes, DEFAULT_MAX_DEPTH).unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }

    #[test]
    fn test_encode_response() {
        let registry = registry(ProtocolVersion::V5_0);
        let response = BoltResponse::Success(SuccessMessage::new());
        let mut buf = Vec::new();
        registry.encode(&response, &mut buf).unwrap();
        assert_eq!(buf, vec![0xB1, tag::SUCCESS, 0xA0]);

        let mut buf = Vec::new();
        registry.encode(&BoltResponse::Ignored, &mut buf).unwrap();
        assert_eq!(buf, vec![0xB0, tag::IGNORED]);
    }

    #[test]
    fn test_missing_encoder() {
        let bare = StructRegistry::builder().build();
        let mut buf = Vec::new();
        assert!(bare.encode(&BoltResponse::Ignored, &mut buf).is_err());
    }

    #[test]
    fn test_builder_register_unregister() {
        let registry = registry(ProtocolVersion::V5_0)
            .to_builder()
            .unregister(tag::ROUTE)
            .build();
        assert!(!registry.accepts(RequestKind::Route));
        assert!(registry.accepts(RequestKind::Run));
        assert_eq!(format!("{:?}", registry.decoder(tag::RUN).unwrap()), "RUN(0x10, 3 fields)");
    }
}
