//! Per-version protocol bindings.
//!
//! Everything that differs between Bolt versions is decided here, once, at
//! process start: the struct registry, the flattened state table and a small
//! feature table. Negotiation then hands each connection an `Arc` to the
//! binding of its version; nothing in a binding is mutated afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use crate::bolt::handshake::{Handshake, HandshakeResult};
use crate::bolt::registry::StructRegistry;
use crate::bolt::{BoltError, BoltResult, HandshakeError, ProtocolVersion};

use super::fsm::{versions, StateTable};

/// How a version treats `imp_user`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impersonation {
    /// The field is not read
    Unsupported,
    /// Re-validated on every RUN, BEGIN and ROUTE that carries it
    PerRequest,
}

/// Behaviour switches that vary by version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolFeatures {
    /// Impersonation rules
    pub impersonation: Impersonation,
    /// Whether TELEMETRY exists (5.4+)
    pub telemetry: bool,
}

impl ProtocolFeatures {
    /// Feature table for `version`.
    pub fn for_version(version: ProtocolVersion) -> Option<Self> {
        let (impersonation, telemetry) = match (version.major(), version.minor()) {
            (4, 3) => (Impersonation::Unsupported, false),
            (4, 4) | (5, 0) | (5, 1) | (5, 2) | (5, 3) => (Impersonation::PerRequest, false),
            (5, 4) => (Impersonation::PerRequest, true),
            _ => return None,
        };
        Some(Self {
            impersonation,
            telemetry,
        })
    }
}

/// Everything a connection needs from its negotiated version.
#[derive(Debug)]
pub struct ProtocolBinding {
    version: ProtocolVersion,
    registry: Arc<StructRegistry>,
    states: Arc<StateTable>,
    features: ProtocolFeatures,
}

impl ProtocolBinding {
    /// Build the binding for `version`, or `None` if it is not spoken.
    pub fn for_version(version: ProtocolVersion) -> Option<Self> {
        let version = version.exact();
        Some(Self {
            version,
            registry: Arc::new(StructRegistry::for_version(version)?),
            states: Arc::new(versions::state_table(version)?),
            features: ProtocolFeatures::for_version(version)?,
        })
    }

    /// Negotiated version.
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Struct registry.
    pub fn registry(&self) -> &Arc<StructRegistry> {
        &self.registry
    }

    /// Flattened states.
    pub fn states(&self) -> &Arc<StateTable> {
        &self.states
    }

    /// Feature table.
    pub fn features(&self) -> ProtocolFeatures {
        self.features
    }
}

/// The bindings a server offers, keyed by version.
#[derive(Debug)]
pub struct ProtocolTable {
    handshake: Handshake,
    bindings: HashMap<ProtocolVersion, Arc<ProtocolBinding>>,
}

impl ProtocolTable {
    /// Build bindings for `versions`.
    pub fn new(versions: &[ProtocolVersion]) -> BoltResult<Self> {
        let mut bindings = HashMap::with_capacity(versions.len());
        for version in versions {
            let binding = ProtocolBinding::for_version(*version).ok_or_else(|| {
                BoltError::configuration(format!("No protocol binding for Bolt {}", version))
            })?;
            bindings.insert(binding.version(), Arc::new(binding));
        }
        if bindings.is_empty() {
            return Err(BoltError::configuration("At least one protocol version is required"));
        }
        Ok(Self {
            handshake: Handshake::with_versions(bindings.keys().copied().collect()),
            bindings,
        })
    }

    /// Bindings for every version this crate speaks.
    pub fn standard() -> BoltResult<Self> {
        Self::new(&ProtocolVersion::ALL)
    }

    /// Versions on offer, newest first.
    pub fn versions(&self) -> &[ProtocolVersion] {
        self.handshake.supported()
    }

    /// Binding for an exact version.
    pub fn get(&self, version: ProtocolVersion) -> Option<&Arc<ProtocolBinding>> {
        self.bindings.get(&version)
    }

    /// Run version negotiation on a handshake preamble.
    ///
    /// The result also yields the 4-byte reply through
    /// [`Handshake::generate_response`].
    pub fn negotiate(&self, preamble: &[u8]) -> Result<HandshakeResult, HandshakeError> {
        self.handshake.process(preamble)
    }

    /// Binding for a completed negotiation.
    pub fn bind(&self, result: &HandshakeResult) -> Result<Arc<ProtocolBinding>, HandshakeError> {
        self.get(result.version)
            .cloned()
            .ok_or(HandshakeError::NoCompatibleVersion)
    }
}
