//! Connection metadata
//!
//! Created once the handshake completes, dropped when the transport closes or
//! GOODBYE arrives. Session state lives in [`crate::server::fsm::StateMachine`].

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use crate::bolt::message::HelloMessage;
use crate::bolt::packstream::ValueMap;
use crate::bolt::ProtocolVersion;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Connection
// ============================================================================

/// One Bolt session
#[derive(Debug, Clone)]
pub struct Connection {
    /// Connection id (`bolt-<n>`)
    id: String,
    /// Negotiated version
    version: ProtocolVersion,
    /// Connect time
    connected_at: DateTime<Utc>,
    /// user_agent from HELLO
    user_agent: Option<String>,
    /// bolt_agent from HELLO (5.3+)
    bolt_agent: Option<ValueMap>,
    /// Routing context from HELLO
    routing: Option<ValueMap>,
}

impl Connection {
    /// New connection with an auto-assigned id
    pub fn new(version: ProtocolVersion) -> Self {
        let n = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        Self::with_id(format!("bolt-{}", n), version)
    }

    /// New connection with the given id
    pub fn with_id(id: impl Into<String>, version: ProtocolVersion) -> Self {
        Self {
            id: id.into(),
            version,
            connected_at: Utc::now(),
            user_agent: None,
            bolt_agent: None,
            routing: None,
        }
    }

    /// Connection id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Negotiated version
    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// Connect time
    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// How long the connection has been open
    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.connected_at
    }

    /// Client user_agent
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Client bolt_agent
    pub fn bolt_agent(&self) -> Option<&ValueMap> {
        self.bolt_agent.as_ref()
    }

    /// Routing context
    pub fn routing(&self) -> Option<&ValueMap> {
        self.routing.as_ref()
    }

    /// Record the client details sent with HELLO
    pub(crate) fn record_hello(&mut self, hello: &HelloMessage) {
        self.user_agent = Some(hello.user_agent.clone());
        self.bolt_agent = hello.bolt_agent.clone();
        self.routing = hello.routing.clone();
    }
}
