//! # Bolt Protocol Wire Layer
//!
//! Everything that touches bytes: values, messages, version negotiation and
//! framing. Nothing in here knows about sessions or transactions; that lives
//! in [`crate::server`].
//!
//! ## Submodules
//!
//! - [`packstream`] - Binary serialization/deserialization
//! - [`message`] - Bolt message types (HELLO, RUN, PULL, etc.)
//! - [`handshake`] - Version negotiation
//! - [`registry`] - Per-version struct decoders and encoders
//! - [`codec`] - Tokio codecs for chunked framing
//! - [`error`] - Protocol error types
//!
//! ## Protocol Versions
//!
//! Bolt 4.3 through 5.4 are understood. The differences that matter at this
//! layer are message shapes: HELLO stops carrying credentials in 5.1 (LOGON
//! takes over), ROUTE gains an extra map in 4.4, and TELEMETRY appears in 5.4.

pub mod codec;
pub mod error;
pub mod handshake;
pub mod message;
pub mod packstream;
pub mod registry;

pub use codec::{BoltClientCodec, BoltCodec, BoltServerCodec};
pub use error::{BoltError, BoltErrorCode, BoltResult, HandshakeError};
pub use handshake::{Handshake, ProtocolVersion, BOLT_MAGIC, HANDSHAKE_RESPONSE_SIZE, HANDSHAKE_SIZE};
pub use message::{
    AccessMode, AuthToken, BeginMessage, BoltRequest, BoltResponse, FailureMessage, HelloMessage,
    LogonMessage, QueryStats, RecordMessage, RequestKind, ResultRequest, RouteMessage,
    RoutingTable, RunMessage, ServerRole, SuccessMessage, TelemetryMessage, TransactionExtra,
};
pub use packstream::{PackStreamError, PackStreamStructure, PackStreamValue, ValueMap};
pub use registry::StructRegistry;
