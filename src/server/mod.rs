//! # Bolt Server Session Layer
//!
//! Everything above the wire: per-connection state machines, flow control,
//! admission and the collaborators a database plugs in.
//!
//! ## Submodules
//!
//! - [`config`] - Server settings and builder
//! - [`protocol`] - Negotiated version bindings (registry + states + features)
//! - [`fsm`] - Connection state machine
//! - [`services`] - Authentication, transaction and routing traits
//! - [`handler`] - Response sink the state machine reports through
//! - [`connector`] - Socket driver tying it all together
//! - [`throttle`] - Inbound watermark flow control
//! - [`admission`] - Shared job and memory admission
//! - [`memory`] - Per-connection memory accounting
//! - [`interrupt`] - RESET signalling between reader and worker
//! - [`connection`] - Connection metadata
//!
//! ## Lifecycle
//!
//! ```text
//! handshake ─▶ NEGOTIATION ─HELLO─▶ (AUTHENTICATION ─LOGON─▶) READY
//!                                                               │
//!                       RUN / BEGIN / ROUTE / TELEMETRY ◀────────┘
//! ```

pub mod admission;
pub mod config;
pub mod connection;
pub mod connector;
pub mod fsm;
pub mod handler;
pub mod interrupt;
pub mod memory;
pub mod protocol;
pub mod services;
pub mod throttle;

pub use admission::{AdmissionController, AdmissionPermit, AdmissionRejection, AdmissionResource};
pub use config::{ServerConfig, ServerConfigBuilder, DEFAULT_DATABASE};
pub use connection::Connection;
pub use connector::{serve_connection, BoltConnector};
pub use fsm::{MachineContext, StateMachine, StateReference};
pub use handler::{ResponseCollector, ResponseHandler};
pub use interrupt::InterruptHandle;
pub use memory::{MemoryReservation, MemoryTracker};
pub use protocol::{Impersonation, ProtocolBinding, ProtocolFeatures, ProtocolTable};
pub use services::{
    AuthenticationService, BoltServices, LoginContext, ResultHandle, ResultSummary,
    RoutingService, Transaction, TransactionContext, TransactionManager,
};
pub use throttle::InboundThrottle;
