//! # Zeta4G Bolt
//!
//! Server side of the Bolt protocol for the
//! [Zeta4G](https://github.com/zeta9044/zeta4g) graph database.
//!
//! ## Features
//!
//! - **Version negotiation** - Bolt 4.3 through 5.4, including range proposals
//! - **PackStream** - Versioned struct registry with depth and size limits
//! - **State machine** - Per-version session states composed by extension
//! - **Flow control** - Watermark throttling of inbound reads and shared admission
//! - **Error taxonomy** - Fatal vs. recoverable errors mapped to Bolt status codes
//!
//! ## Serving Connections
//!
//! The database supplies authentication, transactions and routing through
//! [`BoltServices`]; the connector does the rest.
//!
//! ```rust,no_run
//! # use zeta4g_bolt::{BoltConnector, BoltServices, ServerConfig};
//! # async fn example(services: BoltServices) -> Result<(), Box<dyn std::error::Error>> {
//! let config = ServerConfig::builder()
//!     .with_default_database("movies")
//!     .with_watermarks(300, 100)
//!     .build()?;
//! let connector = BoltConnector::new(config, services)?;
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:7687").await?;
//! connector.listen(listener).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`bolt`] - Wire layer: PackStream, messages, handshake, codecs
//! - [`server`] - Session layer: state machine, throttling, admission
//!

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bolt;
pub mod server;

// Re-exports for convenience
pub use bolt::{
    BoltError, BoltErrorCode, BoltRequest, BoltResponse, BoltResult, HandshakeError,
    PackStreamValue, ProtocolVersion, ValueMap,
};

pub use server::{
    AuthenticationService, BoltConnector, BoltServices, LoginContext, ResultHandle,
    ResultSummary, RoutingService, ServerConfig, StateMachine, StateReference, Transaction,
    TransactionContext, TransactionManager,
};
