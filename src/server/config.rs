//! Server configuration
//!
//! Every tuning value the Bolt session layer uses, in one place.
//!
//! | Field | Default | Meaning |
//! |------|--------|------|
//! | `server_agent` | `Zeta4G/<version>` | `server` in the HELLO reply |
//! | `supported_versions` | 4.3 to 5.4 | versions offered in negotiation |
//! | `default_database` | `zeta4g` | used when `db` is absent |
//! | `max_message_size` | 16 MiB | largest accepted message |
//! | `max_nesting_depth` | 64 | value nesting limit |
//! | `inbound_high_watermark` | 300 | suspend reading above this |
//! | `inbound_low_watermark` | 100 | resume reading at or below this |
//! | `max_in_flight_jobs` | 10000 | server-wide concurrent jobs |

use serde::{Deserialize, Serialize};

use crate::bolt::codec::DEFAULT_MAX_MESSAGE_SIZE;
use crate::bolt::packstream::DEFAULT_MAX_DEPTH;
use crate::bolt::{BoltError, BoltResult, ProtocolVersion};

use super::protocol::ProtocolBinding;

/// Default database name
pub const DEFAULT_DATABASE: &str = "zeta4g";

// ============================================================================
// ServerConfig
// ============================================================================

/// Bolt server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server agent sent in the HELLO reply
    pub server_agent: String,
    /// Supported protocol versions (serialized as `"5.4"`)
    pub supported_versions: Vec<ProtocolVersion>,
    /// Default database
    pub default_database: String,
    /// Largest message in bytes
    pub max_message_size: usize,
    /// PackStream value nesting limit
    pub max_nesting_depth: usize,
    /// Suspend reading when pending jobs exceed this
    pub inbound_high_watermark: usize,
    /// Resume reading once pending jobs drop to this while suspended
    pub inbound_low_watermark: usize,
    /// Server-wide concurrent job limit
    pub max_in_flight_jobs: usize,
    /// Server-wide memory budget in bytes
    pub max_memory_bytes: Option<usize>,
    /// Per-connection memory limit in bytes
    pub connection_memory_limit: Option<usize>,
    /// Whether TELEMETRY is collected (advertised as a HELLO hint)
    pub telemetry_enabled: bool,
    /// Receive timeout advertised to clients, in seconds
    pub recv_timeout_hint: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_agent: format!("Zeta4G/{}", env!("CARGO_PKG_VERSION")),
            supported_versions: ProtocolVersion::ALL.to_vec(),
            default_database: DEFAULT_DATABASE.to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_nesting_depth: DEFAULT_MAX_DEPTH,
            inbound_high_watermark: 300,
            inbound_low_watermark: 100,
            max_in_flight_jobs: 10_000,
            max_memory_bytes: None,
            connection_memory_limit: None,
            telemetry_enabled: false,
            recv_timeout_hint: None,
        }
    }
}

impl ServerConfig {
    /// Start a builder
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Validate the config
    pub fn validate(&self) -> BoltResult<()> {
        if self.inbound_high_watermark <= self.inbound_low_watermark {
            return Err(BoltError::configuration(format!(
                "inbound_high_watermark ({}) must be greater than inbound_low_watermark ({})",
                self.inbound_high_watermark, self.inbound_low_watermark
            )));
        }
        if self.supported_versions.is_empty() {
            return Err(BoltError::configuration("supported_versions must not be empty"));
        }
        if let Some(v) = self
            .supported_versions
            .iter()
            .find(|v| ProtocolBinding::for_version(**v).is_none())
        {
            return Err(BoltError::configuration(format!(
                "No protocol binding for Bolt {}",
                v
            )));
        }
        if self.max_message_size == 0 {
            return Err(BoltError::configuration("max_message_size must be positive"));
        }
        if self.max_in_flight_jobs == 0 {
            return Err(BoltError::configuration("max_in_flight_jobs must be positive"));
        }
        Ok(())
    }
}

// ============================================================================
// ServerConfigBuilder
// ============================================================================

/// Builder for [`ServerConfig`]
#[derive(Debug, Clone, Default)]
pub struct ServerConfigBuilder {
    config: ServerConfig,
}

impl ServerConfigBuilder {
    /// Set the server agent
    pub fn with_server_agent(mut self, agent: &str) -> Self {
        self.config.server_agent = agent.to_string();
        self
    }

    /// Set the supported versions
    pub fn with_versions(mut self, versions: Vec<ProtocolVersion>) -> Self {
        self.config.supported_versions = versions;
        self
    }

    /// Set the default database
    pub fn with_default_database(mut self, database: &str) -> Self {
        self.config.default_database = database.to_string();
        self
    }

    /// Set the largest message size
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.config.max_message_size = size;
        self
    }

    /// Set the nesting limit
    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.config.max_nesting_depth = depth;
        self
    }

    /// Set the suspend and resume watermarks
    pub fn with_watermarks(mut self, high: usize, low: usize) -> Self {
        self.config.inbound_high_watermark = high;
        self.config.inbound_low_watermark = low;
        self
    }

    /// Set the server-wide job limit
    pub fn with_max_in_flight_jobs(mut self, jobs: usize) -> Self {
        self.config.max_in_flight_jobs = jobs;
        self
    }

    /// Set the server-wide memory budget
    pub fn with_max_memory(mut self, bytes: usize) -> Self {
        self.config.max_memory_bytes = Some(bytes);
        self
    }

    /// Set the per-connection memory limit
    pub fn with_connection_memory_limit(mut self, bytes: usize) -> Self {
        self.config.connection_memory_limit = Some(bytes);
        self
    }

    /// Enable TELEMETRY
    pub fn with_telemetry(mut self, enabled: bool) -> Self {
        self.config.telemetry_enabled = enabled;
        self
    }

    /// Set the receive timeout hint
    pub fn with_recv_timeout_hint(mut self, seconds: u64) -> Self {
        self.config.recv_timeout_hint = Some(seconds);
        self
    }

    /// Build and validate
    pub fn build(self) -> BoltResult<ServerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert!(config.server_agent.starts_with("Zeta4G/"));
        assert_eq!(config.default_database, "zeta4g");
        assert_eq!(config.max_message_size, 16 * 1024 * 1024);
        assert_eq!(config.max_nesting_depth, 64);
        assert_eq!(config.inbound_high_watermark, 300);
        assert_eq!(config.inbound_low_watermark, 100);
        assert_eq!(config.supported_versions.len(), 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ServerConfig::builder()
            .with_server_agent("Test/1.0")
            .with_versions(vec![ProtocolVersion::V5_4, ProtocolVersion::V4_4])
            .with_watermarks(5, 2)
            .with_connection_memory_limit(1024)
            .with_recv_timeout_hint(30)
            .build()
            .unwrap();

        assert_eq!(config.server_agent, "Test/1.0");
        assert_eq!(config.supported_versions, vec![ProtocolVersion::V5_4, ProtocolVersion::V4_4]);
        assert_eq!(config.inbound_high_watermark, 5);
        assert_eq!(config.connection_memory_limit, Some(1024));
        assert_eq!(config.recv_timeout_hint, Some(30));
    }

    #[test]
    fn test_validate_rejects() {
        let err = ServerConfig::builder().with_watermarks(2, 2).build().unwrap_err();
        assert!(matches!(err, BoltError::Configuration(_)));

        assert!(ServerConfig::builder().with_versions(vec![]).build().is_err());
        assert!(ServerConfig::builder()
            .with_versions(vec![ProtocolVersion::new(3, 0)])
            .build()
            .is_err());
        assert!(ServerConfig::builder().with_max_message_size(0).build().is_err());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ServerConfig = serde_json::from_str(
            r#"{
                "supported_versions": ["5.4", "4.4"],
                "inbound_high_watermark": 10,
                "inbound_low_watermark": 4,
                "max_memory_bytes": 1048576
            }"#,
        )
        .unwrap();

        assert_eq!(config.supported_versions, vec![ProtocolVersion::V5_4, ProtocolVersion::V4_4]);
        assert_eq!(config.inbound_high_watermark, 10);
        assert_eq!(config.max_memory_bytes, Some(1_048_576));
        // everything else keeps its default
        assert_eq!(config.default_database, "zeta4g");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_bad_version() {
        let result: Result<ServerConfig, _> =
            serde_json::from_str(r#"{ "supported_versions": ["five"] }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = ServerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"5.4\""));
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
