//! Bolt protocol metadata types.
//!
//! Structured values the server places into SUCCESS metadata.

use crate::bolt::packstream::{PackStreamValue, ValueMap};

/// Update counters reported as `stats` in the final PULL/DISCARD SUCCESS.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Nodes created
    pub nodes_created: i64,
    /// Nodes deleted
    pub nodes_deleted: i64,
    /// Relationships created
    pub relationships_created: i64,
    /// Relationships deleted
    pub relationships_deleted: i64,
    /// Properties set
    pub properties_set: i64,
    /// Labels added
    pub labels_added: i64,
    /// Labels removed
    pub labels_removed: i64,
    /// Indexes added
    pub indexes_added: i64,
    /// Indexes removed
    pub indexes_removed: i64,
    /// Constraints added
    pub constraints_added: i64,
    /// Constraints removed
    pub constraints_removed: i64,
    /// System graph was updated
    pub contains_system_updates: bool,
}

impl QueryStats {
    fn counters(&self) -> [(&'static str, i64); 11] {
        [
            ("nodes-created", self.nodes_created),
            ("nodes-deleted", self.nodes_deleted),
            ("relationships-created", self.relationships_created),
            ("relationships-deleted", self.relationships_deleted),
            ("properties-set", self.properties_set),
            ("labels-added", self.labels_added),
            ("labels-removed", self.labels_removed),
            ("indexes-added", self.indexes_added),
            ("indexes-removed", self.indexes_removed),
            ("constraints-added", self.constraints_added),
            ("constraints-removed", self.constraints_removed),
        ]
    }

    /// Whether any data changed.
    pub fn contains_updates(&self) -> bool {
        self.counters().iter().any(|(_, n)| *n > 0)
    }

    /// Wire form: only non-zero counters, plus the `contains-*` flags when set.
    pub fn to_map(&self) -> ValueMap {
        let mut map: ValueMap = self
            .counters()
            .iter()
            .filter(|(_, n)| *n > 0)
            .map(|(key, n)| (key.to_string(), PackStreamValue::Integer(*n)))
            .collect();
        if self.contains_updates() {
            map.insert("contains-updates".to_string(), true.into());
        }
        if self.contains_system_updates {
            map.insert("contains-system-updates".to_string(), true.into());
        }
        map
    }
}

/// Server role in a routing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerRole {
    /// Serves reads
    Read,
    /// Serves writes
    Write,
    /// Answers ROUTE
    Route,
}

impl ServerRole {
    /// Wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerRole::Read => "READ",
            ServerRole::Write => "WRITE",
            ServerRole::Route => "ROUTE",
        }
    }
}

/// One group of servers sharing a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingServer {
    /// `host:port` addresses
    pub addresses: Vec<String>,
    /// Role of every address in the group
    pub role: ServerRole,
}

/// Routing table returned as `rt` in the ROUTE SUCCESS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    /// Time to live in seconds
    pub ttl: i64,
    /// Database the table applies to
    pub db: String,
    /// Server groups
    pub servers: Vec<RoutingServer>,
}

impl RoutingTable {
    /// Create an empty routing table.
    pub fn new(db: &str, ttl: i64) -> Self {
        Self {
            ttl,
            db: db.to_string(),
            servers: Vec::new(),
        }
    }

    /// Add a server group.
    pub fn with_servers(mut self, role: ServerRole, addresses: Vec<String>) -> Self {
        self.servers.push(RoutingServer { addresses, role });
        self
    }

    /// Wire form.
    pub fn to_map(&self) -> ValueMap {
        let servers: Vec<PackStreamValue> = self
            .servers
            .iter()
            .map(|group| {
                let mut entry = ValueMap::new();
                entry.insert("addresses".to_string(), group.addresses.clone().into());
                entry.insert("role".to_string(), group.role.as_str().into());
                entry.into()
            })
            .collect();

        let mut map = ValueMap::new();
        map.insert("ttl".to_string(), self.ttl.into());
        map.insert("db".to_string(), self.db.as_str().into());
        map.insert("servers".to_string(), servers.into());
        map
    }
}
