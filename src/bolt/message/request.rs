//! Bolt protocol request messages.
//!
//! Request messages are sent from the client to the server. Every message
//! decodes from the owned field list of its structure, so large parameter
//! maps move into the message instead of being copied.

use std::fmt;
use std::time::Duration;

use super::tag;
use crate::bolt::packstream::{PackStreamError, PackStreamStructure, PackStreamValue, ValueMap};

/// Access mode for transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Read-write access (default)
    #[default]
    Write,
    /// Read-only access
    Read,
}

impl AccessMode {
    /// Parse the `mode` entry of an extra map. Anything but a read marker is a write.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "r" | "read" => AccessMode::Read,
            _ => AccessMode::Write,
        }
    }

    /// Wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Read => "r",
            AccessMode::Write => "w",
        }
    }
}

/// Authentication token carried by HELLO (before 5.1) or LOGON.
#[derive(Clone, PartialEq)]
pub struct AuthToken {
    /// Authentication scheme (e.g., "basic", "bearer", "none")
    pub scheme: String,
    /// Principal (username)
    pub principal: Option<String>,
    /// Credentials (password or token)
    pub credentials: Option<String>,
    /// Realm
    pub realm: Option<String>,
    /// Scheme-specific parameters
    pub parameters: ValueMap,
}

impl AuthToken {
    const KEYS: [&'static str; 5] = ["scheme", "principal", "credentials", "realm", "parameters"];

    /// Create a basic auth token.
    pub fn basic(principal: &str, credentials: &str) -> Self {
        Self {
            scheme: "basic".to_string(),
            principal: Some(principal.to_string()),
            credentials: Some(credentials.to_string()),
            realm: None,
            parameters: ValueMap::new(),
        }
    }

    /// Create an anonymous token.
    pub fn none() -> Self {
        Self {
            scheme: "none".to_string(),
            principal: None,
            credentials: None,
            realm: None,
            parameters: ValueMap::new(),
        }
    }

    /// Whether `key` belongs to an auth token rather than to HELLO's own extras.
    pub fn is_auth_key(key: &str) -> bool {
        Self::KEYS.contains(&key)
    }

    /// Convert to a PackStream map.
    pub fn to_map(&self) -> ValueMap {
        let mut map = ValueMap::new();
        map.insert("scheme".to_string(), self.scheme.as_str().into());
        if let Some(ref p) = self.principal {
            map.insert("principal".to_string(), p.as_str().into());
        }
        if let Some(ref c) = self.credentials {
            map.insert("credentials".to_string(), c.as_str().into());
        }
        if let Some(ref r) = self.realm {
            map.insert("realm".to_string(), r.as_str().into());
        }
        if !self.parameters.is_empty() {
            map.insert("parameters".to_string(), self.parameters.clone().into());
        }
        map
    }

    /// Take the token out of a map. A missing scheme means `none`.
    pub fn from_map(mut map: ValueMap) -> Result<Self, PackStreamError> {
        let scheme = take_string(&mut map, "scheme", "auth")?.unwrap_or_else(|| "none".to_string());
        Ok(Self {
            scheme,
            principal: take_string(&mut map, "principal", "auth")?,
            credentials: take_string(&mut map, "credentials", "auth")?,
            realm: take_string(&mut map, "realm", "auth")?,
            parameters: take_map(&mut map, "parameters", "auth")?.unwrap_or_default(),
        })
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("scheme", &self.scheme)
            .field("principal", &self.principal)
            .field("credentials", &self.credentials.as_ref().map(|_| "******"))
            .field("realm", &self.realm)
            .finish()
    }
}

/// Request message kinds, used as dispatch keys by the session state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum RequestKind {
    Hello,
    Logon,
    Logoff,
    Run,
    Pull,
    Discard,
    Begin,
    Commit,
    Rollback,
    Reset,
    Goodbye,
    Route,
    Telemetry,
}

impl RequestKind {
    /// Every kind, in tag order.
    pub const ALL: [RequestKind; 13] = [
        RequestKind::Hello,
        RequestKind::Goodbye,
        RequestKind::Reset,
        RequestKind::Run,
        RequestKind::Begin,
        RequestKind::Commit,
        RequestKind::Rollback,
        RequestKind::Discard,
        RequestKind::Pull,
        RequestKind::Telemetry,
        RequestKind::Route,
        RequestKind::Logon,
        RequestKind::Logoff,
    ];

    /// Wire tag.
    pub fn tag(self) -> u8 {
        match self {
            RequestKind::Hello => tag::HELLO,
            RequestKind::Logon => tag::LOGON,
            RequestKind::Logoff => tag::LOGOFF,
            RequestKind::Run => tag::RUN,
            RequestKind::Pull => tag::PULL,
            RequestKind::Discard => tag::DISCARD,
            RequestKind::Begin => tag::BEGIN,
            RequestKind::Commit => tag::COMMIT,
            RequestKind::Rollback => tag::ROLLBACK,
            RequestKind::Reset => tag::RESET,
            RequestKind::Goodbye => tag::GOODBYE,
            RequestKind::Route => tag::ROUTE,
            RequestKind::Telemetry => tag::TELEMETRY,
        }
    }

    /// Message name for logging and error messages.
    pub fn name(self) -> &'static str {
        match self {
            RequestKind::Hello => "HELLO",
            RequestKind::Logon => "LOGON",
            RequestKind::Logoff => "LOGOFF",
            RequestKind::Run => "RUN",
            RequestKind::Pull => "PULL",
            RequestKind::Discard => "DISCARD",
            RequestKind::Begin => "BEGIN",
            RequestKind::Commit => "COMMIT",
            RequestKind::Rollback => "ROLLBACK",
            RequestKind::Reset => "RESET",
            RequestKind::Goodbye => "GOODBYE",
            RequestKind::Route => "ROUTE",
            RequestKind::Telemetry => "TELEMETRY",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// All Bolt request messages.
#[derive(Debug, Clone, PartialEq)]
pub enum BoltRequest {
    /// HELLO - Initialize connection
    Hello(HelloMessage),
    /// LOGON - Authenticate (Bolt 5.1+)
    Logon(LogonMessage),
    /// LOGOFF - Drop authentication (Bolt 5.1+)
    Logoff,
    /// RUN - Execute a query
    Run(RunMessage),
    /// PULL - Stream results
    Pull(ResultRequest),
    /// DISCARD - Drop results
    Discard(ResultRequest),
    /// BEGIN - Start an explicit transaction
    Begin(BeginMessage),
    /// COMMIT - Commit the explicit transaction
    Commit,
    /// ROLLBACK - Roll back the explicit transaction
    Rollback,
    /// RESET - Abandon all work and return to the default state
    Reset,
    /// GOODBYE - Close the connection
    Goodbye,
    /// ROUTE - Fetch a routing table (Bolt 4.3+)
    Route(RouteMessage),
    /// TELEMETRY - Driver API usage report (Bolt 5.4+)
    Telemetry(TelemetryMessage),
}

impl BoltRequest {
    /// Message kind.
    pub fn kind(&self) -> RequestKind {
        match self {
            BoltRequest::Hello(_) => RequestKind::Hello,
            BoltRequest::Logon(_) => RequestKind::Logon,
            BoltRequest::Logoff => RequestKind::Logoff,
            BoltRequest::Run(_) => RequestKind::Run,
            BoltRequest::Pull(_) => RequestKind::Pull,
            BoltRequest::Discard(_) => RequestKind::Discard,
            BoltRequest::Begin(_) => RequestKind::Begin,
            BoltRequest::Commit => RequestKind::Commit,
            BoltRequest::Rollback => RequestKind::Rollback,
            BoltRequest::Reset => RequestKind::Reset,
            BoltRequest::Goodbye => RequestKind::Goodbye,
            BoltRequest::Route(_) => RequestKind::Route,
            BoltRequest::Telemetry(_) => RequestKind::Telemetry,
        }
    }

    /// Message name for logging.
    pub fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Approximate memory a message pins while it waits and executes.
    pub fn estimated_size(&self) -> usize {
        const BASE: usize = std::mem::size_of::<BoltRequest>();
        BASE + match self {
            BoltRequest::Run(run) => {
                run.query.len() + map_size(&run.parameters) + map_size(&run.extra.tx_metadata)
            }
            BoltRequest::Begin(begin) => map_size(&begin.extra.tx_metadata),
            BoltRequest::Hello(hello) => map_size(&hello.extra),
            _ => 0,
        }
    }

    /// Encode as a structure, using the newest wire shape for each message.
    pub fn to_structure(&self) -> PackStreamStructure {
        let kind = self.kind();
        let fields = match self {
            BoltRequest::Hello(msg) => msg.to_fields(),
            BoltRequest::Logon(msg) => vec![msg.auth.to_map().into()],
            BoltRequest::Run(msg) => msg.to_fields(),
            BoltRequest::Pull(msg) | BoltRequest::Discard(msg) => msg.to_fields(),
            BoltRequest::Begin(msg) => vec![msg.extra.to_map().into()],
            BoltRequest::Route(msg) => msg.to_fields(),
            BoltRequest::Telemetry(msg) => vec![PackStreamValue::Integer(msg.api.as_i64())],
            BoltRequest::Logoff
            | BoltRequest::Commit
            | BoltRequest::Rollback
            | BoltRequest::Reset
            | BoltRequest::Goodbye => Vec::new(),
        };
        PackStreamStructure::new(kind.tag(), fields)
    }
}

/// Transaction-level extras shared by RUN and BEGIN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionExtra {
    /// Bookmarks the transaction must observe
    pub bookmarks: Vec<String>,
    /// Transaction timeout
    pub tx_timeout: Option<Duration>,
    /// Access mode
    pub mode: AccessMode,
    /// Target database; `None` means the connection default
    pub database: Option<String>,
    /// User metadata attached to the transaction
    pub tx_metadata: ValueMap,
    /// User to impersonate (Bolt 4.4+)
    pub imp_user: Option<String>,
    /// Entries this server does not interpret (notification filters, ...)
    pub other: ValueMap,
}

impl TransactionExtra {
    /// Set the target database.
    pub fn with_database(mut self, db: &str) -> Self {
        self.database = Some(db.to_string());
        self
    }

    /// Set the impersonated user.
    pub fn with_imp_user(mut self, user: &str) -> Self {
        self.imp_user = Some(user.to_string());
        self
    }

    /// Set bookmarks.
    pub fn with_bookmarks(mut self, bookmarks: Vec<String>) -> Self {
        self.bookmarks = bookmarks;
        self
    }

    /// Set the access mode.
    pub fn with_mode(mut self, mode: AccessMode) -> Self {
        self.mode = mode;
        self
    }

    /// Parse an extra map.
    pub fn from_map(mut map: ValueMap, message: &'static str) -> Result<Self, PackStreamError> {
        let bookmarks = take_string_list(&mut map, "bookmarks", message)?.unwrap_or_default();
        let tx_timeout = match take_int(&mut map, "tx_timeout", message)? {
            Some(ms) if ms < 0 => {
                return Err(PackStreamError::invalid(format!(
                    "{} tx_timeout must not be negative, got {}",
                    message, ms
                )))
            }
            Some(ms) => Some(Duration::from_millis(ms as u64)),
            None => None,
        };
        let mode = take_string(&mut map, "mode", message)?
            .map(|m| AccessMode::parse(&m))
            .unwrap_or_default();
        Ok(Self {
            bookmarks,
            tx_timeout,
            mode,
            database: take_string(&mut map, "db", message)?,
            tx_metadata: take_map(&mut map, "tx_metadata", message)?.unwrap_or_default(),
            imp_user: take_string(&mut map, "imp_user", message)?,
            other: map,
        })
    }

    /// Convert to an extra map, omitting defaults.
    pub fn to_map(&self) -> ValueMap {
        let mut map = self.other.clone();
        if !self.bookmarks.is_empty() {
            map.insert("bookmarks".to_string(), self.bookmarks.clone().into());
        }
        if let Some(timeout) = self.tx_timeout {
            map.insert("tx_timeout".to_string(), (timeout.as_millis() as i64).into());
        }
        if self.mode == AccessMode::Read {
            map.insert("mode".to_string(), AccessMode::Read.as_str().into());
        }
        if let Some(ref db) = self.database {
            map.insert("db".to_string(), db.as_str().into());
        }
        if !self.tx_metadata.is_empty() {
            map.insert("tx_metadata".to_string(), self.tx_metadata.clone().into());
        }
        if let Some(ref user) = self.imp_user {
            map.insert("imp_user".to_string(), user.as_str().into());
        }
        map
    }
}

/// HELLO message - Initialize connection.
#[derive(Debug, Clone, PartialEq)]
pub struct HelloMessage {
    /// User agent string
    pub user_agent: String,
    /// Credentials; only present before 5.1, where HELLO also authenticates
    pub auth: Option<AuthToken>,
    /// Routing context, present when the driver uses routing
    pub routing: Option<ValueMap>,
    /// Structured driver identification (Bolt 5.3+)
    pub bolt_agent: Option<ValueMap>,
    /// Requested protocol patches
    pub patch_bolt: Vec<String>,
    /// Entries this server does not interpret
    pub extra: ValueMap,
}

impl HelloMessage {
    /// Create a new HELLO message.
    pub fn new(user_agent: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            auth: None,
            routing: None,
            bolt_agent: None,
            patch_bolt: Vec::new(),
            extra: ValueMap::new(),
        }
    }

    /// Set authentication.
    pub fn with_auth(mut self, auth: AuthToken) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Set routing context.
    pub fn with_routing(mut self, routing: ValueMap) -> Self {
        self.routing = Some(routing);
        self
    }

    /// Decode a HELLO that carries no credentials (Bolt 5.1+).
    pub fn from_fields(fields: Vec<PackStreamValue>) -> Result<Self, PackStreamError> {
        Self::decode(fields, false)
    }

    /// Decode a HELLO whose extra map also holds the auth token (before 5.1).
    pub fn from_fields_with_auth(fields: Vec<PackStreamValue>) -> Result<Self, PackStreamError> {
        Self::decode(fields, true)
    }

    fn decode(fields: Vec<PackStreamValue>, with_auth: bool) -> Result<Self, PackStreamError> {
        let mut reader = FieldReader::new("HELLO", fields);
        let mut extra = reader.map("extra")?;

        let user_agent = match take_string(&mut extra, "user_agent", "HELLO")? {
            Some(agent) if !agent.trim().is_empty() => agent,
            _ => {
                return Err(PackStreamError::invalid(
                    "HELLO requires a non-empty user_agent",
                ))
            }
        };

        let auth = if with_auth {
            let keys: Vec<String> = extra
                .keys()
                .filter(|k| AuthToken::is_auth_key(k))
                .cloned()
                .collect();
            let mut token = ValueMap::new();
            for key in keys {
                if let Some(value) = extra.remove(&key) {
                    token.insert(key, value);
                }
            }
            Some(AuthToken::from_map(token)?)
        } else {
            None
        };

        Ok(Self {
            user_agent,
            auth,
            routing: take_map(&mut extra, "routing", "HELLO")?,
            bolt_agent: take_map(&mut extra, "bolt_agent", "HELLO")?,
            patch_bolt: take_string_list(&mut extra, "patch_bolt", "HELLO")?.unwrap_or_default(),
            extra,
        })
    }

    fn to_fields(&self) -> Vec<PackStreamValue> {
        let mut extra = self.extra.clone();
        extra.insert("user_agent".to_string(), self.user_agent.as_str().into());
        if let Some(ref auth) = self.auth {
            extra.extend(auth.to_map());
        }
        if let Some(ref routing) = self.routing {
            extra.insert("routing".to_string(), routing.clone().into());
        }
        if let Some(ref agent) = self.bolt_agent {
            extra.insert("bolt_agent".to_string(), agent.clone().into());
        }
        if !self.patch_bolt.is_empty() {
            extra.insert("patch_bolt".to_string(), self.patch_bolt.clone().into());
        }
        vec![extra.into()]
    }
}

/// LOGON message - Authenticate (Bolt 5.1+).
#[derive(Debug, Clone, PartialEq)]
pub struct LogonMessage {
    /// Authentication token
    pub auth: AuthToken,
}

impl LogonMessage {
    /// Create a new LOGON message.
    pub fn new(auth: AuthToken) -> Self {
        Self { auth }
    }

    /// Decode from structure fields.
    pub fn from_fields(fields: Vec<PackStreamValue>) -> Result<Self, PackStreamError> {
        let mut reader = FieldReader::new("LOGON", fields);
        let auth = AuthToken::from_map(reader.map("auth")?)?;
        Ok(Self { auth })
    }
}

/// RUN message - Execute a query.
#[derive(Debug, Clone, PartialEq)]
pub struct RunMessage {
    /// Query text
    pub query: String,
    /// Query parameters
    pub parameters: ValueMap,
    /// Transaction extras (ignored inside an explicit transaction)
    pub extra: TransactionExtra,
}

impl RunMessage {
    /// Create a new RUN message.
    pub fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            parameters: ValueMap::new(),
            extra: TransactionExtra::default(),
        }
    }

    /// Set query parameters.
    pub fn with_parameters(mut self, params: ValueMap) -> Self {
        self.parameters = params;
        self
    }

    /// Set transaction extras.
    pub fn with_extra(mut self, extra: TransactionExtra) -> Self {
        self.extra = extra;
        self
    }

    /// Decode from structure fields.
    pub fn from_fields(fields: Vec<PackStreamValue>) -> Result<Self, PackStreamError> {
        let mut reader = FieldReader::new("RUN", fields);
        let query = reader.string("query")?;
        let parameters = reader.map("parameters")?;
        let extra = TransactionExtra::from_map(reader.map("extra")?, "RUN")?;
        Ok(Self {
            query,
            parameters,
            extra,
        })
    }

    fn to_fields(&self) -> Vec<PackStreamValue> {
        vec![
            self.query.as_str().into(),
            self.parameters.clone().into(),
            self.extra.to_map().into(),
        ]
    }
}

/// PULL or DISCARD payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultRequest {
    /// Number of records to stream or drop; [`ResultRequest::ALL`] for everything
    pub n: i64,
    /// Result to address; [`ResultRequest::LAST`] for the most recent RUN
    pub qid: i64,
}

impl ResultRequest {
    /// `n` value meaning "every remaining record".
    pub const ALL: i64 = -1;
    /// `qid` value meaning "the most recently opened result".
    pub const LAST: i64 = -1;

    /// Request every remaining record of the last result.
    pub fn all() -> Self {
        Self {
            n: Self::ALL,
            qid: Self::LAST,
        }
    }

    /// Request `n` records of the last result.
    pub fn with_n(n: i64) -> Self {
        Self { n, qid: Self::LAST }
    }

    /// Address a specific result.
    pub fn with_qid(mut self, qid: i64) -> Self {
        self.qid = qid;
        self
    }

    /// Whether every remaining record is requested.
    pub fn is_all(&self) -> bool {
        self.n == Self::ALL
    }

    /// Decode a PULL payload.
    pub fn pull_from_fields(fields: Vec<PackStreamValue>) -> Result<Self, PackStreamError> {
        Self::decode("PULL", fields)
    }

    /// Decode a DISCARD payload.
    pub fn discard_from_fields(fields: Vec<PackStreamValue>) -> Result<Self, PackStreamError> {
        Self::decode("DISCARD", fields)
    }

    fn decode(message: &'static str, fields: Vec<PackStreamValue>) -> Result<Self, PackStreamError> {
        let mut reader = FieldReader::new(message, fields);
        let mut extra = reader.map("extra")?;
        let n = take_int(&mut extra, "n", message)?.ok_or_else(|| {
            PackStreamError::invalid(format!("{} requires a size 'n'", message))
        })?;
        if n == 0 || n < Self::ALL {
            return Err(PackStreamError::invalid(format!(
                "{} size must be -1 or positive, got {}",
                message, n
            )));
        }
        let qid = take_int(&mut extra, "qid", message)?.unwrap_or(Self::LAST);
        Ok(Self { n, qid })
    }

    fn to_fields(&self) -> Vec<PackStreamValue> {
        let mut extra = ValueMap::new();
        extra.insert("n".to_string(), self.n.into());
        if self.qid != Self::LAST {
            extra.insert("qid".to_string(), self.qid.into());
        }
        vec![extra.into()]
    }
}

/// BEGIN message - Start an explicit transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BeginMessage {
    /// Transaction extras
    pub extra: TransactionExtra,
}

impl BeginMessage {
    /// Create a new BEGIN message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set transaction extras.
    pub fn with_extra(mut self, extra: TransactionExtra) -> Self {
        self.extra = extra;
        self
    }

    /// Decode from structure fields.
    pub fn from_fields(fields: Vec<PackStreamValue>) -> Result<Self, PackStreamError> {
        let mut reader = FieldReader::new("BEGIN", fields);
        let extra = TransactionExtra::from_map(reader.map("extra")?, "BEGIN")?;
        Ok(Self { extra })
    }
}

/// ROUTE message - Get routing information (Bolt 4.3+).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteMessage {
    /// Routing context
    pub routing: ValueMap,
    /// Bookmarks
    pub bookmarks: Vec<String>,
    /// Database name; `None` means the default database
    pub database: Option<String>,
    /// Impersonated user (Bolt 4.4+)
    pub imp_user: Option<String>,
}

impl RouteMessage {
    /// Create a new ROUTE message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set routing context.
    pub fn with_routing(mut self, routing: ValueMap) -> Self {
        self.routing = routing;
        self
    }

    /// Set database.
    pub fn with_database(mut self, db: &str) -> Self {
        self.database = Some(db.to_string());
        self
    }

    /// Set impersonated user.
    pub fn with_imp_user(mut self, user: &str) -> Self {
        self.imp_user = Some(user.to_string());
        self
    }

    /// Decode the 4.3 shape: `routing, bookmarks, db`.
    pub fn from_fields_v43(fields: Vec<PackStreamValue>) -> Result<Self, PackStreamError> {
        let mut reader = FieldReader::new("ROUTE", fields);
        Ok(Self {
            routing: reader.map("routing")?,
            bookmarks: reader.string_list("bookmarks")?,
            database: reader.optional_string("db")?,
            imp_user: None,
        })
    }

    /// Decode the 4.4+ shape: `routing, bookmarks, {db, imp_user}`.
    pub fn from_fields(fields: Vec<PackStreamValue>) -> Result<Self, PackStreamError> {
        let mut reader = FieldReader::new("ROUTE", fields);
        let routing = reader.map("routing")?;
        let bookmarks = reader.string_list("bookmarks")?;
        let mut extra = reader.map("extra")?;
        Ok(Self {
            routing,
            bookmarks,
            database: take_string(&mut extra, "db", "ROUTE")?,
            imp_user: take_string(&mut extra, "imp_user", "ROUTE")?,
        })
    }

    /// Encode in the 4.3 shape.
    pub fn to_structure_v43(&self) -> PackStreamStructure {
        PackStreamStructure::new(
            tag::ROUTE,
            vec![
                self.routing.clone().into(),
                self.bookmarks.clone().into(),
                self.database.clone().into(),
            ],
        )
    }

    fn to_fields(&self) -> Vec<PackStreamValue> {
        let mut extra = ValueMap::new();
        if let Some(ref db) = self.database {
            extra.insert("db".to_string(), db.as_str().into());
        }
        if let Some(ref user) = self.imp_user {
            extra.insert("imp_user".to_string(), user.as_str().into());
        }
        vec![
            self.routing.clone().into(),
            self.bookmarks.clone().into(),
            extra.into(),
        ]
    }
}

/// Driver API a TELEMETRY message reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryApi {
    /// Transaction functions
    ManagedTransaction,
    /// Explicit BEGIN/COMMIT
    UnmanagedTransaction,
    /// Session autocommit `run`
    AutoCommitTransaction,
    /// Driver-level `execute_query`
    ExecuteQuery,
}

impl TelemetryApi {
    /// Wire value.
    pub fn as_i64(self) -> i64 {
        match self {
            TelemetryApi::ManagedTransaction => 0,
            TelemetryApi::UnmanagedTransaction => 1,
            TelemetryApi::AutoCommitTransaction => 2,
            TelemetryApi::ExecuteQuery => 3,
        }
    }

    /// Parse the wire value.
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(TelemetryApi::ManagedTransaction),
            1 => Some(TelemetryApi::UnmanagedTransaction),
            2 => Some(TelemetryApi::AutoCommitTransaction),
            3 => Some(TelemetryApi::ExecuteQuery),
            _ => None,
        }
    }
}

/// TELEMETRY message (Bolt 5.4+).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryMessage {
    /// Reported API
    pub api: TelemetryApi,
}

impl TelemetryMessage {
    /// Decode from structure fields.
    pub fn from_fields(fields: Vec<PackStreamValue>) -> Result<Self, PackStreamError> {
        let mut reader = FieldReader::new("TELEMETRY", fields);
        let raw = reader.int("api")?;
        let api = TelemetryApi::from_i64(raw).ok_or_else(|| {
            PackStreamError::invalid(format!("TELEMETRY api {} is not recognized", raw))
        })?;
        Ok(Self { api })
    }
}

fn map_size(map: &ValueMap) -> usize {
    map.iter().map(|(k, v)| k.len() + v.estimated_size()).sum()
}

/// Reads a structure's fields front to back, naming the message in errors.
struct FieldReader {
    message: &'static str,
    fields: std::vec::IntoIter<PackStreamValue>,
}

impl FieldReader {
    fn new(message: &'static str, fields: Vec<PackStreamValue>) -> Self {
        Self {
            message,
            fields: fields.into_iter(),
        }
    }

    fn next(&mut self, what: &str) -> Result<PackStreamValue, PackStreamError> {
        self.fields
            .next()
            .ok_or_else(|| PackStreamError::invalid(format!("{} is missing {}", self.message, what)))
    }

    fn string(&mut self, what: &str) -> Result<String, PackStreamError> {
        match self.next(what)? {
            PackStreamValue::String(s) => Ok(s),
            other => Err(mismatch(self.message, what, "String", &other)),
        }
    }

    fn optional_string(&mut self, what: &str) -> Result<Option<String>, PackStreamError> {
        match self.next(what)? {
            PackStreamValue::String(s) => Ok(Some(s)),
            PackStreamValue::Null => Ok(None),
            other => Err(mismatch(self.message, what, "String", &other)),
        }
    }

    fn int(&mut self, what: &str) -> Result<i64, PackStreamError> {
        match self.next(what)? {
            PackStreamValue::Integer(i) => Ok(i),
            other => Err(mismatch(self.message, what, "Integer", &other)),
        }
    }

    /// A map field; null reads as empty.
    fn map(&mut self, what: &str) -> Result<ValueMap, PackStreamError> {
        match self.next(what)? {
            PackStreamValue::Map(m) => Ok(m),
            PackStreamValue::Null => Ok(ValueMap::new()),
            other => Err(mismatch(self.message, what, "Map", &other)),
        }
    }

    fn string_list(&mut self, what: &str) -> Result<Vec<String>, PackStreamError> {
        let value = self.next(what)?;
        string_list(value, self.message, what)
    }
}

fn mismatch(message: &str, what: &str, expected: &str, got: &PackStreamValue) -> PackStreamError {
    PackStreamError::invalid(format!(
        "{} {} must be {}, got {}",
        message,
        what,
        expected,
        got.type_name()
    ))
}

fn string_list(value: PackStreamValue, message: &str, what: &str) -> Result<Vec<String>, PackStreamError> {
    match value {
        PackStreamValue::Null => Ok(Vec::new()),
        PackStreamValue::List(items) => items
            .into_iter()
            .map(|item| match item {
                PackStreamValue::String(s) => Ok(s),
                other => Err(mismatch(message, what, "a list of strings", &other)),
            })
            .collect(),
        other => Err(mismatch(message, what, "List", &other)),
    }
}

fn take_string(map: &mut ValueMap, key: &str, message: &str) -> Result<Option<String>, PackStreamError> {
    match map.remove(key) {
        None | Some(PackStreamValue::Null) => Ok(None),
        Some(PackStreamValue::String(s)) => Ok(Some(s)),
        Some(other) => Err(mismatch(message, key, "String", &other)),
    }
}

fn take_int(map: &mut ValueMap, key: &str, message: &str) -> Result<Option<i64>, PackStreamError> {
    match map.remove(key) {
        None | Some(PackStreamValue::Null) => Ok(None),
        Some(PackStreamValue::Integer(i)) => Ok(Some(i)),
        Some(other) => Err(mismatch(message, key, "Integer", &other)),
    }
}

fn take_map(map: &mut ValueMap, key: &str, message: &str) -> Result<Option<ValueMap>, PackStreamError> {
    match map.remove(key) {
        None | Some(PackStreamValue::Null) => Ok(None),
        Some(PackStreamValue::Map(m)) => Ok(Some(m)),
        Some(other) => Err(mismatch(message, key, "Map", &other)),
    }
}

fn take_string_list(
    map: &mut ValueMap,
    key: &str,
    message: &str,
) -> Result<Option<Vec<String>>, PackStreamError> {
    match map.remove(key) {
        None => Ok(None),
        Some(value) => string_list(value, message, key).map(Some),
    }
}
